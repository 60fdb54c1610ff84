//! Signature verification and digest primitives (C4).
//!
//! Grounded in the sign-side algorithm choices of the teacher's
//! `sign::{Ed25519KeyPair,RsaKeyPair,EcdsaKeyPair}` (Ed25519, RSA-PSS-SHA256,
//! ECDSA-P256-SHA256 via `aws-lc-rs`); this module is verify-only, since
//! repository authoring is out of scope.

use crate::error::{self, Result};
use crate::schema::key::Key;
use aws_lc_rs::digest::{digest, SHA256, SHA512};
use aws_lc_rs::signature::{self, UnparsedPublicKey, VerificationAlgorithm};
use snafu::OptionExt;

/// SHA-256 of `bytes`.
#[must_use]
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let out = digest(&SHA256, bytes);
    let mut buf = [0u8; 32];
    buf.copy_from_slice(out.as_ref());
    buf
}

/// SHA-512 of `bytes`.
#[must_use]
pub fn sha512(bytes: &[u8]) -> [u8; 64] {
    let out = digest(&SHA512, bytes);
    let mut buf = [0u8; 64];
    buf.copy_from_slice(out.as_ref());
    buf
}

/// Compare two hex digest strings in constant time. Digests here are
/// already-decoded hex text, so this is a constant-time byte compare over
/// the decoded bytes, not the hex text itself.
#[must_use]
pub fn hashes_match(expected_hex: &str, actual: &[u8]) -> bool {
    match hex::decode(expected_hex) {
        Ok(expected) => {
            use aws_lc_rs::constant_time::verify_slices_are_equal;
            expected.len() == actual.len() && verify_slices_are_equal(&expected, actual).is_ok()
        }
        Err(_) => false,
    }
}

/// Verify that `sig` is a valid signature by `key` over `signed_bytes`.
/// Dispatches on `(keytype, scheme)` per §4.3; any other pair is
/// `UnsupportedKey`.
pub fn verify(key: &Key, signed_bytes: &[u8], sig: &[u8]) -> Result<bool> {
    let algorithm: &dyn VerificationAlgorithm = match (key.keytype.as_str(), key.scheme.as_str()) {
        ("ed25519", "ed25519") => &signature::ED25519,
        ("rsa", "rsassa-pss-sha256") => &signature::RSA_PSS_2048_8192_SHA256,
        ("ecdsa", "ecdsa-sha2-nistp256") => &signature::ECDSA_P256_SHA256_ASN1,
        (keytype, scheme) => {
            return error::UnsupportedKeySnafu {
                keyid: key.key_id()?,
                keytype: keytype.to_string(),
                scheme: scheme.to_string(),
            }
            .fail();
        }
    };

    let public_key_bytes = public_key_bytes(key)?;
    let public_key = UnparsedPublicKey::new(algorithm, public_key_bytes);
    Ok(public_key.verify(signed_bytes, sig).is_ok())
}

/// Extract raw verification key bytes from a `Key`'s `keyval.public` field.
/// Ed25519 keys are raw hex; RSA/ECDSA keys are PEM and must be unwrapped to
/// their DER `SubjectPublicKeyInfo` bytes.
fn public_key_bytes(key: &Key) -> Result<Vec<u8>> {
    match key.keytype.as_str() {
        "ed25519" => hex::decode(key.keyval.public.trim()).map_err(|_| {
            error::ConfigInvalidSnafu {
                field: "keyval.public",
                reason: "ed25519 public key is not valid hex".to_string(),
            }
            .build()
        }),
        _ => {
            let parsed = pem::parse(key.keyval.public.trim()).map_err(|e| {
                error::ConfigInvalidSnafu {
                    field: "keyval.public",
                    reason: format!("not a valid PEM public key: {e}"),
                }
                .build()
            })?;
            Ok(spki_public_key_bytes(parsed.contents()))
        }
    }
}

/// Strip a DER `SubjectPublicKeyInfo` envelope down to its raw `BIT STRING`
/// payload, which is what `aws-lc-rs`'s `UnparsedPublicKey` expects for RSA
/// and ECDSA. A minimal hand-rolled walk rather than pulling in a full ASN.1
/// crate: SPKI is `SEQUENCE { AlgorithmIdentifier, BIT STRING }`, and we only
/// need the trailing bit string's content bytes (after its unused-bits
/// marker byte).
fn spki_public_key_bytes(der: &[u8]) -> Vec<u8> {
    // Find the BIT STRING tag (0x03) that starts the second top-level
    // element; walk length-prefixed TLVs rather than guessing offsets.
    let mut reader = untrusted::Reader::new(untrusted::Input::from(der));
    if let Ok(bytes) = read_spki(&mut reader) {
        return bytes;
    }
    // Fall back to returning the input unchanged; callers will simply fail
    // signature verification rather than panic on malformed key material.
    der.to_vec()
}

fn read_spki(reader: &mut untrusted::Reader<'_>) -> std::result::Result<Vec<u8>, ()> {
    read_der_tlv(reader, 0x30).and_then(|seq| {
        let mut seq_reader = untrusted::Reader::new(seq);
        let _algorithm_identifier = read_der_tlv(&mut seq_reader, 0x30)?;
        let bit_string = read_der_tlv(&mut seq_reader, 0x03)?;
        let mut bs_reader = untrusted::Reader::new(bit_string);
        let _unused_bits = bs_reader.read_byte().map_err(|_| ())?;
        let rest = bs_reader.read_bytes_to_end();
        Ok(rest.as_slice_less_safe().to_vec())
    })
}

fn read_der_tlv<'a>(
    reader: &mut untrusted::Reader<'a>,
    expected_tag: u8,
) -> std::result::Result<untrusted::Input<'a>, ()> {
    let tag = reader.read_byte().map_err(|_| ())?;
    if tag != expected_tag {
        return Err(());
    }
    let first_len = reader.read_byte().map_err(|_| ())?;
    let len = if first_len & 0x80 == 0 {
        usize::from(first_len)
    } else {
        let n = usize::from(first_len & 0x7f);
        let mut len = 0usize;
        for _ in 0..n {
            let b = reader.read_byte().map_err(|_| ())?;
            len = (len << 8) | usize::from(b);
        }
        len
    };
    reader.read_bytes(len).map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_lc_rs::rand::SystemRandom;
    use aws_lc_rs::signature::{Ed25519KeyPair, KeyPair};
    use std::collections::BTreeMap;

    #[test]
    fn ed25519_roundtrip() {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        let keypair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap();
        let public_hex = hex::encode(keypair.public_key().as_ref());

        let key = Key {
            keytype: "ed25519".to_string(),
            scheme: "ed25519".to_string(),
            keyval: crate::schema::key::KeyVal { public: public_hex },
            extra: BTreeMap::new(),
        };

        let message = b"refresh cycle payload";
        let sig = keypair.sign(message);

        assert!(verify(&key, message, sig.as_ref()).unwrap());
        assert!(!verify(&key, b"tampered payload", sig.as_ref()).unwrap());
    }

    #[test]
    fn sha256_is_32_bytes() {
        assert_eq!(sha256(b"hello").len(), 32);
    }
}
