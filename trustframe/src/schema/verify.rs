//! Signature quorum checking shared by every role transition in
//! `trusted_set` (§4.3's `Verify` contract lifted to the envelope level).

use crate::error::{self, Result};
use crate::primitives::{KeyId, RoleName};
use crate::schema::key::Key;
use crate::schema::root::RoleKeys;
use crate::schema::{Role, Signed};
use snafu::ensure;
use std::collections::HashMap;

/// Verify that `signed` carries a quorum of valid, distinct-key signatures
/// under `authority` (the `keyids`/`threshold` entry for this role), where
/// key material is resolved from `keys`.
///
/// Returns `Ok(())` once `authority.threshold` distinct valid signatures
/// have been found; never short-circuits on the *first* invalid signature,
/// since an attacker-supplied payload may carry junk signatures alongside
/// genuine ones.
pub fn verify_signed<T: Role>(
    signed: &Signed<T>,
    keys: &HashMap<KeyId, Key>,
    authority: &RoleKeys,
    role: &RoleName,
) -> Result<()> {
    let canonical = signed.signed.canonical_form()?;
    let mut valid: Vec<&KeyId> = Vec::new();

    for sig in signed.deduped_signatures() {
        if !authority.keyids.contains(&sig.keyid) {
            log::warn!(
                "{role}: signature by keyid {} ignored, not authorized for this role",
                sig.keyid
            );
            continue;
        }
        let Some(key) = keys.get(&sig.keyid) else {
            log::warn!("{role}: signature by unknown keyid {}", sig.keyid);
            continue;
        };
        let sig_bytes = match sig.sig.to_bytes() {
            Ok(bytes) => bytes,
            Err(_) => {
                log::warn!("{role}: signature by keyid {} is not valid hex", sig.keyid);
                continue;
            }
        };
        match crate::crypto::verify(key, &canonical, &sig_bytes) {
            Ok(true) => valid.push(&sig.keyid),
            Ok(false) => log::warn!("{role}: signature by keyid {} did not verify", sig.keyid),
            Err(e) => log::warn!("{role}: signature by keyid {} could not be checked: {e}", sig.keyid),
        }
    }

    ensure!(
        valid.len() as u64 >= authority.threshold,
        error::InsufficientSignaturesSnafu {
            role: role.clone(),
            got: valid.len(),
            required: authority.threshold,
        }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::key::KeyVal;
    use crate::schema::{Signature, Timestamp};
    use aws_lc_rs::rand::SystemRandom;
    use aws_lc_rs::signature::{Ed25519KeyPair, KeyPair};
    use std::collections::BTreeMap;

    fn ed25519_key() -> (Ed25519KeyPair, Key, KeyId) {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        let keypair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap();
        let key = Key {
            keytype: "ed25519".to_string(),
            scheme: "ed25519".to_string(),
            keyval: KeyVal { public: hex::encode(keypair.public_key().as_ref()) },
            extra: BTreeMap::new(),
        };
        let keyid = key.key_id().unwrap();
        (keypair, key, keyid)
    }

    fn timestamp() -> Timestamp {
        let mut meta = BTreeMap::new();
        meta.insert(
            "snapshot.json".to_string(),
            crate::schema::MetaFile { version: crate::primitives::Version::new(1).unwrap(), length: None, hashes: None },
        );
        Timestamp {
            type_: "timestamp".to_string(),
            spec_version: "1.0.31".to_string(),
            version: crate::primitives::Version::new(1).unwrap(),
            expires: "2099-01-01T00:00:00Z".parse().unwrap(),
            meta,
        }
    }

    #[test]
    fn accepts_quorum_met() {
        let (keypair, key, keyid) = ed25519_key();
        let ts = timestamp();
        let canonical = ts.canonical_form().unwrap();
        let sig = keypair.sign(&canonical);
        let signed = Signed {
            signed: ts,
            signatures: vec![Signature { keyid: keyid.clone(), sig: serde_json::from_value(serde_json::Value::String(hex::encode(sig.as_ref()))).unwrap() }],
        };
        let mut keys = HashMap::new();
        keys.insert(keyid.clone(), key);
        let authority = RoleKeys { keyids: vec![keyid], threshold: 1 };
        assert!(verify_signed(&signed, &keys, &authority, &RoleName::new("timestamp")).is_ok());
    }

    #[test]
    fn rejects_below_threshold() {
        let (_keypair, key, keyid) = ed25519_key();
        let ts = timestamp();
        let signed = Signed { signed: ts, signatures: vec![] };
        let mut keys = HashMap::new();
        keys.insert(keyid.clone(), key);
        let authority = RoleKeys { keyids: vec![keyid], threshold: 1 };
        let err = verify_signed(&signed, &keys, &authority, &RoleName::new("timestamp")).unwrap_err();
        assert!(matches!(err, error::Error::InsufficientSignatures { .. }));
    }
}
