//! Public key material as it appears in a root or delegated-targets role.

use crate::error::{self, Result};
use crate::primitives::KeyId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::ResultExt;
use std::collections::BTreeMap;

/// A public key. Only the `(keytype, scheme)` pair determines which
/// verification algorithm applies; `keyval.public` carries the key material
/// itself (PEM for RSA/ECDSA, raw hex for Ed25519).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub keytype: String,
    pub scheme: String,
    pub keyval: KeyVal,
    /// Fields present on the wire that this crate doesn't model explicitly.
    /// Preserved so `key_id` is computed over the payload as the repository
    /// actually published it, not a lossy reinterpretation of it.
    #[serde(flatten)]
    pub(crate) extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVal {
    pub public: String,
}

impl Key {
    /// `KeyId(key) = sha256_hex(canonical(key_object))` (§4.3). The
    /// canonical encoding includes exactly `keytype`, `scheme`, `keyval`,
    /// and any other fields the repository attached to the key object, in
    /// whatever form they were parsed — never synthesized fields.
    pub fn key_id(&self) -> Result<KeyId> {
        let canonical =
            trustframe_cjson::to_canonical_vec(self).context(error::CanonicalEncodingSnafu {
                what: "key",
            })?;
        Ok(KeyId::from_hex(hex::encode(crate::crypto::sha256(
            &canonical,
        ))))
    }
}
