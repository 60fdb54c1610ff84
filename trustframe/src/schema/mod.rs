//! The TUF role data model (C3): the signed envelope shared by every role,
//! and the common `MetaFile` record used by timestamp and snapshot.

mod de;
pub mod key;
pub mod root;
pub mod snapshot;
pub mod targets;
pub mod timestamp;
mod verify;

pub use key::Key;
pub use root::{RoleKeys, Root};
pub use snapshot::Snapshot;
pub use targets::{DelegatedRole, Delegations, PathSet, Target, Targets};
pub use timestamp::Timestamp;
pub use verify::verify_signed;

use crate::error::{self, Result};
use crate::primitives::{KeyId, RoleName, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::collections::BTreeMap;

/// Implemented by the payload type of every role envelope so generic code
/// (the trusted-set transitions) can read `version`/`expires` without
/// matching on which concrete role it has.
pub trait Role: Serialize {
    /// The wire value of this role's `type` field, and its canonical
    /// filename stem (`root`, `timestamp`, `snapshot`, `targets`).
    const TYPE: &'static str;

    fn version(&self) -> Version;
    fn expires(&self) -> DateTime<Utc>;

    /// Canonical encoding of this payload, the bytes signatures are
    /// computed over.
    fn canonical_form(&self) -> Result<Vec<u8>> {
        trustframe_cjson::to_canonical_vec(self).context(error::CanonicalEncodingSnafu {
            what: Self::TYPE,
        })
    }
}

/// One `{keyid, sig}` entry from a signatures list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    pub keyid: KeyId,
    pub sig: crate::primitives::Signature,
}

/// A signed envelope: the role payload plus the signatures claimed over its
/// canonical encoding. Deserializing only parses the wire shape; it does
/// **not** verify anything — that is `verify_signed`'s job, called
/// explicitly by the trusted-set transitions so there is exactly one place
/// per role that can accept an unverified payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signed<T> {
    pub signed: T,
    pub signatures: Vec<Signature>,
}

impl<T: Role> Signed<T> {
    /// Deduplicate signatures by `KeyId`, keeping the first occurrence of
    /// each. The wire format doesn't forbid repeating a keyid; the open
    /// question in this domain's design notes resolves in favor of lenient
    /// deduplication (with a log warning) over strict rejection.
    pub(crate) fn deduped_signatures(&self) -> Vec<&Signature> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for sig in &self.signatures {
            if seen.insert(sig.keyid.clone()) {
                out.push(sig);
            } else {
                log::warn!("duplicate signature entry for keyid {} ignored", sig.keyid);
            }
        }
        out
    }
}

/// A reference into `timestamp.meta` or `snapshot.meta`: the version,
/// length, and hashes a role's metadata is expected to have.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: Version,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashes: Option<BTreeMap<String, String>>,
}

impl MetaFile {
    /// Check `bytes` against this entry's recorded length/hashes, when
    /// present. A `MetaFile` with no `length`/`hashes` imposes no
    /// constraint beyond the version check callers perform separately.
    pub(crate) fn check_bytes(&self, role: &RoleName, bytes: &[u8]) -> Result<()> {
        if let Some(length) = self.length {
            if bytes.len() as u64 != length {
                return error::TargetLengthMismatchSnafu {
                    path: role.as_str().to_string(),
                    expected: length,
                    got: bytes.len() as u64,
                }
                .fail();
            }
        }
        if let Some(hashes) = &self.hashes {
            if let Some(expected) = hashes.get("sha256") {
                if !crate::crypto::hashes_match(expected, &crate::crypto::sha256(bytes)) {
                    return error::TargetHashMismatchSnafu {
                        path: role.as_str().to_string(),
                        expected: expected.clone(),
                        got: hex::encode(crate::crypto::sha256(bytes)),
                    }
                    .fail();
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_file_accepts_matching_bytes() {
        let bytes = b"hello world";
        let mut hashes = BTreeMap::new();
        hashes.insert(
            "sha256".to_string(),
            hex::encode(crate::crypto::sha256(bytes)),
        );
        let meta = MetaFile {
            version: Version::new(1).unwrap(),
            length: Some(bytes.len() as u64),
            hashes: Some(hashes),
        };
        assert!(meta.check_bytes(&RoleName::new("snapshot"), bytes).is_ok());
    }

    #[test]
    fn meta_file_rejects_length_mismatch() {
        let meta = MetaFile {
            version: Version::new(1).unwrap(),
            length: Some(3),
            hashes: None,
        };
        let err = meta
            .check_bytes(&RoleName::new("snapshot"), b"too long")
            .unwrap_err();
        assert!(matches!(err, error::Error::TargetLengthMismatch { .. }));
    }
}
