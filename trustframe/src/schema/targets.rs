//! The targets role: the file inventory for a subtree of the repository,
//! plus the delegation rules that hand off other subtrees to other roles.

use crate::primitives::{KeyId, RelativePath, RoleName, Version};
use crate::schema::{Key, Role};
use chrono::{DateTime, Utc};
use globset::Glob;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// `Targets.signed` (§3.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Targets {
    #[serde(rename = "type")]
    pub type_: String,
    pub spec_version: String,
    pub version: Version,
    pub expires: DateTime<Utc>,
    pub targets: BTreeMap<RelativePath, Target>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegations: Option<Delegations>,
}

/// One entry in `targets`: the length and hashes a downloaded file must
/// match, plus any repository-defined `custom` metadata (opaque to us).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub length: u64,
    pub hashes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom: Option<serde_json::Value>,
}

impl Target {
    /// Verify `bytes` against this target's recorded length and sha256
    /// hash. Constant-time on the digest comparison.
    pub fn matches(&self, bytes: &[u8]) -> bool {
        if bytes.len() as u64 != self.length {
            return false;
        }
        match self.hashes.get("sha256") {
            Some(expected) => crate::crypto::hashes_match(expected, &crate::crypto::sha256(bytes)),
            None => false,
        }
    }
}

/// The delegation block of a targets role: the keys its delegated roles
/// sign with, and the ordered list of delegation rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delegations {
    #[serde(deserialize_with = "crate::schema::de::deserialize_keys")]
    pub keys: HashMap<KeyId, Key>,
    pub roles: Vec<DelegatedRole>,
}

impl Delegations {
    #[must_use]
    pub fn role_named(&self, name: &str) -> Option<&DelegatedRole> {
        self.roles.iter().find(|r| r.name == name)
    }
}

/// One delegation rule: a named role, its signing keys/threshold, the path
/// pattern it is authorized over, and whether a match here forecloses
/// further search (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegatedRole {
    pub name: String,
    pub keyids: Vec<KeyId>,
    pub threshold: u64,
    #[serde(flatten)]
    pub paths: PathSet,
    pub terminating: bool,
}

impl DelegatedRole {
    #[must_use]
    pub fn role_name(&self) -> RoleName {
        RoleName::new(self.name.clone())
    }

    /// Whether this delegation's pattern covers `target_path` (§4.6 steps
    /// 5a/5b).
    #[must_use]
    pub fn matches(&self, target_path: &str) -> bool {
        self.paths.matches(target_path)
    }
}

/// Exactly one of `paths` (glob patterns) or `path_hash_prefixes` (hex
/// prefixes of `sha256(target_path)`) is present on a delegation (§3.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSet {
    Paths { paths: Vec<String> },
    PathHashPrefixes { path_hash_prefixes: Vec<String> },
}

impl PathSet {
    #[must_use]
    pub fn matches(&self, target_path: &str) -> bool {
        match self {
            PathSet::Paths { paths } => paths.iter().any(|pattern| glob_match(pattern, target_path)),
            PathSet::PathHashPrefixes { path_hash_prefixes } => {
                let digest = hex::encode(crate::crypto::sha256(target_path.as_bytes()));
                path_hash_prefixes
                    .iter()
                    .any(|prefix| digest.starts_with(prefix.as_str()))
            }
        }
    }
}

/// Shell-style glob match: `*` within a path segment, `**` across segments,
/// `?` a single character, `/`-separated (§4.6 step 5b).
fn glob_match(pattern: &str, path: &str) -> bool {
    match Glob::new(pattern) {
        Ok(glob) => glob.compile_matcher().is_match(path),
        Err(_) => {
            log::warn!("delegation path pattern {pattern:?} is not a valid glob; treating as no-match");
            false
        }
    }
}

impl Role for Targets {
    const TYPE: &'static str = "targets";

    fn version(&self) -> Version {
        self.version
    }

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_single_segment_star() {
        let set = PathSet::Paths { paths: vec!["libs/*".to_string()] };
        assert!(set.matches("libs/foo"));
        assert!(!set.matches("libs/foo/bar"));
    }

    #[test]
    fn glob_double_star_crosses_segments() {
        let set = PathSet::Paths { paths: vec!["libs/**".to_string()] };
        assert!(set.matches("libs/foo/bar"));
    }

    #[test]
    fn path_hash_prefix_matches() {
        let digest = hex::encode(crate::crypto::sha256(b"hello.txt"));
        let prefix = digest[..4].to_string();
        let set = PathSet::PathHashPrefixes { path_hash_prefixes: vec![prefix] };
        assert!(set.matches("hello.txt"));
        assert!(!set.matches("goodbye.txt"));
    }

    #[test]
    fn target_matches_checks_length_and_hash() {
        let bytes = b"hello.txt contents";
        let mut hashes = BTreeMap::new();
        hashes.insert("sha256".to_string(), hex::encode(crate::crypto::sha256(bytes)));
        let target = Target {
            length: bytes.len() as u64,
            hashes,
            custom: None,
        };
        assert!(target.matches(bytes));
        assert!(!target.matches(b"tampered"));
    }
}
