//! The root role: the set of trusted keys and thresholds for every other
//! role, including itself.

use crate::primitives::{KeyId, RoleName, Version};
use crate::schema::key::Key;
use crate::schema::{de, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `Root.signed` (§3.2). The keys and threshold for `mirrors` are optional,
/// per the design notes' resolution of mirror-role support to "data model
/// only" — nothing in this crate's refresh protocol acts on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Root {
    #[serde(rename = "type")]
    pub type_: String,
    pub spec_version: String,
    pub version: Version,
    pub expires: DateTime<Utc>,
    pub consistent_snapshot: bool,
    #[serde(deserialize_with = "de::deserialize_keys")]
    pub keys: HashMap<KeyId, Key>,
    pub roles: HashMap<String, RoleKeys>,
}

/// The `keyids`/`threshold` pair a root entry records for one role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleKeys {
    pub keyids: Vec<KeyId>,
    pub threshold: u64,
}

impl Root {
    /// Resolve the `RoleKeys` entry for `role`, if the root lists one.
    #[must_use]
    pub fn role_keys(&self, role: &str) -> Option<&RoleKeys> {
        self.roles.get(role)
    }

    /// Look up a key by id among the keys this root trusts.
    #[must_use]
    pub fn key(&self, keyid: &KeyId) -> Option<&Key> {
        self.keys.get(keyid)
    }

    /// Construction-time sanity checks independent of any signature:
    /// every `keyid` a role lists must appear in `keys`, and
    /// `1 <= threshold <= keyids.len()` for every role.
    pub fn validate_self_consistency(&self) -> Result<(), String> {
        for (role, rk) in &self.roles {
            if rk.threshold < 1 {
                return Err(format!("role {role} has threshold < 1"));
            }
            if (rk.threshold as usize) > rk.keyids.len() {
                return Err(format!(
                    "role {role} has threshold {} but only {} keyids",
                    rk.threshold,
                    rk.keyids.len()
                ));
            }
            for keyid in &rk.keyids {
                if !self.keys.contains_key(keyid) {
                    return Err(format!("role {role} references unknown keyid {keyid}"));
                }
            }
        }
        if self.role_keys(RoleName::ROOT).is_none() {
            return Err("root metadata has no root role entry".to_string());
        }
        if self.role_keys(RoleName::TIMESTAMP).is_none() {
            return Err("root metadata has no timestamp role entry".to_string());
        }
        if self.role_keys(RoleName::SNAPSHOT).is_none() {
            return Err("root metadata has no snapshot role entry".to_string());
        }
        if self.role_keys(RoleName::TARGETS).is_none() {
            return Err("root metadata has no targets role entry".to_string());
        }
        Ok(())
    }
}

impl Role for Root {
    const TYPE: &'static str = "root";

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
    use std::num::NonZeroU64;

    fn sample_root_json() -> serde_json::Value {
        serde_json::json!({
            "type": "root",
            "spec_version": "1.0.31",
            "version": 1,
            "expires": "2099-01-01T00:00:00Z",
            "consistent_snapshot": true,
            "keys": {},
            "roles": {
                "root": {"keyids": [], "threshold": 1},
                "timestamp": {"keyids": [], "threshold": 1},
                "snapshot": {"keyids": [], "threshold": 1},
                "targets": {"keyids": [], "threshold": 1},
            }
        })
    }

    #[test]
    fn parses_minimal_root() {
        let root: Root = serde_json::from_value(sample_root_json()).unwrap();
        assert_eq!(u64::from(root.version), 1);
        assert!(root.consistent_snapshot);
    }

    #[test]
    fn rejects_threshold_exceeding_keyids() {
        let mut value = sample_root_json();
        value["roles"]["root"]["threshold"] = serde_json::json!(5);
        let root: Root = serde_json::from_value(value).unwrap();
        assert!(root.validate_self_consistency().is_err());
    }

    #[test]
    fn version_is_role_trait_accessor() {
        let root: Root = serde_json::from_value(sample_root_json()).unwrap();
        assert_eq!(root.version(), NonZeroU64::new(1).unwrap());
    }
}
