//! The snapshot role: versions (and optionally hashes) of every targets
//! metadata file in the repository, binding timestamp to a specific,
//! internally-consistent set of targets files.

use crate::primitives::Version;
use crate::schema::{MetaFile, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `Snapshot.signed` (§3.2). Must contain at least `"targets.json"`;
/// delegated roles each get their own `"<name>.json"` entry once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "type")]
    pub type_: String,
    pub spec_version: String,
    pub version: Version,
    pub expires: DateTime<Utc>,
    pub meta: BTreeMap<String, MetaFile>,
}

impl Snapshot {
    #[must_use]
    pub fn meta_for(&self, filename: &str) -> Option<&MetaFile> {
        self.meta.get(filename)
    }

    /// §4.4.4 step 5: for every role the previous snapshot recorded, the
    /// new snapshot must either drop it or record a version that hasn't
    /// gone backward.
    pub(crate) fn check_no_rollback(&self, previous: &Snapshot) -> Result<(), (String, u64, u64)> {
        for (name, prev_meta) in &previous.meta {
            if let Some(new_meta) = self.meta.get(name) {
                if u64::from(new_meta.version) < u64::from(prev_meta.version) {
                    return Err((name.clone(), u64::from(prev_meta.version), u64::from(new_meta.version)));
                }
            }
        }
        Ok(())
    }
}

impl Role for Snapshot {
    const TYPE: &'static str = "snapshot";

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

    fn snap(version: u64, targets_version: u64) -> Snapshot {
        let mut meta = BTreeMap::new();
        meta.insert(
            "targets.json".to_string(),
            MetaFile {
                version: Version::new(targets_version).unwrap(),
                length: None,
                hashes: None,
            },
        );
        Snapshot {
            type_: "snapshot".to_string(),
            spec_version: "1.0.31".to_string(),
            version: Version::new(version).unwrap(),
            expires: "2099-01-01T00:00:00Z".parse().unwrap(),
            meta,
        }
    }

    #[test]
    fn detects_rollback() {
        let previous = snap(1, 5);
        let new = snap(2, 4);
        assert!(new.check_no_rollback(&previous).is_err());
    }

    #[test]
    fn allows_forward_progress() {
        let previous = snap(1, 5);
        let new = snap(2, 6);
        assert!(new.check_no_rollback(&previous).is_ok());
    }

    #[test]
    fn allows_dropping_a_role() {
        let previous = snap(1, 5);
        let mut new = snap(2, 6);
        new.meta.remove("targets.json");
        assert!(new.check_no_rollback(&previous).is_ok());
    }
}
