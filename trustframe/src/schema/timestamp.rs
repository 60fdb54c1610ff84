//! The timestamp role: a single pointer to the current snapshot version,
//! refreshed often since it's small and is the first line of defense
//! against freeze and rollback attacks.

use crate::primitives::Version;
use crate::schema::{MetaFile, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `Timestamp.signed` (§3.2). The wire map always has exactly one entry,
/// `"snapshot.json"`; kept as a map (rather than a dedicated field) so an
/// unrecognized future key doesn't get silently dropped on re-serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timestamp {
    #[serde(rename = "type")]
    pub type_: String,
    pub spec_version: String,
    pub version: Version,
    pub expires: DateTime<Utc>,
    pub meta: BTreeMap<String, MetaFile>,
}

impl Timestamp {
    /// The `MetaFile` entry for `snapshot.json`, required to be present.
    #[must_use]
    pub fn snapshot_meta(&self) -> Option<&MetaFile> {
        self.meta.get("snapshot.json")
    }
}

impl Role for Timestamp {
    const TYPE: &'static str = "timestamp";

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
    fn finds_snapshot_meta() {
        let ts: Timestamp = serde_json::from_value(serde_json::json!({
            "type": "timestamp",
            "spec_version": "1.0.31",
            "version": 3,
            "expires": "2099-01-01T00:00:00Z",
            "meta": {"snapshot.json": {"version": 3}},
        }))
        .unwrap();
        assert_eq!(u64::from(ts.snapshot_meta().unwrap().version), 3);
    }
}
