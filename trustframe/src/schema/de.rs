//! Custom deserialization for `Root.keys`: validates that each map key
//! really is the `KeyId` of its value, and deduplicates (with a warning)
//! rather than rejecting outright, matching this crate's lenient stance on
//! duplicate key material (see the design notes on keyid handling).

use crate::primitives::KeyId;
use crate::schema::key::Key;
use serde::de::Error as _;
use std::collections::HashMap;
use std::fmt;

pub(super) fn deserialize_keys<'de, D>(deserializer: D) -> Result<HashMap<KeyId, Key>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;

    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = HashMap<KeyId, Key>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a map of keyid to key")
        }

        fn visit_map<M>(self, mut access: M) -> Result<Self::Value, M::Error>
        where
            M: serde::de::MapAccess<'de>,
        {
            let mut map = HashMap::new();
            while let Some((keyid, key)) = access.next_entry::<KeyId, Key>()? {
                let calculated = key.key_id().map_err(M::Error::custom)?;
                if keyid != calculated {
                    return Err(M::Error::custom(format!(
                        "key map entry {keyid} does not match its computed key id {calculated}"
                    )));
                }
                if map.contains_key(&keyid) {
                    log::warn!("duplicate key id {keyid} in root keys map, keeping first");
                } else {
                    map.insert(keyid, key);
                }
            }
            Ok(map)
        }
    }

    deserializer.deserialize_map(Visitor)
}
