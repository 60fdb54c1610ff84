//! Semantic wrappers around the raw strings and integers that appear on the
//! wire: key identifiers, signatures, relative target paths, role names,
//! and spec-version compatibility checks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;

/// The SHA-256 digest of a key's canonical encoding, as 64 lowercase hex
/// characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    pub(crate) fn from_hex(hex: impl Into<String>) -> Self {
        KeyId(hex.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw signature bytes, stored as lowercase hex on the wire. Ed25519
/// signatures are always 64 bytes; RSA-PSS signatures vary with the
/// modulus; ECDSA signatures are DER-encoded `(r, s)` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    #[must_use]
    pub fn as_hex(&self) -> &str {
        &self.0
    }

    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>, hex::FromHexError> {
        hex::decode(&self.0)
    }
}

/// A non-empty, forward-slash separated path relative to a targets or
/// metadata base URL. Never begins with `/` and never contains a `..`
/// segment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RelativePath(String);

// Deserializing goes through `RelativePath::new` rather than a transparent
// derive, so an untrusted metadata file can't smuggle a `../` target path
// past validation by handing it to us as a bare JSON string.
impl<'de> Deserialize<'de> for RelativePath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        RelativePath::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur while constructing a [`RelativePath`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativePathError {
    Empty,
    LeadingSlash,
    ParentSegment,
}

impl fmt::Display for RelativePathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelativePathError::Empty => write!(f, "path is empty"),
            RelativePathError::LeadingSlash => write!(f, "path starts with '/'"),
            RelativePathError::ParentSegment => write!(f, "path contains a '..' segment"),
        }
    }
}

impl std::error::Error for RelativePathError {}

impl RelativePath {
    pub fn new(path: impl Into<String>) -> Result<Self, RelativePathError> {
        let path = path.into();
        if path.is_empty() {
            return Err(RelativePathError::Empty);
        }
        if path.starts_with('/') {
            return Err(RelativePathError::LeadingSlash);
        }
        if path.split('/').any(|segment| segment == "..") {
            return Err(RelativePathError::ParentSegment);
        }
        Ok(RelativePath(trustframe_cjson::normalize_nfc(&path)))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strictly positive, monotone version counter used by every role.
pub type Version = NonZeroU64;

/// A `major.minor.patch` version string; only `major` participates in
/// compatibility decisions (§3.1 — only the major number is compared).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecVersion(String);

impl SpecVersion {
    #[must_use]
    pub fn major(&self) -> Option<u32> {
        self.0.split('.').next()?.parse().ok()
    }

    /// Whether this spec version is compatible with `supported_major`.
    #[must_use]
    pub fn is_compatible_with(&self, supported_major: u32) -> bool {
        self.major() == Some(supported_major)
    }
}

impl fmt::Display for SpecVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The name of a role: one of the four top-level roles, `mirrors`, or the
/// name of a delegated targets role. Kept as a plain owned string rather
/// than a closed enum because delegated role names are repository-defined.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleName(String);

impl RoleName {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        RoleName(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn filename(&self) -> String {
        format!("{}.json", self.0)
    }

    pub const ROOT: &'static str = "root";
    pub const TIMESTAMP: &'static str = "timestamp";
    pub const SNAPSHOT: &'static str = "snapshot";
    pub const TARGETS: &'static str = "targets";
    pub const MIRRORS: &'static str = "mirrors";
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoleName {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(RoleName::new(s))
    }
}

impl From<&str> for RoleName {
    fn from(s: &str) -> Self {
        RoleName::new(s)
    }
}
