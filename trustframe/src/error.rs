//! The error type returned by every fallible operation in this crate.
//!
//! Each variant corresponds to one of the error kinds cataloged for this
//! domain: callers are expected to match on specific variants (a rollback
//! attack is not the same condition as an expired timestamp, even though
//! both abort a refresh) rather than treat this as an opaque failure.

use crate::primitives::{KeyId, RoleName};
use chrono::{DateTime, Utc};
use snafu::{Backtrace, Snafu};
use std::path::PathBuf;
use url::Url;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[allow(missing_docs)]
pub enum Error {
    #[snafu(display("initial root was not a valid self-signed trust anchor: {reason}"))]
    InvalidInitialRoot { reason: String },

    #[snafu(display("failed to canonicalize {what} for signing: {source}"))]
    CanonicalEncoding {
        what: &'static str,
        source: trustframe_cjson::Error,
    },

    #[snafu(display("key {keyid} uses an unsupported (keytype, scheme) pair: {keytype}/{scheme}"))]
    UnsupportedKey {
        keyid: KeyId,
        keytype: String,
        scheme: String,
    },

    #[snafu(display("signature by key {keyid} over {role} did not verify"))]
    SignatureInvalid { role: RoleName, keyid: KeyId },

    #[snafu(display(
        "{role} has {got} valid signature(s), needs {required} (threshold not met)"
    ))]
    InsufficientSignatures {
        role: RoleName,
        got: usize,
        required: u64,
    },

    #[snafu(display("{role} expired at {expired_at}"))]
    ExpiredMetadata {
        role: RoleName,
        expired_at: DateTime<Utc>,
    },

    #[snafu(display(
        "rollback attack detected on {role}: trusted version {trusted_version}, offered {offered_version}"
    ))]
    RollbackAttack {
        role: RoleName,
        trusted_version: u64,
        offered_version: u64,
    },

    #[snafu(display("{role} version mix-and-match violation: {detail}"))]
    MixAndMatchViolation { role: RoleName, detail: String },

    #[snafu(display("{role} version mismatch: expected {expected}, got {got}"))]
    VersionMismatch {
        role: RoleName,
        expected: u64,
        got: u64,
    },

    #[snafu(display("response for {url} exceeded the {limit}-byte size limit"))]
    OversizedResponse { url: Url, limit: u64 },

    #[snafu(display("target {path:?} not found"))]
    TargetNotFound { path: String },

    #[snafu(display("target {path:?} hash mismatch: expected {expected}, got {got}"))]
    TargetHashMismatch {
        path: String,
        expected: String,
        got: String,
    },

    #[snafu(display("target {path:?} length mismatch: expected {expected}, got {got}"))]
    TargetLengthMismatch {
        path: String,
        expected: u64,
        got: u64,
    },

    #[snafu(display("exceeded the maximum of {max} nested delegations while resolving {path:?}"))]
    MaxDelegationsExceeded { path: String, max: u32 },

    #[snafu(display("delegation loop detected at role {role} while resolving {path:?}"))]
    DelegationLoop { path: String, role: RoleName },

    #[snafu(display("fetch failed: {source}"), context(false))]
    FetchFailed {
        source: crate::transport::TransportError,
    },

    #[snafu(display("operation cancelled"))]
    Cancelled,

    #[snafu(display("invalid configuration for {field}: {reason}"))]
    ConfigInvalid { field: &'static str, reason: String },

    #[snafu(display("failed to parse {what} as JSON: {source}"))]
    ParseMetadata {
        what: String,
        source: serde_json::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("failed to join {path:?} onto {url}: {source}"))]
    JoinUrl {
        url: Url,
        path: String,
        source: url::ParseError,
    },

    #[snafu(display("{role} references delegation {name} not present in {delegator}"))]
    DelegateNotFound { role: RoleName, name: RoleName, delegator: RoleName },

    #[snafu(display("snapshot.json has no entry for {role}"))]
    MetaMissing { role: RoleName },

    #[snafu(display("failed to initialize datastore: {source}"))]
    DatastoreInit {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("failed to open {path:?} in datastore: {source}"))]
    DatastoreOpen {
        path: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("failed to create {path:?} in datastore: {source}"))]
    DatastoreCreate {
        path: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("failed to atomically persist {path:?}: {source}"))]
    DatastorePersist {
        path: PathBuf,
        source: tempfile::PersistError,
        backtrace: Backtrace,
    },

    #[snafu(display("failed to serialize {what} to {path:?}: {source}"))]
    DatastoreSerialize {
        what: String,
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("failed to remove {path:?} from datastore: {source}"))]
    DatastoreRemove {
        path: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("failed to acquire datastore time lock: {message}"))]
    DatastoreTimeLock { message: String },

    #[snafu(display(
        "system time stepped backward: now {sys_time}, last observed {latest_known_time}"
    ))]
    SystemTimeSteppedBackward {
        sys_time: DateTime<Utc>,
        latest_known_time: DateTime<Utc>,
    },

    #[snafu(display("{path:?} is outside the targets directory"))]
    TargetPathUnsafe { path: PathBuf },

    #[snafu(display("failed to write target {path:?}: {source}"))]
    TargetWrite {
        path: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },
}

impl Error {
    /// True when this error represents a deliberate, non-retriable
    /// rejection of untrusted metadata (as opposed to a transient I/O
    /// failure). Used by hosts deciding whether a retry is ever worthwhile.
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Error::SignatureInvalid { .. }
                | Error::InsufficientSignatures { .. }
                | Error::ExpiredMetadata { .. }
                | Error::RollbackAttack { .. }
                | Error::MixAndMatchViolation { .. }
                | Error::VersionMismatch { .. }
                | Error::TargetHashMismatch { .. }
                | Error::TargetLengthMismatch { .. }
                | Error::MaxDelegationsExceeded { .. }
                | Error::DelegationLoop { .. }
        )
    }
}
