//! `trustframe` is a client library for verifying [TUF repositories].
//!
//! It implements [TUF version 1.0.0][spec]: root/timestamp/snapshot/targets
//! metadata verification, delegated targets, consistent-snapshot mode, and
//! rollback/freeze/mix-and-match/arbitrary-software attack defenses. It does
//! not implement repository authoring or signing (out of scope: clients
//! consume repositories, they don't build them).
//!
//! [TUF repositories]: https://theupdateframework.github.io/
//! [spec]: https://github.com/theupdateframework/specification/blob/9f148556ca15da2ec5c022c8b3e6f99a028e5fe5/tuf-spec.md
//!
//! # Testing
//!
//! Unit tests are run in the usual manner: `cargo test`. HTTP-transport
//! tests require the `http` feature, which is enabled by default.

#![forbid(missing_debug_implementations, missing_copy_implementations)]
#![deny(rust_2018_idioms)]
// missing_docs is on its own line to make it easy to comment out when making changes.
// #![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc
)]

mod cache;
mod crypto;
mod datastore;
pub mod error;
mod fetch;
#[cfg(feature = "http")]
pub mod http;
mod io;
pub mod primitives;
mod refresh;
mod resolver;
pub mod schema;
mod transport;
mod trusted_set;
mod urlpath;

use crate::datastore::Datastore;
use crate::error::Result;
#[cfg(feature = "http")]
pub use crate::http::{ClientSettings, HttpTransport};
pub use crate::primitives::{KeyId, RelativePath, RoleName, Signature, Version};
pub use crate::schema::Target;
pub use crate::transport::{DefaultTransport, FilesystemTransport, Transport, TransportError, TransportErrorKind};
pub use crate::trusted_set::TrustedSet;
use percent_encoding::{percent_encode, AsciiSet, CONTROLS};
use std::io::Read;
use std::path::PathBuf;
use url::Url;

/// Percent-encodes `name` so it can be joined onto a base URL as a single
/// opaque path segment. Encodes `/` (so an embedded path separator can't
/// split into extra segments after the URL parser normalizes them) and `%`
/// (so an already-percent-encoded sequence in `name` can't be re-interpreted
/// after a round trip). Used wherever a role or target name of untrusted
/// provenance is turned into a URL or a datastore filename.
#[must_use]
pub(crate) fn encode_filename(name: &str) -> String {
    const ENCODE_SET: &AsciiSet = &CONTROLS.add(b'/').add(b'%');
    percent_encode(name.as_bytes(), ENCODE_SET).to_string()
}

/// A cancellation signal threaded through `refresh` and `download_target`
/// (§5). Checked at suspension points (before each network fetch); a
/// cancelled operation leaves the trusted set and on-disk cache exactly as
/// they were before the call.
pub trait Cancel {
    /// Returns `true` once the operation carrying this signal should stop.
    fn is_cancelled(&self) -> bool;
}

impl<F> Cancel for F
where
    F: Fn() -> bool,
{
    fn is_cancelled(&self) -> bool {
        self()
    }
}

/// A `Cancel` that never fires. Use this when the caller has no cancellation
/// mechanism of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

impl Cancel for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Whether metadata expiration is enforced (§3.6, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpirationEnforcement {
    /// Expired metadata is rejected. You MUST use this to get TUF's
    /// freeze-attack guarantee.
    Safe,

    /// Expired metadata is accepted. Voids the freeze-attack guarantee; only
    /// for offline-only callers that have already accepted that tradeoff.
    Unsafe,
}

impl Default for ExpirationEnforcement {
    fn default() -> Self {
        ExpirationEnforcement::Safe
    }
}

/// Resource caps applied while fetching metadata and targets (§5).
///
/// The [`Default`] implementation sets:
/// * `root_max_length`: 512 KiB
/// * `timestamp_max_length`: 16 KiB
/// * `snapshot_max_length`: 2 MiB
/// * `targets_max_length`: 5 MiB
/// * `max_root_rotations`: 32
/// * `max_delegations`: 32
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Maximum allowed size in bytes of a downloaded root.json.
    pub root_max_length: u64,
    /// Maximum allowed size in bytes of a downloaded timestamp.json.
    pub timestamp_max_length: u64,
    /// Maximum allowed size in bytes of a downloaded snapshot.json, when its
    /// size is not given by timestamp.json.
    pub snapshot_max_length: u64,
    /// Maximum allowed size in bytes of a downloaded targets.json (or a
    /// delegated targets file), when its size is not given by snapshot.json.
    pub targets_max_length: u64,
    /// Maximum number of root.json versions fetched in one root-chain
    /// update (§4.5 step 1).
    pub max_root_rotations: u64,
    /// Maximum delegation depth walked while resolving a target (§4.6).
    pub max_delegations: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            root_max_length: 512 * 1024,
            timestamp_max_length: 16 * 1024,
            snapshot_max_length: 2 * 1024 * 1024,
            targets_max_length: 5 * 1024 * 1024,
            max_root_rotations: 32,
            max_delegations: 32,
        }
    }
}

/// Construction-time configuration for an [`Updater`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Resource caps applied to every fetch.
    pub limits: Limits,
    /// Whether to enforce metadata expiration.
    pub expiration_enforcement: ExpirationEnforcement,
    /// A directory on a persistent filesystem where the most recently
    /// verified metadata is cached, to detect rollback attacks and survive
    /// a stepped-backward clock across process restarts. `None` uses a
    /// process-local temporary directory (no cross-restart protection).
    pub datastore_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            expiration_enforcement: ExpirationEnforcement::default(),
            datastore_dir: None,
        }
    }
}

/// A TUF client: holds the currently trusted metadata and drives the
/// refresh and target-resolution protocols against it (§3.3, §4).
///
/// Construct with [`Updater::init`]; refresh with [`Updater::refresh`];
/// then resolve and download targets with [`Updater::get_target_info`] and
/// [`Updater::download_target`].
#[derive(Debug)]
pub struct Updater {
    pub(crate) transport: Box<dyn Transport>,
    pub(crate) metadata_base_url: Url,
    pub(crate) targets_base_url: Url,
    pub(crate) datastore: Datastore,
    pub(crate) limits: Limits,
    pub(crate) expiration_enforcement: ExpirationEnforcement,
    pub(crate) trusted_set: TrustedSet,
}

impl Updater {
    /// Establishes initial trust from `root`, a reader over a root.json that
    /// you ship with your software via an out-of-band process (§4.4.1). It's
    /// fine for this file to be old; `refresh` walks the root chain forward
    /// to the repository's current root.
    ///
    /// `metadata_base_url` and `targets_base_url` are the HTTP(S) or `file://`
    /// base URLs where metadata and targets, respectively, can be found
    /// (§6.2). No network or disk access beyond `root` and the datastore
    /// happens until `refresh` is called.
    pub fn init<R: Read>(
        mut root: R,
        metadata_base_url: &str,
        targets_base_url: &str,
        transport: impl Transport + 'static,
        config: Config,
    ) -> Result<Self> {
        let mut root_bytes = Vec::new();
        root.read_to_end(&mut root_bytes)
            .map_err(|e| error::InvalidInitialRootSnafu { reason: format!("failed to read: {e}") }.build())?;

        let metadata_base_url = parse_base_url(metadata_base_url, "metadata_base_url")?;
        let targets_base_url = parse_base_url(targets_base_url, "targets_base_url")?;

        let datastore = Datastore::new(config.datastore_dir)?;
        let now = datastore.system_time()?;
        let trusted_set = TrustedSet::init(&root_bytes, now)?;
        datastore.write_bytes("root.json", &root_bytes)?;

        log::debug!("updater.init metadata_base_url={metadata_base_url} targets_base_url={targets_base_url}");
        Ok(Self {
            transport: Box::new(transport),
            metadata_base_url,
            targets_base_url,
            datastore,
            limits: config.limits,
            expiration_enforcement: config.expiration_enforcement,
            trusted_set,
        })
    }

    /// The currently trusted metadata (§3.3). Always safe to read, even
    /// before the first `refresh` — it reflects at minimum the root passed
    /// to `init`.
    #[must_use]
    pub fn trusted_set(&self) -> &TrustedSet {
        &self.trusted_set
    }
}

/// The result of resolving a target path (§4.6): which role's inventory
/// covers it, and the length/hash record a downloaded copy must match.
#[derive(Debug, Clone)]
pub struct TargetInfo {
    /// The target path, as passed to [`Updater::get_target_info`].
    pub path: String,
    /// The (possibly delegated) targets role whose inventory listed this
    /// target.
    pub role: RoleName,
    /// The length and hashes a downloaded copy must match.
    pub target: Target,
}

fn parse_base_url(raw: &str, field: &'static str) -> Result<Url> {
    let mut url: Url = raw.parse().map_err(|e: url::ParseError| {
        error::ConfigInvalidSnafu { field, reason: e.to_string() }.build()
    })?;
    if !url.path().ends_with('/') {
        url.set_path(&format!("{}/", url.path()));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_filename_escapes_slash_and_percent() {
        assert_eq!(encode_filename("a/b"), "a%2Fb");
        assert_eq!(encode_filename("100%"), "100%25");
        assert_eq!(encode_filename("plain.json"), "plain.json");
    }

    #[test]
    fn limits_defaults_match_resource_caps() {
        let limits = Limits::default();
        assert_eq!(limits.root_max_length, 512 * 1024);
        assert_eq!(limits.timestamp_max_length, 16 * 1024);
        assert_eq!(limits.snapshot_max_length, 2 * 1024 * 1024);
        assert_eq!(limits.targets_max_length, 5 * 1024 * 1024);
        assert_eq!(limits.max_root_rotations, 32);
        assert_eq!(limits.max_delegations, 32);
    }

    #[test]
    fn never_cancel_never_fires() {
        assert!(!NeverCancel.is_cancelled());
    }

    #[test]
    fn closure_cancel_reads_through() {
        let cancelled = std::cell::Cell::new(false);
        let cancel = || cancelled.get();
        assert!(!Cancel::is_cancelled(&cancel));
        cancelled.set(true);
        assert!(Cancel::is_cancelled(&cancel));
    }

    #[test]
    fn parse_base_url_adds_trailing_slash() {
        let url = parse_base_url("https://example.com/metadata", "metadata_base_url").unwrap();
        assert_eq!(url.as_str(), "https://example.com/metadata/");
    }

    #[test]
    fn parse_base_url_rejects_garbage() {
        assert!(parse_base_url("not a url", "metadata_base_url").is_err());
    }
}
