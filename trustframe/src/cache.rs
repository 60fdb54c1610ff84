//! Consistent-snapshot filename conventions (§6.2) and the on-disk target
//! cache (§6.3): a verified target is trusted to sit on disk under its
//! expected name, and a cache lookup re-hashes it before handing back a
//! path, so a corrupted or tampered leftover is never treated as a hit.

use crate::error::{self, Result};
use crate::fetch::fetch_sha256;
use crate::primitives::{RoleName, Version};
use crate::{Cancel, TargetInfo, Updater};
use snafu::{OptionExt, ResultExt};
use std::path::{Path, PathBuf};

/// The on-disk filename for a role's metadata, prefixed with its version
/// under consistent-snapshot mode.
pub(crate) fn metadata_filename(role: &RoleName, consistent_snapshot: bool, version: Version) -> String {
    if consistent_snapshot {
        format!("{version}.{}", role.filename())
    } else {
        role.filename()
    }
}

/// The on-disk/URL filename for a target, prefixed with its hex digest
/// under consistent-snapshot mode (§6.2).
pub(crate) fn target_filename(consistent_snapshot: bool, sha256_hex: &str, relative_name: &str) -> String {
    if consistent_snapshot {
        format!("{sha256_hex}.{relative_name}")
    } else {
        relative_name.to_owned()
    }
}

/// Looks for a target already present under `targets_dir`, re-hashing it
/// before returning a hit. Returns `None` on any mismatch, missing file, or
/// I/O error — the caller falls back to downloading it fresh.
pub(crate) fn find_cached_target(
    targets_dir: &Path,
    consistent_snapshot: bool,
    sha256: &[u8; 32],
    relative_name: &str,
) -> Option<PathBuf> {
    let filename = target_filename(consistent_snapshot, &hex::encode(sha256), relative_name);
    let path = targets_dir.join(filename);
    let bytes = std::fs::read(&path).ok()?;
    (crate::crypto::sha256(&bytes) == *sha256).then_some(path)
}

impl Updater {
    /// Looks for `target_info`'s target already present under `targets_dir`
    /// (§6.3), re-hashing it before returning a hit so a corrupted or
    /// tampered leftover is never treated as one (§6.4).
    #[must_use]
    pub fn find_cached_target(&self, target_info: &TargetInfo, targets_dir: &Path) -> Option<PathBuf> {
        let sha256 = target_sha256(&target_info.target)?;
        let consistent_snapshot = self.trusted_set.root().signed.consistent_snapshot;
        find_cached_target(targets_dir, consistent_snapshot, &sha256, &target_info.path)
    }

    /// Downloads `target_info`'s target to `dest`, verifying its length and
    /// sha256 digest as it streams (§4.6, §6.4). `dest`'s parent directory
    /// must already exist. On any verification failure, no output file is
    /// left in a form a caller would mistake for a verified one.
    pub fn download_target(&self, target_info: &TargetInfo, dest: &Path, cancel: &dyn Cancel) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(error::Error::Cancelled);
        }
        let sha256 = target_sha256(&target_info.target).context(error::ConfigInvalidSnafu {
            field: "target.hashes.sha256",
            reason: format!("{:?} has no sha256 hash recorded", target_info.path),
        })?;
        let consistent_snapshot = self.trusted_set.root().signed.consistent_snapshot;
        let filename = target_filename(consistent_snapshot, &hex::encode(sha256), &target_info.path);
        let url = self
            .targets_base_url
            .join(&filename)
            .with_context(|_| error::JoinUrlSnafu {
                url: self.targets_base_url.clone(),
                path: filename,
            })?;

        let mut reader = fetch_sha256(
            self.transport.as_ref(),
            url,
            target_info.target.length,
            sha256,
            target_info.path.clone(),
        )?;

        let mut tmp = tempfile::NamedTempFile::new_in(dest.parent().unwrap_or_else(|| Path::new(".")))
            .context(error::TargetWriteSnafu { path: dest.to_path_buf() })?;
        std::io::copy(&mut reader, &mut tmp).context(error::TargetWriteSnafu { path: dest.to_path_buf() })?;
        tmp.persist(dest)
            .map_err(|e| e.error)
            .context(error::TargetWriteSnafu { path: dest.to_path_buf() })?;
        log::debug!("target.download.ok path={}", target_info.path);
        Ok(())
    }
}

fn target_sha256(target: &crate::schema::Target) -> Option<[u8; 32]> {
    let hex_digest = target.hashes.get("sha256")?;
    let bytes = hex::decode(hex_digest).ok()?;
    bytes.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::RoleName;
    use std::num::NonZeroU64;

    #[test]
    fn consistent_snapshot_prefixes_metadata_with_version() {
        let role = RoleName::new("targets");
        let v = NonZeroU64::new(7).unwrap();
        assert_eq!(metadata_filename(&role, true, v), "7.targets.json");
        assert_eq!(metadata_filename(&role, false, v), "targets.json");
    }

    #[test]
    fn consistent_snapshot_prefixes_targets_with_digest() {
        assert_eq!(target_filename(true, "abc123", "hello.txt"), "abc123.hello.txt");
        assert_eq!(target_filename(false, "abc123", "hello.txt"), "hello.txt");
    }

    #[test]
    fn find_cached_target_rejects_tampered_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), b"not the real bytes").unwrap();
        let expected = crate::crypto::sha256(b"hello");
        assert!(find_cached_target(dir.path(), false, &expected, "hello.txt").is_none());
    }

    #[test]
    fn find_cached_target_accepts_matching_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), b"hello").unwrap();
        let expected = crate::crypto::sha256(b"hello");
        assert!(find_cached_target(dir.path(), false, &expected, "hello.txt").is_some());
    }
}
