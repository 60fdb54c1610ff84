//! Drives `TrustedSet` through the refresh protocol (C6, §4.5): root chain,
//! timestamp, snapshot, top-level targets, strictly in that order, with the
//! whole cycle atomic — any failure leaves both the in-memory trusted set
//! and the on-disk cache exactly as they were before the call.

use crate::cache::metadata_filename;
use crate::error::{self, Result};
use crate::fetch::fetch_max_size_to_vec;
use crate::primitives::RoleName;
use crate::{Cancel, Updater};
use snafu::{OptionExt, ResultExt};

impl Updater {
    /// Runs one full refresh cycle (§4.5 steps 1-4). On success, the new
    /// metadata is both installed in memory and persisted to the datastore.
    /// On any error, neither changes: the trusted set and the on-disk cache
    /// are left exactly as they were when this was called.
    pub fn refresh(&mut self, cancel: &dyn Cancel) -> Result<()> {
        log::debug!("refresh.start");
        let now = self.datastore.system_time()?;

        let mut working = self.trusted_set.clone();
        working.set_reference_time(now);
        working.set_enforce_expiration(self.expiration_enforcement == crate::ExpirationEnforcement::Safe);

        let mut to_persist: Vec<(String, Vec<u8>)> = Vec::new();

        self.refresh_root_chain(cancel, &mut working, &mut to_persist)?;
        self.refresh_timestamp(cancel, &mut working, &mut to_persist)?;
        self.refresh_snapshot(cancel, &mut working, &mut to_persist)?;
        self.refresh_top_level_targets(cancel, &mut working, &mut to_persist)?;

        for (filename, bytes) in &to_persist {
            self.datastore.write_bytes(filename, bytes)?;
        }
        self.trusted_set = working;
        log::debug!("refresh.ok");
        Ok(())
    }

    fn check_cancelled(cancel: &dyn Cancel) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(error::Error::Cancelled);
        }
        Ok(())
    }

    fn refresh_root_chain(
        &self,
        cancel: &dyn Cancel,
        working: &mut crate::TrustedSet,
        to_persist: &mut Vec<(String, Vec<u8>)>,
    ) -> Result<()> {
        let current_version = u64::from(working.root().signed.version);
        let ceiling = current_version + self.limits.max_root_rotations;
        for candidate_version in (current_version + 1)..=ceiling {
            Self::check_cancelled(cancel)?;
            let filename = format!("{candidate_version}.root.json");
            let url = self
                .metadata_base_url
                .join(&filename)
                .with_context(|_| error::JoinUrlSnafu {
                    url: self.metadata_base_url.clone(),
                    path: filename.clone(),
                })?;
            let bytes = match fetch_max_size_to_vec(self.transport.as_ref(), url.clone(), self.limits.root_max_length) {
                Ok(bytes) => bytes,
                Err(error::Error::FetchFailed { source })
                    if source.kind == crate::transport::TransportErrorKind::FileNotFound =>
                {
                    break;
                }
                Err(e) => return Err(e),
            };
            working.update_root(&bytes)?;
            log::debug!("root.updated version={candidate_version}");
            to_persist.push((filename, bytes));
        }
        working.check_root_not_expired()
    }

    fn refresh_timestamp(
        &self,
        cancel: &dyn Cancel,
        working: &mut crate::TrustedSet,
        to_persist: &mut Vec<(String, Vec<u8>)>,
    ) -> Result<()> {
        Self::check_cancelled(cancel)?;
        let filename = "timestamp.json";
        let url = self
            .metadata_base_url
            .join(filename)
            .with_context(|_| error::JoinUrlSnafu {
                url: self.metadata_base_url.clone(),
                path: filename.to_string(),
            })?;
        let bytes = fetch_max_size_to_vec(self.transport.as_ref(), url, self.limits.timestamp_max_length)?;
        working.update_timestamp(&bytes).map_err(|e| {
            if matches!(e, error::Error::RollbackAttack { .. }) {
                log::warn!("timestamp.rejected.rollback");
            }
            e
        })?;
        log::debug!("timestamp.updated");
        to_persist.push((filename.to_string(), bytes));
        Ok(())
    }

    fn refresh_snapshot(
        &self,
        cancel: &dyn Cancel,
        working: &mut crate::TrustedSet,
        to_persist: &mut Vec<(String, Vec<u8>)>,
    ) -> Result<()> {
        Self::check_cancelled(cancel)?;
        let consistent_snapshot = working.root().signed.consistent_snapshot;
        let snapshot_meta = working
            .timestamp()
            .and_then(|t| t.signed.snapshot_meta())
            .context(error::MetaMissingSnafu { role: RoleName::new(RoleName::SNAPSHOT) })?
            .clone();
        let filename = metadata_filename(&RoleName::new(RoleName::SNAPSHOT), consistent_snapshot, snapshot_meta.version);
        let url = self
            .metadata_base_url
            .join(&filename)
            .with_context(|_| error::JoinUrlSnafu {
                url: self.metadata_base_url.clone(),
                path: filename.clone(),
            })?;
        let max_size = snapshot_meta.length.map_or(self.limits.snapshot_max_length, |l| {
            l.min(self.limits.snapshot_max_length)
        });
        let bytes = fetch_max_size_to_vec(self.transport.as_ref(), url, max_size)?;
        working.update_snapshot(&bytes)?;
        log::debug!("snapshot.updated");
        to_persist.push(("snapshot.json".to_string(), bytes));
        Ok(())
    }

    fn refresh_top_level_targets(
        &self,
        cancel: &dyn Cancel,
        working: &mut crate::TrustedSet,
        to_persist: &mut Vec<(String, Vec<u8>)>,
    ) -> Result<()> {
        Self::check_cancelled(cancel)?;
        let consistent_snapshot = working.root().signed.consistent_snapshot;
        let role = RoleName::new(RoleName::TARGETS);
        let meta = working
            .snapshot()
            .and_then(|s| s.signed.meta_for(&role.filename()))
            .context(error::MetaMissingSnafu { role: role.clone() })?
            .clone();
        let filename = metadata_filename(&role, consistent_snapshot, meta.version);
        let url = self
            .metadata_base_url
            .join(&filename)
            .with_context(|_| error::JoinUrlSnafu {
                url: self.metadata_base_url.clone(),
                path: filename.clone(),
            })?;
        let max_size = meta.length.map_or(self.limits.targets_max_length, |l| l.min(self.limits.targets_max_length));
        let bytes = fetch_max_size_to_vec(self.transport.as_ref(), url, max_size)?;
        working.update_delegated_targets(&bytes, &role, None)?;
        log::debug!("targets.updated");
        to_persist.push(("targets.json".to_string(), bytes));
        Ok(())
    }
}
