//! Target resolution (C7, §4.6): a pre-order walk of the delegation DAG
//! starting at the top-level `targets` role, loading delegated roles on
//! demand and honoring terminating delegations and declaration order.

use crate::cache::metadata_filename;
use crate::error::{self, Result};
use crate::fetch::fetch_max_size_to_vec;
use crate::primitives::RoleName;
use crate::schema::Target;
use crate::{TargetInfo, Updater};
use snafu::{OptionExt, ResultExt};
use std::collections::HashSet;

impl Updater {
    /// Resolves `target_path` against the currently trusted metadata,
    /// fetching and verifying any delegated targets role needed along the
    /// way. Fails `TargetNotFound` if no role's inventory (nor any
    /// delegation path) covers `target_path`.
    pub fn get_target_info(&mut self, target_path: &str) -> Result<TargetInfo> {
        let mut visited = HashSet::new();
        let mut active = Vec::new();
        let (role, target) = self
            .resolve(&RoleName::new(RoleName::TARGETS), None, target_path, &mut visited, &mut active, 0)?
            .context(error::TargetNotFoundSnafu { path: target_path.to_string() })?;
        Ok(TargetInfo { path: target_path.to_string(), role, target })
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve(
        &mut self,
        role: &RoleName,
        delegator: Option<&RoleName>,
        target_path: &str,
        visited: &mut HashSet<RoleName>,
        active: &mut Vec<RoleName>,
        depth: u32,
    ) -> Result<Option<(RoleName, Target)>> {
        if depth > self.limits.max_delegations {
            return error::MaxDelegationsExceededSnafu {
                path: target_path.to_string(),
                max: self.limits.max_delegations,
            }
            .fail();
        }
        if active.contains(role) {
            return error::DelegationLoopSnafu {
                path: target_path.to_string(),
                role: role.clone(),
            }
            .fail();
        }
        if !visited.insert(role.clone()) {
            return Ok(None);
        }

        self.ensure_targets_loaded(role, delegator)?;
        let signed = self
            .trusted_set
            .targets_role(role)
            .expect("ensure_targets_loaded just installed this role")
            .clone();

        if let Ok(relative) = crate::primitives::RelativePath::new(target_path) {
            if let Some(target) = signed.signed.targets.get(&relative) {
                log::debug!("target.resolved path={target_path} role={role}");
                return Ok(Some((role.clone(), target.clone())));
            }
        }

        let Some(delegations) = &signed.signed.delegations else {
            return Ok(None);
        };

        active.push(role.clone());
        for delegation in &delegations.roles {
            if !delegation.matches(target_path) {
                continue;
            }
            let child = delegation.role_name();
            let found = self.resolve(&child, Some(role), target_path, visited, active, depth + 1)?;
            if found.is_some() {
                active.pop();
                return Ok(found);
            }
            if delegation.terminating {
                active.pop();
                return Ok(None);
            }
        }
        active.pop();
        Ok(None)
    }

    /// Loads and verifies `role`'s targets metadata if it isn't already in
    /// the trusted set. A no-op for roles already loaded by `refresh`.
    fn ensure_targets_loaded(&mut self, role: &RoleName, delegator: Option<&RoleName>) -> Result<()> {
        if self.trusted_set.targets_role(role).is_some() {
            return Ok(());
        }
        let consistent_snapshot = self.trusted_set.root().signed.consistent_snapshot;
        let meta = self
            .trusted_set
            .snapshot()
            .and_then(|s| s.signed.meta_for(&role.filename()))
            .context(error::MetaMissingSnafu { role: role.clone() })?
            .clone();
        let filename = metadata_filename(role, consistent_snapshot, meta.version);
        let url = self
            .metadata_base_url
            .join(&filename)
            .with_context(|_| error::JoinUrlSnafu {
                url: self.metadata_base_url.clone(),
                path: filename.clone(),
            })?;
        let max_size = meta
            .length
            .map_or(self.limits.targets_max_length, |l| l.min(self.limits.targets_max_length));
        let bytes = fetch_max_size_to_vec(self.transport.as_ref(), url, max_size)?;
        self.trusted_set.update_delegated_targets(&bytes, role, delegator)?;
        self.datastore.write_bytes(&format!("{}.json", role.as_str()), &bytes)?;
        log::debug!("delegated_targets.updated role={role}");
        Ok(())
    }
}
