//! The verified in-memory model (C5): the only place untrusted bytes are
//! allowed to mutate what this crate believes about the repository. Every
//! public method here corresponds 1:1 to one of spec.md §4.4's numbered
//! transitions; the free functions in the teacher's `lib.rs`
//! (`load_root`/`load_timestamp`/`load_snapshot`/`load_targets`) are the
//! direct ancestor of this logic, regrouped behind an explicit state
//! machine so each invariant has exactly one call site that can violate it.

use crate::error::{self, Result};
use crate::primitives::RoleName;
use crate::schema::{verify_signed, MetaFile, Role, Signed, Snapshot, Targets, Timestamp};
use crate::schema::root::Root;
use chrono::{DateTime, Utc};
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::HashMap;

/// The verified state owned by one `Updater` instance (§3.3). Reading any
/// field directly is always safe: every value in here has already passed
/// its role's signature, rollback, and freshness checks as of the refresh
/// cycle that installed it.
#[derive(Debug, Clone)]
pub struct TrustedSet {
    root: Signed<Root>,
    timestamp: Option<Signed<Timestamp>>,
    snapshot: Option<Signed<Snapshot>>,
    targets: HashMap<RoleName, Signed<Targets>>,
    /// Snapshotted once per refresh cycle so every expiry check inside one
    /// cycle is evaluated against a single instant (§4.4).
    reference_time: DateTime<Utc>,
    /// When `false` (`ExpirationEnforcement::Unsafe`), expiry checks are
    /// skipped. This voids TUF's freeze-attack guarantee and is only for
    /// offline-only callers that accept that tradeoff.
    enforce_expiration: bool,
}

impl TrustedSet {
    /// §4.4.1 `init`: parse `initial_root_bytes`, verify it is self-signed
    /// by a quorum of its own listed root keys, and install it with no
    /// expiry check (the trusted root may be old; expiry is only checked
    /// once a refresh needs it).
    pub fn init(initial_root_bytes: &[u8], reference_time: DateTime<Utc>) -> Result<Self> {
        let signed: Signed<Root> = serde_json::from_slice(initial_root_bytes).map_err(|e| {
            error::InvalidInitialRootSnafu {
                reason: format!("invalid JSON: {e}"),
            }
            .build()
        })?;

        if signed.signed.type_ != Root::TYPE {
            return error::InvalidInitialRootSnafu {
                reason: format!("type field is {:?}, expected \"root\"", signed.signed.type_),
            }
            .fail();
        }
        signed.signed.validate_self_consistency().map_err(|reason| {
            error::InvalidInitialRootSnafu { reason }.build()
        })?;

        let authority = signed
            .signed
            .role_keys(RoleName::ROOT)
            .context(error::InvalidInitialRootSnafu {
                reason: "no root role entry".to_string(),
            })?
            .clone();
        verify_signed(&signed, &signed.signed.keys, &authority, &RoleName::new(RoleName::ROOT)).map_err(
            |e| {
                error::InvalidInitialRootSnafu {
                    reason: format!("self-signature check failed: {e}"),
                }
                .build()
            },
        )?;

        Ok(Self {
            root: signed,
            timestamp: None,
            snapshot: None,
            targets: HashMap::new(),
            reference_time,
            enforce_expiration: true,
        })
    }

    /// Disables expiry checks on every subsequent transition
    /// (`ExpirationEnforcement::Unsafe`). Only for offline-only callers.
    pub(crate) fn set_enforce_expiration(&mut self, enforce: bool) {
        self.enforce_expiration = enforce;
    }

    #[must_use]
    pub fn root(&self) -> &Signed<Root> {
        &self.root
    }

    #[must_use]
    pub fn timestamp(&self) -> Option<&Signed<Timestamp>> {
        self.timestamp.as_ref()
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<&Signed<Snapshot>> {
        self.snapshot.as_ref()
    }

    #[must_use]
    pub fn targets_role(&self, role: &RoleName) -> Option<&Signed<Targets>> {
        self.targets.get(role)
    }

    pub(crate) fn set_reference_time(&mut self, now: DateTime<Utc>) {
        self.reference_time = now;
    }

    #[must_use]
    pub fn reference_time(&self) -> DateTime<Utc> {
        self.reference_time
    }

    fn check_not_expired(&self, role: &RoleName, expires: DateTime<Utc>) -> Result<()> {
        if !self.enforce_expiration {
            return Ok(());
        }
        ensure!(
            expires > self.reference_time,
            error::ExpiredMetadataSnafu {
                role: role.clone(),
                expired_at: expires,
            }
        );
        Ok(())
    }

    /// §4.4.2: accept a candidate root `N+1`, signed by both the outgoing
    /// and incoming root key sets, with a strictly sequential version. Does
    /// **not** check expiry — the refresh loop calls this repeatedly and
    /// only checks expiry on the final root once the loop terminates.
    pub fn update_root(&mut self, new_root_bytes: &[u8]) -> Result<()> {
        let candidate: Signed<Root> = serde_json::from_slice(new_root_bytes)
            .context(error::ParseMetadataSnafu { what: "root".to_string() })?;
        ensure!(
            candidate.signed.type_ == Root::TYPE,
            error::ConfigInvalidSnafu {
                field: "type",
                reason: format!("expected \"root\", got {:?}", candidate.signed.type_),
            }
        );

        let current_authority = self
            .root
            .signed
            .role_keys(RoleName::ROOT)
            .context(error::ConfigInvalidSnafu {
                field: "roles.root",
                reason: "current root has no root role entry".to_string(),
            })?
            .clone();
        verify_signed(
            &candidate,
            &self.root.signed.keys,
            &current_authority,
            &RoleName::new(RoleName::ROOT),
        )?;

        candidate
            .signed
            .validate_self_consistency()
            .map_err(|reason| error::ConfigInvalidSnafu { field: "root", reason }.build())?;
        let new_authority = candidate
            .signed
            .role_keys(RoleName::ROOT)
            .context(error::ConfigInvalidSnafu {
                field: "roles.root",
                reason: "candidate root has no root role entry".to_string(),
            })?
            .clone();
        verify_signed(
            &candidate,
            &candidate.signed.keys,
            &new_authority,
            &RoleName::new(RoleName::ROOT),
        )?;

        let current_version = u64::from(self.root.signed.version);
        let new_version = u64::from(candidate.signed.version);
        ensure!(
            new_version == current_version + 1,
            error::VersionMismatchSnafu {
                role: RoleName::new(RoleName::ROOT),
                expected: current_version + 1,
                got: new_version,
            }
        );

        self.root = candidate;
        // A root rotation may have changed the timestamp/snapshot signing
        // keys; anything trusted under the old keys is no longer provably
        // authorized and must be refetched.
        self.timestamp = None;
        self.snapshot = None;
        self.targets.clear();
        Ok(())
    }

    /// Called once the root-update loop in the refresh protocol terminates
    /// (§4.5 step 1's final check).
    pub fn check_root_not_expired(&self) -> Result<()> {
        self.check_not_expired(&RoleName::new(RoleName::ROOT), self.root.signed.expires)
    }

    /// §4.4.3.
    pub fn update_timestamp(&mut self, new_timestamp_bytes: &[u8]) -> Result<()> {
        let candidate: Signed<Timestamp> = serde_json::from_slice(new_timestamp_bytes)
            .context(error::ParseMetadataSnafu { what: "timestamp".to_string() })?;

        let authority = self
            .root
            .signed
            .role_keys(RoleName::TIMESTAMP)
            .context(error::ConfigInvalidSnafu {
                field: "roles.timestamp",
                reason: "current root has no timestamp role entry".to_string(),
            })?
            .clone();
        verify_signed(
            &candidate,
            &self.root.signed.keys,
            &authority,
            &RoleName::new(RoleName::TIMESTAMP),
        )?;

        if let Some(trusted) = &self.timestamp {
            let trusted_version = u64::from(trusted.signed.version);
            let new_version = u64::from(candidate.signed.version);
            ensure!(
                new_version >= trusted_version,
                error::RollbackAttackSnafu {
                    role: RoleName::new(RoleName::TIMESTAMP),
                    trusted_version,
                    offered_version: new_version,
                }
            );

            let trusted_snapshot_version = trusted
                .signed
                .snapshot_meta()
                .map(|m| u64::from(m.version))
                .unwrap_or(0);
            let new_snapshot_version = candidate
                .signed
                .snapshot_meta()
                .map(|m| u64::from(m.version))
                .unwrap_or(0);
            ensure!(
                new_snapshot_version >= trusted_snapshot_version,
                error::RollbackAttackSnafu {
                    role: RoleName::new("timestamp.meta.snapshot"),
                    trusted_version: trusted_snapshot_version,
                    offered_version: new_snapshot_version,
                }
            );

            if new_version == trusted_version {
                // No-op: the server served the metadata we already trust.
                return Ok(());
            }
        }

        self.check_not_expired(&RoleName::new(RoleName::TIMESTAMP), candidate.signed.expires)?;
        self.timestamp = Some(candidate);
        Ok(())
    }

    /// §4.4.4.
    pub fn update_snapshot(&mut self, new_snapshot_bytes: &[u8]) -> Result<()> {
        let timestamp = self
            .timestamp
            .as_ref()
            .context(error::ConfigInvalidSnafu {
                field: "timestamp",
                reason: "no trusted timestamp; cannot update snapshot".to_string(),
            })?;
        let snapshot_meta = timestamp
            .signed
            .snapshot_meta()
            .context(error::MetaMissingSnafu { role: RoleName::new("snapshot") })?
            .clone();
        snapshot_meta.check_bytes(&RoleName::new("snapshot"), new_snapshot_bytes)?;

        let candidate: Signed<Snapshot> = serde_json::from_slice(new_snapshot_bytes)
            .context(error::ParseMetadataSnafu { what: "snapshot".to_string() })?;

        let authority = self
            .root
            .signed
            .role_keys(RoleName::SNAPSHOT)
            .context(error::ConfigInvalidSnafu {
                field: "roles.snapshot",
                reason: "current root has no snapshot role entry".to_string(),
            })?
            .clone();
        verify_signed(
            &candidate,
            &self.root.signed.keys,
            &authority,
            &RoleName::new(RoleName::SNAPSHOT),
        )?;

        let expected_version = u64::from(snapshot_meta.version);
        let got_version = u64::from(candidate.signed.version);
        ensure!(
            got_version == expected_version,
            error::VersionMismatchSnafu {
                role: RoleName::new(RoleName::SNAPSHOT),
                expected: expected_version,
                got: got_version,
            }
        );

        if let Some(previous) = &self.snapshot {
            candidate
                .signed
                .check_no_rollback(&previous.signed)
                .map_err(|(role, trusted_version, offered_version)| {
                    error::RollbackAttackSnafu {
                        role: RoleName::new(role),
                        trusted_version,
                        offered_version,
                    }
                    .build()
                })?;
        }

        self.check_not_expired(&RoleName::new(RoleName::SNAPSHOT), candidate.signed.expires)?;
        self.snapshot = Some(candidate);
        // Stale delegated-targets entries whose version is now behind
        // what the new snapshot claims must be refetched before use.
        let snapshot = self.snapshot.as_ref().unwrap();
        self.targets.retain(|name, signed| {
            snapshot
                .signed
                .meta_for(&name.filename())
                .is_some_and(|m| u64::from(m.version) == u64::from(signed.signed.version))
        });
        Ok(())
    }

    /// §4.4.5. `delegator` is `None` for the top-level targets role (whose
    /// delegator is the root itself); `Some(name)` for a delegated role,
    /// whose authorizing entry is looked up in the delegator's own
    /// `delegations.roles` list.
    pub fn update_delegated_targets(
        &mut self,
        bytes: &[u8],
        role_name: &RoleName,
        delegator: Option<&RoleName>,
    ) -> Result<()> {
        let snapshot = self
            .snapshot
            .as_ref()
            .context(error::ConfigInvalidSnafu {
                field: "snapshot",
                reason: "no trusted snapshot; cannot update targets".to_string(),
            })?;
        let meta = snapshot
            .signed
            .meta_for(&role_name.filename())
            .context(error::MetaMissingSnafu { role: role_name.clone() })?
            .clone();
        meta.check_bytes(role_name, bytes)?;

        let candidate: Signed<Targets> = serde_json::from_slice(bytes)
            .context(error::ParseMetadataSnafu { what: role_name.as_str().to_string() })?;

        match delegator {
            None => {
                let authority = self
                    .root
                    .signed
                    .role_keys(RoleName::TARGETS)
                    .context(error::ConfigInvalidSnafu {
                        field: "roles.targets",
                        reason: "current root has no targets role entry".to_string(),
                    })?
                    .clone();
                verify_signed(&candidate, &self.root.signed.keys, &authority, role_name)?;
            }
            Some(delegator_name) => {
                let delegator_targets = self.targets.get(delegator_name).context(
                    error::ConfigInvalidSnafu {
                        field: "delegator",
                        reason: format!("delegator role {delegator_name} not loaded"),
                    },
                )?;
                let delegations = delegator_targets
                    .signed
                    .delegations
                    .as_ref()
                    .context(error::ConfigInvalidSnafu {
                        field: "delegations",
                        reason: format!("{delegator_name} has no delegations block"),
                    })?;
                let delegation = delegations.role_named(role_name.as_str()).context(
                    error::DelegateNotFoundSnafu {
                        role: role_name.clone(),
                        name: role_name.clone(),
                        delegator: delegator_name.clone(),
                    },
                )?;
                let authority = crate::schema::root::RoleKeys {
                    keyids: delegation.keyids.clone(),
                    threshold: delegation.threshold,
                };
                verify_signed(&candidate, &delegations.keys, &authority, role_name)?;
            }
        }

        let expected_version = u64::from(meta.version);
        let got_version = u64::from(candidate.signed.version);
        ensure!(
            got_version == expected_version,
            error::VersionMismatchSnafu {
                role: role_name.clone(),
                expected: expected_version,
                got: got_version,
            }
        );

        self.check_not_expired(role_name, candidate.signed.expires)?;
        self.targets.insert(role_name.clone(), candidate);
        Ok(())
    }
}

