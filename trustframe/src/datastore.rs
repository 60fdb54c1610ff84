//! A local directory for the latest known-good metadata of each role, used
//! by `TrustedSet`/`refresh` to detect rollback attacks across process
//! restarts and to survive a stepped-backward system clock.

use crate::error::{self, Result};
use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use snafu::{ensure, ResultExt};
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tempfile::{NamedTempFile, TempDir};

/// `Datastore` persists TUF metadata files.
#[derive(Debug, Clone)]
pub(crate) struct Datastore {
    /// A lock around retrieving the datastore path.
    path_lock: Arc<RwLock<DatastorePath>>,
    /// A lock to treat the system_time function as a critical section.
    time_lock: Arc<RwLock<()>>,
}

impl Datastore {
    pub(crate) fn new(path: Option<PathBuf>) -> Result<Self> {
        Ok(Self {
            path_lock: Arc::new(RwLock::new(match path {
                None => DatastorePath::TempDir(TempDir::new().context(error::DatastoreInitSnafu)?),
                Some(p) => DatastorePath::Path(p),
            })),
            time_lock: Arc::new(RwLock::new(())),
        })
    }

    // Because we are not actually changing the underlying data in the lock, we can ignore when a
    // lock is poisoned.

    fn read(&self) -> RwLockReadGuard<'_, DatastorePath> {
        self.path_lock
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, DatastorePath> {
        self.path_lock
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a reader to a file in the datastore. Caution, this is *not* thread safe. A lock is
    /// briefly created on the datastore when the read object is created, but it is released at the
    /// end of this function.
    ///
    /// TODO: [provide a thread safe interface](https://github.com/awslabs/tough/issues/602)
    ///
    pub(crate) fn reader(&self, file: &str) -> Result<Option<impl Read>> {
        let path = self.read().path().join(file);
        match File::open(&path) {
            Ok(file) => Ok(Some(file)),
            Err(err) => match err.kind() {
                ErrorKind::NotFound => Ok(None),
                _ => Err(err).context(error::DatastoreOpenSnafu { path: &path }),
            },
        }
    }

    /// Writes a JSON metadata file in the datastore. Writes to a temporary
    /// file in the same directory first and renames it into place, so a
    /// reader never observes a partially written metadata file.
    pub(crate) fn create<T: Serialize>(&self, file: &str, value: &T) -> Result<()> {
        let dir_guard = self.write();
        let dir = dir_guard.path();
        let path = dir.join(file);

        let mut tmp = NamedTempFile::new_in(dir).context(error::DatastoreCreateSnafu { path: &path })?;
        serde_json::to_writer_pretty(&mut tmp, value).context(error::DatastoreSerializeSnafu {
            what: format!("{file} in datastore"),
            path: path.clone(),
        })?;
        tmp.persist(&path)
            .context(error::DatastorePersistSnafu { path })?;
        Ok(())
    }

    /// Writes already-serialized bytes to the datastore atomically. Used for
    /// verified metadata envelopes, where re-serializing through `Serialize`
    /// would risk producing bytes other than the ones that were actually
    /// signature-checked.
    pub(crate) fn write_bytes(&self, file: &str, bytes: &[u8]) -> Result<()> {
        let dir_guard = self.write();
        let dir = dir_guard.path();
        let path = dir.join(file);

        let mut tmp = NamedTempFile::new_in(dir).context(error::DatastoreCreateSnafu { path: &path })?;
        tmp.write_all(bytes)
            .context(error::DatastoreCreateSnafu { path: &path })?;
        tmp.persist(&path)
            .context(error::DatastorePersistSnafu { path })?;
        Ok(())
    }

    /// Deletes a file from the datastore. This function is thread safe.
    pub(crate) fn remove(&self, file: &str) -> Result<()> {
        let path = self.write().path().join(file);
        debug!("removing '{}'", path.display());
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) => match err.kind() {
                ErrorKind::NotFound => Ok(()),
                _ => Err(err).context(error::DatastoreRemoveSnafu { path: &path }),
            },
        }
    }

    /// Ensures that system time has not stepped backward since it was last sampled. This function
    /// is protected by a lock guard to ensure thread safety.
    pub(crate) fn system_time(&self) -> Result<DateTime<Utc>> {
        // Treat this function as a critical section. This lock is not used for anything else.
        let lock = self.time_lock.write().map_err(|e| {
            // Painful error type that has a reference and lifetime. Convert it to a message string.
            error::DatastoreTimeLockSnafu {
                message: e.to_string(),
            }
            .build()
        })?;

        let file = "latest_known_time.json";
        // Load the latest known system time, if it exists
        let poss_latest_known_time = self
            .reader(file)?
            .map(serde_json::from_reader::<_, DateTime<Utc>>);

        // Get 'current' system time
        let sys_time = Utc::now();

        if let Some(Ok(latest_known_time)) = poss_latest_known_time {
            // Make sure the sampled system time did not go back in time
            ensure!(
                sys_time >= latest_known_time,
                error::SystemTimeSteppedBackwardSnafu {
                    sys_time,
                    latest_known_time
                }
            );
        }
        // Store the latest known time
        // Serializes RFC3339 time string and store to datastore
        self.create(file, &sys_time)?;

        // Explicitly drop the lock to avoid any compiler optimization.
        drop(lock);
        Ok(sys_time)
    }
}

/// Because `TempDir` is an RAII object, we need to hold on to it. This private enum allows us to
/// hold either a `TempDir` or a `PathBuf` depending on whether or not the user wants to manage the
/// directory.
#[derive(Debug)]
enum DatastorePath {
    /// Path to a user-managed directory.
    Path(PathBuf),
    /// A `TempDir` that we created on the user's behalf.
    TempDir(TempDir),
}

impl DatastorePath {
    /// Provides convenient access to the underlying filepath.
    fn path(&self) -> &Path {
        match self {
            DatastorePath::Path(p) => p,
            DatastorePath::TempDir(t) => t.path(),
        }
    }
}
