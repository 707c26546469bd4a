//! Durable set of known wireless endpoints.
//!
//! The file holds `{"wireless_ips": ["a.b.c.d:port", ...]}` and is only ever replaced
//! wholesale: writes go to a unique temp file in the same directory, are synced, and are
//! renamed over the real file while the sibling `.lock` file is held exclusively. Readers
//! take the same lock shared. An in-process mutex serialises every read-modify-write so two
//! workers of this process can never interleave.

use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::app::endpoint::{is_network_endpoint, DeviceEndpoint};
use crate::app::error::AppError;
use crate::app::file_lock::{lock_shared, try_lock_exclusive, AdvisoryLock, PlatformLock};

const ENDPOINTS_FIELD: &str = "wireless_ips";
const LOCK_ATTEMPTS: usize = 10;
const LOCK_BACKOFF: Duration = Duration::from_millis(20);

#[derive(Debug, Serialize)]
struct PersistedState<'a> {
    wireless_ips: Vec<&'a str>,
}

#[derive(Debug)]
enum ReadOutcome {
    Missing,
    Corrupted(String),
    Invalid(String),
    Loaded(Vec<DeviceEndpoint>),
}

pub struct StateStore {
    path: PathBuf,
    lock_path: PathBuf,
    locker: Arc<dyn AdvisoryLock>,
    write_gate: Mutex<()>,
    lock_attempts: usize,
    lock_backoff: Duration,
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "known_devices.json".to_string());
    path.with_file_name(format!("{name}{suffix}"))
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_locker(path, Arc::new(PlatformLock))
    }

    pub fn with_locker(path: impl Into<PathBuf>, locker: Arc<dyn AdvisoryLock>) -> Self {
        let path = path.into();
        Self {
            lock_path: sibling(&path, ".lock"),
            path,
            locker,
            write_gate: Mutex::new(()),
            lock_attempts: LOCK_ATTEMPTS,
            lock_backoff: LOCK_BACKOFF,
        }
    }

    pub fn corrupted_backup_path(&self) -> PathBuf {
        sibling(&self.path, ".corrupted")
    }

    fn gate(&self) -> MutexGuard<'_, ()> {
        self.write_gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Returns the persisted endpoints, recovering from a missing or corrupted file.
    pub fn load(&self, trace_id: &str) -> Vec<DeviceEndpoint> {
        let gate = self.gate();
        self.read_recovering(&gate, trace_id)
    }

    /// Replaces the persisted set. Invalid and duplicate entries are dropped first.
    pub fn save(&self, endpoints: &[DeviceEndpoint], trace_id: &str) -> Result<(), AppError> {
        let gate = self.gate();
        let cleaned = sanitize(endpoints.iter(), trace_id);
        self.write_locked(&gate, &cleaned, trace_id)
    }

    /// Unions `new_endpoints` into the persisted set and writes it back. Returns the merged
    /// set on success.
    pub fn merge(
        &self,
        new_endpoints: &[DeviceEndpoint],
        trace_id: &str,
    ) -> Result<Vec<DeviceEndpoint>, AppError> {
        let gate = self.gate();
        let current = self.read_recovering(&gate, trace_id);
        let merged = sanitize(current.iter().chain(new_endpoints.iter()), trace_id);
        self.write_locked(&gate, &merged, trace_id)?;
        debug!(
            trace_id = %trace_id,
            before = current.len(),
            after = merged.len(),
            "merged known endpoints"
        );
        Ok(merged)
    }

    fn read_recovering(&self, gate: &MutexGuard<'_, ()>, trace_id: &str) -> Vec<DeviceEndpoint> {
        match self.read_state(trace_id) {
            ReadOutcome::Loaded(endpoints) => endpoints,
            ReadOutcome::Missing => {
                info!(trace_id = %trace_id, path = %self.path.display(), "state file missing; initialising");
                if let Err(err) = self.write_locked(gate, &[], trace_id) {
                    warn!(trace_id = %trace_id, error = %err, "failed to initialise state file");
                }
                Vec::new()
            }
            ReadOutcome::Corrupted(reason) => {
                let err = AppError::persist_corruption(reason, trace_id);
                info!(
                    trace_id = %trace_id,
                    path = %self.path.display(),
                    error = %err,
                    "state file corrupted; backing up and resetting"
                );
                let backup = self.corrupted_backup_path();
                if let Err(copy_err) = fs::copy(&self.path, &backup) {
                    warn!(
                        trace_id = %trace_id,
                        backup = %backup.display(),
                        error = %copy_err,
                        "failed to back up corrupted state file"
                    );
                }
                if let Err(write_err) = self.write_locked(gate, &[], trace_id) {
                    warn!(trace_id = %trace_id, error = %write_err, "failed to reset state file");
                }
                Vec::new()
            }
            ReadOutcome::Invalid(reason) => {
                let err = AppError::persist_validation(reason, trace_id);
                warn!(
                    trace_id = %trace_id,
                    path = %self.path.display(),
                    error = %err,
                    "state file has an unexpected shape; ignoring its contents"
                );
                Vec::new()
            }
        }
    }

    fn read_state(&self, trace_id: &str) -> ReadOutcome {
        let _shared = if self.state_dir().is_dir() {
            lock_shared(&self.lock_path, &self.locker)
        } else {
            None
        };

        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return ReadOutcome::Missing,
            Err(err) => return ReadOutcome::Invalid(format!("state file unreadable: {err}")),
        };
        let value: Value = match serde_json::from_slice(&raw) {
            Ok(value) => value,
            Err(err) => return ReadOutcome::Corrupted(format!("invalid JSON: {err}")),
        };
        let Some(object) = value.as_object() else {
            return ReadOutcome::Invalid("top-level value is not an object".to_string());
        };
        let entries = match object.get(ENDPOINTS_FIELD) {
            None => return ReadOutcome::Loaded(Vec::new()),
            Some(Value::Array(entries)) => entries,
            Some(_) => return ReadOutcome::Invalid(format!("`{ENDPOINTS_FIELD}` is not a list")),
        };

        let candidates = entries
            .iter()
            .filter_map(|entry| match entry.as_str() {
                Some(text) => Some(DeviceEndpoint::new(text)),
                None => {
                    warn!(trace_id = %trace_id, entry = %entry, "dropping non-string state entry");
                    None
                }
            })
            .collect::<Vec<_>>();
        ReadOutcome::Loaded(sanitize(candidates.iter(), trace_id))
    }

    fn write_locked(
        &self,
        _gate: &MutexGuard<'_, ()>,
        endpoints: &[DeviceEndpoint],
        trace_id: &str,
    ) -> Result<(), AppError> {
        let dir = self.state_dir();
        fs::create_dir_all(&dir).map_err(|err| {
            AppError::system(format!("Failed to create state directory: {err}"), trace_id)
        })?;

        let state = PersistedState {
            wireless_ips: endpoints.iter().map(DeviceEndpoint::as_str).collect(),
        };
        let payload = serde_json::to_string_pretty(&state)
            .map_err(|err| AppError::system(format!("Failed to serialize state: {err}"), trace_id))?;

        // The temp file removes itself on drop, so every early return below cleans up.
        let mut temp = tempfile::Builder::new()
            .prefix(".known_devices.")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(|err| AppError::system(format!("Failed to create temp state file: {err}"), trace_id))?;
        temp.write_all(payload.as_bytes())
            .and_then(|_| temp.flush())
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|err| AppError::system(format!("Failed to write temp state file: {err}"), trace_id))?;

        let lock = try_lock_exclusive(&self.lock_path, &self.locker, self.lock_attempts, self.lock_backoff)
            .map_err(|err| AppError::system(format!("Failed to open state lock file: {err}"), trace_id))?;
        let Some(_lock) = lock else {
            warn!(trace_id = %trace_id, path = %self.lock_path.display(), "state file locked by another writer");
            return Err(AppError::lock_contention(
                "State file is locked by another process; changes were not saved",
                trace_id,
            ));
        };

        temp.persist(&self.path).map_err(|err| {
            AppError::system(format!("Failed to replace state file: {}", err.error), trace_id)
        })?;
        sync_dir(&dir);

        debug!(trace_id = %trace_id, count = endpoints.len(), path = %self.path.display(), "state saved");
        Ok(())
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(handle) = fs::File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

/// Keeps the first occurrence of every valid network endpoint, in order.
fn sanitize<'a>(endpoints: impl Iterator<Item = &'a DeviceEndpoint>, trace_id: &str) -> Vec<DeviceEndpoint> {
    let mut seen = HashSet::new();
    let mut cleaned = Vec::new();
    for endpoint in endpoints {
        if !is_network_endpoint(endpoint.as_str()) {
            warn!(trace_id = %trace_id, endpoint = %endpoint, "dropping invalid endpoint");
            continue;
        }
        if seen.insert(endpoint.as_str().to_string()) {
            cleaned.push(endpoint.clone());
        }
    }
    cleaned
}
