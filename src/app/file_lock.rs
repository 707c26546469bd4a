use std::fs::{File, OpenOptions, TryLockError};
use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAttempt {
    Acquired,
    Contended,
    /// The platform offers no advisory locking; callers carry on unlocked.
    Unsupported,
}

/// Cross-process advisory locking capability.
pub trait AdvisoryLock: Send + Sync {
    fn try_acquire_exclusive(&self, file: &File) -> io::Result<LockAttempt>;
    fn acquire_shared(&self, file: &File) -> io::Result<LockAttempt>;
    fn release(&self, file: &File);
}

/// `flock`/`LockFileEx` through the standard library.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlatformLock;

impl AdvisoryLock for PlatformLock {
    fn try_acquire_exclusive(&self, file: &File) -> io::Result<LockAttempt> {
        match file.try_lock() {
            Ok(()) => Ok(LockAttempt::Acquired),
            Err(TryLockError::WouldBlock) => Ok(LockAttempt::Contended),
            Err(TryLockError::Error(err)) if err.kind() == io::ErrorKind::Unsupported => {
                Ok(LockAttempt::Unsupported)
            }
            Err(TryLockError::Error(err)) => Err(err),
        }
    }

    fn acquire_shared(&self, file: &File) -> io::Result<LockAttempt> {
        match file.lock_shared() {
            Ok(()) => Ok(LockAttempt::Acquired),
            Err(err) if err.kind() == io::ErrorKind::Unsupported => Ok(LockAttempt::Unsupported),
            Err(err) => Err(err),
        }
    }

    fn release(&self, file: &File) {
        let _ = file.unlock();
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLock;

impl AdvisoryLock for NoopLock {
    fn try_acquire_exclusive(&self, _file: &File) -> io::Result<LockAttempt> {
        Ok(LockAttempt::Unsupported)
    }

    fn acquire_shared(&self, _file: &File) -> io::Result<LockAttempt> {
        Ok(LockAttempt::Unsupported)
    }

    fn release(&self, _file: &File) {}
}

/// Holds an acquired lock until dropped.
pub struct LockGuard {
    file: File,
    locker: Arc<dyn AdvisoryLock>,
    held: bool,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.held {
            self.locker.release(&self.file);
        }
    }
}

pub fn open_lock_file(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

fn guard_for(file: File, locker: Arc<dyn AdvisoryLock>, attempt: LockAttempt, path: &Path) -> LockGuard {
    if attempt == LockAttempt::Unsupported {
        warn!(path = %path.display(), "advisory file locking unsupported; continuing unlocked");
    }
    LockGuard {
        file,
        locker,
        held: attempt == LockAttempt::Acquired,
    }
}

/// Blocks until a shared lock is held. Lock-file problems degrade to an unlocked guard.
pub fn lock_shared(path: &Path, locker: &Arc<dyn AdvisoryLock>) -> Option<LockGuard> {
    let file = match open_lock_file(path) {
        Ok(file) => file,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to open lock file for reading");
            return None;
        }
    };
    match locker.acquire_shared(&file) {
        Ok(attempt) => Some(guard_for(file, Arc::clone(locker), attempt, path)),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to take shared lock");
            None
        }
    }
}

/// Tries `attempts` times to take the exclusive lock. `Ok(None)` means another holder kept it.
pub fn try_lock_exclusive(
    path: &Path,
    locker: &Arc<dyn AdvisoryLock>,
    attempts: usize,
    backoff: std::time::Duration,
) -> io::Result<Option<LockGuard>> {
    let file = open_lock_file(path)?;
    for attempt_index in 0..attempts.max(1) {
        match locker.try_acquire_exclusive(&file)? {
            LockAttempt::Contended => {
                if attempt_index + 1 < attempts.max(1) {
                    std::thread::sleep(backoff);
                }
            }
            attempt => return Ok(Some(guard_for(file, Arc::clone(locker), attempt, path))),
        }
    }
    Ok(None)
}
