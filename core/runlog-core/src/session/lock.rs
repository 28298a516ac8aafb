//! Exclusive writer lock for shared bookkeeping files.
//!
//! The lock is a directory created with `mkdir`, which is atomic on every
//! filesystem we care about. Whoever creates it owns it until the guard drops.
//!
//! ```text
//! active-sessions.lock/
//! └── pid          # Plain text: the owning wrapper's PID
//! ```
//!
//! A lock left behind by a crashed wrapper is broken when its PID is dead or it
//! is older than [`STALE_LOCK_SECS`]. Holders keep the lock for a single
//! read-modify-write, so anything older is abandoned.
//!
//! Breaking happens under a second `mkdir` guard (`<lock>.breaking`) and
//! staleness is checked again once the guard is held. Two wrappers that both
//! saw the same stale lock therefore can't remove each other's fresh one.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use fs_err as fs;
use tracing::debug;

use crate::error::{Result, RunlogError};

pub const STALE_LOCK_SECS: u64 = 10;
const RETRY_INTERVAL: Duration = Duration::from_millis(10);

pub fn is_pid_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        // SAFETY: kill with signal 0 performs no action beyond the permission and
        // existence check. EPERM still means the process exists.
        #[allow(unsafe_code)]
        let rc = unsafe { libc::kill(pid as i32, 0) };
        rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

/// Guard for an acquired directory lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct DirLock {
    path: PathBuf,
}

impl DirLock {
    pub fn acquire(path: &Path, timeout: Duration) -> Result<DirLock> {
        let deadline = Instant::now() + timeout;

        loop {
            match std::fs::create_dir(path) {
                Ok(()) => {
                    // Best-effort: a lock without a pid file is still honoured until it goes stale.
                    let _ = fs::write(path.join("pid"), std::process::id().to_string());
                    return Ok(DirLock {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if is_stale(path) && break_stale(path) {
                        continue;
                    }
                }
                Err(e) => return Err(RunlogError::io(format!("creating {}", path.display()), e)),
            }

            if Instant::now() >= deadline {
                return Err(RunlogError::LockTimeout(path.to_path_buf()));
            }
            thread::sleep(RETRY_INTERVAL);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

fn breaking_guard_path(lock_dir: &Path) -> PathBuf {
    let mut name = lock_dir.as_os_str().to_owned();
    name.push(".breaking");
    PathBuf::from(name)
}

/// Removes `lock_dir` if it is still stale once the breaking guard is held.
/// Returns false when another wrapper holds the guard or the lock turned out
/// to be live.
fn break_stale(lock_dir: &Path) -> bool {
    let guard = breaking_guard_path(lock_dir);
    match std::fs::create_dir(&guard) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            // A breaker that crashed mid-break leaves its guard behind.
            if dir_age(&guard).is_some_and(|age| age > Duration::from_secs(STALE_LOCK_SECS)) {
                let _ = std::fs::remove_dir(&guard);
            }
            return false;
        }
        Err(_) => return false,
    }

    let broken = is_stale(lock_dir);
    if broken {
        debug!(path = %lock_dir.display(), "Breaking stale lock");
        let _ = fs::remove_dir_all(lock_dir);
    }
    let _ = std::fs::remove_dir(&guard);
    broken
}

fn dir_age(path: &Path) -> Option<Duration> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
}

fn is_stale(lock_dir: &Path) -> bool {
    if let Some(pid) = read_lock_pid(lock_dir) {
        if pid != std::process::id() && !is_pid_alive(pid) {
            return true;
        }
    }

    match dir_age(lock_dir) {
        Some(age) => age > Duration::from_secs(STALE_LOCK_SECS),
        // Vanished between create_dir and metadata: just retry.
        None => false,
    }
}

fn read_lock_pid(lock_dir: &Path) -> Option<u32> {
    let pid_str = std::fs::read_to_string(lock_dir.join("pid")).ok()?;
    pid_str.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_acquire_and_release() {
        let temp = tempdir().unwrap();
        let lock_path = temp.path().join("x.lock");
        {
            let lock = DirLock::acquire(&lock_path, Duration::from_millis(100)).unwrap();
            assert!(lock.path().is_dir());
            assert_eq!(
                read_lock_pid(&lock_path),
                Some(std::process::id())
            );
        }
        assert!(!lock_path.exists());
    }

    #[test]
    fn test_held_lock_times_out() {
        let temp = tempdir().unwrap();
        let lock_path = temp.path().join("x.lock");
        let _held = DirLock::acquire(&lock_path, Duration::from_millis(100)).unwrap();
        let second = DirLock::acquire(&lock_path, Duration::from_millis(50));
        assert!(matches!(second, Err(RunlogError::LockTimeout(_))));
    }

    #[test]
    fn test_lock_with_dead_pid_is_broken() {
        let temp = tempdir().unwrap();
        let lock_path = temp.path().join("x.lock");
        std::fs::create_dir(&lock_path).unwrap();
        std::fs::write(lock_path.join("pid"), "99999999").unwrap();

        let lock = DirLock::acquire(&lock_path, Duration::from_millis(200));
        assert!(lock.is_ok());
    }

    #[test]
    fn test_held_breaking_guard_defers_break() {
        let temp = tempdir().unwrap();
        let lock_path = temp.path().join("x.lock");
        std::fs::create_dir(&lock_path).unwrap();
        std::fs::write(lock_path.join("pid"), "99999999").unwrap();
        let guard = breaking_guard_path(&lock_path);
        std::fs::create_dir(&guard).unwrap();

        let blocked = DirLock::acquire(&lock_path, Duration::from_millis(50));
        assert!(matches!(blocked, Err(RunlogError::LockTimeout(_))));
        assert!(lock_path.exists());

        std::fs::remove_dir(&guard).unwrap();
        let lock = DirLock::acquire(&lock_path, Duration::from_millis(200)).unwrap();
        drop(lock);
        assert!(!guard.exists());
    }

    #[test]
    fn test_concurrent_breakers_never_share_lock() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let temp = tempdir().unwrap();
        let lock_path = temp.path().join("x.lock");
        std::fs::create_dir(&lock_path).unwrap();
        std::fs::write(lock_path.join("pid"), "99999999").unwrap();

        let holders = AtomicUsize::new(0);
        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let _lock = DirLock::acquire(&lock_path, Duration::from_secs(5)).unwrap();
                    assert_eq!(holders.fetch_add(1, Ordering::SeqCst), 0);
                    thread::sleep(Duration::from_millis(5));
                    holders.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        assert!(!lock_path.exists());
        assert!(!breaking_guard_path(&lock_path).exists());
    }

    #[test]
    fn test_current_pid_is_alive() {
        assert!(is_pid_alive(std::process::id()));
    }
}
