//! Cross-process writer lock.
//!
//! An exclusive `flock` on a lock file that sits next to the region. The
//! kernel drops the lock when the owning descriptor is closed, so a writer
//! that dies mid-write releases it and the next writer recovers the odd
//! sequence it left behind.
//!
//! `flock` on a descriptor that already holds the lock succeeds again, so the
//! lock also tracks ownership within the process and refuses re-entry.

use nix::errno::Errno;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

const POLL_START: Duration = Duration::from_micros(100);
const POLL_CAP: Duration = Duration::from_millis(10);

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Cannot open lock file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("flock failed: {0}")]
    Os(#[from] Errno),
    #[error("Timed out waiting for the writer lock")]
    Timeout,
}

pub struct FileLock {
    file: File,
    path: PathBuf,
    held: AtomicBool,
}

impl FileLock {
    /// Open `path`, creating it world-readable if missing.
    ///
    /// `flock` works on read-only descriptors, so a lock file created by
    /// another user is still usable when it cannot be opened for writing.
    pub fn open(path: &Path) -> Result<Self, LockError> {
        let opened = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .mode(0o644)
            .open(path);

        let file = match opened {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => File::open(path).map_err(|source| LockError::Open {
                path: path.to_path_buf(),
                source,
            })?,
            Err(source) => {
                return Err(LockError::Open {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        Ok(Self {
            file,
            path: path.to_path_buf(),
            held: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the lock if nobody holds it. `Ok(false)` means it is busy.
    pub fn try_acquire(&self) -> Result<bool, LockError> {
        if self
            .held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Ok(false);
        }

        loop {
            let ret = unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
            match Errno::result(ret) {
                Ok(_) => return Ok(true),
                Err(Errno::EINTR) => continue,
                Err(errno) => {
                    self.held.store(false, Ordering::Release);
                    return if errno == Errno::EWOULDBLOCK {
                        Ok(false)
                    } else {
                        Err(errno.into())
                    };
                }
            }
        }
    }

    /// Poll for the lock until `timeout` elapses.
    pub fn acquire(&self, timeout: Duration) -> Result<(), LockError> {
        let deadline = Instant::now() + timeout;
        let mut delay = POLL_START;

        loop {
            if self.try_acquire()? {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(LockError::Timeout);
            }
            thread::sleep(delay.min(deadline - now));
            delay = (delay * 2).min(POLL_CAP);
        }
    }

    pub fn release(&self) -> Result<(), LockError> {
        let ret = unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) };
        self.held.store(false, Ordering::Release);
        Errno::result(ret)?;
        Ok(())
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}
