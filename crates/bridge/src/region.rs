//! Named shared-memory region holding one [`SnapshotRecord`].
//!
//! A region is a file in a tmpfs-backed directory mapped `MAP_SHARED`. The
//! writer tries three tiers in order and keeps the first that opens:
//!
//! | tier          | location                            |
//! |---------------|-------------------------------------|
//! | `Global`      | `/dev/shm/<name>`, mode `0644`      |
//! | `Session`     | `$XDG_RUNTIME_DIR/<name>`           |
//! | `Unqualified` | `<temp dir>/<name>`                 |
//!
//! Only the process whose `create_new` succeeded sizes the file, and a newly
//! sized file reads as zeros. Attaching never writes to the mapping, so
//! readers see no gap across a writer restart. The file
//! is never unlinked by this crate: closing only drops the mapping.

use crate::errors::BridgeError;
use crate::header::SeqlockHeader;
use crate::paths;
use memmap2::{MmapMut, MmapOptions};
use record::SnapshotRecord;
use std::fmt;
use std::fs::{self, File, OpenOptions, Permissions};
use std::io;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// How long an attacher waits for a concurrent creator to size the file.
const SIZING_WAIT: Duration = Duration::from_millis(50);
const SIZING_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Global,
    Session,
    Unqualified,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Global => "global",
            Tier::Session => "session",
            Tier::Unqualified => "unqualified",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candidate paths for the region, most visible first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionLadder {
    pub global: PathBuf,
    pub session: PathBuf,
    pub unqualified: PathBuf,
}

impl RegionLadder {
    pub fn for_name(name: &str) -> Self {
        Self {
            global: Path::new(paths::GLOBAL_REGION_DIR).join(name),
            session: paths::session_dir().join(name),
            unqualified: std::env::temp_dir().join(name),
        }
    }

    pub fn tiers(&self) -> [(Tier, &Path); 3] {
        [
            (Tier::Global, self.global.as_path()),
            (Tier::Session, self.session.as_path()),
            (Tier::Unqualified, self.unqualified.as_path()),
        ]
    }
}

impl Default for RegionLadder {
    fn default() -> Self {
        Self::for_name(paths::REGION_NAME)
    }
}

/// A mapped region. Shared behind an `Arc`; the mapping lives until the
/// last clone is dropped.
pub struct Region {
    base: NonNull<u8>,
    mmap: MmapMut,
    _file: File,
    tier: Tier,
    path: PathBuf,
    created: bool,
}

// Writes go through raw pointers under the seqlock; the header is atomic.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Create or attach to the region at `path`.
    pub fn open(tier: Tier, path: &Path) -> Result<Self, BridgeError> {
        let size = SnapshotRecord::SIZE;

        let (file, created) = match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .mode(0o644)
            .open(path)
        {
            Ok(file) => (file, true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                (OpenOptions::new().read(true).write(true).open(path)?, false)
            }
            Err(e) => return Err(e.into()),
        };

        // The global tier is read by other users; umask must not narrow it.
        if created && tier == Tier::Global {
            fs::set_permissions(path, Permissions::from_mode(0o644)).map_err(|source| {
                BridgeError::Permissions {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
        }

        let mut initialised = created;
        if created {
            file.set_len(size as u64)?;
        } else {
            let len = wait_for_sizing(&file)?;
            if len == 0 {
                // The creator died before sizing. Extending an empty file
                // zero-fills it; racing a late creator to the same length is
                // a no-op.
                tracing::warn!(path = %path.display(), "Adopting unsized region file");
                file.set_len(size as u64)?;
                initialised = true;
            } else if len != size as u64 {
                return Err(BridgeError::SizeMismatch {
                    expected: size,
                    actual: len as usize,
                });
            }
        }

        let mut mmap = unsafe { MmapOptions::new().len(size).map_mut(&file) }
            .map_err(BridgeError::MapFailed)?;

        let base = NonNull::new(mmap.as_mut_ptr())
            .ok_or_else(|| BridgeError::MapFailed(io::Error::other("null mapping")))?;

        Ok(Self {
            base,
            mmap,
            _file: file,
            tier,
            path: path.to_path_buf(),
            created: initialised,
        })
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if this process created (or re-initialised) the region.
    pub fn created(&self) -> bool {
        self.created
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    pub fn header(&self) -> &SeqlockHeader {
        unsafe { SeqlockHeader::from_ptr(self.base.as_ptr()) }
    }

    /// Unsynchronised copy of the whole record. Consistent only while the
    /// caller holds the write lock or checks the sequence around it.
    pub fn snapshot(&self) -> SnapshotRecord {
        unsafe { ptr::read_volatile(self.base.as_ptr() as *const SnapshotRecord) }
    }

    /// Overwrite the whole record. Only called with the write lock held and
    /// an odd sequence published.
    pub(crate) fn store(&self, record: &SnapshotRecord) {
        unsafe { ptr::write_volatile(self.base.as_ptr() as *mut SnapshotRecord, *record) }
    }

    pub fn flush(&self) -> Result<(), BridgeError> {
        self.mmap.flush()?;
        Ok(())
    }
}

/// Length of an attached file, giving a creator that has not sized it yet a
/// short grace period. Still zero afterwards means nobody will.
fn wait_for_sizing(file: &File) -> io::Result<u64> {
    let deadline = Instant::now() + SIZING_WAIT;
    loop {
        let len = file.metadata()?.len();
        if len != 0 || Instant::now() >= deadline {
            return Ok(len);
        }
        thread::sleep(SIZING_POLL);
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("tier", &self.tier)
            .field("path", &self.path)
            .field("created", &self.created)
            .finish()
    }
}

/// Process-wide owner of the mapped region.
///
/// `open` is idempotent: the first successful call maps the region and later
/// calls hand out the same `Arc`. `close` drops the manager's reference and
/// may be called any number of times.
pub struct RegionManager {
    ladder: RegionLadder,
    mapped: Mutex<Option<Arc<Region>>>,
    last_error: Mutex<Option<String>>,
}

impl RegionManager {
    pub fn new(ladder: RegionLadder) -> Self {
        Self {
            ladder,
            mapped: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    pub fn ladder(&self) -> &RegionLadder {
        &self.ladder
    }

    pub fn open(&self) -> Result<Arc<Region>, BridgeError> {
        let mut mapped = lock(&self.mapped);
        if let Some(region) = mapped.as_ref() {
            return Ok(Arc::clone(region));
        }

        let mut failures = Vec::new();
        for (tier, path) in self.ladder.tiers() {
            match Region::open(tier, path) {
                Ok(region) => {
                    tracing::info!(
                        tier = tier.as_str(),
                        path = %path.display(),
                        created = region.created(),
                        size = region.len(),
                        "Snapshot region mapped"
                    );
                    let region = Arc::new(region);
                    *mapped = Some(Arc::clone(&region));
                    *lock(&self.last_error) = None;
                    return Ok(region);
                }
                Err(e) => {
                    tracing::warn!(
                        tier = tier.as_str(),
                        path = %path.display(),
                        os_error = ?e.raw_os_error(),
                        error = %e,
                        "Region tier unavailable, trying next"
                    );
                    failures.push(format!("{tier}: {e}"));
                }
            }
        }

        let message = failures.join("; ");
        tracing::error!(error = %message, "No snapshot region could be mapped");
        *lock(&self.last_error) = Some(message.clone());
        Err(BridgeError::RegionUnavailable(message))
    }

    /// The mapped region, if `open` has succeeded and `close` has not run.
    pub fn current(&self) -> Option<Arc<Region>> {
        lock(&self.mapped).clone()
    }

    pub fn close(&self) {
        if let Some(region) = lock(&self.mapped).take() {
            if let Err(e) = region.flush() {
                tracing::warn!(error = %e, "Flushing snapshot region failed");
            }
            tracing::info!(tier = region.tier().as_str(), "Snapshot region released");
        }
    }

    pub fn last_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }
}

impl Default for RegionManager {
    fn default() -> Self {
        Self::new(RegionLadder::default())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
