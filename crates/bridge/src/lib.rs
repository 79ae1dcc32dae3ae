//! Shared-memory snapshot transport: the mapped region, the seqlock write
//! protocol around it, the cross-process lock and the integrity digest.

pub mod digest;
pub mod errors;
pub mod header;
pub mod lock;
pub mod paths;
pub mod reader;
pub mod region;
pub mod retry;
pub mod writer;

pub use digest::DigestStatus;
pub use errors::BridgeError;
pub use header::SeqlockHeader;
pub use lock::{FileLock, LockError};
pub use reader::SnapshotReader;
pub use region::{Region, RegionLadder, RegionManager, Tier};
pub use retry::RetryConfig;
pub use writer::{SnapshotWriter, WriteGuard, WriteOutcome};
