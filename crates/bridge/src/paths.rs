//! Default names for the shared region, its lock and the diagnostics socket.
//!
//! The writer and every reader resolve names from here so that a rename
//! cannot leave the two sides looking at different objects.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Base name of the snapshot region inside each tier directory.
pub const REGION_NAME: &str = "sysmon_snapshot";

/// Machine-wide tier, visible to every user on the host.
pub const GLOBAL_REGION_DIR: &str = "/dev/shm";

/// Suffix of the writer lock file kept beside each region.
pub const LOCK_SUFFIX: &str = ".lock";

/// Unix socket served by the diagnostics channel.
pub const DIAGNOSTICS_SOCKET_PATH: &str = "/tmp/sysmon_diag.sock";

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-login-session directory: `$XDG_RUNTIME_DIR`, else `/run/user/<uid>`.
pub fn session_dir() -> PathBuf {
    env::var_os("XDG_RUNTIME_DIR")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(format!("/run/user/{}", nix::unistd::getuid())))
}

/// Lock file serialising writers of the region at `region_path`.
pub fn lock_path_for(region_path: &Path) -> PathBuf {
    let mut name = region_path.as_os_str().to_os_string();
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}
