use anyhow::ensure;
use bridge::{RegionLadder, paths};
use common::Environment;
use common::config::{env_flag, env_or, env_parse};
use diagnostics::DiagnosticsConfig;
use hotplug::WatcherConfig;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub environment: Environment,
    pub ladder: RegionLadder,
    /// Writer lock file; `None` keeps it beside whichever region opened.
    pub lock_path: Option<PathBuf>,
    pub write_interval: Duration,
    pub lock_timeout: Duration,
    pub hotplug_poll: Duration,
    pub diag_socket: PathBuf,
    pub digest_enabled: bool,
    pub update_marker: String,
}

impl PublisherConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = Environment::from_env();

        let defaults = RegionLadder::default();
        let ladder = RegionLadder {
            global: path_var("SYSMON_REGION_GLOBAL").unwrap_or(defaults.global),
            session: path_var("SYSMON_REGION_SESSION").unwrap_or(defaults.session),
            unqualified: path_var("SYSMON_REGION_FALLBACK").unwrap_or(defaults.unqualified),
        };

        let lock_path = path_var("SYSMON_LOCK_PATH");
        if let Some(path) = &lock_path {
            ensure!(path.is_absolute(), "SYSMON_LOCK_PATH must be absolute, got {}", path.display());
        }

        let write_interval = Duration::from_millis(env_parse("SYSMON_WRITE_INTERVAL_MS", 1000u64));
        let lock_timeout = Duration::from_millis(env_parse(
            "SYSMON_LOCK_TIMEOUT_MS",
            paths::DEFAULT_LOCK_TIMEOUT.as_millis() as u64,
        ));
        let hotplug_poll = Duration::from_millis(env_parse("SYSMON_HOTPLUG_POLL_MS", 500u64));
        ensure!(!write_interval.is_zero(), "SYSMON_WRITE_INTERVAL_MS must be positive");
        ensure!(!hotplug_poll.is_zero(), "SYSMON_HOTPLUG_POLL_MS must be positive");

        let diag_socket = path_var("SYSMON_DIAG_SOCKET")
            .unwrap_or_else(|| PathBuf::from(paths::DIAGNOSTICS_SOCKET_PATH));
        let digest_enabled = env_flag("SYSMON_DIGEST", true);
        let update_marker = env_or("SYSMON_UPDATE_MARKER", "update");

        Ok(Self {
            environment,
            ladder,
            lock_path,
            write_interval,
            lock_timeout,
            hotplug_poll,
            diag_socket,
            digest_enabled,
            update_marker,
        })
    }

    pub fn lock_path_for(&self, region_path: &Path) -> PathBuf {
        self.lock_path
            .clone()
            .unwrap_or_else(|| paths::lock_path_for(region_path))
    }

    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            poll_interval: self.hotplug_poll,
            update_marker: self.update_marker.clone(),
        }
    }

    pub fn diagnostics_config(&self) -> DiagnosticsConfig {
        DiagnosticsConfig {
            socket_path: self.diag_socket.clone(),
            ..DiagnosticsConfig::default()
        }
    }
}

fn path_var(name: &str) -> Option<PathBuf> {
    env::var_os(name).filter(|v| !v.is_empty()).map(PathBuf::from)
}
