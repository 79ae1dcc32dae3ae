use anyhow::Context;
use bridge::{RegionManager, SnapshotWriter};
use common::{LogRing, setup_logging};
use diagnostics::DiagnosticsServer;
use hotplug::{DeviceEvent, HotplugWatcher, SysinfoVolumes};
use publisher::{Publisher, PublisherConfig, default_collectors};
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    flag,
};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

fn log_device_event(event: &DeviceEvent) -> anyhow::Result<()> {
    tracing::info!(
        path = %event.device.drive_path.display(),
        label = %event.device.label,
        state = event.state().as_str(),
        "Removable volume state changed"
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let config = PublisherConfig::from_env()?;
    let ring = LogRing::default();
    setup_logging(config.environment.clone(), Some(ring.clone()));

    let shutdown = Arc::new(AtomicBool::new(false));
    flag::register(SIGTERM, Arc::clone(&shutdown))?;
    flag::register(SIGINT, Arc::clone(&shutdown))?;
    tracing::info!("Signal handlers registered (SIGTERM, SIGINT)");

    let manager = RegionManager::new(config.ladder.clone());
    let region = match manager.open() {
        Ok(region) => region,
        Err(e) => {
            let detail = manager.last_error().unwrap_or_else(|| e.to_string());
            tracing::error!(error = %detail, "Cannot map snapshot region");
            return Err(e).context("Failed to map the snapshot region on any tier");
        }
    };

    let lock_path = config.lock_path_for(region.path());
    let writer = SnapshotWriter::new(Arc::clone(&region), &lock_path)
        .with_context(|| format!("Failed to open writer lock {}", lock_path.display()))?
        .with_digest(config.digest_enabled);
    if !config.digest_enabled {
        tracing::warn!("Integrity digest disabled, publishing zero digest");
    }

    let mut watcher = HotplugWatcher::start(
        SysinfoVolumes::new(),
        config.watcher_config(),
        log_device_event,
    )
    .context("Failed to start hot-plug watcher")?;

    let mut diagnostics =
        DiagnosticsServer::start(Arc::clone(&region), ring, config.diagnostics_config())
            .context("Failed to start diagnostics channel")?;

    let mut publisher = Publisher::new(writer, default_collectors(), config.lock_timeout);
    publisher.run(&shutdown, config.write_interval, || watcher.current_devices());

    tracing::info!("Shutting down");
    diagnostics.stop();
    watcher.stop();
    drop(publisher);
    drop(region);
    manager.close();

    Ok(())
}
