use crate::device::{DeviceEvent, TrackedDevice};
use crate::source::VolumeSource;
use crate::tracker::DeviceTracker;
use common::sleep_unless_stopped;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub poll_interval: Duration,
    /// Directory name that marks a volume as carrying an update.
    pub update_marker: String,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            update_marker: "update".to_string(),
        }
    }
}

/// Background poller owning one thread. Stopped and joined on drop.
pub struct HotplugWatcher {
    devices: Arc<Mutex<Vec<TrackedDevice>>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl HotplugWatcher {
    pub fn start<S, F>(source: S, config: WatcherConfig, observer: F) -> io::Result<Self>
    where
        S: VolumeSource + 'static,
        F: Fn(&DeviceEvent) -> anyhow::Result<()> + Send + 'static,
    {
        let devices = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let handle = thread::Builder::new().name("hotplug-watcher".to_string()).spawn({
            let devices = Arc::clone(&devices);
            let stop = Arc::clone(&stop);
            move || poll_loop(source, config, observer, &devices, &stop)
        })?;

        tracing::info!("Hot-plug watcher started");
        Ok(Self {
            devices,
            stop,
            handle: Some(handle),
        })
    }

    /// Copy of the mounted devices as of the last completed poll.
    pub fn current_devices(&self) -> Vec<TrackedDevice> {
        lock(&self.devices).clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Hot-plug watcher thread panicked");
            } else {
                tracing::info!("Hot-plug watcher stopped");
            }
        }
    }
}

impl Drop for HotplugWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn poll_loop<S, F>(
    mut source: S,
    config: WatcherConfig,
    observer: F,
    devices: &Mutex<Vec<TrackedDevice>>,
    stop: &AtomicBool,
) where
    S: VolumeSource,
    F: Fn(&DeviceEvent) -> anyhow::Result<()>,
{
    let mut tracker = DeviceTracker::new(config.update_marker);

    while !stop.load(Ordering::Acquire) {
        match source.removable_volumes() {
            Ok(volumes) => {
                let events = tracker.apply(&volumes, SystemTime::now());
                *lock(devices) = tracker.devices();
                for event in &events {
                    notify(&observer, event);
                }
            }
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "Volume enumeration failed, skipping poll");
            }
        }

        sleep_unless_stopped(stop, config.poll_interval);
    }
}

fn notify<F>(observer: &F, event: &DeviceEvent)
where
    F: Fn(&DeviceEvent) -> anyhow::Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(|| observer(event))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(
            path = %event.device.drive_path.display(),
            state = event.state().as_str(),
            error = %format!("{e:#}"),
            "Device observer failed"
        ),
        Err(_) => tracing::error!(
            path = %event.device.drive_path.display(),
            state = event.state().as_str(),
            "Device observer panicked"
        ),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
