use crate::collectors::{Collector, collect_all};
use crate::projection::project;
use bridge::{BridgeError, SnapshotWriter, WriteOutcome};
use common::sleep_unless_stopped;
use hotplug::TrackedDevice;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Samples the host and publishes one snapshot per cycle.
pub struct Publisher {
    writer: SnapshotWriter,
    collectors: Vec<Box<dyn Collector>>,
    lock_timeout: Duration,
}

impl Publisher {
    pub fn new(
        writer: SnapshotWriter,
        collectors: Vec<Box<dyn Collector>>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            writer,
            collectors,
            lock_timeout,
        }
    }

    pub fn writer(&self) -> &SnapshotWriter {
        &self.writer
    }

    /// Collect outside the lock, then project into the record under it.
    pub fn publish_once(&mut self, devices: &[TrackedDevice]) -> Result<WriteOutcome, BridgeError> {
        let sample = collect_all(&mut self.collectors);
        self.writer.write(self.lock_timeout, |record| {
            project(&sample, devices, record);
            Ok(())
        })
    }

    /// Publish every `interval` until `shutdown` is set. Per-cycle failures
    /// are logged and the next cycle runs as usual.
    pub fn run<D>(&mut self, shutdown: &AtomicBool, interval: Duration, devices: D)
    where
        D: Fn() -> Vec<TrackedDevice>,
    {
        tracing::info!(interval_ms = interval.as_millis() as u64, "Publisher loop started");
        let mut published = 0u64;

        while !shutdown.load(Ordering::Acquire) {
            let started = Instant::now();

            match self.publish_once(&devices()) {
                Ok(outcome) => {
                    published += 1;
                    if !outcome.flags.is_empty() {
                        tracing::warn!(flags = ?outcome.flags, "Snapshot published with status flags");
                    }
                }
                Err(BridgeError::LockTimeout(waited)) => {
                    tracing::warn!(waited_ms = waited.as_millis() as u64, "Skipping cycle, snapshot lock busy");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Snapshot write failed");
                }
            }

            let remaining = interval.saturating_sub(started.elapsed());
            if !sleep_unless_stopped(shutdown, remaining) {
                break;
            }
        }

        tracing::info!(published, "Publisher loop stopped");
    }
}
