use crate::errors::DiagnosticsError;
use crate::frame::{DiagnosticsFrame, write_frame};
use bridge::Region;
use common::LogRing;
use common::sleep_unless_stopped;
use common::wait::STOP_POLL_INTERVAL;
use std::fs;
use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct DiagnosticsConfig {
    pub socket_path: PathBuf,
    pub frame_interval: Duration,
    /// Pause after any bind, accept or client failure.
    pub retry_backoff: Duration,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(bridge::paths::DIAGNOSTICS_SOCKET_PATH),
            frame_interval: Duration::from_secs(1),
            retry_backoff: Duration::from_secs(2),
        }
    }
}

/// Serves one client at a time over a Unix socket.
///
/// The server only ever copies the record; it never takes the write lock.
pub struct DiagnosticsServer {
    region: Arc<Region>,
    ring: LogRing,
    config: DiagnosticsConfig,
}

impl DiagnosticsServer {
    pub fn start(
        region: Arc<Region>,
        ring: LogRing,
        config: DiagnosticsConfig,
    ) -> io::Result<DiagnosticsHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let server = Self {
            region,
            ring,
            config,
        };

        let handle = thread::Builder::new().name("diagnostics".to_string()).spawn({
            let stop = Arc::clone(&stop);
            move || server.run(&stop)
        })?;

        Ok(DiagnosticsHandle {
            stop,
            handle: Some(handle),
        })
    }

    fn run(&self, stop: &AtomicBool) {
        while !stop.load(Ordering::Acquire) {
            if let Err(e) = self.serve(stop) {
                tracing::warn!(
                    socket = %self.config.socket_path.display(),
                    error = %e,
                    "Diagnostics listener failed, retrying"
                );
                sleep_unless_stopped(stop, self.config.retry_backoff);
            }
        }

        remove_stale_socket(&self.config.socket_path);
    }

    /// Bind and accept clients until stopped. Returns `Err` only when the
    /// listener itself fails.
    fn serve(&self, stop: &AtomicBool) -> Result<(), DiagnosticsError> {
        remove_stale_socket(&self.config.socket_path);
        let listener = UnixListener::bind(&self.config.socket_path)?;
        listener.set_nonblocking(true)?;
        tracing::info!(socket = %self.config.socket_path.display(), "Diagnostics channel listening");

        while !stop.load(Ordering::Acquire) {
            match listener.accept() {
                Ok((stream, _)) => {
                    tracing::info!("Diagnostics client connected");
                    match self.stream_frames(stream, stop) {
                        Ok(()) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, "Diagnostics client dropped");
                            sleep_unless_stopped(stop, self.config.retry_backoff);
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(STOP_POLL_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn stream_frames(&self, mut stream: UnixStream, stop: &AtomicBool) -> Result<(), DiagnosticsError> {
        stream.set_nonblocking(false)?;
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;

        loop {
            let frame = DiagnosticsFrame::build(&self.region.snapshot(), self.region.tier(), self.ring.drain());
            if let Err(e) = write_frame(&mut stream, &frame) {
                // Unsent lines go to the next client.
                self.ring.restore(frame.logs);
                return Err(e);
            }

            if !sleep_unless_stopped(stop, self.config.frame_interval) {
                return Ok(());
            }
        }
    }
}

fn remove_stale_socket(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(socket = %path.display(), error = %e, "Cannot remove stale socket"),
    }
}

/// Owns the diagnostics thread. Stopped and joined on drop.
pub struct DiagnosticsHandle {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DiagnosticsHandle {
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Diagnostics thread panicked");
            } else {
                tracing::info!("Diagnostics channel stopped");
            }
        }
    }
}

impl Drop for DiagnosticsHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
