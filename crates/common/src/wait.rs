use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Longest a worker sleeps before looking at its stop flag again.
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Sleep for `duration` in slices of at most [`STOP_POLL_INTERVAL`].
///
/// Returns `false` as soon as `stop` is set, `true` if the full duration
/// elapsed.
pub fn sleep_unless_stopped(stop: &AtomicBool, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if stop.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(STOP_POLL_INTERVAL));
    }
}
