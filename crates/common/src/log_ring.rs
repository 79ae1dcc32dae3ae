//! Bounded in-memory log tail shared with the diagnostics channel.

use std::collections::VecDeque;
use std::fmt::{self, Write as _};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// FIFO of the most recent log lines; the oldest line is evicted once
/// `capacity` is reached. Cloning shares the same buffer.
#[derive(Debug, Clone)]
pub struct LogRing {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl LogRing {
    pub const DEFAULT_CAPACITY: usize = 200;

    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    // A panic while holding the lock leaves the deque intact; keep using it.
    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// Take every buffered line, oldest first.
    pub fn drain(&self) -> Vec<String> {
        self.lock().drain(..).collect()
    }

    /// Put drained lines back in front of anything logged since, for lines
    /// that never reached a reader. Newer lines win when the ring is full.
    pub fn restore(&self, drained: Vec<String>) {
        let mut lines = self.lock();
        for line in drained.into_iter().rev() {
            if lines.len() == self.capacity {
                break;
            }
            lines.push_front(line);
        }
    }

    /// Copy the buffered lines without consuming them.
    pub fn snapshot(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// `tracing` layer copying every event that passes the subscriber's filter
/// into a [`LogRing`] as `LEVEL target: message key=value ...`.
pub struct LogRingLayer {
    ring: LogRing,
}

impl LogRingLayer {
    pub fn new(ring: LogRing) -> Self {
        Self { ring }
    }
}

impl<S: Subscriber> Layer<S> for LogRingLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        self.ring.push(format!(
            "{} {}: {}",
            metadata.level(),
            metadata.target(),
            visitor.finish()
        ));
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_ring_evicts_oldest_first() {
        let ring = LogRing::new(3);
        for i in 0..5 {
            ring.push(format!("line {}", i));
        }

        assert_eq!(ring.len(), 3);
        assert_eq!(ring.snapshot(), vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn test_drain_empties_ring() {
        let ring = LogRing::default();
        ring.push("a");
        ring.push("b");

        assert_eq!(ring.drain(), vec!["a", "b"]);
        assert!(ring.is_empty());
        assert!(ring.drain().is_empty());
    }

    #[test]
    fn test_restore_requeues_ahead_of_newer_lines() {
        let ring = LogRing::new(4);
        ring.push("a");
        ring.push("b");
        let taken = ring.drain();
        ring.push("c");

        ring.restore(taken);
        assert_eq!(ring.snapshot(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_restore_drops_oldest_when_full() {
        let ring = LogRing::new(3);
        ring.push("a");
        ring.push("b");
        let taken = ring.drain();
        ring.push("c");
        ring.push("d");

        ring.restore(taken);
        assert_eq!(ring.snapshot(), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_default_capacity() {
        let ring = LogRing::default();
        for i in 0..250 {
            ring.push(i.to_string());
        }
        assert_eq!(ring.len(), LogRing::DEFAULT_CAPACITY);
        assert_eq!(ring.snapshot().first().map(String::as_str), Some("50"));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let ring = LogRing::new(0);
        ring.push("only");
        ring.push("latest");
        assert_eq!(ring.capacity(), 1);
        assert_eq!(ring.snapshot(), vec!["latest"]);
    }

    #[test]
    fn test_layer_captures_message_and_fields() {
        let ring = LogRing::new(10);
        let subscriber = tracing_subscriber::registry().with(LogRingLayer::new(ring.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(tier = "session", "fell back");
            tracing::info!("plain");
        });

        let lines = ring.drain();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("WARN "), "got {:?}", lines[0]);
        assert!(lines[0].ends_with("fell back tier=session"), "got {:?}", lines[0]);
        assert!(lines[1].ends_with(": plain"), "got {:?}", lines[1]);
    }
}
