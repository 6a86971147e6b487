//! Runtime message fan-out.
//!
//! Errors, warnings and info text produced while the host runs are posted to
//! a [`MessageBus`] and handed to every listening [`MessageSink`]. Messages are
//! observable only; none of them requests shutdown.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Severity of a runtime message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
    Fatal,
}

impl MessageLevel {
    fn index(self) -> usize {
        match self {
            MessageLevel::Info => 0,
            MessageLevel::Warning => 1,
            MessageLevel::Error => 2,
            MessageLevel::Fatal => 3,
        }
    }
}

impl fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageLevel::Info => "info",
            MessageLevel::Warning => "warning",
            MessageLevel::Error => "error",
            MessageLevel::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Receiver of runtime messages.
pub trait MessageSink: Send + Sync {
    /// Handle one message
    fn post(&self, level: MessageLevel, message: &str);
}

/// Writes messages to the tracing subscriber.
#[derive(Debug, Default)]
pub struct TracingSink;

impl MessageSink for TracingSink {
    fn post(&self, level: MessageLevel, message: &str) {
        match level {
            MessageLevel::Info => tracing::info!(target: "headless::messages", "{}", message),
            MessageLevel::Warning => tracing::warn!(target: "headless::messages", "{}", message),
            MessageLevel::Error | MessageLevel::Fatal => {
                tracing::error!(target: "headless::messages", %level, "{}", message)
            }
        }
    }
}

#[derive(Default)]
struct BusInner {
    sinks: RwLock<Vec<Arc<dyn MessageSink>>>,
    counts: [AtomicU64; 4],
}

/// Shared message bus. Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl MessageBus {
    /// Create a bus with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bus that forwards to tracing.
    pub fn with_tracing() -> Self {
        let bus = Self::new();
        bus.listen_to(Arc::new(TracingSink));
        bus
    }

    /// Add a listener.
    pub fn listen_to(&self, sink: Arc<dyn MessageSink>) {
        self.inner.sinks.write().push(sink);
    }

    /// Post a message to every listener.
    pub fn post(&self, level: MessageLevel, message: impl AsRef<str>) {
        let message = message.as_ref();
        self.inner.counts[level.index()].fetch_add(1, Ordering::Relaxed);
        for sink in self.inner.sinks.read().iter() {
            sink.post(level, message);
        }
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.post(MessageLevel::Info, message);
    }

    pub fn warning(&self, message: impl AsRef<str>) {
        self.post(MessageLevel::Warning, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.post(MessageLevel::Error, message);
    }

    /// Number of messages posted at `level` so far.
    pub fn count(&self, level: MessageLevel) -> u64 {
        self.inner.counts[level.index()].load(Ordering::Relaxed)
    }
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("sinks", &self.inner.sinks.read().len())
            .field("errors", &self.count(MessageLevel::Error))
            .field("warnings", &self.count(MessageLevel::Warning))
            .finish()
    }
}
