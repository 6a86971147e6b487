//! The engine side of the process cycle.
//!
//! A backend owns the process thread and calls into a [`ProcessDriver`] once
//! per cycle. The driver forwards to whatever [`ProcessHandler`] the session
//! installed and fans out halt notifications.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Work done on the process thread every cycle.
pub trait ProcessHandler: Send + Sync {
    fn process(&self, nframes: u32);
}

pub(crate) type HaltCallback = Box<dyn Fn(Option<&str>) + Send + Sync>;

#[derive(Default)]
pub(crate) struct EngineShared {
    pub(crate) handler: Mutex<Option<Arc<dyn ProcessHandler>>>,
    pub(crate) halt_callbacks: Mutex<Vec<HaltCallback>>,
    pub(crate) running: AtomicBool,
    pub(crate) cycles: AtomicU64,
    pub(crate) hardware_optimization: bool,
}

/// Handle given to a backend when it starts.
#[derive(Clone)]
pub struct ProcessDriver {
    shared: Arc<EngineShared>,
}

impl ProcessDriver {
    pub(crate) fn new(shared: Arc<EngineShared>) -> Self {
        Self { shared }
    }

    /// Call once at the top of the process thread.
    pub fn thread_init(&self) {
        if self.shared.hardware_optimization {
            super::fpu::enable_denormal_protection();
        }
        self.shared.running.store(true, Ordering::Release);
    }

    /// Run one cycle of `nframes` frames.
    ///
    /// Never blocks: if the handler slot is being swapped the cycle is skipped.
    pub fn process(&self, nframes: u32) {
        if let Some(slot) = self.shared.handler.try_lock() {
            if let Some(handler) = slot.as_ref() {
                handler.process(nframes);
            }
        }
        self.shared.cycles.fetch_add(1, Ordering::Relaxed);
    }

    /// Whether a session handler is currently installed.
    pub fn has_handler(&self) -> bool {
        self.shared.handler.lock().is_some()
    }

    /// Report that the backend stopped on its own.
    ///
    /// Subscribers run on the calling thread.
    pub fn halt(&self, reason: Option<&str>) {
        self.shared.running.store(false, Ordering::Release);
        tracing::warn!(reason = reason.unwrap_or(""), "Backend halted");
        for callback in self.shared.halt_callbacks.lock().iter() {
            callback(reason);
        }
    }
}

/// Read-only view of the engine for status reporting from other threads.
#[derive(Clone)]
pub struct EngineMonitor {
    shared: Arc<EngineShared>,
}

impl EngineMonitor {
    pub(crate) fn new(shared: Arc<EngineShared>) -> Self {
        Self { shared }
    }

    /// Whether the process thread is running
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Process cycles run so far
    pub fn cycles(&self) -> u64 {
        self.shared.cycles.load(Ordering::Relaxed)
    }
}
