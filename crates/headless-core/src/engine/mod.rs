//! Audio/MIDI engine lifecycle.
//!
//! The [`Engine`] owns the selected backend and moves through
//! `Uninitialized → BackendSelected → Started → Stopped → Destroyed`.
//! It is owned by the controller thread; the backend's process thread only
//! sees the shared handler slot and the halt subscribers.

mod backend;
mod driver;
mod dummy;
mod fpu;
mod ports;

pub use backend::{Backend, BackendError, BackendParams, BackendRegistry, HardwarePort};
pub use driver::{EngineMonitor, ProcessDriver, ProcessHandler};
pub use dummy::{DummyBackend, DEVICE_REMOVED, DUMMY_BACKEND};
pub use ports::{PortDirection, PortKind};

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DummyConfig;
use driver::EngineShared;
use ports::PortRegistry;

/// Errors from engine state transitions.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The named backend does not exist or refused its configuration
    #[error("Cannot set Audio/MIDI engine backend '{name}': {reason}")]
    BackendUnavailable { name: String, reason: String },

    /// Backend I/O could not be started
    #[error("Cannot start Audio/MIDI engine: {0}")]
    StartFailure(#[source] BackendError),

    /// Backend I/O could not be stopped cleanly
    #[error("Cannot stop Audio/MIDI engine: {0}")]
    StopFailure(#[source] BackendError),

    /// Operation not valid in the current state
    #[error("Cannot {operation} while engine is {state}")]
    InvalidState {
        operation: &'static str,
        state: EngineState,
    },
}

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    BackendSelected,
    Started,
    Stopped,
    Destroyed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::BackendSelected => "backend-selected",
            EngineState::Started => "started",
            EngineState::Stopped => "stopped",
            EngineState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Options fixed at engine creation.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Enable flush-to-zero / denormals-are-zero on the process thread
    pub hardware_optimization: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            hardware_optimization: true,
        }
    }
}

impl BackendRegistry {
    /// Registry containing the built-in backends.
    pub fn with_builtin(dummy: DummyConfig) -> Self {
        let mut registry = Self::new();
        registry.register(DUMMY_BACKEND, move |params| {
            Ok(Box::new(DummyBackend::new(dummy.clone(), params)?) as Box<dyn Backend>)
        });
        registry
    }
}

/// The audio/MIDI engine.
pub struct Engine {
    state: EngineState,
    backend: Option<Box<dyn Backend>>,
    client_name: String,
    shared: Arc<EngineShared>,
    ports: PortRegistry,
}

impl Engine {
    /// Create an engine with no backend.
    pub fn create(options: EngineOptions) -> Self {
        let shared = EngineShared {
            hardware_optimization: options.hardware_optimization,
            ..EngineShared::default()
        };

        Self {
            state: EngineState::Uninitialized,
            backend: None,
            client_name: String::new(),
            shared: Arc::new(shared),
            ports: PortRegistry::new(0, Vec::new()),
        }
    }

    /// Create an engine and select its backend.
    pub fn initialize(
        registry: &BackendRegistry,
        backend_name: &str,
        client_name: &str,
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        let mut engine = Self::create(options);
        engine.set_backend(registry, backend_name, client_name)?;
        Ok(engine)
    }

    /// Select and configure the backend called `backend_name`.
    pub fn set_backend(
        &mut self,
        registry: &BackendRegistry,
        backend_name: &str,
        client_name: &str,
    ) -> Result<(), EngineError> {
        self.expect_state("set backend", EngineState::Uninitialized)?;

        let params = BackendParams {
            client_name: client_name.to_string(),
        };
        let unavailable = |reason: String| EngineError::BackendUnavailable {
            name: backend_name.to_string(),
            reason,
        };

        let backend = registry
            .create(backend_name, &params)
            .ok_or_else(|| {
                unavailable(format!(
                    "no such backend (available: {})",
                    registry.names().join(", ")
                ))
            })?
            .map_err(|e| unavailable(e.to_string()))?;

        self.ports = PortRegistry::new(backend.max_ports(), backend.hardware_ports());
        self.client_name = params.client_name;
        info!(
            backend = backend.name(),
            client = %self.client_name,
            sample_rate = backend.sample_rate(),
            buffer_size = backend.buffer_size(),
            "Backend selected"
        );
        self.backend = Some(backend);
        self.state = EngineState::BackendSelected;
        Ok(())
    }

    /// Start backend I/O.
    pub fn start(&mut self) -> Result<(), EngineError> {
        self.expect_state("start", EngineState::BackendSelected)?;
        let driver = ProcessDriver::new(self.shared.clone());
        let backend = self.backend_mut()?;
        backend.start(driver).map_err(EngineError::StartFailure)?;

        self.state = EngineState::Started;
        info!("Engine started");
        Ok(())
    }

    /// Install the session's process handler.
    pub fn bind(&mut self, handler: Arc<dyn ProcessHandler>) {
        if self.state != EngineState::Started {
            warn!(state = %self.state, "Binding session to an engine that is not running");
        }
        *self.shared.handler.lock() = Some(handler);
        debug!("Session bound to engine");
    }

    /// Remove the session's process handler.
    pub fn remove_session(&mut self) {
        *self.shared.handler.lock() = None;
        debug!("Session removed from engine");
    }

    /// Whether a process handler is installed.
    pub fn has_session(&self) -> bool {
        self.shared.handler.lock().is_some()
    }

    /// Subscribe to unexpected backend stops.
    ///
    /// The callback runs on the backend's process thread.
    pub fn connect_halted<F>(&mut self, callback: F)
    where
        F: Fn(Option<&str>) + Send + Sync + 'static,
    {
        self.shared.halt_callbacks.lock().push(Box::new(callback));
    }

    /// Stop backend I/O. A no-op unless the engine is started.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        if self.state != EngineState::Started {
            debug!(state = %self.state, "Engine not started; nothing to stop");
            return Ok(());
        }

        self.state = EngineState::Stopped;
        let result = self.backend_mut()?.stop();
        self.shared.running.store(false, std::sync::atomic::Ordering::Release);
        match result {
            // A halted backend has already wound down its thread.
            Ok(()) | Err(BackendError::NotRunning) => {
                info!("Engine stopped");
                Ok(())
            }
            Err(e) => Err(EngineError::StopFailure(e)),
        }
    }

    /// Release the backend. Consumes the engine.
    pub fn destroy(mut self) {
        if self.state == EngineState::Started {
            warn!("Destroying a running engine");
        }
        self.shared.halt_callbacks.lock().clear();
        drop(self.backend.take());
        self.state = EngineState::Destroyed;
        info!(state = %self.state, "Engine destroyed");
    }

    /// Register a port named `<client>:<name>`. Returns the full name.
    pub fn register_port(
        &mut self,
        name: &str,
        kind: PortKind,
        direction: PortDirection,
    ) -> Result<String, BackendError> {
        if self.backend.is_none() {
            return Err(BackendError::NotRunning);
        }
        let full_name = self.port_name(name);
        self.ports.register(full_name.clone(), kind, direction)?;
        debug!(port = %full_name, ?kind, ?direction, "Port registered");
        Ok(full_name)
    }

    /// Unregister a client port by full name.
    pub fn unregister_port(&mut self, full_name: &str) -> Result<(), BackendError> {
        self.ports.unregister(full_name)
    }

    /// Connect two ports by full name.
    pub fn connect(&mut self, from: &str, to: &str) -> Result<(), BackendError> {
        self.ports.connect(from, to)?;
        debug!(from, to, "Ports connected");
        Ok(())
    }

    /// Full port name for a client-relative name.
    pub fn port_name(&self, name: &str) -> String {
        format!("{}:{}", self.client_name, name)
    }

    pub fn has_port(&self, full_name: &str) -> bool {
        self.ports.contains(full_name)
    }

    pub fn is_connected(&self, from: &str, to: &str) -> bool {
        self.ports.is_connected(from, to)
    }

    /// Number of registered client ports
    pub fn client_port_count(&self) -> usize {
        self.ports.client_port_count()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn backend_name(&self) -> Option<&str> {
        self.backend.as_ref().map(|b| b.name())
    }

    pub fn sample_rate(&self) -> u32 {
        self.backend.as_ref().map_or(0, |b| b.sample_rate())
    }

    pub fn buffer_size(&self) -> u32 {
        self.backend.as_ref().map_or(0, |b| b.buffer_size())
    }

    /// Whether the process thread is currently running
    pub fn is_running(&self) -> bool {
        self.monitor().is_running()
    }

    /// Read-only handle for other threads.
    pub fn monitor(&self) -> EngineMonitor {
        EngineMonitor::new(self.shared.clone())
    }

    fn backend_mut(&mut self) -> Result<&mut Box<dyn Backend>, EngineError> {
        let state = self.state;
        self.backend.as_mut().ok_or(EngineError::InvalidState {
            operation: "use backend",
            state,
        })
    }

    fn expect_state(&self, operation: &'static str, expected: EngineState) -> Result<(), EngineError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(EngineError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state)
            .field("backend", &self.backend_name())
            .field("client_name", &self.client_name)
            .finish()
    }
}
