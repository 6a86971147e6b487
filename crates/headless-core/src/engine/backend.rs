//! Backend abstraction and the registry of named backends.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use super::driver::ProcessDriver;
use super::ports::{PortDirection, PortKind};

/// Errors reported by a backend or by the engine's port registry.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend cannot be configured with the given parameters
    #[error("Configuration rejected: {0}")]
    Configuration(String),

    /// A port with this name is already registered
    #[error("Port already exists: {0}")]
    DuplicatePort(String),

    /// The backend cannot host more ports
    #[error("Port limit reached ({0} ports)")]
    PortLimit(usize),

    /// No port with this name exists
    #[error("Unknown port: {0}")]
    UnknownPort(String),

    /// The two ports cannot be connected
    #[error("Cannot connect {from} to {to}: {reason}")]
    InvalidConnection {
        from: String,
        to: String,
        reason: &'static str,
    },

    /// The backend is not in a state that allows the operation
    #[error("Backend not running")]
    NotRunning,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

/// A physical port exposed by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwarePort {
    pub name: String,
    pub kind: PortKind,
    pub direction: PortDirection,
}

/// An audio/MIDI backend.
///
/// A backend drives the engine's process cycle from a thread it owns and
/// reports unexpected stops through [`ProcessDriver::halt`]. Dropping a
/// backend releases it.
pub trait Backend: Send {
    /// Backend name as registered
    fn name(&self) -> &str;

    fn sample_rate(&self) -> u32;

    /// Frames per process cycle
    fn buffer_size(&self) -> u32;

    /// Maximum number of client ports the backend can host
    fn max_ports(&self) -> usize;

    /// Physical ports, named `system:<port>`
    fn hardware_ports(&self) -> Vec<HardwarePort>;

    /// Start I/O. The backend calls `driver` once per cycle until stopped.
    fn start(&mut self, driver: ProcessDriver) -> Result<(), BackendError>;

    /// Stop I/O and wait for the process thread to finish.
    fn stop(&mut self) -> Result<(), BackendError>;
}

/// Parameters handed to a backend factory.
#[derive(Debug, Clone)]
pub struct BackendParams {
    pub client_name: String,
}

type BackendFactory =
    Box<dyn Fn(&BackendParams) -> Result<Box<dyn Backend>, BackendError> + Send + Sync>;

/// Named backend factories. Lookup is case-insensitive.
#[derive(Default)]
pub struct BackendRegistry {
    factories: BTreeMap<String, (String, BackendFactory)>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend factory under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&BackendParams) -> Result<Box<dyn Backend>, BackendError> + Send + Sync + 'static,
    {
        self.factories
            .insert(name.to_lowercase(), (name.to_string(), Box::new(factory)));
    }

    /// Instantiate the backend called `name`.
    ///
    /// Returns `None` if no such backend is registered.
    pub fn create(
        &self,
        name: &str,
        params: &BackendParams,
    ) -> Option<Result<Box<dyn Backend>, BackendError>> {
        self.factories
            .get(&name.to_lowercase())
            .map(|(_, factory)| factory(params))
    }

    /// Registered backend names, in display form.
    pub fn names(&self) -> Vec<&str> {
        self.factories
            .values()
            .map(|(display, _)| display.as_str())
            .collect()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}
