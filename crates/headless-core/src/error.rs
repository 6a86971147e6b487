//! Top-level error type for host startup.

use thiserror::Error;

use crate::engine::EngineError;
use crate::session::SessionError;

/// Errors that abort host startup. None of them trigger teardown.
#[derive(Debug, Error)]
pub enum HostError {
    /// Engine could not be initialized or started
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Session could not be loaded
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Shutdown channel could not be created
    #[error("Cannot create shutdown channel: {0}")]
    Channel(#[source] std::io::Error),

    /// Data directories could not be created
    #[error("Cannot initialize host: {0}")]
    Init(#[source] std::io::Error),
}
