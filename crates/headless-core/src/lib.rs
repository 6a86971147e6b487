//! Headless host core.
//!
//! Brings up an audio/MIDI engine and a saved session, runs them unattended
//! and tears both down exactly once when shutdown is requested by a
//! termination signal, an engine halt or a control-surface quit action.

pub mod bridge;
pub mod channel;
pub mod config;
pub mod coordinator;
pub mod debug;
pub mod engine;
mod error;
pub mod messages;
pub mod session;

pub use bridge::{EventBridge, ShutdownSource, TriggerHandle, QUIT_GROUP, QUIT_ITEM};
pub use channel::{ShutdownChannel, ShutdownNotifier, SHUTDOWN_TOKEN};
pub use config::{ControlConfig, DummyConfig, HostConfig};
pub use coordinator::{
    Coordinator, HostContext, HostStatus, LoadRequest, Phase, StatusProbe, StepOutcome,
    TeardownReport, TeardownStep,
};
pub use debug::{DebugFlag, DebugFlags, DebugParseError};
pub use engine::{Engine, EngineError, EngineOptions, EngineState};
pub use error::HostError;
pub use messages::{MessageBus, MessageLevel, MessageSink};
pub use session::{Session, SessionError, SessionOptions};

/// Process-wide setup. Call once before [`Coordinator::start`].
pub fn init(config: &HostConfig) -> Result<(), HostError> {
    config.ensure_dirs().map_err(HostError::Init)?;
    tracing::debug!(data_dir = %config.data_dir.display(), "Host initialized");
    Ok(())
}
