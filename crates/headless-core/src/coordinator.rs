//! Main-loop state machine: start, wait for a shutdown request, tear down.
//!
//! ```text
//! Init → EngineReady → SessionLoaded → Running → ShuttingDown → Terminated
//! ```
//!
//! Engine halts are routed into the shutdown channel before the engine
//! starts. Startup failures return early without any teardown. Once running, the
//! controller thread blocks in [`ShutdownChannel::receive`] and the teardown
//! runs exactly once, in a fixed order, whatever woke it.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::bridge::EventBridge;
use crate::channel::{ShutdownChannel, ShutdownNotifier};
use crate::config::HostConfig;
use crate::engine::{BackendRegistry, Engine, EngineMonitor, EngineOptions};
use crate::error::HostError;
use crate::messages::{MessageBus, MessageLevel};
use crate::session::{Session, SessionOptions, Transport};

/// Process-wide collaborators, built once in `main`.
pub struct HostContext {
    pub config: HostConfig,
    pub backends: BackendRegistry,
    pub messages: MessageBus,
    pub engine_options: EngineOptions,
    pub backend_name: String,
    pub client_name: String,
}

impl HostContext {
    /// Build a context with the built-in backends and a tracing message sink.
    ///
    /// `backend` overrides the configured backend name.
    pub fn new(
        config: HostConfig,
        backend: Option<String>,
        client_name: impl Into<String>,
        engine_options: EngineOptions,
    ) -> Self {
        let backends = BackendRegistry::with_builtin(config.dummy.clone());
        let backend_name = backend.unwrap_or_else(|| config.backend.clone());

        Self {
            config,
            backends,
            messages: MessageBus::with_tracing(),
            engine_options,
            backend_name,
            client_name: client_name.into(),
        }
    }
}

impl fmt::Debug for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostContext")
            .field("backend_name", &self.backend_name)
            .field("client_name", &self.client_name)
            .field("backends", &self.backends.names())
            .finish_non_exhaustive()
    }
}

/// Which session to load and how.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub dir: PathBuf,
    pub snapshot: String,
    pub options: SessionOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    EngineReady,
    SessionLoaded,
    Running,
    ShuttingDown,
    Terminated,
}

/// Teardown steps in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    UnbindSession,
    DestroySession,
    StopEngine,
    DestroyEngine,
}

impl TeardownStep {
    pub const ORDER: [TeardownStep; 4] = [
        TeardownStep::UnbindSession,
        TeardownStep::DestroySession,
        TeardownStep::StopEngine,
        TeardownStep::DestroyEngine,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    Failed(String),
}

/// What the teardown did.
#[derive(Debug, Clone, Default)]
pub struct TeardownReport {
    steps: Vec<(TeardownStep, StepOutcome)>,
}

impl TeardownReport {
    fn record<E: fmt::Display>(&mut self, step: TeardownStep, result: Result<(), E>) {
        let outcome = match result {
            Ok(()) => {
                info!(?step, "Teardown step done");
                StepOutcome::Done
            }
            Err(e) => {
                error!(?step, error = %e, "Teardown step failed; continuing");
                StepOutcome::Failed(e.to_string())
            }
        };
        self.steps.push((step, outcome));
    }

    /// Steps in execution order.
    pub fn order(&self) -> Vec<TeardownStep> {
        self.steps.iter().map(|(step, _)| *step).collect()
    }

    pub fn outcome(&self, step: TeardownStep) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, outcome)| outcome)
    }

    /// True if every step succeeded.
    pub fn is_clean(&self) -> bool {
        self.steps
            .iter()
            .all(|(_, outcome)| *outcome == StepOutcome::Done)
    }
}

/// Host state readable from the control-surface thread.
#[derive(Clone)]
pub struct StatusProbe {
    backend: String,
    client: String,
    session: String,
    sample_rate: u32,
    buffer_size: u32,
    engine: EngineMonitor,
    transport: Arc<Transport>,
    messages: MessageBus,
    started_at: Instant,
}

/// Serializable point-in-time status.
#[derive(Debug, Clone, Serialize)]
pub struct HostStatus {
    pub backend: String,
    pub client: String,
    pub session: String,
    pub sample_rate: u32,
    pub buffer_size: u32,
    pub running: bool,
    pub cycles: u64,
    pub transport_speed: f64,
    pub transport_position: u64,
    pub warnings: u64,
    pub errors: u64,
    pub uptime_secs: u64,
}

impl StatusProbe {
    pub fn snapshot(&self) -> HostStatus {
        HostStatus {
            backend: self.backend.clone(),
            client: self.client.clone(),
            session: self.session.clone(),
            sample_rate: self.sample_rate,
            buffer_size: self.buffer_size,
            running: self.engine.is_running(),
            cycles: self.engine.cycles(),
            transport_speed: self.transport.speed(),
            transport_position: self.transport.position(),
            warnings: self.messages.count(MessageLevel::Warning),
            errors: self.messages.count(MessageLevel::Error)
                + self.messages.count(MessageLevel::Fatal),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

/// Owns the engine, the session and the shutdown channel.
pub struct Coordinator {
    phase: Phase,
    channel: ShutdownChannel,
    engine: Engine,
    session: Session,
    status: StatusProbe,
}

impl Coordinator {
    /// Bring up the engine and load the session.
    pub fn start(ctx: &HostContext, request: &LoadRequest) -> Result<Self, HostError> {
        debug!(phase = ?Phase::Init, "Starting host");
        let channel = ShutdownChannel::new().map_err(HostError::Channel)?;

        let mut engine = Engine::initialize(
            &ctx.backends,
            &ctx.backend_name,
            &ctx.client_name,
            ctx.engine_options,
        )?;
        // Subscribe before the process thread exists so no halt goes unseen.
        let trigger = EventBridge::new(channel.notifier()).handle();
        engine.connect_halted(move |reason| trigger.engine_halted(reason));
        engine.start()?;
        debug!(phase = ?Phase::EngineReady, "Engine ready");

        let session = Session::construct(
            &request.dir,
            &request.snapshot,
            &mut engine,
            &request.options,
            &ctx.messages,
        )?;
        engine.bind(session.process_handler());
        info!(
            session = %session.name(),
            backend = ?engine.backend_name(),
            client = %engine.client_name(),
            "Session loaded"
        );

        let status = StatusProbe {
            backend: engine.backend_name().unwrap_or_default().to_string(),
            client: engine.client_name().to_string(),
            session: session.name().to_string(),
            sample_rate: engine.sample_rate(),
            buffer_size: engine.buffer_size(),
            engine: engine.monitor(),
            transport: session.transport(),
            messages: ctx.messages.clone(),
            started_at: Instant::now(),
        };

        Ok(Self {
            phase: Phase::SessionLoaded,
            channel,
            engine,
            session,
            status,
        })
    }

    /// Producer handle for the event bridge.
    pub fn notifier(&self) -> ShutdownNotifier {
        self.channel.notifier()
    }

    pub fn status(&self) -> StatusProbe {
        self.status.clone()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Roll the transport, block until shutdown is requested, then tear down.
    pub fn run(mut self) -> TeardownReport {
        self.session.request_transport_speed(1.0);
        self.phase = Phase::Running;
        info!("Running; waiting for shutdown request");

        match self.channel.receive() {
            Ok(_) => info!("Shutdown requested"),
            Err(e) => error!(error = %e, "Shutdown channel failed; shutting down"),
        }
        self.phase = Phase::ShuttingDown;

        self.teardown()
    }

    fn teardown(self) -> TeardownReport {
        let Coordinator {
            mut engine,
            mut session,
            ..
        } = self;
        let mut report = TeardownReport::default();

        report.record(TeardownStep::UnbindSession, session.unbind(&mut engine));

        session.destroy();
        report.record::<String>(TeardownStep::DestroySession, Ok(()));

        report.record(TeardownStep::StopEngine, engine.stop());

        engine.destroy();
        report.record::<String>(TeardownStep::DestroyEngine, Ok(()));

        if report.is_clean() {
            info!(phase = ?Phase::Terminated, "Teardown complete");
        } else {
            warn!(phase = ?Phase::Terminated, "Teardown complete with errors");
        }
        report
    }
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("phase", &self.phase)
            .field("engine", &self.engine)
            .field("session", &self.session.name())
            .finish_non_exhaustive()
    }
}
