//! Headless host
//!
//! Loads a session on an audio/MIDI engine and runs it until a termination
//! signal, an engine halt or a control-surface quit action.

mod cli;
mod control;

use std::io::IsTerminal;
use std::process::ExitCode;

use anyhow::{Context, Result};
use headless_core::{
    Coordinator, DebugFlags, EngineOptions, EventBridge, HostConfig, HostContext, LoadRequest,
    TeardownReport,
};
use tracing_subscriber::EnvFilter;

use crate::cli::Invocation;
use crate::control::{ControlHandler, ControlSurface};

fn main() -> ExitCode {
    let invocation = match cli::parse(std::env::args_os()) {
        Ok(invocation) => invocation,
        Err(code) => return code,
    };

    let (config, config_warning) = match &invocation.args.config {
        Some(path) => match HostConfig::load_from(path) {
            Ok(config) => (config, None),
            Err(e) => {
                eprintln!("headless-host: cannot load {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => match HostConfig::load_or_default(&HostConfig::default_path()) {
            Ok(config) => (config, None),
            Err(e) => (HostConfig::default(), Some(e)),
        },
    };

    init_logging(&config, &invocation.debug);
    if let Some(e) = config_warning {
        tracing::warn!("Failed to load config file, using defaults: {}", e);
    }
    tracing::info!("Starting headless host v{}", env!("CARGO_PKG_VERSION"));

    match run(invocation, config) {
        Ok(report) => {
            tracing::info!(clean = report.is_clean(), "Exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("headless-host: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins over the configured level; `-D` flags are added on top.
fn init_logging(config: &HostConfig, debug: &DebugFlags) {
    let mut filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    for directive in debug.directives() {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();
}

fn run(invocation: Invocation, config: HostConfig) -> Result<TeardownReport> {
    headless_core::init(&config)?;

    let request = LoadRequest {
        options: invocation.session_options(),
        dir: invocation.dir,
        snapshot: invocation.snapshot,
    };
    let engine_options = EngineOptions {
        hardware_optimization: !invocation.args.no_hw_optimizations,
    };
    let ctx = HostContext::new(
        config,
        invocation.args.backend,
        invocation.client_name,
        engine_options,
    );
    tracing::debug!(?ctx, "Host context ready");

    let coordinator = Coordinator::start(&ctx, &request)?;

    let mut bridge = EventBridge::new(coordinator.notifier());
    bridge
        .install_signal_handlers()
        .context("Failed to install signal handlers")?;

    let control = if ctx.config.control.enabled {
        let handler = ControlHandler::new(bridge.handle(), coordinator.status());
        match ControlSurface::spawn(&ctx.config.control.socket_path, handler) {
            Ok(surface) => {
                tracing::debug!(socket = %surface.socket_path().display(), "Control surface up");
                Some(surface)
            }
            Err(e) => {
                tracing::warn!("Control surface unavailable: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    let report = coordinator.run();

    if let Some(control) = control {
        control.shutdown();
    }
    drop(bridge);

    Ok(report)
}
