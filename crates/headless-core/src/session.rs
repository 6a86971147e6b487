//! Session loading, binding and teardown.
//!
//! A session is read from `<dir>/<snapshot>.session`, a YAML document listing
//! tracks, their plugins and port connections. Construction registers every
//! track port with the engine; nothing is rolled back if it fails part way.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::engine::{BackendError, Engine, PortDirection, PortKind, ProcessHandler};
use crate::messages::MessageBus;

/// File extension of session snapshots.
pub const SESSION_EXTENSION: &str = "session";

/// Errors raised while constructing or tearing down a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Snapshot missing, unreadable, malformed or inconsistent
    #[error("Cannot load session from {}: {reason}", path.display())]
    ConstructionFailure { path: PathBuf, reason: String },

    /// A port could not be registered (name conflict or port exhaustion)
    #[error("Cannot register port '{port}': {source}")]
    PortRegistrationFailure {
        port: String,
        #[source]
        source: BackendError,
    },

    /// Anything else
    #[error("Unknown failure: {0}")]
    UnknownFailure(String),

    /// One or more ports could not be unregistered during unbind
    #[error("Cannot unregister ports: {}", .0.join(", "))]
    Unbind(Vec<String>),
}

/// Options applied while loading.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Load every plugin bypassed
    pub bypass_plugins: bool,
    /// Load every plugin deactivated
    pub disable_plugins: bool,
    /// Make the connections stored in the snapshot
    pub connect_ports: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            bypass_plugins: false,
            disable_plugins: false,
            connect_ports: true,
        }
    }
}

/// On-disk snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFile {
    pub name: String,

    /// Sample rate the session was saved at
    #[serde(default)]
    pub sample_rate: Option<u32>,

    #[serde(default)]
    pub tracks: Vec<TrackState>,

    #[serde(default)]
    pub connections: Vec<ConnectionState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    #[default]
    Audio,
    Midi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackState {
    pub name: String,

    #[serde(default)]
    pub kind: TrackKind,

    /// Audio channels; MIDI tracks always have one port per direction
    #[serde(default = "default_channels")]
    pub channels: u32,

    #[serde(default)]
    pub plugins: Vec<PluginState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginState {
    pub name: String,

    #[serde(default = "default_true")]
    pub active: bool,

    #[serde(default)]
    pub bypassed: bool,
}

/// A stored connection. Names without a `client:` prefix refer to the
/// session's own ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionState {
    pub from: String,
    pub to: String,
}

fn default_channels() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

impl TrackState {
    /// Client-relative port names with their kind and direction.
    /// Ports this track needs, generated on demand.
    fn port_specs(&self) -> impl Iterator<Item = (String, PortKind, PortDirection)> + '_ {
        let (kind, prefix, count) = match self.kind {
            TrackKind::Audio => (PortKind::Audio, "audio", self.channels),
            TrackKind::Midi => (PortKind::Midi, "midi", 1),
        };

        let inputs = (1..=count).map(move |n| {
            (
                format!("{}/{}_in {}", self.name, prefix, n),
                kind,
                PortDirection::Input,
            )
        });
        let outputs = (1..=count).map(move |n| {
            (
                format!("{}/{}_out {}", self.name, prefix, n),
                kind,
                PortDirection::Output,
            )
        });
        inputs.chain(outputs)
    }
}

/// Transport state shared with the process thread.
///
/// Speed changes are requested from the controller thread and picked up on
/// the next process cycle.
#[derive(Debug, Default)]
pub struct Transport {
    requested_speed: AtomicU64,
    speed: AtomicU64,
    position: AtomicU64,
}

impl Transport {
    /// Ask the process thread to change speed. Does not wait.
    pub fn request_speed(&self, speed: f64) {
        self.requested_speed.store(speed.to_bits(), Ordering::Release);
    }

    /// Speed applied by the last process cycle
    pub fn speed(&self) -> f64 {
        f64::from_bits(self.speed.load(Ordering::Acquire))
    }

    /// Playhead in frames
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }
}

impl ProcessHandler for Transport {
    fn process(&self, nframes: u32) {
        let requested = self.requested_speed.load(Ordering::Acquire);
        self.speed.store(requested, Ordering::Release);

        let speed = f64::from_bits(requested);
        if speed > 0.0 {
            let advance = (nframes as f64 * speed) as u64;
            self.position.fetch_add(advance, Ordering::Relaxed);
        }
    }
}

/// A loaded session.
#[derive(Debug)]
pub struct Session {
    name: String,
    path: PathBuf,
    tracks: Vec<TrackState>,
    ports: Vec<String>,
    transport: Arc<Transport>,
}

impl Session {
    /// Load `<dir>/<snapshot_name>.session` and register its ports with `engine`.
    pub fn construct(
        dir: &Path,
        snapshot_name: &str,
        engine: &mut Engine,
        options: &SessionOptions,
        messages: &MessageBus,
    ) -> Result<Self, SessionError> {
        let path = dir.join(format!("{}.{}", snapshot_name, SESSION_EXTENSION));
        let construction = |reason: String| SessionError::ConstructionFailure {
            path: path.clone(),
            reason,
        };

        let content = std::fs::read_to_string(&path).map_err(|e| construction(e.to_string()))?;
        let file: SessionFile =
            serde_yaml::from_str(&content).map_err(|e| construction(e.to_string()))?;
        validate(&file).map_err(construction)?;

        if let Some(rate) = file.sample_rate {
            if rate != engine.sample_rate() {
                messages.warning(format!(
                    "Session was saved at {} Hz but the engine runs at {} Hz",
                    rate,
                    engine.sample_rate()
                ));
            }
        }

        let mut tracks = file.tracks;
        for plugin in tracks.iter_mut().flat_map(|t| t.plugins.iter_mut()) {
            if options.disable_plugins {
                plugin.active = false;
            }
            if options.bypass_plugins {
                plugin.bypassed = true;
            }
        }

        let mut ports = Vec::new();
        for track in &tracks {
            for (name, kind, direction) in track.port_specs() {
                let full_name = engine
                    .register_port(&name, kind, direction)
                    .map_err(|e| classify_port_error(engine.port_name(&name), e))?;
                ports.push(full_name);
            }
        }

        if options.connect_ports {
            for connection in &file.connections {
                let from = resolve_port(engine, &connection.from);
                let to = resolve_port(engine, &connection.to);
                if let Err(e) = engine.connect(&from, &to) {
                    messages.warning(format!("Cannot restore connection: {}", e));
                }
            }
        } else {
            debug!(
                skipped = file.connections.len(),
                "Port connections blocked; not restoring"
            );
        }

        let session = Self {
            name: file.name,
            path,
            tracks,
            ports,
            transport: Arc::new(Transport::default()),
        };

        info!(
            session = %session.name,
            tracks = session.tracks.len(),
            ports = session.ports.len(),
            "Session loaded"
        );
        Ok(session)
    }

    /// Handler to install on the engine with [`Engine::bind`].
    pub fn process_handler(&self) -> Arc<dyn ProcessHandler> {
        self.transport.clone()
    }

    /// Shared transport, readable from any thread.
    pub fn transport(&self) -> Arc<Transport> {
        self.transport.clone()
    }

    /// Ask the transport to roll at `speed`. Fire and forget.
    pub fn request_transport_speed(&self, speed: f64) {
        debug!(speed, "Transport speed requested");
        self.transport.request_speed(speed);
    }

    /// Detach from `engine`: remove the process handler and the session's ports.
    ///
    /// Every port is attempted even if some fail.
    pub fn unbind(&mut self, engine: &mut Engine) -> Result<(), SessionError> {
        engine.remove_session();

        let mut failed = Vec::new();
        for port in self.ports.drain(..) {
            if let Err(e) = engine.unregister_port(&port) {
                tracing::warn!(port = %port, error = %e, "Failed to unregister port");
                failed.push(port);
            }
        }

        info!(session = %self.name, "Session unbound");
        if failed.is_empty() {
            Ok(())
        } else {
            Err(SessionError::Unbind(failed))
        }
    }

    /// Release the session.
    pub fn destroy(self) {
        info!(session = %self.name, "Session destroyed");
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the snapshot file this session was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tracks(&self) -> &[TrackState] {
        &self.tracks
    }

    /// Full names of the ports this session registered
    pub fn ports(&self) -> &[String] {
        &self.ports
    }
}

fn validate(file: &SessionFile) -> Result<(), String> {
    for track in &file.tracks {
        if track.name.trim().is_empty() {
            return Err("track with empty name".to_string());
        }
        if track.name.contains(':') {
            return Err(format!("track name '{}' contains ':'", track.name));
        }
        if track.kind == TrackKind::Audio && track.channels == 0 {
            return Err(format!("audio track '{}' has no channels", track.name));
        }
    }
    Ok(())
}

fn classify_port_error(port: String, error: BackendError) -> SessionError {
    match error {
        BackendError::DuplicatePort(_) | BackendError::PortLimit(_) => {
            SessionError::PortRegistrationFailure {
                port,
                source: error,
            }
        }
        other => SessionError::UnknownFailure(format!("registering {}: {}", port, other)),
    }
}

fn resolve_port(engine: &Engine, name: &str) -> String {
    if name.contains(':') {
        name.to_string()
    } else {
        engine.port_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DummyConfig;
    use crate::engine::{BackendRegistry, EngineOptions};
    use crate::messages::MessageLevel;
    use tempfile::tempdir;

    const DEMO: &str = r#"
name: demo
sample_rate: 48000
tracks:
  - name: Audio 1
    channels: 2
    plugins:
      - name: a-comp
      - name: a-eq
        active: false
  - name: Synth
    kind: midi
connections:
  - from: system:capture_1
    to: Audio 1/audio_in 1
  - from: Audio 1/audio_out 1
    to: system:playback_1
"#;

    fn engine_with(config: DummyConfig) -> Engine {
        let registry = BackendRegistry::with_builtin(config);
        Engine::initialize(&registry, "Dummy", "host", EngineOptions::default()).unwrap()
    }

    fn engine() -> Engine {
        engine_with(DummyConfig::default())
    }

    fn write_session(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(format!("{}.session", name)), content).unwrap();
    }

    #[test]
    fn test_construct_registers_ports_and_connections() {
        let dir = tempdir().unwrap();
        write_session(dir.path(), "demo", DEMO);
        let mut engine = engine();
        let messages = MessageBus::new();

        let session = Session::construct(
            dir.path(),
            "demo",
            &mut engine,
            &SessionOptions::default(),
            &messages,
        )
        .unwrap();

        assert_eq!(session.name(), "demo");
        assert_eq!(session.tracks().len(), 2);
        // 2 in + 2 out for audio, 1 + 1 for midi
        assert_eq!(session.ports().len(), 6);
        assert!(engine.has_port("host:Synth/midi_in 1"));
        assert!(engine.is_connected("system:capture_1", "host:Audio 1/audio_in 1"));
        assert!(engine.is_connected("host:Audio 1/audio_out 1", "system:playback_1"));
        assert_eq!(messages.count(MessageLevel::Warning), 0);
    }

    #[test]
    fn test_missing_snapshot_is_construction_failure() {
        let dir = tempdir().unwrap();
        let mut engine = engine();

        let err = Session::construct(
            dir.path(),
            "absent",
            &mut engine,
            &SessionOptions::default(),
            &MessageBus::new(),
        )
        .unwrap_err();

        match err {
            SessionError::ConstructionFailure { path, .. } => {
                assert!(path.ends_with("absent.session"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_snapshot_is_construction_failure() {
        let dir = tempdir().unwrap();
        write_session(dir.path(), "broken", "name: [oops");
        let mut engine = engine();

        let err = Session::construct(
            dir.path(),
            "broken",
            &mut engine,
            &SessionOptions::default(),
            &MessageBus::new(),
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::ConstructionFailure { .. }));
    }

    #[test]
    fn test_invalid_track_is_construction_failure() {
        let dir = tempdir().unwrap();
        write_session(
            dir.path(),
            "bad",
            "name: bad\ntracks:\n  - name: ''\n",
        );
        let mut engine = engine();

        let err = Session::construct(
            dir.path(),
            "bad",
            &mut engine,
            &SessionOptions::default(),
            &MessageBus::new(),
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::ConstructionFailure { .. }));
    }

    #[test]
    fn test_duplicate_track_is_port_registration_failure() {
        let dir = tempdir().unwrap();
        write_session(
            dir.path(),
            "dup",
            "name: dup\ntracks:\n  - name: Bass\n  - name: Bass\n",
        );
        let mut engine = engine();

        let err = Session::construct(
            dir.path(),
            "dup",
            &mut engine,
            &SessionOptions::default(),
            &MessageBus::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SessionError::PortRegistrationFailure {
                source: BackendError::DuplicatePort(_),
                ..
            }
        ));
    }

    #[test]
    fn test_port_exhaustion_is_port_registration_failure() {
        let dir = tempdir().unwrap();
        write_session(dir.path(), "demo", DEMO);
        let mut engine = engine_with(DummyConfig {
            max_ports: 3,
            ..DummyConfig::default()
        });

        let err = Session::construct(
            dir.path(),
            "demo",
            &mut engine,
            &SessionOptions::default(),
            &MessageBus::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SessionError::PortRegistrationFailure {
                source: BackendError::PortLimit(3),
                ..
            }
        ));
    }

    #[test]
    fn test_huge_channel_count_stops_at_port_limit() {
        let dir = tempdir().unwrap();
        write_session(
            dir.path(),
            "wide",
            "name: wide\ntracks:\n  - name: Wall\n    channels: 50000000\n",
        );
        let mut engine = engine();

        let err = Session::construct(
            dir.path(),
            "wide",
            &mut engine,
            &SessionOptions::default(),
            &MessageBus::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SessionError::PortRegistrationFailure {
                source: BackendError::PortLimit(256),
                ..
            }
        ));
        assert_eq!(engine.client_port_count(), 256);
    }

    #[test]
    fn test_unregistrable_port_is_unknown_failure() {
        let dir = tempdir().unwrap();
        write_session(dir.path(), "demo", DEMO);
        let mut engine = Engine::create(EngineOptions::default());

        let err = Session::construct(
            dir.path(),
            "demo",
            &mut engine,
            &SessionOptions::default(),
            &MessageBus::new(),
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::UnknownFailure(_)));
    }

    #[test]
    fn test_plugin_options_applied() {
        let dir = tempdir().unwrap();
        write_session(dir.path(), "demo", DEMO);
        let mut engine = engine();
        let options = SessionOptions {
            bypass_plugins: true,
            disable_plugins: true,
            connect_ports: true,
        };

        let session =
            Session::construct(dir.path(), "demo", &mut engine, &options, &MessageBus::new())
                .unwrap();

        let plugins: Vec<_> = session.tracks().iter().flat_map(|t| &t.plugins).collect();
        assert_eq!(plugins.len(), 2);
        assert!(plugins.iter().all(|p| !p.active && p.bypassed));
    }

    #[test]
    fn test_blocked_connections_are_skipped() {
        let dir = tempdir().unwrap();
        write_session(dir.path(), "demo", DEMO);
        let mut engine = engine();
        let options = SessionOptions {
            connect_ports: false,
            ..SessionOptions::default()
        };

        Session::construct(dir.path(), "demo", &mut engine, &options, &MessageBus::new())
            .unwrap();
        assert!(!engine.is_connected("host:Audio 1/audio_out 1", "system:playback_1"));
    }

    #[test]
    fn test_bad_connection_and_rate_mismatch_are_warnings() {
        let dir = tempdir().unwrap();
        write_session(
            dir.path(),
            "warn",
            "name: warn\nsample_rate: 44100\ntracks:\n  - name: Vox\n    channels: 1\nconnections:\n  - from: Vox/audio_out 1\n    to: system:playback_42\n",
        );
        let mut engine = engine();
        let messages = MessageBus::new();

        let session = Session::construct(
            dir.path(),
            "warn",
            &mut engine,
            &SessionOptions::default(),
            &messages,
        );
        assert!(session.is_ok());
        assert_eq!(messages.count(MessageLevel::Warning), 2);
    }

    #[test]
    fn test_unbind_releases_ports() {
        let dir = tempdir().unwrap();
        write_session(dir.path(), "demo", DEMO);
        let mut engine = engine();

        let mut session = Session::construct(
            dir.path(),
            "demo",
            &mut engine,
            &SessionOptions::default(),
            &MessageBus::new(),
        )
        .unwrap();
        engine.bind(session.process_handler());
        assert!(engine.has_session());

        session.unbind(&mut engine).unwrap();
        assert!(!engine.has_session());
        assert_eq!(engine.client_port_count(), 0);
        assert!(session.ports().is_empty());
        session.destroy();
    }

    #[test]
    fn test_transport_applies_requested_speed_on_next_cycle() {
        let transport = Transport::default();
        transport.process(256);
        assert_eq!(transport.position(), 0);

        transport.request_speed(1.0);
        assert_eq!(transport.speed(), 0.0);

        transport.process(256);
        assert_eq!(transport.speed(), 1.0);
        assert_eq!(transport.position(), 256);

        transport.request_speed(0.5);
        transport.process(256);
        assert_eq!(transport.position(), 384);
    }
}
