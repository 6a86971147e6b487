//! Adapters from asynchronous shutdown triggers onto the shutdown channel.
//!
//! Three producers exist: termination signals, the engine's halt
//! notification and control-surface actions. Each one ends in a single
//! [`ShutdownNotifier::deliver`]; the consumer never learns which fired.

use std::io;

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::SigId;
use tracing::{debug, error, info, trace};

use crate::channel::{ShutdownNotifier, SHUTDOWN_TOKEN};

/// Signals that request an orderly shutdown.
pub const TERMINATION_SIGNALS: [i32; 2] = [SIGINT, SIGTERM];

/// Action group of the quit action.
pub const QUIT_GROUP: &str = "Common";

/// Action item of the quit action.
pub const QUIT_ITEM: &str = "Quit";

/// The closed set of shutdown producers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSource {
    /// SIGINT or SIGTERM
    Signal,
    /// The backend stopped on its own
    EngineHalted,
    /// A control surface triggered `Common/Quit`
    QuitAction,
}

/// Cloneable trigger handle given to callbacks running on foreign threads.
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    notifier: ShutdownNotifier,
}

impl TriggerHandle {
    /// Called on the engine's process thread when the backend stops unexpectedly.
    pub fn engine_halted(&self, reason: Option<&str>) {
        match reason.filter(|r| !r.is_empty()) {
            Some(reason) => error!("The audio backend has been shutdown: {}", reason),
            None => error!("The audio backend has been shutdown."),
        }
        self.fire(ShutdownSource::EngineHalted);
    }

    /// Called by a control surface for every action it triggers.
    ///
    /// Returns `true` if the action requested shutdown.
    pub fn access_action(&self, group: &str, item: &str) -> bool {
        if group != QUIT_GROUP || item != QUIT_ITEM {
            trace!(group, item, "Ignoring action");
            return false;
        }

        info!("Quit action received");
        self.fire(ShutdownSource::QuitAction);
        true
    }

    fn fire(&self, source: ShutdownSource) {
        debug!(?source, "Delivering shutdown request");
        self.notifier.deliver(SHUTDOWN_TOKEN);
    }
}

/// Owns the signal registrations and hands out [`TriggerHandle`]s.
///
/// Signal handlers are removed when the bridge is dropped.
pub struct EventBridge {
    handle: TriggerHandle,
    signal_ids: Vec<SigId>,
}

impl EventBridge {
    /// Create a bridge feeding the given notifier.
    pub fn new(notifier: ShutdownNotifier) -> Self {
        Self {
            handle: TriggerHandle { notifier },
            signal_ids: Vec::new(),
        }
    }

    /// Route SIGINT and SIGTERM into the channel.
    ///
    /// The installed handler only writes one byte to a duplicate of the
    /// channel's write end.
    pub fn install_signal_handlers(&mut self) -> io::Result<()> {
        for signal in TERMINATION_SIGNALS {
            let pipe = self.handle.notifier.signal_pipe()?;
            let id = signal_hook::low_level::pipe::register(signal, pipe)?;
            self.signal_ids.push(id);
            debug!(signal, "Termination signal routed to shutdown channel");
        }
        Ok(())
    }

    /// Whether signal handlers are currently installed.
    pub fn has_signal_handlers(&self) -> bool {
        !self.signal_ids.is_empty()
    }

    /// Get a handle for engine-halt and control-surface callbacks.
    pub fn handle(&self) -> TriggerHandle {
        self.handle.clone()
    }

    /// See [`TriggerHandle::engine_halted`].
    pub fn engine_halted(&self, reason: Option<&str>) {
        self.handle.engine_halted(reason);
    }

    /// See [`TriggerHandle::access_action`].
    pub fn access_action(&self, group: &str, item: &str) -> bool {
        self.handle.access_action(group, item)
    }
}

impl Drop for EventBridge {
    fn drop(&mut self) {
        for id in self.signal_ids.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ShutdownChannel;

    #[test]
    fn test_quit_action_delivers() {
        let channel = ShutdownChannel::new().unwrap();
        let bridge = EventBridge::new(channel.notifier());

        assert!(bridge.access_action("Common", "Quit"));
        assert!(channel.try_receive().unwrap().is_some());
    }

    #[test]
    fn test_other_actions_are_ignored() {
        let channel = ShutdownChannel::new().unwrap();
        let bridge = EventBridge::new(channel.notifier());

        assert!(!bridge.access_action("Common", "Save"));
        assert!(!bridge.access_action("Transport", "Quit"));
        assert!(!bridge.access_action("common", "quit"));
        assert!(!bridge.access_action("", ""));

        assert_eq!(channel.try_receive().unwrap(), None);
    }

    #[test]
    fn test_engine_halted_delivers_with_and_without_reason() {
        let channel = ShutdownChannel::new().unwrap();
        let handle = EventBridge::new(channel.notifier()).handle();

        handle.engine_halted(Some("device removed"));
        assert!(channel.try_receive().unwrap().is_some());

        handle.engine_halted(None);
        assert!(channel.try_receive().unwrap().is_some());

        handle.engine_halted(Some(""));
        assert!(channel.try_receive().unwrap().is_some());
    }

    #[test]
    fn test_handle_from_other_thread() {
        let channel = ShutdownChannel::new().unwrap();
        let handle = EventBridge::new(channel.notifier()).handle();

        std::thread::spawn(move || handle.engine_halted(Some("xrun storm")))
            .join()
            .unwrap();

        channel.receive().unwrap();
    }

    #[test]
    fn test_no_signal_handlers_by_default() {
        let channel = ShutdownChannel::new().unwrap();
        let bridge = EventBridge::new(channel.notifier());
        assert!(!bridge.has_signal_handlers());
    }
}
