//! Port registry owned by the engine.

use std::collections::{BTreeMap, BTreeSet};

use super::backend::{BackendError, HardwarePort};

/// Data type carried by a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Audio,
    Midi,
}

/// Direction of a port as seen by the engine.
///
/// Capture ports are outputs (they produce data), playback ports are inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

#[derive(Debug, Clone)]
struct PortEntry {
    kind: PortKind,
    direction: PortDirection,
    physical: bool,
}

/// Registered ports and the connections between them.
#[derive(Debug)]
pub(crate) struct PortRegistry {
    ports: BTreeMap<String, PortEntry>,
    connections: BTreeSet<(String, String)>,
    capacity: usize,
    client_ports: usize,
}

impl PortRegistry {
    pub(crate) fn new(capacity: usize, hardware: Vec<HardwarePort>) -> Self {
        let ports = hardware
            .into_iter()
            .map(|port| {
                (
                    port.name,
                    PortEntry {
                        kind: port.kind,
                        direction: port.direction,
                        physical: true,
                    },
                )
            })
            .collect();

        Self {
            ports,
            connections: BTreeSet::new(),
            capacity,
            client_ports: 0,
        }
    }

    pub(crate) fn register(
        &mut self,
        name: String,
        kind: PortKind,
        direction: PortDirection,
    ) -> Result<(), BackendError> {
        if self.ports.contains_key(&name) {
            return Err(BackendError::DuplicatePort(name));
        }
        if self.client_ports >= self.capacity {
            return Err(BackendError::PortLimit(self.capacity));
        }

        self.ports.insert(
            name,
            PortEntry {
                kind,
                direction,
                physical: false,
            },
        );
        self.client_ports += 1;
        Ok(())
    }

    pub(crate) fn unregister(&mut self, name: &str) -> Result<(), BackendError> {
        match self.ports.get(name) {
            Some(entry) if !entry.physical => {}
            _ => return Err(BackendError::UnknownPort(name.to_string())),
        }

        self.ports.remove(name);
        self.client_ports -= 1;
        self.connections
            .retain(|(from, to)| from.as_str() != name && to.as_str() != name);
        Ok(())
    }

    pub(crate) fn connect(&mut self, from: &str, to: &str) -> Result<(), BackendError> {
        let source = self
            .ports
            .get(from)
            .ok_or_else(|| BackendError::UnknownPort(from.to_string()))?;
        let destination = self
            .ports
            .get(to)
            .ok_or_else(|| BackendError::UnknownPort(to.to_string()))?;

        let invalid = |reason| BackendError::InvalidConnection {
            from: from.to_string(),
            to: to.to_string(),
            reason,
        };

        if source.direction != PortDirection::Output {
            return Err(invalid("source is not an output"));
        }
        if destination.direction != PortDirection::Input {
            return Err(invalid("destination is not an input"));
        }
        if source.kind != destination.kind {
            return Err(invalid("port types differ"));
        }

        self.connections.insert((from.to_string(), to.to_string()));
        Ok(())
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.ports.contains_key(name)
    }

    pub(crate) fn is_connected(&self, from: &str, to: &str) -> bool {
        self.connections
            .contains(&(from.to_string(), to.to_string()))
    }

    pub(crate) fn client_port_count(&self) -> usize {
        self.client_ports
    }
}
