//! Topology
//!
//! The MIDI port graph as seen by the matrix: ports, their capabilities,
//! which ports receive data from which, and the events announcing that any
//! of this changed.
//!
//! `PortTopologySource` is the seam to the MIDI subsystem. The ALSA
//! sequencer implementation lives in `alsa` (feature `alsa-seq`); `memory`
//! provides an in-process source for tests and dry runs.

#[cfg(feature = "alsa-seq")]
pub mod alsa;
pub mod memory;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

pub use memory::MemoryTopology;

/// Address of a port, as `client:port`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortId {
    pub client: i32,
    pub port: i32,
}

impl PortId {
    pub fn new(client: i32, port: i32) -> PortId {
        PortId { client, port }
    }
}

impl Display for PortId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.client, self.port)
    }
}

/// Which directions a port can be subscribed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capability {
    /// Port produces data other ports can subscribe to.
    pub source: bool,
    /// Port accepts data from other ports.
    pub sink: bool,
}

impl Capability {
    pub const DUPLEX: Capability = Capability {
        source: true,
        sink: true,
    };

    pub fn is_duplex(&self) -> bool {
        self.source && self.sink
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    pub id: PortId,
    pub label: String,
    pub capability: Capability,
}

impl Port {
    pub fn new(id: PortId, label: &str, capability: Capability) -> Port {
        Port {
            id,
            label: label.to_string(),
            capability,
        }
    }
}

/// Row label for a port of client `client`. A client with a single port is
/// labelled by its name. With several ports each gets its port number up
/// front, so labels stay apart after truncation, followed by the port name
/// minus any repeated client prefix.
pub fn port_label(client: &str, port_name: &str, port: i32, shared_client: bool) -> String {
    if !shared_client {
        return client.to_string();
    }
    let rest = port_name
        .strip_prefix(client)
        .unwrap_or(port_name)
        .trim();
    if rest.is_empty() {
        format!("{}:{}", port, client)
    } else {
        format!("{}:{}", port, rest)
    }
}

/// Notification from the topology source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyEvent {
    PortAppeared(PortId),
    PortDisappeared(PortId),
    SubscriptionAdded { sender: PortId, dest: PortId },
    SubscriptionRemoved { sender: PortId, dest: PortId },
    /// Anything else the source delivers (client renames, timer ticks, ...).
    Other,
}

impl TopologyEvent {
    /// True for the event kinds that can change the matrix.
    pub fn changes_topology(&self) -> bool {
        !matches!(self, TopologyEvent::Other)
    }
}

#[derive(Debug)]
pub enum TopologyError {
    /// The source has been shut down and will deliver no more events.
    Closed,
    /// No such port (it may have just disappeared).
    UnknownPort(PortId),
    /// The subsystem could not be opened.
    Unavailable(String),
    /// Low level failure from the subsystem.
    Io(String),
}

#[cfg(feature = "alsa-seq")]
impl From<::alsa::Error> for TopologyError {
    fn from(e: ::alsa::Error) -> Self {
        TopologyError::Io(e.to_string())
    }
}

/// Capability interface to the MIDI subsystem.
///
/// All methods take `&self`: a source is shared between the topology
/// listener thread (which parks in `wait_event`) and the input threads
/// (which issue subscribe/unsubscribe requests). Implementations must not
/// let a blocked `wait_event` hold up the other calls.
pub trait PortTopologySource: Send + Sync {
    /// Ports in a stable enumeration order.
    fn ports(&self) -> Result<Vec<Port>, TopologyError>;

    /// Ports currently receiving data from `sender`.
    fn subscribers(&self, sender: PortId) -> Result<Vec<PortId>, TopologyError>;

    fn subscribe(&self, sender: PortId, dest: PortId) -> Result<(), TopologyError>;

    fn unsubscribe(&self, sender: PortId, dest: PortId) -> Result<(), TopologyError>;

    /// Blocks until the next event is available.
    fn wait_event(&self) -> Result<TopologyEvent, TopologyError>;
}

/// Point-in-time copy of the port graph, the input to building a matrix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologySnapshot {
    pub ports: Vec<Port>,
    pub subscribers: BTreeMap<PortId, BTreeSet<PortId>>,
}

impl TopologySnapshot {
    pub fn new(ports: Vec<Port>) -> TopologySnapshot {
        TopologySnapshot {
            ports,
            subscribers: BTreeMap::new(),
        }
    }

    /// Records that `dest` receives data from `sender`.
    pub fn connect(&mut self, sender: PortId, dest: PortId) {
        self.subscribers.entry(sender).or_default().insert(dest);
    }

    pub fn is_connected(&self, sender: PortId, dest: PortId) -> bool {
        self.subscribers
            .get(&sender)
            .map_or(false, |subs| subs.contains(&dest))
    }

    /// Queries `source` for its ports and, for every source-capable port,
    /// its subscribers.
    pub fn capture<S: PortTopologySource + ?Sized>(
        source: &S,
    ) -> Result<TopologySnapshot, TopologyError> {
        let ports = source.ports()?;
        let mut snapshot = TopologySnapshot::new(Vec::with_capacity(ports.len()));
        for port in &ports {
            if !port.capability.source {
                continue;
            }
            match source.subscribers(port.id) {
                Ok(subs) => {
                    for dest in subs {
                        snapshot.connect(port.id, dest);
                    }
                }
                // Vanished between listing and querying; the event for it
                // is already queued and will trigger another capture.
                Err(TopologyError::UnknownPort(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        snapshot.ports = ports;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_of_one_client_get_distinct_labels() {
        assert_eq!(port_label("Keystep", "Keystep MIDI 1", 0, false), "Keystep");
        let a = port_label("LPProMK3", "LPProMK3 MIDI", 0, true);
        let b = port_label("LPProMK3", "LPProMK3 DIN", 1, true);
        assert_eq!(a, "0:MIDI");
        assert_eq!(b, "1:DIN");
        assert_eq!(port_label("Synth", "Synth", 2, true), "2:Synth");
        assert_eq!(port_label("Synth", "", 3, true), "3:Synth");
        assert_eq!(
            port_label("Hub", "Port A long name", 4, true),
            "4:Port A long name"
        );
    }

    #[test]
    fn only_other_is_filtered() {
        let a = PortId::new(20, 0);
        let b = PortId::new(24, 0);
        assert!(TopologyEvent::PortAppeared(a).changes_topology());
        assert!(TopologyEvent::PortDisappeared(a).changes_topology());
        assert!(TopologyEvent::SubscriptionAdded { sender: a, dest: b }.changes_topology());
        assert!(TopologyEvent::SubscriptionRemoved { sender: a, dest: b }.changes_topology());
        assert!(!TopologyEvent::Other.changes_topology());
    }

    #[test]
    fn capture_skips_sink_only_ports() {
        let topo = MemoryTopology::new();
        let a = topo.add_port("synth", Capability::DUPLEX);
        let b = topo.add_port(
            "speaker",
            Capability {
                source: false,
                sink: true,
            },
        );
        topo.subscribe(a, b).unwrap();

        let snap = TopologySnapshot::capture(&topo).unwrap();
        assert_eq!(snap.ports.len(), 2);
        assert!(snap.is_connected(a, b));
        assert!(!snap.subscribers.contains_key(&b));
    }

    #[test]
    fn port_id_display() {
        assert_eq!(PortId::new(128, 3).to_string(), "128:3");
    }
}
