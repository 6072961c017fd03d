//! In-process topology source.
//!
//! Keeps the port graph in memory and announces every change on an event
//! channel, exactly as a sequencer would. Also records the subscribe and
//! unsubscribe requests it receives, so tests can assert on them.

use super::{Capability, Port, PortId, PortTopologySource, TopologyError, TopologyEvent};

use std::collections::BTreeSet;
use std::sync::Mutex;

use crossbeam::channel;

/// A subscribe/unsubscribe request as received by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Subscribe { sender: PortId, dest: PortId },
    Unsubscribe { sender: PortId, dest: PortId },
}

struct Graph {
    ports: Vec<Port>,
    subscriptions: BTreeSet<(PortId, PortId)>,
    requests: Vec<Request>,
    next_client: i32,
    failing: bool,
}

pub struct MemoryTopology {
    graph: Mutex<Graph>,
    event_tx: Mutex<Option<channel::Sender<TopologyEvent>>>,
    event_rx: channel::Receiver<TopologyEvent>,
}

impl MemoryTopology {
    /// Client ids handed out start where ALSA starts numbering user clients.
    pub const FIRST_CLIENT: i32 = 20;

    pub fn new() -> MemoryTopology {
        let (event_tx, event_rx) = channel::unbounded();
        MemoryTopology {
            graph: Mutex::new(Graph {
                ports: Vec::new(),
                subscriptions: BTreeSet::new(),
                requests: Vec::new(),
                next_client: Self::FIRST_CLIENT,
                failing: false,
            }),
            event_tx: Mutex::new(Some(event_tx)),
            event_rx,
        }
    }

    fn announce(&self, event: TopologyEvent) {
        if let Some(tx) = &*self.event_tx.lock().unwrap() {
            let _ = tx.send(event);
        }
    }

    /// Adds a port on a fresh client and announces it.
    pub fn add_port(&self, label: &str, capability: Capability) -> PortId {
        let id = {
            let mut graph = self.graph.lock().unwrap();
            let id = PortId::new(graph.next_client, 0);
            graph.next_client += 1;
            graph.ports.push(Port::new(id, label, capability));
            id
        };
        self.announce(TopologyEvent::PortAppeared(id));
        id
    }

    /// Removes a port along with every subscription it takes part in.
    pub fn remove_port(&self, id: PortId) -> Result<(), TopologyError> {
        {
            let mut graph = self.graph.lock().unwrap();
            let before = graph.ports.len();
            graph.ports.retain(|p| p.id != id);
            if graph.ports.len() == before {
                return Err(TopologyError::UnknownPort(id));
            }
            graph
                .subscriptions
                .retain(|(sender, dest)| *sender != id && *dest != id);
        }
        self.announce(TopologyEvent::PortDisappeared(id));
        Ok(())
    }

    /// Injects an arbitrary event, e.g. `TopologyEvent::Other`.
    pub fn push_event(&self, event: TopologyEvent) {
        self.announce(event);
    }

    /// Makes subscribe/unsubscribe fail with an I/O error.
    pub fn set_failing(&self, failing: bool) {
        self.graph.lock().unwrap().failing = failing;
    }

    pub fn requests(&self) -> Vec<Request> {
        self.graph.lock().unwrap().requests.clone()
    }

    pub fn is_connected(&self, sender: PortId, dest: PortId) -> bool {
        self.graph
            .lock()
            .unwrap()
            .subscriptions
            .contains(&(sender, dest))
    }

    /// Stops event delivery; a blocked `wait_event` returns `Closed` once
    /// the queue is drained.
    pub fn close(&self) {
        self.event_tx.lock().unwrap().take();
    }

    fn require(graph: &Graph, id: PortId) -> Result<(), TopologyError> {
        if graph.ports.iter().any(|p| p.id == id) {
            Ok(())
        } else {
            Err(TopologyError::UnknownPort(id))
        }
    }
}

impl Default for MemoryTopology {
    fn default() -> Self {
        Self::new()
    }
}

impl PortTopologySource for MemoryTopology {
    fn ports(&self) -> Result<Vec<Port>, TopologyError> {
        Ok(self.graph.lock().unwrap().ports.clone())
    }

    fn subscribers(&self, sender: PortId) -> Result<Vec<PortId>, TopologyError> {
        let graph = self.graph.lock().unwrap();
        Self::require(&graph, sender)?;
        Ok(graph
            .subscriptions
            .iter()
            .filter(|(s, _)| *s == sender)
            .map(|(_, d)| *d)
            .collect())
    }

    fn subscribe(&self, sender: PortId, dest: PortId) -> Result<(), TopologyError> {
        {
            let mut graph = self.graph.lock().unwrap();
            graph.requests.push(Request::Subscribe { sender, dest });
            if graph.failing {
                return Err(TopologyError::Io("subscribe failed".to_string()));
            }
            Self::require(&graph, sender)?;
            Self::require(&graph, dest)?;
            if !graph.subscriptions.insert((sender, dest)) {
                return Ok(());
            }
        }
        self.announce(TopologyEvent::SubscriptionAdded { sender, dest });
        Ok(())
    }

    fn unsubscribe(&self, sender: PortId, dest: PortId) -> Result<(), TopologyError> {
        {
            let mut graph = self.graph.lock().unwrap();
            graph.requests.push(Request::Unsubscribe { sender, dest });
            if graph.failing {
                return Err(TopologyError::Io("unsubscribe failed".to_string()));
            }
            Self::require(&graph, sender)?;
            Self::require(&graph, dest)?;
            if !graph.subscriptions.remove(&(sender, dest)) {
                return Ok(());
            }
        }
        self.announce(TopologyEvent::SubscriptionRemoved { sender, dest });
        Ok(())
    }

    fn wait_event(&self) -> Result<TopologyEvent, TopologyError> {
        self.event_rx.recv().map_err(|_| TopologyError::Closed)
    }
}
