use crate::topology::{Port, PortId, TopologySnapshot};

/// Most ports the matrix shows; the board has four USB sockets.
pub const MAX_PORTS: usize = 4;

/// Square table of which port feeds which.
///
/// Rows are senders, columns receivers, both in the same order, so index
/// `i` names the same device on either axis. Only duplex ports are placed
/// on the axes. Never edited after `build`; a topology change builds a new
/// one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionMatrix {
    ports: Vec<Port>,
    cells: Vec<Vec<bool>>,
}

impl ConnectionMatrix {
    pub fn empty() -> ConnectionMatrix {
        ConnectionMatrix::default()
    }

    pub fn build(snapshot: &TopologySnapshot) -> ConnectionMatrix {
        let ports: Vec<Port> = snapshot
            .ports
            .iter()
            .filter(|p| p.capability.is_duplex())
            .take(MAX_PORTS)
            .cloned()
            .collect();
        let cells = ports
            .iter()
            .map(|sender| {
                ports
                    .iter()
                    .map(|dest| snapshot.is_connected(sender.id, dest.id))
                    .collect()
            })
            .collect();
        ConnectionMatrix { ports, cells }
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// `None` when the cell is outside the matrix.
    pub fn is_connected(&self, row: usize, col: usize) -> Option<bool> {
        self.cells.get(row)?.get(col).copied()
    }

    pub fn port(&self, index: usize) -> Option<&Port> {
        self.ports.get(index)
    }

    pub fn port_id(&self, index: usize) -> Option<PortId> {
        self.ports.get(index).map(|p| p.id)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.ports.iter().map(|p| p.label.as_str()).collect()
    }

    /// Connected `(row, col)` cells in row-major order.
    pub fn connections(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.cells.iter().enumerate().flat_map(|(r, row)| {
            row.iter()
                .enumerate()
                .filter(|(_, connected)| **connected)
                .map(move |(c, _)| (r, c))
        })
    }
}
