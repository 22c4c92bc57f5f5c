//! Connection types for the graph.

use crate::core::error::{ConnectionId, NodeId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An endpoint of a connection: a node and the position of one of its
/// outputs (for the upstream end) or inputs (for the downstream end).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// The node ID.
    pub node_id: NodeId,
    /// Output or input index on that node.
    pub port: usize,
}

impl Endpoint {
    /// Create a new endpoint.
    pub fn new(node_id: NodeId, port: usize) -> Self {
        Self { node_id, port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.node_id, self.port)
    }
}

/// A connection from an output of one node to an input of another.
///
/// The downstream node only refers to its producer; outputs are owned by the
/// producing node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    /// Unique identifier for this connection.
    pub id: ConnectionId,
    /// Source endpoint (output index).
    pub from: Endpoint,
    /// Target endpoint (input index).
    pub to: Endpoint,
}

impl Connection {
    /// Create a new connection.
    pub fn new(from: Endpoint, to: Endpoint) -> Self {
        Self {
            id: ConnectionId::new(),
            from,
            to,
        }
    }
}
