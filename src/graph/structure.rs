//! Graph structure and node management.
//!
//! The ProcessingGraph is the central data structure that holds all nodes
//! and their connections. Nodes never own their upstream producers: an input
//! is a connection record pointing at another node's output index, which
//! keeps diamond-shaped graphs free of ownership cycles.

use crate::core::error::{ConnectionId, GraphError, GraphResult, NodeId, PipelineResult};
use crate::core::node::FilterNode;
use crate::core::timestamp::Stamp;
use crate::core::types::Value;
use crate::graph::connection::{Connection, Endpoint};
use indexmap::IndexMap;
use std::collections::{HashSet, VecDeque};

/// A node instance in the graph.
pub struct GraphNode<const D: usize> {
    /// Unique identifier
    pub id: NodeId,
    filter: Box<dyn FilterNode<D>>,
    /// Optional display name override
    pub label: Option<String>,
    modified: Stamp,
}

impl<const D: usize> std::fmt::Debug for GraphNode<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphNode")
            .field("id", &self.id)
            .field("filter", &self.filter.metadata().id)
            .field("label", &self.label)
            .field("modified", &self.modified)
            .finish()
    }
}

impl<const D: usize> GraphNode<D> {
    /// Create a new graph node with a filter.
    pub fn new(filter: Box<dyn FilterNode<D>>) -> Self {
        Self {
            id: NodeId::new(),
            filter,
            label: None,
            modified: Stamp::next(),
        }
    }

    /// Create with a specific ID.
    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = id;
        self
    }

    /// Set the display label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Get the display name (label or filter name).
    pub fn display_name(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.filter.metadata().name)
    }

    /// The filter implementation.
    pub fn filter(&self) -> &dyn FilterNode<D> {
        self.filter.as_ref()
    }

    /// Stamp of the last change to this node's parameters or inputs.
    pub fn modified(&self) -> Stamp {
        self.modified
    }

    /// Mark the node as modified.
    pub fn touch(&mut self) {
        self.modified = Stamp::next();
    }
}

/// The main processing graph structure.
///
/// Uses IndexMap to maintain insertion order for consistent iteration.
pub struct ProcessingGraph<const D: usize> {
    /// All nodes in the graph, indexed by ID.
    nodes: IndexMap<NodeId, GraphNode<D>>,
    /// All connections in the graph.
    connections: Vec<Connection>,
    /// Optional name for this graph.
    pub name: Option<String>,
}

impl<const D: usize> ProcessingGraph<D> {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            nodes: IndexMap::new(),
            connections: Vec::new(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    // ========================================================================
    // Node Management
    // ========================================================================

    /// Add a node to the graph.
    pub fn add_node(&mut self, node: GraphNode<D>) -> NodeId {
        let id = node.id;
        self.nodes.insert(id, node);
        id
    }

    /// Add a filter and return the new node ID.
    pub fn add_filter<F: FilterNode<D> + 'static>(&mut self, filter: F) -> NodeId {
        self.add_node(GraphNode::new(Box::new(filter)))
    }

    /// Add an already boxed filter (e.g. from the registry).
    pub fn add_boxed(&mut self, filter: Box<dyn FilterNode<D>>) -> NodeId {
        self.add_node(GraphNode::new(filter))
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all connections involving this node.
    pub fn remove_node(&mut self, id: NodeId) -> GraphResult<GraphNode<D>> {
        let node = self
            .nodes
            .shift_remove(&id)
            .ok_or(GraphError::NodeNotFound(id))?;

        let downstream: Vec<NodeId> = self.connections_from(id).map(|c| c.to.node_id).collect();
        self.connections
            .retain(|conn| conn.from.node_id != id && conn.to.node_id != id);
        for node_id in downstream {
            if let Some(node) = self.nodes.get_mut(&node_id) {
                node.touch();
            }
        }

        Ok(node)
    }

    /// Get a reference to a node.
    pub fn get_node(&self, id: NodeId) -> GraphResult<&GraphNode<D>> {
        self.nodes.get(&id).ok_or(GraphError::NodeNotFound(id))
    }

    /// Mutable access to a node's filter. Marks the node as modified.
    pub fn filter_mut(&mut self, id: NodeId) -> GraphResult<&mut dyn FilterNode<D>> {
        let node = self.nodes.get_mut(&id).ok_or(GraphError::NodeNotFound(id))?;
        node.touch();
        Ok(node.filter.as_mut())
    }

    /// Set a filter parameter by name. Marks the node as modified on success.
    pub fn set_parameter(&mut self, id: NodeId, name: &str, value: Value) -> PipelineResult<()> {
        let node = self.nodes.get_mut(&id).ok_or(GraphError::NodeNotFound(id))?;
        node.filter.set_parameter(name, &value)?;
        node.touch();
        Ok(())
    }

    /// Check if a node exists.
    pub fn has_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Get all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode<D>> {
        self.nodes.values()
    }

    /// Get all node IDs.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Get the number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ========================================================================
    // Connection Management
    // ========================================================================

    /// Connect output `from_output` of `from_node` to input `to_input` of
    /// `to_node`.
    pub fn connect(
        &mut self,
        from_node: NodeId,
        from_output: usize,
        to_node: NodeId,
        to_input: usize,
    ) -> GraphResult<ConnectionId> {
        let from_metadata = self.get_node(from_node)?.filter.metadata();
        let to_metadata = self.get_node(to_node)?.filter.metadata();

        if from_output >= from_metadata.outputs.len() {
            return Err(GraphError::OutputNotFound {
                node_id: from_node,
                output: from_output,
            });
        }

        if !to_metadata.variadic_inputs && to_input >= to_metadata.inputs.len() {
            return Err(GraphError::InputNotFound {
                node_id: to_node,
                input: to_input,
            });
        }

        if self.is_input_connected(to_node, to_input) {
            return Err(GraphError::InputAlreadyConnected {
                node_id: to_node,
                input: to_input,
            });
        }

        if self.would_create_cycle(from_node, to_node) {
            return Err(GraphError::CycleDetected {
                nodes: vec![from_node, to_node],
            });
        }

        let connection = Connection::new(
            Endpoint::new(from_node, from_output),
            Endpoint::new(to_node, to_input),
        );
        let id = connection.id;
        self.connections.push(connection);
        if let Some(node) = self.nodes.get_mut(&to_node) {
            node.touch();
        }
        Ok(id)
    }

    /// Remove a connection by ID.
    pub fn disconnect(&mut self, id: ConnectionId) -> GraphResult<Connection> {
        let pos = self
            .connections
            .iter()
            .position(|c| c.id == id)
            .ok_or(GraphError::ConnectionNotFound(id))?;

        let connection = self.connections.remove(pos);
        if let Some(node) = self.nodes.get_mut(&connection.to.node_id) {
            node.touch();
        }
        Ok(connection)
    }

    /// Get all connections.
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Get all connections from a node.
    pub fn connections_from(&self, node_id: NodeId) -> impl Iterator<Item = &Connection> {
        self.connections
            .iter()
            .filter(move |c| c.from.node_id == node_id)
    }

    /// Get all connections to a node.
    pub fn connections_to(&self, node_id: NodeId) -> impl Iterator<Item = &Connection> {
        self.connections
            .iter()
            .filter(move |c| c.to.node_id == node_id)
    }

    /// Check if an input is already connected.
    pub fn is_input_connected(&self, node_id: NodeId, input: usize) -> bool {
        self.connections
            .iter()
            .any(|c| c.to.node_id == node_id && c.to.port == input)
    }

    /// Producers of a node's inputs, indexed by input position.
    ///
    /// The list covers every declared input and every connected variadic
    /// input; unconnected positions are `None`.
    pub fn input_endpoints(&self, node_id: NodeId) -> GraphResult<Vec<Option<Endpoint>>> {
        let node = self.get_node(node_id)?;
        let declared = node.filter.metadata().inputs.len();
        let connected = self
            .connections_to(node_id)
            .map(|c| c.to.port + 1)
            .max()
            .unwrap_or(0);

        let mut endpoints = vec![None; declared.max(connected)];
        for conn in self.connections_to(node_id) {
            endpoints[conn.to.port] = Some(conn.from);
        }
        Ok(endpoints)
    }

    /// Get the number of connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    // ========================================================================
    // Graph Analysis
    // ========================================================================

    /// Check if connecting from_node to to_node would create a cycle.
    fn would_create_cycle(&self, from_node: NodeId, to_node: NodeId) -> bool {
        // If from_node is reachable from to_node, adding this edge creates a cycle
        self.is_reachable(to_node, from_node)
    }

    /// Check if `target` is reachable from `start` following connections.
    pub fn is_reachable(&self, start: NodeId, target: NodeId) -> bool {
        if start == target {
            return true;
        }

        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            if current == target {
                return true;
            }

            if visited.insert(current) {
                for conn in self.connections_from(current) {
                    queue.push_back(conn.to.node_id);
                }
            }
        }

        false
    }

    /// Get all nodes that depend on the given node (downstream).
    pub fn get_downstream(&self, node_id: NodeId) -> Vec<NodeId> {
        self.walk(node_id, |graph, id| {
            graph.connections_from(id).map(|c| c.to.node_id).collect()
        })
    }

    /// Get all nodes that the given node depends on (upstream).
    pub fn get_upstream(&self, node_id: NodeId) -> Vec<NodeId> {
        self.walk(node_id, |graph, id| {
            graph.connections_to(id).map(|c| c.from.node_id).collect()
        })
    }

    fn walk(&self, start: NodeId, next: impl Fn(&Self, NodeId) -> Vec<NodeId>) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut queue: VecDeque<NodeId> = next(self, start).into();

        while let Some(current) = queue.pop_front() {
            if visited.insert(current) {
                result.push(current);
                queue.extend(next(self, current));
            }
        }

        result
    }

    /// Get nodes with no incoming connections (source nodes).
    pub fn get_source_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .keys()
            .filter(|&id| !self.connections.iter().any(|c| c.to.node_id == *id))
            .copied()
            .collect()
    }

    /// Get nodes with no outgoing connections (sink nodes).
    pub fn get_sink_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .keys()
            .filter(|&id| !self.connections.iter().any(|c| c.from.node_id == *id))
            .copied()
            .collect()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Clear all nodes and connections.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.connections.clear();
    }
}

impl<const D: usize> Default for ProcessingGraph<D> {
    fn default() -> Self {
        Self::new()
    }
}
