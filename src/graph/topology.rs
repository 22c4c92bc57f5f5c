//! Topological analysis and sorting of graphs.
//!
//! Provides algorithms for:
//! - Topological sorting (execution order)
//! - The sub-pipeline feeding one node (update order)
//! - Dependency analysis

use crate::core::error::{GraphError, GraphResult, NodeId};
use crate::graph::structure::ProcessingGraph;
use std::collections::{HashMap, HashSet, VecDeque};

/// Analyzer for graph topology.
pub struct TopologyAnalyzer<'a, const D: usize> {
    graph: &'a ProcessingGraph<D>,
}

impl<'a, const D: usize> TopologyAnalyzer<'a, D> {
    /// Create a new analyzer for the given graph.
    pub fn new(graph: &'a ProcessingGraph<D>) -> Self {
        Self { graph }
    }

    /// Get the topological sort order (Kahn's algorithm).
    ///
    /// Returns nodes in an order where producers come before consumers. Ties
    /// are broken by insertion order.
    pub fn topological_sort(&self) -> GraphResult<Vec<NodeId>> {
        let all: Vec<NodeId> = self.graph.node_ids().collect();
        self.sort_subset(&all)
    }

    /// Nodes `target` depends on, plus `target` itself, producers first.
    pub fn upstream_order(&self, target: NodeId) -> GraphResult<Vec<NodeId>> {
        if !self.graph.has_node(target) {
            return Err(GraphError::NodeNotFound(target));
        }
        let mut members: HashSet<NodeId> = self.graph.get_upstream(target).into_iter().collect();
        members.insert(target);

        let subset: Vec<NodeId> = self
            .graph
            .node_ids()
            .filter(|id| members.contains(id))
            .collect();
        self.sort_subset(&subset)
    }

    fn sort_subset(&self, subset: &[NodeId]) -> GraphResult<Vec<NodeId>> {
        let members: HashSet<NodeId> = subset.iter().copied().collect();
        let mut in_degree: HashMap<NodeId, usize> = subset.iter().map(|&id| (id, 0)).collect();
        let mut adjacency: HashMap<NodeId, Vec<NodeId>> = HashMap::new();

        for conn in self.graph.connections() {
            if members.contains(&conn.from.node_id) && members.contains(&conn.to.node_id) {
                adjacency
                    .entry(conn.from.node_id)
                    .or_default()
                    .push(conn.to.node_id);
                *in_degree.entry(conn.to.node_id).or_default() += 1;
            }
        }

        // Start with nodes that have no incoming edges
        let mut queue: VecDeque<NodeId> = subset
            .iter()
            .copied()
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();

        let mut result = Vec::with_capacity(subset.len());

        while let Some(node) = queue.pop_front() {
            result.push(node);

            for neighbor in adjacency.get(&node).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(neighbor) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*neighbor);
                    }
                }
            }
        }

        // If we haven't visited all nodes, there's a cycle
        if result.len() != subset.len() {
            let remaining: Vec<NodeId> = in_degree
                .iter()
                .filter(|(_, degree)| **degree > 0)
                .map(|(&id, _)| id)
                .collect();

            return Err(GraphError::CycleDetected { nodes: remaining });
        }

        Ok(result)
    }

    /// Get the execution depth of a node.
    ///
    /// Depth 0 = source nodes (no dependencies)
    pub fn node_depth(&self, node_id: NodeId) -> GraphResult<usize> {
        let order = self.upstream_order(node_id)?;
        let mut depth: HashMap<NodeId, usize> = HashMap::new();

        for id in order {
            let d = self
                .graph
                .connections_to(id)
                .filter_map(|conn| depth.get(&conn.from.node_id))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(id, d);
        }

        Ok(depth.get(&node_id).copied().unwrap_or(0))
    }

    /// Check if the graph has any cycles.
    pub fn has_cycle(&self) -> bool {
        self.topological_sort().is_err()
    }

    /// Find all disconnected subgraphs.
    pub fn find_subgraphs(&self) -> Vec<HashSet<NodeId>> {
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut subgraphs = Vec::new();

        for node_id in self.graph.node_ids() {
            if !visited.contains(&node_id) {
                let subgraph = self.flood_fill(node_id);
                visited.extend(&subgraph);
                subgraphs.push(subgraph);
            }
        }

        subgraphs
    }

    /// Flood fill to find all connected nodes (ignoring edge direction).
    fn flood_fill(&self, start: NodeId) -> HashSet<NodeId> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            if visited.insert(current) {
                for conn in self.graph.connections_from(current) {
                    queue.push_back(conn.to.node_id);
                }
                for conn in self.graph.connections_to(current) {
                    queue.push_back(conn.from.node_id);
                }
            }
        }

        visited
    }
}
