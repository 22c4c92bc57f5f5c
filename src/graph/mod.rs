//! Graph module for managing processing graphs.
//!
//! A processing graph is a directed acyclic graph (DAG) where nodes represent
//! filter operations and edges connect one node's output to another node's
//! input.

pub mod structure;
pub mod connection;
pub mod topology;

// Re-export commonly used types
pub use structure::{GraphNode, ProcessingGraph};
pub use connection::{Connection, Endpoint};
pub use topology::TopologyAnalyzer;
