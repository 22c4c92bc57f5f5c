//! Error types for rasterflow.
//!
//! Uses thiserror for structured errors with context. Every failure that can
//! happen during an `update()` cycle surfaces as a single [`PipelineError`]:
//! - out-of-bounds requests are detected before any buffer is allocated
//! - inconsistent metadata is detected during the information pass
//! - worker failures abort the dispatch and are re-raised once

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a node ID from a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Unique identifier for a connection in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Top-level error type for pipeline operations.
///
/// Regions are carried as their display strings so the error type does not
/// depend on the raster dimension.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A request falls entirely outside the available data of a node.
    #[error("Requested region {requested} of node {node_id} is outside the largest possible region {largest}")]
    OutOfBoundsRequest {
        node_id: NodeId,
        requested: String,
        largest: String,
    },

    /// Inputs or outputs disagree on metadata (component count, extent, ...).
    #[error("Inconsistent metadata on node {node_id}: {reason}")]
    InconsistentMetadata { node_id: NodeId, reason: String },

    /// A per-thread callback failed; remaining slabs were not dispatched.
    #[error("Worker {thread_id} of node {node_id} failed: {source}")]
    WorkerFailure {
        node_id: NodeId,
        thread_id: usize,
        #[source]
        source: Box<PipelineError>,
    },

    /// Invalid filter parameter, rejected when it was set.
    #[error("Invalid parameter '{parameter}': {reason}")]
    Configuration { parameter: String, reason: String },

    /// A required input is not connected.
    #[error("Missing input #{input} on node {node_id}")]
    MissingInput { node_id: NodeId, input: usize },

    /// Execution was aborted through an abort handle.
    #[error("Execution aborted")]
    Aborted,

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration file error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors related to graph structure and operations.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum GraphError {
    #[error("Node {0} not found")]
    NodeNotFound(NodeId),

    #[error("Connection {0} not found")]
    ConnectionNotFound(ConnectionId),

    #[error("Input #{input} not found on node {node_id}")]
    InputNotFound { node_id: NodeId, input: usize },

    #[error("Output #{output} not found on node {node_id}")]
    OutputNotFound { node_id: NodeId, output: usize },

    #[error("Cycle detected in graph involving nodes: {nodes:?}")]
    CycleDetected { nodes: Vec<NodeId> },

    #[error("Input #{input} on node {node_id} is already connected")]
    InputAlreadyConnected { node_id: NodeId, input: usize },

    #[error("Graph is empty")]
    EmptyGraph,
}

impl PipelineError {
    /// Get the node ID that caused this error, if applicable.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            PipelineError::OutOfBoundsRequest { node_id, .. }
            | PipelineError::InconsistentMetadata { node_id, .. }
            | PipelineError::WorkerFailure { node_id, .. }
            | PipelineError::MissingInput { node_id, .. } => Some(*node_id),
            PipelineError::Graph(GraphError::NodeNotFound(node_id)) => Some(*node_id),
            _ => None,
        }
    }

    /// Whether a caller may retry the same update, e.g. with a smaller region.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            PipelineError::Aborted
                | PipelineError::Configuration { .. }
                | PipelineError::InconsistentMetadata { .. }
                | PipelineError::Graph(_)
        )
    }

    /// Shorthand for a configuration error.
    pub fn configuration(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::Configuration {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for an inconsistent-metadata error.
    pub fn inconsistent(node_id: NodeId, reason: impl Into<String>) -> Self {
        PipelineError::InconsistentMetadata {
            node_id,
            reason: reason.into(),
        }
    }
}

/// Result type alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type alias for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

// ============================================================================
// Validation Report
// ============================================================================

/// Report produced by the validation pipeline.
#[derive(Debug, Default)]
pub struct ValidationReport {
    /// Whether validation passed without errors.
    pub success: bool,
    /// List of errors found.
    pub errors: Vec<PipelineError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<ValidationWarning>,
    /// Time taken for validation in milliseconds.
    pub duration_ms: u64,
}

/// Non-fatal validation warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    /// Warning message.
    pub message: String,
    /// Node that triggered the warning, if applicable.
    pub node_id: Option<NodeId>,
    /// How the warning could be addressed.
    pub suggestion: Option<String>,
}

impl ValidationReport {
    /// Create a new empty report (success).
    pub fn new() -> Self {
        Self {
            success: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Add an error to the report.
    pub fn add_error(&mut self, error: PipelineError) {
        self.success = false;
        self.errors.push(error);
    }

    /// Add a warning to the report.
    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Check if the graph can be updated.
    pub fn can_execute(&self) -> bool {
        self.success
    }

    /// Get a human-readable summary.
    pub fn summary(&self) -> String {
        if self.success {
            if self.warnings.is_empty() {
                "Pipeline is valid".to_string()
            } else {
                format!("Pipeline is valid with {} warning(s)", self.warnings.len())
            }
        } else {
            format!("Validation failed with {} error(s)", self.errors.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display() {
        let id = NodeId::new();
        assert_eq!(format!("{}", id).len(), 8);
    }

    #[test]
    fn test_error_node_id() {
        let node_id = NodeId::new();
        let error = PipelineError::inconsistent(node_id, "component mismatch");
        assert_eq!(error.node_id(), Some(node_id));
        assert!(!error.is_recoverable());

        let failure = PipelineError::WorkerFailure {
            node_id,
            thread_id: 3,
            source: Box::new(PipelineError::Other("boom".to_string())),
        };
        assert_eq!(failure.node_id(), Some(node_id));
        assert!(failure.is_recoverable());
        assert!(failure.to_string().contains("boom"));
    }

    #[test]
    fn test_validation_report() {
        let mut report = ValidationReport::new();
        assert!(report.can_execute());

        report.add_error(PipelineError::Graph(GraphError::EmptyGraph));
        assert!(!report.can_execute());
        assert_eq!(report.errors.len(), 1);
    }
}
