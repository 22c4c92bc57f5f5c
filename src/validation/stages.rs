//! Individual validation stages.
//!
//! Each stage checks for a specific category of errors.

use crate::core::error::{GraphError, PipelineError, ValidationWarning};
use crate::execution::engine::ExecutionEngine;
use crate::graph::structure::ProcessingGraph;
use crate::graph::topology::TopologyAnalyzer;

/// Trait for validation stages.
pub trait ValidationStage<const D: usize>: Send + Sync {
    /// Name of this validation stage.
    fn name(&self) -> &str;

    /// Validate the graph.
    ///
    /// Returns Ok with warnings, or Err with errors.
    fn validate(
        &self,
        graph: &ProcessingGraph<D>,
    ) -> Result<Vec<ValidationWarning>, Vec<PipelineError>>;
}

/// Structural validation - checks graph structure.
///
/// Verifies:
/// - Graph is a DAG (no cycles)
/// - Every connection leaves from an output the producer declares
/// - All required inputs are connected
pub struct StructuralValidation;

impl<const D: usize> ValidationStage<D> for StructuralValidation {
    fn name(&self) -> &str {
        "Structural Validation"
    }

    fn validate(
        &self,
        graph: &ProcessingGraph<D>,
    ) -> Result<Vec<ValidationWarning>, Vec<PipelineError>> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if graph.is_empty() {
            warnings.push(ValidationWarning {
                message: "Graph is empty".to_string(),
                node_id: None,
                suggestion: Some("Add a source node and the filters to run on it".to_string()),
            });
            return Ok(warnings);
        }

        let analyzer = TopologyAnalyzer::new(graph);
        if let Err(error) = analyzer.topological_sort() {
            errors.push(PipelineError::Graph(error));
        }

        for connection in graph.connections() {
            match graph.get_node(connection.from.node_id) {
                Ok(producer) => {
                    if connection.from.port >= producer.filter().metadata().outputs.len() {
                        errors.push(PipelineError::Graph(GraphError::OutputNotFound {
                            node_id: connection.from.node_id,
                            output: connection.from.port,
                        }));
                    }
                }
                Err(error) => errors.push(PipelineError::Graph(error)),
            }
        }

        for node in graph.nodes() {
            let metadata = node.filter().metadata();
            let endpoints = match graph.input_endpoints(node.id) {
                Ok(endpoints) => endpoints,
                Err(error) => {
                    errors.push(PipelineError::Graph(error));
                    continue;
                }
            };
            for (input, endpoint) in endpoints.iter().enumerate() {
                if endpoint.is_none() {
                    errors.push(PipelineError::MissingInput {
                        node_id: node.id,
                        input,
                    });
                }
            }
            if endpoints.is_empty() && !metadata.accepts_input_count(0) {
                errors.push(PipelineError::MissingInput {
                    node_id: node.id,
                    input: 0,
                });
            }
        }

        let subgraphs = analyzer.find_subgraphs();
        if subgraphs.len() > 1 {
            warnings.push(ValidationWarning {
                message: format!("Graph contains {} disconnected subgraphs", subgraphs.len()),
                node_id: None,
                suggestion: Some("Each subgraph is updated through its own target".to_string()),
            });
        }

        if errors.is_empty() {
            Ok(warnings)
        } else {
            Err(errors)
        }
    }
}

/// Metadata validation - a dry information pass from every sink node.
///
/// Catches component mismatches, extent mismatches and out-of-range regions
/// of interest without generating a single pixel.
pub struct MetadataValidation;

impl<const D: usize> ValidationStage<D> for MetadataValidation {
    fn name(&self) -> &str {
        "Metadata Validation"
    }

    fn validate(
        &self,
        graph: &ProcessingGraph<D>,
    ) -> Result<Vec<ValidationWarning>, Vec<PipelineError>> {
        let engine = ExecutionEngine::<D>::with_options(
            crate::execution::engine::ExecutionOptions::new()
                .with_threads(1)
                .with_cache(false),
        );
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for sink in graph.get_sink_nodes() {
            match engine.update_output_information(graph, sink) {
                Ok(outputs) => {
                    for (index, output) in outputs.iter().enumerate() {
                        if output.largest_possible_region().is_empty() {
                            warnings.push(ValidationWarning {
                                message: format!("Output #{} has an empty largest region", index),
                                node_id: Some(sink),
                                suggestion: Some("Check the sizes of upstream sources".to_string()),
                            });
                        }
                    }
                }
                Err(error) => {
                    let message = error.to_string();
                    if !errors.iter().any(|e: &PipelineError| e.to_string() == message) {
                        errors.push(error);
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(warnings)
        } else {
            Err(errors)
        }
    }
}
