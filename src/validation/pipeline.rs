//! Validation pipeline implementation.

use crate::core::error::ValidationReport;
use crate::graph::structure::ProcessingGraph;
use crate::validation::stages::{MetadataValidation, StructuralValidation, ValidationStage};
use log::debug;
use std::time::Instant;

/// Multi-stage validation pipeline.
///
/// Runs a series of validation stages on a graph before any update. A stage
/// that reports errors stops the pipeline, since later stages assume the
/// earlier ones passed.
pub struct ValidationPipeline<const D: usize> {
    stages: Vec<Box<dyn ValidationStage<D>>>,
}

impl<const D: usize> ValidationPipeline<D> {
    /// Create a new pipeline with the given stages.
    pub fn new(stages: Vec<Box<dyn ValidationStage<D>>>) -> Self {
        Self { stages }
    }

    /// Structural checks, then a dry information pass.
    pub fn default_pipeline() -> Self {
        Self {
            stages: vec![Box::new(StructuralValidation), Box::new(MetadataValidation)],
        }
    }

    /// Structural checks only.
    pub fn minimal_pipeline() -> Self {
        Self {
            stages: vec![Box::new(StructuralValidation)],
        }
    }

    pub fn add_stage(&mut self, stage: Box<dyn ValidationStage<D>>) {
        self.stages.push(stage);
    }

    /// Validate a graph through all stages.
    pub fn validate(&self, graph: &ProcessingGraph<D>) -> ValidationReport {
        let start = Instant::now();
        let mut report = ValidationReport::new();

        for stage in &self.stages {
            match stage.validate(graph) {
                Ok(warnings) => {
                    for warning in warnings {
                        report.add_warning(warning);
                    }
                }
                Err(errors) => {
                    debug!("{} found {} error(s)", stage.name(), errors.len());
                    for error in errors {
                        report.add_error(error);
                    }
                    break;
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        report
    }

    /// Quick validation - just check if the graph can be updated.
    pub fn can_execute(&self, graph: &ProcessingGraph<D>) -> bool {
        self.validate(graph).can_execute()
    }
}

impl<const D: usize> Default for ValidationPipeline<D> {
    fn default() -> Self {
        Self::default_pipeline()
    }
}
