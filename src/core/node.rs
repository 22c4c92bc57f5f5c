//! FilterNode trait and node metadata.
//!
//! A filter takes part in three passes of every update:
//!
//! 1. **Information** (`generate_output_information`): metadata only. Derives
//!    each output's largest possible region, geometry and component count
//!    from the inputs' metadata and the filter's own parameters.
//! 2. **Request** (`generate_input_requested_region`): maps the region asked
//!    of this node to the region needed from each input.
//! 3. **Execution** (`threaded_generate_data`): called once per disjoint slab
//!    of the already-allocated outputs, between the optional
//!    `before_threaded_generate_data` and `after_threaded_generate_data`
//!    hooks.

use crate::core::context::{ExecutionContext, InformationContext, RequestContext, ThreadContext};
use crate::core::descriptor::ImageDescriptor;
use crate::core::error::{PipelineError, PipelineResult};
use crate::core::port::{ParameterDefinition, PortDefinition};
use crate::core::raster::RasterSlabMut;
use crate::core::region::Region;
use crate::core::types::Value;
use serde::{Deserialize, Serialize};

/// Category for organizing filters in listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Nodes without inputs (readers, generators)
    Source,
    /// Per-pixel value mapping
    Intensity,
    /// Operations reading a window around each pixel
    Neighborhood,
    /// Translation, region extraction
    Geometry,
    /// Band splitting and stacking, blending
    Composite,
    /// Statistics and measurement
    Analyze,
    /// Utility nodes
    #[default]
    Utility,
}

impl Category {
    /// Get the display name for this category.
    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Source => "Source",
            Category::Intensity => "Intensity",
            Category::Neighborhood => "Neighborhood",
            Category::Geometry => "Geometry",
            Category::Composite => "Composite",
            Category::Analyze => "Analyze",
            Category::Utility => "Utility",
        }
    }

    /// Get all categories in display order.
    pub fn all() -> &'static [Category] {
        &[
            Category::Source,
            Category::Intensity,
            Category::Neighborhood,
            Category::Geometry,
            Category::Composite,
            Category::Analyze,
            Category::Utility,
        ]
    }
}

/// Metadata describing a filter node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// Unique identifier for this filter type (e.g., "mean")
    pub id: String,
    /// Human-readable name (e.g., "Neighborhood Mean")
    pub name: String,
    pub category: Category,
    pub description: String,

    /// Input definitions, addressed by position
    pub inputs: Vec<PortDefinition>,
    /// Whether any number of inputs (at least one) is accepted
    pub variadic_inputs: bool,
    /// Output definitions, addressed by position
    pub outputs: Vec<PortDefinition>,
    /// Parameter definitions
    pub parameters: Vec<ParameterDefinition>,

    /// Whether identical inputs and parameters always give identical
    /// outputs. Non-deterministic nodes are never served from the cache.
    pub deterministic: bool,
}

impl NodeMetadata {
    /// Create a new metadata builder.
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> NodeMetadataBuilder {
        NodeMetadataBuilder::new(id, name)
    }

    /// Find a parameter by name.
    pub fn get_parameter(&self, name: &str) -> Option<&ParameterDefinition> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Check a value against the named parameter's definition.
    pub fn validate_parameter(&self, name: &str, value: &Value) -> PipelineResult<()> {
        let definition = self.get_parameter(name).ok_or_else(|| {
            PipelineError::configuration(name, format!("'{}' has no such parameter", self.id))
        })?;
        definition.validate(value)
    }

    /// Whether `count` connected inputs satisfy this node.
    pub fn accepts_input_count(&self, count: usize) -> bool {
        if self.variadic_inputs {
            count >= self.inputs.len().max(1)
        } else {
            count == self.inputs.len()
        }
    }

    pub fn is_source(&self) -> bool {
        self.inputs.is_empty() && !self.variadic_inputs
    }
}

/// Builder for NodeMetadata.
pub struct NodeMetadataBuilder {
    id: String,
    name: String,
    category: Category,
    description: String,
    inputs: Vec<PortDefinition>,
    variadic_inputs: bool,
    outputs: Vec<PortDefinition>,
    parameters: Vec<ParameterDefinition>,
    deterministic: bool,
}

impl NodeMetadataBuilder {
    /// Create a new builder with required fields.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: Category::default(),
            description: String::new(),
            inputs: Vec::new(),
            variadic_inputs: false,
            outputs: Vec::new(),
            parameters: Vec::new(),
            deterministic: true,
        }
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add an input.
    pub fn input(mut self, port: PortDefinition) -> Self {
        self.inputs.push(port);
        self
    }

    /// Accept any number of inputs beyond the declared ones.
    pub fn variadic_inputs(mut self) -> Self {
        self.variadic_inputs = true;
        self
    }

    /// Add an output.
    pub fn output(mut self, port: PortDefinition) -> Self {
        self.outputs.push(port);
        self
    }

    /// Add a parameter.
    pub fn parameter(mut self, param: ParameterDefinition) -> Self {
        self.parameters.push(param);
        self
    }

    /// Mark as non-deterministic.
    pub fn non_deterministic(mut self) -> Self {
        self.deterministic = false;
        self
    }

    /// Build the metadata. A node with no declared output gets one.
    pub fn build(mut self) -> NodeMetadata {
        if self.outputs.is_empty() {
            self.outputs.push(PortDefinition::new("output"));
        }
        NodeMetadata {
            id: self.id,
            name: self.name,
            category: self.category,
            description: self.description,
            inputs: self.inputs,
            variadic_inputs: self.variadic_inputs,
            outputs: self.outputs,
            parameters: self.parameters,
            deterministic: self.deterministic,
        }
    }
}

/// The core trait for pipeline nodes.
///
/// Inputs are read-only. A filter may only write the output slabs it is
/// handed, and each slab only inside its own region.
///
/// # Thread Safety
///
/// `threaded_generate_data` runs concurrently on disjoint slabs, so filters
/// must be `Send + Sync`. State shared between slabs (accumulators) is kept
/// per slab and reduced in `after_threaded_generate_data`.
///
/// # Example Implementation
///
/// ```ignore
/// struct Invert;
///
/// impl FilterNode<2> for Invert {
///     fn metadata(&self) -> NodeMetadata {
///         NodeMetadata::builder("invert", "Invert")
///             .category(Category::Intensity)
///             .input(PortDefinition::new("image"))
///             .build()
///     }
///
///     fn threaded_generate_data(
///         &self,
///         ctx: &ExecutionContext<'_, 2>,
///         _thread: &ThreadContext<'_>,
///         outputs: &mut [RasterSlabMut<'_, 2>],
///     ) -> PipelineResult<()> {
///         let input = ctx.input(0)?;
///         let out = &mut outputs[0];
///         for index in out.region().iter() {
///             if let Some(pixel) = input.get(&index) {
///                 let inverted: Vec<f64> = pixel.iter().map(|v| 255.0 - v).collect();
///                 out.set(&index, &inverted);
///             }
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait FilterNode<const D: usize>: Send + Sync {
    /// Get the metadata for this filter.
    fn metadata(&self) -> NodeMetadata;

    /// Set a parameter by name.
    ///
    /// Invalid values are rejected here with a configuration error.
    fn set_parameter(&mut self, name: &str, value: &Value) -> PipelineResult<()> {
        let _ = value;
        Err(PipelineError::configuration(
            name,
            format!("'{}' has no settable parameters", self.metadata().id),
        ))
    }

    /// Describe every output from the inputs' metadata.
    ///
    /// The default copies input #0.
    fn generate_output_information(
        &self,
        ctx: &InformationContext<'_, D>,
    ) -> PipelineResult<Vec<ImageDescriptor<D>>> {
        let input = ctx.input(0)?;
        Ok(vec![input.derive(
            input.largest_possible_region(),
            input.number_of_components(),
            input.sample_type(),
        )])
    }

    /// Map the region requested of this node to one region per input.
    ///
    /// The default is strict: every input is asked for exactly the requested
    /// region, which must lie inside that input's largest possible region.
    fn generate_input_requested_region(
        &self,
        ctx: &RequestContext<'_, D>,
    ) -> PipelineResult<Vec<Region<D>>> {
        ctx.require_within_inputs()
    }

    /// Runs once before the slabs are dispatched.
    fn before_threaded_generate_data(&self, _ctx: &ExecutionContext<'_, D>) -> PipelineResult<()> {
        Ok(())
    }

    /// Fill `outputs`, one slab per output, for the slab's region.
    fn threaded_generate_data(
        &self,
        ctx: &ExecutionContext<'_, D>,
        thread: &ThreadContext<'_>,
        outputs: &mut [RasterSlabMut<'_, D>],
    ) -> PipelineResult<()>;

    /// Runs once after every slab has completed.
    fn after_threaded_generate_data(&self, _ctx: &ExecutionContext<'_, D>) -> PipelineResult<()> {
        Ok(())
    }
}

/// A simple passthrough node that copies input to output.
#[derive(Debug, Clone, Default)]
pub struct PassthroughNode;

impl<const D: usize> FilterNode<D> for PassthroughNode {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("passthrough", "Passthrough")
            .category(Category::Utility)
            .description("Passes the input through unchanged")
            .input(PortDefinition::new("input"))
            .build()
    }

    fn threaded_generate_data(
        &self,
        ctx: &ExecutionContext<'_, D>,
        thread: &ThreadContext<'_>,
        outputs: &mut [RasterSlabMut<'_, D>],
    ) -> PipelineResult<()> {
        let input = ctx.input(0)?;
        for out in outputs.iter_mut() {
            out.copy_from(input);
            thread.report_progress(out.region().number_of_pixels());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ValueType;

    #[test]
    fn test_metadata_builder() {
        let metadata = NodeMetadata::builder("test_filter", "Test Filter")
            .category(Category::Utility)
            .description("A test filter")
            .input(PortDefinition::new("input"))
            .parameter(
                ParameterDefinition::new("gain", ValueType::Float, Value::Float(1.0))
                    .with_range(0.0, 10.0),
            )
            .build();

        assert_eq!(metadata.id, "test_filter");
        assert_eq!(metadata.inputs.len(), 1);
        assert_eq!(metadata.outputs.len(), 1);
        assert!(metadata.deterministic);
        assert!(metadata.accepts_input_count(1));
        assert!(!metadata.accepts_input_count(2));
        assert!(metadata.validate_parameter("gain", &Value::Float(2.0)).is_ok());
        assert!(metadata.validate_parameter("gain", &Value::Float(20.0)).is_err());
        assert!(metadata.validate_parameter("offset", &Value::Float(2.0)).is_err());
    }

    #[test]
    fn test_variadic_inputs() {
        let metadata = NodeMetadata::builder("stack", "Stack")
            .variadic_inputs()
            .build();
        assert!(!metadata.accepts_input_count(0));
        assert!(metadata.accepts_input_count(5));
        assert!(!metadata.is_source());
    }

    #[test]
    fn test_passthrough_rejects_parameters() {
        let mut node = PassthroughNode;
        let result = FilterNode::<2>::set_parameter(&mut node, "gain", &Value::Float(1.0));
        assert!(matches!(result, Err(PipelineError::Configuration { .. })));
    }

    #[test]
    fn test_category_display() {
        assert_eq!(Category::Neighborhood.display_name(), "Neighborhood");
        assert_eq!(Category::all().len(), 7);
    }
}
