//! Source nodes: constant images, in-memory rasters and generated images.

use super::{index_parameter, size_parameter};
use crate::core::context::{ExecutionContext, InformationContext, ThreadContext};
use crate::core::descriptor::{Geometry, ImageDescriptor};
use crate::core::error::{PipelineError, PipelineResult};
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::port::{Constraint, ParameterDefinition, PortDefinition};
use crate::core::raster::{Raster, RasterSlabMut, SampleType};
use crate::core::region::Region;
use crate::core::types::{Value, ValueType};
use crate::filters::registry::FilterRegistry;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Register source filters.
pub fn register<const D: usize>(registry: &mut FilterRegistry<D>) {
    registry.register(|| Box::new(ConstantSource::<D>::default()));
}

fn sample_type_names() -> Vec<String> {
    ["u8", "u16", "i16", "i32", "f32", "f64"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// An image with the same value at every pixel.
#[derive(Debug, Clone)]
pub struct ConstantSource<const D: usize> {
    region: Region<D>,
    value: Vec<f64>,
    sample_type: SampleType,
    geometry: Geometry<D>,
}

impl<const D: usize> ConstantSource<D> {
    /// One component per entry of `value`.
    pub fn new(region: Region<D>, value: Vec<f64>, sample_type: SampleType) -> Self {
        Self {
            region,
            value,
            sample_type,
            geometry: Geometry::identity(),
        }
    }

    pub fn with_geometry(mut self, geometry: Geometry<D>) -> Self {
        self.geometry = geometry;
        self
    }
}

impl<const D: usize> Default for ConstantSource<D> {
    fn default() -> Self {
        Self::new(Region::from_size([1; D]), vec![0.0], SampleType::F64)
    }
}

impl<const D: usize> FilterNode<D> for ConstantSource<D> {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("constant", "Constant Image")
            .category(Category::Source)
            .description("An image filled with one value per component")
            .output(PortDefinition::new("image"))
            .parameter(
                ParameterDefinition::new(
                    "size",
                    ValueType::Array(Box::new(ValueType::Integer)),
                    Value::Array(vec![Value::Integer(1); D]),
                )
                .with_description("Extent along each axis")
                .with_constraint(Constraint::NonNegative),
            )
            .parameter(
                ParameterDefinition::new(
                    "index",
                    ValueType::Array(Box::new(ValueType::Integer)),
                    Value::Array(vec![Value::Integer(0); D]),
                )
                .with_description("Lower corner of the largest possible region"),
            )
            .parameter(
                ParameterDefinition::new(
                    "value",
                    ValueType::Array(Box::new(ValueType::Float)),
                    Value::Array(vec![Value::Float(0.0)]),
                )
                .with_description("Pixel value, one entry per component")
                .with_constraint(Constraint::NotEmpty),
            )
            .parameter(
                ParameterDefinition::new("sample_type", ValueType::String, Value::from("f64"))
                    .with_constraint(Constraint::OneOf(sample_type_names())),
            )
            .build()
    }

    fn set_parameter(&mut self, name: &str, value: &Value) -> PipelineResult<()> {
        // A scalar value is a one-component pixel.
        let value = match (name, value) {
            ("value", Value::Float(_) | Value::Integer(_)) => Value::Array(vec![value.clone()]),
            _ => value.clone(),
        };
        self.metadata().validate_parameter(name, &value)?;
        match name {
            "size" => self.region = Region::new(self.region.index(), size_parameter(name, &value)?),
            "index" => self.region = Region::new(index_parameter(name, &value)?, self.region.size()),
            "value" => {
                self.value = value
                    .as_float_list()
                    .ok_or_else(|| PipelineError::configuration(name, "expected numbers"))?
            }
            "sample_type" => {
                self.sample_type = value
                    .as_string()
                    .unwrap_or_default()
                    .parse::<SampleType>()?
            }
            _ => return Err(PipelineError::configuration(name, "unknown parameter")),
        }
        Ok(())
    }

    fn generate_output_information(
        &self,
        _ctx: &InformationContext<'_, D>,
    ) -> PipelineResult<Vec<ImageDescriptor<D>>> {
        Ok(vec![ImageDescriptor::new(self.region, self.value.len(), self.sample_type)
            .with_geometry(self.geometry)])
    }

    fn threaded_generate_data(
        &self,
        _ctx: &ExecutionContext<'_, D>,
        thread: &ThreadContext<'_>,
        outputs: &mut [RasterSlabMut<'_, D>],
    ) -> PipelineResult<()> {
        let out = &mut outputs[0];
        for index in out.region().iter() {
            out.set(&index, &self.value);
        }
        thread.report_progress(out.region().number_of_pixels());
        Ok(())
    }
}

/// Serves an in-memory raster as a pipeline source.
///
/// Counts how many times it was executed, which makes it handy to observe
/// caching and streaming from the outside.
#[derive(Debug, Clone)]
pub struct RasterSource<const D: usize> {
    raster: Arc<Raster<D>>,
    geometry: Geometry<D>,
    reads: Arc<AtomicUsize>,
}

impl<const D: usize> RasterSource<D> {
    pub fn new(raster: Raster<D>) -> Self {
        Self {
            raster: Arc::new(raster),
            geometry: Geometry::identity(),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_geometry(mut self, geometry: Geometry<D>) -> Self {
        self.geometry = geometry;
        self
    }

    /// Shared counter of executions, valid after the source is moved into a
    /// graph.
    pub fn read_counter(&self) -> Arc<AtomicUsize> {
        self.reads.clone()
    }
}

impl<const D: usize> FilterNode<D> for RasterSource<D> {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("raster_source", "Raster Source")
            .category(Category::Source)
            .description("Serves sub-regions of an in-memory raster")
            .output(PortDefinition::new("image"))
            .build()
    }

    fn generate_output_information(
        &self,
        _ctx: &InformationContext<'_, D>,
    ) -> PipelineResult<Vec<ImageDescriptor<D>>> {
        Ok(vec![ImageDescriptor::new(
            self.raster.region(),
            self.raster.components(),
            self.raster.sample_type(),
        )
        .with_geometry(self.geometry)])
    }

    fn before_threaded_generate_data(&self, _ctx: &ExecutionContext<'_, D>) -> PipelineResult<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn threaded_generate_data(
        &self,
        _ctx: &ExecutionContext<'_, D>,
        thread: &ThreadContext<'_>,
        outputs: &mut [RasterSlabMut<'_, D>],
    ) -> PipelineResult<()> {
        let out = &mut outputs[0];
        out.copy_from(&self.raster);
        thread.report_progress(out.region().number_of_pixels());
        Ok(())
    }
}

type Generator<const D: usize> = dyn Fn(&[i64; D]) -> Vec<f64> + Send + Sync;

/// An image computed pixel by pixel from its index.
#[derive(Clone)]
pub struct GeneratorSource<const D: usize> {
    region: Region<D>,
    components: usize,
    sample_type: SampleType,
    generator: Arc<Generator<D>>,
}

impl<const D: usize> GeneratorSource<D> {
    /// `generator` must return `components` values for every index.
    pub fn new<F>(region: Region<D>, components: usize, sample_type: SampleType, generator: F) -> Self
    where
        F: Fn(&[i64; D]) -> Vec<f64> + Send + Sync + 'static,
    {
        Self {
            region,
            components,
            sample_type,
            generator: Arc::new(generator),
        }
    }
}

impl<const D: usize> FilterNode<D> for GeneratorSource<D> {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("generator", "Generated Image")
            .category(Category::Source)
            .description("Computes every pixel from its index")
            .output(PortDefinition::new("image"))
            .build()
    }

    fn generate_output_information(
        &self,
        _ctx: &InformationContext<'_, D>,
    ) -> PipelineResult<Vec<ImageDescriptor<D>>> {
        Ok(vec![ImageDescriptor::new(self.region, self.components, self.sample_type)])
    }

    fn threaded_generate_data(
        &self,
        ctx: &ExecutionContext<'_, D>,
        thread: &ThreadContext<'_>,
        outputs: &mut [RasterSlabMut<'_, D>],
    ) -> PipelineResult<()> {
        let out = &mut outputs[0];
        for index in out.region().iter() {
            let pixel = (self.generator)(&index);
            if pixel.len() != self.components {
                return Err(PipelineError::inconsistent(
                    ctx.node_id,
                    format!(
                        "generator returned {} values for {} components",
                        pixel.len(),
                        self.components
                    ),
                ));
            }
            out.set(&index, &pixel);
        }
        thread.report_progress(out.region().number_of_pixels());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_parameters() {
        let mut source = ConstantSource::<2>::default();
        FilterNode::<2>::set_parameter(&mut source, "size", &Value::parse_literal("4,3")).unwrap();
        FilterNode::<2>::set_parameter(&mut source, "value", &Value::Integer(7)).unwrap();
        FilterNode::<2>::set_parameter(&mut source, "sample_type", &Value::from("u8")).unwrap();

        let outputs = FilterNode::<2>::generate_output_information(
            &source,
            &InformationContext::new(crate::core::error::NodeId::new(), &[]),
        )
        .unwrap();
        assert_eq!(outputs[0].largest_possible_region(), Region::from_size([4, 3]));
        assert_eq!(outputs[0].number_of_components(), 1);
        assert_eq!(outputs[0].sample_type(), SampleType::U8);

        assert!(FilterNode::<2>::set_parameter(&mut source, "size", &Value::parse_literal("4,3,2")).is_err());
        assert!(FilterNode::<2>::set_parameter(&mut source, "sample_type", &Value::from("u7")).is_err());
        assert!(FilterNode::<2>::set_parameter(&mut source, "gain", &Value::Float(1.0)).is_err());
    }
}
