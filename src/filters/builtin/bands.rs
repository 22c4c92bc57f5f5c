//! Band splitting and stacking.
//!
//! Both filters change the number of components at information time;
//! [`BandSplitFilter`] also has one output per band, addressed by index when
//! connecting downstream nodes.

use crate::core::context::{ExecutionContext, InformationContext, ThreadContext};
use crate::core::descriptor::ImageDescriptor;
use crate::core::error::{PipelineError, PipelineResult};
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::port::{Constraint, ParameterDefinition, PortDefinition};
use crate::core::raster::{RasterSlabMut, SampleType};
use crate::core::types::{Value, ValueType};
use crate::filters::registry::FilterRegistry;

/// Register the band filters.
pub fn register<const D: usize>(registry: &mut FilterRegistry<D>) {
    registry.register(|| Box::new(BandSplitFilter::new(3)));
    registry.register(|| Box::new(ConcatenateFilter::new()));
}

/// Splits an N-band image into N single-band outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandSplitFilter {
    bands: usize,
}

impl BandSplitFilter {
    pub fn new(bands: usize) -> Self {
        Self { bands: bands.max(1) }
    }

    pub fn bands(&self) -> usize {
        self.bands
    }
}

impl<const D: usize> FilterNode<D> for BandSplitFilter {
    fn metadata(&self) -> NodeMetadata {
        let mut builder = NodeMetadata::builder("band_split", "Band Split")
            .category(Category::Composite)
            .description("One single-band output per input band")
            .input(PortDefinition::new("image"))
            .parameter(
                ParameterDefinition::new("bands", ValueType::Integer, Value::Integer(3))
                    .with_description("Number of bands of the input, and of outputs")
                    .with_constraint(Constraint::Positive),
            );
        for band in 0..self.bands {
            builder = builder.output(PortDefinition::new(format!("band_{}", band)));
        }
        builder.build()
    }

    fn set_parameter(&mut self, name: &str, value: &Value) -> PipelineResult<()> {
        FilterNode::<D>::metadata(self).validate_parameter(name, value)?;
        match (name, value.as_integer()) {
            ("bands", Some(bands)) => {
                self.bands = bands as usize;
                Ok(())
            }
            _ => Err(PipelineError::configuration(name, "unknown parameter")),
        }
    }

    fn generate_output_information(
        &self,
        ctx: &InformationContext<'_, D>,
    ) -> PipelineResult<Vec<ImageDescriptor<D>>> {
        let input = ctx.input(0)?;
        if input.number_of_components() != self.bands {
            return Err(PipelineError::inconsistent(
                ctx.node_id,
                format!(
                    "input has {} components, expected {}",
                    input.number_of_components(),
                    self.bands
                ),
            ));
        }
        Ok((0..self.bands)
            .map(|_| input.derive(input.largest_possible_region(), 1, input.sample_type()))
            .collect())
    }

    fn threaded_generate_data(
        &self,
        ctx: &ExecutionContext<'_, D>,
        thread: &ThreadContext<'_>,
        outputs: &mut [RasterSlabMut<'_, D>],
    ) -> PipelineResult<()> {
        let input = ctx.input(0)?;
        let region = outputs[0].region();
        for index in region.iter() {
            if let Some(pixel) = input.get(&index) {
                for (out, &value) in outputs.iter_mut().zip(pixel) {
                    out.set_component(&index, 0, value);
                }
            }
        }
        thread.report_progress(region.number_of_pixels());
        Ok(())
    }
}

/// Stacks the bands of all inputs into one image.
///
/// Inputs must cover the same largest region. The output has as many
/// components as all inputs together, in input order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcatenateFilter;

impl ConcatenateFilter {
    pub fn new() -> Self {
        Self
    }
}

impl<const D: usize> FilterNode<D> for ConcatenateFilter {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("concatenate", "Concatenate Bands")
            .category(Category::Composite)
            .description("Stacks the bands of every input, in input order")
            .input(PortDefinition::new("image"))
            .variadic_inputs()
            .build()
    }

    fn generate_output_information(
        &self,
        ctx: &InformationContext<'_, D>,
    ) -> PipelineResult<Vec<ImageDescriptor<D>>> {
        let largest = ctx.require_same_extent()?;
        let first = ctx.input(0)?;
        let components = ctx.inputs().iter().map(|i| i.number_of_components()).sum();
        let sample_type = if ctx.inputs().iter().all(|i| i.sample_type() == first.sample_type()) {
            first.sample_type()
        } else {
            SampleType::F64
        };
        Ok(vec![first.derive(largest, components, sample_type)])
    }

    fn threaded_generate_data(
        &self,
        ctx: &ExecutionContext<'_, D>,
        thread: &ThreadContext<'_>,
        outputs: &mut [RasterSlabMut<'_, D>],
    ) -> PipelineResult<()> {
        let out = &mut outputs[0];
        let mut pixel = vec![0.0; out.components()];
        for index in out.region().iter() {
            let mut next = 0;
            for input in 0..ctx.number_of_inputs() {
                let raster = ctx.input(input)?;
                let values = raster.get(&index).ok_or_else(|| {
                    PipelineError::inconsistent(
                        ctx.node_id,
                        format!("input #{} has no buffered pixel at {:?}", input, index),
                    )
                })?;
                pixel[next..next + values.len()].copy_from_slice(values);
                next += values.len();
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
    use crate::core::error::NodeId;
    use crate::core::raster::Raster;
    use crate::core::region::Region;
    use crate::execution::engine::{ExecutionEngine, ExecutionOptions};
    use crate::filters::builtin::{ConstantSource, RasterSource};
    use crate::graph::structure::ProcessingGraph;

    fn rgb() -> Raster<2> {
        let region = Region::from_size([5, 3]);
        let data = region
            .iter()
            .flat_map(|i| [i[0] as f64, i[1] as f64, 100.0])
            .collect();
        Raster::from_data(region, 3, SampleType::U8, data).unwrap()
    }

    #[test]
    fn test_split_outputs_by_index() {
        let mut graph = ProcessingGraph::<2>::new();
        let source = graph.add_filter(RasterSource::new(rgb()));
        let split = graph.add_filter(BandSplitFilter::new(3));
        graph.connect(source, 0, split, 0).unwrap();

        let engine = ExecutionEngine::with_options(ExecutionOptions::new().with_threads(2));
        let green = engine.update_output(&graph, split, 1, None).unwrap();
        assert_eq!(green.output.components(), 1);
        assert_eq!(green.output.get_component(&[2, 2], 0), Some(2.0));

        let blue = engine.update_output(&graph, split, 2, None).unwrap();
        assert!(blue.output.data().iter().all(|&v| v == 100.0));
    }

    #[test]
    fn test_split_checks_band_count() {
        let inputs = [ImageDescriptor::<2>::new(Region::from_size([2, 2]), 4, SampleType::U8)];
        let ctx = InformationContext::new(NodeId::new(), &inputs);
        assert!(matches!(
            FilterNode::<2>::generate_output_information(&BandSplitFilter::new(3), &ctx),
            Err(PipelineError::InconsistentMetadata { .. })
        ));
    }

    #[test]
    fn test_concatenate() {
        let region = Region::from_size([4, 4]);
        let mut graph = ProcessingGraph::<2>::new();
        let a = graph.add_filter(ConstantSource::new(region, vec![1.0, 2.0], SampleType::U8));
        let b = graph.add_filter(ConstantSource::new(region, vec![7.5], SampleType::F32));
        let cat = graph.add_filter(ConcatenateFilter::new());
        graph.connect(a, 0, cat, 0).unwrap();
        graph.connect(b, 0, cat, 1).unwrap();

        let out = ExecutionEngine::new().update(&graph, cat).unwrap();
        assert_eq!(out.components(), 3);
        assert_eq!(out.sample_type(), SampleType::F64);
        assert_eq!(out.get(&[3, 3]), Some(&[1.0, 2.0, 7.5][..]));
    }

    #[test]
    fn test_concatenate_requires_same_extent() {
        let mut graph = ProcessingGraph::<2>::new();
        let a = graph.add_filter(ConstantSource::new(Region::from_size([4, 4]), vec![1.0], SampleType::U8));
        let b = graph.add_filter(ConstantSource::new(Region::from_size([4, 5]), vec![1.0], SampleType::U8));
        let cat = graph.add_filter(ConcatenateFilter::new());
        graph.connect(a, 0, cat, 0).unwrap();
        graph.connect(b, 0, cat, 1).unwrap();
        assert!(matches!(
            ExecutionEngine::new().update(&graph, cat),
            Err(PipelineError::InconsistentMetadata { .. })
        ));
    }
}
