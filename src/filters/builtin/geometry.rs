//! Translation and region-of-interest extraction.

use super::{index_parameter, size_parameter};
use crate::core::context::{
    require_within, ExecutionContext, InformationContext, RequestContext, ThreadContext,
};
use crate::core::descriptor::ImageDescriptor;
use crate::core::error::{PipelineError, PipelineResult};
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::port::{Constraint, ParameterDefinition, PortDefinition};
use crate::core::raster::RasterSlabMut;
use crate::core::region::Region;
use crate::core::types::{Value, ValueType};
use crate::filters::registry::FilterRegistry;

/// Register the geometry filters.
pub fn register<const D: usize>(registry: &mut FilterRegistry<D>) {
    registry.register(|| Box::new(ShiftFilter::<D>::new([0; D])));
    registry.register(|| Box::new(ExtractRegionFilter::<D>::new(Region::from_size([1; D]))));
}

fn integer_array(default: i64, dimension: usize) -> Value {
    Value::Array(vec![Value::Integer(default); dimension])
}

/// Moves the image by an integer offset.
///
/// Pixel `i` of the output is pixel `i - offset` of the input, so the output's
/// largest region is the input's shifted by `offset` and every request is
/// shifted back before it reaches the input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftFilter<const D: usize> {
    offset: [i64; D],
}

impl<const D: usize> ShiftFilter<D> {
    pub fn new(offset: [i64; D]) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> [i64; D] {
        self.offset
    }

    fn back(&self) -> [i64; D] {
        let mut back = self.offset;
        back.iter_mut().for_each(|v| *v = -*v);
        back
    }
}

impl<const D: usize> FilterNode<D> for ShiftFilter<D> {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("shift", "Shift")
            .category(Category::Geometry)
            .description("Translates the image by an integer offset")
            .input(PortDefinition::new("image"))
            .parameter(
                ParameterDefinition::new(
                    "offset",
                    ValueType::Array(Box::new(ValueType::Integer)),
                    integer_array(0, D),
                )
                .with_description("Translation along each axis, in pixels"),
            )
            .build()
    }

    fn set_parameter(&mut self, name: &str, value: &Value) -> PipelineResult<()> {
        self.metadata().validate_parameter(name, value)?;
        match name {
            "offset" => self.offset = index_parameter(name, value)?,
            _ => return Err(PipelineError::configuration(name, "unknown parameter")),
        }
        Ok(())
    }

    fn generate_output_information(
        &self,
        ctx: &InformationContext<'_, D>,
    ) -> PipelineResult<Vec<ImageDescriptor<D>>> {
        let input = ctx.input(0)?;
        Ok(vec![input.derive(
            input.largest_possible_region().shifted(&self.offset),
            input.number_of_components(),
            input.sample_type(),
        )])
    }

    fn generate_input_requested_region(
        &self,
        ctx: &RequestContext<'_, D>,
    ) -> PipelineResult<Vec<Region<D>>> {
        let input = ctx.input(0)?;
        let wanted = ctx.requested_region.shifted(&self.back());
        Ok(vec![require_within(
            ctx.node_id,
            &wanted,
            &input.largest_possible_region(),
        )?])
    }

    fn threaded_generate_data(
        &self,
        ctx: &ExecutionContext<'_, D>,
        thread: &ThreadContext<'_>,
        outputs: &mut [RasterSlabMut<'_, D>],
    ) -> PipelineResult<()> {
        let input = ctx.input(0)?;
        let back = self.back();
        let out = &mut outputs[0];
        for index in out.region().iter() {
            let mut source = index;
            for axis in 0..D {
                source[axis] += back[axis];
            }
            let pixel = input.get(&source).ok_or_else(|| {
                PipelineError::inconsistent(
                    ctx.node_id,
                    format!("input has no buffered pixel at {:?}", source),
                )
            })?;
            out.set(&index, pixel);
        }
        thread.report_progress(out.region().number_of_pixels());
        Ok(())
    }
}

/// Restricts the image to a region of interest, keeping pixel indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractRegionFilter<const D: usize> {
    roi: Region<D>,
}

impl<const D: usize> ExtractRegionFilter<D> {
    pub fn new(roi: Region<D>) -> Self {
        Self { roi }
    }

    pub fn roi(&self) -> Region<D> {
        self.roi
    }
}

impl<const D: usize> FilterNode<D> for ExtractRegionFilter<D> {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("extract_region", "Extract Region")
            .category(Category::Geometry)
            .description("Restricts the image to a region of interest")
            .input(PortDefinition::new("image"))
            .parameter(
                ParameterDefinition::new(
                    "index",
                    ValueType::Array(Box::new(ValueType::Integer)),
                    integer_array(0, D),
                )
                .with_description("Lower corner of the region of interest"),
            )
            .parameter(
                ParameterDefinition::new(
                    "size",
                    ValueType::Array(Box::new(ValueType::Integer)),
                    integer_array(1, D),
                )
                .with_description("Extent of the region of interest")
                .with_constraint(Constraint::NonNegative),
            )
            .build()
    }

    fn set_parameter(&mut self, name: &str, value: &Value) -> PipelineResult<()> {
        self.metadata().validate_parameter(name, value)?;
        match name {
            "index" => self.roi = Region::new(index_parameter(name, value)?, self.roi.size()),
            "size" => self.roi = Region::new(self.roi.index(), size_parameter(name, value)?),
            _ => return Err(PipelineError::configuration(name, "unknown parameter")),
        }
        Ok(())
    }

    /// Fails with `OutOfBoundsRequest` unless the input covers the whole ROI.
    fn generate_output_information(
        &self,
        ctx: &InformationContext<'_, D>,
    ) -> PipelineResult<Vec<ImageDescriptor<D>>> {
        let input = ctx.input(0)?;
        let roi = require_within(ctx.node_id, &self.roi, &input.largest_possible_region())?;
        Ok(vec![input.derive(
            roi,
            input.number_of_components(),
            input.sample_type(),
        )])
    }

    fn threaded_generate_data(
        &self,
        ctx: &ExecutionContext<'_, D>,
        thread: &ThreadContext<'_>,
        outputs: &mut [RasterSlabMut<'_, D>],
    ) -> PipelineResult<()> {
        let input = ctx.input(0)?;
        let out = &mut outputs[0];
        out.copy_from(input);
        thread.report_progress(out.region().number_of_pixels());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::NodeId;
    use crate::core::raster::{Raster, SampleType};
    use crate::execution::engine::ExecutionEngine;
    use crate::filters::builtin::RasterSource;
    use crate::graph::structure::ProcessingGraph;

    fn ramp() -> Raster<2> {
        let region = Region::from_size([6, 4]);
        let data = region.iter().map(|i| (i[0] + 10 * i[1]) as f64).collect();
        Raster::from_data(region, 1, SampleType::F64, data).unwrap()
    }

    #[test]
    fn test_shift_moves_pixels() {
        let mut graph = ProcessingGraph::<2>::new();
        let source = graph.add_filter(RasterSource::new(ramp()));
        let shift = graph.add_filter(ShiftFilter::new([3, -2]));
        graph.connect(source, 0, shift, 0).unwrap();

        let engine = ExecutionEngine::new();
        let information = engine.update_output_information(&graph, shift).unwrap();
        assert_eq!(
            information[0].largest_possible_region(),
            Region::new([3, -2], [6, 4])
        );

        let out = engine.update_region(&graph, shift, Region::new([4, -1], [2, 2])).unwrap();
        assert_eq!(out.region(), Region::new([4, -1], [2, 2]));
        // Output (4, -1) is input (1, 1).
        assert_eq!(out.get_component(&[4, -1], 0), Some(11.0));
        assert_eq!(out.get_component(&[5, 0], 0), Some(22.0));
    }

    #[test]
    fn test_shift_parameter() {
        let mut filter = ShiftFilter::<2>::new([0, 0]);
        filter
            .set_parameter("offset", &Value::parse_literal("-1,4"))
            .unwrap();
        assert_eq!(filter.offset(), [-1, 4]);
        assert!(filter.set_parameter("offset", &Value::parse_literal("1,2,3")).is_err());
    }

    #[test]
    fn test_extract_region() {
        let mut graph = ProcessingGraph::<2>::new();
        let source = graph.add_filter(RasterSource::new(ramp()));
        let extract = graph.add_filter(ExtractRegionFilter::new(Region::new([2, 1], [3, 2])));
        graph.connect(source, 0, extract, 0).unwrap();

        let out = ExecutionEngine::new().update(&graph, extract).unwrap();
        assert_eq!(out.region(), Region::new([2, 1], [3, 2]));
        assert_eq!(out.data(), &[12.0, 13.0, 14.0, 22.0, 23.0, 24.0]);
    }

    #[test]
    fn test_extract_outside_fails_at_information_time() {
        let filter = ExtractRegionFilter::new(Region::new([4, 0], [4, 4]));
        let inputs = [ImageDescriptor::new(Region::from_size([6, 4]), 1, SampleType::U8)];
        let ctx = InformationContext::new(NodeId::new(), &inputs);
        assert!(matches!(
            filter.generate_output_information(&ctx),
            Err(PipelineError::OutOfBoundsRequest { .. })
        ));
    }
}
