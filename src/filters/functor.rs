//! Functor adapters.
//!
//! Per-pixel and per-neighborhood operations are written as small functor
//! types and wrapped into full pipeline nodes by the adapters here, which
//! supply the region propagation and the threaded iteration.

use crate::core::context::{ExecutionContext, InformationContext, RequestContext, ThreadContext};
use crate::core::descriptor::ImageDescriptor;
use crate::core::error::{NodeId, PipelineError, PipelineResult};
use crate::core::node::{FilterNode, NodeMetadata};
use crate::core::raster::{Raster, RasterSlabMut, SampleType};
use crate::core::region::{Radius, Region};
use crate::core::types::Value;

/// A function of one pixel.
pub trait UnaryFunctor: Send + Sync {
    /// Metadata of the node wrapping this functor. Declares one input.
    fn metadata(&self) -> NodeMetadata;

    fn set_parameter(&mut self, name: &str, _value: &Value) -> PipelineResult<()> {
        Err(PipelineError::configuration(
            name,
            format!("'{}' has no settable parameters", self.metadata().id),
        ))
    }

    /// Components of an output pixel.
    fn output_components(&self, input_components: usize) -> PipelineResult<usize> {
        Ok(input_components)
    }

    fn output_sample_type(&self, input: SampleType) -> SampleType {
        input
    }

    /// Compute one output pixel into `out`.
    fn apply(&self, pixel: &[f64], out: &mut [f64]);
}

/// A function of two co-located pixels.
pub trait BinaryFunctor: Send + Sync {
    /// Metadata of the node wrapping this functor. Declares two inputs.
    fn metadata(&self) -> NodeMetadata;

    fn set_parameter(&mut self, name: &str, _value: &Value) -> PipelineResult<()> {
        Err(PipelineError::configuration(
            name,
            format!("'{}' has no settable parameters", self.metadata().id),
        ))
    }

    fn output_sample_type(&self, first: SampleType, _second: SampleType) -> SampleType {
        first
    }

    fn apply(&self, first: &[f64], second: &[f64], out: &mut [f64]);
}

/// A function of the window around a pixel.
pub trait NeighborhoodFunctor<const D: usize>: Send + Sync {
    /// Metadata of the node wrapping this functor. Declares one input.
    fn metadata(&self) -> NodeMetadata;

    fn set_parameter(&mut self, name: &str, _value: &Value) -> PipelineResult<()> {
        Err(PipelineError::configuration(
            name,
            format!("'{}' has no settable parameters", self.metadata().id),
        ))
    }

    /// Half-width of the window per axis.
    fn radius(&self) -> Radius<D>;

    fn output_components(&self, input_components: usize) -> PipelineResult<usize> {
        Ok(input_components)
    }

    fn output_sample_type(&self, input: SampleType) -> SampleType {
        input
    }

    fn apply(&self, neighborhood: &Neighborhood<'_, D>, out: &mut [f64]);
}

/// What a neighborhood sees outside the input's largest possible region.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum BoundaryPolicy {
    /// Outside pixels are absent; only available neighbors are visited.
    #[default]
    Clip,
    /// Whole-sample symmetric reflection: `c b | a b c | b a`.
    Mirror,
    /// Outside pixels read as this value in every component.
    Constant(f64),
}

/// The window around one output pixel.
pub struct Neighborhood<'a, const D: usize> {
    input: &'a Raster<D>,
    available: Region<D>,
    center: [i64; D],
    radius: Radius<D>,
    boundary: BoundaryPolicy,
    constant: &'a [f64],
}

impl<'a, const D: usize> Neighborhood<'a, D> {
    /// `available` is the input's largest possible region; `constant` is one
    /// pixel of the constant boundary value.
    pub fn new(
        input: &'a Raster<D>,
        available: Region<D>,
        center: [i64; D],
        radius: Radius<D>,
        boundary: BoundaryPolicy,
        constant: &'a [f64],
    ) -> Self {
        Self {
            input,
            available,
            center,
            radius,
            boundary,
            constant,
        }
    }

    pub fn center(&self) -> [i64; D] {
        self.center
    }

    pub fn radius(&self) -> Radius<D> {
        self.radius
    }

    pub fn components(&self) -> usize {
        self.input.components()
    }

    /// The center pixel.
    pub fn center_value(&self) -> Option<&'a [f64]> {
        self.input.get(&self.center)
    }

    /// The pixel at `offset` from the center, after the boundary policy.
    pub fn get(&self, offset: &[i64; D]) -> Option<&'a [f64]> {
        let mut position = self.center;
        for axis in 0..D {
            position[axis] += offset[axis];
        }
        if self.available.contains_index(&position) {
            return self.input.get(&position);
        }
        match self.boundary {
            BoundaryPolicy::Clip => None,
            BoundaryPolicy::Constant(_) => Some(self.constant),
            BoundaryPolicy::Mirror => {
                for axis in 0..D {
                    position[axis] = mirror(
                        position[axis],
                        self.available.index()[axis],
                        self.available.size()[axis],
                    );
                }
                self.input.get(&position)
            }
        }
    }

    /// Every pixel of the window the boundary policy yields, axis 0 fastest.
    pub fn values(&self) -> impl Iterator<Item = &'a [f64]> + '_ {
        self.radius
            .window()
            .iter()
            .filter_map(move |offset| self.get(&offset))
    }
}

fn mirror(position: i64, start: i64, extent: u64) -> i64 {
    if extent <= 1 {
        return start;
    }
    let period = 2 * (extent as i64 - 1);
    let folded = (position - start).rem_euclid(period);
    let folded = if folded >= extent as i64 {
        period - folded
    } else {
        folded
    };
    start + folded
}

fn missing_pixel<const D: usize>(node_id: NodeId, input: usize, index: &[i64; D]) -> PipelineError {
    PipelineError::inconsistent(
        node_id,
        format!("input #{} has no buffered pixel at {:?}", input, index),
    )
}

/// Pipeline node applying a [`UnaryFunctor`] to every pixel.
pub struct UnaryFunctorFilter<F> {
    functor: F,
}

impl<F: UnaryFunctor> UnaryFunctorFilter<F> {
    pub fn new(functor: F) -> Self {
        Self { functor }
    }

    pub fn functor(&self) -> &F {
        &self.functor
    }
}

impl<const D: usize, F: UnaryFunctor> FilterNode<D> for UnaryFunctorFilter<F> {
    fn metadata(&self) -> NodeMetadata {
        self.functor.metadata()
    }

    fn set_parameter(&mut self, name: &str, value: &Value) -> PipelineResult<()> {
        self.functor.set_parameter(name, value)
    }

    fn generate_output_information(
        &self,
        ctx: &InformationContext<'_, D>,
    ) -> PipelineResult<Vec<ImageDescriptor<D>>> {
        let input = ctx.input(0)?;
        let components = self.functor.output_components(input.number_of_components())?;
        Ok(vec![input.derive(
            input.largest_possible_region(),
            components,
            self.functor.output_sample_type(input.sample_type()),
        )])
    }

    fn generate_input_requested_region(
        &self,
        ctx: &RequestContext<'_, D>,
    ) -> PipelineResult<Vec<Region<D>>> {
        ctx.pad_and_crop_inputs(&Radius::zero())
    }

    fn threaded_generate_data(
        &self,
        ctx: &ExecutionContext<'_, D>,
        thread: &ThreadContext<'_>,
        outputs: &mut [RasterSlabMut<'_, D>],
    ) -> PipelineResult<()> {
        let input = ctx.input(0)?;
        let out = &mut outputs[0];
        let mut pixel = vec![0.0; out.components()];
        for index in out.region().iter() {
            let value = input
                .get(&index)
                .ok_or_else(|| missing_pixel(ctx.node_id, 0, &index))?;
            self.functor.apply(value, &mut pixel);
            out.set(&index, &pixel);
        }
        thread.report_progress(out.region().number_of_pixels());
        Ok(())
    }
}

/// Pipeline node applying a [`BinaryFunctor`] to co-located pixel pairs.
///
/// Both inputs must cover the same largest region with the same number of
/// components.
pub struct BinaryFunctorFilter<F> {
    functor: F,
}

impl<F: BinaryFunctor> BinaryFunctorFilter<F> {
    pub fn new(functor: F) -> Self {
        Self { functor }
    }

    pub fn functor(&self) -> &F {
        &self.functor
    }
}

impl<const D: usize, F: BinaryFunctor> FilterNode<D> for BinaryFunctorFilter<F> {
    fn metadata(&self) -> NodeMetadata {
        self.functor.metadata()
    }

    fn set_parameter(&mut self, name: &str, value: &Value) -> PipelineResult<()> {
        self.functor.set_parameter(name, value)
    }

    fn generate_output_information(
        &self,
        ctx: &InformationContext<'_, D>,
    ) -> PipelineResult<Vec<ImageDescriptor<D>>> {
        let largest = ctx.require_same_extent()?;
        let components = ctx.require_same_components()?;
        let first = ctx.input(0)?;
        let second = ctx.input(1)?;
        Ok(vec![first.derive(
            largest,
            components,
            self.functor
                .output_sample_type(first.sample_type(), second.sample_type()),
        )])
    }

    fn threaded_generate_data(
        &self,
        ctx: &ExecutionContext<'_, D>,
        thread: &ThreadContext<'_>,
        outputs: &mut [RasterSlabMut<'_, D>],
    ) -> PipelineResult<()> {
        let first = ctx.input(0)?;
        let second = ctx.input(1)?;
        let out = &mut outputs[0];
        let mut pixel = vec![0.0; out.components()];
        for index in out.region().iter() {
            let a = first
                .get(&index)
                .ok_or_else(|| missing_pixel(ctx.node_id, 0, &index))?;
            let b = second
                .get(&index)
                .ok_or_else(|| missing_pixel(ctx.node_id, 1, &index))?;
            self.functor.apply(a, b, &mut pixel);
            out.set(&index, &pixel);
        }
        thread.report_progress(out.region().number_of_pixels());
        Ok(())
    }
}

/// Pipeline node applying a [`NeighborhoodFunctor`] around every pixel.
///
/// Inputs are requested padded by the functor's radius and cropped to the
/// available data; the boundary policy decides what the functor sees past
/// the input's largest region.
pub struct NeighborhoodFilter<F> {
    functor: F,
    boundary: BoundaryPolicy,
}

impl<F> NeighborhoodFilter<F> {
    pub fn new(functor: F) -> Self {
        Self {
            functor,
            boundary: BoundaryPolicy::default(),
        }
    }

    pub fn with_boundary(mut self, boundary: BoundaryPolicy) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn boundary(&self) -> BoundaryPolicy {
        self.boundary
    }

    pub fn functor(&self) -> &F {
        &self.functor
    }
}

impl<const D: usize, F: NeighborhoodFunctor<D>> FilterNode<D> for NeighborhoodFilter<F> {
    fn metadata(&self) -> NodeMetadata {
        self.functor.metadata()
    }

    fn set_parameter(&mut self, name: &str, value: &Value) -> PipelineResult<()> {
        self.functor.set_parameter(name, value)
    }

    fn generate_output_information(
        &self,
        ctx: &InformationContext<'_, D>,
    ) -> PipelineResult<Vec<ImageDescriptor<D>>> {
        let input = ctx.input(0)?;
        let components = self.functor.output_components(input.number_of_components())?;
        Ok(vec![input.derive(
            input.largest_possible_region(),
            components,
            self.functor.output_sample_type(input.sample_type()),
        )])
    }

    fn generate_input_requested_region(
        &self,
        ctx: &RequestContext<'_, D>,
    ) -> PipelineResult<Vec<Region<D>>> {
        ctx.pad_and_crop_inputs(&self.functor.radius())
    }

    fn threaded_generate_data(
        &self,
        ctx: &ExecutionContext<'_, D>,
        thread: &ThreadContext<'_>,
        outputs: &mut [RasterSlabMut<'_, D>],
    ) -> PipelineResult<()> {
        let input = ctx.input(0)?;
        let available = ctx.input_descriptor(0)?.largest_possible_region();
        let radius = self.functor.radius();
        let constant = match self.boundary {
            BoundaryPolicy::Constant(value) => vec![value; input.components()],
            _ => Vec::new(),
        };

        let out = &mut outputs[0];
        let mut pixel = vec![0.0; out.components()];
        for index in out.region().iter() {
            let neighborhood =
                Neighborhood::new(input, available, index, radius, self.boundary, &constant);
            self.functor.apply(&neighborhood, &mut pixel);
            out.set(&index, &pixel);
        }
        thread.report_progress(out.region().number_of_pixels());
        Ok(())
    }
}
