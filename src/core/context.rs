//! Contexts handed to filters during each phase of an update.
//!
//! Each phase sees only what it may use: the information pass sees input
//! metadata, the request pass sees metadata plus the region being asked for,
//! and execution sees the buffered input rasters.

use crate::core::descriptor::ImageDescriptor;
use crate::core::error::{NodeId, PipelineError, PipelineResult};
use crate::core::raster::Raster;
use crate::core::region::{Radius, Region};
use crate::execution::progress::{AbortHandle, ProgressTracker};
use std::sync::Arc;

/// Context for `generate_output_information`.
#[derive(Debug, Clone, Copy)]
pub struct InformationContext<'a, const D: usize> {
    /// ID of the node being described.
    pub node_id: NodeId,
    inputs: &'a [ImageDescriptor<D>],
}

impl<'a, const D: usize> InformationContext<'a, D> {
    pub fn new(node_id: NodeId, inputs: &'a [ImageDescriptor<D>]) -> Self {
        Self { node_id, inputs }
    }

    /// Metadata of one input.
    pub fn input(&self, index: usize) -> PipelineResult<&'a ImageDescriptor<D>> {
        self.inputs.get(index).ok_or(PipelineError::MissingInput {
            node_id: self.node_id,
            input: index,
        })
    }

    pub fn inputs(&self) -> &'a [ImageDescriptor<D>] {
        self.inputs
    }

    pub fn number_of_inputs(&self) -> usize {
        self.inputs.len()
    }

    /// Fail unless every input has the same number of components.
    pub fn require_same_components(&self) -> PipelineResult<usize> {
        let first = self.input(0)?.number_of_components();
        for (index, input) in self.inputs.iter().enumerate().skip(1) {
            if input.number_of_components() != first {
                return Err(PipelineError::inconsistent(
                    self.node_id,
                    format!(
                        "input #{} has {} components, input #0 has {}",
                        index,
                        input.number_of_components(),
                        first
                    ),
                ));
            }
        }
        Ok(first)
    }

    /// Fail unless every input covers the same largest possible region.
    pub fn require_same_extent(&self) -> PipelineResult<Region<D>> {
        let first = self.input(0)?.largest_possible_region();
        for (index, input) in self.inputs.iter().enumerate().skip(1) {
            if input.largest_possible_region() != first {
                return Err(PipelineError::inconsistent(
                    self.node_id,
                    format!(
                        "input #{} covers {}, input #0 covers {}",
                        index,
                        input.largest_possible_region(),
                        first
                    ),
                ));
            }
        }
        Ok(first)
    }
}

/// Context for `generate_input_requested_region`.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a, const D: usize> {
    /// ID of the node propagating its request.
    pub node_id: NodeId,
    /// Region requested from this node's outputs.
    pub requested_region: Region<D>,
    inputs: &'a [ImageDescriptor<D>],
    outputs: &'a [ImageDescriptor<D>],
}

impl<'a, const D: usize> RequestContext<'a, D> {
    pub fn new(
        node_id: NodeId,
        requested_region: Region<D>,
        inputs: &'a [ImageDescriptor<D>],
        outputs: &'a [ImageDescriptor<D>],
    ) -> Self {
        Self {
            node_id,
            requested_region,
            inputs,
            outputs,
        }
    }

    pub fn input(&self, index: usize) -> PipelineResult<&'a ImageDescriptor<D>> {
        self.inputs.get(index).ok_or(PipelineError::MissingInput {
            node_id: self.node_id,
            input: index,
        })
    }

    pub fn inputs(&self) -> &'a [ImageDescriptor<D>] {
        self.inputs
    }

    pub fn outputs(&self) -> &'a [ImageDescriptor<D>] {
        self.outputs
    }

    /// Ask every input for exactly the requested region.
    ///
    /// Fails with `OutOfBoundsRequest` when the request is not fully inside an
    /// input's largest possible region.
    pub fn require_within_inputs(&self) -> PipelineResult<Vec<Region<D>>> {
        self.inputs
            .iter()
            .map(|input| {
                require_within(
                    self.node_id,
                    &self.requested_region,
                    &input.largest_possible_region(),
                )
            })
            .collect()
    }

    /// Ask every input for the requested region grown by `radius`, cropped to
    /// the data that input can provide.
    pub fn pad_and_crop_inputs(&self, radius: &Radius<D>) -> PipelineResult<Vec<Region<D>>> {
        self.inputs
            .iter()
            .map(|input| {
                pad_and_crop(
                    self.node_id,
                    &self.requested_region,
                    radius,
                    &input.largest_possible_region(),
                )
            })
            .collect()
    }
}

/// Strict check: `requested` must lie inside `largest`.
pub fn require_within<const D: usize>(
    node_id: NodeId,
    requested: &Region<D>,
    largest: &Region<D>,
) -> PipelineResult<Region<D>> {
    if largest.contains(requested) {
        Ok(*requested)
    } else {
        Err(PipelineError::OutOfBoundsRequest {
            node_id,
            requested: requested.to_string(),
            largest: largest.to_string(),
        })
    }
}

/// Pad `requested` by `radius` then crop to `largest`.
///
/// Only a request that misses `largest` entirely is an error.
pub fn pad_and_crop<const D: usize>(
    node_id: NodeId,
    requested: &Region<D>,
    radius: &Radius<D>,
    largest: &Region<D>,
) -> PipelineResult<Region<D>> {
    let padded = requested.pad(radius);
    let cropped = padded.crop(largest);
    if cropped.is_empty() && !requested.is_empty() {
        return Err(PipelineError::OutOfBoundsRequest {
            node_id,
            requested: padded.to_string(),
            largest: largest.to_string(),
        });
    }
    Ok(cropped)
}

/// Context for the execution hooks and the threaded callback.
pub struct ExecutionContext<'a, const D: usize> {
    /// ID of the node being executed.
    pub node_id: NodeId,
    /// Region every output of this node is being computed over.
    pub requested_region: Region<D>,
    /// Number of slabs the dispatcher will run.
    pub number_of_threads: usize,
    inputs: Vec<Arc<Raster<D>>>,
    input_descriptors: &'a [ImageDescriptor<D>],
    output_descriptors: &'a [ImageDescriptor<D>],
}

impl<'a, const D: usize> ExecutionContext<'a, D> {
    pub fn new(
        node_id: NodeId,
        requested_region: Region<D>,
        number_of_threads: usize,
        inputs: Vec<Arc<Raster<D>>>,
        input_descriptors: &'a [ImageDescriptor<D>],
        output_descriptors: &'a [ImageDescriptor<D>],
    ) -> Self {
        Self {
            node_id,
            requested_region,
            number_of_threads,
            inputs,
            input_descriptors,
            output_descriptors,
        }
    }

    /// Buffered data of one input. Read-only.
    pub fn input(&self, index: usize) -> PipelineResult<&Raster<D>> {
        self.inputs
            .get(index)
            .map(|raster| raster.as_ref())
            .ok_or(PipelineError::MissingInput {
                node_id: self.node_id,
                input: index,
            })
    }

    pub fn number_of_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn input_descriptor(&self, index: usize) -> PipelineResult<&'a ImageDescriptor<D>> {
        self.input_descriptors
            .get(index)
            .ok_or(PipelineError::MissingInput {
                node_id: self.node_id,
                input: index,
            })
    }

    pub fn output_descriptors(&self) -> &'a [ImageDescriptor<D>] {
        self.output_descriptors
    }
}

/// Per-worker context passed to `threaded_generate_data`.
#[derive(Clone, Copy)]
pub struct ThreadContext<'a> {
    /// ID of the node being executed.
    pub node_id: NodeId,
    /// Index of this slab, `0..number_of_threads`.
    pub thread_id: usize,
    /// Number of slabs in this dispatch.
    pub number_of_threads: usize,
    abort: &'a AbortHandle,
    progress: Option<&'a ProgressTracker>,
}

impl<'a> ThreadContext<'a> {
    pub fn new(
        node_id: NodeId,
        thread_id: usize,
        number_of_threads: usize,
        abort: &'a AbortHandle,
        progress: Option<&'a ProgressTracker>,
    ) -> Self {
        Self {
            node_id,
            thread_id,
            number_of_threads,
            abort,
            progress,
        }
    }

    /// Report that `pixels` more output pixels are done.
    pub fn report_progress(&self, pixels: u64) {
        if let Some(tracker) = self.progress {
            tracker.pixels_completed(self.node_id, pixels);
        }
    }

    /// Fail with `Aborted` once an abort has been requested.
    pub fn check_abort(&self) -> PipelineResult<()> {
        if self.abort.is_aborted() {
            Err(PipelineError::Aborted)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::raster::SampleType;

    fn descriptor(size: [u64; 2], components: usize) -> ImageDescriptor<2> {
        ImageDescriptor::new(Region::from_size(size), components, SampleType::U8)
    }

    #[test]
    fn test_missing_input() {
        let node_id = NodeId::new();
        let ctx = InformationContext::<2>::new(node_id, &[]);
        assert!(matches!(
            ctx.input(0),
            Err(PipelineError::MissingInput { input: 0, .. })
        ));
    }

    #[test]
    fn test_component_mismatch() {
        let inputs = [descriptor([4, 4], 1), descriptor([4, 4], 3)];
        let ctx = InformationContext::new(NodeId::new(), &inputs);
        assert!(matches!(
            ctx.require_same_components(),
            Err(PipelineError::InconsistentMetadata { .. })
        ));
        assert_eq!(ctx.require_same_extent().unwrap(), Region::from_size([4, 4]));
    }

    #[test]
    fn test_request_helpers() {
        let inputs = [descriptor([10, 10], 1)];
        let node_id = NodeId::new();

        let corner = RequestContext::new(node_id, Region::new([0, 0], [5, 5]), &inputs, &[]);
        assert_eq!(
            corner.pad_and_crop_inputs(&Radius::uniform(1)).unwrap(),
            vec![Region::new([0, 0], [6, 6])]
        );
        assert_eq!(
            corner.require_within_inputs().unwrap(),
            vec![Region::new([0, 0], [5, 5])]
        );

        let outside = RequestContext::new(node_id, Region::new([8, 8], [4, 4]), &inputs, &[]);
        assert!(outside.require_within_inputs().is_err());

        let far = RequestContext::new(node_id, Region::new([20, 20], [2, 2]), &inputs, &[]);
        assert!(matches!(
            far.pad_and_crop_inputs(&Radius::uniform(1)),
            Err(PipelineError::OutOfBoundsRequest { .. })
        ));
    }

    #[test]
    fn test_thread_context_abort() {
        let abort = AbortHandle::new();
        let ctx = ThreadContext::new(NodeId::new(), 0, 1, &abort, None);
        assert!(ctx.check_abort().is_ok());
        abort.abort();
        assert!(matches!(ctx.check_abort(), Err(PipelineError::Aborted)));
    }
}
