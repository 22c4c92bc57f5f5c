//! Streamed updates.
//!
//! The driver plans divisions of the area to produce, then runs one engine
//! update per division and hands each piece to a [`RasterSink`]. Peak memory
//! is bounded by the largest division instead of the whole image.

use crate::core::descriptor::ImageDescriptor;
use crate::core::error::{GraphError, NodeId, PipelineError, PipelineResult};
use crate::core::raster::Raster;
use crate::core::region::Region;
use crate::execution::engine::ExecutionEngine;
use crate::execution::progress::{notify, ProgressUpdate};
use crate::graph::structure::ProcessingGraph;
use crate::streaming::manager::StreamingManager;
use crate::streaming::sink::{MemorySink, RasterSink};
use log::{debug, info};
use std::time::{Duration, Instant};

/// Statistics of one streamed run.
#[derive(Debug, Clone, Default)]
pub struct StreamingStats {
    /// Number of divisions computed.
    pub divisions: usize,
    /// Node executions, summed over divisions.
    pub nodes_executed: usize,
    /// Cache hits, summed over divisions.
    pub cache_hits: usize,
    /// Pixels generated, summed over divisions and nodes.
    pub pixels_processed: u64,
    pub total_duration: Duration,
}

/// Runs an update as a sequence of smaller updates.
pub struct StreamingDriver<'e, const D: usize> {
    engine: &'e ExecutionEngine<D>,
    manager: StreamingManager,
}

impl<'e, const D: usize> StreamingDriver<'e, D> {
    pub fn new(engine: &'e ExecutionEngine<D>, manager: StreamingManager) -> Self {
        Self { engine, manager }
    }

    pub fn manager(&self) -> &StreamingManager {
        &self.manager
    }

    /// Divisions a stream of output `output` of `target` would run.
    ///
    /// `area` restricts streaming to part of the largest possible region and
    /// must lie inside it.
    pub fn plan(
        &self,
        graph: &ProcessingGraph<D>,
        target: NodeId,
        output: usize,
        area: Option<Region<D>>,
    ) -> PipelineResult<Vec<Region<D>>> {
        Ok(self.prepare(graph, target, output, area)?.1)
    }

    fn prepare(
        &self,
        graph: &ProcessingGraph<D>,
        target: NodeId,
        output: usize,
        area: Option<Region<D>>,
    ) -> PipelineResult<(ImageDescriptor<D>, Vec<Region<D>>)> {
        let information = self.engine.information(graph, target)?;
        let mut descriptor = information
            .nodes
            .get(&target)
            .and_then(|node| node.outputs.get(output))
            .cloned()
            .ok_or(GraphError::OutputNotFound {
                node_id: target,
                output,
            })?;

        let largest = descriptor.largest_possible_region();
        let area = area.unwrap_or(largest);
        if !largest.contains(&area) {
            return Err(PipelineError::OutOfBoundsRequest {
                node_id: target,
                requested: area.to_string(),
                largest: largest.to_string(),
            });
        }
        descriptor.set_requested_region(target, area)?;

        let divisions = self.manager.divide(&area, information.bytes_per_pixel())?;
        Ok((descriptor, divisions))
    }

    /// Stream output `output` of `target` into `sink`.
    ///
    /// The abort handle of the engine is checked before every division.
    pub fn stream<S>(
        &self,
        graph: &ProcessingGraph<D>,
        target: NodeId,
        output: usize,
        sink: &mut S,
        area: Option<Region<D>>,
    ) -> PipelineResult<StreamingStats>
    where
        S: RasterSink<D> + ?Sized,
    {
        let start_time = Instant::now();
        let (descriptor, divisions) = self.prepare(graph, target, output, area)?;
        let total = divisions.len();
        let abort = self.engine.abort_handle();
        let callback = &self.engine.options().progress_callback;

        sink.begin(&descriptor)?;
        let mut stats = StreamingStats::default();
        for (index, division) in divisions.into_iter().enumerate() {
            if abort.is_aborted() {
                notify(callback, ProgressUpdate::Aborted);
                return Err(PipelineError::Aborted);
            }
            debug!("Division {}/{}: {}", index + 1, total, division);
            notify(
                callback,
                ProgressUpdate::StreamDivision {
                    index,
                    total,
                    region: division.to_string(),
                },
            );

            let result = self
                .engine
                .update_division(graph, target, output, division)?;
            sink.write(&result.output)?;

            stats.divisions += 1;
            stats.nodes_executed += result.stats.nodes_executed;
            stats.cache_hits += result.stats.cache_hits;
            stats.pixels_processed += result.stats.pixels_processed;
        }
        sink.finish()?;

        stats.total_duration = start_time.elapsed();
        info!(
            "Streamed {} in {} divisions in {:?}",
            descriptor.requested_region(),
            stats.divisions,
            stats.total_duration
        );
        Ok(stats)
    }

    /// Stream into memory and return the stitched raster.
    pub fn stream_to_raster(
        &self,
        graph: &ProcessingGraph<D>,
        target: NodeId,
        output: usize,
        area: Option<Region<D>>,
    ) -> PipelineResult<Raster<D>> {
        let mut sink = MemorySink::new();
        self.stream(graph, target, output, &mut sink, area)?;
        sink.into_raster()
            .ok_or_else(|| PipelineError::Other("stream produced no raster".to_string()))
    }
}
