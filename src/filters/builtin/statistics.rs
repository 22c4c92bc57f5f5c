//! Persistent per-band statistics.

use crate::core::context::{ExecutionContext, ThreadContext};
use crate::core::error::PipelineResult;
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::port::PortDefinition;
use crate::core::raster::RasterSlabMut;
use crate::filters::registry::FilterRegistry;
use log::debug;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// Register the statistics filter.
pub fn register<const D: usize>(registry: &mut FilterRegistry<D>) {
    registry.register(|| Box::new(StatisticsFilter::new()));
}

/// Statistics of one band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Statistics {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    /// `sum / count`, or NaN before any pixel was seen.
    pub mean: f64,
}

#[derive(Debug, Clone, Copy)]
struct Accumulator {
    count: u64,
    min: f64,
    max: f64,
    sum: f64,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self {
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
        }
    }
}

impl Accumulator {
    fn add(&mut self, value: f64) {
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
    }

    fn merge(&mut self, other: &Accumulator) {
        self.count += other.count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sum += other.sum;
    }

    fn statistics(&self) -> Statistics {
        let mean = if self.count == 0 {
            f64::NAN
        } else {
            self.sum / self.count as f64
        };
        Statistics {
            count: self.count,
            min: self.min,
            max: self.max,
            sum: self.sum,
            mean,
        }
    }
}

/// Read access to the totals of a [`StatisticsFilter`] that has been moved
/// into a graph.
#[derive(Debug, Clone, Default)]
pub struct StatisticsHandle {
    totals: Arc<Mutex<Vec<Accumulator>>>,
}

impl StatisticsHandle {
    /// One entry per band; empty before the first update.
    pub fn statistics(&self) -> Vec<Statistics> {
        self.totals.lock().iter().map(Accumulator::statistics).collect()
    }

    /// Forget everything accumulated so far.
    pub fn reset(&self) {
        self.totals.lock().clear();
    }
}

/// Passes its input through unchanged while accumulating per-band
/// count, min, max and sum.
///
/// Every slab accumulates into its own partial, and the partials are merged
/// into the totals once all slabs are done. Totals keep growing over
/// successive updates, so streaming an image piece by piece yields the
/// statistics of the whole image, until [`StatisticsHandle::reset`].
///
/// The node is non-deterministic: it is never served from the result cache,
/// since a cache hit would skip accumulation.
#[derive(Debug, Default)]
pub struct StatisticsFilter {
    partials: Mutex<Vec<Vec<Accumulator>>>,
    handle: StatisticsHandle,
}

impl StatisticsFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> StatisticsHandle {
        self.handle.clone()
    }

    pub fn statistics(&self) -> Vec<Statistics> {
        self.handle.statistics()
    }

    pub fn reset(&self) {
        self.handle.reset();
    }
}

impl<const D: usize> FilterNode<D> for StatisticsFilter {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("statistics", "Statistics")
            .category(Category::Analyze)
            .description("Accumulates per-band count, min, max, sum and mean")
            .input(PortDefinition::new("image"))
            .non_deterministic()
            .build()
    }

    fn before_threaded_generate_data(&self, ctx: &ExecutionContext<'_, D>) -> PipelineResult<()> {
        let bands = ctx.input_descriptor(0)?.number_of_components();
        *self.partials.lock() = vec![vec![Accumulator::default(); bands]; ctx.number_of_threads];
        Ok(())
    }

    fn threaded_generate_data(
        &self,
        ctx: &ExecutionContext<'_, D>,
        thread: &ThreadContext<'_>,
        outputs: &mut [RasterSlabMut<'_, D>],
    ) -> PipelineResult<()> {
        let input = ctx.input(0)?;
        let out = &mut outputs[0];
        let mut local = vec![Accumulator::default(); input.components()];
        for index in out.region().iter() {
            if let Some(pixel) = input.get(&index) {
                for (acc, &value) in local.iter_mut().zip(pixel) {
                    acc.add(value);
                }
                out.set(&index, pixel);
            }
        }

        if let Some(partial) = self.partials.lock().get_mut(thread.thread_id) {
            *partial = local;
        }
        thread.report_progress(out.region().number_of_pixels());
        Ok(())
    }

    fn after_threaded_generate_data(&self, ctx: &ExecutionContext<'_, D>) -> PipelineResult<()> {
        let partials = std::mem::take(&mut *self.partials.lock());
        let mut totals = self.handle.totals.lock();
        for partial in &partials {
            if totals.len() < partial.len() {
                totals.resize(partial.len(), Accumulator::default());
            }
            for (total, acc) in totals.iter_mut().zip(partial) {
                total.merge(acc);
            }
        }
        debug!(
            "Statistics node {} merged {} partials over {}",
            ctx.node_id,
            partials.len(),
            ctx.requested_region
        );
        Ok(())
    }
}
