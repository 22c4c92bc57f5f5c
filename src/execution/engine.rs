//! The update driver.
//!
//! An update of one node output runs in four passes over the sub-pipeline
//! feeding that node:
//!
//! 1. information, producers first: every node describes its outputs from
//!    its inputs' metadata; nothing is allocated;
//! 2. request, consumers first: the requested region flows upstream through
//!    `generate_input_requested_region`, merged per node as a bounding box
//!    when several consumers read the same node;
//! 3. allocation: each requested node gets fresh outputs over exactly its
//!    requested region;
//! 4. execution, producers first, through the [`ThreadedDispatcher`].
//!
//! Any failure in passes 1 and 2 aborts before a single pixel is allocated.

use crate::config::PipelineConfig;
use crate::core::context::{ExecutionContext, InformationContext, RequestContext};
use crate::core::descriptor::ImageDescriptor;
use crate::core::error::{GraphError, NodeId, PipelineError, PipelineResult};
use crate::core::raster::Raster;
use crate::core::region::Region;
use crate::core::timestamp::Stamp;
use crate::execution::cache::{CacheKey, CacheStats, ResultCache};
use crate::execution::dispatcher::ThreadedDispatcher;
use crate::execution::progress::{
    AbortHandle, ProgressCallback, ProgressTracker, ProgressUpdate, SkipReason,
};
use crate::graph::connection::Endpoint;
use crate::graph::structure::ProcessingGraph;
use crate::graph::topology::TopologyAnalyzer;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Execution options.
#[derive(Clone)]
pub struct ExecutionOptions {
    /// Slabs per node (0 = one per hardware thread).
    pub number_of_threads: usize,
    /// Whether to reuse buffered outputs across updates.
    pub use_cache: bool,
    /// Maximum number of cached node results.
    pub cache_capacity: usize,
    /// Memory budget of the cache in megabytes.
    pub cache_memory_mb: usize,
    /// Progress callback.
    pub progress_callback: Option<Arc<ProgressCallback>>,
    /// Abort flag checked between nodes and before every slab.
    pub abort: AbortHandle,
}

impl std::fmt::Debug for ExecutionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionOptions")
            .field("number_of_threads", &self.number_of_threads)
            .field("use_cache", &self.use_cache)
            .field("cache_capacity", &self.cache_capacity)
            .field("cache_memory_mb", &self.cache_memory_mb)
            .field("progress_callback", &self.progress_callback.as_ref().map(|_| "<callback>"))
            .field("aborted", &self.abort.is_aborted())
            .finish()
    }
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            number_of_threads: 0, // Use all available
            use_cache: true,
            cache_capacity: 64,
            cache_memory_mb: 512,
            progress_callback: None,
            abort: AbortHandle::new(),
        }
    }
}

impl ExecutionOptions {
    /// Create a new options builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options matching a loaded configuration.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::default()
            .with_threads(config.number_of_threads)
            .with_cache(config.use_cache)
            .with_cache_limits(config.cache_capacity, config.cache_memory_mb)
    }

    /// Set the number of slabs per node.
    pub fn with_threads(mut self, number_of_threads: usize) -> Self {
        self.number_of_threads = number_of_threads;
        self
    }

    /// Enable/disable caching.
    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Set cache entry and memory limits.
    pub fn with_cache_limits(mut self, capacity: usize, memory_mb: usize) -> Self {
        self.cache_capacity = capacity;
        self.cache_memory_mb = memory_mb;
        self
    }

    /// Set progress callback.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(Box::new(callback)));
        self
    }

    /// Share an abort handle with the caller.
    pub fn with_abort_handle(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }
}

/// Execution statistics of one update.
#[derive(Debug, Clone, Default)]
pub struct ExecutionStats {
    /// Total execution time.
    pub total_duration: Duration,
    /// Number of nodes whose data was generated.
    pub nodes_executed: usize,
    /// Number of nodes served from the cache.
    pub cache_hits: usize,
    /// Number of nodes not needed for the request.
    pub nodes_skipped: usize,
    /// Output pixels generated, summed over nodes and outputs.
    pub pixels_processed: u64,
    /// Largest number of slabs any node was split into.
    pub threads_used: usize,
}

/// Result of updating one output.
#[derive(Debug, Clone)]
pub struct UpdateResult<const D: usize> {
    /// Pixels of the requested region.
    pub output: Arc<Raster<D>>,
    /// Metadata of the output, with requested and buffered regions set.
    pub descriptor: ImageDescriptor<D>,
    pub stats: ExecutionStats,
}

/// What the information pass learned about one node.
#[derive(Debug, Clone)]
pub(crate) struct NodeInformation<const D: usize> {
    pub(crate) inputs: Vec<Endpoint>,
    pub(crate) input_descriptors: Vec<ImageDescriptor<D>>,
    pub(crate) outputs: Vec<ImageDescriptor<D>>,
    /// Latest modification anywhere upstream, this node included.
    pub(crate) stamp: Stamp,
    pub(crate) deterministic: bool,
}

/// Result of the information pass over a sub-pipeline.
#[derive(Debug, Clone)]
pub(crate) struct PipelineInformation<const D: usize> {
    /// Producers first; the target is last.
    pub(crate) order: Vec<NodeId>,
    pub(crate) nodes: HashMap<NodeId, NodeInformation<D>>,
}

impl<const D: usize> PipelineInformation<D> {
    fn node(&self, node_id: NodeId) -> PipelineResult<&NodeInformation<D>> {
        self.nodes
            .get(&node_id)
            .ok_or(PipelineError::Graph(GraphError::NodeNotFound(node_id)))
    }

    /// Bytes needed per output pixel if every node of the sub-pipeline
    /// buffered its outputs at once.
    pub(crate) fn bytes_per_pixel(&self) -> usize {
        self.nodes
            .values()
            .flat_map(|node| node.outputs.iter())
            .map(|output| output.number_of_components() * std::mem::size_of::<f64>())
            .sum()
    }
}

/// Drives updates of a [`ProcessingGraph`].
pub struct ExecutionEngine<const D: usize> {
    options: ExecutionOptions,
    dispatcher: ThreadedDispatcher,
    cache: ResultCache<D>,
}

impl<const D: usize> ExecutionEngine<D> {
    /// Create a new execution engine.
    pub fn new() -> Self {
        Self::with_options(ExecutionOptions::default())
    }

    pub fn with_options(options: ExecutionOptions) -> Self {
        Self {
            dispatcher: ThreadedDispatcher::new(options.number_of_threads),
            cache: ResultCache::with_memory_limit(options.cache_capacity, options.cache_memory_mb),
            options,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::with_options(ExecutionOptions::from_config(config))
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// Replace the options. Drops the cache and the worker pool.
    pub fn set_options(&mut self, options: ExecutionOptions) {
        *self = Self::with_options(options);
    }

    /// Handle that aborts this engine's running and future updates.
    pub fn abort_handle(&self) -> AbortHandle {
        self.options.abort.clone()
    }

    /// Number of slabs each node is split into (before size reduction).
    pub fn number_of_threads(&self) -> usize {
        self.dispatcher.number_of_threads()
    }

    /// Describe the outputs of `target` without generating any data.
    pub fn update_output_information(
        &self,
        graph: &ProcessingGraph<D>,
        target: NodeId,
    ) -> PipelineResult<Vec<ImageDescriptor<D>>> {
        let information = self.information(graph, target)?;
        Ok(information.node(target)?.outputs.clone())
    }

    /// Generate output #0 of `target` over its largest possible region.
    pub fn update(&self, graph: &ProcessingGraph<D>, target: NodeId) -> PipelineResult<Arc<Raster<D>>> {
        Ok(self.update_output(graph, target, 0, None)?.output)
    }

    /// Generate output #0 of `target` over `region`.
    pub fn update_region(
        &self,
        graph: &ProcessingGraph<D>,
        target: NodeId,
        region: Region<D>,
    ) -> PipelineResult<Arc<Raster<D>>> {
        Ok(self.update_output(graph, target, 0, Some(region))?.output)
    }

    /// Generate output `output` of `target`.
    ///
    /// `None` requests the largest possible region. A request partly outside
    /// the largest region is cropped to it; one entirely outside fails with
    /// `OutOfBoundsRequest`.
    pub fn update_output(
        &self,
        graph: &ProcessingGraph<D>,
        target: NodeId,
        output: usize,
        region: Option<Region<D>>,
    ) -> PipelineResult<UpdateResult<D>> {
        self.update_with(graph, target, output, region, self.options.use_cache)
    }

    /// One division of a streamed update.
    ///
    /// Divisions are disjoint, so their results are read from the cache but
    /// never stored in it.
    pub(crate) fn update_division(
        &self,
        graph: &ProcessingGraph<D>,
        target: NodeId,
        output: usize,
        division: Region<D>,
    ) -> PipelineResult<UpdateResult<D>> {
        self.update_with(graph, target, output, Some(division), false)
    }

    fn update_with(
        &self,
        graph: &ProcessingGraph<D>,
        target: NodeId,
        output: usize,
        region: Option<Region<D>>,
        store: bool,
    ) -> PipelineResult<UpdateResult<D>> {
        let start_time = Instant::now();
        let information = self.information(graph, target)?;

        let mut descriptor = information
            .node(target)?
            .outputs
            .get(output)
            .cloned()
            .ok_or(GraphError::OutputNotFound {
                node_id: target,
                output,
            })?;
        let requested = descriptor.set_requested_region(
            target,
            region.unwrap_or_else(|| descriptor.largest_possible_region()),
        )?;

        let mut tracker = ProgressTracker::new(information.order.len());
        if let Some(callback) = &self.options.progress_callback {
            tracker = tracker.with_callback(callback.clone());
        }
        tracker.start();

        let result = self.run(graph, &information, target, output, requested, &tracker, store);
        let (raster, mut stats) = match result {
            Ok(done) => done,
            Err(PipelineError::Aborted) => {
                tracker.aborted();
                return Err(PipelineError::Aborted);
            }
            Err(error) => {
                tracker.report_error(error.node_id(), error.to_string());
                return Err(error);
            }
        };
        tracker.complete();

        let raster = if raster.region() == requested {
            raster
        } else {
            Arc::new(raster.extract(&requested)?)
        };
        descriptor.set_buffered_region(target, raster.region())?;
        stats.total_duration = start_time.elapsed();
        info!(
            "Updated {} over {}: {} executed, {} cached, {} skipped in {:?}",
            target,
            requested,
            stats.nodes_executed,
            stats.cache_hits,
            stats.nodes_skipped,
            stats.total_duration
        );

        Ok(UpdateResult {
            output: raster,
            descriptor,
            stats,
        })
    }

    /// Information pass over every node `target` depends on.
    pub(crate) fn information(
        &self,
        graph: &ProcessingGraph<D>,
        target: NodeId,
    ) -> PipelineResult<PipelineInformation<D>> {
        let order = TopologyAnalyzer::new(graph).upstream_order(target)?;
        let mut nodes: HashMap<NodeId, NodeInformation<D>> = HashMap::with_capacity(order.len());

        for &node_id in &order {
            let node = graph.get_node(node_id)?;
            let filter = node.filter();
            let metadata = filter.metadata();
            let endpoints = graph.input_endpoints(node_id)?;

            if endpoints.is_empty() && !metadata.accepts_input_count(0) {
                return Err(PipelineError::MissingInput { node_id, input: 0 });
            }

            let mut inputs = Vec::with_capacity(endpoints.len());
            let mut input_descriptors = Vec::with_capacity(endpoints.len());
            let mut stamp = node.modified();
            for (input, endpoint) in endpoints.into_iter().enumerate() {
                let endpoint = endpoint.ok_or(PipelineError::MissingInput { node_id, input })?;
                let upstream = nodes
                    .get(&endpoint.node_id)
                    .ok_or(GraphError::NodeNotFound(endpoint.node_id))?;
                let descriptor = upstream.outputs.get(endpoint.port).cloned().ok_or(
                    GraphError::OutputNotFound {
                        node_id: endpoint.node_id,
                        output: endpoint.port,
                    },
                )?;
                stamp = stamp.max(upstream.stamp);
                inputs.push(endpoint);
                input_descriptors.push(descriptor);
            }

            if !metadata.accepts_input_count(inputs.len()) {
                return Err(PipelineError::inconsistent(
                    node_id,
                    format!("'{}' cannot take {} inputs", metadata.id, inputs.len()),
                ));
            }

            let outputs = filter
                .generate_output_information(&InformationContext::new(node_id, &input_descriptors))?;
            if outputs.len() != metadata.outputs.len() {
                return Err(PipelineError::inconsistent(
                    node_id,
                    format!(
                        "described {} outputs, '{}' declares {}",
                        outputs.len(),
                        metadata.id,
                        metadata.outputs.len()
                    ),
                ));
            }
            debug!(
                "Node {} ({}) largest regions: {:?}",
                node_id,
                metadata.id,
                outputs
                    .iter()
                    .map(|o| o.largest_possible_region().to_string())
                    .collect::<Vec<_>>()
            );

            nodes.insert(
                node_id,
                NodeInformation {
                    inputs,
                    input_descriptors,
                    outputs,
                    stamp,
                    deterministic: metadata.deterministic,
                },
            );
        }

        Ok(PipelineInformation { order, nodes })
    }

    /// Request, allocation and execution passes.
    ///
    /// With `store`, executed results enter the cache once the whole update
    /// has succeeded.
    #[allow(clippy::too_many_arguments)]
    fn run(
        &self,
        graph: &ProcessingGraph<D>,
        information: &PipelineInformation<D>,
        target: NodeId,
        output: usize,
        requested: Region<D>,
        tracker: &ProgressTracker,
        store: bool,
    ) -> PipelineResult<(Arc<Raster<D>>, ExecutionStats)> {
        let mut stats = ExecutionStats::default();
        let mut requests: HashMap<NodeId, Region<D>> = HashMap::new();
        let mut consumers: HashMap<NodeId, usize> = HashMap::new();
        // Per node and input: whether a region was requested from it.
        let mut reads: HashMap<NodeId, Vec<bool>> = HashMap::new();
        let mut produced: HashMap<NodeId, Vec<Arc<Raster<D>>>> = HashMap::new();
        let mut pending: Vec<(CacheKey<D>, Vec<Arc<Raster<D>>>, Duration)> = Vec::new();
        requests.insert(target, requested);

        // Request pass, consumers first.
        for &node_id in information.order.iter().rev() {
            let Some(&region) = requests.get(&node_id) else {
                continue;
            };
            let node = information.node(node_id)?;

            if self.options.use_cache && node.deterministic {
                if let Some(outputs) = self.cache.get_covering(node_id, node.stamp, &region) {
                    debug!("Node {} served {} from cache", node_id, region);
                    produced.insert(node_id, outputs);
                    continue;
                }
            }

            let ctx = RequestContext::new(node_id, region, &node.input_descriptors, &node.outputs);
            let input_regions = graph
                .get_node(node_id)?
                .filter()
                .generate_input_requested_region(&ctx)?;
            if input_regions.len() != node.inputs.len() {
                return Err(PipelineError::inconsistent(
                    node_id,
                    format!(
                        "requested {} input regions for {} inputs",
                        input_regions.len(),
                        node.inputs.len()
                    ),
                ));
            }

            let mut node_reads = vec![false; node.inputs.len()];
            for (((endpoint, descriptor), input_region), read) in node
                .inputs
                .iter()
                .zip(&node.input_descriptors)
                .zip(input_regions)
                .zip(node_reads.iter_mut())
            {
                if input_region.is_empty() {
                    continue;
                }
                let mut upstream = descriptor.clone();
                let cropped = upstream.set_requested_region(node_id, input_region)?;
                debug!(
                    "Node {} requests {} from {} (asked {})",
                    node_id, cropped, endpoint, input_region
                );
                requests
                    .entry(endpoint.node_id)
                    .and_modify(|r| *r = r.union_bounds(&cropped))
                    .or_insert(cropped);
                *consumers.entry(endpoint.node_id).or_default() += 1;
                *read = true;
            }
            reads.insert(node_id, node_reads);
        }

        // Allocation and execution, producers first.
        for &node_id in &information.order {
            if self.options.abort.is_aborted() {
                return Err(PipelineError::Aborted);
            }
            let node = information.node(node_id)?;

            if produced.contains_key(&node_id) {
                stats.cache_hits += 1;
                tracker.node_skipped(node_id, SkipReason::Cached);
                // Served whole; its inputs were never read.
                continue;
            }
            let Some(&region) = requests.get(&node_id) else {
                stats.nodes_skipped += 1;
                tracker.node_skipped(node_id, SkipReason::NotRequested);
                continue;
            };
            let node_reads = reads.get(&node_id).map(Vec::as_slice).unwrap_or(&[]);
            let (outputs, elapsed) =
                self.execute_node(graph, node_id, node, region, node_reads, &produced, tracker, &mut stats)?;
            if store && node.deterministic {
                pending.push((
                    CacheKey {
                        node_id,
                        stamp: node.stamp,
                        region,
                    },
                    outputs.clone(),
                    elapsed,
                ));
            }
            produced.insert(node_id, outputs);

            // Release upstream buffers nobody else is waiting for.
            for (endpoint, _) in node.inputs.iter().zip(node_reads).filter(|(_, &read)| read) {
                if let Some(remaining) = consumers.get_mut(&endpoint.node_id) {
                    *remaining = remaining.saturating_sub(1);
                    if *remaining == 0 && endpoint.node_id != target {
                        produced.remove(&endpoint.node_id);
                    }
                }
            }
        }

        let raster = produced
            .get(&target)
            .and_then(|outputs| outputs.get(output))
            .cloned()
            .ok_or(GraphError::OutputNotFound {
                node_id: target,
                output,
            })?;
        for (key, outputs, elapsed) in pending {
            self.cache.put(key, outputs, elapsed);
        }
        Ok((raster, stats))
    }

    #[allow(clippy::too_many_arguments)]
    fn execute_node(
        &self,
        graph: &ProcessingGraph<D>,
        node_id: NodeId,
        node: &NodeInformation<D>,
        region: Region<D>,
        reads: &[bool],
        produced: &HashMap<NodeId, Vec<Arc<Raster<D>>>>,
        tracker: &ProgressTracker,
        stats: &mut ExecutionStats,
    ) -> PipelineResult<(Vec<Arc<Raster<D>>>, Duration)> {
        let graph_node = graph.get_node(node_id)?;
        let filter = graph_node.filter();

        let mut inputs: Vec<Arc<Raster<D>>> = Vec::with_capacity(node.inputs.len());
        for (input, (endpoint, descriptor)) in node.inputs.iter().zip(&node.input_descriptors).enumerate() {
            let buffer = produced
                .get(&endpoint.node_id)
                .and_then(|outputs| outputs.get(endpoint.port))
                .cloned();
            let buffer = match buffer {
                Some(buffer) => buffer,
                None if reads.get(input).copied().unwrap_or(false) => {
                    return Err(PipelineError::inconsistent(
                        node_id,
                        format!("no buffer from {} for input #{}", endpoint, input),
                    ));
                }
                // Nothing was requested from this input.
                None => Arc::new(Raster::new(
                    Region::empty(),
                    descriptor.number_of_components(),
                    descriptor.sample_type(),
                )),
            };
            inputs.push(buffer);
        }

        let mut output_descriptors = node.outputs.clone();
        for descriptor in &mut output_descriptors {
            descriptor.set_requested_region(node_id, region)?;
            descriptor.set_buffered_region(node_id, region)?;
        }
        let mut outputs: Vec<Raster<D>> = output_descriptors
            .iter()
            .map(|d| Raster::new(region, d.number_of_components(), d.sample_type()))
            .collect();

        let splits = self.dispatcher.split(&region);
        let ctx = ExecutionContext::new(
            node_id,
            region,
            splits.len(),
            inputs,
            &node.input_descriptors,
            &output_descriptors,
        );

        let started = Instant::now();
        tracker.node_started(node_id, graph_node.display_name(), region.number_of_pixels());
        filter.before_threaded_generate_data(&ctx)?;
        self.dispatcher.dispatch(
            node_id,
            filter,
            &ctx,
            &mut outputs,
            &splits,
            &self.options.abort,
            Some(tracker),
        )?;
        filter.after_threaded_generate_data(&ctx)?;
        let elapsed = started.elapsed();
        tracker.node_completed(node_id, elapsed.as_millis() as u64);

        stats.nodes_executed += 1;
        stats.pixels_processed += region.number_of_pixels() * outputs.len() as u64;
        stats.threads_used = stats.threads_used.max(splits.len());

        let outputs: Vec<Arc<Raster<D>>> = outputs.into_iter().map(Arc::new).collect();
        Ok((outputs, elapsed))
    }

    /// Clear the execution cache.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Invalidate cache for a specific node.
    pub fn invalidate_node(&self, node_id: NodeId) {
        self.cache.invalidate_node(node_id);
    }

    /// Get cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Bytes held by cached outputs.
    pub fn cache_memory_usage(&self) -> usize {
        self.cache.memory_usage()
    }
}

impl<const D: usize> Default for ExecutionEngine<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::ThreadContext;
    use crate::core::node::{Category, FilterNode, NodeMetadata, PassthroughNode};
    use crate::core::port::PortDefinition;
    use crate::core::raster::{RasterSlabMut, SampleType};
    use crate::core::region::Radius;
    use crate::core::types::Value;
    use crate::filters::builtin::{
        AlphaBlendFilter, AlphaBlendFunctor, ConstantSource, GeneratorSource, MeanFilter, MeanFunctor,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Copies its input and counts executions and requested regions.
    #[derive(Clone, Default)]
    struct Recorder {
        radius: u64,
        executions: Arc<AtomicUsize>,
        requested: Arc<parking_lot::Mutex<Vec<Region<2>>>>,
    }

    impl FilterNode<2> for Recorder {
        fn metadata(&self) -> NodeMetadata {
            NodeMetadata::builder("recorder", "Recorder")
                .category(Category::Utility)
                .input(PortDefinition::new("input"))
                .build()
        }

        fn generate_input_requested_region(
            &self,
            ctx: &RequestContext<'_, 2>,
        ) -> PipelineResult<Vec<Region<2>>> {
            self.requested.lock().push(ctx.requested_region);
            ctx.pad_and_crop_inputs(&Radius::uniform(self.radius))
        }

        fn before_threaded_generate_data(&self, _ctx: &ExecutionContext<'_, 2>) -> PipelineResult<()> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn threaded_generate_data(
            &self,
            ctx: &ExecutionContext<'_, 2>,
            _thread: &ThreadContext<'_>,
            outputs: &mut [RasterSlabMut<'_, 2>],
        ) -> PipelineResult<()> {
            outputs[0].copy_from(ctx.input(0)?);
            Ok(())
        }
    }

    /// Fails, or panics, on every slab.
    struct Failing {
        panic: bool,
    }

    impl FilterNode<2> for Failing {
        fn metadata(&self) -> NodeMetadata {
            NodeMetadata::builder("failing", "Failing")
                .category(Category::Utility)
                .input(PortDefinition::new("input"))
                .build()
        }

        fn threaded_generate_data(
            &self,
            _ctx: &ExecutionContext<'_, 2>,
            _thread: &ThreadContext<'_>,
            _outputs: &mut [RasterSlabMut<'_, 2>],
        ) -> PipelineResult<()> {
            if self.panic {
                panic!("slab exploded");
            }
            Err(PipelineError::Other("slab failed".to_string()))
        }
    }

    fn ramp() -> GeneratorSource<2> {
        GeneratorSource::new(Region::from_size([16, 12]), 1, SampleType::F64, |index| {
            vec![(index[0] + 100 * index[1]) as f64]
        })
    }

    #[test]
    fn test_engine_creation() {
        let engine = ExecutionEngine::<2>::with_options(ExecutionOptions::new().with_threads(3));
        assert_eq!(engine.number_of_threads(), 3);
        assert_eq!(engine.cache_stats().hits, 0);
    }

    #[test]
    fn test_update_largest_region() {
        let mut graph = ProcessingGraph::<2>::new();
        let source = graph.add_filter(ramp());
        let copy = graph.add_filter(PassthroughNode);
        graph.connect(source, 0, copy, 0).unwrap();

        let engine = ExecutionEngine::with_options(ExecutionOptions::new().with_threads(4));
        let result = engine.update_output(&graph, copy, 0, None).unwrap();
        assert_eq!(result.output.region(), Region::from_size([16, 12]));
        assert_eq!(result.output.get_component(&[3, 7], 0), Some(703.0));
        assert_eq!(result.descriptor.buffered_region(), Region::from_size([16, 12]));
        assert_eq!(result.stats.nodes_executed, 2);
        assert_eq!(result.stats.threads_used, 4);
    }

    #[test]
    fn test_request_propagates_padded_and_cropped() {
        let mut graph = ProcessingGraph::<2>::new();
        let source = graph.add_filter(ramp());
        let inner = Recorder {
            radius: 2,
            ..Recorder::default()
        };
        let outer = Recorder {
            radius: 1,
            ..Recorder::default()
        };
        let inner_seen = inner.requested.clone();
        let a = graph.add_filter(inner);
        let b = graph.add_filter(outer);
        graph.connect(source, 0, a, 0).unwrap();
        graph.connect(a, 0, b, 0).unwrap();

        let engine = ExecutionEngine::new();
        let out = engine.update_region(&graph, b, Region::new([0, 5], [4, 2])).unwrap();
        assert_eq!(out.region(), Region::new([0, 5], [4, 2]));
        // Radius 1 around the corner request, cropped at index 0.
        assert_eq!(*inner_seen.lock(), vec![Region::new([0, 4], [5, 4])]);
    }

    #[test]
    fn test_partial_request_cropped_and_outside_fails() {
        let mut graph = ProcessingGraph::<2>::new();
        let source = graph.add_filter(ramp());
        let recorder = Recorder::default();
        let executions = recorder.executions.clone();
        let node = graph.add_filter(recorder);
        graph.connect(source, 0, node, 0).unwrap();

        let engine = ExecutionEngine::new();
        let out = engine.update_region(&graph, node, Region::new([14, 10], [5, 5])).unwrap();
        assert_eq!(out.region(), Region::new([14, 10], [2, 2]));

        let err = engine
            .update_region(&graph, node, Region::new([40, 40], [2, 2]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::OutOfBoundsRequest { .. }));
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cache_reuse_and_invalidation() {
        let mut graph = ProcessingGraph::<2>::new();
        let source = graph.add_filter(ConstantSource::new(Region::from_size([8, 8]), vec![5.0], SampleType::U8));
        let recorder = Recorder::default();
        let executions = recorder.executions.clone();
        let node = graph.add_filter(recorder);
        graph.connect(source, 0, node, 0).unwrap();

        let engine = ExecutionEngine::new();
        let first = engine.update(&graph, node).unwrap();
        let second = engine.update_region(&graph, node, Region::new([2, 2], [3, 3])).unwrap();
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(second.get_component(&[3, 3], 0), first.get_component(&[3, 3], 0));

        graph.set_parameter(source, "value", Value::Float(9.0)).unwrap();
        let third = engine.update(&graph, node).unwrap();
        assert_eq!(executions.load(Ordering::SeqCst), 2);
        assert_eq!(third.get_component(&[0, 0], 0), Some(9.0));
    }

    #[test]
    fn test_missing_input_fails_before_execution() {
        let mut graph = ProcessingGraph::<2>::new();
        let node = graph.add_filter(PassthroughNode);
        let engine = ExecutionEngine::new();
        assert!(matches!(
            engine.update(&graph, node),
            Err(PipelineError::MissingInput { input: 0, .. })
        ));
    }

    #[test]
    fn test_abort_between_nodes() {
        let mut graph = ProcessingGraph::<2>::new();
        let source = graph.add_filter(ramp());
        let engine = ExecutionEngine::new();
        engine.abort_handle().abort();
        assert!(matches!(engine.update(&graph, source), Err(PipelineError::Aborted)));
    }

    #[test]
    fn test_progress_events() {
        let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = events.clone();
        let options = ExecutionOptions::new().with_progress(move |update| {
            let tag = match update {
                ProgressUpdate::Started { .. } => "started",
                ProgressUpdate::NodeCompleted { .. } => "node",
                ProgressUpdate::Completed { .. } => "completed",
                _ => return,
            };
            sink.lock().push(tag);
        });

        let mut graph = ProcessingGraph::<2>::new();
        let source = graph.add_filter(ramp());
        let engine = ExecutionEngine::with_options(options);
        engine.update(&graph, source).unwrap();
        assert_eq!(*events.lock(), vec!["started", "node", "completed"]);
    }

    #[test]
    fn test_output_information_without_data() {
        let mut graph = ProcessingGraph::<2>::new();
        let source = graph.add_filter(ramp());
        let recorder = Recorder::default();
        let executions = recorder.executions.clone();
        let node = graph.add_filter(recorder);
        graph.connect(source, 0, node, 0).unwrap();

        let engine = ExecutionEngine::new();
        let outputs = engine.update_output_information(&graph, node).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].largest_possible_region(), Region::from_size([16, 12]));
        assert!(outputs[0].buffered_region().is_empty());
        assert_eq!(executions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_requests_padded_and_cropped_per_radius() {
        let largest = Region::from_size([16, 12]);
        let interior = Region::new([5, 4], [3, 2]);
        let edge = Region::new([0, 3], [4, 2]);
        let corner = Region::new([13, 9], [3, 3]);
        let cases = [
            (interior, 0, interior),
            (interior, 1, Region::new([4, 3], [5, 4])),
            (interior, 3, Region::new([2, 1], [9, 8])),
            (edge, 0, edge),
            (edge, 1, Region::new([0, 2], [5, 4])),
            (edge, 3, Region::new([0, 0], [7, 8])),
            (corner, 0, corner),
            (corner, 1, Region::new([12, 8], [4, 4])),
            (corner, 3, Region::new([10, 6], [6, 6])),
            (largest, 0, largest),
            (largest, 1, largest),
            (largest, 3, largest),
        ];

        let engine = ExecutionEngine::with_options(ExecutionOptions::new().with_cache(false));
        for (requested, radius, expected) in cases {
            let mut graph = ProcessingGraph::<2>::new();
            let source = graph.add_filter(ramp());
            let upstream = Recorder::default();
            let seen = upstream.requested.clone();
            let downstream = Recorder {
                radius,
                ..Recorder::default()
            };
            let a = graph.add_filter(upstream);
            let b = graph.add_filter(downstream);
            graph.connect(source, 0, a, 0).unwrap();
            graph.connect(a, 0, b, 0).unwrap();

            let out = engine.update_region(&graph, b, requested).unwrap();
            assert_eq!(out.region(), requested);
            assert_eq!(*seen.lock(), vec![expected], "{} with radius {}", requested, radius);
        }
    }

    #[test]
    fn test_diamond_with_cached_branch() {
        let mut graph = ProcessingGraph::<2>::new();
        let source = graph.add_filter(ramp());
        let mean = graph.add_filter(MeanFilter::new(MeanFunctor::new(1)));
        let copy = graph.add_filter(PassthroughNode);
        let blend = graph.add_filter(AlphaBlendFilter::new(AlphaBlendFunctor::new(0.5)));
        graph.connect(source, 0, mean, 0).unwrap();
        graph.connect(source, 0, copy, 0).unwrap();
        graph.connect(mean, 0, blend, 0).unwrap();
        graph.connect(copy, 0, blend, 1).unwrap();

        let uncached = ExecutionEngine::with_options(ExecutionOptions::new().with_cache(false));
        let expected = uncached.update(&graph, blend).unwrap();

        let engine = ExecutionEngine::with_options(ExecutionOptions::new().with_threads(3));
        engine.update(&graph, mean).unwrap();
        let result = engine.update_output(&graph, blend, 0, None).unwrap();
        // The mean and the source it padded over come from the cache.
        assert_eq!(result.stats.cache_hits, 2);
        assert_eq!(result.output.data(), expected.data());
        assert_eq!(result.output.get_component(&[3, 3], 0), Some(303.0));
    }

    #[test]
    fn test_worker_failure_mid_chain() {
        for panic in [false, true] {
            let mut graph = ProcessingGraph::<2>::new();
            let source = graph.add_filter(ramp());
            let failing = graph.add_filter(Failing { panic });
            let downstream = Recorder::default();
            let executions = downstream.executions.clone();
            let last = graph.add_filter(downstream);
            graph.connect(source, 0, failing, 0).unwrap();
            graph.connect(failing, 0, last, 0).unwrap();

            let engine = ExecutionEngine::with_options(ExecutionOptions::new().with_threads(2));
            match engine.update(&graph, last) {
                Err(PipelineError::WorkerFailure { node_id, source, .. }) => {
                    assert_eq!(node_id, failing);
                    let expected = if panic { "slab exploded" } else { "slab failed" };
                    assert!(source.to_string().contains(expected), "{}", source);
                }
                other => panic!("unexpected result: {:?}", other.map(|r| r.region())),
            }
            assert_eq!(executions.load(Ordering::SeqCst), 0);
            assert_eq!(engine.cache_memory_usage(), 0);
        }
    }
}
