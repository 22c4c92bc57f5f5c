//! Threaded dispatch of one node over its requested region.
//!
//! The output region is split along its slowest-varying axis into near-equal
//! slabs, so every slab is a contiguous run of each output buffer and can be
//! handed to a worker as its own `&mut` slice. Workers run on a rayon pool
//! and only ever write their own slab.

use crate::core::context::{ExecutionContext, ThreadContext};
use crate::core::error::{NodeId, PipelineError, PipelineResult};
use crate::core::node::FilterNode;
use crate::core::raster::{Raster, RasterSlabMut};
use crate::core::region::Region;
use crate::execution::progress::{AbortHandle, ProgressTracker};
use log::{trace, warn};
use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Splits regions into per-worker slabs and runs a node's threaded callback.
pub struct ThreadedDispatcher {
    number_of_threads: usize,
    pool: Mutex<Option<Arc<ThreadPool>>>,
}

impl ThreadedDispatcher {
    /// Create a dispatcher running `number_of_threads` slabs per node.
    ///
    /// Zero means one slab per available hardware thread.
    pub fn new(number_of_threads: usize) -> Self {
        let number_of_threads = if number_of_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            number_of_threads
        };
        Self {
            number_of_threads,
            pool: Mutex::new(None),
        }
    }

    /// Configured number of workers.
    pub fn number_of_threads(&self) -> usize {
        self.number_of_threads
    }

    /// Partition `region` into at most `number_of_threads` disjoint slabs.
    ///
    /// Fewer slabs are returned when the region is too thin along its
    /// slowest splittable axis.
    pub fn split<const D: usize>(&self, region: &Region<D>) -> Vec<Region<D>> {
        let slabs = region.split_slowest(self.number_of_threads);
        if slabs.len() < self.number_of_threads && slabs.len() > 1 {
            warn!(
                "Region {} only splits into {} slabs, {} threads requested",
                region,
                slabs.len(),
                self.number_of_threads
            );
        }
        slabs
    }

    fn pool(&self) -> PipelineResult<Arc<ThreadPool>> {
        let mut slot = self.pool.lock();
        if let Some(pool) = slot.as_ref() {
            return Ok(pool.clone());
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.number_of_threads)
            .thread_name(|i| format!("rasterflow-worker-{}", i))
            .build()
            .map_err(|e| PipelineError::Other(format!("failed to build thread pool: {}", e)))?;
        let pool = Arc::new(pool);
        *slot = Some(pool.clone());
        Ok(pool)
    }

    /// Run `filter.threaded_generate_data` once per slab of `splits`.
    ///
    /// Every output raster must cover the region `splits` partitions. On the
    /// first failure no further slab starts; running slabs are joined and
    /// that failure is returned.
    #[allow(clippy::too_many_arguments)]
    pub fn dispatch<const D: usize>(
        &self,
        node_id: NodeId,
        filter: &dyn FilterNode<D>,
        ctx: &ExecutionContext<'_, D>,
        outputs: &mut [Raster<D>],
        splits: &[Region<D>],
        abort: &AbortHandle,
        progress: Option<&ProgressTracker>,
    ) -> PipelineResult<()> {
        let total = splits.len();
        let mut per_slab: Vec<Vec<RasterSlabMut<'_, D>>> =
            (0..total).map(|_| Vec::with_capacity(outputs.len())).collect();
        for output in outputs.iter_mut() {
            for (k, slab) in output.slabs_mut(splits)?.into_iter().enumerate() {
                per_slab[k].push(slab);
            }
        }

        if total <= 1 {
            for (thread_id, mut slabs) in per_slab.into_iter().enumerate() {
                let thread = ThreadContext::new(node_id, thread_id, total, abort, progress);
                run_slab(filter, ctx, &thread, &mut slabs)?;
            }
            return Ok(());
        }

        let failed = AtomicBool::new(false);
        let first_error: Mutex<Option<PipelineError>> = Mutex::new(None);
        let pool = self.pool()?;

        pool.scope(|scope| {
            for (thread_id, mut slabs) in per_slab.into_iter().enumerate() {
                let failed = &failed;
                let first_error = &first_error;
                scope.spawn(move |_| {
                    if failed.load(Ordering::Acquire) {
                        trace!("Node {} slab {} skipped after failure", node_id, thread_id);
                        return;
                    }
                    let thread = ThreadContext::new(node_id, thread_id, total, abort, progress);
                    if let Err(error) = run_slab(filter, ctx, &thread, &mut slabs) {
                        failed.store(true, Ordering::Release);
                        let mut slot = first_error.lock();
                        if slot.is_none() {
                            *slot = Some(error);
                        }
                    }
                });
            }
        });

        match first_error.into_inner() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Run one slab, turning errors and panics into the dispatcher's failure.
fn run_slab<const D: usize>(
    filter: &dyn FilterNode<D>,
    ctx: &ExecutionContext<'_, D>,
    thread: &ThreadContext<'_>,
    slabs: &mut [RasterSlabMut<'_, D>],
) -> PipelineResult<()> {
    thread.check_abort()?;
    trace!(
        "Node {} slab {}/{} over {:?}",
        thread.node_id,
        thread.thread_id,
        thread.number_of_threads,
        slabs.first().map(|s| s.region().to_string())
    );

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        filter.threaded_generate_data(ctx, thread, slabs)
    }))
    .unwrap_or_else(|payload| Err(PipelineError::Other(panic_message(payload))));

    match outcome {
        Ok(()) => Ok(()),
        Err(PipelineError::Aborted) => Err(PipelineError::Aborted),
        Err(error) => Err(PipelineError::WorkerFailure {
            node_id: thread.node_id,
            thread_id: thread.thread_id,
            source: Box::new(error),
        }),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker panicked: {}", s)
    } else {
        "worker panicked".to_string()
    }
}
