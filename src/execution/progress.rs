//! Progress tracking and abort for updates.

use crate::core::error::NodeId;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A progress update event.
#[derive(Debug, Clone)]
pub enum ProgressUpdate {
    /// An update has started.
    Started {
        total_nodes: usize,
    },
    /// A node has started executing.
    NodeStarted {
        node_id: NodeId,
        node_name: String,
        index: usize,
        total: usize,
    },
    /// Pixel-weighted progress within the executing node.
    NodeProgress {
        node_id: NodeId,
        fraction: f32,
    },
    /// A node has completed.
    NodeCompleted {
        node_id: NodeId,
        duration_ms: u64,
        index: usize,
        total: usize,
    },
    /// A node was not executed.
    NodeSkipped {
        node_id: NodeId,
        reason: SkipReason,
    },
    /// A streamed division is about to be computed.
    StreamDivision {
        index: usize,
        total: usize,
        region: String,
    },
    /// The update has completed.
    Completed {
        total_duration_ms: u64,
        nodes_processed: usize,
        nodes_skipped: usize,
    },
    /// The update was aborted.
    Aborted,
    /// An error occurred.
    Error {
        node_id: Option<NodeId>,
        message: String,
    },
}

/// Reason why a node was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A buffered output already covered the request.
    Cached,
    /// Nothing downstream needed data from this node.
    NotRequested,
}

/// Callback type for progress updates.
pub type ProgressCallback = Box<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Cooperative abort flag, checked at slab and division boundaries.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that running and future updates stop.
    pub fn abort(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Clear a previous abort request.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Tracks update progress and forwards events to a callback.
pub struct ProgressTracker {
    /// Total number of nodes to process.
    total_nodes: usize,
    /// Number of nodes completed.
    completed_nodes: AtomicU64,
    /// Number of nodes skipped.
    skipped_nodes: AtomicU64,
    /// Pixels to produce in the node currently executing.
    node_pixels_total: AtomicU64,
    /// Pixels produced so far in the node currently executing.
    node_pixels_done: AtomicU64,
    /// Start time.
    start_time: Option<Instant>,
    /// Progress callback.
    callback: Option<Arc<ProgressCallback>>,
}

impl ProgressTracker {
    /// Create a new progress tracker.
    pub fn new(total_nodes: usize) -> Self {
        Self {
            total_nodes,
            completed_nodes: AtomicU64::new(0),
            skipped_nodes: AtomicU64::new(0),
            node_pixels_total: AtomicU64::new(0),
            node_pixels_done: AtomicU64::new(0),
            start_time: None,
            callback: None,
        }
    }

    /// Set a callback for progress updates.
    pub fn with_callback(mut self, callback: Arc<ProgressCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Start tracking.
    pub fn start(&mut self) {
        self.start_time = Some(Instant::now());
        self.send_update(ProgressUpdate::Started {
            total_nodes: self.total_nodes,
        });
    }

    /// Report that a node has started producing `pixels` output pixels.
    pub fn node_started(&self, node_id: NodeId, node_name: String, pixels: u64) {
        self.node_pixels_total.store(pixels, Ordering::Relaxed);
        self.node_pixels_done.store(0, Ordering::Relaxed);
        let completed = self.completed_nodes.load(Ordering::Relaxed) as usize;
        self.send_update(ProgressUpdate::NodeStarted {
            node_id,
            node_name,
            index: completed,
            total: self.total_nodes,
        });
    }

    /// Called from workers as slabs complete.
    pub fn pixels_completed(&self, node_id: NodeId, pixels: u64) {
        let done = self.node_pixels_done.fetch_add(pixels, Ordering::Relaxed) + pixels;
        let total = self.node_pixels_total.load(Ordering::Relaxed).max(1);
        self.send_update(ProgressUpdate::NodeProgress {
            node_id,
            fraction: (done as f64 / total as f64).min(1.0) as f32,
        });
    }

    /// Report that a node has completed.
    pub fn node_completed(&self, node_id: NodeId, duration_ms: u64) {
        let completed = self.completed_nodes.fetch_add(1, Ordering::Relaxed) as usize + 1;
        self.send_update(ProgressUpdate::NodeCompleted {
            node_id,
            duration_ms,
            index: completed,
            total: self.total_nodes,
        });
    }

    /// Report that a node was skipped.
    pub fn node_skipped(&self, node_id: NodeId, reason: SkipReason) {
        self.skipped_nodes.fetch_add(1, Ordering::Relaxed);
        self.send_update(ProgressUpdate::NodeSkipped { node_id, reason });
    }

    /// Report that the update was aborted.
    pub fn aborted(&self) {
        self.send_update(ProgressUpdate::Aborted);
    }

    /// Report an error.
    pub fn report_error(&self, node_id: Option<NodeId>, message: String) {
        self.send_update(ProgressUpdate::Error { node_id, message });
    }

    /// Complete tracking.
    pub fn complete(&self) {
        let duration = self
            .start_time
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);

        self.send_update(ProgressUpdate::Completed {
            total_duration_ms: duration,
            nodes_processed: self.completed_nodes.load(Ordering::Relaxed) as usize,
            nodes_skipped: self.skipped_nodes.load(Ordering::Relaxed) as usize,
        });
    }

    /// Get current progress percentage.
    pub fn progress_percent(&self) -> f32 {
        if self.total_nodes == 0 {
            return 100.0;
        }
        let completed = self.completed_nodes.load(Ordering::Relaxed);
        let skipped = self.skipped_nodes.load(Ordering::Relaxed);
        ((completed + skipped) as f32 / self.total_nodes as f32) * 100.0
    }

    fn send_update(&self, update: ProgressUpdate) {
        if let Some(ref callback) = self.callback {
            callback(update);
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Emit a single event through an optional callback.
pub(crate) fn notify(callback: &Option<Arc<ProgressCallback>>, update: ProgressUpdate) {
    if let Some(callback) = callback {
        callback(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_progress_calculation() {
        let tracker = ProgressTracker::new(10);
        assert_eq!(tracker.progress_percent(), 0.0);

        tracker.completed_nodes.store(5, Ordering::Relaxed);
        assert_eq!(tracker.progress_percent(), 50.0);

        tracker.skipped_nodes.store(5, Ordering::Relaxed);
        assert_eq!(tracker.progress_percent(), 100.0);
    }

    #[test]
    fn test_abort_handle_is_shared() {
        let handle = AbortHandle::new();
        let clone = handle.clone();
        assert!(!handle.is_aborted());

        clone.abort();
        assert!(handle.is_aborted());

        handle.reset();
        assert!(!clone.is_aborted());
    }

    #[test]
    fn test_pixel_weighted_progress() {
        let fractions = Arc::new(Mutex::new(Vec::new()));
        let sink = fractions.clone();
        let callback: Arc<ProgressCallback> = Arc::new(Box::new(move |update| {
            if let ProgressUpdate::NodeProgress { fraction, .. } = update {
                sink.lock().push(fraction);
            }
        }));

        let mut tracker = ProgressTracker::new(1).with_callback(callback);
        tracker.start();
        let node_id = NodeId::new();
        tracker.node_started(node_id, "Mean".to_string(), 100);
        tracker.pixels_completed(node_id, 30);
        tracker.pixels_completed(node_id, 70);
        tracker.node_completed(node_id, 1);

        assert_eq!(*fractions.lock(), vec![0.3, 1.0]);
    }
}
