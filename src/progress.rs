//! Progress-callback trait for per-file batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive
//! real-time events as the orchestrator drives each file.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a channel, a database record, or a terminal progress bar
//! without the library knowing how the host application communicates. The
//! trait is `Send + Sync` so it works when files are processed concurrently.

use crate::report::FileStatus;
use std::sync::Arc;

/// Called by the orchestrator as it drives each file's pipeline.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. With `concurrency > 1`, the per-file methods may be
/// called from different tasks at once; implementations must protect shared
/// mutable state themselves.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after discovery, before any file is processed.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called just before a file enters its pipeline.
    fn on_file_start(&self, filename: &str, index: usize, total_files: usize) {
        let _ = (filename, index, total_files);
    }

    /// Called when a file reaches a terminal status.
    ///
    /// `detail` is the failure reason for [`FileStatus::Failed`], empty
    /// otherwise.
    fn on_file_done(&self, filename: &str, status: FileStatus, detail: &str) {
        let _ = (filename, status, detail);
    }

    /// Called once after every file has a terminal status.
    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let _ = (total_files, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCallback {
        done: AtomicUsize,
        failed: AtomicUsize,
    }

    impl BatchProgressCallback for CountingCallback {
        fn on_file_done(&self, _filename: &str, status: FileStatus, _detail: &str) {
            self.done.fetch_add(1, Ordering::SeqCst);
            if status == FileStatus::Failed {
                self.failed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(3);
        cb.on_file_start("a.png", 1, 3);
        cb.on_file_done("a.png", FileStatus::Success, "");
        cb.on_batch_complete(3, 1);
    }

    #[test]
    fn counting_callback_receives_events() {
        let cb = CountingCallback {
            done: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        };
        cb.on_file_done("a.png", FileStatus::Success, "");
        cb.on_file_done("b.png", FileStatus::Failed, "boom");
        assert_eq!(cb.done.load(Ordering::SeqCst), 2);
        assert_eq!(cb.failed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn BatchProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_batch_start(10);
        cb.on_file_done("a.png", FileStatus::SkippedDuplicate, "");
    }
}
