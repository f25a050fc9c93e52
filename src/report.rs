//! Per-file results and the final batch report.
//!
//! [`ProcessingResult`] is the unit of accounting: exactly one exists per
//! discovered source image, whatever happened to it. [`BatchReport`] is the
//! immutable aggregate built once at the end of the run — after it is
//! finalized nothing mutates it, so callers can serialise it, print it, or
//! archive it without defensive copies.

use crate::error::FileError;
use serde::{Deserialize, Serialize};

/// Terminal status of one source image for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Never attempted: the batch aborted fatally before this file's turn.
    Pending,
    /// Cleaned text persisted; duplicate key registered.
    Success,
    /// A byte-identical file was already processed; no remote call was made.
    SkippedDuplicate,
    /// Failed at some pipeline stage; see the attached [`FileError`].
    Failed,
}

/// Outcome of the per-file pipeline for one source image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    /// Source image filename (no directory).
    pub filename: String,
    /// Terminal status for this run.
    pub status: FileStatus,
    /// Raw exported text, exactly as the remote service returned it.
    /// `None` unless the pipeline reached the export stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    /// Cleaned text. `None` unless the pipeline reached the cleaning stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleaned_text: Option<String>,
    /// Failure detail when `status == Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FileError>,
    /// Transient-failure retries spent across all remote calls for this file.
    pub retries: u32,
    /// Wall-clock time spent on this file.
    pub duration_ms: u64,
}

impl ProcessingResult {
    /// A result for a file the batch never reached.
    pub(crate) fn pending(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            status: FileStatus::Pending,
            raw_text: None,
            cleaned_text: None,
            error: None,
            retries: 0,
            duration_ms: 0,
        }
    }
}

/// Immutable summary of one batch run.
///
/// Contains exactly one [`ProcessingResult`] per discovered image, in
/// discovery order (sorted by filename at scan time), regardless of the
/// order in which files actually finished.
#[derive(Debug, Serialize)]
pub struct BatchReport {
    /// One entry per discovered source image, in discovery order.
    pub results: Vec<ProcessingResult>,
    /// Files that reached [`FileStatus::Success`].
    pub successful: usize,
    /// Files that reached [`FileStatus::Failed`].
    pub failed: usize,
    /// Files skipped as duplicates.
    pub skipped: usize,
    /// Files never attempted because the batch aborted.
    pub pending: usize,
    /// Human-readable description of the batch-fatal error, if one occurred.
    /// Completed results above are still valid when this is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
    /// Wall-clock time for the whole run.
    pub total_duration_ms: u64,
}

impl BatchReport {
    /// Build the report from collected results. Called once, at the end of
    /// the run, after every file has a terminal status.
    pub(crate) fn finalize(
        results: Vec<ProcessingResult>,
        fatal: Option<String>,
        total_duration_ms: u64,
    ) -> Self {
        let count = |s: FileStatus| results.iter().filter(|r| r.status == s).count();
        Self {
            successful: count(FileStatus::Success),
            failed: count(FileStatus::Failed),
            skipped: count(FileStatus::SkippedDuplicate),
            pending: count(FileStatus::Pending),
            fatal,
            total_duration_ms,
            results,
        }
    }

    /// Whether a batch-fatal condition (auth, quota) aborted the run.
    pub fn is_fatal(&self) -> bool {
        self.fatal.is_some()
    }

    /// Whether any file ended in [`FileStatus::Failed`].
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Failures in discovery order, with their human-readable reasons.
    pub fn failures(&self) -> impl Iterator<Item = (&str, String)> {
        self.results
            .iter()
            .filter(|r| r.status == FileStatus::Failed)
            .map(|r| {
                let reason = r
                    .error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown error".to_string());
                (r.filename.as_str(), reason)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(filename: &str, status: FileStatus) -> ProcessingResult {
        ProcessingResult {
            filename: filename.into(),
            status,
            raw_text: None,
            cleaned_text: None,
            error: None,
            retries: 0,
            duration_ms: 0,
        }
    }

    #[test]
    fn finalize_counts_by_status() {
        let report = BatchReport::finalize(
            vec![
                result("a.png", FileStatus::Success),
                result("b.png", FileStatus::Failed),
                result("c.png", FileStatus::SkippedDuplicate),
                result("d.png", FileStatus::Pending),
            ],
            None,
            1234,
        );
        assert_eq!(report.successful, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.pending, 1);
        assert!(!report.is_fatal());
        assert!(report.has_failures());
    }

    #[test]
    fn fatal_report_keeps_completed_results() {
        let report = BatchReport::finalize(
            vec![
                result("a.png", FileStatus::Success),
                result("b.png", FileStatus::Pending),
            ],
            Some("Authentication failed".into()),
            10,
        );
        assert!(report.is_fatal());
        assert_eq!(report.successful, 1);
        assert_eq!(report.pending, 1);
    }

    #[test]
    fn failures_carry_reasons() {
        let mut failed = result("b.png", FileStatus::Failed);
        failed.error = Some(crate::error::FileError::ConversionFailed {
            filename: "b.png".into(),
            detail: "not an image".into(),
        });
        let report = BatchReport::finalize(vec![failed], None, 0);
        let listed: Vec<_> = report.failures().collect();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, "b.png");
        assert!(listed[0].1.contains("not an image"));
    }

    #[test]
    fn report_serialises_to_json() {
        let report = BatchReport::finalize(vec![result("a.png", FileStatus::Success)], None, 5);
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"successful\":1"));
        assert!(json.contains("a.png"));
    }
}
