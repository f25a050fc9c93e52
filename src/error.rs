//! Error types for the img2txt library.
//!
//! Three distinct error types reflect three distinct failure modes:
//!
//! * [`Img2TxtError`] — **Fatal**: the batch cannot proceed at all (no valid
//!   credential, remote quota exhausted, missing input directory, bad config).
//!   Returned as `Err(Img2TxtError)` before the batch starts, or recorded as
//!   the report's fatal abort when it strikes mid-run.
//!
//! * [`FileError`] — **Non-fatal**: a single image failed (corrupt input,
//!   transient API errors that outlived the retry budget, local I/O) but all
//!   other images are fine. Stored inside [`crate::report::ProcessingResult`]
//!   so callers can inspect partial success rather than losing the whole
//!   batch to one bad file.
//!
//! * [`RemoteError`] — the wire-level taxonomy produced by
//!   [`crate::remote::RemoteConverter`] implementations. The orchestrator
//!   classifies each variant as retryable, file-fatal, or batch-fatal.
//!
//! The separation lets callers decide their own tolerance: abort on the first
//! file failure, log and continue, or collect all errors for a post-run report.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the img2txt library.
///
/// Per-file failures use [`FileError`] and are stored in
/// [`crate::report::ProcessingResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum Img2TxtError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The configured images directory does not exist.
    #[error("Input directory not found: '{path}'\nCreate it and drop image files inside.")]
    InputDirMissing { path: PathBuf },

    /// Listing the input directory failed.
    #[error("Failed to read input directory '{path}': {source}")]
    InputDirUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Batch-fatal remote errors ─────────────────────────────────────────
    /// The remote service rejected our credential (401/403).
    ///
    /// No per-file retry can fix this, so the whole run aborts. Results for
    /// files that already completed are preserved in the report.
    #[error("Authentication failed: {detail}\nRefresh the stored token and try again.")]
    Auth { detail: String },

    /// The remote service rate-limited us (HTTP 429).
    ///
    /// Check `retry_after_secs` for a server-specified delay, or re-run the
    /// batch later; files that already succeeded are not re-uploaded when a
    /// persisted duplicate registry is configured.
    #[error("Remote quota exceeded — remaining files aborted")]
    QuotaExceeded { retry_after_secs: Option<u64> },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create an output directory or write a combined output file.
    #[error("Failed to write output '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The persisted duplicate registry could not be loaded or parsed.
    #[error("Failed to load duplicate registry '{path}': {detail}")]
    RegistryLoadFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single source image.
///
/// Stored alongside [`crate::report::ProcessingResult`] when a file fails.
/// The overall batch continues unless a batch-fatal condition occurs.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum FileError {
    /// The local image file could not be read.
    #[error("'{filename}': failed to read local file: {detail}")]
    ReadFailed { filename: String, detail: String },

    /// Upload failed after the retry budget was exhausted.
    #[error("'{filename}': upload failed after {retries} retries: {detail}")]
    UploadFailed {
        filename: String,
        retries: u32,
        detail: String,
    },

    /// Conversion failed after the retry budget was exhausted.
    #[error("'{filename}': conversion failed after {retries} retries: {detail}")]
    ConvertFailed {
        filename: String,
        retries: u32,
        detail: String,
    },

    /// The remote service could not recognise the image format.
    ///
    /// Never retried: re-sending the same corrupt bytes cannot succeed.
    #[error("'{filename}': remote conversion rejected the image: {detail}")]
    ConversionFailed { filename: String, detail: String },

    /// Text export failed after the retry budget was exhausted.
    #[error("'{filename}': text export failed after {retries} retries: {detail}")]
    ExportFailed {
        filename: String,
        retries: u32,
        detail: String,
    },

    /// The per-file text output could not be written.
    #[error("'{filename}': failed to write output: {detail}")]
    WriteFailed { filename: String, detail: String },

    /// The run was cancelled before this file finished its remote steps.
    #[error("'{filename}': interrupted before completion")]
    Interrupted { filename: String },
}

/// Wire-level failures produced by a [`crate::remote::RemoteConverter`].
///
/// Classification (applied by the orchestrator):
///
/// | Variant      | Policy                                   |
/// |--------------|------------------------------------------|
/// | `Transient`  | retried with exponential backoff          |
/// | `Timeout`    | treated exactly like `Transient`          |
/// | `Conversion` | file-level failure, no retry              |
/// | `Auth`       | batch-fatal, no retry                     |
/// | `Quota`      | batch-fatal, no retry                     |
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// The credential was rejected (401/403).
    #[error("authentication rejected: {detail}")]
    Auth { detail: String },

    /// Rate limited (HTTP 429).
    #[error("rate limited by remote service")]
    Quota { retry_after_secs: Option<u64> },

    /// Network failure or 5xx — worth retrying.
    #[error("transient remote failure: {detail}")]
    Transient { detail: String },

    /// The service could not convert the payload (unsupported/corrupt image).
    #[error("conversion rejected: {detail}")]
    Conversion { detail: String },

    /// The call exceeded the caller-supplied timeout.
    #[error("remote call timed out after {secs}s")]
    Timeout { secs: u64 },
}

impl RemoteError {
    /// Whether the per-file retry loop should try this call again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::Transient { .. } | RemoteError::Timeout { .. }
        )
    }

    /// Whether this error must abort the entire batch, not just one file.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, RemoteError::Auth { .. } | RemoteError::Quota { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_display() {
        let e = Img2TxtError::QuotaExceeded {
            retry_after_secs: Some(30),
        };
        assert!(e.to_string().contains("quota"));
    }

    #[test]
    fn auth_display() {
        let e = Img2TxtError::Auth {
            detail: "invalid_grant".into(),
        };
        assert!(e.to_string().contains("invalid_grant"));
    }

    #[test]
    fn upload_failed_display() {
        let e = FileError::UploadFailed {
            filename: "scan_001.png".into(),
            retries: 3,
            detail: "HTTP 503".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("scan_001.png"), "got: {msg}");
        assert!(msg.contains("3 retries"), "got: {msg}");
    }

    #[test]
    fn convert_failed_display() {
        let e = FileError::ConvertFailed {
            filename: "scan_001.png".into(),
            retries: 2,
            detail: "HTTP 502".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("conversion failed after 2 retries"), "got: {msg}");
    }

    #[test]
    fn retry_classification() {
        assert!(RemoteError::Transient { detail: "503".into() }.is_retryable());
        assert!(RemoteError::Timeout { secs: 60 }.is_retryable());
        assert!(!RemoteError::Conversion { detail: "bad png".into() }.is_retryable());
        assert!(!RemoteError::Auth { detail: "401".into() }.is_retryable());
    }

    #[test]
    fn fatal_classification() {
        assert!(RemoteError::Auth { detail: "401".into() }.is_batch_fatal());
        assert!(RemoteError::Quota { retry_after_secs: None }.is_batch_fatal());
        assert!(!RemoteError::Transient { detail: "oops".into() }.is_batch_fatal());
        assert!(!RemoteError::Conversion { detail: "bad".into() }.is_batch_fatal());
    }
}
