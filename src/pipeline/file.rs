//! The per-file pipeline state machine.
//!
//! Each source image moves through:
//!
//! ```text
//! Discovered → DuplicateChecked → Uploaded → Converted → Exported
//!            → Cleaned → Persisted (success)
//! ```
//!
//! with an escape to `Failed` from any state. The duplicate check is the one
//! branch that avoids remote cost entirely; everything after it creates
//! billable remote artifacts, which is why this module tracks every artifact
//! it creates and deletes them on every exit path — success, failure, or
//! cancellation.
//!
//! ## Retry Strategy
//!
//! HTTP 5xx and timeouts are transient and frequent under concurrent load.
//! Exponential backoff (`retry_backoff_ms * 2^(attempt-1)`) avoids
//! thundering-herd: with 500 ms base and 3 retries the wait sequence is
//! 500 ms → 1 s → 2 s, under 4 s of back-off per call. Credential and quota
//! rejections are never retried — they abort the whole batch, because no
//! per-file retry can fix them.

use crate::config::BatchConfig;
use crate::error::{FileError, Img2TxtError, RemoteError};
use crate::pipeline::cleaner;
use crate::pipeline::discover::SourceImage;
use crate::registry::{ClaimOutcome, DuplicateKey, DuplicateRegistry};
use crate::remote::{RemoteArtifact, RemoteConverter};
use crate::report::{FileStatus, ProcessingResult};
use std::future::Future;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// What one file's pipeline run produced.
///
/// `fatal` is set when this file hit a batch-fatal condition (auth, quota);
/// the driver stops scheduling further files but keeps this result.
pub(crate) struct FileOutcome {
    pub result: ProcessingResult,
    pub fatal: Option<Img2TxtError>,
}

impl FileOutcome {
    fn done(result: ProcessingResult) -> Self {
        Self {
            result,
            fatal: None,
        }
    }
}

/// Drive one source image through the full state machine.
///
/// Always returns a `FileOutcome` — never propagates an error upward, so a
/// single bad image cannot abort the batch by accident. Every remote
/// artifact created along the way is deleted before this function returns
/// (unless `retain_remote` is set), whatever the terminal status.
pub(crate) async fn process_file(
    client: &Arc<dyn RemoteConverter>,
    registry: &DuplicateRegistry,
    image: &SourceImage,
    config: &BatchConfig,
) -> FileOutcome {
    let start = Instant::now();
    let filename = image.filename.clone();
    let mut retries_used = 0u32;

    let finish = |status: FileStatus,
                  raw: Option<String>,
                  cleaned: Option<String>,
                  error: Option<FileError>,
                  retries: u32| ProcessingResult {
        filename: filename.clone(),
        status,
        raw_text: raw,
        cleaned_text: cleaned,
        error,
        retries,
        duration_ms: start.elapsed().as_millis() as u64,
    };

    // ── Discovered → read local bytes ────────────────────────────────────
    let bytes = match tokio::fs::read(&image.path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let error = FileError::ReadFailed {
                filename: filename.clone(),
                detail: e.to_string(),
            };
            warn!("{error}");
            return FileOutcome::done(finish(FileStatus::Failed, None, None, Some(error), 0));
        }
    };

    // ── DuplicateChecked ─────────────────────────────────────────────────
    let key = DuplicateKey::for_image(config.fingerprint, &filename, &bytes);
    if registry.claim(&key) == ClaimOutcome::Duplicate {
        info!("'{}' already processed — skipping", filename);
        return FileOutcome::done(finish(FileStatus::SkippedDuplicate, None, None, None, 0));
    }

    if cancelled(config) {
        let error = FileError::Interrupted {
            filename: filename.clone(),
        };
        return FileOutcome::done(finish(FileStatus::Failed, None, None, Some(error), 0));
    }

    // ── Uploaded → Converted → Exported ──────────────────────────────────
    let mut artifacts: Vec<RemoteArtifact> = Vec::with_capacity(2);
    let remote = run_remote_steps(client, &filename, &bytes, config, &mut artifacts, &mut retries_used).await;

    // Guaranteed cleanup: delete every artifact created above, on every exit
    // path. Failures are logged and swallowed — a leaked artifact degrades
    // the remote account, it does not fail the file.
    if config.retain_remote {
        debug!("Retaining {} remote artifact(s) for '{}'", artifacts.len(), filename);
    } else {
        delete_artifacts(client, &artifacts).await;
    }

    let raw_text = match remote {
        Ok(text) => text,
        Err(StepFail::File(error)) => {
            warn!("{error}");
            return FileOutcome::done(finish(
                FileStatus::Failed,
                None,
                None,
                Some(error),
                retries_used,
            ));
        }
        Err(StepFail::Fatal(fatal)) => {
            // The batch-level error owns the explanation; this file never
            // reached a terminal outcome of its own and may be retried in a
            // later run (its key was not committed).
            return FileOutcome {
                result: finish(FileStatus::Pending, None, None, None, retries_used),
                fatal: Some(fatal),
            };
        }
    };

    // ── Cleaned ──────────────────────────────────────────────────────────
    let cleaned_text = cleaner::clean_text(&raw_text);

    // ── Persisted ────────────────────────────────────────────────────────
    let raw_path = config.raw_texts_dir.join(format!("{}.txt", image.stem));
    let clean_path = config.texts_dir.join(format!("{}.txt", image.stem));
    for (path, text) in [(&raw_path, &raw_text), (&clean_path, &cleaned_text)] {
        if let Err(e) = write_text_atomic(path, text).await {
            let error = FileError::WriteFailed {
                filename: filename.clone(),
                detail: format!("{}: {e}", path.display()),
            };
            warn!("{error}");
            return FileOutcome::done(finish(
                FileStatus::Failed,
                Some(raw_text.clone()),
                Some(cleaned_text.clone()),
                Some(error),
                retries_used,
            ));
        }
    }

    // Register the key only now: a file that failed anywhere above stays
    // eligible for retry in a later run.
    registry.commit(&key);
    info!("'{}' processed successfully", filename);

    FileOutcome::done(finish(
        FileStatus::Success,
        Some(raw_text),
        Some(cleaned_text),
        None,
        retries_used,
    ))
}

// ── Remote steps ─────────────────────────────────────────────────────────

/// Why a remote step ended the file's pipeline.
enum StepFail {
    /// Isolated to this file; the batch continues.
    File(FileError),
    /// Batch-fatal (auth/quota); the driver stops scheduling new files.
    Fatal(Img2TxtError),
}

/// Upload, convert, and export — the three calls that create remote state.
///
/// Created artifacts are pushed into `artifacts` immediately, so the caller
/// can delete them however this function exits.
async fn run_remote_steps(
    client: &Arc<dyn RemoteConverter>,
    filename: &str,
    bytes: &[u8],
    config: &BatchConfig,
    artifacts: &mut Vec<RemoteArtifact>,
    retries_used: &mut u32,
) -> Result<String, StepFail> {
    let raw = with_retry(config, filename, "upload", retries_used, || {
        client.upload(bytes, filename)
    })
    .await
    .map_err(|fail| fail.into_step_fail(filename, "upload"))?;
    debug!("'{}' uploaded as {}", filename, raw.id);
    artifacts.push(raw.clone());

    let document = with_retry(config, filename, "convert", retries_used, || {
        client.convert(&raw)
    })
    .await
    .map_err(|fail| fail.into_step_fail(filename, "convert"))?;
    debug!("'{}' converted to document {}", filename, document.id);
    artifacts.push(document.clone());

    let text = with_retry(config, filename, "export", retries_used, || {
        client.export_text(&document)
    })
    .await
    .map_err(|fail| fail.into_step_fail(filename, "export"))?;
    // Empty text is a valid result — a blank scan simply has nothing to say.
    debug!("'{}' exported {} bytes of text", filename, text.len());

    Ok(text)
}

/// How a retried call ultimately failed.
enum RetryFail {
    /// Transient failures outlived the retry budget.
    Exhausted { retries: u32, last: RemoteError },
    /// The payload itself was rejected; retrying cannot help.
    Rejected(RemoteError),
    /// Batch-fatal condition.
    Fatal(RemoteError),
    /// The run's cancel flag flipped while waiting.
    Cancelled,
}

impl RetryFail {
    /// Map onto the pipeline's failure taxonomy for the step that failed.
    fn into_step_fail(self, filename: &str, op: &str) -> StepFail {
        let filename = filename.to_string();
        match self {
            RetryFail::Exhausted { retries, last } => {
                let detail = last.to_string();
                StepFail::File(match op {
                    "upload" => FileError::UploadFailed {
                        filename,
                        retries,
                        detail,
                    },
                    "convert" => FileError::ConvertFailed {
                        filename,
                        retries,
                        detail,
                    },
                    _ => FileError::ExportFailed {
                        filename,
                        retries,
                        detail,
                    },
                })
            }
            RetryFail::Rejected(e) => StepFail::File(FileError::ConversionFailed {
                filename,
                detail: e.to_string(),
            }),
            RetryFail::Cancelled => StepFail::File(FileError::Interrupted { filename }),
            RetryFail::Fatal(e) => StepFail::Fatal(match e {
                RemoteError::Auth { detail } => Img2TxtError::Auth { detail },
                RemoteError::Quota { retry_after_secs } => {
                    Img2TxtError::QuotaExceeded { retry_after_secs }
                }
                other => Img2TxtError::Internal(other.to_string()),
            }),
        }
    }
}

/// Run a remote call under the per-call timeout and the bounded retry policy.
async fn with_retry<T, F, Fut>(
    config: &BatchConfig,
    filename: &str,
    op: &str,
    retries_used: &mut u32,
    mut call: F,
) -> Result<T, RetryFail>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let budget = Duration::from_secs(config.api_timeout_secs);
    let mut last_err: Option<RemoteError> = None;

    for attempt in 0..=config.max_retries {
        if cancelled(config) {
            return Err(RetryFail::Cancelled);
        }
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "'{}' {}: retry {}/{} after {}ms",
                filename, op, attempt, config.max_retries, backoff
            );
            *retries_used += 1;
            sleep(Duration::from_millis(backoff)).await;
        }

        // A timed-out call is indistinguishable from a transient failure for
        // retry purposes.
        let result = match timeout(budget, call()).await {
            Ok(r) => r,
            Err(_) => Err(RemoteError::Timeout {
                secs: config.api_timeout_secs,
            }),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_batch_fatal() => return Err(RetryFail::Fatal(e)),
            Err(e @ RemoteError::Conversion { .. }) => return Err(RetryFail::Rejected(e)),
            Err(e) => {
                warn!("'{}' {}: attempt {} failed — {}", filename, op, attempt + 1, e);
                last_err = Some(e);
            }
        }
    }

    Err(RetryFail::Exhausted {
        retries: config.max_retries,
        last: last_err.unwrap_or(RemoteError::Transient {
            detail: "unknown error".into(),
        }),
    })
}

/// Best-effort delete of every artifact this file created.
async fn delete_artifacts(client: &Arc<dyn RemoteConverter>, artifacts: &[RemoteArtifact]) {
    for artifact in artifacts {
        if let Err(e) = client.delete(artifact).await {
            warn!(
                "Failed to delete remote artifact {} for '{}': {} (leaked)",
                artifact.id, artifact.source, e
            );
        }
    }
}

fn cancelled(config: &BatchConfig) -> bool {
    config
        .cancel
        .as_ref()
        .map(|flag| flag.load(Ordering::SeqCst))
        .unwrap_or(false)
}

/// Write `text` to `path` via temp file + rename to prevent partial files.
async fn write_text_atomic(path: &Path, text: &str) -> std::io::Result<()> {
    let tmp_path = path.with_extension("txt.tmp");
    tokio::fs::write(&tmp_path, text).await?;
    tokio::fs::rename(&tmp_path, path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> BatchConfig {
        BatchConfig::builder()
            .retry_backoff_ms(1)
            .max_retries(2)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn retry_returns_first_success() {
        let config = fast_config();
        let mut retries = 0;
        let mut calls = 0u32;
        let result = with_retry(&config, "a.png", "upload", &mut retries, || {
            calls += 1;
            let attempt = calls;
            async move {
                if attempt < 3 {
                    Err(RemoteError::Transient {
                        detail: "503".into(),
                    })
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert!(matches!(result, Ok(3)));
        assert_eq!(retries, 2);
    }

    #[tokio::test]
    async fn retry_budget_is_bounded() {
        let config = fast_config();
        let mut retries = 0;
        let mut calls = 0u32;
        let result: Result<(), _> = with_retry(&config, "a.png", "upload", &mut retries, || {
            calls += 1;
            async {
                Err(RemoteError::Transient {
                    detail: "always down".into(),
                })
            }
        })
        .await;
        assert!(matches!(result, Err(RetryFail::Exhausted { retries: 2, .. })));
        assert_eq!(calls, 3, "initial attempt plus two retries");
    }

    #[tokio::test]
    async fn auth_error_is_not_retried() {
        let config = fast_config();
        let mut retries = 0;
        let mut calls = 0u32;
        let result: Result<(), _> = with_retry(&config, "a.png", "upload", &mut retries, || {
            calls += 1;
            async {
                Err(RemoteError::Auth {
                    detail: "401".into(),
                })
            }
        })
        .await;
        assert!(matches!(result, Err(RetryFail::Fatal(_))));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn conversion_error_is_not_retried() {
        let config = fast_config();
        let mut retries = 0;
        let mut calls = 0u32;
        let result: Result<(), _> = with_retry(&config, "a.png", "convert", &mut retries, || {
            calls += 1;
            async {
                Err(RemoteError::Conversion {
                    detail: "not an image".into(),
                })
            }
        })
        .await;
        assert!(matches!(result, Err(RetryFail::Rejected(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn exhaustion_names_the_failing_stage() {
        let exhausted = |op: &str| {
            let fail = RetryFail::Exhausted {
                retries: 2,
                last: RemoteError::Transient {
                    detail: "503".into(),
                },
            };
            match fail.into_step_fail("a.png", op) {
                StepFail::File(e) => e.to_string(),
                StepFail::Fatal(_) => panic!("exhaustion is a file-level failure"),
            }
        };
        assert!(exhausted("upload").contains("upload failed after 2 retries"));
        assert!(exhausted("convert").contains("conversion failed after 2 retries"));
        assert!(exhausted("export").contains("export failed after 2 retries"));
    }

    #[tokio::test]
    async fn atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_text_atomic(&path, "hello").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
        assert!(!path.with_extension("txt.tmp").exists());
    }
}
