//! Batch orchestration: drive every discovered file to a terminal status.
//!
//! ## Control flow
//!
//! ```text
//! discover ──▶ authorise ──▶ per-file pipelines ──▶ join ──▶ report ──▶ combine
//!              (once)        (sequential or fanned out)   (discovery order)
//! ```
//!
//! Files are isolated from each other: one file's failure never halts the
//! rest. The two exceptions are credential rejection and quota exhaustion,
//! which no per-file retry can fix — the first occurrence stops scheduling
//! new files, already-completed results are preserved, and files never
//! attempted are reported as pending.
//!
//! Combination runs strictly after the join barrier, over the success
//! results in discovery order, so combined output is deterministic however
//! the per-file pipelines interleave.

use crate::config::BatchConfig;
use crate::error::Img2TxtError;
use crate::pipeline::{combine, discover, file};
use crate::registry::DuplicateRegistry;
use crate::remote::auth;
use crate::remote::drive::DriveClient;
use crate::remote::RemoteConverter;
use crate::report::{BatchReport, FileStatus, ProcessingResult};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Run a full batch: discover, process, report, combine.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(BatchReport)` whenever the batch ran, even if some files failed or a
/// mid-run fatal condition aborted the remainder (check
/// [`BatchReport::is_fatal`] / [`BatchReport::has_failures`]).
///
/// # Errors
/// Returns `Err(Img2TxtError)` only when the batch could not start or its
/// outputs could not be written: missing input directory, unusable stored
/// token, unreadable persisted registry, or a failed combined-output write.
pub async fn run_batch(config: &BatchConfig) -> Result<BatchReport, Img2TxtError> {
    let total_start = Instant::now();

    // ── Step 1: Discover the input set ───────────────────────────────────
    let images = discover::discover_images(config)?;
    if images.is_empty() {
        warn!(
            "No supported image files found in {} (extensions: {})",
            config.input_dir.display(),
            config.extensions.join(", ")
        );
        return Ok(BatchReport::finalize(
            Vec::new(),
            None,
            total_start.elapsed().as_millis() as u64,
        ));
    }
    info!("Found {} image file(s) to process", images.len());

    // ── Step 2: Acquire the authorized remote handle (once per run) ──────
    let client = resolve_client(config).await?;

    // ── Step 3: Load the duplicate registry ──────────────────────────────
    let registry = match &config.registry_path {
        Some(path) => DuplicateRegistry::load(path)?,
        None => DuplicateRegistry::new(),
    };

    // ── Step 4: Ensure output directories exist ──────────────────────────
    for dir in [&config.texts_dir, &config.raw_texts_dir] {
        std::fs::create_dir_all(dir).map_err(|e| Img2TxtError::OutputWriteFailed {
            path: dir.clone(),
            source: e,
        })?;
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(images.len());
    }

    // ── Step 5: Drive the per-file pipelines ─────────────────────────────
    let abort = Arc::new(AtomicBool::new(false));
    let fatal: Arc<Mutex<Option<Img2TxtError>>> = Arc::new(Mutex::new(None));
    let total_files = images.len();

    let mut indexed: Vec<(usize, ProcessingResult)> = stream::iter(
        images.iter().enumerate().map(|(index, image)| {
            let client = Arc::clone(&client);
            let abort = Arc::clone(&abort);
            let fatal = Arc::clone(&fatal);
            let registry = &registry;
            async move {
                // A fatal condition elsewhere stops new files cold; they
                // stay pending so the report still covers every input.
                if abort.load(Ordering::SeqCst) {
                    return (index, ProcessingResult::pending(&image.filename));
                }

                if let Some(ref cb) = config.progress_callback {
                    cb.on_file_start(&image.filename, index + 1, total_files);
                }

                let outcome = file::process_file(&client, registry, image, config).await;

                if let Some(fatal_err) = outcome.fatal {
                    warn!("Batch-fatal error on '{}': {}", image.filename, fatal_err);
                    abort.store(true, Ordering::SeqCst);
                    let mut slot = fatal.lock().unwrap_or_else(|e| e.into_inner());
                    slot.get_or_insert(fatal_err);
                }

                if let Some(ref cb) = config.progress_callback {
                    let detail = outcome
                        .result
                        .error
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_default();
                    cb.on_file_done(&image.filename, outcome.result.status, &detail);
                }

                (index, outcome.result)
            }
        }),
    )
    .buffer_unordered(config.concurrency)
    .collect()
    .await;

    // ── Step 6: Join barrier — restore discovery order ───────────────────
    indexed.sort_by_key(|(index, _)| *index);
    let results: Vec<ProcessingResult> = indexed.into_iter().map(|(_, r)| r).collect();

    let fatal_err = fatal.lock().unwrap_or_else(|e| e.into_inner()).take();
    let fatal_msg = fatal_err.as_ref().map(|e| e.to_string());

    // ── Step 7: Persist the duplicate registry ───────────────────────────
    // Saved even after a fatal abort: successes that already committed keys
    // should not be re-uploaded by the re-run.
    if let Some(ref path) = config.registry_path {
        registry.save(path)?;
    }

    // ── Step 8: Combine outputs ──────────────────────────────────────────
    if fatal_err.is_none() {
        write_combined_outputs(config, &results)?;
    }

    if let Some(ref cb) = config.progress_callback {
        let successes = results
            .iter()
            .filter(|r| r.status == FileStatus::Success)
            .count();
        cb.on_batch_complete(total_files, successes);
    }

    // ── Step 9: Finalize the report ──────────────────────────────────────
    let report = BatchReport::finalize(
        results,
        fatal_msg,
        total_start.elapsed().as_millis() as u64,
    );
    info!(
        "Batch complete: {} ok, {} failed, {} skipped, {} pending in {}ms",
        report.successful, report.failed, report.skipped, report.pending, report.total_duration_ms
    );
    Ok(report)
}

/// Resolve the remote client, from most-specific to least-specific.
///
/// 1. **Pre-built client** (`config.client`) — the caller constructed the
///    client entirely; we use it as-is. Useful in tests or when the caller
///    needs custom middleware (caching, rate-limiting).
/// 2. **Stored token** — the normal CLI path: load/refresh the token file
///    and wrap it in a [`DriveClient`].
async fn resolve_client(config: &BatchConfig) -> Result<Arc<dyn RemoteConverter>, Img2TxtError> {
    if let Some(ref client) = config.client {
        return Ok(Arc::clone(client));
    }
    let token = auth::acquire_token(&config.token_path).await?;
    let client = DriveClient::new(token, config.api_timeout_secs)?;
    Ok(Arc::new(client))
}

/// Write the combined cleaned (and optionally raw) outputs.
///
/// Sections are the success results in discovery order. Nothing is written
/// when there are no successes or combination is disabled.
fn write_combined_outputs(
    config: &BatchConfig,
    results: &[ProcessingResult],
) -> Result<(), Img2TxtError> {
    let successes: Vec<&ProcessingResult> = results
        .iter()
        .filter(|r| r.status == FileStatus::Success)
        .collect();
    if successes.is_empty() {
        return Ok(());
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    if config.combine_texts {
        let sections: Vec<(String, String)> = successes
            .iter()
            .map(|r| {
                (
                    r.filename.clone(),
                    r.cleaned_text.clone().unwrap_or_default(),
                )
            })
            .collect();
        let path = config
            .texts_dir
            .join(format!("combined_cleaned_{timestamp}.txt"));
        write_combined(&path, &combine::combine_texts(&sections, config.include_headers))?;
        info!("Combined cleaned text saved to {}", path.display());
    }

    if config.combine_raw {
        let sections: Vec<(String, String)> = successes
            .iter()
            .map(|r| (r.filename.clone(), r.raw_text.clone().unwrap_or_default()))
            .collect();
        let path = config
            .raw_texts_dir
            .join(format!("combined_raw_{timestamp}.txt"));
        write_combined(&path, &combine::combine_texts(&sections, config.include_headers))?;
        info!("Combined raw text saved to {}", path.display());
    }

    Ok(())
}

fn write_combined(path: &PathBuf, combined: &str) -> Result<(), Img2TxtError> {
    std::fs::write(path, combined).map_err(|e| Img2TxtError::OutputWriteFailed {
        path: path.clone(),
        source: e,
    })
}
