//! # img2txt
//!
//! Batch-convert a directory of scanned images to plain text by delegating
//! character recognition to the Google Drive OCR pipeline.
//!
//! ## Why this crate?
//!
//! Local OCR engines need model downloads, language packs, and tuning.
//! Drive's document conversion already runs a production-grade recogniser:
//! upload an image, copy it as a Google Doc, export the Doc as `text/plain`,
//! delete both remote files — and you have the text. This crate turns that
//! four-call dance into a robust batch tool: duplicate detection before any
//! remote cost, bounded retry with backoff, per-file failure isolation, and
//! guaranteed cleanup of every remote artifact it creates.
//!
//! ## Pipeline Overview
//!
//! ```text
//! images/
//!  │
//!  ├─ 1. Discover   list directory, filter extensions, fix the order
//!  ├─ 2. Dup-check  content fingerprint vs. run (or persisted) registry
//!  ├─ 3. Upload     raw image bytes → remote artifact
//!  ├─ 4. Convert    server-side OCR into a text document
//!  ├─ 5. Export     document → plain text (then delete both artifacts)
//!  ├─ 6. Clean      strip service boilerplate, normalise whitespace
//!  └─ 7. Persist    texts/{stem}.txt + raw_texts/{stem}.txt + combined files
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use img2txt::{run_batch, BatchConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Token is read from ./token.json by default
//!     let config = BatchConfig::builder()
//!         .input_dir("images")
//!         .include_headers(true)
//!         .build()?;
//!     let report = run_batch(&config).await?;
//!     println!(
//!         "{} ok, {} failed, {} skipped",
//!         report.successful, report.failed, report.skipped
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `img2txt` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! img2txt = { version = "0.3", default-features = false }
//! ```
//!
//! ## Error model
//!
//! Per-file failures (corrupt image, exhausted retries, local I/O) are
//! isolated: they land in the [`BatchReport`] and the batch keeps going.
//! Credential and quota rejections are batch-fatal: the run stops scheduling
//! new files, keeps completed results, and reports the abort — see
//! [`error::Img2TxtError`] vs [`error::FileError`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod remote;
pub mod report;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::run_batch;
pub use config::{BatchConfig, BatchConfigBuilder, FingerprintMode};
pub use error::{FileError, Img2TxtError, RemoteError};
pub use pipeline::cleaner::clean_text;
pub use pipeline::combine::combine_texts;
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use registry::{ClaimOutcome, DuplicateKey, DuplicateRegistry};
pub use remote::drive::DriveClient;
pub use remote::{ArtifactKind, RemoteArtifact, RemoteConverter};
pub use report::{BatchReport, FileStatus, ProcessingResult};
