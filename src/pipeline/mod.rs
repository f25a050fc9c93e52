//! Pipeline stages for batch image-to-text conversion.
//!
//! Each submodule implements exactly one transformation step. Keeping stages
//! separate makes each independently testable and lets us swap
//! implementations (e.g. a different remote binding) without touching other
//! stages.
//!
//! ## Data Flow
//!
//! ```text
//! discover ──▶ file ─────────────────────────▶ cleaner ──▶ combine
//! (dir scan)   (claim, upload, convert,        (pure       (pure
//!               export, persist, delete)        rules)      aggregation)
//! ```
//!
//! 1. [`discover`] — list the input directory, filter by extension, fix the
//!    deterministic order every later stage respects
//! 2. [`file`]     — the per-file state machine; the only stage with network
//!    I/O, retry policy, and remote-artifact cleanup
//! 3. [`cleaner`]  — deterministic text-cleanup rules stripping the
//!    service-injected boilerplate from exported text
//! 4. [`combine`]  — aggregate cleaned (and optionally raw) texts into
//!    combined outputs, preserving discovery order

pub mod cleaner;
pub mod combine;
pub mod discover;
pub mod file;
