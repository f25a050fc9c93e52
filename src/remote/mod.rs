//! Remote conversion client: the four-operation seam to the OCR service.
//!
//! The actual character recognition is opaque — it happens inside the remote
//! service between `convert` and `export_text`. Everything this crate knows
//! about it is the [`RemoteConverter`] contract below, which keeps the
//! orchestrator testable against a scripted mock and leaves the provider free
//! to change its wire format.
//!
//! 1. [`drive`] — the production binding: Google Drive v3 REST over reqwest
//! 2. [`auth`]  — stored-token loading and OAuth2 refresh, run once per batch

pub mod auth;
pub mod drive;

use crate::error::RemoteError;
use async_trait::async_trait;

/// What kind of remote object an artifact is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// The uploaded image bytes, unconverted.
    RawUpload,
    /// The service-side document produced by converting a raw upload.
    ConvertedDocument,
}

/// A file-like object living inside the remote service.
///
/// Artifacts consume remote quota/storage until deleted, so the per-file
/// pipeline tracks every one it creates and deletes them on every exit path
/// (see [`crate::pipeline::file`]). They never outlive the pipeline
/// invocation that created them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteArtifact {
    /// Remote object id, as assigned by the service.
    pub id: String,
    pub kind: ArtifactKind,
    /// Filename of the owning source image, for logs.
    pub source: String,
}

/// The four remote operations, each safe to retry.
///
/// Implementations map their provider's failures onto [`RemoteError`]; the
/// orchestrator applies the retry/fatal policy, so implementations should
/// not retry internally.
#[async_trait]
pub trait RemoteConverter: Send + Sync {
    /// Upload raw image bytes; returns the created artifact.
    ///
    /// Every successful call creates billable remote state — callers own the
    /// returned artifact and must eventually `delete` it.
    async fn upload(&self, bytes: &[u8], filename: &str) -> Result<RemoteArtifact, RemoteError>;

    /// Convert a raw upload into a text document, triggering server-side OCR.
    async fn convert(&self, raw: &RemoteArtifact) -> Result<RemoteArtifact, RemoteError>;

    /// Export the document's plain text.
    ///
    /// An empty string is a valid result (a blank page has no text).
    async fn export_text(&self, document: &RemoteArtifact) -> Result<String, RemoteError>;

    /// Delete a remote artifact.
    ///
    /// Call sites treat failure as degraded-but-non-fatal: a leaked artifact
    /// is logged, never escalated.
    async fn delete(&self, artifact: &RemoteArtifact) -> Result<(), RemoteError>;
}
