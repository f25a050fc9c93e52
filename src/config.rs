//! Configuration types for batch image-to-text conversion.
//!
//! All batch behaviour is controlled through [`BatchConfig`], built via its
//! [`BatchConfigBuilder`]. Keeping every knob in one struct makes it trivial
//! to share configs across tasks, log them, and diff two runs to understand
//! why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A fifteen-field constructor is unreadable and breaks on every new field.
//! The builder pattern lets callers set only what they care about and rely on
//! well-documented defaults for the rest.

use crate::error::Img2TxtError;
use crate::progress::ProgressCallback;
use crate::remote::RemoteConverter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Configuration for a batch OCR run.
///
/// Built via [`BatchConfig::builder()`] or using [`BatchConfig::default()`].
///
/// # Example
/// ```rust
/// use img2txt::BatchConfig;
///
/// let config = BatchConfig::builder()
///     .input_dir("scans")
///     .max_retries(5)
///     .include_headers(true)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Directory scanned for source images. Default: `images`.
    pub input_dir: PathBuf,

    /// Directory receiving one cleaned `.txt` per image. Default: `texts`.
    pub texts_dir: PathBuf,

    /// Directory receiving one raw (uncleaned) `.txt` per image. Default: `raw_texts`.
    ///
    /// The raw export is kept alongside the cleaned text so a bad cleaning
    /// rule never destroys information: re-cleaning is always possible
    /// without another round of remote calls.
    pub raw_texts_dir: PathBuf,

    /// Lower-case file extensions (without dot) treated as source images.
    /// Default: jpg, jpeg, png, gif, bmp, tif, tiff, webp.
    pub extensions: Vec<String>,

    /// Produce a combined file from all cleaned texts at the end of the run.
    /// Default: true.
    pub combine_texts: bool,

    /// Also produce a combined file from the raw, uncleaned texts. Default: false.
    pub combine_raw: bool,

    /// Prefix each section of a combined file with a `--- filename ---`
    /// delimiter line. Default: false.
    pub include_headers: bool,

    /// Maximum retry attempts per remote call on a transient failure. Default: 3.
    ///
    /// Most 5xx and timeout errors are transient (overloaded backend, network
    /// blip). Retrying 3 times catches the vast majority without blocking the
    /// pipeline for long. Permanent errors (rejected credential, unsupported
    /// image) are never retried.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    ///
    /// Doubles after each attempt: 500 ms → 1 s → 2 s. Exponential backoff
    /// avoids the thundering-herd problem where N concurrent workers retry
    /// simultaneously and immediately overwhelm a recovering API endpoint.
    pub retry_backoff_ms: u64,

    /// Per-remote-call timeout in seconds. Default: 60.
    ///
    /// An exceeded timeout is classified like a transient failure and counts
    /// against the retry budget.
    pub api_timeout_secs: u64,

    /// Number of files processed concurrently. Default: 1 (sequential).
    ///
    /// The remote calls are network-bound, so a small fan-out amortises their
    /// latency well. Whatever the setting, combined output order stays the
    /// discovery order and each file's pipeline runs in isolation.
    pub concurrency: usize,

    /// How duplicate fingerprints are computed. Default: [`FingerprintMode::Content`].
    pub fingerprint: FingerprintMode,

    /// Optional path to a persisted duplicate registry (JSON key set).
    ///
    /// When set, keys recorded by earlier runs are loaded before the batch
    /// starts and the merged set is written back at the end, so re-running
    /// the tool on a grown directory only pays for the new files. When
    /// `None`, duplicate detection is scoped to the current run.
    pub registry_path: Option<PathBuf>,

    /// Keep remote artifacts instead of deleting them after each file.
    /// Default: false.
    pub retain_remote: bool,

    /// Path to the stored OAuth token file. Default: `token.json`.
    pub token_path: PathBuf,

    /// Pre-constructed remote client. Takes precedence over the built-in
    /// Drive client; useful in tests or behind custom middleware.
    pub client: Option<Arc<dyn RemoteConverter>>,

    /// Optional progress callback receiving per-file events.
    pub progress_callback: Option<ProgressCallback>,

    /// Cooperative cancellation flag. When it flips to `true` the batch stops
    /// issuing new remote calls; in-flight files still delete their artifacts.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("images"),
            texts_dir: PathBuf::from("texts"),
            raw_texts_dir: PathBuf::from("raw_texts"),
            extensions: default_extensions(),
            combine_texts: true,
            combine_raw: false,
            include_headers: false,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            concurrency: 1,
            fingerprint: FingerprintMode::Content,
            registry_path: None,
            retain_remote: false,
            token_path: PathBuf::from("token.json"),
            client: None,
            progress_callback: None,
            cancel: None,
        }
    }
}

fn default_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "webp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("input_dir", &self.input_dir)
            .field("texts_dir", &self.texts_dir)
            .field("raw_texts_dir", &self.raw_texts_dir)
            .field("extensions", &self.extensions)
            .field("combine_texts", &self.combine_texts)
            .field("combine_raw", &self.combine_raw)
            .field("include_headers", &self.include_headers)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("fingerprint", &self.fingerprint)
            .field("registry_path", &self.registry_path)
            .field("retain_remote", &self.retain_remote)
            .field("client", &self.client.as_ref().map(|_| "<dyn RemoteConverter>"))
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }

    /// True when `filename` carries one of the configured image extensions.
    pub(crate) fn matches_extension(&self, filename: &str) -> bool {
        let lower = filename.to_lowercase();
        self.extensions
            .iter()
            .any(|ext| lower.ends_with(&format!(".{ext}")))
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    pub fn texts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.texts_dir = dir.into();
        self
    }

    pub fn raw_texts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.raw_texts_dir = dir.into();
        self
    }

    /// Replace the extension set. Leading dots and case are normalised away.
    pub fn extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.extensions = exts
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    pub fn combine_texts(mut self, v: bool) -> Self {
        self.config.combine_texts = v;
        self
    }

    pub fn combine_raw(mut self, v: bool) -> Self {
        self.config.combine_raw = v;
        self
    }

    pub fn include_headers(mut self, v: bool) -> Self {
        self.config.include_headers = v;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn fingerprint(mut self, mode: FingerprintMode) -> Self {
        self.config.fingerprint = mode;
        self
    }

    pub fn registry_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.registry_path = Some(path.into());
        self
    }

    pub fn retain_remote(mut self, v: bool) -> Self {
        self.config.retain_remote = v;
        self
    }

    pub fn token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.token_path = path.into();
        self
    }

    pub fn client(mut self, client: Arc<dyn RemoteConverter>) -> Self {
        self.config.client = Some(client);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.config.cancel = Some(flag);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, Img2TxtError> {
        let c = &self.config;
        if c.extensions.is_empty() {
            return Err(Img2TxtError::InvalidConfig(
                "Extension set must not be empty".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(Img2TxtError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.texts_dir == c.raw_texts_dir {
            return Err(Img2TxtError::InvalidConfig(
                "texts_dir and raw_texts_dir must differ".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How a [`crate::registry::DuplicateKey`] is derived from a source image.
///
/// Content hashing catches byte-identical copies under different names;
/// name+size is cheaper (no full read before the hash) and good enough when
/// filenames are trusted to be unique per content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FingerprintMode {
    /// SHA-256 of the file content. (default)
    #[default]
    Content,
    /// Filename plus byte size.
    NameSize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = BatchConfig::builder().build().unwrap();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.concurrency, 1);
        assert!(config.combine_texts);
        assert!(!config.combine_raw);
    }

    #[test]
    fn extensions_normalised() {
        let config = BatchConfig::builder()
            .extensions([".PNG", "Jpg", ""])
            .build()
            .unwrap();
        assert_eq!(config.extensions, vec!["png", "jpg"]);
    }

    #[test]
    fn empty_extensions_rejected() {
        let err = BatchConfig::builder()
            .extensions(Vec::<String>::new())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Extension set"));
    }

    #[test]
    fn same_output_dirs_rejected() {
        let err = BatchConfig::builder()
            .texts_dir("out")
            .raw_texts_dir("out")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn matches_extension_is_case_insensitive() {
        let config = BatchConfig::default();
        assert!(config.matches_extension("scan.PNG"));
        assert!(config.matches_extension("scan.jpeg"));
        assert!(!config.matches_extension("notes.txt"));
        assert!(!config.matches_extension("png"));
    }
}
