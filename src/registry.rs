//! Duplicate detection: fingerprints and the check-then-register set.
//!
//! Every source image is reduced to a [`DuplicateKey`] before any remote call
//! is made — the duplicate check is the one branch of the pipeline that
//! avoids remote cost entirely. The registry hands out claims atomically, so
//! even with concurrent file pipelines at most one holder of a given key ever
//! uploads.
//!
//! ## Claim lifecycle
//!
//! * [`DuplicateRegistry::claim`] — atomically reserves a key for the current
//!   run. The first caller gets [`ClaimOutcome::New`]; every later caller
//!   (same run) gets [`ClaimOutcome::Duplicate`].
//! * [`DuplicateRegistry::commit`] — called only after the file's pipeline
//!   reached success. Committed keys are the only ones written to the
//!   persisted registry, so a file that failed mid-pipeline is eligible for
//!   retry in a later run.
//!
//! Cross-run persistence is opt-in via
//! [`crate::config::BatchConfig::registry_path`]: a small JSON key set loaded
//! before the batch and rewritten (atomically) at the end.

use crate::config::FingerprintMode;
use crate::error::Img2TxtError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// Fingerprint identifying equivalent source images.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DuplicateKey(String);

impl DuplicateKey {
    /// Key derived from file content (SHA-256).
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(hex::encode(digest))
    }

    /// Key derived from filename and byte size.
    ///
    /// Cheaper than hashing content and hashed anyway so both modes produce
    /// keys of identical shape in the persisted registry.
    pub fn from_name_size(filename: &str, size: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(filename.as_bytes());
        hasher.update(size.to_le_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Key for `bytes` under the configured mode.
    pub fn for_image(mode: FingerprintMode, filename: &str, bytes: &[u8]) -> Self {
        match mode {
            FingerprintMode::Content => Self::from_bytes(bytes),
            FingerprintMode::NameSize => Self::from_name_size(filename, bytes.len() as u64),
        }
    }

    /// The hex form of the key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Result of a duplicate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// First time this key is seen; the caller owns the upload.
    New,
    /// Already claimed in this run, or recorded by a prior run.
    Duplicate,
}

/// Serialised form of the persisted registry file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedKeys {
    keys: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    /// Every key claimed this run plus keys loaded from a prior run.
    /// A claim holds for the whole run even if the file later fails, so the
    /// "exactly one uploader per key" guarantee is unconditional.
    seen: BTreeSet<String>,
    /// Keys whose files reached success (plus loaded prior keys). Only these
    /// survive into the persisted registry.
    committed: BTreeSet<String>,
}

/// The run's duplicate-tracking state.
///
/// Constructed at run start, finalized (saved) at run end, never reused
/// across runs without an explicit reload. All methods take `&self`; the
/// check-then-reserve step is atomic under an internal lock, which is the
/// property that makes concurrent file pipelines safe.
#[derive(Debug, Default)]
pub struct DuplicateRegistry {
    inner: Mutex<RegistryInner>,
}

impl DuplicateRegistry {
    /// A registry scoped to the current run only.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-seeded with keys persisted by earlier runs.
    ///
    /// A missing file is not an error — the first run simply starts empty.
    pub fn load(path: &Path) -> Result<Self, Img2TxtError> {
        if !path.exists() {
            debug!("No prior registry at {}, starting empty", path.display());
            return Ok(Self::new());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| Img2TxtError::RegistryLoadFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let persisted: PersistedKeys =
            serde_json::from_str(&raw).map_err(|e| Img2TxtError::RegistryLoadFailed {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;
        debug!(
            "Loaded {} prior duplicate keys from {}",
            persisted.keys.len(),
            path.display()
        );
        let registry = Self::new();
        {
            let mut inner = registry.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.seen = persisted.keys.clone();
            inner.committed = persisted.keys;
        }
        Ok(registry)
    }

    /// Atomically check-and-reserve `key` for the current run.
    pub fn claim(&self, key: &DuplicateKey) -> ClaimOutcome {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.seen.insert(key.0.clone()) {
            ClaimOutcome::New
        } else {
            ClaimOutcome::Duplicate
        }
    }

    /// Record that the file owning `key` reached success.
    pub fn commit(&self, key: &DuplicateKey) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.committed.insert(key.0.clone());
    }

    /// Number of committed keys (prior + this run's successes).
    pub fn committed_len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.committed.len()
    }

    /// Write the committed key set to `path` (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<(), Img2TxtError> {
        let persisted = {
            let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            PersistedKeys {
                keys: inner.committed.clone(),
            }
        };
        let json = serde_json::to_string_pretty(&persisted)
            .map_err(|e| Img2TxtError::Internal(format!("registry serialise: {e}")))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| Img2TxtError::OutputWriteFailed {
                    path: path.to_path_buf(),
                    source: e,
                })?;
            }
        }
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json).map_err(|e| Img2TxtError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::rename(&tmp_path, path).map_err(|e| Img2TxtError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!(
            "Saved {} duplicate keys to {}",
            persisted.keys.len(),
            path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_bytes_same_key() {
        let a = DuplicateKey::from_bytes(b"pixels");
        let b = DuplicateKey::from_bytes(b"pixels");
        assert_eq!(a, b);
        assert_ne!(a, DuplicateKey::from_bytes(b"other pixels"));
    }

    #[test]
    fn name_size_key_ignores_content() {
        let a = DuplicateKey::for_image(FingerprintMode::NameSize, "a.png", b"xxxx");
        let b = DuplicateKey::for_image(FingerprintMode::NameSize, "a.png", b"yyyy");
        assert_eq!(a, b, "same name and size must collide in NameSize mode");
        let c = DuplicateKey::for_image(FingerprintMode::NameSize, "a.png", b"yyyyy");
        assert_ne!(a, c);
    }

    #[test]
    fn first_claim_wins() {
        let registry = DuplicateRegistry::new();
        let key = DuplicateKey::from_bytes(b"scan");
        assert_eq!(registry.claim(&key), ClaimOutcome::New);
        assert_eq!(registry.claim(&key), ClaimOutcome::Duplicate);
        assert_eq!(registry.claim(&key), ClaimOutcome::Duplicate);
    }

    #[test]
    fn claim_is_atomic_under_concurrency() {
        use std::sync::Arc;

        let registry = Arc::new(DuplicateRegistry::new());
        let key = DuplicateKey::from_bytes(b"contended");
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let key = key.clone();
                std::thread::spawn(move || registry.claim(&key))
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| *o == ClaimOutcome::New)
            .count();
        assert_eq!(wins, 1, "exactly one claimant may win");
    }

    #[test]
    fn only_committed_keys_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");

        let registry = DuplicateRegistry::new();
        let committed = DuplicateKey::from_bytes(b"good");
        let failed = DuplicateKey::from_bytes(b"bad");
        registry.claim(&committed);
        registry.claim(&failed);
        registry.commit(&committed);
        registry.save(&path).unwrap();

        let reloaded = DuplicateRegistry::load(&path).unwrap();
        assert_eq!(
            reloaded.claim(&committed),
            ClaimOutcome::Duplicate,
            "committed key must survive the reload"
        );
        assert_eq!(
            reloaded.claim(&failed),
            ClaimOutcome::New,
            "uncommitted key must be retryable next run"
        );
    }

    #[test]
    fn load_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = DuplicateRegistry::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(registry.committed_len(), 0);
    }
}
