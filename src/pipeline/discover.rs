//! Input discovery: turn a directory into a fixed, ordered batch.
//!
//! The file set is fixed once, at batch start, and sorted by filename. That
//! discovery order is the contract every later stage leans on: results are
//! reported in it and combined outputs concatenate in it, no matter which
//! file happens to finish first under concurrency.

use crate::config::BatchConfig;
use crate::error::Img2TxtError;
use std::path::PathBuf;
use tracing::{debug, warn};

/// A source image as discovered at batch start. Immutable afterwards.
#[derive(Debug, Clone)]
pub struct SourceImage {
    /// Full path to the local file.
    pub path: PathBuf,
    /// Filename component, used for logs, headers, and output naming.
    pub filename: String,
    /// Filename without the image extension; output files are `{stem}.txt`.
    pub stem: String,
    /// Byte size at discovery time.
    pub size: u64,
}

/// Scan the configured input directory for source images.
///
/// Non-matching entries and subdirectories are ignored. Returns the images
/// sorted by filename — the batch's deterministic iteration order.
pub fn discover_images(config: &BatchConfig) -> Result<Vec<SourceImage>, Img2TxtError> {
    let dir = &config.input_dir;
    if !dir.is_dir() {
        return Err(Img2TxtError::InputDirMissing { path: dir.clone() });
    }

    let entries = std::fs::read_dir(dir).map_err(|e| Img2TxtError::InputDirUnreadable {
        path: dir.clone(),
        source: e,
    })?;

    let mut images = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Skipping unreadable directory entry: {e}");
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            warn!("Skipping non-UTF-8 filename: {}", path.display());
            continue;
        };
        if !config.matches_extension(filename) {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(filename)
            .to_string();

        images.push(SourceImage {
            filename: filename.to_string(),
            stem,
            size,
            path,
        });
    }

    images.sort_by(|a, b| a.filename.cmp(&b.filename));
    debug!("Discovered {} image(s) in {}", images.len(), dir.display());
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(dir: &std::path::Path) -> BatchConfig {
        BatchConfig::builder()
            .input_dir(dir)
            .build()
            .unwrap()
    }

    #[test]
    fn missing_dir_is_an_error() {
        let err = discover_images(&config_for(std::path::Path::new("/no/such/dir"))).unwrap_err();
        assert!(matches!(err, Img2TxtError::InputDirMissing { .. }));
    }

    #[test]
    fn filters_and_sorts_by_filename() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.png"), b"2").unwrap();
        std::fs::write(dir.path().join("a.JPG"), b"1").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub.png")).unwrap();

        let images = discover_images(&config_for(dir.path())).unwrap();
        let names: Vec<_> = images.iter().map(|i| i.filename.as_str()).collect();
        assert_eq!(names, vec!["a.JPG", "b.png"]);
        assert_eq!(images[0].stem, "a");
        assert_eq!(images[0].size, 1);
    }

    #[test]
    fn empty_dir_yields_empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let images = discover_images(&config_for(dir.path())).unwrap();
        assert!(images.is_empty());
    }
}
