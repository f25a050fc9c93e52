//! Google Drive v3 binding for [`RemoteConverter`].
//!
//! Drive doubles as an OCR service: uploading an image and copying it with
//! the Google Docs MIME type makes the server recognise the text, which can
//! then be exported as `text/plain`. The four trait operations map to four
//! REST calls:
//!
//! | Operation     | HTTP                                                        |
//! |---------------|-------------------------------------------------------------|
//! | `upload`      | `POST /upload/drive/v3/files?uploadType=multipart`          |
//! | `convert`     | `POST /drive/v3/files/{id}/copy` (Docs MIME type)           |
//! | `export_text` | `GET  /drive/v3/files/{id}/export?mimeType=text/plain`      |
//! | `delete`      | `DELETE /drive/v3/files/{id}`                               |
//!
//! The client performs no retries itself — it only classifies failures into
//! the [`RemoteError`] taxonomy and lets the orchestrator apply policy.

use crate::error::{Img2TxtError, RemoteError};
use crate::remote::{ArtifactKind, RemoteArtifact, RemoteConverter};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files?uploadType=multipart";
const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";

/// MIME type that makes Drive run OCR when a file is copied into it.
const DOCS_MIME: &str = "application/vnd.google-apps.document";

/// Boundary for the hand-built `multipart/related` upload body.
///
/// Drive's multipart upload requires `multipart/related` (metadata part +
/// media part), which reqwest's form support does not produce, so the body
/// is assembled manually.
const BOUNDARY: &str = "img2txt_upload_boundary";

/// Authorized Google Drive client. Cheap to clone; the underlying reqwest
/// client is an `Arc` internally and the handle is shared read-only across
/// all per-file pipelines.
#[derive(Clone)]
pub struct DriveClient {
    http: reqwest::Client,
    token: String,
    timeout_secs: u64,
}

/// The subset of a Drive file resource we care about.
#[derive(Debug, Deserialize)]
struct FileResource {
    id: String,
}

impl DriveClient {
    /// Build a client around a ready bearer token.
    ///
    /// `api_timeout_secs` bounds every individual HTTP call; an exceeded
    /// timeout surfaces as [`RemoteError::Timeout`].
    pub fn new(token: impl Into<String>, api_timeout_secs: u64) -> Result<Self, Img2TxtError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(api_timeout_secs))
            .build()
            .map_err(|e| Img2TxtError::Internal(format!("HTTP client build failed: {e}")))?;
        Ok(Self {
            http,
            token: token.into(),
            timeout_secs: api_timeout_secs,
        })
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Map a transport-level reqwest error onto the taxonomy.
    fn transport_error(&self, e: reqwest::Error) -> RemoteError {
        if e.is_timeout() {
            RemoteError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            RemoteError::Transient {
                detail: e.to_string(),
            }
        }
    }

    /// Classify a non-success HTTP response.
    ///
    /// `invalid_is_conversion` is set for the convert/export calls, where a
    /// 4xx means the service rejected the payload itself.
    async fn status_error(
        response: reqwest::Response,
        invalid_is_conversion: bool,
    ) -> RemoteError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        let detail = format!("HTTP {status}: {}", truncate(&body, 200));

        match status.as_u16() {
            429 => RemoteError::Quota {
                retry_after_secs: retry_after,
            },
            // Drive reports per-user rate limiting as 403 with a reason code.
            403 if body.contains("ateLimitExceeded") => RemoteError::Quota {
                retry_after_secs: retry_after,
            },
            401 | 403 => RemoteError::Auth { detail },
            500..=599 => RemoteError::Transient { detail },
            _ if invalid_is_conversion => RemoteError::Conversion { detail },
            _ => RemoteError::Transient { detail },
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Assemble the `multipart/related` body for a metadata+media upload.
fn multipart_related_body(metadata_json: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + metadata_json.len() + 256);
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata_json.as_bytes());
    body.extend_from_slice(format!("\r\n--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

#[async_trait]
impl RemoteConverter for DriveClient {
    async fn upload(&self, bytes: &[u8], filename: &str) -> Result<RemoteArtifact, RemoteError> {
        let metadata = serde_json::json!({ "name": filename }).to_string();
        let body = multipart_related_body(&metadata, bytes);

        let response = self
            .http
            .post(UPLOAD_URL)
            .header(reqwest::header::AUTHORIZATION, self.bearer())
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={BOUNDARY}"),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            return Err(Self::status_error(response, false).await);
        }

        let resource: FileResource = response
            .json()
            .await
            .map_err(|e| self.transport_error(e))?;
        debug!("Uploaded '{}' as remote file {}", filename, resource.id);

        Ok(RemoteArtifact {
            id: resource.id,
            kind: ArtifactKind::RawUpload,
            source: filename.to_string(),
        })
    }

    async fn convert(&self, raw: &RemoteArtifact) -> Result<RemoteArtifact, RemoteError> {
        let url = format!("{FILES_URL}/{}/copy", raw.id);
        let response = self
            .http
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, self.bearer())
            .json(&serde_json::json!({ "mimeType": DOCS_MIME }))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            return Err(Self::status_error(response, true).await);
        }

        let resource: FileResource = response
            .json()
            .await
            .map_err(|e| self.transport_error(e))?;
        debug!(
            "Converted remote file {} to document {}",
            raw.id, resource.id
        );

        Ok(RemoteArtifact {
            id: resource.id,
            kind: ArtifactKind::ConvertedDocument,
            source: raw.source.clone(),
        })
    }

    async fn export_text(&self, document: &RemoteArtifact) -> Result<String, RemoteError> {
        let url = format!("{FILES_URL}/{}/export", document.id);
        let response = self
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, self.bearer())
            .query(&[("mimeType", "text/plain")])
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            return Err(Self::status_error(response, true).await);
        }

        // An empty body is a valid export: the page simply had no text.
        response.text().await.map_err(|e| self.transport_error(e))
    }

    async fn delete(&self, artifact: &RemoteArtifact) -> Result<(), RemoteError> {
        let url = format!("{FILES_URL}/{}", artifact.id);
        let response = self
            .http
            .delete(&url)
            .header(reqwest::header::AUTHORIZATION, self.bearer())
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        // 404 means it is already gone, which is what delete wanted anyway.
        if response.status().is_success() || response.status().as_u16() == 404 {
            debug!("Deleted remote artifact {}", artifact.id);
            Ok(())
        } else {
            Err(Self::status_error(response, false).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multipart_body_layout() {
        let body = multipart_related_body(r#"{"name":"a.png"}"#, b"PNGDATA");
        let text = String::from_utf8_lossy(&body);
        assert!(text.starts_with(&format!("--{BOUNDARY}\r\n")));
        assert!(text.contains(r#"{"name":"a.png"}"#));
        assert!(text.contains("PNGDATA"));
        assert!(text.ends_with(&format!("\r\n--{BOUNDARY}--\r\n")));
        // Metadata part must come before the media part.
        assert!(text.find("application/json").unwrap() < text.find("octet-stream").unwrap());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 3), "hel");
        assert_eq!(truncate("héllo", 2), "hé");
    }
}
