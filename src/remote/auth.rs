//! Stored-token authentication for the Drive client.
//!
//! Credential *acquisition* (the browser consent flow that first produces a
//! token file) is outside this crate: we only consume a token file that an
//! earlier interactive login left behind. The file is read once per run,
//! before the orchestrator starts — authentication is a precondition of the
//! batch, not a per-file concern.
//!
//! Accepted file shapes (JSON):
//!
//! * `{"refresh_token": "...", "client_id": "...", "client_secret": "..."}` —
//!   exchanged for a fresh access token at the OAuth2 token endpoint. The
//!   normal case, since access tokens expire within the hour.
//! * `{"access_token": "..."}` — used as-is. Convenient for short scripts and
//!   for tokens minted by an external refresher.

use crate::error::Img2TxtError;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// On-disk token file contents.
#[derive(Debug, Deserialize)]
struct StoredToken {
    access_token: Option<String>,
    refresh_token: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

/// Response from the OAuth2 token endpoint.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
}

/// Load the stored token file and produce a ready bearer token.
///
/// Fails with [`Img2TxtError::Auth`] when no usable credential is available;
/// the caller aborts before processing any file.
pub async fn acquire_token(token_path: &Path) -> Result<String, Img2TxtError> {
    let raw = std::fs::read_to_string(token_path).map_err(|e| Img2TxtError::Auth {
        detail: format!(
            "cannot read token file '{}': {e}. Run the authorisation flow first.",
            token_path.display()
        ),
    })?;

    let stored: StoredToken = serde_json::from_str(&raw).map_err(|e| Img2TxtError::Auth {
        detail: format!("token file '{}' is not valid JSON: {e}", token_path.display()),
    })?;

    match stored {
        StoredToken {
            refresh_token: Some(refresh_token),
            client_id: Some(client_id),
            client_secret: Some(client_secret),
            ..
        } => {
            debug!("Refreshing access token via {TOKEN_ENDPOINT}");
            refresh(&refresh_token, &client_id, &client_secret).await
        }
        StoredToken {
            access_token: Some(token),
            ..
        } => {
            info!("Using stored access token without refresh");
            Ok(token)
        }
        _ => Err(Img2TxtError::Auth {
            detail: format!(
                "token file '{}' has neither a refresh_token triple nor an access_token",
                token_path.display()
            ),
        }),
    }
}

/// Exchange a refresh token for a fresh access token.
async fn refresh(
    refresh_token: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<String, Img2TxtError> {
    let client = reqwest::Client::new();
    let response = client
        .post(TOKEN_ENDPOINT)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ])
        .send()
        .await
        .map_err(|e| Img2TxtError::Auth {
            detail: format!("token refresh request failed: {e}"),
        })?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(Img2TxtError::Auth {
            detail: format!("token refresh rejected (HTTP {status}): {body}"),
        });
    }

    let refreshed: RefreshResponse = response.json().await.map_err(|e| Img2TxtError::Auth {
        detail: format!("token refresh response unreadable: {e}"),
    })?;
    info!("Access token refreshed");
    Ok(refreshed.access_token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_token_file_is_auth_error() {
        let err = acquire_token(Path::new("/definitely/not/here/token.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, Img2TxtError::Auth { .. }));
    }

    #[tokio::test]
    async fn malformed_token_file_is_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "not json at all").unwrap();
        let err = acquire_token(&path).await.unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[tokio::test]
    async fn bare_access_token_is_used_directly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, r#"{"access_token": "ya29.test"}"#).unwrap();
        let token = acquire_token(&path).await.unwrap();
        assert_eq!(token, "ya29.test");
    }

    #[tokio::test]
    async fn empty_object_is_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "{}").unwrap();
        let err = acquire_token(&path).await.unwrap_err();
        assert!(err.to_string().contains("neither"));
    }
}
