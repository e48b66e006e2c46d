use axum::http::{HeaderMap, header};
use base64::{Engine, engine::general_purpose::STANDARD};
use std::sync::Arc;

use crate::{error::AppError, state::AppState};

/// Credentials presented in an `Authorization: Basic ...` header.
#[derive(Debug, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl BasicCredentials {
    /// Parse the `Authorization` header. Anything other than the exact
    /// `Basic` scheme with a base64 `user:password` payload yields `None`.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
        let (scheme, payload) = value.split_once(' ')?;
        if scheme != "Basic" {
            return None;
        }
        let decoded = STANDARD.decode(payload.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        Some(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

/// Gate for the editing actions: [`AppError::Unauthorized`] for missing,
/// malformed or wrong credentials.
pub async fn require_user(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(creds) = BasicCredentials::from_headers(headers) else {
        return Err(AppError::Unauthorized);
    };

    // Argon2 verification is CPU-bound; keep it off the async workers.
    let store = Arc::clone(&state.credentials);
    let BasicCredentials { username, password } = creds;
    let ok = tokio::task::spawn_blocking(move || store.authenticate(&username, &password))
        .await
        .map_err(|e| AppError::Internal(format!("authentication task failed: {e}")))?;

    if ok {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}
