//! HTTP Basic authentication gate.
//!
//! Expected credentials are configured as SHA-256 digests, never in clear
//! text. Presented credentials are hashed and compared in constant time;
//! the username and password comparisons are both always evaluated.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::config::{ConfigError, DIGEST_LEN, SecurityConfig};

/// Challenge sent with every 401 response.
pub const CHALLENGE: &str = r#"Basic realm="restricted", charset="UTF-8""#;

/// Expected Basic auth credentials.
#[derive(Clone)]
pub struct BasicAuth {
    username_digest: [u8; DIGEST_LEN],
    password_digest: [u8; DIGEST_LEN],
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth").finish_non_exhaustive()
    }
}

/// Why a request was refused by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthRejection {
    #[error("failed to get basic auth credential")]
    MissingCredentials,
    #[error("credential mismatched")]
    Mismatch,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, HeaderValue::from_static(CHALLENGE))],
            self.to_string(),
        )
            .into_response()
    }
}

impl BasicAuth {
    /// Create a gate from SHA-256 digests of the username and password.
    pub fn new(username_digest: [u8; DIGEST_LEN], password_digest: [u8; DIGEST_LEN]) -> Self {
        Self {
            username_digest,
            password_digest,
        }
    }

    /// Build the gate from configuration, or `None` if Basic auth is disabled.
    pub fn from_config(config: &SecurityConfig) -> Result<Option<Self>, ConfigError> {
        Ok(config
            .decoded_credentials()?
            .map(|(username, password)| Self::new(username, password)))
    }

    /// Check the `Authorization` header of a request.
    pub fn verify(&self, headers: &HeaderMap) -> Result<(), AuthRejection> {
        let (username, password) =
            basic_credentials(headers).ok_or(AuthRejection::MissingCredentials)?;

        let username_match = Sha256::digest(username.as_bytes())
            .as_slice()
            .ct_eq(&self.username_digest);
        let password_match = Sha256::digest(password.as_bytes())
            .as_slice()
            .ct_eq(&self.password_digest);

        if bool::from(username_match & password_match) {
            Ok(())
        } else {
            Err(AuthRejection::Mismatch)
        }
    }
}

/// Extract `(username, password)` from a `Basic` authorization header.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Basic authentication middleware.
///
/// Returns 401 Unauthorized with a `WWW-Authenticate` challenge if the
/// credentials are missing or do not match.
pub async fn basic_auth(
    headers: HeaderMap,
    State(auth): State<Arc<BasicAuth>>,
    request: Request,
    next: Next,
) -> Response {
    match auth.verify(&headers) {
        Ok(()) => next.run(request).await,
        Err(rejection) => {
            warn!(
                "Basic auth failed for {}: {}",
                request.uri().path(),
                rejection
            );
            rejection.into_response()
        }
    }
}
