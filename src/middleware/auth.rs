//! Bearer-token authentication.

use crate::{errors::AppError, state::AppState};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;
use tracing::warn;

/// The single shared secret. `None` disables authentication.
#[derive(Clone, Debug, Default)]
pub struct AuthSettings {
    pub token: Option<String>,
}

impl AuthSettings {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
        }
    }

    /// Check the `Authorization` header; `Err` holds the reason for the log.
    pub fn verify(&self, headers: &HeaderMap) -> Result<(), &'static str> {
        let Some(expected) = self.token.as_deref() else {
            return Ok(());
        };

        let value = headers
            .get(header::AUTHORIZATION)
            .ok_or("authorization header is missing")?
            .to_str()
            .map_err(|_| "authorization header is not valid ASCII")?;
        let token = value
            .strip_prefix("Bearer ")
            .ok_or("expected `Bearer <token>`")?;

        if bool::from(token.as_bytes().ct_eq(expected.as_bytes())) {
            Ok(())
        } else {
            Err("token mismatch")
        }
    }
}

/// Rejects requests that do not carry the configured bearer token.
///
/// The caller only ever sees a generic message; the reason goes to the log.
pub async fn require_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    match state.auth.verify(request.headers()) {
        Ok(()) => next.run(request).await,
        Err(reason) => {
            warn!(
                method = %request.method(),
                path = %request.uri().path(),
                "authentication failed: {reason}"
            );
            AppError::unauthorized("Authentication failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(auth: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(value) = auth {
            headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn disabled_without_a_token() {
        let auth = AuthSettings::new(None);
        assert!(auth.verify(&headers(None)).is_ok());
        assert!(AuthSettings::new(Some(String::new())).verify(&headers(None)).is_ok());
    }

    #[test]
    fn accepts_only_the_exact_bearer_token() {
        let auth = AuthSettings::new(Some("s3cret".into()));
        assert!(auth.verify(&headers(Some("Bearer s3cret"))).is_ok());
        assert!(auth.verify(&headers(Some("Bearer s3cre"))).is_err());
        assert!(auth.verify(&headers(Some("Bearer s3cret2"))).is_err());
        assert!(auth.verify(&headers(Some("Basic s3cret"))).is_err());
        assert!(auth.verify(&headers(None)).is_err());
    }
}
