//! Bearer extraction and token verification against the auth service.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts, response::Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use dockhand_core::{IdentityVerifier, OrchestratorError, UserIdentity};

use crate::server::error_response;

const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Raw bearer token pulled from the Authorization header.
///
/// Extraction only checks shape; the operation that consumes the token
/// verifies it against the auth service.
pub struct Bearer(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for Bearer
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|val| val.to_str().ok());

        match header.and_then(|h| h.strip_prefix("Bearer ")) {
            Some(token) if !token.is_empty() => Ok(Bearer(token.to_string())),
            _ => {
                warn!("missing or malformed Authorization header");
                Err(error_response(&OrchestratorError::Unauthorized))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ValidateTokenResponse {
    user_id: i64,
    email: String,
}

/// Verifies tokens by calling the auth service's validate endpoint.
pub struct AuthClient {
    base_url: String,
    http: reqwest::Client,
}

impl AuthClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl IdentityVerifier for AuthClient {
    async fn verify(&self, token: &str) -> Result<UserIdentity, OrchestratorError> {
        let url = format!("{}/validate-token", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .timeout(VERIFY_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "auth service unreachable");
                OrchestratorError::Unauthorized
            })?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "token rejected by auth service");
            return Err(OrchestratorError::Unauthorized);
        }

        let body: ValidateTokenResponse = response.json().await.map_err(|e| {
            warn!(error = %e, "malformed response from auth service");
            OrchestratorError::Unauthorized
        })?;

        Ok(UserIdentity { user_id: body.user_id, email: body.email })
    }
}
