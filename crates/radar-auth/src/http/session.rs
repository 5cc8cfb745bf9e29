/*
[INPUT]:  Persisted transport marker
[OUTPUT]: Re-validated sessions, logout calls, authenticated GETs
[POS]:    HTTP layer - endpoints that require an established session
[UPDATE]: When adding session endpoints or changing 401 handling
*/

use chrono::Utc;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::http::client::Rejection;
use crate::http::{AuthClient, AuthError, Result};
use crate::types::{Address, Session, TransportMarker, VerifyResponse};

pub(crate) const VERIFY_ENDPOINT: &str = "/api/auth/verify";
pub(crate) const LOGOUT_ENDPOINT: &str = "/api/auth/logout";

fn is_unauthorized(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

impl AuthClient {
    /// Validate a previously persisted marker without a fresh signature
    ///
    /// GET /api/auth/verify
    ///
    /// `Ok(None)` means the backend no longer accepts the marker.
    pub async fn verify_session(&self, marker: &TransportMarker) -> Result<Option<Session>> {
        let builder = self.authorized_request(Method::GET, VERIFY_ENDPOINT, marker)?;

        debug!("verifying persisted session");
        let response = builder.send().await?;
        let status = response.status();
        if is_unauthorized(status) {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Rejection::read(response).await.into_error());
        }

        let body: VerifyResponse = Self::decode_json(response).await?;
        if !body.valid {
            return Ok(None);
        }
        let address = body.address.as_deref().ok_or_else(|| {
            AuthError::InvalidResponse("verify response missing address".to_string())
        })?;
        let address = Address::parse(address)
            .map_err(|e| AuthError::InvalidResponse(format!("verify response address: {e}")))?;

        Ok(Some(Session {
            address,
            tier: body.tier,
            established_at: Utc::now(),
            transport_marker: marker.clone(),
        }))
    }

    /// End the backend session
    ///
    /// POST /api/auth/logout
    pub async fn logout(&self, marker: Option<&TransportMarker>) -> Result<()> {
        let builder = match marker {
            Some(marker) => self.authorized_request(Method::POST, LOGOUT_ENDPOINT, marker)?,
            None => self.request(Method::POST, LOGOUT_ENDPOINT)?,
        };

        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(Rejection::read(response).await.into_error());
        }
        Ok(())
    }

    /// Authenticated GET; 401/403 surfaces as `SessionExpired`
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        marker: &TransportMarker,
    ) -> Result<T> {
        let builder = self.authorized_request(Method::GET, endpoint, marker)?;
        let response = builder.send().await?;
        let status = response.status();
        if is_unauthorized(status) {
            return Err(AuthError::SessionExpired);
        }
        if !status.is_success() {
            return Err(Rejection::read(response).await.into_error());
        }
        Self::decode_json(response).await
    }
}
