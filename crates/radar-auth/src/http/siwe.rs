/*
[INPUT]:  Wallet address and signed assertions
[OUTPUT]: Validated challenges and freshly established sessions
[POS]:    HTTP layer - nonce and signature verification endpoints
[UPDATE]: When the nonce/siwe contract or challenge binding rules change
*/

use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode};
use tracing::{debug, warn};

use crate::http::client::Rejection;
use crate::http::{AuthClient, AuthError, Result};
use crate::types::{
    Address, Challenge, NonceRequest, NonceResponse, Session, SignedAssertion, SiweResponse,
    TransportMarker, VerifyRequest,
};

pub(crate) const NONCE_ENDPOINT: &str = "/api/auth/nonce";
pub(crate) const SIWE_ENDPOINT: &str = "/api/auth/siwe";

impl AuthClient {
    /// Request a fresh challenge for `address`
    ///
    /// POST /api/auth/nonce
    pub async fn request_nonce(&self, address: &Address) -> Result<Challenge> {
        let builder = self
            .request(Method::POST, NONCE_ENDPOINT)?
            .json(&NonceRequest {
                address: address.as_str(),
            });

        debug!(address = %address, "requesting sign-in nonce");
        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(Rejection::read(response).await.into_error());
        }

        let body: NonceResponse = Self::decode_json(response).await?;
        self.assemble_challenge(body, Utc::now())
    }

    /// Build the challenge from the nonce response, checking every binding
    /// the server supplied against local configuration.
    pub(crate) fn assemble_challenge(
        &self,
        body: NonceResponse,
        now: DateTime<Utc>,
    ) -> Result<Challenge> {
        let config = self.config();

        if let Some(domain) = body.domain.as_deref() {
            if domain != config.domain {
                return Err(AuthError::ConfigMismatch {
                    field: "domain",
                    expected: config.domain.clone(),
                    actual: domain.to_string(),
                });
            }
        }
        if let Some(uri) = body.uri.as_deref() {
            if uri.trim_end_matches('/') != config.uri.trim_end_matches('/') {
                return Err(AuthError::ConfigMismatch {
                    field: "uri",
                    expected: config.uri.clone(),
                    actual: uri.to_string(),
                });
            }
        }
        if let Some(chain_id) = body.chain_id {
            if chain_id != config.chain_id {
                return Err(AuthError::ConfigMismatch {
                    field: "chain id",
                    expected: config.chain_id.to_string(),
                    actual: chain_id.to_string(),
                });
            }
        }

        let issued_at = body.issued_at.unwrap_or(now);
        let expires_at = body
            .expiration_time
            .unwrap_or(issued_at + config.challenge_ttl());

        Challenge::new(
            body.nonce,
            config.domain.clone(),
            config.statement.clone(),
            config.uri.clone(),
            config.chain_id,
            issued_at,
            expires_at,
        )
    }

    /// Submit a signed assertion; on success the backend has consumed the nonce
    ///
    /// POST /api/auth/siwe
    pub async fn verify(&self, assertion: &SignedAssertion) -> Result<Session> {
        let challenge = &assertion.challenge;
        if challenge.is_expired_at(Utc::now()) {
            return Err(AuthError::ChallengeExpired);
        }
        if !self.mark_submitted(&challenge.nonce, challenge.expires_at) {
            warn!(address = %assertion.address, "refusing to resubmit a used challenge");
            return Err(AuthError::ChallengeAlreadyUsed);
        }

        let builder = self
            .request(Method::POST, SIWE_ENDPOINT)?
            .json(&VerifyRequest {
                message: &assertion.message,
                signature: &assertion.signature,
            });

        debug!(address = %assertion.address, "submitting signed assertion");
        let response = builder.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let rejection = Rejection::read(response).await;
            let message = rejection.message();
            return Err(AuthError::from_verify_rejection(
                rejection.body.code.as_deref(),
                &message,
            ));
        }
        if !status.is_success() {
            return Err(Rejection::read(response).await.into_error());
        }

        let body: SiweResponse = Self::decode_json(response).await?;
        let token = body
            .token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                AuthError::InvalidResponse("siwe response missing session token".to_string())
            })?;

        Ok(Session {
            address: assertion.address.clone(),
            tier: body.effective_tier(),
            established_at: Utc::now(),
            transport_marker: TransportMarker::new(token),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::AuthConfig;
    use chrono::Duration;

    fn client() -> AuthClient {
        AuthClient::new(AuthConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            domain: "example.test".to_string(),
            uri: "https://example.test".to_string(),
            chain_id: 534351,
            statement: None,
            challenge_ttl_secs: 300,
        })
        .unwrap()
    }

    fn nonce_only(nonce: &str) -> NonceResponse {
        NonceResponse {
            nonce: nonce.to_string(),
            domain: None,
            uri: None,
            chain_id: None,
            issued_at: None,
            expiration_time: None,
        }
    }

    #[test]
    fn test_assemble_fills_from_config() {
        let now = Utc::now();
        let challenge = client().assemble_challenge(nonce_only("abc123"), now).unwrap();
        assert_eq!(challenge.domain, "example.test");
        assert_eq!(challenge.chain_id, 534351);
        assert_eq!(challenge.issued_at, now);
        assert_eq!(challenge.expires_at, now + Duration::seconds(300));
    }

    #[test]
    fn test_assemble_rejects_wrong_chain() {
        let mut body = nonce_only("abc123");
        body.chain_id = Some(1);
        let err = client().assemble_challenge(body, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            AuthError::ConfigMismatch {
                field: "chain id",
                ..
            }
        ));
    }

    #[test]
    fn test_assemble_rejects_wrong_domain() {
        let mut body = nonce_only("abc123");
        body.domain = Some("evil.test".to_string());
        let err = client().assemble_challenge(body, Utc::now()).unwrap_err();
        assert!(matches!(err, AuthError::ConfigMismatch { field: "domain", .. }));
    }

    #[test]
    fn test_assemble_accepts_uri_with_trailing_slash() {
        let mut body = nonce_only("abc123");
        body.uri = Some("https://example.test/".to_string());
        assert!(client().assemble_challenge(body, Utc::now()).is_ok());
    }

    #[test]
    fn test_assemble_rejects_inverted_server_window() {
        let now = Utc::now();
        let mut body = nonce_only("abc123");
        body.issued_at = Some(now);
        body.expiration_time = Some(now - Duration::seconds(1));
        let err = client().assemble_challenge(body, now).unwrap_err();
        assert!(matches!(err, AuthError::InvalidResponse(_)));
    }
}
