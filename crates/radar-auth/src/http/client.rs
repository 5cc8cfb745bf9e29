/*
[INPUT]:  HTTP configuration (base URL, timeouts) and auth binding configuration
[OUTPUT]: Configured reqwest client ready for auth endpoint calls
[POS]:    HTTP layer - core client implementation
[UPDATE]: When adding connection options or changing client behavior
*/

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::http::{AuthError, Result};
use crate::types::{ChainId, ErrorResponse, TransportMarker};

const DEFAULT_BASE_URL: &str = "http://localhost:5000";
const DEFAULT_DOMAIN: &str = "radar.snelabs.space";
const DEFAULT_URI: &str = "https://radar.snelabs.space";
const DEFAULT_STATEMENT: &str = "Sign in to SNE Radar";
/// Scroll Sepolia
const DEFAULT_CHAIN_ID: ChainId = 534351;
const DEFAULT_CHALLENGE_TTL_SECS: u64 = 5 * 60;
/// Rate-limit window used by the backend when no `Retry-After` is sent
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Backend location and the binding values every challenge must carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default = "default_uri")]
    pub uri: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: ChainId,
    #[serde(default = "default_statement")]
    pub statement: Option<String>,
    #[serde(default = "default_challenge_ttl_secs")]
    pub challenge_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            domain: default_domain(),
            uri: default_uri(),
            chain_id: default_chain_id(),
            statement: default_statement(),
            challenge_ttl_secs: default_challenge_ttl_secs(),
        }
    }
}

impl AuthConfig {
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.base_url)?;
        Url::parse(&self.uri)?;
        if self.domain.trim().is_empty() {
            return Err(AuthError::Config("domain must not be empty".to_string()));
        }
        if self.domain.contains(char::is_whitespace) {
            return Err(AuthError::Config(format!(
                "domain must not contain whitespace: {:?}",
                self.domain
            )));
        }
        if let Some(statement) = &self.statement {
            if statement.contains(['\n', '\r']) {
                return Err(AuthError::Config(
                    "statement must be a single line".to_string(),
                ));
            }
        }
        if self.chain_id == 0 {
            return Err(AuthError::Config("chain_id must be non-zero".to_string()));
        }
        if self.challenge_ttl_secs == 0 {
            return Err(AuthError::Config(
                "challenge_ttl_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn challenge_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.challenge_ttl_secs.min(i64::MAX as u64) as i64)
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

fn default_uri() -> String {
    DEFAULT_URI.to_string()
}

fn default_chain_id() -> ChainId {
    DEFAULT_CHAIN_ID
}

fn default_statement() -> Option<String> {
    Some(DEFAULT_STATEMENT.to_string())
}

fn default_challenge_ttl_secs() -> u64 {
    DEFAULT_CHALLENGE_TTL_SECS
}

/// Typed client for the nonce, verify, session and logout endpoints.
///
/// Performs exactly one remote call per operation; retries are the caller's
/// decision.
#[derive(Debug)]
pub struct AuthClient {
    http_client: Client,
    base_url: Url,
    config: AuthConfig,
    /// Nonces already sent to `verify`, kept until their challenge expires
    submitted_nonces: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl AuthClient {
    /// Create a new client with the default HTTP configuration
    pub fn new(config: AuthConfig) -> Result<Self> {
        Self::with_client_config(config, ClientConfig::default())
    }

    /// Create a new client with a custom HTTP configuration
    pub fn with_client_config(config: AuthConfig, client_config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let http_client = Client::builder()
            .timeout(client_config.timeout)
            .connect_timeout(client_config.connect_timeout)
            .build()
            .map_err(|e| AuthError::Config(format!("failed to build http client: {e}")))?;

        let mut base = config.base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base)?;

        Ok(Self {
            http_client,
            base_url,
            config,
            submitted_nonces: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Record a nonce as submitted; false if it was submitted before.
    ///
    /// Entries for expired challenges are dropped: `verify` rejects an
    /// expired challenge before it ever consults this ledger.
    pub(crate) fn mark_submitted(&self, nonce: &str, expires_at: DateTime<Utc>) -> bool {
        let now = Utc::now();
        let mut guard = self
            .submitted_nonces
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.retain(|_, expiry| *expiry > now);
        if guard.contains_key(nonce) {
            return false;
        }
        guard.insert(nonce.to_string(), expires_at);
        true
    }

    /// Resolve `endpoint` under the base URL; anything outside it is refused
    /// so the transport marker never leaves the configured backend.
    fn url(&self, endpoint: &str) -> Result<Url> {
        let url = self.base_url.join(endpoint.trim_start_matches('/'))?;
        if url.origin() != self.base_url.origin()
            || !url.path().starts_with(self.base_url.path())
        {
            return Err(AuthError::Config(format!(
                "endpoint {endpoint:?} resolves outside {}",
                self.base_url
            )));
        }
        Ok(url)
    }

    pub(crate) fn request(&self, method: Method, endpoint: &str) -> Result<RequestBuilder> {
        let url = self.url(endpoint)?;
        Ok(self.http_client.request(method, url))
    }

    /// Request builder with the transport marker attached as a bearer credential
    pub(crate) fn authorized_request(
        &self,
        method: Method,
        endpoint: &str,
        marker: &TransportMarker,
    ) -> Result<RequestBuilder> {
        Ok(self.request(method, endpoint)?.bearer_auth(marker.expose()))
    }

    pub(crate) async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T> {
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Non-success response, read once so each endpoint can classify it.
#[derive(Debug)]
pub(crate) struct Rejection {
    pub status: StatusCode,
    pub retry_after: u64,
    pub body: ErrorResponse,
}

impl Rejection {
    pub async fn read(response: Response) -> Self {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        let body = match response.bytes().await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => ErrorResponse::default(),
        };

        Self {
            status,
            retry_after,
            body,
        }
    }

    pub fn message(&self) -> String {
        self.body.error.clone().unwrap_or_else(|| {
            self.status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        })
    }

    /// Generic mapping shared by every endpoint.
    pub fn into_error(self) -> AuthError {
        if self.status == StatusCode::TOO_MANY_REQUESTS {
            return AuthError::RateLimit {
                retry_after: self.retry_after,
            };
        }
        let message = self.message();
        AuthError::from_status(self.status, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AuthConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chain_id, 534351);
        assert_eq!(config.challenge_ttl(), chrono::Duration::seconds(300));
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let config = AuthConfig {
            base_url: "not a url".to_string(),
            ..AuthConfig::default()
        };
        assert!(matches!(config.validate(), Err(AuthError::Config(_))));

        let config = AuthConfig {
            chain_id: 0,
            ..AuthConfig::default()
        };
        assert!(matches!(config.validate(), Err(AuthError::Config(_))));
    }

    #[test]
    fn test_url_join_keeps_base_path() {
        let config = AuthConfig {
            base_url: "https://api.example.test/radar".to_string(),
            ..AuthConfig::default()
        };
        let client = AuthClient::new(config).unwrap();
        let url = client.url("/api/auth/nonce").unwrap();
        assert_eq!(url.as_str(), "https://api.example.test/radar/api/auth/nonce");
    }

    #[test]
    fn test_url_stays_on_backend() {
        let config = AuthConfig {
            base_url: "https://api.example.test/radar".to_string(),
            ..AuthConfig::default()
        };
        let client = AuthClient::new(config).unwrap();

        for endpoint in [
            "https://other.example.test/steal",
            "http://api.example.test/radar/api",
            "https://api.example.test:8443/radar/api",
            "../admin",
        ] {
            assert!(
                matches!(client.url(endpoint), Err(AuthError::Config(_))),
                "{endpoint} should be refused"
            );
        }
        assert!(client.url("https://api.example.test/radar/api/me").is_ok());
    }

    #[test]
    fn test_statement_must_be_single_line() {
        let config = AuthConfig {
            statement: Some("Sign in\nURI: https://evil.test".to_string()),
            ..AuthConfig::default()
        };
        assert!(matches!(config.validate(), Err(AuthError::Config(_))));

        let config = AuthConfig {
            statement: None,
            ..AuthConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_nonce_marked_once() {
        let client = AuthClient::new(AuthConfig::default()).unwrap();
        let expires_at = Utc::now() + chrono::Duration::seconds(300);
        assert!(client.mark_submitted("abc123", expires_at));
        assert!(!client.mark_submitted("abc123", expires_at));
    }

    #[test]
    fn test_expired_nonces_are_pruned() {
        let client = AuthClient::new(AuthConfig::default()).unwrap();
        let now = Utc::now();
        assert!(client.mark_submitted("old1", now - chrono::Duration::seconds(1)));
        assert!(client.mark_submitted("fresh1", now + chrono::Duration::seconds(300)));

        let ledger = client.submitted_nonces.lock().unwrap();
        assert!(!ledger.contains_key("old1"));
        assert!(ledger.contains_key("fresh1"));
    }
}
