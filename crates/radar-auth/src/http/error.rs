/*
[INPUT]:  Error sources (signer, HTTP, API status codes, serialization, storage)
[OUTPUT]: Typed auth error taxonomy with retry hints
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or changing status-code mapping
*/

use reqwest::StatusCode;
use thiserror::Error;

/// Main error type for the auth core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No signer capability is present
    #[error("No wallet signer available: {0}")]
    SignerUnavailable(String),

    /// The human declined the request in their wallet
    #[error("Request rejected in wallet")]
    UserRejected,

    /// A connection request is already outstanding in the wallet
    #[error("Wallet is busy with another request")]
    SignerBusy,

    /// The wallet went away while a request was pending
    #[error("Wallet disconnected")]
    SignerDisconnected,

    /// Network failure, timeout, or 5xx
    #[error("Auth backend unavailable: {0}")]
    RemoteUnavailable(String),

    /// 4xx other than the auth-specific ones
    #[error("Auth backend rejected request (status {status}): {message}")]
    RemoteRejected { status: u16, message: String },

    /// Backend could not verify the signature
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Challenge window elapsed before verification
    #[error("Sign-in challenge expired")]
    ChallengeExpired,

    /// Challenge was already submitted once
    #[error("Sign-in challenge already used")]
    ChallengeAlreadyUsed,

    /// Session rejected by an authenticated call
    #[error("Session expired, please sign in again")]
    SessionExpired,

    /// A connect or sign-in is already pending
    #[error("Another authentication attempt is already in progress")]
    AlreadyInProgress,

    /// Challenge binding differs from local configuration
    #[error("Challenge {field} mismatch: expected {expected}, got {actual}")]
    ConfigMismatch {
        field: &'static str,
        expected: String,
        actual: String,
    },

    /// Sign-in attempted without a connected wallet
    #[error("Wallet not connected")]
    NotConnected,

    /// Attempt superseded by sign-out, shutdown, or an account switch
    #[error("Authentication attempt cancelled")]
    Cancelled,

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after}s")]
    RateLimit { retry_after: u64 },

    /// Invalid response from server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Malformed account address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session persistence failed
    #[error("Session storage error: {0}")]
    Storage(String),
}

/// Fieldless discriminant of [`AuthError`] for events and matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorKind {
    SignerUnavailable,
    UserRejected,
    SignerBusy,
    SignerDisconnected,
    RemoteUnavailable,
    RemoteRejected,
    InvalidSignature,
    ChallengeExpired,
    ChallengeAlreadyUsed,
    SessionExpired,
    AlreadyInProgress,
    ConfigMismatch,
    NotConnected,
    Cancelled,
    RateLimit,
    InvalidResponse,
    InvalidAddress,
    Config,
    Storage,
}

impl AuthError {
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            AuthError::SignerUnavailable(_) => AuthErrorKind::SignerUnavailable,
            AuthError::UserRejected => AuthErrorKind::UserRejected,
            AuthError::SignerBusy => AuthErrorKind::SignerBusy,
            AuthError::SignerDisconnected => AuthErrorKind::SignerDisconnected,
            AuthError::RemoteUnavailable(_) => AuthErrorKind::RemoteUnavailable,
            AuthError::RemoteRejected { .. } => AuthErrorKind::RemoteRejected,
            AuthError::InvalidSignature(_) => AuthErrorKind::InvalidSignature,
            AuthError::ChallengeExpired => AuthErrorKind::ChallengeExpired,
            AuthError::ChallengeAlreadyUsed => AuthErrorKind::ChallengeAlreadyUsed,
            AuthError::SessionExpired => AuthErrorKind::SessionExpired,
            AuthError::AlreadyInProgress => AuthErrorKind::AlreadyInProgress,
            AuthError::ConfigMismatch { .. } => AuthErrorKind::ConfigMismatch,
            AuthError::NotConnected => AuthErrorKind::NotConnected,
            AuthError::Cancelled => AuthErrorKind::Cancelled,
            AuthError::RateLimit { .. } => AuthErrorKind::RateLimit,
            AuthError::InvalidResponse(_) => AuthErrorKind::InvalidResponse,
            AuthError::InvalidAddress(_) => AuthErrorKind::InvalidAddress,
            AuthError::Config(_) => AuthErrorKind::Config,
            AuthError::Storage(_) => AuthErrorKind::Storage,
        }
    }

    /// Whether a caller-initiated "try again" makes sense.
    ///
    /// The core itself never retries; each retry mints a fresh challenge.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuthError::RemoteUnavailable(_)
                | AuthError::RateLimit { .. }
                | AuthError::ChallengeExpired
                | AuthError::InvalidResponse(_)
        )
    }

    /// Get retry delay in seconds (if the backend supplied one)
    pub fn retry_delay(&self) -> Option<u64> {
        match self {
            AuthError::RateLimit { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Errors originating in the wallet or from the human
    pub fn is_signer_error(&self) -> bool {
        matches!(
            self,
            AuthError::SignerUnavailable(_)
                | AuthError::UserRejected
                | AuthError::SignerBusy
                | AuthError::SignerDisconnected
        )
    }

    /// Check if error indicates authentication failure
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidSignature(_)
                | AuthError::ChallengeExpired
                | AuthError::ChallengeAlreadyUsed
                | AuthError::SessionExpired
        )
    }

    /// Map a non-success status from the nonce endpoint
    pub fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        if status.is_server_error() {
            AuthError::RemoteUnavailable(format!("status {}: {message}", status.as_u16()))
        } else {
            AuthError::RemoteRejected {
                status: status.as_u16(),
                message,
            }
        }
    }

    /// Classify a 401/403 body returned by the verification endpoint.
    ///
    /// The backend answers "Invalid or expired nonce" both for a consumed
    /// nonce and for a timed-out one. `verify` never submits a challenge that
    /// is already expired locally, so that answer is read as already used.
    pub fn from_verify_rejection(code: Option<&str>, message: &str) -> Self {
        match code {
            Some("nonce_used") => return AuthError::ChallengeAlreadyUsed,
            Some("nonce_expired") => return AuthError::ChallengeExpired,
            Some("invalid_signature") => return AuthError::InvalidSignature(message.to_string()),
            _ => {}
        }

        let lowered = message.to_ascii_lowercase();
        let unknown_nonce = lowered.contains("invalid") && lowered.contains("nonce");
        if lowered.contains("used") || unknown_nonce {
            AuthError::ChallengeAlreadyUsed
        } else if lowered.contains("expired") {
            AuthError::ChallengeExpired
        } else {
            AuthError::InvalidSignature(message.to_string())
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AuthError::InvalidResponse(err.to_string())
        } else if err.is_builder() {
            AuthError::Config(err.to_string())
        } else {
            AuthError::RemoteUnavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::InvalidResponse(err.to_string())
    }
}

impl From<url::ParseError> for AuthError {
    fn from(err: url::ParseError) -> Self {
        AuthError::Config(format!("invalid url: {err}"))
    }
}

/// Result type alias for auth operations
pub type Result<T> = std::result::Result<T, AuthError>;
