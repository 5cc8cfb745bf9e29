/*
[INPUT]:  Signer output, backend payloads, configuration values
[OUTPUT]: Address, Challenge, SignedAssertion, Session, TransportMarker, EntitlementsSnapshot
[POS]:    Data layer - core domain model of the auth flow
[UPDATE]: When the challenge fields or session shape change
*/

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::Tier;
use crate::http::{AuthError, Result};

/// EVM chain identifier (EIP-155).
pub type ChainId = u64;

/// Hex account identifier supplied by the signer.
///
/// The original spelling (e.g. an EIP-55 checksum) is preserved for message
/// building; equality and hashing ignore case and the `0x` prefix.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    const HEX_LEN: usize = 40;

    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| AuthError::InvalidAddress(format!("missing 0x prefix: {trimmed}")))?;

        if hex_part.len() != Self::HEX_LEN || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AuthError::InvalidAddress(format!(
                "expected 40 hex digits: {trimmed}"
            )));
        }

        Ok(Self(format!("0x{hex_part}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase hex digits without the prefix.
    pub fn normalized(&self) -> String {
        self.0[2..].to_ascii_lowercase()
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.0[2..].eq_ignore_ascii_case(&other.0[2..])
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Address {
    type Error = AuthError;

    fn try_from(value: String) -> Result<Self> {
        Address::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

/// Opaque session credential owned by the transport.
///
/// Never parsed by the auth core and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransportMarker(String);

impl TransportMarker {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Raw value for attaching to requests or persisting.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for TransportMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TransportMarker(<redacted>)")
    }
}

/// Server-issued, single-use sign-in challenge plus its binding metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub nonce: String,
    pub domain: String,
    pub statement: Option<String>,
    pub uri: String,
    pub chain_id: ChainId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Challenge {
    pub const VERSION: &'static str = "1";

    /// Build a challenge, enforcing nonce shape and `expires_at > issued_at`.
    pub fn new(
        nonce: impl Into<String>,
        domain: impl Into<String>,
        statement: Option<String>,
        uri: impl Into<String>,
        chain_id: ChainId,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Self> {
        let nonce = nonce.into();
        if nonce.is_empty() || !nonce.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AuthError::InvalidResponse(format!(
                "nonce must be non-empty ascii alphanumeric, got {nonce:?}"
            )));
        }
        if expires_at <= issued_at {
            return Err(AuthError::InvalidResponse(format!(
                "challenge expires at {expires_at} which is not after issued at {issued_at}"
            )));
        }

        Ok(Self {
            nonce,
            domain: domain.into(),
            statement: statement.filter(|s| !s.trim().is_empty()),
            uri: uri.into(),
            chain_id,
            issued_at,
            expires_at,
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Signed challenge text ready for `verify`.
#[derive(Debug, Clone)]
pub struct SignedAssertion {
    pub challenge: Challenge,
    pub address: Address,
    pub message: String,
    pub signature: String,
}

/// Authenticated, tiered session established by a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub address: Address,
    pub tier: Tier,
    pub established_at: DateTime<Utc>,
    pub transport_marker: TransportMarker,
}

/// Read-only feature/limit view derived from the current session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitlementsSnapshot {
    pub tier: Tier,
    pub address: Option<Address>,
    pub features: BTreeSet<String>,
    pub limits: BTreeMap<String, u64>,
}

impl EntitlementsSnapshot {
    /// Sentinel stored in `limits` for "no limit".
    pub const UNLIMITED: u64 = u64::MAX;

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }

    /// Limit for `name`; unknown limits are zero.
    pub fn limit(&self, name: &str) -> u64 {
        self.limits.get(name).copied().unwrap_or(0)
    }

    pub fn is_unlimited(&self, name: &str) -> bool {
        self.limit(name) == Self::UNLIMITED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_address_parse_and_case_insensitive_eq() {
        let a = Address::parse("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266").unwrap();
        let b = Address::parse("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
    }

    #[test]
    fn test_address_rejects_bad_input() {
        assert!(Address::parse("f39fd6e51aad88f6f4ce6ab8827279cfffb92266").is_err());
        assert!(Address::parse("0x1234").is_err());
        assert!(Address::parse("0xzz9fd6e51aad88f6f4ce6ab8827279cfffb92266").is_err());
    }

    #[test]
    fn test_marker_debug_is_redacted() {
        let marker = TransportMarker::new("secret-token");
        assert!(!format!("{marker:?}").contains("secret"));
    }

    #[test]
    fn test_challenge_rejects_inverted_window() {
        let now = Utc::now();
        let err = Challenge::new("abc123", "example.test", None, "https://example.test", 1, now, now)
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidResponse(_)));

        let ok = Challenge::new(
            "abc123",
            "example.test",
            None,
            "https://example.test",
            1,
            now,
            now + Duration::seconds(300),
        )
        .unwrap();
        assert!(!ok.is_expired_at(now));
        assert!(ok.is_expired_at(now + Duration::seconds(300)));
    }

    #[test]
    fn test_challenge_rejects_non_alphanumeric_nonce() {
        let now = Utc::now();
        let err = Challenge::new(
            "abc-123",
            "example.test",
            None,
            "https://example.test",
            1,
            now,
            now + Duration::seconds(60),
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::InvalidResponse(_)));
    }
}
