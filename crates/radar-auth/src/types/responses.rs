/*
[INPUT]:  JSON bodies returned by the auth backend
[OUTPUT]: Typed response structs with documented defaults for optional fields
[POS]:    Data layer - response payloads
[UPDATE]: When the auth endpoint contract changes
*/

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::Tier;
use super::models::ChainId;

/// Response of `POST /api/auth/nonce`.
///
/// The backend only guarantees `nonce`; the binding fields are honoured when
/// present and otherwise filled from local configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonceResponse {
    pub nonce: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default, rename = "chainId", alias = "chain_id")]
    pub chain_id: Option<ChainId>,
    #[serde(default, rename = "issuedAt", alias = "issued_at")]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "expirationTime", alias = "expiration_time")]
    pub expiration_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LicenseInfo {
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub tier: Tier,
}

/// Response of `POST /api/auth/siwe`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiweResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub license: Option<LicenseInfo>,
    #[serde(default)]
    pub tier: Option<Tier>,
}

impl SiweResponse {
    /// Tier reported by the backend; top-level `tier` wins over `license.tier`.
    pub fn effective_tier(&self) -> Tier {
        self.tier
            .or_else(|| self.license.as_ref().map(|license| license.tier))
            .unwrap_or_default()
    }
}

/// Response of `GET /api/auth/verify`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyResponse {
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub tier: Tier,
    #[serde(default)]
    pub cached: bool,
}

/// Error body returned with non-2xx statuses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_siwe_response_tier_from_license() {
        let body = serde_json::json!({
            "success": true,
            "token": "jwt",
            "license": {"valid": true, "tier": "premium"}
        });
        let response: SiweResponse = serde_json::from_value(body).unwrap();
        assert_eq!(response.effective_tier(), Tier::Premium);
    }

    #[test]
    fn test_siwe_response_defaults_to_free() {
        let response: SiweResponse = serde_json::from_value(serde_json::json!({"token": "jwt"})).unwrap();
        assert_eq!(response.effective_tier(), Tier::Free);
    }

    #[test]
    fn test_nonce_response_minimal() {
        let response: NonceResponse = serde_json::from_str(r#"{"nonce":"abc123"}"#).unwrap();
        assert_eq!(response.nonce, "abc123");
        assert!(response.chain_id.is_none());
        assert!(response.expiration_time.is_none());
    }
}
