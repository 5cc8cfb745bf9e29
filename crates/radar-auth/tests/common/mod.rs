/*
[INPUT]:  Test configuration and mock server requirements
[OUTPUT]: Shared test utilities, fixtures, and mock helpers
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for radar-auth tests

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use radar_auth::{
    Address, AuthClient, AuthConfig, AuthStateMachine, MockWalletSigner, SessionStore,
};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_DOMAIN: &str = "example.test";
pub const TEST_URI: &str = "https://example.test";
pub const TEST_CHAIN_ID: u64 = 534351;
pub const TEST_TOKEN: &str = "session-token-1";
pub const TEST_SIGNATURE: &str = "0xmock_signature";

/// Setup a mock HTTP server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

pub fn test_config(base_url: &str) -> AuthConfig {
    AuthConfig {
        base_url: base_url.to_string(),
        domain: TEST_DOMAIN.to_string(),
        uri: TEST_URI.to_string(),
        chain_id: TEST_CHAIN_ID,
        statement: None,
        challenge_ttl_secs: 300,
    }
}

pub fn test_client(server: &MockServer) -> AuthClient {
    AuthClient::new(test_config(&server.uri())).unwrap()
}

/// Client pointed at a port nothing listens on
pub fn unreachable_client() -> AuthClient {
    AuthClient::new(test_config("http://127.0.0.1:9")).unwrap()
}

/// `0xAAAA...1111`
pub fn address_a() -> Address {
    Address::parse("0xAAAA000000000000000000000000000000001111").unwrap()
}

pub fn address_b() -> Address {
    Address::parse("0xBBBB000000000000000000000000000000002222").unwrap()
}

pub fn mock_signer() -> MockWalletSigner {
    MockWalletSigner::new(address_a(), TEST_SIGNATURE)
}

pub fn machine(
    client: AuthClient,
    signer: &MockWalletSigner,
    store: Arc<dyn SessionStore>,
) -> Arc<AuthStateMachine> {
    AuthStateMachine::new(client, Arc::new(signer.clone()), store)
}

pub fn temp_dir() -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("radar-auth-test-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&path).unwrap();
    path
}

pub async fn mount_nonce(server: &MockServer, nonce: &str) {
    Mock::given(method("POST"))
        .and(path("/api/auth/nonce"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "nonce": nonce })))
        .mount(server)
        .await;
}

pub async fn mount_siwe_success(server: &MockServer, token: &str, tier: &str) {
    Mock::given(method("POST"))
        .and(path("/api/auth/siwe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "token": token,
            "license": { "valid": true, "tier": tier },
        })))
        .mount(server)
        .await;
}

pub async fn mount_verify_session(server: &MockServer, token: &str, address: &Address, tier: &str) {
    Mock::given(method("GET"))
        .and(path("/api/auth/verify"))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "valid": true,
            "address": address.as_str(),
            "tier": tier,
            "cached": false,
        })))
        .mount(server)
        .await;
}

pub async fn mount_logout(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/auth/logout"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .mount(server)
        .await;
}
