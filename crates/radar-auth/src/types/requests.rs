/*
[INPUT]:  Address and signed assertion values
[OUTPUT]: JSON request bodies for the auth endpoints
[POS]:    Data layer - request payloads
[UPDATE]: When the auth endpoint contract changes
*/

use serde::Serialize;

/// Body of `POST /api/auth/nonce`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NonceRequest<'a> {
    pub address: &'a str,
}

/// Body of `POST /api/auth/siwe`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifyRequest<'a> {
    pub message: &'a str,
    pub signature: &'a str,
}
