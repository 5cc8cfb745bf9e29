/*
[INPUT]:  Auth configuration, addresses, signed assertions, transport markers
[OUTPUT]: Typed results from the auth backend
[POS]:    HTTP layer - nonce/verify client
[UPDATE]: When adding new endpoints or changing client behavior
*/

pub mod client;
pub mod error;
pub mod session;
pub mod siwe;

pub use error::{AuthError, AuthErrorKind, Result};

pub use client::{AuthClient, AuthConfig, ClientConfig};
