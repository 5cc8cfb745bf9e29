/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public wallet sign-in crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod auth;
pub mod http;
pub mod types;

// Re-export commonly used types from auth
pub use auth::{
    AuthState,
    AuthStateMachine,
    AuthTransition,
    Entitlements,
    EntitlementsCache,
    EvmWalletSigner,
    FileSessionStore,
    MemorySessionStore,
    MockWalletSigner,
    SessionStore,
    SignerEvent,
    SiweMessage,
    WalletSigner,
};

// Re-export commonly used types from http
pub use http::{
    AuthClient,
    AuthConfig,
    AuthError,
    AuthErrorKind,
    ClientConfig,
    Result,
};

// Re-export all types
pub use types::*;
