/*
[INPUT]:  Public API exports for the radar-auth command line front end
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod config;
pub mod signer;

// Re-export main types for convenience
pub use config::{default_session_path, load_auth_config};
pub use signer::{NoWalletSigner, PromptingSigner};
