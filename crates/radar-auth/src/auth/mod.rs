/*
[INPUT]:  Wallet signers, session stores, nonce/verify client
[OUTPUT]: Auth lifecycle state, sessions, entitlements
[POS]:    Auth layer - signer abstraction, message builder, state machine
[UPDATE]: When auth flow, signer contract or persistence changes
*/

pub mod entitlements;
pub mod evm_wallet;
pub mod machine;
pub mod message;
pub mod store;
pub mod wallet;

pub use entitlements::{Entitlements, EntitlementsCache};
pub use evm_wallet::EvmWalletSigner;
pub use machine::{AuthState, AuthStateMachine, AuthTransition};
pub use message::SiweMessage;
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};
pub use wallet::{MockWalletSigner, SignerEvent, WalletSigner};
