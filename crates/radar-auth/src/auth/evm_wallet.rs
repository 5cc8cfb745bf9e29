/*
[INPUT]:  EVM private key (hex string)
[OUTPUT]: EIP-191 personal-sign signatures and checksummed address
[POS]:    Auth layer - local EVM wallet implementation
[UPDATE]: When signing logic or EVM address formatting changes
*/

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use crate::auth::{SignerEvent, WalletSigner};
use crate::http::{AuthError, Result};
use crate::types::Address;

/// Signer backed by a locally held EVM key.
///
/// Development and automation collaborator: signs without a human prompt.
pub struct EvmWalletSigner {
    signer: PrivateKeySigner,
    address: Address,
    connected: AtomicBool,
    events: broadcast::Sender<SignerEvent>,
}

impl EvmWalletSigner {
    /// Create a new EVM wallet signer from a hex-encoded private key
    ///
    /// Supports both "0x"-prefixed and non-prefixed hex strings.
    pub fn new(private_key_hex: &str) -> Result<Self> {
        let private_key_hex = private_key_hex.trim();
        let private_key_hex = private_key_hex
            .strip_prefix("0x")
            .unwrap_or(private_key_hex);
        let signer = PrivateKeySigner::from_str(private_key_hex)
            .map_err(|e| AuthError::Config(format!("Invalid EVM private key: {e}")))?;

        let address = Address::parse(&signer.address().to_checksum(None))?;
        let (events, _) = broadcast::channel(16);

        Ok(Self {
            signer,
            address,
            connected: AtomicBool::new(false),
            events,
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Drop the connection and notify subscribers
    pub fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(SignerEvent::Disconnected);
        }
    }
}

#[async_trait]
impl WalletSigner for EvmWalletSigner {
    async fn connect(&self, _preferred_connector: Option<&str>) -> Result<Address> {
        self.connected.store(true, Ordering::SeqCst);
        debug!(address = %self.address, "local evm signer connected");
        Ok(self.address.clone())
    }

    async fn sign_message(&self, message: &str) -> Result<String> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(AuthError::SignerDisconnected);
        }

        let signature = self
            .signer
            .sign_message(message.as_bytes())
            .await
            .map_err(|e| AuthError::SignerUnavailable(format!("Failed to sign EVM message: {e}")))?;

        // alloy's Signature as_bytes() returns [r, s, v]
        Ok(format!("0x{}", hex::encode(signature.as_bytes())))
    }

    fn subscribe(&self) -> broadcast::Receiver<SignerEvent> {
        self.events.subscribe()
    }
}
