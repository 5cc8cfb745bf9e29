/*
[INPUT]:  Local EVM key, terminal confirmation
[OUTPUT]: Wallet signers usable by the auth state machine from a terminal
[POS]:    Signer layer - human-in-the-loop wrapper around the local key signer
[UPDATE]: When the approval prompt or signer wiring changes
*/

use async_trait::async_trait;
use console::style;
use dialoguer::Confirm;
use dialoguer::theme::ColorfulTheme;
use radar_auth::{Address, AuthError, EvmWalletSigner, SignerEvent, WalletSigner};
use tokio::sync::broadcast;
use tracing::info;

/// Local key signer that shows the exact message and waits for approval.
///
/// Declining maps to `UserRejected`. With `auto_approve` the prompt is
/// skipped and the message is only printed.
pub struct PromptingSigner {
    inner: EvmWalletSigner,
    auto_approve: bool,
}

impl PromptingSigner {
    pub fn new(inner: EvmWalletSigner, auto_approve: bool) -> Self {
        Self {
            inner,
            auto_approve,
        }
    }

    pub fn address(&self) -> &Address {
        self.inner.address()
    }
}

#[async_trait]
impl WalletSigner for PromptingSigner {
    async fn connect(&self, preferred_connector: Option<&str>) -> radar_auth::Result<Address> {
        self.inner.connect(preferred_connector).await
    }

    async fn sign_message(&self, message: &str) -> radar_auth::Result<String> {
        println!("\n{}", style("--- Sign-in request ---").bold());
        println!("{}", style(message).cyan());
        println!("{}", style("----------------------").bold());

        if !self.auto_approve {
            let approved = tokio::task::spawn_blocking(|| {
                Confirm::with_theme(&ColorfulTheme::default())
                    .with_prompt("Sign this message?")
                    .default(false)
                    .interact()
            })
            .await
            .map_err(|e| AuthError::SignerUnavailable(format!("prompt task failed: {e}")))?
            .map_err(|e| AuthError::SignerUnavailable(format!("prompt failed: {e}")))?;

            if !approved {
                info!("signature declined at prompt");
                return Err(AuthError::UserRejected);
            }
        }

        self.inner.sign_message(message).await
    }

    fn subscribe(&self) -> broadcast::Receiver<SignerEvent> {
        self.inner.subscribe()
    }
}

/// Signer for commands that never touch a wallet (`status`, `logout`)
pub struct NoWalletSigner {
    events: broadcast::Sender<SignerEvent>,
}

impl Default for NoWalletSigner {
    fn default() -> Self {
        let (events, _) = broadcast::channel(1);
        Self { events }
    }
}

#[async_trait]
impl WalletSigner for NoWalletSigner {
    async fn connect(&self, _preferred_connector: Option<&str>) -> radar_auth::Result<Address> {
        Err(AuthError::SignerUnavailable(
            "no wallet configured for this command".to_string(),
        ))
    }

    async fn sign_message(&self, _message: &str) -> radar_auth::Result<String> {
        Err(AuthError::SignerDisconnected)
    }

    fn subscribe(&self) -> broadcast::Receiver<SignerEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[tokio::test]
    async fn test_auto_approve_signs() {
        let signer = PromptingSigner::new(EvmWalletSigner::new(TEST_KEY).unwrap(), true);
        let address = signer.connect(None).await.unwrap();
        assert_eq!(&address, signer.address());

        let signature = signer.sign_message("hello").await.unwrap();
        assert_eq!(signature.len(), 132);
    }

    #[tokio::test]
    async fn test_no_wallet_signer() {
        let signer = NoWalletSigner::default();
        assert!(matches!(
            signer.connect(None).await,
            Err(AuthError::SignerUnavailable(_))
        ));
        assert_eq!(
            signer.sign_message("m").await.unwrap_err(),
            AuthError::SignerDisconnected
        );
    }
}
