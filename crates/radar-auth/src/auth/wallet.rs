/*
[INPUT]:  Connection requests, messages to sign, wallet-side account changes
[OUTPUT]: Addresses, signature strings, asynchronous signer events
[POS]:    Auth layer - wallet integration abstraction
[UPDATE]: When adding new wallet types or changing signature format
*/

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::{Semaphore, broadcast};

use crate::http::{AuthError, Result};
use crate::types::Address;

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Notification pushed by the wallet independently of any pending call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerEvent {
    AddressChanged(Address),
    Disconnected,
}

/// Trait for wallet signing operations
///
/// Implementations wrap an external, human-operated signer. Calls may suspend
/// until the human responds; implementations impose no timeout of their own.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Request the active account.
    ///
    /// Fails with `SignerUnavailable`, `UserRejected`, or `SignerBusy`.
    async fn connect(&self, preferred_connector: Option<&str>) -> Result<Address>;

    /// Sign a message and return the hex-encoded signature (0x...).
    ///
    /// Fails with `UserRejected` or `SignerDisconnected`.
    async fn sign_message(&self, message: &str) -> Result<String>;

    /// Subscribe to account changes and disconnects.
    fn subscribe(&self) -> broadcast::Receiver<SignerEvent>;
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug)]
struct MockState {
    address: Mutex<Option<Address>>,
    signature: Mutex<String>,
    connect_failures: Mutex<VecDeque<AuthError>>,
    sign_failures: Mutex<VecDeque<AuthError>>,
    connect_gate: Mutex<Option<Arc<Semaphore>>>,
    sign_gate: Mutex<Option<Arc<Semaphore>>>,
    signed_messages: Mutex<Vec<String>>,
    connect_calls: AtomicUsize,
    events: broadcast::Sender<SignerEvent>,
}

/// Scriptable signer for tests and demos
///
/// Returns a predetermined signature, can queue failures, and can hold
/// signatures until released to simulate a human taking their time.
#[derive(Debug, Clone)]
pub struct MockWalletSigner {
    state: Arc<MockState>,
}

impl MockWalletSigner {
    /// Create a new mock signer with predetermined signature
    pub fn new(address: Address, signature: impl Into<String>) -> Self {
        Self::with_address(Some(address), signature.into())
    }

    /// A mock with no wallet installed; `connect` fails with `SignerUnavailable`.
    pub fn unavailable() -> Self {
        Self::with_address(None, String::new())
    }

    fn with_address(address: Option<Address>, signature: String) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(MockState {
                address: Mutex::new(address),
                signature: Mutex::new(signature),
                connect_failures: Mutex::new(VecDeque::new()),
                sign_failures: Mutex::new(VecDeque::new()),
                connect_gate: Mutex::new(None),
                sign_gate: Mutex::new(None),
                signed_messages: Mutex::new(Vec::new()),
                connect_calls: AtomicUsize::new(0),
                events,
            }),
        }
    }

    /// Fail the next `connect` with `err`
    pub fn fail_next_connect(&self, err: AuthError) {
        lock(&self.state.connect_failures).push_back(err);
    }

    /// Fail the next `sign_message` with `err`
    pub fn fail_next_sign(&self, err: AuthError) {
        lock(&self.state.sign_failures).push_back(err);
    }

    pub fn set_signature(&self, signature: impl Into<String>) {
        *lock(&self.state.signature) = signature.into();
    }

    /// Hold every subsequent connection until [`MockWalletSigner::release_connect`].
    pub fn hold_connects(&self) {
        *lock(&self.state.connect_gate) = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let one held connection complete
    pub fn release_connect(&self) {
        if let Some(gate) = lock(&self.state.connect_gate).as_ref() {
            gate.add_permits(1);
        }
    }

    /// Hold every subsequent signature until [`MockWalletSigner::release_signature`].
    pub fn hold_signatures(&self) {
        *lock(&self.state.sign_gate) = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let one held signature complete
    pub fn release_signature(&self) {
        if let Some(gate) = lock(&self.state.sign_gate).as_ref() {
            gate.add_permits(1);
        }
    }

    /// Switch the active account and notify subscribers
    pub fn switch_account(&self, address: Address) {
        *lock(&self.state.address) = Some(address.clone());
        let _ = self.state.events.send(SignerEvent::AddressChanged(address));
    }

    /// Simulate the wallet going away
    pub fn disconnect(&self) {
        let _ = self.state.events.send(SignerEvent::Disconnected);
    }

    pub fn connect_calls(&self) -> usize {
        self.state.connect_calls.load(Ordering::SeqCst)
    }

    /// Messages that reached the signing step, in order
    pub fn signed_messages(&self) -> Vec<String> {
        lock(&self.state.signed_messages).clone()
    }
}

async fn wait_at(gate: &Mutex<Option<Arc<Semaphore>>>) -> Result<()> {
    let gate = lock(gate).clone();
    if let Some(gate) = gate {
        let permit = gate
            .acquire()
            .await
            .map_err(|_| AuthError::SignerDisconnected)?;
        permit.forget();
    }
    Ok(())
}

#[async_trait]
impl WalletSigner for MockWalletSigner {
    async fn connect(&self, _preferred_connector: Option<&str>) -> Result<Address> {
        self.state.connect_calls.fetch_add(1, Ordering::SeqCst);
        wait_at(&self.state.connect_gate).await?;
        if let Some(err) = lock(&self.state.connect_failures).pop_front() {
            return Err(err);
        }
        lock(&self.state.address)
            .clone()
            .ok_or_else(|| AuthError::SignerUnavailable("no wallet installed".to_string()))
    }

    async fn sign_message(&self, message: &str) -> Result<String> {
        lock(&self.state.signed_messages).push(message.to_string());

        wait_at(&self.state.sign_gate).await?;

        if let Some(err) = lock(&self.state.sign_failures).pop_front() {
            return Err(err);
        }
        Ok(lock(&self.state.signature).clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<SignerEvent> {
        self.state.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> Address {
        Address::parse("0x1234567890abcdef1234567890abcdef12345678").unwrap()
    }

    #[tokio::test]
    async fn test_mock_signer() {
        let signer = MockWalletSigner::new(address(), "0xmock_signature");

        assert_eq!(signer.connect(None).await.unwrap(), address());
        let signature = signer.sign_message("test message").await.unwrap();
        assert_eq!(signature, "0xmock_signature");
        assert_eq!(signer.signed_messages(), vec!["test message".to_string()]);
        assert_eq!(signer.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_signer_queued_failures() {
        let signer = MockWalletSigner::new(address(), "0xsig");
        signer.fail_next_connect(AuthError::UserRejected);
        signer.fail_next_sign(AuthError::SignerDisconnected);

        assert_eq!(signer.connect(None).await.unwrap_err(), AuthError::UserRejected);
        assert!(signer.connect(None).await.is_ok());
        assert_eq!(
            signer.sign_message("m").await.unwrap_err(),
            AuthError::SignerDisconnected
        );
        assert!(signer.sign_message("m").await.is_ok());
    }

    #[tokio::test]
    async fn test_unavailable_signer() {
        let signer = MockWalletSigner::unavailable();
        assert!(matches!(
            signer.connect(None).await,
            Err(AuthError::SignerUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_switch_account_emits_event() {
        let signer = MockWalletSigner::new(address(), "0xsig");
        let mut events = signer.subscribe();
        let other = Address::parse("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb").unwrap();

        signer.switch_account(other.clone());
        assert_eq!(events.recv().await.unwrap(), SignerEvent::AddressChanged(other));
    }
}
