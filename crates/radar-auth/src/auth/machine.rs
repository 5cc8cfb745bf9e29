/*
[INPUT]:  Wallet signer, nonce/verify client, session store, signer events
[OUTPUT]: Authoritative auth state, session, entitlements and transition feed
[POS]:    Auth layer - orchestrates the connect / sign-in / sign-out lifecycle
[UPDATE]: When lifecycle states, guards or teardown rules change
*/

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};

use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::entitlements::EntitlementsCache;
use crate::auth::message::SiweMessage;
use crate::auth::store::SessionStore;
use crate::auth::wallet::{SignerEvent, WalletSigner, lock};
use crate::http::{AuthClient, AuthError, Result};
use crate::types::{Address, EntitlementsSnapshot, Session, SignedAssertion, TransportMarker};

const TRANSITION_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle state. Only [`AuthStateMachine`] produces these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Disconnected,
    Connecting,
    Connected { address: Address },
    Challenging { address: Address },
    AwaitingSignature { address: Address },
    Verifying { address: Address },
    Authenticated { session: Session },
}

impl AuthState {
    pub fn name(&self) -> &'static str {
        match self {
            AuthState::Disconnected => "disconnected",
            AuthState::Connecting => "connecting",
            AuthState::Connected { .. } => "connected",
            AuthState::Challenging { .. } => "challenging",
            AuthState::AwaitingSignature { .. } => "awaiting_signature",
            AuthState::Verifying { .. } => "verifying",
            AuthState::Authenticated { .. } => "authenticated",
        }
    }

    pub fn address(&self) -> Option<&Address> {
        match self {
            AuthState::Disconnected | AuthState::Connecting => None,
            AuthState::Connected { address }
            | AuthState::Challenging { address }
            | AuthState::AwaitingSignature { address }
            | AuthState::Verifying { address } => Some(address),
            AuthState::Authenticated { session } => Some(&session.address),
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthState::Authenticated { session } => Some(session),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated { .. })
    }

    /// A sign-in chain is running
    pub fn is_signing_in(&self) -> bool {
        matches!(
            self,
            AuthState::Challenging { .. }
                | AuthState::AwaitingSignature { .. }
                | AuthState::Verifying { .. }
        )
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthState::Authenticated { session } => {
                write!(f, "authenticated as {} ({})", session.address, session.tier)
            }
            other => match other.address() {
                Some(address) => write!(f, "{} ({address})", other.name()),
                None => f.write_str(other.name()),
            },
        }
    }
}

/// One observed state change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTransition {
    pub from: AuthState,
    pub to: AuthState,
}

#[derive(Debug)]
struct Inner {
    state: AuthState,
    /// Bumped whenever in-flight work must be abandoned
    generation: u64,
    /// Wallet account, tracked separately from the session it may back
    wallet_address: Option<Address>,
    /// Generation of the wallet connect currently awaiting the signer
    pending_connect: Option<u64>,
}

/// Single owner of the session, the persisted marker and the entitlements view.
///
/// `connect` and `sign_in` are each at-most-one in flight. Every suspension
/// point re-checks the attempt's generation, so work abandoned by sign-out,
/// shutdown or an account switch never writes state on late completion.
pub struct AuthStateMachine {
    client: Arc<AuthClient>,
    signer: Arc<dyn WalletSigner>,
    store: Arc<dyn SessionStore>,
    inner: Mutex<Inner>,
    entitlements: EntitlementsCache,
    transitions: broadcast::Sender<AuthTransition>,
    shutdown: CancellationToken,
}

impl fmt::Debug for AuthStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthStateMachine")
            .field("state", &self.state())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl AuthStateMachine {
    pub fn new(
        client: AuthClient,
        signer: Arc<dyn WalletSigner>,
        store: Arc<dyn SessionStore>,
    ) -> Arc<Self> {
        let (transitions, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);
        Arc::new(Self {
            client: Arc::new(client),
            signer,
            store,
            inner: Mutex::new(Inner {
                state: AuthState::Disconnected,
                generation: 0,
                wallet_address: None,
                pending_connect: None,
            }),
            entitlements: EntitlementsCache::new(),
            transitions,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn client(&self) -> &AuthClient {
        &self.client
    }

    pub fn state(&self) -> AuthState {
        lock(&self.inner).state.clone()
    }

    pub fn session(&self) -> Option<Session> {
        lock(&self.inner).state.session().cloned()
    }

    pub fn wallet_address(&self) -> Option<Address> {
        lock(&self.inner).wallet_address.clone()
    }

    pub fn entitlements(&self) -> EntitlementsSnapshot {
        self.entitlements.snapshot()
    }

    pub fn subscribe_entitlements(&self) -> watch::Receiver<EntitlementsSnapshot> {
        self.entitlements.subscribe()
    }

    pub fn subscribe_transitions(&self) -> broadcast::Receiver<AuthTransition> {
        self.transitions.subscribe()
    }

    /// Token cancelled by [`AuthStateMachine::shutdown`]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Restore a persisted session without touching the wallet.
    ///
    /// A marker the backend no longer accepts, or that cannot be checked, is
    /// cleared and the machine stays `Disconnected`.
    pub async fn boot(&self) -> Result<Option<Session>> {
        let attempt = {
            let mut inner = lock(&self.inner);
            if inner.state != AuthState::Disconnected {
                return Ok(inner.state.session().cloned());
            }
            inner.generation += 1;
            inner.generation
        };

        let Some(marker) = self.store.load() else {
            debug!("no persisted session");
            return Ok(None);
        };

        let verified = self.step(attempt, self.client.verify_session(&marker)).await;

        let mut inner = lock(&self.inner);
        if inner.generation != attempt {
            return Err(AuthError::Cancelled);
        }
        match verified {
            Ok(Some(session)) => {
                info!(address = %session.address, tier = %session.tier, "restored persisted session");
                self.transition(
                    &mut inner,
                    AuthState::Authenticated {
                        session: session.clone(),
                    },
                );
                Ok(Some(session))
            }
            Ok(None) => {
                info!("persisted session no longer valid, discarding");
                self.clear_store();
                Ok(None)
            }
            Err(err) => {
                warn!(error = %err, "could not verify persisted session, discarding");
                self.clear_store();
                Ok(None)
            }
        }
    }

    /// Ask the wallet for its active account.
    ///
    /// Already connected: returns the current account without prompting.
    pub async fn connect(&self, preferred_connector: Option<&str>) -> Result<Address> {
        let attempt = {
            let mut inner = lock(&self.inner);
            // Abandoned connects (older generation) do not block a new one
            if inner.pending_connect == Some(inner.generation) {
                return Err(AuthError::AlreadyInProgress);
            }
            match &inner.state {
                AuthState::Connecting => return Err(AuthError::AlreadyInProgress),
                AuthState::Disconnected => {}
                state => {
                    if let Some(address) = inner.wallet_address.clone() {
                        return Ok(address);
                    }
                    // Session restored at boot, wallet never connected
                    debug!(state = state.name(), "connecting wallet alongside restored session");
                }
            }
            inner.generation += 1;
            if inner.state == AuthState::Disconnected {
                self.transition(&mut inner, AuthState::Connecting);
            }
            inner.pending_connect = Some(inner.generation);
            inner.generation
        };

        let result = self
            .step(attempt, self.signer.connect(preferred_connector))
            .await;

        let mut inner = lock(&self.inner);
        if inner.pending_connect == Some(attempt) {
            inner.pending_connect = None;
        }
        if inner.generation != attempt {
            return Err(AuthError::Cancelled);
        }
        match result {
            Ok(address) => {
                info!(address = %address, "wallet connected");
                inner.wallet_address = Some(address.clone());
                let restored = inner.state.session().map(|session| session.address.clone());
                match restored {
                    Some(session_address) if session_address != address => {
                        let stale = self.end_session(&mut inner, AuthState::Connected {
                            address: address.clone(),
                        });
                        drop(inner);
                        self.clear_store();
                        self.spawn_logout(stale, "wallet account differs from restored session");
                    }
                    Some(_) => {}
                    None => self.transition(&mut inner, AuthState::Connected {
                        address: address.clone(),
                    }),
                }
                Ok(address)
            }
            Err(err) => {
                warn!(error = %err, "wallet connection failed");
                if inner.state == AuthState::Connecting {
                    self.transition(&mut inner, AuthState::Disconnected);
                }
                Err(err)
            }
        }
    }

    /// Run nonce, signature and verification for the connected account.
    ///
    /// Any failure returns to `Connected`; the challenge is never reused.
    pub async fn sign_in(&self) -> Result<Session> {
        let (attempt, address) = {
            let mut inner = lock(&self.inner);
            let address = match &inner.state {
                AuthState::Authenticated { session } => return Ok(session.clone()),
                AuthState::Connected { address } => address.clone(),
                AuthState::Challenging { .. }
                | AuthState::AwaitingSignature { .. }
                | AuthState::Verifying { .. } => return Err(AuthError::AlreadyInProgress),
                AuthState::Disconnected | AuthState::Connecting => {
                    return Err(AuthError::NotConnected);
                }
            };
            inner.generation += 1;
            self.transition(&mut inner, AuthState::Challenging {
                address: address.clone(),
            });
            (inner.generation, address)
        };

        let result = self.run_sign_in(attempt, &address).await;

        let mut inner = lock(&self.inner);
        if inner.generation != attempt {
            if result.is_ok() {
                warn!(address = %address, "discarding session from abandoned sign-in");
            }
            return Err(AuthError::Cancelled);
        }
        match result {
            Ok(session) => {
                info!(address = %session.address, tier = %session.tier, "signed in");
                if let Err(err) = self.store.save(&session.transport_marker) {
                    warn!(error = %err, "failed to persist session marker");
                }
                self.transition(&mut inner, AuthState::Authenticated {
                    session: session.clone(),
                });
                Ok(session)
            }
            Err(err) => {
                warn!(address = %address, error = %err, "sign-in failed");
                self.transition(&mut inner, AuthState::Connected { address });
                Err(err)
            }
        }
    }

    async fn run_sign_in(&self, attempt: u64, address: &Address) -> Result<Session> {
        let challenge = self
            .step(attempt, self.client.request_nonce(address))
            .await?;
        self.advance(attempt, AuthState::AwaitingSignature {
            address: address.clone(),
        })?;

        let message = SiweMessage::build(&challenge, address);
        let signature = self
            .step(attempt, self.signer.sign_message(&message))
            .await?;
        self.advance(attempt, AuthState::Verifying {
            address: address.clone(),
        })?;

        let assertion = SignedAssertion {
            challenge,
            address: address.clone(),
            message,
            signature,
        };
        self.step(attempt, self.client.verify(&assertion)).await
    }

    /// End the session locally, then tell the backend.
    ///
    /// Always reaches `Disconnected`; remote failures are only logged.
    pub async fn sign_out(&self) -> Result<()> {
        let marker = {
            let mut inner = lock(&self.inner);
            inner.wallet_address = None;
            self.end_session(&mut inner, AuthState::Disconnected)
        };
        self.clear_store();

        if let Some(marker) = marker {
            if let Err(err) = self.client.logout(Some(&marker)).await {
                warn!(error = %err, "remote logout failed, local session already cleared");
            }
        }
        info!("signed out");
        Ok(())
    }

    /// Apply a wallet notification
    pub fn handle_signer_event(&self, event: SignerEvent) {
        match event {
            SignerEvent::AddressChanged(address) => self.handle_address_changed(address),
            SignerEvent::Disconnected => {
                let marker = {
                    let mut inner = lock(&self.inner);
                    if inner.state == AuthState::Disconnected && inner.wallet_address.is_none() {
                        return;
                    }
                    info!("wallet disconnected");
                    inner.wallet_address = None;
                    self.end_session(&mut inner, AuthState::Disconnected)
                };
                if marker.is_some() {
                    self.clear_store();
                }
                self.spawn_logout(marker, "wallet disconnected");
            }
        }
    }

    fn handle_address_changed(&self, address: Address) {
        let marker = {
            let mut inner = lock(&self.inner);
            // A pending connect reports its own result
            if matches!(inner.state, AuthState::Disconnected | AuthState::Connecting) {
                return;
            }
            let current = inner.state.address().cloned();
            inner.wallet_address = Some(address.clone());
            if current.as_ref() == Some(&address) {
                return;
            }
            info!(
                from = ?current,
                to = %address,
                state = inner.state.name(),
                "wallet account changed"
            );
            self.end_session(&mut inner, AuthState::Connected { address })
        };
        if marker.is_some() {
            self.clear_store();
        }
        self.spawn_logout(marker, "wallet account changed");
    }

    /// Forward signer events to the machine until shutdown
    pub fn spawn_signer_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.signer.subscribe();
        let machine: Weak<Self> = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => event,
                };
                match event {
                    Ok(event) => match machine.upgrade() {
                        Some(machine) => machine.handle_signer_event(event),
                        None => break,
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "signer event listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("signer event listener stopped");
        })
    }

    /// GET `endpoint` with the session marker attached.
    ///
    /// A 401/403 expires the session before the error is returned.
    pub async fn authorized_get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let marker = self
            .session()
            .map(|session| session.transport_marker)
            .ok_or(AuthError::NotConnected)?;

        let result = self.client.get_json(endpoint, &marker).await;
        if matches!(result, Err(AuthError::SessionExpired)) {
            self.expire(&marker);
        }
        result
    }

    /// Report a 401 seen on some other transport; the current session is torn down.
    pub fn report_unauthorized(&self) {
        if let Some(session) = self.session() {
            self.expire(&session.transport_marker);
        }
    }

    fn expire(&self, marker: &TransportMarker) {
        let stale = {
            let mut inner = lock(&self.inner);
            match inner.state.session() {
                Some(session) if session.transport_marker == *marker => {}
                // A newer session replaced the one that was rejected
                _ => return,
            }
            let next = match inner.wallet_address.clone() {
                Some(address) => AuthState::Connected { address },
                None => AuthState::Disconnected,
            };
            warn!("session expired");
            self.end_session(&mut inner, next)
        };
        self.clear_store();
        self.spawn_logout(stale, "session expired");
    }

    /// Abandon in-flight work and stop the signer listener.
    ///
    /// The persisted marker is kept for the next boot.
    pub fn shutdown(&self) {
        let mut inner = lock(&self.inner);
        inner.generation += 1;
        self.shutdown.cancel();
        let resting = match &inner.state {
            AuthState::Connecting => Some(AuthState::Disconnected),
            state if state.is_signing_in() => inner
                .wallet_address
                .clone()
                .map(|address| AuthState::Connected { address }),
            _ => None,
        };
        if let Some(next) = resting {
            self.transition(&mut inner, next);
        }
        debug!("auth state machine shut down");
    }

    /// Await `fut` unless shutdown fires; stale results become `Cancelled`.
    async fn step<T>(&self, attempt: u64, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let result = tokio::select! {
            result = fut => result,
            _ = self.shutdown.cancelled() => return Err(AuthError::Cancelled),
        };
        if lock(&self.inner).generation != attempt {
            debug!("ignoring late completion");
            return Err(AuthError::Cancelled);
        }
        result
    }

    fn advance(&self, attempt: u64, next: AuthState) -> Result<()> {
        let mut inner = lock(&self.inner);
        if inner.generation != attempt {
            return Err(AuthError::Cancelled);
        }
        self.transition(&mut inner, next);
        Ok(())
    }

    /// Invalidate in-flight work and drop any session; returns its marker.
    fn end_session(&self, inner: &mut Inner, next: AuthState) -> Option<TransportMarker> {
        inner.generation += 1;
        let marker = inner
            .state
            .session()
            .map(|session| session.transport_marker.clone());
        self.transition(inner, next);
        marker
    }

    fn transition(&self, inner: &mut Inner, next: AuthState) {
        if inner.state == next {
            return;
        }
        let from = std::mem::replace(&mut inner.state, next.clone());
        info!(from = from.name(), to = next.name(), "auth state transition");

        if from.is_authenticated() || next.is_authenticated() {
            self.entitlements.refresh(next.session());
        }
        let _ = self.transitions.send(AuthTransition { from, to: next });
    }

    fn clear_store(&self) {
        if let Err(err) = self.store.clear() {
            warn!(error = %err, "failed to clear persisted session");
        }
    }

    fn spawn_logout(&self, marker: Option<TransportMarker>, reason: &'static str) {
        let Some(marker) = marker else {
            return;
        };
        let Ok(handle) = Handle::try_current() else {
            warn!(reason, "no runtime available, skipping remote logout");
            return;
        };
        let client = Arc::clone(&self.client);
        handle.spawn(async move {
            match client.logout(Some(&marker)).await {
                Ok(()) => debug!(reason, "remote logout completed"),
                Err(err) => warn!(reason, error = %err, "background logout failed"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::MemorySessionStore;
    use crate::auth::wallet::MockWalletSigner;
    use crate::http::AuthConfig;
    use crate::types::Tier;

    fn address(fill: char) -> Address {
        Address::parse(&format!("0x{}", fill.to_string().repeat(40))).unwrap()
    }

    fn offline_client() -> AuthClient {
        AuthClient::new(AuthConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..AuthConfig::default()
        })
        .unwrap()
    }

    fn machine(signer: MockWalletSigner) -> Arc<AuthStateMachine> {
        AuthStateMachine::new(
            offline_client(),
            Arc::new(signer),
            Arc::new(MemorySessionStore::new()),
        )
    }

    #[test]
    fn test_state_display() {
        assert_eq!(AuthState::Disconnected.to_string(), "disconnected");
        let state = AuthState::Connected {
            address: address('a'),
        };
        assert_eq!(state.to_string(), format!("connected ({})", address('a')));
        assert!(!state.is_signing_in());
        assert!(AuthState::Verifying { address: address('a') }.is_signing_in());
    }

    #[tokio::test]
    async fn test_sign_in_requires_connection() {
        let machine = machine(MockWalletSigner::new(address('a'), "0xsig"));
        assert_eq!(machine.sign_in().await.unwrap_err(), AuthError::NotConnected);
        assert_eq!(machine.state(), AuthState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_and_reconnect() {
        let signer = MockWalletSigner::new(address('a'), "0xsig");
        let machine = machine(signer.clone());

        assert_eq!(machine.connect(None).await.unwrap(), address('a'));
        assert_eq!(machine.connect(None).await.unwrap(), address('a'));
        assert_eq!(signer.connect_calls(), 1);
        assert_eq!(
            machine.state(),
            AuthState::Connected {
                address: address('a')
            }
        );
    }

    #[tokio::test]
    async fn test_connect_rejected_returns_to_disconnected() {
        let signer = MockWalletSigner::new(address('a'), "0xsig");
        signer.fail_next_connect(AuthError::UserRejected);
        let machine = machine(signer);

        assert_eq!(machine.connect(None).await.unwrap_err(), AuthError::UserRejected);
        assert_eq!(machine.state(), AuthState::Disconnected);
    }

    #[tokio::test]
    async fn test_unreachable_backend_keeps_wallet_connected() {
        let machine = machine(MockWalletSigner::new(address('a'), "0xsig"));
        machine.connect(None).await.unwrap();

        let err = machine.sign_in().await.unwrap_err();
        assert!(matches!(err, AuthError::RemoteUnavailable(_)));
        assert_eq!(
            machine.state(),
            AuthState::Connected {
                address: address('a')
            }
        );
    }

    #[tokio::test]
    async fn test_address_change_while_connected() {
        let machine = machine(MockWalletSigner::new(address('a'), "0xsig"));
        machine.connect(None).await.unwrap();

        machine.handle_signer_event(SignerEvent::AddressChanged(address('b')));
        assert_eq!(
            machine.state(),
            AuthState::Connected {
                address: address('b')
            }
        );
        assert_eq!(machine.wallet_address(), Some(address('b')));

        machine.handle_signer_event(SignerEvent::Disconnected);
        assert_eq!(machine.state(), AuthState::Disconnected);
        assert!(machine.wallet_address().is_none());
        assert_eq!(machine.entitlements().tier, Tier::Free);
    }
}
