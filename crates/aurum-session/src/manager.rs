//! Session Manager
//!
//! Single source of truth for the signed-in user, driven by startup, inbound
//! deep links and explicit login/logout.
//!
//! At most one backend or provider call runs per manager. A request arriving
//! while one is outstanding is dropped and reported as [`Outcome::Ignored`].
//! Logout is the exception: it always clears local state, and any call still
//! running when it happens finishes as stale without touching the state. A
//! credential issued to such a call is revoked straight away.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

use aurum_links::{extract_session_token, LinkResolution, SessionToken};

use crate::backend::SessionBackend;
use crate::error::SessionError;
use crate::provider::{IdentityProvider, LoginRoute, ProviderOutcome};
use crate::state::{AuthSnapshot, AuthState, StateChange};
use crate::user::User;
use crate::Result;

const STATE_CHANGE_CAPACITY: usize = 32;

/// How a session operation ended
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Authenticated(User),
    Guest,
    /// Nothing done: another call was in flight, there was nothing to do,
    /// or a logout superseded the call
    Ignored,
}

pub struct SessionManager {
    backend: Arc<dyn SessionBackend>,
    provider: Arc<dyn IdentityProvider>,
    route: Arc<LoginRoute>,
    /// Latest state, for consumers that render it
    snapshot: Arc<watch::Sender<AuthSnapshot>>,
    /// Every applied transition, in order
    changes: broadcast::Sender<StateChange>,
    in_flight: Arc<AtomicBool>,
    /// Bumped by logout; results from older generations are discarded
    generation: Arc<AtomicU64>,
    pub(crate) listener_active: Arc<AtomicBool>,
}

/// Holds the in-flight slot. Released on drop.
struct InFlight<'a> {
    manager: &'a SessionManager,
    operation: &'static str,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        // Only the slot holder enters transient states, so one left behind
        // means the call was cancelled before it settled
        if self.manager.state().is_transient() {
            tracing::warn!(
                operation = self.operation,
                "Session call abandoned; continuing as guest"
            );
            self.manager.settle_guest();
        }
        self.manager.in_flight.store(false, Ordering::Release);
    }
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        provider: Arc<dyn IdentityProvider>,
        route: LoginRoute,
    ) -> Self {
        let (snapshot, _) = watch::channel(AuthSnapshot::default());
        let (changes, _) = broadcast::channel(STATE_CHANGE_CAPACITY);

        Self {
            backend,
            provider,
            route: Arc::new(route),
            snapshot: Arc::new(snapshot),
            changes,
            in_flight: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            listener_active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn state_changes(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn state(&self) -> AuthState {
        self.snapshot.borrow().state
    }

    pub fn current_user(&self) -> Option<User> {
        self.snapshot.borrow().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.snapshot.borrow().is_authenticated()
    }

    /// True while a session call holds the in-flight slot
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn route(&self) -> &LoginRoute {
        &self.route
    }

    /// Cold start: restore any persisted session, then handle the URL the
    /// process was launched with. Run one after the other so neither is
    /// dropped by the in-flight rule.
    pub async fn start(&self, initial_url: Option<&str>) -> Outcome {
        let restored = self.restore_session().await;

        match initial_url {
            Some(url) => match self.handle_incoming_url(url).await {
                Outcome::Ignored => restored,
                exchanged => exchanged,
            },
            None => restored,
        }
    }

    /// Check the backend for an existing credential. No-op when already
    /// authenticated.
    pub async fn restore_session(&self) -> Outcome {
        if self.is_authenticated() {
            tracing::debug!("Session already authenticated; skipping restore");
            return Outcome::Ignored;
        }
        self.restore("restore").await
    }

    /// Re-fetch the profile even when authenticated. A failure signs out.
    pub async fn refresh_user(&self) -> Outcome {
        self.restore("refresh").await
    }

    /// Open the identity provider. The result arrives as a state change.
    pub async fn login(&self) -> Outcome {
        let Some(_in_flight) = self.begin("login") else {
            return Outcome::Ignored;
        };
        let generation = self.generation.load(Ordering::Acquire);

        if let Err(e) = self.enter(AuthState::Authenticating) {
            tracing::debug!(error = %e, "Login only starts from guest");
            return Outcome::Ignored;
        }

        let (authorize_url, redirect) = self.route.authorize_url();
        tracing::info!(
            redirect = %redirect,
            embedded = self.route.environment().is_embedded(),
            "Opening identity provider"
        );

        let result = self.provider.authenticate(&authorize_url, &redirect).await;
        if !self.is_current(generation) {
            tracing::debug!("Login superseded by logout");
            return Outcome::Ignored;
        }

        match result {
            Ok(ProviderOutcome::Redirected(url)) => match extract_session_token(&url) {
                Some(token) => self.exchange_in_flight(token, generation).await,
                None => {
                    tracing::warn!("Provider redirect carried no session token");
                    self.settle_guest();
                    Outcome::Guest
                }
            },
            Ok(ProviderOutcome::Cancelled) => {
                tracing::info!("Login cancelled");
                self.settle_guest();
                Outcome::Guest
            }
            Ok(ProviderOutcome::HandedOff) => {
                tracing::info!("Login handed off; waiting for deep link");
                self.settle_guest();
                Outcome::Guest
            }
            Err(e) => {
                tracing::warn!(error = %e, "Identity provider failed");
                self.settle_guest();
                Outcome::Guest
            }
        }
    }

    /// Trade a one-time token for a session. Failures end in Guest and are
    /// only logged.
    pub async fn exchange_token(&self, token: SessionToken) -> Outcome {
        let Some(_in_flight) = self.begin("exchange") else {
            return Outcome::Ignored;
        };
        let generation = self.generation.load(Ordering::Acquire);

        self.exchange_in_flight(token, generation).await
    }

    /// Tell the backend, then clear local state regardless of its answer.
    pub async fn logout(&self) -> Outcome {
        self.generation.fetch_add(1, Ordering::AcqRel);

        let in_flight = self.begin("logout");
        if in_flight.is_some() {
            if let Err(e) = self.backend.logout().await {
                tracing::warn!(error = %e, "Logout request failed; clearing local session anyway");
            }
        } else {
            tracing::warn!("Session call in flight; clearing local session without notifying backend");
            self.backend.forget();
        }

        self.settle_guest();
        drop(in_flight);

        tracing::info!("Signed out");
        Outcome::Guest
    }

    /// Exchange the `session_id` carried by a deep link, if any.
    pub async fn handle_incoming_url(&self, url: &str) -> Outcome {
        match LinkResolution::resolve(url) {
            LinkResolution::Session(token) => {
                tracing::debug!("Deep link carries a session token");
                self.exchange_token(token).await
            }
            LinkResolution::Ignored => Outcome::Ignored,
        }
    }

    async fn restore(&self, operation: &'static str) -> Outcome {
        let Some(_in_flight) = self.begin(operation) else {
            return Outcome::Ignored;
        };
        let generation = self.generation.load(Ordering::Acquire);

        if let Err(e) = self.enter(AuthState::Restoring) {
            tracing::warn!(operation, error = %e, "Cannot restore session");
            return Outcome::Ignored;
        }

        let result = self.backend.current_user().await;
        if !self.is_current(generation) {
            tracing::debug!(operation, "Session restore superseded by logout");
            return Outcome::Ignored;
        }

        match result {
            Ok(user) => self.finish_authenticated(operation, user),
            Err(e) => {
                tracing::info!(operation, error = %e, "No valid session; continuing as guest");
                self.settle_guest();
                Outcome::Guest
            }
        }
    }

    async fn exchange_in_flight(&self, token: SessionToken, generation: u64) -> Outcome {
        if let Err(e) = self.enter(AuthState::ExchangingToken) {
            tracing::warn!(error = %e, "Cannot exchange session token");
            return Outcome::Ignored;
        }

        let result = self.backend.exchange(&token).await;
        if !self.is_current(generation) {
            tracing::debug!("Session exchange superseded by logout");
            if result.is_ok() {
                // The backend stored a credential after logout cleared it
                self.revoke_stale_credential().await;
            }
            return Outcome::Ignored;
        }

        match result {
            Ok(user) => self.finish_authenticated("exchange", user),
            Err(e) => {
                tracing::warn!(error = %e, "Session exchange failed; continuing as guest");
                self.settle_guest();
                Outcome::Guest
            }
        }
    }

    /// Caller still holds the in-flight slot, so this is not a concurrent call
    async fn revoke_stale_credential(&self) {
        if let Err(e) = self.backend.logout().await {
            tracing::warn!(error = %e, "Failed to revoke credential issued after logout");
        }
    }

    fn finish_authenticated(&self, operation: &'static str, user: User) -> Outcome {
        match self.apply(AuthState::Authenticated, Some(Some(user.clone()))) {
            Ok(()) => {
                tracing::info!(operation, user_id = %user.id, "Session authenticated");
                Outcome::Authenticated(user)
            }
            Err(e) => {
                tracing::warn!(operation, error = %e, "Dropping authenticated result");
                self.settle_guest();
                Outcome::Guest
            }
        }
    }

    fn begin(&self, operation: &'static str) -> Option<InFlight<'_>> {
        match self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Some(InFlight {
                manager: self,
                operation,
            }),
            Err(_) => {
                tracing::debug!(operation, "Session call already in flight; dropping request");
                None
            }
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    fn enter(&self, state: AuthState) -> Result<()> {
        self.apply(state, None)
    }

    fn settle_guest(&self) {
        if let Err(e) = self.apply(AuthState::Guest, Some(None)) {
            // Guest is reachable from every state
            tracing::error!(error = %e, "Failed to enter guest state");
        }
    }

    /// `user: None` keeps the current user, `Some(u)` replaces it.
    fn apply(&self, to: AuthState, user: Option<Option<User>>) -> Result<()> {
        let mut from = AuthState::Unknown;
        let mut accepted = false;

        self.snapshot.send_if_modified(|snapshot| {
            from = snapshot.state;
            if !from.can_transition_to(to) {
                return false;
            }
            accepted = true;
            snapshot.state = to;
            if let Some(user) = user {
                snapshot.user = user;
            }
            true
        });

        if !accepted {
            return Err(SessionError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        if from != to {
            tracing::debug!(from = %from, to = %to, "Auth state changed");
            // No receivers is fine
            let _ = self.changes.send(StateChange { from, to });
        }
        Ok(())
    }
}

impl Clone for SessionManager {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            provider: Arc::clone(&self.provider),
            route: Arc::clone(&self.route),
            snapshot: Arc::clone(&self.snapshot),
            changes: self.changes.clone(),
            in_flight: Arc::clone(&self.in_flight),
            generation: Arc::clone(&self.generation),
            listener_active: Arc::clone(&self.listener_active),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;
    use url::Url;

    use aurum_links::{LaunchEnvironment, ProviderLink};

    /// Pauses a backend call until released
    #[derive(Default)]
    pub(crate) struct Gate {
        pub entered: Notify,
        pub release: Notify,
    }

    #[derive(Default)]
    pub(crate) struct FakeBackend {
        signed_in: Mutex<Option<User>>,
        tokens: Mutex<HashMap<String, User>>,
        exchanged: Mutex<Vec<String>>,
        logout_fails: AtomicBool,
        current_user_calls: AtomicUsize,
        logout_calls: AtomicUsize,
        forget_calls: AtomicUsize,
        gate: Option<Arc<Gate>>,
    }

    impl FakeBackend {
        pub fn signed_in(user: User) -> Self {
            Self {
                signed_in: Mutex::new(Some(user)),
                ..Self::default()
            }
        }

        pub fn with_token(self, token: &str, user: User) -> Self {
            self.tokens.lock().insert(token.to_string(), user);
            self
        }

        pub fn with_gate(mut self, gate: Arc<Gate>) -> Self {
            self.gate = Some(gate);
            self
        }

        pub fn failing_logout(self) -> Self {
            self.logout_fails.store(true, Ordering::SeqCst);
            self
        }

        pub fn current_user_calls(&self) -> usize {
            self.current_user_calls.load(Ordering::SeqCst)
        }

        pub fn exchanged(&self) -> Vec<String> {
            self.exchanged.lock().clone()
        }

        async fn pause(&self) {
            if let Some(gate) = &self.gate {
                gate.entered.notify_one();
                gate.release.notified().await;
            }
        }
    }

    #[async_trait]
    impl SessionBackend for FakeBackend {
        async fn exchange(&self, token: &SessionToken) -> Result<User> {
            self.exchanged.lock().push(token.as_str().to_string());
            self.pause().await;

            let user = self
                .tokens
                .lock()
                .get(token.as_str())
                .cloned()
                .ok_or(SessionError::Status(401))?;
            *self.signed_in.lock() = Some(user.clone());
            Ok(user)
        }

        async fn current_user(&self) -> Result<User> {
            self.current_user_calls.fetch_add(1, Ordering::SeqCst);
            self.pause().await;

            self.signed_in.lock().clone().ok_or(SessionError::Status(401))
        }

        async fn logout(&self) -> Result<()> {
            self.logout_calls.fetch_add(1, Ordering::SeqCst);
            *self.signed_in.lock() = None;
            if self.logout_fails.load(Ordering::SeqCst) {
                return Err(SessionError::Status(503));
            }
            Ok(())
        }

        fn forget(&self) {
            self.forget_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) struct FakeProvider {
        outcome: Mutex<Option<Result<ProviderOutcome>>>,
        opened: Mutex<Vec<(String, String)>>,
    }

    impl FakeProvider {
        pub fn returning(outcome: ProviderOutcome) -> Self {
            Self {
                outcome: Mutex::new(Some(Ok(outcome))),
                opened: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            Self {
                outcome: Mutex::new(Some(Err(SessionError::Provider(
                    "auth sheet unavailable".to_string(),
                )))),
                opened: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        async fn authenticate(
            &self,
            authorize_url: &Url,
            redirect_target: &str,
        ) -> Result<ProviderOutcome> {
            self.opened
                .lock()
                .push((authorize_url.to_string(), redirect_target.to_string()));
            self.outcome
                .lock()
                .take()
                .unwrap_or(Ok(ProviderOutcome::Cancelled))
        }
    }

    pub(crate) fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            email: format!("{id}@example.qa"),
            name: "Mariam Al-Thani".to_string(),
            picture: Some("https://cdn.example.qa/p.png".to_string()),
            gold_balance: 0.0,
        }
    }

    pub(crate) fn route() -> LoginRoute {
        LoginRoute::new(
            ProviderLink::new("https://auth.emergentagent.com").unwrap(),
            LaunchEnvironment::standalone("aurum").unwrap(),
            Url::parse("http://localhost:8001").unwrap(),
        )
    }

    pub(crate) fn manager_with(backend: Arc<FakeBackend>) -> SessionManager {
        manager_with_provider(backend, FakeProvider::returning(ProviderOutcome::Cancelled))
    }

    fn manager_with_provider(backend: Arc<FakeBackend>, provider: FakeProvider) -> SessionManager {
        SessionManager::new(backend, Arc::new(provider), route())
    }

    fn drain(rx: &mut broadcast::Receiver<StateChange>) -> Vec<AuthState> {
        let mut states = Vec::new();
        while let Ok(change) = rx.try_recv() {
            if states.is_empty() {
                states.push(change.from);
            }
            states.push(change.to);
        }
        states
    }

    #[tokio::test]
    async fn test_cold_start_with_valid_credential() {
        let backend = Arc::new(FakeBackend::signed_in(user("user_1")));
        let manager = manager_with(backend.clone());
        let mut changes = manager.state_changes();

        assert_eq!(manager.state(), AuthState::Unknown);
        let outcome = manager.start(None).await;

        assert_eq!(outcome, Outcome::Authenticated(user("user_1")));
        assert_eq!(
            drain(&mut changes),
            vec![AuthState::Unknown, AuthState::Restoring, AuthState::Authenticated]
        );
        assert_eq!(manager.current_user(), Some(user("user_1")));
        assert!(!manager.snapshot().is_loading());
    }

    #[tokio::test]
    async fn test_cold_start_without_credential() {
        let backend = Arc::new(FakeBackend::default());
        let manager = manager_with(backend.clone());
        let mut changes = manager.state_changes();

        assert_eq!(manager.start(None).await, Outcome::Guest);
        assert_eq!(
            drain(&mut changes),
            vec![AuthState::Unknown, AuthState::Restoring, AuthState::Guest]
        );
        assert_eq!(manager.current_user(), None);
    }

    #[tokio::test]
    async fn test_restore_is_noop_when_authenticated() {
        let backend = Arc::new(FakeBackend::signed_in(user("user_1")));
        let manager = manager_with(backend.clone());

        manager.restore_session().await;
        assert_eq!(manager.restore_session().await, Outcome::Ignored);
        assert_eq!(backend.current_user_calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_restore_issues_single_call() {
        let gate = Arc::new(Gate::default());
        let backend = Arc::new(FakeBackend::signed_in(user("user_1")).with_gate(gate.clone()));
        let manager = manager_with(backend.clone());

        let first = tokio::spawn({
            let manager = manager.clone();
            async move { manager.restore_session().await }
        });
        gate.entered.notified().await;

        assert_eq!(manager.state(), AuthState::Restoring);
        assert!(manager.is_busy());
        assert_eq!(manager.restore_session().await, Outcome::Ignored);
        assert_eq!(backend.current_user_calls(), 1);

        gate.release.notify_one();
        assert_eq!(first.await.unwrap(), Outcome::Authenticated(user("user_1")));
        assert_eq!(backend.current_user_calls(), 1);
        assert!(!manager.is_busy());
    }

    #[tokio::test]
    async fn test_exchange_success_replaces_user() {
        let backend = Arc::new(FakeBackend::default().with_token("abc123", user("user_7")));
        let manager = manager_with(backend.clone());
        manager.start(None).await;

        let outcome = manager.exchange_token(SessionToken::new("abc123")).await;

        assert_eq!(outcome, Outcome::Authenticated(user("user_7")));
        let snapshot = manager.snapshot();
        assert_eq!(snapshot.state, AuthState::Authenticated);
        assert_eq!(snapshot.user, Some(user("user_7")));
    }

    #[tokio::test]
    async fn test_exchange_failure_clears_user() {
        let backend = Arc::new(FakeBackend::signed_in(user("user_1")));
        let manager = manager_with(backend.clone());
        manager.start(None).await;
        assert!(manager.is_authenticated());

        let outcome = manager.exchange_token(SessionToken::new("expired")).await;

        assert_eq!(outcome, Outcome::Guest);
        assert_eq!(manager.state(), AuthState::Guest);
        assert_eq!(manager.current_user(), None);
    }

    #[tokio::test]
    async fn test_url_without_token_makes_no_call() {
        let backend = Arc::new(FakeBackend::default());
        let manager = manager_with(backend.clone());

        for url in [
            "aurum:///",
            "https://shop.example.qa/orders?id=5",
            "https://x/?foo=1&session_id=late",
            "",
        ] {
            assert_eq!(manager.handle_incoming_url(url).await, Outcome::Ignored);
        }
        assert!(backend.exchanged().is_empty());
        assert_eq!(backend.current_user_calls(), 0);
        assert_eq!(manager.state(), AuthState::Unknown);
    }

    #[tokio::test]
    async fn test_url_with_token_is_exchanged() {
        let backend = Arc::new(FakeBackend::default().with_token("abc123", user("user_2")));
        let manager = manager_with(backend.clone());
        manager.start(None).await;

        let outcome = manager
            .handle_incoming_url("https://x/?session_id=abc123&foo=1")
            .await;

        assert_eq!(outcome, Outcome::Authenticated(user("user_2")));
        assert_eq!(backend.exchanged(), vec!["abc123".to_string()]);
    }

    #[tokio::test]
    async fn test_cold_start_url_after_restore() {
        let backend = Arc::new(FakeBackend::default().with_token("cold", user("user_3")));
        let manager = manager_with(backend.clone());
        let mut changes = manager.state_changes();

        let outcome = manager.start(Some("aurum:///#session_id=cold")).await;

        assert_eq!(outcome, Outcome::Authenticated(user("user_3")));
        assert_eq!(
            drain(&mut changes),
            vec![
                AuthState::Unknown,
                AuthState::Restoring,
                AuthState::Guest,
                AuthState::ExchangingToken,
                AuthState::Authenticated,
            ]
        );
    }

    #[tokio::test]
    async fn test_last_successful_exchange_wins() {
        let backend = Arc::new(
            FakeBackend::default()
                .with_token("first", user("user_a"))
                .with_token("second", user("user_b")),
        );
        let manager = manager_with(backend.clone());
        manager.start(None).await;

        manager.handle_incoming_url("aurum:///#session_id=first").await;
        manager.handle_incoming_url("aurum:///?session_id=second").await;

        assert_eq!(manager.current_user(), Some(user("user_b")));
    }

    #[tokio::test]
    async fn test_logout_clears_state_when_backend_fails() {
        let backend = Arc::new(FakeBackend::signed_in(user("user_1")).failing_logout());
        let manager = manager_with(backend.clone());
        manager.start(None).await;

        assert_eq!(manager.logout().await, Outcome::Guest);
        assert_eq!(manager.state(), AuthState::Guest);
        assert_eq!(manager.current_user(), None);
        assert_eq!(backend.logout_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_logout_supersedes_pending_restore() {
        let gate = Arc::new(Gate::default());
        let backend = Arc::new(FakeBackend::signed_in(user("user_1")).with_gate(gate.clone()));
        let manager = manager_with(backend.clone());

        let pending = tokio::spawn({
            let manager = manager.clone();
            async move { manager.restore_session().await }
        });
        gate.entered.notified().await;

        assert_eq!(manager.logout().await, Outcome::Guest);
        // The backend was not called concurrently; only the local copy was dropped
        assert_eq!(backend.logout_calls.load(Ordering::SeqCst), 0);
        assert_eq!(backend.forget_calls.load(Ordering::SeqCst), 1);

        gate.release.notify_one();
        assert_eq!(pending.await.unwrap(), Outcome::Ignored);
        assert_eq!(manager.state(), AuthState::Guest);
        assert_eq!(manager.current_user(), None);
    }

    #[tokio::test]
    async fn test_logout_revokes_credential_from_pending_exchange() {
        let gate = Arc::new(Gate::default());
        let backend = Arc::new(
            FakeBackend::default()
                .with_token("late", user("user_6"))
                .with_gate(gate.clone()),
        );
        let manager = manager_with(backend.clone());

        let pending = tokio::spawn({
            let manager = manager.clone();
            async move { manager.handle_incoming_url("aurum:///#session_id=late").await }
        });
        gate.entered.notified().await;
        assert_eq!(manager.state(), AuthState::ExchangingToken);

        assert_eq!(manager.logout().await, Outcome::Guest);
        assert_eq!(backend.forget_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.logout_calls.load(Ordering::SeqCst), 0);

        // Exchange succeeds after logout: its credential is revoked, not kept
        gate.release.notify_one();
        assert_eq!(pending.await.unwrap(), Outcome::Ignored);
        assert_eq!(backend.logout_calls.load(Ordering::SeqCst), 1);
        assert!(backend.signed_in.lock().is_none());
        assert_eq!(manager.state(), AuthState::Guest);
        assert!(!manager.is_busy());

        // Let the restore through the gate without waiting on it
        gate.release.notify_one();
        assert_eq!(manager.restore_session().await, Outcome::Guest);
        assert_eq!(manager.current_user(), None);
    }

    #[tokio::test]
    async fn test_cancelled_call_releases_slot() {
        let gate = Arc::new(Gate::default());
        let backend = Arc::new(FakeBackend::signed_in(user("user_1")).with_gate(gate.clone()));
        let manager = manager_with(backend.clone());

        let pending = tokio::spawn({
            let manager = manager.clone();
            async move { manager.restore_session().await }
        });
        gate.entered.notified().await;
        assert_eq!(manager.state(), AuthState::Restoring);

        pending.abort();
        assert!(pending.await.unwrap_err().is_cancelled());

        assert_eq!(manager.state(), AuthState::Guest);
        assert!(!manager.is_busy());
    }

    #[tokio::test]
    async fn test_login_redirect_is_exchanged() {
        let backend = Arc::new(FakeBackend::default().with_token("tok_9", user("user_9")));
        let provider = FakeProvider::returning(ProviderOutcome::Redirected(
            "aurum:///#session_id=tok_9".to_string(),
        ));
        let manager = manager_with_provider(backend.clone(), provider);
        manager.start(None).await;
        let mut changes = manager.state_changes();

        assert_eq!(manager.login().await, Outcome::Authenticated(user("user_9")));
        assert_eq!(
            drain(&mut changes),
            vec![
                AuthState::Guest,
                AuthState::Authenticating,
                AuthState::ExchangingToken,
                AuthState::Authenticated,
            ]
        );
    }

    #[tokio::test]
    async fn test_login_opens_provider_with_redirect() {
        let backend = Arc::new(FakeBackend::default());
        let provider = Arc::new(FakeProvider::returning(ProviderOutcome::Cancelled));
        let manager = SessionManager::new(backend, provider.clone(), route());
        manager.start(None).await;

        assert_eq!(manager.login().await, Outcome::Guest);

        let opened = provider.opened.lock().clone();
        assert_eq!(
            opened,
            vec![(
                "https://auth.emergentagent.com/?redirect=aurum%3A%2F%2F%2F".to_string(),
                "aurum:///".to_string()
            )]
        );
        assert_eq!(manager.state(), AuthState::Guest);
    }

    #[tokio::test]
    async fn test_login_failures_return_to_guest() {
        for provider in [
            FakeProvider::returning(ProviderOutcome::HandedOff),
            FakeProvider::returning(ProviderOutcome::Redirected("aurum:///".to_string())),
            FakeProvider::failing(),
        ] {
            let backend = Arc::new(FakeBackend::default());
            let manager = manager_with_provider(backend.clone(), provider);
            manager.start(None).await;

            assert_eq!(manager.login().await, Outcome::Guest);
            assert_eq!(manager.state(), AuthState::Guest);
            assert!(backend.exchanged().is_empty());
        }
    }

    #[tokio::test]
    async fn test_login_ignored_when_authenticated() {
        let backend = Arc::new(FakeBackend::signed_in(user("user_1")));
        let provider = Arc::new(FakeProvider::returning(ProviderOutcome::Cancelled));
        let manager = SessionManager::new(backend, provider.clone(), route());
        manager.start(None).await;

        assert_eq!(manager.login().await, Outcome::Ignored);
        assert!(provider.opened.lock().is_empty());
        assert!(manager.is_authenticated());
    }

    #[tokio::test]
    async fn test_refresh_reenters_restoring() {
        let backend = Arc::new(FakeBackend::signed_in(user("user_1")));
        let manager = manager_with(backend.clone());
        manager.start(None).await;
        let mut changes = manager.state_changes();

        assert_eq!(manager.refresh_user().await, Outcome::Authenticated(user("user_1")));
        assert_eq!(
            drain(&mut changes),
            vec![AuthState::Authenticated, AuthState::Restoring, AuthState::Authenticated]
        );

        // Backend forgot the session: refresh signs out
        *backend.signed_in.lock() = None;
        assert_eq!(manager.refresh_user().await, Outcome::Guest);
        assert_eq!(manager.current_user(), None);
        assert_eq!(backend.current_user_calls(), 3);
    }

    #[tokio::test]
    async fn test_subscribers_see_latest_snapshot() {
        let backend = Arc::new(FakeBackend::signed_in(user("user_1")));
        let manager = manager_with(backend);
        let mut rx = manager.subscribe();

        manager.start(None).await;

        assert!(rx.has_changed().unwrap());
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.state, AuthState::Authenticated);
        assert_eq!(snapshot.user, Some(user("user_1")));
    }
}
