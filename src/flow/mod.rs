//! The "connect your Gmail" flow.
//!
//! A landing on the auth entry point is evaluated by [`AuthFlow::visit`]: the
//! session is loaded, a token-carrying fragment is exchanged and stored, and
//! the controller picks the screen to show. [`AuthFlow::watch`] follows the
//! same controller across later sign-in/sign-out events.

pub mod controller;
pub mod fragment;
pub mod observer;
pub mod redirect;

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

use crate::identity::IdentityProvider;
use crate::models::notice::Notice;
use crate::models::session::{SessionKey, SessionUser};
use crate::repositories::connection::ConnectionStore;

use controller::{FlowController, FlowState};
use fragment::Landing;
use observer::{SessionObserver, SessionSnapshot};
use redirect::RedirectHandler;

/// Auth entry point.
pub const AUTH_PATH: &str = "/auth";
/// Destination after a successful connection.
pub const DASHBOARD_PATH: &str = "/dashboard";
/// Destination after signing out.
pub const HOME_PATH: &str = "/";

/// What the browser should render after a flow step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowView {
    pub state: FlowState,
    pub notice: Option<Notice>,
    pub redirect_to: Option<String>,
    pub user: Option<SessionUser>,
}

impl FlowView {
    fn new(state: FlowState, notice: Option<Notice>, snapshot: &SessionSnapshot) -> Self {
        Self {
            state,
            notice,
            redirect_to: (state == FlowState::Redirecting).then(|| DASHBOARD_PATH.to_string()),
            user: snapshot.user().cloned(),
        }
    }
}

/// Entry point of the flow, shared by all requests.
#[derive(Clone)]
pub struct AuthFlow {
    identity: Arc<dyn IdentityProvider>,
    redirect: RedirectHandler,
}

impl AuthFlow {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        connections: Arc<dyn ConnectionStore>,
        token_validity_secs: i64,
    ) -> Self {
        Self {
            redirect: RedirectHandler::new(identity.clone(), connections, token_validity_secs),
            identity,
        }
    }

    /// Evaluates one landing: loads the session, processes a delivered token
    /// if there is one, and returns the resulting view.
    pub async fn visit(&self, key: SessionKey, landing: &Landing) -> FlowView {
        let tokens = landing.tokens();
        let observer = SessionObserver::new(self.identity.clone(), key);
        let mut controller = FlowController::new(landing.connect_requested(), tokens.is_some());

        observer.load().await;

        let mut notice = None;
        if let Some(tokens) = tokens {
            tracing::debug!("🔑 Landing for {} carries an access token", key);
            controller.begin_token_exchange();
            let outcome = self.redirect.handle(&tokens, &observer).await;
            controller.finish_token_exchange(outcome.is_connected());
            notice = Some(outcome.into_notice());
        }

        let snapshot = observer.snapshot();
        let state = controller.observe(&snapshot);
        observer.close();

        tracing::debug!("Flow for {} settled on {:?}", key, state);
        FlowView::new(state, notice, &snapshot)
    }

    /// Follows the flow for a landing without a token across auth events.
    pub fn watch(&self, key: SessionKey, landing: &Landing) -> FlowWatch {
        let observer = SessionObserver::new(self.identity.clone(), key);
        let receiver = observer.watch();
        FlowWatch {
            controller: FlowController::new(landing.connect_requested(), false),
            observer,
            receiver,
            last: None,
        }
    }
}

/// A live view of the flow, yielding a new [`FlowView`] whenever the state
/// changes.
pub struct FlowWatch {
    observer: SessionObserver,
    controller: FlowController,
    receiver: watch::Receiver<SessionSnapshot>,
    last: Option<FlowState>,
}

impl FlowWatch {
    /// Next state change. Returns `None` once the flow has redirected or the
    /// observer is gone.
    pub async fn next(&mut self) -> Option<FlowView> {
        if self.last.is_none() {
            self.observer.load().await;
            self.receiver.borrow_and_update();
            return Some(self.emit());
        }

        loop {
            if self.controller.is_terminal() {
                return None;
            }
            self.receiver.changed().await.ok()?;
            let snapshot = self.receiver.borrow_and_update().clone();
            let state = self.controller.observe(&snapshot);
            if self.last != Some(state) {
                self.last = Some(state);
                return Some(FlowView::new(state, None, &snapshot));
            }
        }
    }

    fn emit(&mut self) -> FlowView {
        let snapshot = self.observer.snapshot();
        let state = self.controller.observe(&snapshot);
        self.last = Some(state);
        FlowView::new(state, None, &snapshot)
    }

    /// Releases the underlying auth listener.
    pub fn close(self) {
        self.observer.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::memory::{MemoryIdentity, sample_user};
    use crate::models::connection::Provider;
    use crate::repositories::connection::MemoryConnectionStore;

    fn flow(identity: &MemoryIdentity, store: &MemoryConnectionStore) -> AuthFlow {
        AuthFlow::new(Arc::new(identity.clone()), Arc::new(store.clone()), 3600)
    }

    #[tokio::test]
    async fn token_landing_upserts_once_and_redirects() {
        let identity = MemoryIdentity::new();
        let store = MemoryConnectionStore::new();
        let key = SessionKey::generate();
        let user = identity.sign_in(key, sample_user("u@example.com")).await.user;

        let view = flow(&identity, &store)
            .visit(key, &Landing::new("#access_token=T1&refresh_token=T2", ""))
            .await;

        assert_eq!(view.state, FlowState::Redirecting);
        assert_eq!(view.redirect_to.as_deref(), Some(DASHBOARD_PATH));
        assert_eq!(store.upsert_count(), 1);

        let stored = store.find(user.id, Provider::Google).await.unwrap().unwrap();
        assert_eq!(stored.user_id, user.id);
        assert_eq!(stored.provider, Provider::Google);
        assert_eq!(stored.access_token, "T1");
        assert_eq!(stored.refresh_token.as_deref(), Some("T2"));
    }

    #[tokio::test]
    async fn connect_flag_keeps_signed_in_user_on_connect_prompt() {
        let identity = MemoryIdentity::new();
        let store = MemoryConnectionStore::new();
        let key = SessionKey::generate();
        identity.sign_in(key, sample_user("u@example.com")).await;

        let view = flow(&identity, &store)
            .visit(key, &Landing::query_only("gmailConnect=true"))
            .await;

        assert_eq!(view.state, FlowState::NeedsConnect);
        assert_eq!(view.redirect_to, None);
        assert_eq!(store.upsert_count(), 0);
    }

    #[tokio::test]
    async fn anonymous_landing_needs_sign_in_without_upserts() {
        let identity = MemoryIdentity::new();
        let store = MemoryConnectionStore::new();

        let view = flow(&identity, &store)
            .visit(SessionKey::generate(), &Landing::default())
            .await;

        assert_eq!(view.state, FlowState::NeedsSignIn);
        assert_eq!(view.user, None);
        assert_eq!(store.upsert_count(), 0);
    }

    #[tokio::test]
    async fn signed_in_landing_without_flag_redirects() {
        let identity = MemoryIdentity::new();
        let store = MemoryConnectionStore::new();
        let key = SessionKey::generate();
        identity.sign_in(key, sample_user("u@example.com")).await;

        let view = flow(&identity, &store).visit(key, &Landing::default()).await;

        assert_eq!(view.state, FlowState::Redirecting);
        assert_eq!(store.upsert_count(), 0);
    }

    #[tokio::test]
    async fn store_failure_stays_on_page() {
        let identity = MemoryIdentity::new();
        let store = MemoryConnectionStore::new();
        store.fail_with("unavailable").await;
        let key = SessionKey::generate();
        identity.sign_in(key, sample_user("u@example.com")).await;

        let view = flow(&identity, &store)
            .visit(key, &Landing::new("#access_token=T1", ""))
            .await;

        assert_ne!(view.state, FlowState::Redirecting);
        assert_eq!(view.state, FlowState::NeedsConnect);
        assert_eq!(view.redirect_to, None);
        assert!(view.notice.unwrap().is_error());
    }

    #[tokio::test]
    async fn malformed_fragment_falls_through_to_default_branching() {
        let identity = MemoryIdentity::new();
        let store = MemoryConnectionStore::new();

        let view = flow(&identity, &store)
            .visit(SessionKey::generate(), &Landing::new("#access_token=", ""))
            .await;

        assert_eq!(view.state, FlowState::NeedsSignIn);
        assert_eq!(view.notice, None);
        assert_eq!(store.upsert_count(), 0);
    }

    #[tokio::test]
    async fn fresh_sign_in_through_fragment_creates_session_and_connects() {
        let identity = MemoryIdentity::new();
        let store = MemoryConnectionStore::new();
        let user = sample_user("new@example.com");
        identity.register_token("T9", user.clone(), "sub-9").await;
        let key = SessionKey::generate();

        let view = flow(&identity, &store)
            .visit(key, &Landing::new("#access_token=T9", ""))
            .await;

        assert_eq!(view.state, FlowState::Redirecting);
        assert_eq!(view.user, Some(user));
        assert_eq!(identity.listener_count(), 0);
    }

    #[tokio::test]
    async fn watch_follows_sign_in_to_connect_prompt() {
        let identity = MemoryIdentity::new();
        let store = MemoryConnectionStore::new();
        let key = SessionKey::generate();

        let mut watch = flow(&identity, &store).watch(key, &Landing::default());
        assert_eq!(watch.next().await.unwrap().state, FlowState::NeedsSignIn);

        identity.sign_in(key, sample_user("u@example.com")).await;
        assert_eq!(watch.next().await.unwrap().state, FlowState::NeedsConnect);

        watch.close();
        assert_eq!(identity.listener_count(), 0);
    }

    #[tokio::test]
    async fn watch_ends_after_redirect() {
        let identity = MemoryIdentity::new();
        let store = MemoryConnectionStore::new();
        let key = SessionKey::generate();
        identity.sign_in(key, sample_user("u@example.com")).await;

        let mut watch = flow(&identity, &store).watch(key, &Landing::default());
        assert_eq!(watch.next().await.unwrap().state, FlowState::Redirecting);
        assert!(watch.next().await.is_none());
    }
}
