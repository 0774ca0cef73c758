use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

use crate::error::Result;
use crate::identity::{IdentityProvider, Subscription};
use crate::models::session::{AuthChange, Session, SessionKey, SessionUser};

/// What the observer currently knows about one session key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session: Option<Session>,
    /// True until the first session fetch completes.
    pub is_loading: bool,
}

impl SessionSnapshot {
    pub fn user(&self) -> Option<&SessionUser> {
        self.session.as_ref().map(|session| &session.user)
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }
}

/// Tracks the session for one key by combining an initial fetch with the
/// identity provider's change events.
///
/// The latest value lives in a watch channel; readers never act on a copy
/// captured before a later event. The change listener is released on
/// [`SessionObserver::close`] or drop.
pub struct SessionObserver {
    identity: Arc<dyn IdentityProvider>,
    key: SessionKey,
    state: Arc<watch::Sender<SessionSnapshot>>,
    events: Arc<AtomicU64>,
    subscription: Option<Subscription>,
}

impl SessionObserver {
    /// Registers the change listener. The session is unknown until
    /// [`SessionObserver::load`] runs.
    pub fn new(identity: Arc<dyn IdentityProvider>, key: SessionKey) -> Self {
        let (state, _) = watch::channel(SessionSnapshot {
            session: None,
            is_loading: true,
        });
        let state = Arc::new(state);
        let events = Arc::new(AtomicU64::new(0));

        let listener_state = state.clone();
        let listener_events = events.clone();
        let subscription = identity.on_auth_state_change(Arc::new(move |change: &AuthChange| {
            if change.key != key {
                return;
            }
            listener_events.fetch_add(1, Ordering::SeqCst);
            let session = change.event.session().cloned();
            listener_state.send_modify(|snapshot| snapshot.session = session);
        }));

        Self {
            identity,
            key,
            state,
            events,
            subscription: Some(subscription),
        }
    }

    pub fn key(&self) -> SessionKey {
        self.key
    }

    /// Fetches the current session. A failed fetch counts as "no session".
    ///
    /// An auth event that arrives while the fetch is in flight wins over the
    /// fetched value.
    pub async fn load(&self) {
        let seen = self.events.load(Ordering::SeqCst);

        let fetched = match self.identity.get_session(self.key).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Error getting session for {}: {}", self.key, e);
                None
            }
        };

        let superseded = self.events.load(Ordering::SeqCst) != seen;
        self.state.send_modify(|snapshot| {
            if !superseded {
                snapshot.session = fetched;
            }
            snapshot.is_loading = false;
        });
    }

    /// Re-fetches the session, surfacing provider errors to the caller.
    pub async fn refresh(&self) -> Result<Option<Session>> {
        let session = self.identity.get_session(self.key).await?;
        self.state.send_modify(|snapshot| {
            snapshot.session = session.clone();
            snapshot.is_loading = false;
        });
        Ok(session)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn session(&self) -> Option<Session> {
        self.state.borrow().session.clone()
    }

    pub fn user(&self) -> Option<SessionUser> {
        self.state.borrow().user().cloned()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// A receiver woken on every snapshot change.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Releases the change listener.
    pub fn close(mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}
