//! Identity provider boundary.
//!
//! The flow only ever talks to an [`IdentityProvider`]: it reads sessions,
//! listens for sign-in/sign-out events, asks for an authorization URL and
//! hands delivered tokens back for validation. Two backends exist: Redis
//! sessions validated against Google, and an in-memory one.

pub mod google;
pub mod memory;
pub mod redis;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use url::Url;

use crate::error::Result;
use crate::flow::fragment::DeliveredTokens;
use crate::models::connection::Provider;
use crate::models::session::{AuthChange, Session, SessionKey};

/// Scopes requested by the plain sign-in button.
pub const LOGIN_SCOPES: &[&str] = &["email", "https://www.googleapis.com/auth/gmail.readonly"];
/// Scopes requested when explicitly connecting Gmail.
pub const CONNECT_SCOPES: &[&str] = &[
    "email",
    "profile",
    "https://www.googleapis.com/auth/gmail.readonly",
];

/// Options for [`IdentityProvider::sign_in_with_oauth`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInOptions {
    /// Where the provider sends the browser back to.
    pub redirect_to: String,
    pub scopes: Vec<String>,
    /// Extra query parameters forwarded to the authorization endpoint.
    pub extra_params: Vec<(String, String)>,
}

impl SignInOptions {
    /// Sign-in that lands back on the auth entry point.
    pub fn login(origin: &str) -> Self {
        Self {
            redirect_to: format!("{}/auth", origin),
            scopes: LOGIN_SCOPES.iter().map(|s| s.to_string()).collect(),
            extra_params: Vec::new(),
        }
    }

    /// Explicit Gmail connect. Asks for offline access and forces consent.
    /// Backends on the implicit grant drop `access_type`.
    pub fn gmail_connect(origin: &str) -> Self {
        Self {
            redirect_to: format!("{}/auth?gmailConnect=true", origin),
            scopes: CONNECT_SCOPES.iter().map(|s| s.to_string()).collect(),
            extra_params: vec![
                ("access_type".to_string(), "offline".to_string()),
                ("prompt".to_string(), "consent".to_string()),
            ],
        }
    }
}

/// The provider-side account a delivered token belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAccount {
    /// Stable account id at the provider.
    pub subject: String,
    pub email: Option<String>,
}

/// Callback invoked for every auth state change.
pub type AuthListener = Arc<dyn Fn(&AuthChange) + Send + Sync>;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current session for `key`, if any.
    async fn get_session(&self, key: SessionKey) -> Result<Option<Session>>;

    /// Registers `listener` for all later auth changes. The listener stays
    /// registered until the returned [`Subscription`] is released.
    fn on_auth_state_change(&self, listener: AuthListener) -> Subscription;

    /// Builds the URL the browser must visit to sign in with `provider`.
    async fn sign_in_with_oauth(&self, provider: Provider, options: &SignInOptions) -> Result<Url>;

    /// Validates tokens delivered by a provider redirect and makes sure a
    /// session exists for `key`.
    async fn accept_redirect(&self, key: SessionKey, tokens: &DeliveredTokens) -> Result<ProviderAccount>;

    /// Ends the session for `key`.
    async fn sign_out(&self, key: SessionKey) -> Result<()>;
}

struct HubInner {
    listeners: Mutex<HashMap<u64, AuthListener>>,
    next_id: AtomicU64,
}

/// Fan-out of auth changes to registered listeners.
#[derive(Clone)]
pub struct AuthEventHub {
    inner: Arc<HubInner>,
}

impl Default for AuthEventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthEventHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                listeners: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn subscribe(&self, listener: AuthListener) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            listeners.insert(id, listener);
        }
        tracing::debug!("Auth listener {} registered", id);

        Subscription {
            id,
            hub: Arc::downgrade(&self.inner),
            active: true,
        }
    }

    /// Delivers `change` to every registered listener.
    pub fn publish(&self, change: &AuthChange) {
        // Listeners run outside the lock so they may unsubscribe themselves.
        let listeners: Vec<AuthListener> = match self.inner.listeners.lock() {
            Ok(listeners) => listeners.values().cloned().collect(),
            Err(_) => return,
        };

        for listener in listeners {
            listener(change);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .map(|listeners| listeners.len())
            .unwrap_or(0)
    }
}

/// Registration handle returned by [`IdentityProvider::on_auth_state_change`].
///
/// Dropping the handle unsubscribes.
pub struct Subscription {
    id: u64,
    hub: Weak<HubInner>,
    active: bool,
}

impl Subscription {
    /// Deregisters the listener.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        if let Some(hub) = self.hub.upgrade() {
            if let Ok(mut listeners) = hub.listeners.lock() {
                listeners.remove(&self.id);
            }
            tracing::debug!("Auth listener {} released", self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::{AuthEvent, SessionUser};
    use std::sync::atomic::AtomicUsize;
    use uuid::Uuid;

    fn counting_listener(counter: Arc<AtomicUsize>) -> AuthListener {
        Arc::new(move |_change: &AuthChange| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn signed_in() -> AuthChange {
        let user = SessionUser {
            id: Uuid::new_v4(),
            email: None,
        };
        AuthChange {
            key: SessionKey::generate(),
            event: AuthEvent::SignedIn(Session::new(user, chrono::Duration::hours(1))),
        }
    }

    #[test]
    fn publish_reaches_every_listener_until_unsubscribed() {
        let hub = AuthEventHub::new();
        let count = Arc::new(AtomicUsize::new(0));

        let first = hub.subscribe(counting_listener(count.clone()));
        let second = hub.subscribe(counting_listener(count.clone()));
        hub.publish(&signed_in());
        assert_eq!(count.load(Ordering::SeqCst), 2);

        first.unsubscribe();
        hub.publish(&signed_in());
        assert_eq!(count.load(Ordering::SeqCst), 3);

        drop(second);
        hub.publish(&signed_in());
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(hub.listener_count(), 0);
    }

    #[test]
    fn subscription_outliving_hub_releases_quietly() {
        let hub = AuthEventHub::new();
        let subscription = hub.subscribe(Arc::new(|_change: &AuthChange| {}));
        drop(hub);
        subscription.unsubscribe();
    }

    #[test]
    fn connect_options_request_offline_consent() {
        let options = SignInOptions::gmail_connect("https://app.example");

        assert_eq!(options.redirect_to, "https://app.example/auth?gmailConnect=true");
        assert!(options.scopes.iter().any(|s| s == "profile"));
        assert!(options
            .extra_params
            .contains(&("prompt".to_string(), "consent".to_string())));
        assert_eq!(SignInOptions::login("https://app.example").redirect_to, "https://app.example/auth");
    }
}
