use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use url::Url;
use uuid::Uuid;

use crate::config::GOOGLE_AUTHORIZE_URL;
use crate::error::{AppError, Result};
use crate::flow::fragment::DeliveredTokens;
use crate::identity::google::GoogleOAuth;
use crate::identity::{
    AuthEventHub, AuthListener, IdentityProvider, ProviderAccount, SignInOptions, Subscription,
};
use crate::models::connection::Provider;
use crate::models::session::{AuthChange, AuthEvent, Session, SessionKey, SessionUser};

#[derive(Default)]
struct Failures {
    get_session: Option<String>,
    sign_in: Option<String>,
    sign_out: Option<String>,
}

/// In-process identity provider.
///
/// Access tokens must be registered with [`MemoryIdentity::register_token`]
/// before a redirect carrying them is accepted, unless the session already
/// exists.
#[derive(Clone)]
pub struct MemoryIdentity {
    sessions: Arc<RwLock<HashMap<SessionKey, Session>>>,
    tokens: Arc<RwLock<HashMap<String, (SessionUser, ProviderAccount)>>>,
    failures: Arc<RwLock<Failures>>,
    google: GoogleOAuth,
    hub: AuthEventHub,
}

impl Default for MemoryIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentity {
    pub fn new() -> Self {
        let authorize_url = Url::parse(GOOGLE_AUTHORIZE_URL).expect("valid default URL");
        let userinfo_url = Url::parse("http://localhost/userinfo").expect("valid default URL");

        Self {
            sessions: Arc::default(),
            tokens: Arc::default(),
            failures: Arc::default(),
            google: GoogleOAuth::new("memory-client", authorize_url, userinfo_url),
            hub: AuthEventHub::new(),
        }
    }

    /// Makes `access_token` resolve to `user` when a redirect delivers it.
    pub async fn register_token(&self, access_token: &str, user: SessionUser, subject: &str) {
        let account = ProviderAccount {
            subject: subject.to_string(),
            email: user.email.clone(),
        };
        self.tokens
            .write()
            .await
            .insert(access_token.to_string(), (user, account));
    }

    /// Establishes a session for `key` and notifies listeners.
    pub async fn sign_in(&self, key: SessionKey, user: SessionUser) -> Session {
        let session = Session::new(user, chrono::Duration::days(7));
        self.sessions.write().await.insert(key, session.clone());
        self.hub.publish(&AuthChange {
            key,
            event: AuthEvent::SignedIn(session.clone()),
        });
        session
    }

    pub async fn fail_get_session(&self, reason: impl Into<String>) {
        self.failures.write().await.get_session = Some(reason.into());
    }

    pub async fn fail_sign_in(&self, reason: impl Into<String>) {
        self.failures.write().await.sign_in = Some(reason.into());
    }

    pub async fn fail_sign_out(&self, reason: impl Into<String>) {
        self.failures.write().await.sign_out = Some(reason.into());
    }

    /// Number of currently registered auth listeners.
    pub fn listener_count(&self) -> usize {
        self.hub.listener_count()
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn get_session(&self, key: SessionKey) -> Result<Option<Session>> {
        if let Some(reason) = self.failures.read().await.get_session.clone() {
            return Err(AppError::Provider(reason));
        }
        Ok(self.sessions.read().await.get(&key).cloned())
    }

    fn on_auth_state_change(&self, listener: AuthListener) -> Subscription {
        self.hub.subscribe(listener)
    }

    async fn sign_in_with_oauth(&self, provider: Provider, options: &SignInOptions) -> Result<Url> {
        if let Some(reason) = self.failures.read().await.sign_in.clone() {
            return Err(AppError::Provider(reason));
        }
        match provider {
            Provider::Google => Ok(self.google.authorize_url(options)),
        }
    }

    async fn accept_redirect(&self, key: SessionKey, tokens: &DeliveredTokens) -> Result<ProviderAccount> {
        let registered = self.tokens.read().await.get(tokens.access_token()).cloned();

        if let Some((user, account)) = registered {
            self.sign_in(key, user).await;
            return Ok(account);
        }

        match self.sessions.read().await.get(&key) {
            Some(session) => Ok(ProviderAccount {
                subject: session.user.id.to_string(),
                email: session.user.email.clone(),
            }),
            None => Err(AppError::Provider("Unknown access token".to_string())),
        }
    }

    async fn sign_out(&self, key: SessionKey) -> Result<()> {
        if let Some(reason) = self.failures.read().await.sign_out.clone() {
            return Err(AppError::Provider(reason));
        }
        self.sessions.write().await.remove(&key);
        self.hub.publish(&AuthChange {
            key,
            event: AuthEvent::SignedOut,
        });
        Ok(())
    }
}

/// A user with a random id, for tests and local runs.
pub fn sample_user(email: &str) -> SessionUser {
    SessionUser {
        id: Uuid::new_v4(),
        email: Some(email.to_string()),
    }
}
