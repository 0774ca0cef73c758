use async_trait::async_trait;
use deadpool_postgres::Pool;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use url::Url;

use crate::error::{AppError, Result};
use crate::flow::fragment::DeliveredTokens;
use crate::identity::google::GoogleOAuth;
use crate::identity::{
    AuthEventHub, AuthListener, IdentityProvider, ProviderAccount, SignInOptions, Subscription,
};
use crate::models::connection::Provider;
use crate::models::session::{AuthChange, AuthEvent, Session, SessionKey, SessionUser};
use crate::repositories::user as user_repo;

fn session_redis_key(key: SessionKey) -> String {
    format!("session:{}", key)
}

/// Sessions stored in Redis, created from Google access tokens.
#[derive(Clone)]
pub struct RedisIdentity {
    redis: ConnectionManager,
    db: Pool,
    http: reqwest::Client,
    google: GoogleOAuth,
    session_duration_days: i64,
    hub: AuthEventHub,
}

impl RedisIdentity {
    /// Creates a new `RedisIdentity`.
    pub fn new(
        redis: ConnectionManager,
        db: Pool,
        http: reqwest::Client,
        google: GoogleOAuth,
        session_duration_days: i64,
    ) -> Self {
        Self {
            redis,
            db,
            http,
            google,
            session_duration_days,
            hub: AuthEventHub::new(),
        }
    }
}

#[async_trait]
impl IdentityProvider for RedisIdentity {
    async fn get_session(&self, key: SessionKey) -> Result<Option<Session>> {
        let mut redis = self.redis.clone();
        let session_json: Option<String> = redis.get(session_redis_key(key)).await?;

        let Some(session_json) = session_json else {
            return Ok(None);
        };

        let session: Session = match sonic_rs::from_str(&session_json) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("❌ Invalid session JSON for {}: {}", key, e);
                return Ok(None);
            }
        };

        if session.is_expired() {
            tracing::warn!("❌ Session expired for user: {}", session.user.id);
            if let Err(e) = redis.del::<_, ()>(session_redis_key(key)).await {
                tracing::warn!("Failed to delete expired session {}: {}", key, e);
            }
            return Ok(None);
        }

        Ok(Some(session))
    }

    fn on_auth_state_change(&self, listener: AuthListener) -> Subscription {
        self.hub.subscribe(listener)
    }

    async fn sign_in_with_oauth(&self, provider: Provider, options: &SignInOptions) -> Result<Url> {
        match provider {
            Provider::Google => Ok(self.google.authorize_url(options)),
        }
    }

    async fn accept_redirect(&self, key: SessionKey, tokens: &DeliveredTokens) -> Result<ProviderAccount> {
        let account = self
            .google
            .fetch_account(&self.http, tokens.access_token())
            .await?;

        let user = user_repo::upsert_by_subject(&self.db, &account.subject, account.email.as_deref()).await?;
        tracing::info!("✅ Google account resolved to user: {}", user.id);

        let session = Session::new(
            SessionUser {
                id: user.id,
                email: user.email.clone(),
            },
            chrono::Duration::days(self.session_duration_days),
        );

        let session_json = sonic_rs::to_string(&session)
            .map_err(|e| AppError::Internal(format!("Session serialization failed: {}", e)))?;

        let expiration_seconds: u64 = (self.session_duration_days * 86400) as u64;
        let mut redis = self.redis.clone();
        let _: () = redis
            .set_ex(session_redis_key(key), &session_json, expiration_seconds)
            .await
            .map_err(|e| {
                tracing::error!("❌ Redis set_ex failed: {}", e);
                AppError::Redis(e)
            })?;

        tracing::info!("✅ Session saved to Redis: session:{}", key);

        self.hub.publish(&AuthChange {
            key,
            event: AuthEvent::SignedIn(session),
        });

        Ok(account)
    }

    async fn sign_out(&self, key: SessionKey) -> Result<()> {
        let mut redis = self.redis.clone();
        let _: () = redis.del(session_redis_key(key)).await?;
        tracing::info!("✅ Session deleted from Redis");

        self.hub.publish(&AuthChange {
            key,
            event: AuthEvent::SignedOut,
        });
        Ok(())
    }
}
