use serde::Serialize;

use crate::flow::{AUTH_PATH, HOME_PATH};
use crate::identity::{IdentityProvider, SignInOptions};
use crate::models::connection::Provider;
use crate::models::notice::Notice;
use crate::models::session::SessionKey;

/// Result of a sign-in, connect or sign-out action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    /// Provider URL the browser must open.
    pub authorize_url: Option<String>,
    pub notice: Option<Notice>,
    /// Local path to navigate to.
    pub redirect_to: Option<String>,
}

impl ActionOutcome {
    fn authorize(url: url::Url) -> Self {
        Self {
            authorize_url: Some(url.into()),
            ..Self::default()
        }
    }

    fn notice(notice: Notice) -> Self {
        Self {
            notice: Some(notice),
            ..Self::default()
        }
    }

    fn navigate(notice: Notice, path: &str) -> Self {
        Self {
            notice: Some(notice),
            redirect_to: Some(path.to_string()),
            ..Self::default()
        }
    }
}

/// Starts a Google sign-in that lands back on the auth entry point.
pub async fn sign_in(identity: &dyn IdentityProvider, origin: &str) -> ActionOutcome {
    tracing::info!("🔐 Sign-in requested");

    match identity
        .sign_in_with_oauth(Provider::Google, &SignInOptions::login(origin))
        .await
    {
        Ok(url) => ActionOutcome::authorize(url),
        Err(e) => {
            tracing::error!("Login error: {}", e);
            ActionOutcome::notice(Notice::error("Login failed", e.user_message()))
        }
    }
}

/// Starts the Gmail connect step for a signed-in user.
///
/// Without a session the user is sent to the auth entry point instead.
pub async fn connect_gmail(identity: &dyn IdentityProvider, key: Option<SessionKey>, origin: &str) -> ActionOutcome {
    let session = match key {
        Some(key) => identity.get_session(key).await.unwrap_or_else(|e| {
            tracing::warn!("Error getting session for {}: {}", key, e);
            None
        }),
        None => None,
    };

    let Some(session) = session else {
        return ActionOutcome::navigate(
            Notice::info(
                "Authentication required",
                "Please sign in to connect your Gmail account",
            ),
            AUTH_PATH,
        );
    };

    tracing::info!("📬 Gmail connect requested by user: {}", session.user.id);

    match identity
        .sign_in_with_oauth(Provider::Google, &SignInOptions::gmail_connect(origin))
        .await
    {
        Ok(url) => ActionOutcome::authorize(url),
        Err(e) => {
            tracing::error!("Connection error: {}", e);
            ActionOutcome::notice(Notice::error("Connection failed", e.user_message()))
        }
    }
}

/// Ends the session for `key`.
pub async fn sign_out(identity: &dyn IdentityProvider, key: SessionKey) -> ActionOutcome {
    match identity.sign_out(key).await {
        Ok(()) => {
            tracing::info!("👋 Signed out: {}", key);
            ActionOutcome::navigate(
                Notice::info("Signed out", "You have been signed out successfully"),
                HOME_PATH,
            )
        }
        Err(e) => {
            tracing::error!("Logout error: {}", e);
            ActionOutcome::notice(Notice::error("Sign out failed", "An unexpected error occurred"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::memory::{MemoryIdentity, sample_user};

    const ORIGIN: &str = "http://localhost:3000";

    #[tokio::test]
    async fn sign_in_returns_authorize_url_back_to_auth() {
        let identity = MemoryIdentity::new();

        let outcome = sign_in(&identity, ORIGIN).await;

        let url = url::Url::parse(&outcome.authorize_url.unwrap()).unwrap();
        assert!(url
            .query_pairs()
            .any(|(k, v)| k == "redirect_uri" && v == "http://localhost:3000/auth"));
        assert_eq!(outcome.notice, None);
    }

    #[tokio::test]
    async fn sign_in_failure_surfaces_notice() {
        let identity = MemoryIdentity::new();
        identity.fail_sign_in("provider disabled").await;

        let outcome = sign_in(&identity, ORIGIN).await;

        assert_eq!(outcome.authorize_url, None);
        assert_eq!(outcome.notice.unwrap().title, "Login failed");
    }

    #[tokio::test]
    async fn connect_without_session_sends_user_to_auth() {
        let identity = MemoryIdentity::new();

        let outcome = connect_gmail(&identity, Some(SessionKey::generate()), ORIGIN).await;

        assert_eq!(outcome.redirect_to.as_deref(), Some(AUTH_PATH));
        assert_eq!(outcome.notice.unwrap().title, "Authentication required");
        assert_eq!(outcome.authorize_url, None);
    }

    #[tokio::test]
    async fn connect_with_session_requests_gmail_scopes() {
        let identity = MemoryIdentity::new();
        let key = SessionKey::generate();
        identity.sign_in(key, sample_user("u@example.com")).await;

        let outcome = connect_gmail(&identity, Some(key), ORIGIN).await;

        let url = url::Url::parse(&outcome.authorize_url.unwrap()).unwrap();
        assert!(url
            .query_pairs()
            .any(|(k, v)| k == "redirect_uri" && v == "http://localhost:3000/auth?gmailConnect=true"));
        assert!(url.query_pairs().any(|(k, v)| k == "prompt" && v == "consent"));
    }

    #[tokio::test]
    async fn connect_failure_surfaces_notice() {
        let identity = MemoryIdentity::new();
        let key = SessionKey::generate();
        identity.sign_in(key, sample_user("u@example.com")).await;
        identity.fail_sign_in("quota exceeded").await;

        let outcome = connect_gmail(&identity, Some(key), ORIGIN).await;

        let notice = outcome.notice.unwrap();
        assert_eq!(notice.title, "Connection failed");
        assert!(notice.is_error());
    }

    #[tokio::test]
    async fn sign_out_navigates_home_and_clears_session() {
        let identity = MemoryIdentity::new();
        let key = SessionKey::generate();
        identity.sign_in(key, sample_user("u@example.com")).await;

        let outcome = sign_out(&identity, key).await;

        assert_eq!(outcome.redirect_to.as_deref(), Some(HOME_PATH));
        assert!(identity.get_session(key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sign_out_failure_keeps_session() {
        let identity = MemoryIdentity::new();
        let key = SessionKey::generate();
        identity.sign_in(key, sample_user("u@example.com")).await;
        identity.fail_sign_out("network").await;

        let outcome = sign_out(&identity, key).await;

        assert_eq!(outcome.redirect_to, None);
        assert_eq!(outcome.notice.unwrap().title, "Sign out failed");
        assert!(identity.get_session(key).await.unwrap().is_some());
    }
}
