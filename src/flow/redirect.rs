use chrono::Utc;
use std::sync::Arc;

use crate::flow::fragment::DeliveredTokens;
use crate::flow::observer::SessionObserver;
use crate::identity::IdentityProvider;
use crate::models::connection::{ConnectionRecord, Provider};
use crate::models::notice::Notice;
use crate::repositories::connection::ConnectionStore;

/// Result of processing a token-carrying landing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectOutcome {
    /// The connection record was stored.
    Connected(Notice),
    /// Nothing was stored or storing failed; the user stays on the page.
    Failed(Notice),
}

impl RedirectOutcome {
    pub fn is_connected(&self) -> bool {
        matches!(self, RedirectOutcome::Connected(_))
    }

    pub fn notice(&self) -> &Notice {
        match self {
            RedirectOutcome::Connected(notice) | RedirectOutcome::Failed(notice) => notice,
        }
    }

    pub fn into_notice(self) -> Notice {
        match self {
            RedirectOutcome::Connected(notice) | RedirectOutcome::Failed(notice) => notice,
        }
    }
}

/// Turns tokens delivered by a Google redirect into a stored connection.
#[derive(Clone)]
pub struct RedirectHandler {
    identity: Arc<dyn IdentityProvider>,
    connections: Arc<dyn ConnectionStore>,
    validity_secs: i64,
}

impl RedirectHandler {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        connections: Arc<dyn ConnectionStore>,
        validity_secs: i64,
    ) -> Self {
        Self {
            identity,
            connections,
            validity_secs,
        }
    }

    /// Confirms the session behind `tokens` and upserts exactly one record.
    pub async fn handle(&self, tokens: &DeliveredTokens, observer: &SessionObserver) -> RedirectOutcome {
        let key = observer.key();

        let account = match self.identity.accept_redirect(key, tokens).await {
            Ok(account) => account,
            Err(e) => {
                tracing::warn!("❌ Provider rejected redirect for {}: {}", key, e);
                return RedirectOutcome::Failed(Notice::error("Authentication failed", e.user_message()));
            }
        };

        let session = match observer.refresh().await {
            Ok(Some(session)) => session,
            Ok(None) => {
                tracing::warn!("❌ No session for {} after accepting redirect", key);
                return RedirectOutcome::Failed(Notice::error(
                    "Authentication failed",
                    "Your sign-in could not be confirmed. Please try again.",
                ));
            }
            Err(e) => {
                tracing::warn!("❌ Session check failed for {}: {}", key, e);
                return RedirectOutcome::Failed(Notice::error("Authentication failed", e.user_message()));
            }
        };

        let record = ConnectionRecord {
            user_id: session.user.id,
            provider: Provider::Google,
            provider_account_id: account.subject,
            access_token: tokens.access_token().to_string(),
            refresh_token: tokens.refresh_token().map(str::to_string),
            expires_at: Utc::now().timestamp() + self.validity_secs,
        };

        match self.connections.upsert(&record).await {
            Ok(()) => {
                tracing::info!("✅ Gmail connected for user: {}", record.user_id);
                RedirectOutcome::Connected(Notice::info(
                    "Gmail connected",
                    "Your Gmail account has been connected successfully",
                ))
            }
            Err(e) => {
                tracing::error!("❌ Failed to store Gmail connection for {}: {}", record.user_id, e);
                RedirectOutcome::Failed(Notice::error(
                    "Connection error",
                    "Failed to save your Gmail connection. Please try again.",
                ))
            }
        }
    }
}
