use serde::Serialize;
use std::fmt;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Third-party providers an account can be linked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
}

impl Provider {
    /// The tag stored in the `provider` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
        }
    }

    /// Parses a stored provider tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "google" => Some(Provider::Google),
            _ => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored link between a local user and a provider account.
///
/// At most one record exists per (`user_id`, `provider`). Token fields are
/// wiped from memory when the record is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ConnectionRecord {
    /// The local user owning the link.
    #[zeroize(skip)]
    pub user_id: Uuid,
    /// The provider the account lives at.
    #[zeroize(skip)]
    pub provider: Provider,
    /// The account identifier at the provider.
    #[zeroize(skip)]
    pub provider_account_id: String,
    /// Opaque access token.
    pub access_token: String,
    /// Opaque refresh token, when the provider delivered one.
    pub refresh_token: Option<String>,
    /// Expiry of the access token in seconds since epoch.
    #[zeroize(skip)]
    pub expires_at: i64,
}

impl ConnectionRecord {
    /// The upsert key.
    pub fn key(&self) -> (Uuid, Provider) {
        (self.user_id, self.provider)
    }
}

impl fmt::Debug for ConnectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRecord")
            .field("user_id", &self.user_id)
            .field("provider", &self.provider)
            .field("provider_account_id", &self.provider_account_id)
            .field("access_token", &"[redacted]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Connect status reported to the browser. Never carries tokens.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub provider: Provider,
    pub connected: bool,
    pub provider_account_id: Option<String>,
    pub expires_at: Option<i64>,
    pub expired: bool,
}

impl ConnectionStatus {
    /// Status for a user without a stored record.
    pub fn disconnected(provider: Provider) -> Self {
        Self {
            provider,
            connected: false,
            provider_account_id: None,
            expires_at: None,
            expired: false,
        }
    }

    /// Status derived from a stored record at `now` (seconds since epoch).
    pub fn from_record(record: &ConnectionRecord, now: i64) -> Self {
        Self {
            provider: record.provider,
            connected: true,
            provider_account_id: Some(record.provider_account_id.clone()),
            expires_at: Some(record.expires_at),
            expired: now >= record.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_tokens() {
        let record = ConnectionRecord {
            user_id: Uuid::new_v4(),
            provider: Provider::Google,
            provider_account_id: "sub-1".to_string(),
            access_token: "ya29.secret".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expires_at: 100,
        };

        let rendered = format!("{:?}", record);
        assert!(!rendered.contains("ya29.secret"));
        assert!(!rendered.contains("1//refresh"));
        assert!(rendered.contains("sub-1"));
    }

    #[test]
    fn status_marks_expired_records() {
        let record = ConnectionRecord {
            user_id: Uuid::new_v4(),
            provider: Provider::Google,
            provider_account_id: "sub-1".to_string(),
            access_token: "t".to_string(),
            refresh_token: None,
            expires_at: 1_000,
        };

        assert!(!ConnectionStatus::from_record(&record, 999).expired);
        assert!(ConnectionStatus::from_record(&record, 1_000).expired);
        assert_eq!(Provider::from_tag(Provider::Google.as_str()), Some(Provider::Google));
    }
}
