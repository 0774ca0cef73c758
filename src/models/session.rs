use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies one browser's session slot. Carried in the `session_id` cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey(pub Uuid);

impl SessionKey {
    /// Generates a fresh key for a visitor without a cookie.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a key from a cookie value.
    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value).ok().map(Self)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The authenticated user as seen through a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    /// The local user id.
    pub id: Uuid,
    /// The user's email, when the provider shared it.
    pub email: Option<String>,
}

/// Represents a user session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The user this session belongs to.
    pub user: SessionUser,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the session expires.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Creates a session for `user` lasting `duration`.
    pub fn new(user: SessionUser, duration: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            user,
            created_at: now,
            expires_at: now + duration,
        }
    }

    /// Whether the session is past its expiry.
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// An authentication state change published by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut,
}

impl AuthEvent {
    /// The session held after this event.
    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthEvent::SignedIn(session) => Some(session),
            AuthEvent::SignedOut => None,
        }
    }
}

/// An [`AuthEvent`] addressed to one session key.
#[derive(Debug, Clone)]
pub struct AuthChange {
    pub key: SessionKey,
    pub event: AuthEvent,
}
