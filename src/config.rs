use std::env;
use std::net::SocketAddr;
use anyhow::{Context, Result};

/// Default Google authorization endpoint.
pub const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// Default Google userinfo endpoint.
pub const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// The application's configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// The URL of the Redis server.
    pub redis_url: String,
    /// The duration of a session in days.
    pub session_duration_days: i64,
    /// The OAuth client id registered with Google.
    pub google_client_id: String,
    /// The Google authorization endpoint.
    pub google_authorize_url: String,
    /// The Google userinfo endpoint used to validate delivered access tokens.
    pub google_userinfo_url: String,
    /// Public origin of the site, used to build `redirect_to` targets.
    pub public_origin: String,
    /// How long a stored access token is considered valid, in seconds.
    pub token_validity_secs: i64,
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Whether cookies must carry the `Secure` attribute.
    pub secure_cookies: bool,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let token_validity_secs =
            positive_setting("TOKEN_VALIDITY_SECS", env::var("TOKEN_VALIDITY_SECS").ok(), 3600)?;
        let session_duration_days =
            positive_setting("SESSION_DURATION_DAYS", env::var("SESSION_DURATION_DAYS").ok(), 7)?;

        let public_origin = env::var("PUBLIC_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());
        url::Url::parse(&public_origin).context("PUBLIC_ORIGIN must be an absolute URL")?;

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            session_duration_days,
            google_client_id: env::var("GOOGLE_CLIENT_ID")
                .context("GOOGLE_CLIENT_ID must be set")?,
            google_authorize_url: env::var("GOOGLE_AUTHORIZE_URL")
                .unwrap_or_else(|_| GOOGLE_AUTHORIZE_URL.to_string()),
            google_userinfo_url: env::var("GOOGLE_USERINFO_URL")
                .unwrap_or_else(|_| GOOGLE_USERINFO_URL.to_string()),
            public_origin: public_origin.trim_end_matches('/').to_string(),
            token_validity_secs,
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
                .parse()
                .context("Invalid BIND_ADDR")?,
            secure_cookies: env::var("APP_ENV")
                .unwrap_or_else(|_| "development".to_string()) == "production",
        })
    }
}

/// Parses a whole-number setting that must be greater than zero.
fn positive_setting(name: &str, raw: Option<String>, default: i64) -> Result<i64> {
    let value = match raw {
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .with_context(|| format!("Invalid {}", name))?,
        None => default,
    };

    if value <= 0 {
        anyhow::bail!("{} must be positive", name);
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_setting_uses_default_when_unset() {
        assert_eq!(positive_setting("SESSION_DURATION_DAYS", None, 7).unwrap(), 7);
        assert_eq!(
            positive_setting("SESSION_DURATION_DAYS", Some("30".to_string()), 7).unwrap(),
            30
        );
    }

    #[test]
    fn positive_setting_rejects_zero_negative_and_garbage() {
        for raw in ["0", "-1", "seven"] {
            let err = positive_setting("SESSION_DURATION_DAYS", Some(raw.to_string()), 7).unwrap_err();
            assert!(err.to_string().contains("SESSION_DURATION_DAYS"), "{}", raw);
        }
    }
}
