use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::flow::AuthFlow;
use crate::identity::IdentityProvider;
use crate::identity::google::GoogleOAuth;
use crate::identity::redis::RedisIdentity;
use crate::repositories::connection::{ConnectionStore, PgConnectionStore};

/// The application's state.
///
/// Built once at startup and shared by every request; backends are passed
/// in explicitly so tests can swap them.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Config,
    /// The identity provider.
    pub identity: Arc<dyn IdentityProvider>,
    /// The account connection store.
    pub connections: Arc<dyn ConnectionStore>,
    /// The connect flow.
    pub flow: AuthFlow,
}

impl AppState {
    /// Creates a new `AppState` backed by PostgreSQL, Redis and Google.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(&config.database_url)?;
        tracing::info!("✅ PostgreSQL Pool initialized with deadpool-postgres");

        crate::db::ensure_schema(&db).await?;

        let redis_client = redis::Client::open(config.redis_url.as_str())?;
        let redis = ConnectionManager::new(redis_client).await?;
        tracing::info!("✅ Redis Connection Manager initialized (pooled)");

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        let google = GoogleOAuth::from_config(config)?;

        let identity = RedisIdentity::new(
            redis,
            db.clone(),
            http,
            google,
            config.session_duration_days,
        );
        tracing::info!("✅ Identity provider initialized (Google + Redis sessions)");

        Ok(Self::with_backends(
            config.clone(),
            Arc::new(identity),
            Arc::new(PgConnectionStore::new(db)),
        ))
    }

    /// Creates an `AppState` around already constructed backends.
    pub fn with_backends(
        config: Config,
        identity: Arc<dyn IdentityProvider>,
        connections: Arc<dyn ConnectionStore>,
    ) -> Self {
        let flow = AuthFlow::new(
            identity.clone(),
            connections.clone(),
            config.token_validity_secs,
        );

        Self {
            config,
            identity,
            connections,
            flow,
        }
    }
}
