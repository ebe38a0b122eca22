use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;
use thiserror::Error;

use crate::models::{MatchRequest, RequestStatus};
use crate::services::store::{RequestLedger, StoreError};

/// Errors that can occur when interacting with PostgreSQL
#[derive(Debug, Error)]
pub enum PostgresError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),
}

impl From<PostgresError> for StoreError {
    fn from(value: PostgresError) -> Self {
        StoreError::Unavailable(value.to_string())
    }
}

/// PostgreSQL-backed ledger of connection requests
///
/// The recommendation pipeline only reads from it to keep members with an
/// open or accepted request out of each other's lists.
pub struct PostgresRequestLedger {
    pool: PgPool,
}

impl PostgresRequestLedger {
    /// Connect and run pending migrations
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, PostgresError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a ledger from optional settings values
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
        idle_timeout_secs: Option<u64>,
    ) -> Result<Self, PostgresError> {
        tracing::info!("Connecting to PostgreSQL request ledger");

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            Duration::from_secs(acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(idle_timeout_secs.unwrap_or(600)),
        )
        .await
    }

    /// All requests sent or received by a member
    pub async fn fetch_requests(&self, user_id: &str) -> Result<Vec<MatchRequest>, PostgresError> {
        let query = r#"
            SELECT from_id, to_id, status
            FROM connection_requests
            WHERE from_id = $1 OR to_id = $1
        "#;

        let rows = sqlx::query(query).bind(user_id).fetch_all(&self.pool).await?;

        let requests = rows
            .iter()
            .map(|row| {
                Ok(MatchRequest {
                    from_id: row.try_get("from_id")?,
                    to_id: row.try_get("to_id")?,
                    status: row.try_get::<RequestStatus, _>("status")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        tracing::debug!("Member {} has {} connection requests", user_id, requests.len());

        Ok(requests)
    }

    /// Health check for the database connection
    pub async fn ping(&self) -> Result<(), PostgresError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl RequestLedger for PostgresRequestLedger {
    async fn requests_involving(&self, user_id: &str) -> Result<Vec<MatchRequest>, StoreError> {
        Ok(self.fetch_requests(user_id).await?)
    }

    async fn health_check(&self) -> bool {
        match self.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Request ledger health check failed: {}", e);
                false
            }
        }
    }
}
