//! Core CareHaus functionality
//!
//! This module contains the main CareHaus struct and its implementation,
//! providing centralized coordination for the connection pool, the resource
//! store, and the transaction layer.

use crate::errors::CareHausError;
use config::AppConfig;
use resource_store::ResourceStore;
use sqlx::PgPool;
use std::future::Future;
use std::time::Duration;
use tx_system::{CarehausError, ConnectionHandle, TxOptions};

/// Main CareHaus coordinator that manages the database connection pool and
/// the resource store
pub struct CareHaus {
    pool: PgPool,
    resources: ResourceStore,
    statement_timeout: Option<Duration>,
}

impl CareHaus {
    /// Create new CareHaus with database connection
    pub async fn new(config: AppConfig) -> Result<Self, CareHausError> {
        let connection_string = config.database.connection_string();

        let mut pool_options = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .min_connections(config.database.min_connections)
            .idle_timeout(Duration::from_secs(config.database.idle_timeout_seconds));

        // Set max lifetime if specified
        if config.database.max_lifetime_seconds > 0 {
            pool_options = pool_options
                .max_lifetime(Duration::from_secs(config.database.max_lifetime_seconds));
        }

        let pool = pool_options.connect(&connection_string).await?;
        let resources = ResourceStore::new(pool.clone());

        let statement_timeout = match config.transaction.statement_timeout_seconds {
            0 => None,
            seconds => Some(Duration::from_secs(seconds)),
        };

        Ok(Self {
            pool,
            resources,
            statement_timeout,
        })
    }

    /// Get database pool reference
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get the resource store
    pub fn resources(&self) -> &ResourceStore {
        &self.resources
    }

    /// Run a callback under a logical transaction
    ///
    /// Nested calls on the same task join the enclosing transaction through a
    /// savepoint. The configured statement timeout applies unless the options
    /// carry their own.
    pub async fn with_transaction<F, Fut, T>(
        &self,
        options: TxOptions,
        callback: F,
    ) -> Result<T, CarehausError>
    where
        F: FnOnce(ConnectionHandle) -> Fut,
        Fut: Future<Output = Result<T, CarehausError>>,
    {
        let mut options = options;
        if options.statement_timeout.is_none() {
            options.statement_timeout = self.statement_timeout;
        }
        tx_system::with_transaction(&self.pool, options, callback).await
    }

    /// Check database connection health
    pub async fn health_check(&self) -> Result<(), CareHausError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
