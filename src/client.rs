use std::sync::Arc;

use crate::config::ConnectionConfig;
use crate::connection::ConnectionManager;
use crate::drivers::TokioPostgresPool;
use crate::error::Result;
use crate::query::{ExecutionOutcome, Query, QueryOptions};
use crate::traits::ConnectionPool;
use crate::type_parser::TypeParser;
use crate::types::SqlValue;

/// Main entry point for dmrs.
/// Acquires a connection per statement, runs it and releases it again.
pub struct DmClient {
    manager: ConnectionManager,
}

impl DmClient {
    /// Create a client backed by the bundled tokio-postgres driver.
    ///
    /// # Example
    /// ```ignore
    /// let config = ConnectionConfig::load("dmrs.toml")?;
    /// let client = DmClient::connect(config);
    /// ```
    pub fn connect(config: ConnectionConfig) -> Self {
        Self::with_pool(Arc::new(TokioPostgresPool::new()), config)
    }

    /// Create a new client with a custom pool.
    /// Useful for testing or using alternative drivers.
    pub fn with_pool(pool: Arc<dyn ConnectionPool>, config: ConnectionConfig) -> Self {
        Self {
            manager: ConnectionManager::new(pool, config),
        }
    }

    pub fn with_manager(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Execute one statement.
    ///
    /// Warnings are fetched when either the configuration or `options`
    /// enables them. The connection is released whatever the outcome.
    pub async fn execute(
        &self,
        sql: &str,
        params: &[SqlValue],
        options: impl Into<QueryOptions>,
    ) -> Result<ExecutionOutcome> {
        let mut options = options.into();
        options.show_warnings |= self.manager.config().show_warnings;

        let mut connection = self.manager.acquire().await?;
        let outcome = Query::new(&mut connection, options).run(sql, params).await;

        if let Err(e) = self.manager.release(&mut connection).await {
            tracing::warn!(
                target: "dmrs::connection",
                id = %connection.id(),
                error = %e,
                "failed to release connection"
            );
        }

        outcome
    }

    pub fn register_type_parser(&self, type_tag: &str, parser: TypeParser) {
        self.manager.register_type_parser(type_tag, parser);
    }

    pub fn clear_type_parsers(&self) {
        self.manager.clear_type_parsers();
    }
}
