use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::config::ConnectionConfig;
use crate::error::{DmError, NativeError, Result};
use crate::traits::{ConnectionPool, RawConnection};
use crate::type_parser::{default_parsers, CastOptions, TypeCast, TypeParser, TypeParserRegistry};
use crate::types::{RawResponse, SqlValue};

/// Driver-level options passed to the pool for each acquisition.
#[derive(Clone)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    /// `host:port`, as expected by drivers taking a single address.
    pub connect_string: String,
    pub user: String,
    pub password: Option<String>,
    pub database: Option<String>,
    pub timezone: String,
    pub flags: String,
    pub support_big_numbers: bool,
    pub big_number_strings: bool,
    pub dialect_options: BTreeMap<String, String>,
    pub type_cast: TypeCast,
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("connect_string", &self.connect_string)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("timezone", &self.timezone)
            .field("flags", &self.flags)
            .field("dialect_options", &self.dialect_options)
            .finish_non_exhaustive()
    }
}

/// A connection borrowed from the pool for one acquire/use/release cycle.
pub struct ConnectionHandle {
    id: Uuid,
    inner: Box<dyn RawConnection>,
}

impl ConnectionHandle {
    pub fn new(inner: Box<dyn RawConnection>) -> Self {
        Self {
            id: Uuid::new_v4(),
            inner,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub(crate) async fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> std::result::Result<RawResponse, NativeError> {
        self.inner.execute(sql, params).await
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Acquires connections from a pool, installs the type-cast hook and
/// releases connections idempotently.
pub struct ConnectionManager {
    pool: Arc<dyn ConnectionPool>,
    config: ConnectionConfig,
    registry: Arc<TypeParserRegistry>,
}

impl ConnectionManager {
    /// Creates a manager bound to the process-wide parser registry and
    /// registers the default parser set in it.
    pub fn new(pool: Arc<dyn ConnectionPool>, config: ConnectionConfig) -> Self {
        Self::with_registry(pool, config, TypeParserRegistry::global())
    }

    pub fn with_registry(
        pool: Arc<dyn ConnectionPool>,
        config: ConnectionConfig,
        registry: Arc<TypeParserRegistry>,
    ) -> Self {
        registry.refresh(default_parsers());
        Self {
            pool,
            config,
            registry,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TypeParserRegistry> {
        &self.registry
    }

    pub fn register_type_parser(&self, type_tag: &str, parser: TypeParser) {
        self.registry.register(type_tag, parser);
    }

    pub fn refresh_type_parsers<I>(&self, parsers: I)
    where
        I: IntoIterator<Item = (String, TypeParser)>,
    {
        self.registry.refresh(parsers);
    }

    pub fn clear_type_parsers(&self) {
        self.registry.clear();
    }

    /// Builds the driver options for a new connection.
    pub fn connect_options(&self) -> ConnectOptions {
        let config = &self.config;
        let type_cast = TypeCast::new(
            Arc::clone(&self.registry),
            CastOptions {
                timezone: config.timezone.clone(),
            },
        );

        ConnectOptions {
            host: config.host.clone(),
            port: config.port,
            connect_string: format!("{}:{}", config.host, config.port),
            user: config.username.clone(),
            password: config.password.clone(),
            database: config.database.clone(),
            timezone: config.timezone.clone(),
            flags: "-FOUND_ROWS".to_string(),
            support_big_numbers: true,
            big_number_strings: false,
            dialect_options: config.dialect_options.clone(),
            type_cast,
        }
    }

    /// Requests a new connection from the pool.
    pub async fn acquire(&self) -> Result<ConnectionHandle> {
        let options = self.connect_options();
        let raw = self.pool.get_connection(&options).await.map_err(|e| {
            tracing::debug!(target: "dmrs::connection", error = %e, "connection acquisition failed");
            DmError::Connection(e)
        })?;

        let handle = ConnectionHandle::new(raw);
        tracing::debug!(
            target: "dmrs::connection",
            id = %handle.id(),
            address = %options.connect_string,
            "connection acquired"
        );
        Ok(handle)
    }

    /// Closes `handle`. A handle that is already closed is left alone.
    pub async fn release(&self, handle: &mut ConnectionHandle) -> Result<()> {
        if handle.is_closed() {
            tracing::debug!(
                target: "dmrs::connection",
                id = %handle.id(),
                "connection tried to disconnect but was already at CLOSED state"
            );
            return Ok(());
        }

        handle.inner.close().await.map_err(DmError::Connection)?;
        tracing::debug!(target: "dmrs::connection", id = %handle.id(), "connection released");
        Ok(())
    }

    /// Always reports the connection as usable; no liveness probe is made.
    pub fn validate(&self, _handle: &ConnectionHandle) -> bool {
        true
    }
}
