use async_trait::async_trait;

use crate::connection::ConnectOptions;
use crate::error::NativeError;
use crate::types::{RawResponse, SqlValue};

/// External pool that hands out raw driver connections.
/// Sizing and eviction are the pool's business; this crate only asks for
/// one connection at a time.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// One-shot acquisition of a connection configured by `options`.
    async fn get_connection(
        &self,
        options: &ConnectOptions,
    ) -> Result<Box<dyn RawConnection>, NativeError>;
}

/// A single driver connection.
/// Drivers are responsible for:
/// - Converting SqlValue parameters to native types
/// - Running every wire value through the bound type-cast hook
/// - Reporting rows, column metadata and the statement summary
#[async_trait]
pub trait RawConnection: Send {
    /// Execute one statement. Placeholder syntax is the driver's own.
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<RawResponse, NativeError>;

    /// Close the connection and wait for the driver to confirm.
    async fn close(&mut self) -> Result<(), NativeError>;

    /// Observable closed state.
    fn is_closed(&self) -> bool;
}
