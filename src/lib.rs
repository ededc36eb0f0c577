//! dmrs - translation layer between a DM-style SQL driver and an ORM
//!
//! Connections are acquired per statement, results are normalized into
//! [`Record`]s and shaped by the statement's [`QueryIntent`], and driver
//! failures are translated into structured errors.
//!
//! # Example
//! ```ignore
//! use dmrs::{ConnectionConfig, DmClient, QueryIntent};
//!
//! let client = DmClient::connect(ConnectionConfig::load("dmrs.toml")?);
//!
//! let user = client
//!     .execute("SELECT id, name FROM users WHERE id = ?", &[1.into()], QueryIntent::Select)
//!     .await?
//!     .single_record()?;
//!
//! let name = user.get_str("name");
//! ```

pub mod config;
pub mod connection;
pub mod drivers;
pub mod error;
pub mod query;
pub mod traits;
pub mod translator;
pub mod type_parser;
pub mod types;

mod client;

// Re-export main types for convenient access
pub use client::DmClient;
pub use config::ConnectionConfig;
pub use connection::{ConnectOptions, ConnectionHandle, ConnectionManager};
pub use error::{
    DatabaseError, DmError, ForeignKeyConstraintError, NativeError, RelationType, Result,
    UniqueConstraintError, ValidationErrorItem,
};
pub use query::{
    build_index_descriptors, ExecutionOutcome, IndexDescriptor, InsertResult, QueryIntent,
    QueryOptions, TableDescription,
};
pub use traits::{ConnectionPool, RawConnection};
pub use type_parser::{CastField, CastOptions, TypeParser, TypeParserRegistry};
pub use types::{ModelDescriptor, RawValue, Record, SqlValue, UniqueKey, Value};
