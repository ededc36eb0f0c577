//! Statement execution and result normalization.

mod describe;
mod indexes;
mod intent;
mod normalize;
mod outcome;
mod warnings;

use std::time::Instant;

pub use describe::{FieldDescription, TableDescription};
pub use indexes::{
    build_index_descriptors, index_descriptors_from_records, IndexDescriptor, IndexField, IndexRow,
    SortOrder,
};
pub use intent::{QueryIntent, QueryOptions};
pub use normalize::{coerce_big_int, decode_json, materialize, normalize_row, normalize_rows};
pub use outcome::{format_results, ExecutionOutcome, InsertResult, SERVER_VERSION};
pub use warnings::{warning_message, WarningRow};

use crate::connection::ConnectionHandle;
use crate::error::Result;
use crate::translator::{translate, ErrorContext};
use crate::types::SqlValue;

/// One statement bound to a borrowed connection.
pub struct Query<'c> {
    connection: &'c mut ConnectionHandle,
    options: QueryOptions,
}

impl<'c> Query<'c> {
    pub fn new(connection: &'c mut ConnectionHandle, options: QueryOptions) -> Self {
        Self {
            connection,
            options,
        }
    }

    /// Executes `sql` and shapes the response by the statement's intent.
    /// Driver failures come back translated into structured errors.
    pub async fn run(self, sql: &str, params: &[SqlValue]) -> Result<ExecutionOutcome> {
        let Query {
            connection,
            options,
        } = self;

        tracing::debug!(
            target: "dmrs::sql",
            connection = %connection.id(),
            intent = ?options.intent,
            "executing: {}",
            sql
        );
        if !params.is_empty() {
            tracing::debug!(target: "dmrs::sql", "parameters({:?})", params);
        }

        let started = Instant::now();
        let executed = connection.execute(sql, params).await;
        tracing::debug!(
            target: "dmrs::sql",
            elapsed_ms = started.elapsed().as_millis() as u64,
            "executed: {}",
            sql
        );

        let response = executed.map_err(|e| {
            let ctx = ErrorContext::new(sql, params)
                .model(options.model.as_deref())
                .instance(options.instance.as_ref());
            translate(e, &ctx)
        })?;

        if options.show_warnings
            && options.intent.is_select_family()
            && response.header.warning_status > 0
        {
            warnings::log_warnings(connection).await;
        }

        format_results(response, options).await
    }
}
