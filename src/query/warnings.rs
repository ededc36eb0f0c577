use crate::connection::ConnectionHandle;
use crate::error::Result;
use crate::query::normalize::normalize_rows;
use crate::translator::{translate, ErrorContext};
use crate::types::Record;

const SHOW_WARNINGS: &str = "SHOW WARNINGS";

/// A row of SHOW WARNINGS output.
#[derive(Debug, Clone, PartialEq)]
pub enum WarningRow {
    /// The row carries a `Message` column.
    Message(String),
    /// Any other shape, as `key: value` pairs.
    Fields(Vec<(String, String)>),
}

impl WarningRow {
    pub fn from_record(record: &Record) -> Self {
        match record.get("Message") {
            Some(message) => WarningRow::Message(message.to_string()),
            None => WarningRow::Fields(
                record
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
        }
    }

    fn push_messages(&self, out: &mut Vec<String>) {
        match self {
            WarningRow::Message(message) => out.push(message.clone()),
            WarningRow::Fields(fields) => {
                out.extend(fields.iter().map(|(k, v)| format!("{k}: {v}")));
            }
        }
    }
}

/// Formats the single log line for a set of warnings.
pub fn warning_message(connection_id: &str, rows: &[WarningRow]) -> String {
    let mut messages = Vec::new();
    for row in rows {
        row.push_messages(&mut messages);
    }
    format!("DM Warnings ({}): {}", connection_id, messages.join("; "))
}

/// Fetches and logs the warnings of the previous statement. Never fails:
/// a broken follow-up query is only logged.
pub(crate) async fn log_warnings(connection: &mut ConnectionHandle) {
    match fetch_warnings(connection).await {
        Ok(rows) => {
            let message = warning_message(&connection.id().to_string(), &rows);
            tracing::warn!(target: "dmrs::sql", "{}", message);
        }
        Err(e) => {
            tracing::debug!(target: "dmrs::sql", error = %e, "failed to fetch server warnings");
        }
    }
}

async fn fetch_warnings(connection: &mut ConnectionHandle) -> Result<Vec<WarningRow>> {
    let response = connection
        .execute(SHOW_WARNINGS, &[])
        .await
        .map_err(|e| translate(e, &ErrorContext::new(SHOW_WARNINGS, &[])))?;
    let records = normalize_rows(response.rows, &response.meta_data, None).await?;
    Ok(records.iter().map(WarningRow::from_record).collect())
}
