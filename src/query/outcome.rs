use crate::error::{DmError, Result};
use crate::query::describe::TableDescription;
use crate::query::indexes::{index_descriptors_from_records, IndexDescriptor};
use crate::query::intent::{QueryIntent, QueryOptions};
use crate::query::normalize::normalize_rows;
use crate::types::{ColumnMetadata, ModelDescriptor, RawResponse, RawRow, Record, ResultHeader, Value};

/// Reported for version queries; the server is never asked.
pub const SERVER_VERSION: &str = "1.0.0";

/// What an insert produced.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertResult {
    /// The bound instance, with its auto-increment attribute assigned.
    Instance(Record),
    /// One `{primary key: id}` record per inserted row, for bulk inserts
    /// into an auto-increment primary key.
    Identities(Vec<Record>),
    /// The identity reported by the driver.
    InsertId(Option<i64>),
}

/// Typed result of one statement, shaped by its [`QueryIntent`].
#[derive(Debug)]
pub enum ExecutionOutcome {
    /// Select, ShowTables, ShowConstraints and ForeignKeys.
    Records(Vec<Record>),
    Description(TableDescription),
    Indexes(Vec<IndexDescriptor>),
    Inserted {
        result: InsertResult,
        affected_rows: u64,
    },
    Updated {
        instance: Option<Record>,
        affected_rows: u64,
    },
    Upserted {
        instance: Option<Record>,
        /// True when exactly one row was affected, i.e. the row was inserted.
        created: bool,
    },
    /// BulkUpdate and BulkDelete.
    Affected(u64),
    /// First row of a procedure call, not normalized.
    Row(Option<RawRow>),
    Version(&'static str),
    /// Normalized records alongside what remains of the raw response.
    Raw {
        records: Vec<Record>,
        header: ResultHeader,
        meta_data: Vec<ColumnMetadata>,
    },
    /// The bound instance, untouched.
    Instance(Option<Record>),
}

impl ExecutionOutcome {
    /// Records of a record-set outcome; empty for any other outcome.
    pub fn into_records(self) -> Vec<Record> {
        match self {
            ExecutionOutcome::Records(records) | ExecutionOutcome::Raw { records, .. } => records,
            _ => Vec::new(),
        }
    }

    /// Extracts a single record from a record-set outcome.
    /// Returns an error if there are zero or more than one records.
    pub fn single_record(self) -> Result<Record> {
        let mut records = self.into_records();
        if records.len() != 1 {
            return Err(DmError::UnexpectedRowCount {
                expected: 1,
                actual: records.len(),
            });
        }
        Ok(records.remove(0))
    }

    pub fn affected_rows(&self) -> Option<u64> {
        match self {
            ExecutionOutcome::Inserted { affected_rows, .. }
            | ExecutionOutcome::Updated { affected_rows, .. }
            | ExecutionOutcome::Affected(affected_rows) => Some(*affected_rows),
            _ => None,
        }
    }
}

/// Shapes a successful response according to the statement's intent.
pub async fn format_results(response: RawResponse, options: QueryOptions) -> Result<ExecutionOutcome> {
    let QueryOptions {
        intent,
        model,
        mut instance,
        ..
    } = options;
    let model = model.as_deref();
    let RawResponse {
        rows,
        meta_data,
        header,
    } = response;

    let outcome = match intent {
        QueryIntent::Select
        | QueryIntent::ShowTables
        | QueryIntent::ShowConstraints
        | QueryIntent::ForeignKeys => {
            ExecutionOutcome::Records(normalize_rows(rows, &meta_data, model).await?)
        }
        QueryIntent::Describe => {
            let records = normalize_rows(rows, &meta_data, model).await?;
            ExecutionOutcome::Description(TableDescription::from_records(&records))
        }
        QueryIntent::ShowIndexes => {
            let records = normalize_rows(rows, &meta_data, model).await?;
            ExecutionOutcome::Indexes(index_descriptors_from_records(&records))
        }
        QueryIntent::Insert => {
            assign_insert_id(&header, model, instance.as_mut());
            ExecutionOutcome::Inserted {
                result: insert_result(&header, model, instance),
                affected_rows: header.rows_affected,
            }
        }
        QueryIntent::Update => ExecutionOutcome::Updated {
            instance,
            affected_rows: header.rows_affected,
        },
        QueryIntent::BulkUpdate | QueryIntent::BulkDelete => {
            ExecutionOutcome::Affected(header.rows_affected)
        }
        QueryIntent::Upsert => ExecutionOutcome::Upserted {
            instance,
            created: header.rows_affected == 1,
        },
        QueryIntent::Call => ExecutionOutcome::Row(rows.into_iter().next()),
        QueryIntent::Version => ExecutionOutcome::Version(SERVER_VERSION),
        QueryIntent::Raw => ExecutionOutcome::Raw {
            records: normalize_rows(rows, &meta_data, model).await?,
            header,
            meta_data,
        },
        QueryIntent::Other => ExecutionOutcome::Instance(instance),
    };

    Ok(outcome)
}

/// Writes the reported identity onto the bound instance.
fn assign_insert_id(header: &ResultHeader, model: Option<&ModelDescriptor>, instance: Option<&mut Record>) {
    let (Some(instance), Some(attribute)) = (
        instance,
        model.and_then(|m| m.auto_increment_attribute.as_deref()),
    ) else {
        return;
    };
    let id = header.last_insert_id.map_or(Value::Null, Value::Int);
    instance.insert(attribute, id);
}

fn insert_result(
    header: &ResultHeader,
    model: Option<&ModelDescriptor>,
    instance: Option<Record>,
) -> InsertResult {
    if let Some(instance) = instance {
        return InsertResult::Instance(instance);
    }

    let field = model.and_then(ModelDescriptor::auto_increment_primary_field);
    // The whole id range must be representable, otherwise only the start is reported.
    let range = i64::try_from(header.rows_affected).ok().zip(header.last_insert_id);
    let range = range.filter(|(count, start)| start.checked_add(count.saturating_sub(1)).is_some());
    match (field, range) {
        (Some(field), Some((count, start))) => {
            let identities = (0..count)
                .map(|offset| {
                    let mut record = Record::with_capacity(1);
                    record.insert(field, Value::Int(start + offset));
                    record
                })
                .collect();
            InsertResult::Identities(identities)
        }
        _ => InsertResult::InsertId(header.last_insert_id),
    }
}
