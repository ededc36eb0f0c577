use std::collections::BTreeMap;
use std::fmt;

use crate::types::{Record, Value};

/// One row of SHOW INDEXES output.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRow {
    pub key_name: String,
    pub table: String,
    pub column_name: String,
    /// 1-based position of the column within the index.
    pub seq_in_index: i64,
    pub sub_part: Option<i64>,
    pub collation: Option<String>,
    pub non_unique: i64,
    pub index_type: Option<String>,
}

impl IndexRow {
    /// Reads the row from a normalized record, `None` when the key name,
    /// column name or sequence position is missing.
    pub fn from_record(record: &Record) -> Option<Self> {
        let text = |column: &str| record.get(column).filter(|v| !v.is_null()).map(ToString::to_string);
        let int = |column: &str| record.get(column).and_then(Value::as_i64);

        Some(Self {
            key_name: text("Key_name")?,
            table: text("Table").unwrap_or_default(),
            column_name: text("Column_name")?,
            seq_in_index: int("Seq_in_index")?,
            sub_part: int("Sub_part").filter(|n| *n != 0),
            collation: text("Collation"),
            non_unique: int("Non_unique").unwrap_or(0),
            index_type: text("Index_type"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Asc => f.write_str("ASC"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexField {
    pub attribute: String,
    /// Prefix length, only for prefix indexes.
    pub length: Option<i64>,
    pub order: Option<SortOrder>,
}

/// A (possibly composite) index with its columns in declared order.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDescriptor {
    pub name: String,
    pub table_name: String,
    pub primary: bool,
    pub unique: bool,
    pub index_type: Option<String>,
    pub fields: Vec<IndexField>,
}

/// Groups index rows by index name.
///
/// Descriptors come out in order of first appearance. Within a descriptor,
/// fields are ordered by sequence position, whatever the input order.
pub fn build_index_descriptors<I>(rows: I) -> Vec<IndexDescriptor>
where
    I: IntoIterator<Item = IndexRow>,
{
    let mut groups: Vec<(IndexRow, BTreeMap<usize, IndexField>)> = Vec::new();

    for row in rows {
        let slot = row
            .seq_in_index
            .checked_sub(1)
            .and_then(|slot| usize::try_from(slot).ok());
        let Some(slot) = slot else {
            tracing::warn!(
                index = %row.key_name,
                seq_in_index = row.seq_in_index,
                "skipping index column with invalid sequence position"
            );
            continue;
        };

        let field = IndexField {
            attribute: row.column_name.clone(),
            length: row.sub_part,
            order: (row.collation.as_deref() == Some("A")).then_some(SortOrder::Asc),
        };

        match groups.iter_mut().find(|(head, _)| head.key_name == row.key_name) {
            Some((_, fields)) => {
                fields.insert(slot, field);
            }
            None => groups.push((row, BTreeMap::from([(slot, field)]))),
        }
    }

    groups
        .into_iter()
        .map(|(head, fields)| IndexDescriptor {
            primary: head.key_name == "PRIMARY",
            unique: head.non_unique != 1,
            fields: fields.into_values().collect(),
            name: head.key_name,
            table_name: head.table,
            index_type: head.index_type,
        })
        .collect()
}

/// Builds descriptors straight from normalized SHOW INDEXES records,
/// skipping records that do not describe an index column.
pub fn index_descriptors_from_records(records: &[Record]) -> Vec<IndexDescriptor> {
    build_index_descriptors(records.iter().filter_map(IndexRow::from_record))
}
