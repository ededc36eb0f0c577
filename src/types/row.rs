use std::collections::HashMap;

use serde::ser::{Serialize, SerializeMap, Serializer};

use super::{RawValue, Value};

/// Per-column descriptor reported by the driver alongside the rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMetadata {
    pub name: String,
    /// Driver-reported type tag, e.g. `VARCHAR`, `DATETIME`.
    pub type_tag: String,
}

impl ColumnMetadata {
    /// The type tag is stored uppercased, the form parser lookups expect.
    pub fn new(name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        let mut type_tag = type_tag.into();
        type_tag.make_ascii_uppercase();
        Self {
            name: name.into(),
            type_tag,
        }
    }
}

/// One driver-reported row: values in column order.
pub type RawRow = Vec<RawValue>;

/// Statement summary reported by the driver for any statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultHeader {
    pub rows_affected: u64,
    /// First identity assigned by an insert.
    pub last_insert_id: Option<i64>,
    /// Number of warnings the server attached to the statement.
    pub warning_status: u32,
}

/// Driver-agnostic raw response of a single statement execution.
#[derive(Debug, Default)]
pub struct RawResponse {
    /// Rows in arrival order, each parallel to `meta_data`.
    pub rows: Vec<RawRow>,
    pub meta_data: Vec<ColumnMetadata>,
    pub header: ResultHeader,
}

impl RawResponse {
    pub fn new(meta_data: Vec<ColumnMetadata>, rows: Vec<RawRow>) -> Self {
        Self {
            rows,
            meta_data,
            header: ResultHeader::default(),
        }
    }

    /// A response carrying no rows, only a statement summary.
    pub fn summary(header: ResultHeader) -> Self {
        Self {
            rows: Vec::new(),
            meta_data: Vec::new(),
            header,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

/// A normalized row: column name to typed value, in column order.
///
/// Keys are unique; inserting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, Value)>,
    positions: HashMap<String, usize>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            positions: HashMap::with_capacity(capacity),
        }
    }

    /// Sets `column`, returning the previous value if the key existed.
    pub fn insert(&mut self, column: impl Into<String>, value: Value) -> Option<Value> {
        let column = column.into();
        match self.positions.get(&column) {
            Some(&i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.positions.insert(column.clone(), self.entries.len());
                self.entries.push((column, value));
                None
            }
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.positions.get(column).map(|&i| &self.entries[i].1)
    }

    /// Text value of `column`, if it holds text.
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    pub fn contains_key(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// Returns all column names in this record.
    pub fn columns(&self) -> Vec<&str> {
        self.entries.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_get() {
        let record: Record = [("id", Value::Int(1)), ("name", Value::from("John"))]
            .into_iter()
            .collect();

        assert_eq!(record.get("id"), Some(&Value::Int(1)));
        assert_eq!(record.get_str("name"), Some("John"));
        assert!(record.get("missing").is_none());
    }

    #[test]
    fn test_record_insert_replaces_in_place() {
        let mut record = Record::new();
        record.insert("a", Value::Int(1));
        record.insert("b", Value::Int(2));
        let previous = record.insert("a", Value::Int(3));

        assert_eq!(previous, Some(Value::Int(1)));
        assert_eq!(record.columns(), vec!["a", "b"]);
        assert_eq!(record.get("a"), Some(&Value::Int(3)));
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_wide_record_keeps_column_order() {
        let record: Record = (0..500)
            .map(|i| (format!("c{i}"), Value::Int(i)))
            .collect();

        assert_eq!(record.len(), 500);
        assert_eq!(record.get("c499"), Some(&Value::Int(499)));
        assert_eq!(record.columns()[..3], ["c0", "c1", "c2"]);
    }

    #[test]
    fn test_column_metadata_uppercases_type_tag() {
        let meta = ColumnMetadata::new("created_at", "datetime");
        assert_eq!(meta.name, "created_at");
        assert_eq!(meta.type_tag, "DATETIME");
    }

    #[test]
    fn test_record_serializes_in_column_order() {
        let record: Record = [("z", Value::Int(1)), ("a", Value::from("x"))]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"z":1,"a":"x"}"#);
    }
}
