use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{Record, Value};

static ENUM_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^enum").expect("valid regex"));

/// Canonical description of one column from a DESCRIBE response.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescription {
    pub name: String,
    pub type_name: String,
    pub allow_null: bool,
    pub default_value: Value,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub comment: Option<String>,
}

/// DESCRIBE output re-keyed by field name, in server order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableDescription {
    pub fields: Vec<FieldDescription>,
}

impl TableDescription {
    pub fn from_records(records: &[Record]) -> Self {
        let mut fields: Vec<FieldDescription> = Vec::with_capacity(records.len());
        for field in records.iter().map(describe_field) {
            match fields.iter_mut().find(|f| f.name == field.name) {
                Some(existing) => *existing = field,
                None => fields.push(field),
            }
        }
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescription> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn describe_field(record: &Record) -> FieldDescription {
    let type_name = record.get_str("Type").unwrap_or_default();
    let type_name = if ENUM_PREFIX.is_match(type_name) {
        ENUM_PREFIX.replace(type_name, "ENUM").into_owned()
    } else {
        type_name.to_uppercase()
    };

    FieldDescription {
        name: record.get("Field").map(ToString::to_string).unwrap_or_default(),
        type_name,
        allow_null: record.get_str("Null") == Some("YES"),
        default_value: record.get("Default").cloned().unwrap_or(Value::Null),
        primary_key: record.get_str("Key") == Some("PRI"),
        auto_increment: record
            .get_str("Extra")
            .is_some_and(|extra| extra.eq_ignore_ascii_case("auto_increment")),
        comment: record
            .get("Comment")
            .filter(|c| c.is_truthy())
            .map(ToString::to_string),
    }
}
