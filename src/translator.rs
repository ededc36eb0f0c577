//! Maps native driver errors onto the structured error taxonomy.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{
    DatabaseError, DmError, ForeignKeyConstraintError, NativeError, RelationType,
    UniqueConstraintError, ValidationErrorItem,
};
use crate::types::{ModelDescriptor, Record, SqlValue};

pub const ER_DUP_ENTRY: i64 = 1062;
pub const ER_DEADLOCK: i64 = 1213;
pub const ER_ROW_IS_REFERENCED: i64 = 1451;
pub const ER_NO_REFERENCED_ROW: i64 = 1452;

static DUPLICATE_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)Duplicate entry '(.*)' for key '?(.*?)'?$").expect("valid regex")
});

static FK_QUOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"CONSTRAINT (["`])"#).expect("valid regex"));

static FK_BACKTICK: Lazy<Regex> = Lazy::new(|| foreign_key_pattern('`'));
static FK_DOUBLE_QUOTE: Lazy<Regex> = Lazy::new(|| foreign_key_pattern('"'));

fn foreign_key_pattern(quote: char) -> Regex {
    let q = regex::escape(&quote.to_string());
    Regex::new(&format!(
        r"CONSTRAINT {q}(.*){q} FOREIGN KEY \({q}(.*){q}\) REFERENCES {q}(.*){q} \({q}(.*){q}\)"
    ))
    .expect("valid regex")
}

/// What was being executed when the driver failed.
#[derive(Debug, Clone, Copy)]
pub struct ErrorContext<'a> {
    pub sql: &'a str,
    pub parameters: &'a [SqlValue],
    pub model: Option<&'a ModelDescriptor>,
    pub instance: Option<&'a Record>,
}

impl<'a> ErrorContext<'a> {
    pub fn new(sql: &'a str, parameters: &'a [SqlValue]) -> Self {
        Self {
            sql,
            parameters,
            model: None,
            instance: None,
        }
    }

    pub fn model(mut self, model: Option<&'a ModelDescriptor>) -> Self {
        self.model = model;
        self
    }

    pub fn instance(mut self, instance: Option<&'a Record>) -> Self {
        self.instance = instance;
        self
    }
}

/// Translates a failed execution into a structured error. Pure: the result
/// depends only on the arguments.
pub fn translate(err: NativeError, ctx: &ErrorContext<'_>) -> DmError {
    match err.error_code() {
        Some(ER_DUP_ENTRY) => unique_constraint(err, ctx).into(),
        Some(code @ (ER_ROW_IS_REFERENCED | ER_NO_REFERENCED_ROW)) => {
            let reltype = if code == ER_ROW_IS_REFERENCED {
                RelationType::Parent
            } else {
                RelationType::Child
            };
            foreign_key_constraint(err, reltype, ctx).into()
        }
        _ => DatabaseError {
            parent: err,
            sql: ctx.sql.to_string(),
            parameters: ctx.parameters.to_vec(),
        }
        .into(),
    }
}

fn unique_constraint(err: NativeError, ctx: &ErrorContext<'_>) -> UniqueConstraintError {
    let mut message = "Validation error".to_string();
    let mut fields: Vec<(String, Option<String>)> = Vec::new();

    if let Some(caps) = DUPLICATE_ENTRY.captures(&err.message) {
        let matched = &caps[1];
        let key = caps[2].rsplit('.').next().unwrap_or_default();
        let unique_key = ctx.model.and_then(|m| m.unique_keys.get(key));

        match unique_key {
            Some(unique_key) => {
                if let Some(msg) = &unique_key.msg {
                    message = msg.clone();
                }
                let mut values = matched.split('-');
                fields = unique_key
                    .fields
                    .iter()
                    .map(|field| (field.clone(), values.next().map(str::to_string)))
                    .collect();
            }
            None => fields.push((key.to_string(), Some(matched.to_string()))),
        }
    }

    let errors = fields
        .iter()
        .map(|(field, value)| ValidationErrorItem {
            message: format!("{field} must be unique"),
            kind: "unique violation",
            path: field.clone(),
            value: value.clone(),
            validator_key: "not_unique",
        })
        .collect();

    UniqueConstraintError {
        message,
        errors,
        fields,
        parent: err,
        sql: ctx.sql.to_string(),
        parameters: ctx.parameters.to_vec(),
    }
}

fn foreign_key_constraint(
    err: NativeError,
    reltype: RelationType,
    ctx: &ErrorContext<'_>,
) -> ForeignKeyConstraintError {
    let quote = FK_QUOTE
        .captures(&err.message)
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| "`".to_string());
    let pattern: &Regex = if quote == "\"" {
        &*FK_DOUBLE_QUOTE
    } else {
        &*FK_BACKTICK
    };

    let mut fk = ForeignKeyConstraintError {
        reltype,
        table: None,
        fields: None,
        referenced_fields: None,
        value: None,
        index: None,
        parent: err.clone(),
        sql: ctx.sql.to_string(),
        parameters: ctx.parameters.to_vec(),
    };

    if let Some(caps) = pattern.captures(&err.message) {
        let split = column_list_splitter(&quote);
        fk.fields = column_list(&split, &caps[2]);
        fk.value = fk
            .fields
            .as_ref()
            .and_then(|fields| fields.first())
            .and_then(|first| ctx.instance.and_then(|i| i.get(first)))
            .filter(|v| v.is_truthy())
            .cloned();
        fk.index = Some(caps[1].to_string());
        fk.table = Some(caps[3].to_string());
        fk.referenced_fields = column_list(&split, &caps[4]);
    }

    fk
}

/// `None` for an empty list, which drivers use when a side is unknown.
fn column_list(split: &Regex, list: &str) -> Option<Vec<String>> {
    (!list.is_empty()).then(|| split.split(list).map(str::to_string).collect())
}

/// Separator between quoted names in a column list: `q, q`.
fn column_list_splitter(quote: &str) -> Regex {
    let q = regex::escape(quote);
    Regex::new(&format!("{q}, *{q}")).expect("valid regex")
}
