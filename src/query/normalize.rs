use tokio::io::AsyncReadExt;

use crate::error::{DmError, Result};
use crate::types::{ColumnMetadata, ModelDescriptor, RawRow, RawValue, Record, Value};

/// Converts raw rows into records keyed by column name.
///
/// Every metadata column appears exactly once per record; values missing
/// from a short row become `Null`. Streams are drained, big integers are
/// coerced and JSON attributes of `model` are decoded.
pub async fn normalize_rows(
    rows: Vec<RawRow>,
    meta_data: &[ColumnMetadata],
    model: Option<&ModelDescriptor>,
) -> Result<Vec<Record>> {
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        records.push(normalize_row(row, meta_data, model).await?);
    }
    Ok(records)
}

pub async fn normalize_row(
    row: RawRow,
    meta_data: &[ColumnMetadata],
    model: Option<&ModelDescriptor>,
) -> Result<Record> {
    let mut values = row.into_iter();
    let mut record = Record::with_capacity(meta_data.len());

    for meta in meta_data {
        let raw = values.next().unwrap_or(RawValue::Null);
        let mut value = materialize(&meta.name, raw).await?;
        if model.is_some_and(|m| m.is_json_attribute(&meta.name)) {
            value = decode_json(&meta.name, value)?;
        }
        record.insert(meta.name.clone(), value);
    }

    Ok(record)
}

/// Turns a driver value into a caller-facing value.
pub async fn materialize(column: &str, raw: RawValue) -> Result<Value> {
    Ok(match raw {
        RawValue::Null => Value::Null,
        RawValue::Bool(b) => Value::Bool(b),
        RawValue::Int(i) => Value::Int(i),
        RawValue::BigInt(i) => coerce_big_int(column, i),
        RawValue::Float(f) => Value::Float(f),
        RawValue::Text(s) => Value::Text(s),
        RawValue::Bytes(b) => Value::Bytes(b),
        RawValue::Date(d) => Value::Date(d),
        RawValue::Json(j) => Value::Json(j),
        RawValue::Stream(mut stream) => {
            let mut buf = Vec::new();
            stream
                .read_to_end(&mut buf)
                .await
                .map_err(|source| DmError::StreamRead {
                    column: column.to_string(),
                    source,
                })?;
            match String::from_utf8(buf) {
                Ok(text) => Value::Text(text),
                Err(e) => Value::Bytes(e.into_bytes()),
            }
        }
    })
}

/// Down-converts a wide integer. Values outside `i64` lose precision.
pub fn coerce_big_int(column: &str, value: i128) -> Value {
    match i64::try_from(value) {
        Ok(v) => Value::Int(v),
        Err(_) => {
            tracing::trace!(column, value = %value, "big integer exceeds i64, coercing to f64");
            Value::Float(value as f64)
        }
    }
}

/// Decodes the stored text form of a JSON attribute.
pub fn decode_json(column: &str, value: Value) -> Result<Value> {
    let json_err = |source| DmError::JsonColumn {
        column: column.to_string(),
        source,
    };

    match value {
        Value::Null | Value::Json(_) => Ok(value),
        Value::Text(text) => serde_json::from_str(&text).map(Value::Json).map_err(json_err),
        Value::Bytes(bytes) => serde_json::from_slice(&bytes).map(Value::Json).map_err(json_err),
        other => serde_json::to_value(&other).map(Value::Json).map_err(json_err),
    }
}
