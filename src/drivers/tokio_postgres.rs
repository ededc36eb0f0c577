use std::future::poll_fn;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{FromSql, Kind, ToSql, Type};
use tokio_postgres::{AsyncMessage, Client, Config, NoTls, Row};

use crate::connection::ConnectOptions;
use crate::error::NativeError;
use crate::traits::{ConnectionPool, RawConnection};
use crate::translator::{ER_DEADLOCK, ER_DUP_ENTRY, ER_NO_REFERENCED_ROW, ER_ROW_IS_REFERENCED};
use crate::type_parser::{parse_offset, CastField, TypeCast};
use crate::types::{ColumnMetadata, RawResponse, RawRow, RawValue, ResultHeader, SqlValue};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

static UNIQUE_DETAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^Key \((.*)\)=\((.*)\) already exists").expect("valid regex"));

static FK_MISSING_DETAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)^Key \((.*)\)=\(.*\) is not present in table "(.*)""#).expect("valid regex")
});

static FK_REFERENCED_DETAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)^Key \((.*)\)=\(.*\) is still referenced from table "(.*)""#)
        .expect("valid regex")
});

static FK_PARENT_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"on table "(.*?)" violates"#).expect("valid regex"));

/// Opens a fresh tokio-postgres connection for every acquisition.
///
/// Recognized `dialect_options`: `application_name` and
/// `connect_timeout` (seconds).
///
/// PostgreSQL has no insert id or SHOW WARNINGS. The first integer column
/// of the first returned row is reported as the insert id, so
/// `INSERT ... RETURNING id` feeds identity handling, and the warning count
/// is the number of notices raised by the statement. Notices are logged as
/// they arrive; the SHOW WARNINGS follow-up fails and is only logged.
#[derive(Debug, Default)]
pub struct TokioPostgresPool;

impl TokioPostgresPool {
    pub fn new() -> Self {
        Self
    }

    fn config(options: &ConnectOptions) -> Config {
        let mut config = Config::new();
        config
            .host(&options.host)
            .port(options.port)
            .user(&options.user)
            .options(&format!("-c TimeZone={}", session_time_zone(&options.timezone)));
        if let Some(password) = &options.password {
            config.password(password);
        }
        if let Some(database) = &options.database {
            config.dbname(database);
        }
        if let Some(name) = options.dialect_options.get("application_name") {
            config.application_name(name);
        }
        if let Some(secs) = options
            .dialect_options
            .get("connect_timeout")
            .and_then(|s| s.parse().ok())
        {
            config.connect_timeout(Duration::from_secs(secs));
        }
        config
    }
}

/// PostgreSQL reads numeric zones with the POSIX sign (west positive).
fn session_time_zone(timezone: &str) -> String {
    match parse_offset(timezone) {
        Some(offset) => {
            let secs = offset.local_minus_utc();
            let sign = if secs > 0 { '-' } else { '+' };
            let secs = secs.abs();
            format!("{}{:02}:{:02}", sign, secs / 3600, secs % 3600 / 60)
        }
        None => timezone.to_string(),
    }
}

#[async_trait]
impl ConnectionPool for TokioPostgresPool {
    async fn get_connection(
        &self,
        options: &ConnectOptions,
    ) -> Result<Box<dyn RawConnection>, NativeError> {
        let (client, mut connection) = Self::config(options)
            .connect(NoTls)
            .await
            .map_err(native_error)?;

        let notices = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&notices);

        // Spawn the connection handler
        tokio::spawn(async move {
            let driven = poll_fn(move |cx| loop {
                match connection.poll_message(cx) {
                    Poll::Ready(Some(Ok(AsyncMessage::Notice(notice)))) => {
                        counter.fetch_add(1, Ordering::SeqCst);
                        tracing::warn!(
                            target: "dmrs::sql",
                            code = notice.code().code(),
                            "{}",
                            notice.message()
                        );
                    }
                    Poll::Ready(Some(Ok(_))) => {}
                    Poll::Ready(Some(Err(e))) => return Poll::Ready(Err(e)),
                    Poll::Ready(None) => return Poll::Ready(Ok(())),
                    Poll::Pending => return Poll::Pending,
                }
            })
            .await;
            if let Err(e) = driven {
                tracing::error!(target: "dmrs::connection", error = %e, "PostgreSQL connection error");
            }
        });

        let offset = parse_offset(&options.timezone).unwrap_or_else(|| Utc.fix());
        Ok(Box::new(TokioPostgresConnection {
            client: Some(client),
            type_cast: options.type_cast.clone(),
            offset,
            notices,
        }))
    }
}

struct TokioPostgresConnection {
    client: Option<Client>,
    type_cast: TypeCast,
    /// Session offset applied to timestamps.
    offset: FixedOffset,
    notices: Arc<AtomicU32>,
}

impl TokioPostgresConnection {
    fn convert_row(&self, row: &Row, meta_data: &[ColumnMetadata]) -> RawRow {
        row.columns()
            .iter()
            .zip(meta_data)
            .enumerate()
            .map(|(i, (column, meta))| {
                let raw = row
                    .try_get::<_, Option<WireBytes<'_>>>(i)
                    .ok()
                    .flatten()
                    .map(|w| w.0);
                convert_cell(&self.type_cast, column.type_(), meta, raw, self.offset)
            })
            .collect()
    }
}

#[async_trait]
impl RawConnection for TokioPostgresConnection {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<RawResponse, NativeError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| NativeError::new("Connection is closed"))?;

        // Convert SqlValue params to tokio-postgres compatible types
        let converted_params: Vec<Box<dyn ToSql + Sync + Send>> =
            params.iter().map(sql_value_to_tosql).collect();

        let param_refs: Vec<&(dyn ToSql + Sync)> = converted_params
            .iter()
            .map(|b| b.as_ref() as &(dyn ToSql + Sync))
            .collect();

        self.notices.store(0, Ordering::SeqCst);
        let statement = client.prepare(sql).await.map_err(native_error)?;

        if statement.columns().is_empty() {
            let rows_affected = client
                .execute(&statement, &param_refs)
                .await
                .map_err(native_error)?;
            return Ok(RawResponse::summary(ResultHeader {
                rows_affected,
                warning_status: self.notices.load(Ordering::SeqCst),
                ..ResultHeader::default()
            }));
        }

        let meta_data: Vec<ColumnMetadata> = statement
            .columns()
            .iter()
            .map(|c| ColumnMetadata::new(c.name(), c.type_().name()))
            .collect();

        let rows = client
            .query(&statement, &param_refs)
            .await
            .map_err(native_error)?;

        let raw_rows: Vec<RawRow> = rows
            .iter()
            .map(|row| self.convert_row(row, &meta_data))
            .collect();

        let last_insert_id = raw_rows
            .first()
            .and_then(|row| row.first())
            .and_then(identity_value);

        let mut response = RawResponse::new(meta_data, raw_rows);
        response.header = ResultHeader {
            rows_affected: rows.len() as u64,
            last_insert_id,
            warning_status: self.notices.load(Ordering::SeqCst),
        };
        Ok(response)
    }

    async fn close(&mut self) -> Result<(), NativeError> {
        // Dropping the client ends the spawned connection task.
        self.client.take();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.client.as_ref().map_or(true, Client::is_closed)
    }
}

/// Borrows the undecoded wire bytes of any column type.
struct WireBytes<'a>(&'a [u8]);

impl<'a> FromSql<'a> for WireBytes<'a> {
    fn from_sql(
        _ty: &Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(WireBytes(raw))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// Runs one binary cell through the type-cast hook.
///
/// Registered parsers only ever see text: cells with a text rendering are
/// offered as that text, the rest are decoded directly.
fn convert_cell(
    type_cast: &TypeCast,
    ty: &Type,
    meta: &ColumnMetadata,
    raw: Option<&[u8]>,
    offset: FixedOffset,
) -> RawValue {
    let Some(bytes) = raw else {
        let field = CastField::new(&meta.name, &meta.type_tag, None);
        return type_cast.cast(&field, || RawValue::Null);
    };

    match text_form(ty, bytes) {
        Some(text) => {
            let field = CastField::new(&meta.name, &meta.type_tag, Some(text.as_bytes()));
            type_cast.cast(&field, || decode_value(ty, raw, offset))
        }
        None => decode_value(ty, raw, offset),
    }
}

fn is_text_type(ty: &Type) -> bool {
    [
        Type::TEXT,
        Type::VARCHAR,
        Type::BPCHAR,
        Type::NAME,
        Type::CHAR,
        Type::JSON,
        Type::XML,
        Type::UNKNOWN,
    ]
    .contains(ty)
        || matches!(ty.kind(), Kind::Enum(_))
}

/// The PostgreSQL text rendering of a binary value, for the types whose
/// natural caller-facing form is text.
fn text_form(ty: &Type, raw: &[u8]) -> Option<String> {
    if is_text_type(ty) {
        std::str::from_utf8(raw).ok().map(str::to_string)
    } else if *ty == Type::JSONB {
        // Binary jsonb carries a one-byte format version before the text.
        raw.get(1..)
            .and_then(|text| std::str::from_utf8(text).ok())
            .map(str::to_string)
    } else if *ty == Type::DATE {
        NaiveDate::from_sql(ty, raw)
            .ok()
            .map(|d| d.format("%Y-%m-%d").to_string())
    } else if *ty == Type::TIME {
        NaiveTime::from_sql(ty, raw)
            .ok()
            .map(|t| t.format("%H:%M:%S%.f").to_string())
    } else if *ty == Type::TIMESTAMP {
        NaiveDateTime::from_sql(ty, raw)
            .ok()
            .map(|dt| dt.format(DATETIME_FORMAT).to_string())
    } else if *ty == Type::NUMERIC {
        numeric_text(raw)
    } else if *ty == Type::UUID {
        uuid::Uuid::from_sql(ty, raw).ok().map(|u| u.to_string())
    } else {
        None
    }
}

/// Renders a binary NUMERIC: base-10000 digit groups, a group weight, a
/// sign word and the display scale.
fn numeric_text(raw: &[u8]) -> Option<String> {
    let word = |i: usize| {
        raw.get(i * 2..i * 2 + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
    };
    let ndigits = usize::from(word(0)?);
    let weight = i32::from(word(1)? as i16);
    let sign = word(2)?;
    let dscale = usize::from(word(3)?);
    let digits: Vec<u16> = (0..ndigits).map(|i| word(4 + i)).collect::<Option<_>>()?;
    let group = |i: i32| {
        usize::try_from(i)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = match sign {
        0x0000 => String::new(),
        0x4000 => "-".to_string(),
        0xC000 => return Some("NaN".to_string()),
        0xD000 => return Some("Infinity".to_string()),
        0xF000 => return Some("-Infinity".to_string()),
        _ => return None,
    };

    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&group(0).to_string());
        for i in 1..=weight {
            out.push_str(&format!("{:04}", group(i)));
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut i = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", group(i)));
            i += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }

    Some(out)
}

/// Default conversion when no type parser claims the column.
fn decode_value(ty: &Type, raw: Option<&[u8]>, offset: FixedOffset) -> RawValue {
    let Some(raw) = raw else {
        return RawValue::Null;
    };

    let decoded = if *ty == Type::BOOL {
        bool::from_sql(ty, raw).map(RawValue::Bool)
    } else if *ty == Type::INT2 {
        i16::from_sql(ty, raw).map(|v| RawValue::Int(v.into()))
    } else if *ty == Type::INT4 {
        i32::from_sql(ty, raw).map(|v| RawValue::Int(v.into()))
    } else if *ty == Type::INT8 {
        i64::from_sql(ty, raw).map(|v| RawValue::BigInt(v.into()))
    } else if *ty == Type::FLOAT4 {
        f32::from_sql(ty, raw).map(|v| RawValue::Float(v.into()))
    } else if *ty == Type::FLOAT8 {
        f64::from_sql(ty, raw).map(RawValue::Float)
    } else if *ty == Type::BYTEA {
        Ok(RawValue::Bytes(raw.to_vec()))
    } else if *ty == Type::TIMESTAMP {
        NaiveDateTime::from_sql(ty, raw).map(|naive| {
            match offset.from_local_datetime(&naive).single() {
                Some(date) => RawValue::Date(date),
                None => RawValue::Text(naive.format(DATETIME_FORMAT).to_string()),
            }
        })
    } else if *ty == Type::TIMESTAMPTZ {
        DateTime::<Utc>::from_sql(ty, raw).map(|utc| RawValue::Date(utc.with_timezone(&offset)))
    } else {
        Ok(text_form(ty, raw).map_or_else(|| RawValue::Bytes(raw.to_vec()), RawValue::Text))
    };

    decoded.unwrap_or_else(|_| RawValue::Bytes(raw.to_vec()))
}

fn identity_value(value: &RawValue) -> Option<i64> {
    match value {
        RawValue::Int(i) => Some(*i),
        RawValue::BigInt(i) => i64::try_from(*i).ok(),
        _ => None,
    }
}

fn native_error(e: tokio_postgres::Error) -> NativeError {
    match e.as_db_error() {
        Some(db) => server_error(&ServerError {
            code: db.code(),
            message: db.message(),
            detail: db.detail(),
            constraint: db.constraint(),
            table: db.table(),
        }),
        None => NativeError::new(e.to_string()),
    }
}

/// The fields of a PostgreSQL error response that classification reads.
struct ServerError<'a> {
    code: &'a SqlState,
    message: &'a str,
    detail: Option<&'a str>,
    constraint: Option<&'a str>,
    table: Option<&'a str>,
}

/// Maps constraint and deadlock SQLSTATEs onto DM error numbers and
/// rewrites the message into the DM wording the translator parses. The
/// SQLSTATE stays in `code`.
fn server_error(err: &ServerError<'_>) -> NativeError {
    let native = |message: String| NativeError::new(message).with_code(err.code.code());
    let constraint = err.constraint.unwrap_or_default();
    let detail = err.detail.unwrap_or_default();

    if *err.code == SqlState::UNIQUE_VIOLATION {
        let Some(caps) = UNIQUE_DETAIL.captures(detail) else {
            return native(err.message.to_string()).with_errno(ER_DUP_ENTRY);
        };
        let values = caps[2].split(", ").collect::<Vec<_>>().join("-");
        native(format!("Duplicate entry '{values}' for key '{constraint}'")).with_errno(ER_DUP_ENTRY)
    } else if *err.code == SqlState::FOREIGN_KEY_VIOLATION {
        let table = err.table.unwrap_or_default();
        if let Some(caps) = FK_REFERENCED_DETAIL.captures(detail) {
            let parent = FK_PARENT_TABLE
                .captures(err.message)
                .map(|c| c[1].to_string())
                .unwrap_or_default();
            native(format!(
                r#"Cannot delete or update a parent row: a foreign key constraint fails ("{}", CONSTRAINT "{}" FOREIGN KEY ("") REFERENCES "{}" ({}))"#,
                &caps[2],
                constraint,
                parent,
                quoted_list(&caps[1])
            ))
            .with_errno(ER_ROW_IS_REFERENCED)
        } else if let Some(caps) = FK_MISSING_DETAIL.captures(detail) {
            native(format!(
                r#"Cannot add or update a child row: a foreign key constraint fails ("{}", CONSTRAINT "{}" FOREIGN KEY ({}) REFERENCES "{}" (""))"#,
                table,
                constraint,
                quoted_list(&caps[1]),
                &caps[2]
            ))
            .with_errno(ER_NO_REFERENCED_ROW)
        } else {
            native(err.message.to_string()).with_errno(ER_NO_REFERENCED_ROW)
        }
    } else if *err.code == SqlState::T_R_DEADLOCK_DETECTED {
        native(err.message.to_string()).with_errno(ER_DEADLOCK)
    } else {
        native(err.message.to_string())
    }
}

/// `a, b` to `"a", "b"`.
fn quoted_list(columns: &str) -> String {
    columns
        .split(", ")
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convert a SqlValue to a boxed ToSql trait object.
fn sql_value_to_tosql(value: &SqlValue) -> Box<dyn ToSql + Sync + Send> {
    match value {
        SqlValue::Null => Box::new(None::<String>),
        SqlValue::Text(s) => Box::new(s.clone()),
        SqlValue::Int32(i) => Box::new(*i),
        SqlValue::Int64(i) => Box::new(*i),
        SqlValue::Float64(f) => Box::new(*f),
        SqlValue::Bool(b) => Box::new(*b),
        SqlValue::Bytes(b) => Box::new(b.clone()),
    }
}
