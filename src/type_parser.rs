//! Process-wide parsers that coerce wire values by column type tag.
//!
//! The registry holds an immutable parser set behind an `Arc`. Every
//! mutation builds a complete new set and swaps it in, so a lookup running
//! during a refresh sees either the old set or the new one, never a
//! partially populated map.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{FixedOffset, NaiveDateTime, TimeZone};
use once_cell::sync::Lazy;

use crate::types::RawValue;

/// A wire value as seen by the type-cast hook, before conversion.
#[derive(Debug, Clone, Copy)]
pub struct CastField<'a> {
    pub name: &'a str,
    pub type_tag: &'a str,
    raw: Option<&'a [u8]>,
}

impl<'a> CastField<'a> {
    pub fn new(name: &'a str, type_tag: &'a str, raw: Option<&'a [u8]>) -> Self {
        Self {
            name,
            type_tag,
            raw,
        }
    }

    /// The value as text, `None` for SQL NULL.
    pub fn string(&self) -> Option<Cow<'a, str>> {
        self.raw.map(String::from_utf8_lossy)
    }

    /// The value as raw bytes, `None` for SQL NULL.
    pub fn buffer(&self) -> Option<&'a [u8]> {
        self.raw
    }
}

/// Session settings parsers may depend on.
#[derive(Debug, Clone, PartialEq)]
pub struct CastOptions {
    /// Session timezone, as an offset such as `+08:00`.
    pub timezone: String,
}

impl Default for CastOptions {
    fn default() -> Self {
        Self {
            timezone: "+00:00".to_string(),
        }
    }
}

pub type TypeParser = Arc<dyn Fn(&CastField<'_>, &CastOptions) -> RawValue + Send + Sync>;

type ParserSet = HashMap<String, TypeParser>;

static GLOBAL: Lazy<Arc<TypeParserRegistry>> = Lazy::new(|| Arc::new(TypeParserRegistry::new()));

/// Mapping from column type tag to parser. Tags are case-insensitive.
#[derive(Default)]
pub struct TypeParserRegistry {
    parsers: RwLock<Arc<ParserSet>>,
}

impl TypeParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by connections unless told otherwise.
    pub fn global() -> Arc<TypeParserRegistry> {
        Arc::clone(&GLOBAL)
    }

    /// Registers `parser` for `type_tag`, replacing any existing parser.
    pub fn register(&self, type_tag: &str, parser: TypeParser) {
        self.refresh([(type_tag.to_string(), parser)]);
    }

    /// Registers a batch of parsers in a single swap.
    pub fn refresh<I>(&self, parsers: I)
    where
        I: IntoIterator<Item = (String, TypeParser)>,
    {
        let mut slot = self.parsers.write().unwrap_or_else(PoisonError::into_inner);
        let mut next: ParserSet = (**slot).clone();
        for (tag, parser) in parsers {
            next.insert(tag.to_ascii_uppercase(), parser);
        }
        *slot = Arc::new(next);
    }

    /// Removes every registered parser.
    pub fn clear(&self) {
        let mut slot = self.parsers.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Arc::new(ParserSet::new());
    }

    /// Tags are matched case-insensitively. Uppercase tags, as carried by
    /// [`ColumnMetadata`](crate::types::ColumnMetadata), skip the case fold.
    pub fn lookup(&self, type_tag: &str) -> Option<TypeParser> {
        let set = self.snapshot();
        if let Some(parser) = set.get(type_tag) {
            return Some(Arc::clone(parser));
        }
        if type_tag.bytes().any(|b| b.is_ascii_lowercase()) {
            return set.get(&type_tag.to_ascii_uppercase()).cloned();
        }
        None
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn snapshot(&self) -> Arc<ParserSet> {
        Arc::clone(&self.parsers.read().unwrap_or_else(PoisonError::into_inner))
    }
}

impl fmt::Debug for TypeParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let set = self.snapshot();
        let mut tags: Vec<&String> = set.keys().collect();
        tags.sort();
        f.debug_struct("TypeParserRegistry").field("tags", &tags).finish()
    }
}

/// The type-cast hook bound into connection options.
///
/// Drivers call [`TypeCast::cast`] for every wire value; when no parser is
/// registered for the column's tag the driver's own conversion (`next`) runs.
#[derive(Clone)]
pub struct TypeCast {
    registry: Arc<TypeParserRegistry>,
    options: CastOptions,
}

impl TypeCast {
    pub fn new(registry: Arc<TypeParserRegistry>, options: CastOptions) -> Self {
        Self { registry, options }
    }

    pub fn options(&self) -> &CastOptions {
        &self.options
    }

    pub fn cast<F>(&self, field: &CastField<'_>, next: F) -> RawValue
    where
        F: FnOnce() -> RawValue,
    {
        match self.registry.lookup(field.type_tag) {
            Some(parser) => parser(field, &self.options),
            None => next(),
        }
    }
}

impl fmt::Debug for TypeCast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeCast")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Parsers registered when a connection manager starts.
pub fn default_parsers() -> Vec<(String, TypeParser)> {
    vec![
        ("DATETIME".to_string(), Arc::new(parse_datetime) as TypeParser),
        ("DATE".to_string(), Arc::new(parse_date) as TypeParser),
    ]
}

/// `DATETIME` columns arrive as naive local text in the session timezone.
fn parse_datetime(field: &CastField<'_>, options: &CastOptions) -> RawValue {
    let Some(text) = field.string() else {
        return RawValue::Null;
    };
    let parsed = NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .zip(parse_offset(&options.timezone))
        .and_then(|(naive, offset)| offset.from_local_datetime(&naive).single());

    match parsed {
        Some(date) => RawValue::Date(date),
        None => RawValue::Text(text.into_owned()),
    }
}

/// `DATE` columns stay as `YYYY-MM-DD` text.
fn parse_date(field: &CastField<'_>, _options: &CastOptions) -> RawValue {
    field
        .string()
        .map_or(RawValue::Null, |s| RawValue::Text(s.into_owned()))
}

/// Parses `Z`, `UTC` and `+HH:MM` / `-HH:MM` / `+HHMM` offsets.
pub fn parse_offset(timezone: &str) -> Option<FixedOffset> {
    let tz = timezone.trim();
    if tz.eq_ignore_ascii_case("z") || tz.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match tz.as_bytes().first()? {
        b'+' => (1, &tz[1..]),
        b'-' => (-1, &tz[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
