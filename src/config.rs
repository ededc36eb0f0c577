use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{DmError, Result};

pub const DEFAULT_PORT: u16 = 5236;

/// Connection settings, typically loaded from a TOML file.
///
/// ```
/// use dmrs::ConnectionConfig;
///
/// let config = ConnectionConfig::from_toml_str(r#"
///     host = "db.internal"
///     username = "app"
///     database = "shop"
/// "#).unwrap();
/// assert_eq!(config.port, 5236);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub database: Option<String>,
    /// Session timezone offset, e.g. `+08:00`.
    pub timezone: String,
    /// Fetch and log server warnings after select-family statements.
    pub show_warnings: bool,
    /// Extra driver options, passed through verbatim.
    pub dialect_options: BTreeMap<String, String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            username: String::new(),
            password: None,
            database: None,
            timezone: "+00:00".to_string(),
            show_warnings: false,
            dialect_options: BTreeMap::new(),
        }
    }
}

impl ConnectionConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| DmError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| DmError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }
}
