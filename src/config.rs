use anyhow::{Context, Result};
use serde::{de, Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ConnectorError;

pub const DEFAULT_FILENAME_TEMPLATE: &str = "{databasename}-{servername}-{datetime}.{extension}";
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d-%H%M%S";

/// Connection settings of a single database, keyed the way a `DATABASES`
/// entry is written (`ENGINE`, `NAME`, `HOST`, ...).
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct DatabaseSettings {
    #[serde(default)]
    pub engine: String,
    #[serde(default)]
    pub name: String,
    pub host: Option<String>,
    #[serde(default, deserialize_with = "deserialize_port")]
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub admin_user: Option<String>,
    pub admin_password: Option<String>,
}

impl DatabaseSettings {
    pub fn host(&self) -> Option<&str> {
        non_empty(&self.host)
    }

    pub fn user(&self) -> Option<&str> {
        non_empty(&self.user)
    }

    pub fn password(&self) -> Option<&str> {
        non_empty(&self.password)
    }

    pub fn admin_user(&self) -> Option<&str> {
        non_empty(&self.admin_user)
    }

    pub fn admin_password(&self) -> Option<&str> {
        non_empty(&self.admin_password)
    }
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |secret: &Option<String>| secret.as_ref().map(|_| "********");
        f.debug_struct("DatabaseSettings")
            .field("engine", &self.engine)
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &redact(&self.password))
            .field("admin_user", &self.admin_user)
            .field("admin_password", &redact(&self.admin_password))
            .finish()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

// PORT shows up as 5432, "5432" or "" depending on who wrote the settings.
fn deserialize_port<'de, D>(deserializer: D) -> std::result::Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawPort {
        Number(u16),
        Text(String),
    }

    match Option::<RawPort>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawPort::Number(port)) => Ok(Some(port)),
        Some(RawPort::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(RawPort::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("invalid port '{}'", text))),
    }
}

/// Per-database connector overrides. Unset fields fall back to the
/// connector's own defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ConnectorOptions {
    pub connector: Option<String>,
    pub dump_cmd: Option<String>,
    pub restore_cmd: Option<String>,
    pub psql_cmd: Option<String>,
    pub dump_prefix: Option<String>,
    pub dump_suffix: Option<String>,
    pub restore_prefix: Option<String>,
    pub restore_suffix: Option<String>,
    pub env: BTreeMap<String, String>,
    pub dump_env: BTreeMap<String, String>,
    pub restore_env: BTreeMap<String, String>,
    pub use_parent_env: Option<bool>,
    pub exclude: Vec<String>,
    pub drop: Option<bool>,
    pub if_exists: Option<bool>,
    pub single_transaction: Option<bool>,
    pub schemas: Vec<String>,
    pub pg_options: Option<String>,
    pub extension: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default)]
    pub databases: BTreeMap<String, DatabaseSettings>,
    #[serde(default)]
    pub connectors: BTreeMap<String, ConnectorOptions>,
    #[serde(default)]
    pub connector_mapping: BTreeMap<String, String>,
    #[serde(default = "default_filename_template")]
    pub filename_template: String,
    #[serde(default = "default_date_format")]
    pub date_format: String,
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default)]
    pub tmp_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            databases: BTreeMap::new(),
            connectors: BTreeMap::new(),
            connector_mapping: BTreeMap::new(),
            filename_template: default_filename_template(),
            date_format: default_date_format(),
            hostname: default_hostname(),
            tmp_dir: None,
        }
    }
}

fn default_filename_template() -> String {
    DEFAULT_FILENAME_TEMPLATE.to_string()
}

fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_string()
}

fn default_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(raw)?;
        Ok(config)
    }

    pub fn database(&self, alias: &str) -> crate::error::Result<&DatabaseSettings> {
        self.databases
            .get(alias)
            .ok_or_else(|| ConnectorError::UnknownDatabase(alias.to_string()))
    }

    pub fn connector_options(&self, alias: &str) -> ConnectorOptions {
        self.connectors.get(alias).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "DATABASES": {
            "default": {
                "ENGINE": "django.db.backends.postgresql",
                "NAME": "app",
                "HOST": "db.internal",
                "PORT": "5433",
                "USER": "backup",
                "PASSWORD": "hunter2",
                "OPTIONS": {"sslmode": "require"}
            },
            "legacy": {
                "ENGINE": "django.db.backends.mysql",
                "NAME": "old",
                "HOST": "",
                "PORT": ""
            }
        },
        "CONNECTORS": {
            "default": {
                "DROP": false,
                "SCHEMAS": ["public"],
                "DUMP_ENV": {"PGSSLMODE": "require"}
            }
        },
        "HOSTNAME": "backup-host"
    }"#;

    #[test]
    fn parses_databases_and_connectors() {
        let config = AppConfig::from_json(CONFIG).unwrap();
        let db = config.database("default").unwrap();
        assert_eq!(db.name, "app");
        assert_eq!(db.host(), Some("db.internal"));
        assert_eq!(db.port, Some(5433));
        assert_eq!(db.password(), Some("hunter2"));

        let options = config.connector_options("default");
        assert_eq!(options.drop, Some(false));
        assert_eq!(options.schemas, vec!["public".to_string()]);
        assert_eq!(options.dump_env.get("PGSSLMODE").map(String::as_str), Some("require"));
        assert_eq!(config.hostname, "backup-host");
        assert_eq!(config.filename_template, DEFAULT_FILENAME_TEMPLATE);
    }

    #[test]
    fn empty_host_and_port_are_unset() {
        let config = AppConfig::from_json(CONFIG).unwrap();
        let db = config.database("legacy").unwrap();
        assert_eq!(db.host(), None);
        assert_eq!(db.port, None);
        assert!(config.connector_options("legacy").schemas.is_empty());
    }

    #[test]
    fn numeric_port() {
        let config = AppConfig::from_json(r#"{"DATABASES": {"default": {"NAME": "x", "PORT": 42}}}"#).unwrap();
        assert_eq!(config.database("default").unwrap().port, Some(42));
    }

    #[test]
    fn rejects_garbage_port() {
        assert!(AppConfig::from_json(r#"{"DATABASES": {"default": {"PORT": "abc"}}}"#).is_err());
    }

    #[test]
    fn unknown_database() {
        let config = AppConfig::default();
        let err = config.database("missing").unwrap_err();
        assert!(matches!(err, ConnectorError::UnknownDatabase(ref alias) if alias == "missing"));
    }

    #[test]
    fn debug_output_hides_passwords() {
        let config = AppConfig::from_json(CONFIG).unwrap();
        let rendered = format!("{:?}", config.database("default").unwrap());
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("********"));
    }
}
