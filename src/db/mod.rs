pub mod base;
pub mod mysql;
pub mod postgresql;

use log::debug;
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::{AppConfig, ConnectorOptions, DatabaseSettings};
use crate::error::{ConnectorError, Result};

pub use base::{create_dump, restore_dump, DbConnector, Invocation};
use mysql::MysqlDumpConnector;
use postgresql::{PgDumpBinaryConnector, PgDumpConnector, PgDumpGisConnector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorKind {
    PgDump,
    PgDumpGis,
    PgDumpBinary,
    MysqlDump,
}

/// Engines known out of the box. `CONNECTOR_MAPPING` entries take precedence.
const ENGINE_MAPPING: &[(&str, ConnectorKind)] = &[
    ("django.db.backends.postgresql", ConnectorKind::PgDump),
    ("django.db.backends.postgresql_psycopg2", ConnectorKind::PgDump),
    ("django.contrib.gis.db.backends.postgis", ConnectorKind::PgDumpGis),
    ("django.db.backends.mysql", ConnectorKind::MysqlDump),
    ("django.contrib.gis.db.backends.mysql", ConnectorKind::MysqlDump),
];

impl FromStr for ConnectorKind {
    type Err = ConnectorError;

    /// Accepts `PgDumpConnector` as well as dotted paths ending in it.
    fn from_str(name: &str) -> Result<Self> {
        let short = name.trim().rsplit('.').next().unwrap_or_default();
        match short {
            "PgDumpConnector" => Ok(Self::PgDump),
            "PgDumpGisConnector" => Ok(Self::PgDumpGis),
            "PgDumpBinaryConnector" => Ok(Self::PgDumpBinary),
            "MysqlDumpConnector" => Ok(Self::MysqlDump),
            _ => Err(ConnectorError::UnknownConnector(name.to_string())),
        }
    }
}

impl ConnectorKind {
    pub fn for_engine(config: &AppConfig, engine: &str) -> Result<Self> {
        if let Some(name) = config.connector_mapping.get(engine) {
            return name.parse();
        }
        ENGINE_MAPPING
            .iter()
            .find(|(known, _)| *known == engine)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| ConnectorError::UnsupportedEngine(engine.to_string()))
    }

    pub fn build(
        self,
        settings: DatabaseSettings,
        options: &ConnectorOptions,
        tmp_dir: Option<PathBuf>,
    ) -> Box<dyn DbConnector> {
        match self {
            Self::PgDump => {
                let mut connector = PgDumpConnector::new(settings, options);
                connector.base.tmp_dir = tmp_dir;
                Box::new(connector)
            }
            Self::PgDumpGis => {
                let mut connector = PgDumpGisConnector::new(settings, options);
                connector.inner.base.tmp_dir = tmp_dir;
                Box::new(connector)
            }
            Self::PgDumpBinary => {
                let mut connector = PgDumpBinaryConnector::new(settings, options);
                connector.base.tmp_dir = tmp_dir;
                Box::new(connector)
            }
            Self::MysqlDump => {
                let mut connector = MysqlDumpConnector::new(settings, options);
                connector.base.tmp_dir = tmp_dir;
                Box::new(connector)
            }
        }
    }
}

/// Resolves the connector for a configured database alias.
pub fn get_connector(config: &AppConfig, alias: &str) -> Result<Box<dyn DbConnector>> {
    let settings = config.database(alias)?.clone();
    let options = config.connector_options(alias);
    let kind = match &options.connector {
        Some(name) => name.parse()?,
        None => ConnectorKind::for_engine(config, &settings.engine)?,
    };
    debug!("Using {:?} for database '{}'", kind, alias);
    Ok(kind.build(settings, &options, config.tmp_dir.clone()))
}
