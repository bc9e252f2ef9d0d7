//! Connectors driving `pg_dump`, `pg_restore` and `psql`.
//!
//! All three connect through a `postgresql://` URI passed as `--dbname`. The
//! password never appears in the URI or anywhere else in argv; it is handed to
//! the child as `PGPASSWORD`.

use crate::config::{ConnectorOptions, DatabaseSettings};
use crate::db::base::{CommandConnector, CommandDefaults, DbConnector, Invocation};

pub const PASSWORD_ENV: &str = "PGPASSWORD";

const PG_DUMP_DEFAULTS: CommandDefaults = CommandDefaults {
    extension: "psql",
    dump_cmd: "pg_dump",
    restore_cmd: "psql",
};

const PG_DUMP_BINARY_DEFAULTS: CommandDefaults = CommandDefaults {
    extension: "psql.bin",
    dump_cmd: "pg_dump",
    restore_cmd: "pg_restore",
};

const CREATE_POSTGIS: &str = "\"CREATE EXTENSION IF NOT EXISTS postgis;\"";

/// Builds `postgresql://[user@]host[:port]/name` without any password.
pub fn postgres_uri(settings: &DatabaseSettings) -> String {
    let host = match settings.host() {
        None => "localhost".to_string(),
        // Unix socket directory
        Some(host) if host.starts_with('/') => urlencoding::encode(host).into_owned(),
        Some(host) if host.contains(':') && !host.starts_with('[') => format!("[{}]", host),
        Some(host) => host.to_string(),
    };
    let user = settings
        .user()
        .map(|user| format!("{}@", urlencoding::encode(user)))
        .unwrap_or_default();
    let port = settings.port.map(|port| format!(":{}", port)).unwrap_or_default();

    format!(
        "postgresql://{}{}{}/{}",
        user,
        host,
        port,
        urlencoding::encode(&settings.name)
    )
}

fn dbname_arg(settings: &DatabaseSettings) -> String {
    format!("--dbname={}", shell_words::quote(&postgres_uri(settings)))
}

fn exclude_flags(tables: &[String]) -> String {
    tables
        .iter()
        .map(|table| format!(" --exclude-table-data={}", shell_words::quote(table)))
        .collect()
}

fn schema_flags(schemas: &[String]) -> String {
    schemas
        .iter()
        .map(|schema| format!(" -n {}", shell_words::quote(schema)))
        .collect()
}

fn with_password(mut invocation: Invocation, password: Option<&str>) -> Invocation {
    if let Some(password) = password {
        invocation
            .env
            .insert(PASSWORD_ENV.to_string(), password.to_string());
    }
    invocation
}

/// Plain-SQL dumps restored through `psql`.
#[derive(Debug, Clone)]
pub struct PgDumpConnector {
    pub base: CommandConnector,
    pub drop: bool,
    pub single_transaction: bool,
    pub schemas: Vec<String>,
}

impl PgDumpConnector {
    pub fn new(settings: DatabaseSettings, options: &ConnectorOptions) -> Self {
        Self {
            base: CommandConnector::new(settings, options, PG_DUMP_DEFAULTS),
            drop: options.drop.unwrap_or(true),
            single_transaction: options.single_transaction.unwrap_or(true),
            schemas: options.schemas.clone(),
        }
    }

    fn dump_command(&self) -> String {
        let mut cmd = format!("{} {}", self.base.dump_cmd, dbname_arg(&self.base.settings));
        cmd += &exclude_flags(&self.base.exclude);
        if self.drop {
            cmd += " --clean";
        }
        cmd += &schema_flags(&self.schemas);
        cmd
    }

    fn restore_command(&self) -> String {
        let mut cmd = format!("{} {}", self.base.restore_cmd, dbname_arg(&self.base.settings));
        // psql exits 0 on SQL errors unless told otherwise
        cmd += " --set ON_ERROR_STOP=on";
        // No -n here: for psql it means "disable readline", not a schema
        // filter. Schemas are already applied by pg_dump.
        if self.single_transaction {
            cmd += " --single-transaction";
        }
        cmd
    }
}

impl DbConnector for PgDumpConnector {
    fn base(&self) -> &CommandConnector {
        &self.base
    }

    fn dump_invocation(&self) -> Invocation {
        let invocation = self.base.dump_invocation(&self.dump_command());
        with_password(invocation, self.base.settings.password())
    }

    fn restore_invocations(&self) -> Vec<Invocation> {
        let invocation = self.base.restore_invocation(&self.restore_command());
        vec![with_password(invocation, self.base.settings.password())]
    }
}

/// Custom-format archives restored through `pg_restore`.
#[derive(Debug, Clone)]
pub struct PgDumpBinaryConnector {
    pub base: CommandConnector,
    pub drop: bool,
    pub single_transaction: bool,
    pub if_exists: bool,
    pub schemas: Vec<String>,
    pub pg_options: Option<String>,
}

impl PgDumpBinaryConnector {
    pub fn new(settings: DatabaseSettings, options: &ConnectorOptions) -> Self {
        Self {
            base: CommandConnector::new(settings, options, PG_DUMP_BINARY_DEFAULTS),
            drop: options.drop.unwrap_or(true),
            single_transaction: options.single_transaction.unwrap_or(true),
            if_exists: options.if_exists.unwrap_or(false),
            schemas: options.schemas.clone(),
            pg_options: options.pg_options.clone().filter(|o| !o.trim().is_empty()),
        }
    }

    // Dropping is left to pg_restore --clean.
    fn dump_command(&self) -> String {
        let mut cmd = format!("{} {}", self.base.dump_cmd, dbname_arg(&self.base.settings));
        cmd += " --format=custom";
        cmd += &exclude_flags(&self.base.exclude);
        cmd += &schema_flags(&self.schemas);
        cmd
    }

    fn restore_command(&self) -> String {
        let mut cmd = format!("{} {}", self.base.restore_cmd, dbname_arg(&self.base.settings));
        if let Some(options) = &self.pg_options {
            cmd += " ";
            cmd += options.trim();
        }
        if self.single_transaction {
            cmd += " --single-transaction";
        }
        if self.drop {
            cmd += " --clean";
        }
        cmd += &schema_flags(&self.schemas);
        if self.if_exists {
            cmd += " --if-exists";
        }
        cmd
    }
}

impl DbConnector for PgDumpBinaryConnector {
    fn base(&self) -> &CommandConnector {
        &self.base
    }

    fn dump_invocation(&self) -> Invocation {
        let invocation = self.base.dump_invocation(&self.dump_command());
        with_password(invocation, self.base.settings.password())
    }

    fn restore_invocations(&self) -> Vec<Invocation> {
        let invocation = self.base.restore_invocation(&self.restore_command());
        vec![with_password(invocation, self.base.settings.password())]
    }
}

/// `PgDumpConnector` that makes sure PostGIS exists before restoring.
#[derive(Debug, Clone)]
pub struct PgDumpGisConnector {
    pub inner: PgDumpConnector,
    pub psql_cmd: String,
}

impl PgDumpGisConnector {
    pub fn new(settings: DatabaseSettings, options: &ConnectorOptions) -> Self {
        Self {
            inner: PgDumpConnector::new(settings, options),
            psql_cmd: options.psql_cmd.clone().unwrap_or_else(|| "psql".to_string()),
        }
    }

    /// Runs as `ADMIN_USER`; `None` when no admin user is configured.
    pub fn enable_postgis_invocation(&self) -> Option<Invocation> {
        let settings = &self.inner.base.settings;
        let admin = settings.admin_user()?;

        let mut cmd = format!("{} -c {}", self.psql_cmd, CREATE_POSTGIS);
        cmd += &format!(" --username={}", shell_words::quote(admin));
        cmd += " --no-password";
        if let Some(host) = settings.host() {
            cmd += &format!(" --host={}", shell_words::quote(host));
        }
        if let Some(port) = settings.port {
            cmd += &format!(" --port={}", port);
        }
        if !settings.name.is_empty() {
            cmd += &format!(" --dbname={}", shell_words::quote(&settings.name));
        }

        let invocation = Invocation {
            command: cmd,
            env: self.inner.base.restore_env.clone(),
            reads_dump: false,
        };
        let password = settings.admin_password().or(settings.password());
        Some(with_password(invocation, password))
    }
}

impl DbConnector for PgDumpGisConnector {
    fn base(&self) -> &CommandConnector {
        &self.inner.base
    }

    fn dump_invocation(&self) -> Invocation {
        self.inner.dump_invocation()
    }

    fn restore_invocations(&self) -> Vec<Invocation> {
        let mut invocations: Vec<Invocation> = self.enable_postgis_invocation().into_iter().collect();
        invocations.extend(self.inner.restore_invocations());
        invocations
    }
}
