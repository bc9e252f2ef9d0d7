//! `mysqldump` / `mysql` connector. The password is passed as `MYSQL_PWD`
//! rather than `--password=`, so it never shows up in the process list.

use crate::config::{ConnectorOptions, DatabaseSettings};
use crate::db::base::{CommandConnector, CommandDefaults, DbConnector, Invocation};

pub const PASSWORD_ENV: &str = "MYSQL_PWD";

const MYSQL_DEFAULTS: CommandDefaults = CommandDefaults {
    extension: "sql",
    dump_cmd: "mysqldump",
    restore_cmd: "mysql",
};

#[derive(Debug, Clone)]
pub struct MysqlDumpConnector {
    pub base: CommandConnector,
}

impl MysqlDumpConnector {
    pub fn new(settings: DatabaseSettings, options: &ConnectorOptions) -> Self {
        Self {
            base: CommandConnector::new(settings, options, MYSQL_DEFAULTS),
        }
    }

    fn connection_flags(&self) -> String {
        let settings = &self.base.settings;
        let mut flags = String::new();
        if let Some(host) = settings.host() {
            flags += &format!(" --host={}", shell_words::quote(host));
        }
        if let Some(port) = settings.port {
            flags += &format!(" --port={}", port);
        }
        if let Some(user) = settings.user() {
            flags += &format!(" --user={}", shell_words::quote(user));
        }
        flags
    }

    fn with_password(&self, mut invocation: Invocation) -> Invocation {
        if let Some(password) = self.base.settings.password() {
            invocation
                .env
                .insert(PASSWORD_ENV.to_string(), password.to_string());
        }
        invocation
    }
}

impl DbConnector for MysqlDumpConnector {
    fn base(&self) -> &CommandConnector {
        &self.base
    }

    fn dump_invocation(&self) -> Invocation {
        let name = &self.base.settings.name;
        let mut cmd = format!("{} {} --quick", self.base.dump_cmd, shell_words::quote(name));
        cmd += &self.connection_flags();
        for table in &self.base.exclude {
            cmd += &format!(" --ignore-table={}", shell_words::quote(&format!("{}.{}", name, table)));
        }
        self.with_password(self.base.dump_invocation(&cmd))
    }

    fn restore_invocations(&self) -> Vec<Invocation> {
        let mut cmd = format!("{} {}", self.base.restore_cmd, shell_words::quote(&self.base.settings.name));
        cmd += &self.connection_flags();
        vec![self.with_password(self.base.restore_invocation(&cmd))]
    }
}
