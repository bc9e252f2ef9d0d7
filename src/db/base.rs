use log::{debug, error};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use crate::config::{ConnectorOptions, DatabaseSettings};
use crate::error::{ConnectorError, Result};

/// A fully assembled command line plus the environment it needs.
///
/// `env` only holds what the connector adds (per-operation variables and
/// credentials); the parent environment is merged in at spawn time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub env: BTreeMap<String, String>,
    pub reads_dump: bool,
}

impl Invocation {
    /// Variable names only, values withheld.
    pub fn env_names(&self) -> Vec<&str> {
        self.env.keys().map(String::as_str).collect()
    }
}

/// Spooled output of a finished command, rewound to the start.
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: File,
    pub stderr: File,
}

/// Built-in values a concrete connector starts from before options apply.
#[derive(Debug, Clone, Copy)]
pub struct CommandDefaults {
    pub extension: &'static str,
    pub dump_cmd: &'static str,
    pub restore_cmd: &'static str,
}

/// Shared state of every connector that shells out to a dump/restore tool.
#[derive(Debug, Clone)]
pub struct CommandConnector {
    pub settings: DatabaseSettings,
    pub extension: String,
    pub dump_cmd: String,
    pub restore_cmd: String,
    pub dump_prefix: String,
    pub dump_suffix: String,
    pub restore_prefix: String,
    pub restore_suffix: String,
    pub env: BTreeMap<String, String>,
    pub dump_env: BTreeMap<String, String>,
    pub restore_env: BTreeMap<String, String>,
    pub use_parent_env: bool,
    pub exclude: Vec<String>,
    pub tmp_dir: Option<PathBuf>,
}

impl CommandConnector {
    pub fn new(settings: DatabaseSettings, options: &ConnectorOptions, defaults: CommandDefaults) -> Self {
        let or_default = |value: &Option<String>, default: &str| {
            value.clone().unwrap_or_else(|| default.to_string())
        };

        Self {
            settings,
            extension: or_default(&options.extension, defaults.extension),
            dump_cmd: or_default(&options.dump_cmd, defaults.dump_cmd),
            restore_cmd: or_default(&options.restore_cmd, defaults.restore_cmd),
            dump_prefix: options.dump_prefix.clone().unwrap_or_default(),
            dump_suffix: options.dump_suffix.clone().unwrap_or_default(),
            restore_prefix: options.restore_prefix.clone().unwrap_or_default(),
            restore_suffix: options.restore_suffix.clone().unwrap_or_default(),
            env: options.env.clone(),
            dump_env: options.dump_env.clone(),
            restore_env: options.restore_env.clone(),
            use_parent_env: options.use_parent_env.unwrap_or(true),
            exclude: options.exclude.clone(),
            tmp_dir: None,
        }
    }

    pub fn dump_invocation(&self, command: &str) -> Invocation {
        Invocation {
            command: wrap(&self.dump_prefix, command, &self.dump_suffix),
            env: self.dump_env.clone(),
            reads_dump: false,
        }
    }

    pub fn restore_invocation(&self, command: &str) -> Invocation {
        Invocation {
            command: wrap(&self.restore_prefix, command, &self.restore_suffix),
            env: self.restore_env.clone(),
            reads_dump: true,
        }
    }

    /// Environment handed to the child: parent env (unless disabled), then
    /// the connector-wide `env`, then the invocation's own variables.
    /// Parent variables are kept as-is, including non UTF-8 ones.
    pub fn environment(&self, extra: &BTreeMap<String, String>) -> BTreeMap<OsString, OsString> {
        let mut env: BTreeMap<OsString, OsString> = if self.use_parent_env {
            std::env::vars_os().collect()
        } else {
            BTreeMap::new()
        };
        env.extend(self.env.iter().chain(extra).map(|(k, v)| (OsString::from(k), OsString::from(v))));
        env
    }

    pub async fn run_command(&self, invocation: &Invocation, stdin: Option<File>) -> Result<CommandOutput> {
        let argv = shell_words::split(&invocation.command).map_err(|source| ConnectorError::Parse {
            command: invocation.command.clone(),
            source,
        })?;
        let (program, args) = argv.split_first().ok_or(ConnectorError::EmptyCommand)?;

        debug!("Running: {}", invocation.command);

        let mut stdout = self.spool()?;
        let mut stderr = self.spool()?;

        let mut command = Command::new(program);
        command
            .args(args)
            .env_clear()
            .envs(self.environment(&invocation.env))
            .stdin(stdin.map(Stdio::from).unwrap_or_else(Stdio::null))
            .stdout(Stdio::from(stdout.try_clone()?))
            .stderr(Stdio::from(stderr.try_clone()?));

        let status = command.status().await.map_err(|source| ConnectorError::Spawn {
            program: program.clone(),
            source,
        })?;

        stdout.seek(SeekFrom::Start(0))?;
        stderr.seek(SeekFrom::Start(0))?;

        if !status.success() {
            let mut message = Vec::new();
            stderr.read_to_end(&mut message)?;
            let message = String::from_utf8_lossy(&message).into_owned();
            error!("{} failed with status {}: {}", program, status, message.trim());
            return Err(ConnectorError::CommandFailed {
                command: invocation.command.clone(),
                status,
                stderr: message,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }

    fn spool(&self) -> Result<File> {
        let file = match &self.tmp_dir {
            Some(dir) => tempfile::tempfile_in(dir)?,
            None => tempfile::tempfile()?,
        };
        Ok(file)
    }
}

/// Joins prefix, command and suffix, skipping the empty ones.
pub fn wrap(prefix: &str, command: &str, suffix: &str) -> String {
    [prefix, command, suffix]
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub trait DbConnector: fmt::Debug + Send + Sync {
    fn base(&self) -> &CommandConnector;

    fn extension(&self) -> &str {
        &self.base().extension
    }

    fn dump_invocation(&self) -> Invocation;

    /// Commands run in order on restore; exactly one of them reads the dump.
    fn restore_invocations(&self) -> Vec<Invocation>;
}

pub async fn create_dump(connector: &dyn DbConnector) -> Result<File> {
    let invocation = connector.dump_invocation();
    let output = connector.base().run_command(&invocation, None).await?;
    Ok(output.stdout)
}

pub async fn restore_dump(connector: &dyn DbConnector, dump: File) -> Result<CommandOutput> {
    let mut dump = Some(dump);
    let mut last = None;
    for invocation in connector.restore_invocations() {
        let stdin = if invocation.reads_dump { dump.take() } else { None };
        last = Some(connector.base().run_command(&invocation, stdin).await?);
    }
    last.ok_or(ConnectorError::EmptyCommand)
}
