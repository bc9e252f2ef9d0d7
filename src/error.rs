//! Error types for the database connectors

use std::process::ExitStatus;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConnectorError>;

#[derive(Error, Debug)]
pub enum ConnectorError {
    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------
    #[error("Database '{0}' is not configured")]
    UnknownDatabase(String),

    #[error("No connector registered for engine '{0}'")]
    UnsupportedEngine(String),

    #[error("Unknown connector '{0}'")]
    UnknownConnector(String),

    // -------------------------------------------------------------------------
    // Command execution
    // -------------------------------------------------------------------------
    #[error("Command is empty")]
    EmptyCommand,

    #[error("Failed to parse command '{command}': {source}")]
    Parse {
        command: String,
        #[source]
        source: shell_words::ParseError,
    },

    #[error("Failed to execute '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Error running: {command} ({status})\n{stderr}")]
    CommandFailed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Failed to spool command output: {0}")]
    Io(#[from] std::io::Error),
}
