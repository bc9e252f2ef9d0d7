use anyhow::{Context, Result};
use chrono::Local;
use log::{debug, info};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::db::{self, DbConnector};
use crate::filename;

fn backup_filename(
    config: &AppConfig,
    alias: &str,
    connector: &dyn DbConnector,
    servername: Option<&str>,
) -> Result<String> {
    let datetime = filename::timestamp(&config.date_format, &Local::now())?;
    Ok(filename::generate(
        &config.filename_template,
        connector.extension(),
        &config.database(alias)?.name,
        servername.unwrap_or(&config.hostname),
        &datetime,
    ))
}

/// Dumps `alias` into `output`. A missing `output` or an existing directory
/// gets a generated backup filename.
pub async fn dump_database(
    config: &AppConfig,
    alias: &str,
    output: Option<&Path>,
    servername: Option<&str>,
) -> Result<PathBuf> {
    let connector = db::get_connector(config, alias)?;

    let path = match output {
        Some(path) if !path.is_dir() => path.to_path_buf(),
        dir => {
            let name = backup_filename(config, alias, connector.as_ref(), servername)?;
            dir.map(|d| d.join(&name)).unwrap_or_else(|| PathBuf::from(name))
        }
    };

    info!("Dumping database '{}' to '{}'", alias, path.display());

    let mut dump = db::create_dump(connector.as_ref())
        .await
        .with_context(|| format!("Failed to dump database '{}'", alias))?;
    let mut file = File::create(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let bytes = std::io::copy(&mut dump, &mut file)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!("Wrote {} bytes to '{}'", bytes, path.display());
    Ok(path)
}

pub async fn restore_database(config: &AppConfig, alias: &str, input: &Path) -> Result<()> {
    let connector = db::get_connector(config, alias)?;
    let dump = File::open(input).with_context(|| format!("Failed to open {}", input.display()))?;

    info!("Restoring database '{}' from '{}'", alias, input.display());

    let mut output = db::restore_dump(connector.as_ref(), dump)
        .await
        .with_context(|| format!("Failed to restore database '{}'", alias))?;

    let mut stderr = String::new();
    output.stderr.read_to_string(&mut stderr).ok();
    if !stderr.trim().is_empty() {
        debug!("Restore stderr: {}", stderr.trim());
    }

    info!("Database '{}' restored successfully", alias);
    Ok(())
}

/// One line per command that would run, with env variable names but never
/// their values.
pub fn describe(config: &AppConfig, alias: &str) -> Result<Vec<String>> {
    let connector = db::get_connector(config, alias)?;

    let render = |label: &str, invocation: &db::Invocation| {
        let names = invocation.env_names();
        if names.is_empty() {
            format!("{}: {}", label, invocation.command)
        } else {
            format!("{}: {} [env: {}]", label, invocation.command, names.join(", "))
        }
    };

    let mut lines = vec![render("dump", &connector.dump_invocation())];
    for invocation in connector.restore_invocations() {
        lines.push(render("restore", &invocation));
    }
    Ok(lines)
}
