use anyhow::{anyhow, Result};
use chrono::{DateTime, TimeZone};
use regex::Regex;
use std::fmt::{Display, Write};
use std::sync::LazyLock;

static DASHES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-+").expect("valid pattern"));

/// Formats `now` with a strftime pattern, rejecting invalid patterns
/// instead of panicking.
pub fn timestamp<Tz>(format: &str, now: &DateTime<Tz>) -> Result<String>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut out = String::new();
    write!(out, "{}", now.format(format)).map_err(|_| anyhow!("Invalid date format '{}'", format))?;
    Ok(out)
}

/// Renders a backup filename from `template`.
///
/// Placeholders: `{databasename}`, `{servername}`, `{datetime}`,
/// `{extension}`, `{content_type}`. Paths and suffixes are stripped from the
/// database name (`/srv/app.sqlite3` becomes `app`), runs of `-` collapse to
/// one and a leading `-` is dropped.
pub fn generate(
    template: &str,
    extension: &str,
    database_name: &str,
    servername: &str,
    datetime: &str,
) -> String {
    let database_name = database_name.rsplit('/').next().unwrap_or_default();
    let database_name = database_name.split('.').next().unwrap_or_default();

    let filename = template
        .replace("{databasename}", database_name)
        .replace("{servername}", servername)
        .replace("{datetime}", datetime)
        .replace("{extension}", extension)
        .replace("{content_type}", "db");
    let filename = DASHES.replace_all(&filename, "-");
    filename.strip_prefix('-').unwrap_or(&filename[..]).to_string()
}
