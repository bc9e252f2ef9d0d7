mod backup;
mod config;
mod db;
mod error;
mod filename;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, LevelFilter};
use log4rs::{append::file::FileAppender, config::{Appender, Config as LogConfig, Root}, encode::pattern::PatternEncoder};
use std::path::{Path, PathBuf};

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "dbbackup")]
#[command(about = "Dump and restore databases through their native command-line tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, env = "DBBACKUP_CONFIG", default_value = "dbbackup.json", help = "Path to the JSON settings file")]
    config: PathBuf,

    #[arg(short, long, default_value = "default", help = "Database alias from DATABASES")]
    database: String,

    #[arg(long, env = "DBBACKUP_LOG_FILE", default_value = "dbbackup.log")]
    log_file: PathBuf,

    #[arg(long, env = "DBBACKUP_TMP_DIR", help = "Directory for spooled command output")]
    tmp_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Dump a database")]
    Dump {
        #[arg(short, long, help = "Output file or directory. Defaults to a generated filename")]
        output: Option<PathBuf>,

        #[arg(short, long, help = "Server name used in generated filenames")]
        servername: Option<String>,
    },

    #[command(about = "Restore a database from dump")]
    Restore {
        #[arg(help = "Input dump file path")]
        input: PathBuf,
    },

    /// Print the commands a dump and restore would run, without secrets
    ShowCommand,
}

fn init_logging(path: &Path) -> Result<()> {
    let logfile = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S)} {l} {t} - {m}{n}")))
        .build(path)?;

    let log_config = LogConfig::builder()
        .appender(Appender::builder().build("logfile", Box::new(logfile)))
        .build(Root::builder().appender("logfile").build(LevelFilter::Debug))?;

    log4rs::init_config(log_config)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli: Cli = Cli::parse();
    init_logging(&cli.log_file)?;
    info!("Starting dbbackup");

    let mut config = AppConfig::load(&cli.config)?;
    if cli.tmp_dir.is_some() {
        config.tmp_dir = cli.tmp_dir.clone();
    }

    match &cli.command {
        Commands::Dump { output, servername } => {
            let path = backup::dump_database(&config, &cli.database, output.as_deref(), servername.as_deref()).await?;
            println!("{}", path.display());
        }
        Commands::Restore { input } => {
            backup::restore_database(&config, &cli.database, input).await?;
        }
        Commands::ShowCommand => {
            for line in backup::describe(&config, &cli.database)? {
                println!("{}", line);
            }
        }
    }

    Ok(())
}
