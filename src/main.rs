use anyhow::{Context, Result};
use clap::Parser;
use glueform::Command;
use std::path::PathBuf;
use std::process::ExitCode;

/// Declarative S3 / Glue / IAM deployment for Iceberg ETL jobs
#[derive(Parser)]
#[command(name = "glueform")]
#[command(version)]
#[command(about = "Reconcile S3, Glue and IAM resources and run Glue Iceberg ETL jobs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(glueform::exit_code(&e))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let bootstrap = glueform::bootstrap_subscriber(cli.log_level.as_deref());
    let config = tracing::subscriber::with_default(bootstrap, || {
        glueform::load_config(cli.config.as_deref())
    })?;
    glueform::init_tracing(&config.log, cli.log_level.as_deref());

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(cli.command.run(config))
}
