//! glueform
//!
//! Declarative deployment of an S3 bucket, Glue catalog database, IAM role
//! and Glue Iceberg ETL job, plus submission and polling of job runs.
//!
//! The binary is a thin clap wrapper over [`Command::run`]; everything that
//! talks to AWS lives in `glueform-aws`, the planning logic in
//! `glueform-core`.

pub mod commands;
mod init;
mod output;

pub use commands::{Command, OutputFormat};
pub use init::{bootstrap_subscriber, init_tracing};

use anyhow::{Context, Result};
use glueform_config::DeployConfig;
use glueform_core::GlueformError;
use std::path::Path;

/// Load and validate configuration.
///
/// Any failure is reported as a validation error so the process exits with
/// the validation code.
pub fn load_config(path: Option<&Path>) -> Result<DeployConfig> {
    let loaded = match path {
        Some(path) => DeployConfig::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => DeployConfig::load().context("Failed to load configuration"),
    };
    loaded.map_err(|e| GlueformError::validation(format!("{e:#}")).into())
}

/// Process exit code for a failed command.
///
/// Classified failures map to their [`GlueformError::exit_code`]; anything
/// else exits 1.
pub fn exit_code(error: &anyhow::Error) -> u8 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<GlueformError>())
        .map(GlueformError::exit_code)
        .unwrap_or(1)
}
