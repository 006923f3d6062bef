// Configuration validation
//
// Validates that required fields are present and values are sensible.
// Dependency references are checked later, when descriptors are built.

use crate::*;
use anyhow::{bail, Result};
use tracing::warn;

const KNOWN_WORKER_TYPES: &[&str] = &["Standard", "G.025X", "G.1X", "G.2X", "G.4X", "G.8X", "Z.2X"];

/// Glue rejects jobs with more automatic retries than this.
const MAX_JOB_RETRIES: u32 = 10;

pub fn validate_config(config: &DeployConfig) -> Result<()> {
    validate_bucket_config(&config.bucket)?;
    validate_database_config(&config.database)?;
    validate_role_config(&config.role)?;
    validate_job_config(config)?;
    validate_catalog_config(config)?;
    validate_poll_config(&config.poll)?;
    validate_apply_config(&config.apply)?;

    if config.log.level.trim().is_empty() {
        bail!("log.level must not be empty");
    }

    Ok(())
}

fn validate_bucket_config(config: &BucketConfig) -> Result<()> {
    if config.name.is_empty() {
        bail!("bucket.name is required");
    }
    if let Err(reason) = validate_bucket_name(&config.name) {
        bail!("bucket.name '{}' is invalid: {}", config.name, reason);
    }
    if config.force_destroy {
        warn!(
            bucket = %config.name,
            "bucket.force_destroy is set; glueform never deletes buckets so it has no effect"
        );
    }
    Ok(())
}

pub(crate) fn validate_bucket_name(input: &str) -> std::result::Result<(), String> {
    if input.len() < 3 || input.len() > 63 {
        return Err("must be 3-63 characters".to_string());
    }
    if !input
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err("must contain only lowercase letters, numbers, dots and hyphens".to_string());
    }
    if input.starts_with('-') || input.ends_with('-') {
        return Err("cannot start or end with a hyphen".to_string());
    }
    if input.contains("..") {
        return Err("cannot contain consecutive dots".to_string());
    }
    Ok(())
}

fn validate_database_config(config: &DatabaseConfig) -> Result<()> {
    if config.name.is_empty() {
        bail!("database.name is required");
    }
    if config.name.len() > 255 {
        bail!("database.name must be at most 255 characters");
    }
    if !config
        .name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        bail!(
            "database.name '{}' must contain only lowercase letters, numbers and underscores",
            config.name
        );
    }
    Ok(())
}

fn validate_role_config(config: &RoleConfig) -> Result<()> {
    if config.name.is_empty() {
        bail!("role.name is required");
    }
    if config.name.len() > 64 {
        bail!("role.name must be at most 64 characters");
    }
    if !config
        .name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "+=,.@_-".contains(c))
    {
        bail!("role.name '{}' contains characters IAM does not allow", config.name);
    }
    if config.service_principal.is_empty() {
        bail!("role.service_principal must not be empty");
    }
    for arn in &config.managed_policies {
        if !arn.starts_with("arn:") {
            bail!("role.managed_policies entry '{}' is not an ARN", arn);
        }
    }

    let inline = &config.inline_policy;
    if inline.name.is_empty() {
        bail!("role.inline_policy.name must not be empty");
    }
    if inline.actions.is_empty() {
        bail!("role.inline_policy.actions must list at least one action");
    }
    if inline.resource.is_empty() {
        bail!("role.inline_policy.resource must not be empty");
    }
    if inline.actions.iter().any(|a| a.ends_with(":*")) && inline.resource == "*" {
        warn!(
            policy = %inline.name,
            "role.inline_policy grants service-wide wildcards on every resource"
        );
    }
    Ok(())
}

fn validate_job_config(config: &DeployConfig) -> Result<()> {
    let job = &config.job;
    if job.name.is_empty() {
        bail!("job.name is required");
    }
    if job.name.len() > 255 {
        bail!("job.name must be at most 255 characters");
    }

    let script = config.script_uri();
    if !script.starts_with("s3://") {
        bail!("job.script_uri '{}' must be an s3:// URI", script);
    }

    if job.worker_count == 0 {
        bail!("job.worker_count must be greater than 0");
    }
    if !KNOWN_WORKER_TYPES.contains(&job.worker_type.as_str()) {
        warn!(
            worker_type = %job.worker_type,
            "job.worker_type is not a known Glue worker type"
        );
    }
    if job.worker_type != "Standard" && job.worker_count < 2 {
        warn!(
            worker_count = job.worker_count,
            "Glue Spark jobs need at least 2 workers; the service may reject this job"
        );
    }

    if job.max_retries > MAX_JOB_RETRIES {
        bail!(
            "job.max_retries must be at most {} (got {})",
            MAX_JOB_RETRIES,
            job.max_retries
        );
    }

    if job.glue_version.is_empty() {
        bail!("job.glue_version must not be empty");
    }
    if let Some(0) = job.timeout_minutes {
        bail!("job.timeout_minutes must be greater than 0 when set");
    }

    for key in job.arguments.keys() {
        if !key.starts_with("--") {
            bail!("job.arguments key '{}' must start with '--'", key);
        }
    }

    Ok(())
}

fn validate_catalog_config(config: &DeployConfig) -> Result<()> {
    let catalog = &config.catalog;
    if catalog.name.is_empty() {
        bail!("catalog.name must not be empty");
    }
    if !catalog
        .name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        bail!(
            "catalog.name '{}' must contain only letters, numbers and underscores",
            catalog.name
        );
    }
    if !config.warehouse().starts_with("s3://") {
        bail!("catalog.warehouse must be an s3:// URI");
    }
    if catalog.catalog_impl.is_empty() || catalog.io_impl.is_empty() {
        bail!("catalog.catalog_impl and catalog.io_impl must not be empty");
    }
    Ok(())
}

fn validate_poll_config(config: &PollConfig) -> Result<()> {
    if config.initial_delay_ms == 0 {
        bail!("poll.initial_delay_ms must be greater than 0");
    }
    if config.max_delay_ms < config.initial_delay_ms {
        bail!("poll.max_delay_ms must be at least poll.initial_delay_ms");
    }
    if !config.backoff_factor.is_finite() || config.backoff_factor < 1.0 {
        bail!("poll.backoff_factor must be a finite number >= 1.0");
    }
    if config.timeout_secs == 0 {
        bail!("poll.timeout_secs must be greater than 0");
    }
    Ok(())
}

fn validate_apply_config(config: &ApplyConfig) -> Result<()> {
    if config.concurrency == 0 {
        bail!("apply.concurrency must be greater than 0");
    }
    if config.concurrency > 8 {
        warn!(
            concurrency = config.concurrency,
            "apply.concurrency is high; AWS control-plane APIs may throttle"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> DeployConfig {
        let mut config = DeployConfig::default();
        config.bucket.name = "my-native-s3-table-bucket".to_string();
        config.database.name = "s3tables_db".to_string();
        config.role.name = "glue5-s3tables-role".to_string();
        config.job.name = "glue5-iceberg-s3tables-job".to_string();
        config
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_each_required_name() {
        for field in ["bucket.name", "database.name", "role.name", "job.name"] {
            let mut config = valid();
            match field {
                "bucket.name" => config.bucket.name.clear(),
                "database.name" => config.database.name.clear(),
                "role.name" => config.role.name.clear(),
                _ => config.job.name.clear(),
            }
            let err = validate_config(&config).unwrap_err();
            assert!(
                err.to_string().contains(field),
                "expected error about {field}, got: {err}"
            );
        }
    }

    #[test]
    fn test_bucket_name_rules() {
        assert!(validate_bucket_name("my-bucket").is_ok());
        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name("My-Bucket").is_err());
        assert!(validate_bucket_name("-bucket").is_err());
        assert!(validate_bucket_name("a..b").is_err());
    }

    #[test]
    fn test_job_bounds() {
        let mut config = valid();
        config.job.worker_count = 0;
        assert!(validate_config(&config).is_err());

        let mut config = valid();
        config.job.max_retries = 11;
        assert!(validate_config(&config).is_err());

        let mut config = valid();
        config.job.script_uri = Some("file:///tmp/etl.py".to_string());
        assert!(validate_config(&config).is_err());

        let mut config = valid();
        config
            .job
            .arguments
            .insert("TempDir".to_string(), "s3://x/".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_poll_bounds() {
        let mut config = valid();
        config.poll.backoff_factor = 0.5;
        assert!(validate_config(&config).is_err());

        let mut config = valid();
        config.poll.max_delay_ms = 10;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_database_name_charset() {
        let mut config = valid();
        config.database.name = "S3-Tables".to_string();
        assert!(validate_config(&config).is_err());
    }
}
