use super::{DeployConfig, LogFormat};
use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;

pub const ENV_PREFIX: &str = "GLUEFORM_";

/// Abstraction over environment-variable lookups so tests can supply their
/// own source of overrides.
pub trait EnvSource {
    /// Get a variable by its key WITHOUT the GLUEFORM_ prefix
    fn get(&self, key: &str) -> Option<String>;
}

/// In-memory env source keyed by the unprefixed variable name.
#[derive(Debug, Clone, Default)]
pub struct MapEnvSource(pub HashMap<String, String>);

impl MapEnvSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }
}

impl EnvSource for MapEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

/// Apply environment-variable overrides (highest priority) to the config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut DeployConfig, env: &E) -> Result<()> {
    // AWS
    if let Some(region) = get_env_string(env, "REGION") {
        config.aws.region = Some(region);
    }
    if let Some(profile) = get_env_string(env, "AWS_PROFILE") {
        config.aws.profile = Some(profile);
    }
    if let Some(endpoint) = get_env_string(env, "AWS_ENDPOINT_URL") {
        config.aws.endpoint_url = Some(endpoint);
    }

    // Resource names
    if let Some(name) = get_env_string(env, "BUCKET_NAME") {
        config.bucket.name = name;
    }
    if let Some(name) = get_env_string(env, "DATABASE_NAME") {
        config.database.name = name;
    }
    if let Some(name) = get_env_string(env, "ROLE_NAME") {
        config.role.name = name;
    }
    if let Some(name) = get_env_string(env, "JOB_NAME") {
        config.job.name = name;
    }

    // Job shape
    if let Some(uri) = get_env_string(env, "JOB_SCRIPT_URI") {
        config.job.script_uri = Some(uri);
    }
    if let Some(worker_type) = get_env_string(env, "JOB_WORKER_TYPE") {
        config.job.worker_type = worker_type;
    }
    if let Some(count) = get_env_u32(env, "JOB_WORKER_COUNT")? {
        config.job.worker_count = count;
    }
    if let Some(retries) = get_env_u32(env, "JOB_MAX_RETRIES")? {
        config.job.max_retries = retries;
    }

    // Catalog
    if let Some(warehouse) = get_env_string(env, "CATALOG_WAREHOUSE") {
        config.catalog.warehouse = Some(warehouse);
    }

    // Polling / apply
    if let Some(secs) = get_env_u64(env, "POLL_TIMEOUT_SECS")? {
        config.poll.timeout_secs = secs;
    }
    if let Some(concurrency) = get_env_usize(env, "APPLY_CONCURRENCY")? {
        config.apply.concurrency = concurrency;
    }

    // Logging
    if let Some(level) = get_env_string(env, "LOG_LEVEL") {
        config.log.level = level;
    }
    if let Some(format) = get_env_string(env, "LOG_FORMAT") {
        config.log.format = format
            .parse::<LogFormat>()
            .context("Invalid GLUEFORM_LOG_FORMAT value")?;
    }

    Ok(())
}

fn get_env_string<E: EnvSource>(env: &E, key: &str) -> Option<String> {
    env.get(key).filter(|v| !v.is_empty())
}

fn get_env_u32<E: EnvSource>(env: &E, key: &str) -> Result<Option<u32>> {
    match get_env_string(env, key) {
        Some(val) => {
            let parsed = val
                .parse::<u32>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_u64<E: EnvSource>(env: &E, key: &str) -> Result<Option<u64>> {
    match get_env_string(env, key) {
        Some(val) => {
            let parsed = val
                .parse::<u64>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_usize<E: EnvSource>(env: &E, key: &str) -> Result<Option<usize>> {
    match get_env_string(env, key) {
        Some(val) => {
            let parsed = val
                .parse::<usize>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}
