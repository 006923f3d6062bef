// Configuration source loading.
//
// Priority order:
// 1. Environment variables (GLUEFORM_* prefix)
// 2. Config file path from GLUEFORM_CONFIG
// 3. Inline config content from GLUEFORM_CONFIG_CONTENT
// 4. Default config files (./glueform.toml, ./.glueform.toml)
// 5. Built-in defaults

use crate::env_overrides::{self, EnvSource, ENV_PREFIX};
use crate::DeployConfig;
use anyhow::{Context, Result};
use std::env;
use std::path::Path;
use tracing::debug;

const DEFAULT_PATHS: &[&str] = &["./glueform.toml", "./.glueform.toml"];

/// Load configuration using native environment/file access.
pub fn load_config() -> Result<DeployConfig> {
    let mut config = load_from_file()?.unwrap_or_default();

    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    config.validate()?;
    Ok(config)
}

fn load_from_file() -> Result<Option<DeployConfig>> {
    if let Ok(path) = env::var("GLUEFORM_CONFIG") {
        return read_file(Path::new(&path)).map(Some);
    }

    if let Ok(content) = env::var("GLUEFORM_CONFIG_CONTENT") {
        let config: DeployConfig = toml::from_str(&content)
            .context("Failed to parse inline config from GLUEFORM_CONFIG_CONTENT")?;
        return Ok(Some(config));
    }

    for path in DEFAULT_PATHS {
        let path = Path::new(path);
        if path.exists() {
            return read_file(path).map(Some);
        }
    }

    Ok(None)
}

fn read_file(path: &Path) -> Result<DeployConfig> {
    debug!(path = %path.display(), "Reading config file");
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Load configuration from a specific file path (for CLI --config flag).
/// Returns error if file doesn't exist or can't be parsed.
pub fn load_from_file_path(path: impl AsRef<Path>) -> Result<DeployConfig> {
    let mut config = read_file(path.as_ref())?;

    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    config.validate()?;
    Ok(config)
}

/// Parse TOML content and apply overrides from an arbitrary env source.
pub fn load_from_str<E: EnvSource>(content: &str, env: &E) -> Result<DeployConfig> {
    let mut config: DeployConfig = toml::from_str(content).context("Failed to parse config")?;

    env_overrides::apply_env_overrides(&mut config, env)?;
    config.validate()?;
    Ok(config)
}

struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MapEnvSource;
    use std::io::Write;

    const MINIMAL: &str = r#"
        [bucket]
        name = "my-native-s3-table-bucket"

        [database]
        name = "s3tables_db"

        [role]
        name = "glue5-s3tables-role"

        [job]
        name = "glue5-iceberg-s3tables-job"
    "#;

    #[test]
    fn minimal_file_gets_defaults() {
        let config = load_from_str(MINIMAL, &MapEnvSource::new()).unwrap();

        assert_eq!(config.bucket.name, "my-native-s3-table-bucket");
        assert_eq!(config.job.worker_type, "G.1X");
        assert_eq!(config.job.max_retries, 0);
        assert_eq!(config.catalog.name, "glue_catalog");
        assert_eq!(config.apply.concurrency, 1);
    }

    #[test]
    fn env_overrides_beat_file_values() {
        let env = MapEnvSource::new().with("JOB_WORKER_COUNT", "5");
        let config = load_from_str(MINIMAL, &env).unwrap();
        assert_eq!(config.job.worker_count, 5);
    }

    #[test]
    fn env_can_supply_required_names() {
        let env = MapEnvSource::new()
            .with("BUCKET_NAME", "env-bucket")
            .with("DATABASE_NAME", "env_db")
            .with("ROLE_NAME", "env-role")
            .with("JOB_NAME", "env-job");
        let config = load_from_str("", &env).unwrap();
        assert_eq!(config.database.name, "env_db");
    }

    #[test]
    fn missing_required_names_fail_validation() {
        let err = load_from_str("", &MapEnvSource::new()).unwrap_err();
        assert!(err.to_string().contains("bucket.name"));
    }

    #[test]
    fn malformed_toml_is_reported() {
        let err = load_from_str("[bucket\nname=", &MapEnvSource::new()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn load_from_file_path_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = load_from_file_path(file.path()).unwrap();
        assert_eq!(config.role.name, "glue5-s3tables-role");
    }

    #[test]
    fn load_from_missing_path_fails() {
        let err = load_from_file_path("/nonexistent/glueform.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
