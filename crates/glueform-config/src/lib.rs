// glueform-config - Declarative deployment configuration
//
// Supports configuration from multiple sources:
// 1. Environment variables (highest priority)
// 2. Explicit config file path (CLI --config flag)
// 3. Config file path from GLUEFORM_CONFIG env var
// 4. Config file contents from GLUEFORM_CONFIG_CONTENT env var
// 5. Default config file locations (./glueform.toml, ./.glueform.toml)
// 6. Built-in defaults (lowest priority)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub mod env_overrides;
mod sources;
mod validation;

pub use env_overrides::{EnvSource, MapEnvSource, ENV_PREFIX};

/// Managed policy attached to the Glue service role by default.
pub const GLUE_SERVICE_ROLE_POLICY_ARN: &str =
    "arn:aws:iam::aws:policy/service-role/AWSGlueServiceRole";

/// Complete desired state for one deployment.
///
/// Every section is optional in the TOML source; required names are
/// enforced by [`DeployConfig::validate`] rather than by deserialization so
/// that environment overrides can fill them in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub aws: AwsConfig,
    pub bucket: BucketConfig,
    pub database: DatabaseConfig,
    pub role: RoleConfig,
    pub job: JobConfig,
    pub catalog: CatalogConfig,
    pub poll: PollConfig,
    pub apply: ApplyConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    /// Region override; `None` defers to the AWS default provider chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Named profile from the shared AWS config files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    /// Custom endpoint (LocalStack and similar).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
}

/// Object storage bucket holding scripts, temp data and the warehouse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    pub name: String,
    pub force_destroy: bool,
    pub depends_on: Vec<String>,
}

/// Glue catalog database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub depends_on: Vec<String>,
}

/// IAM role assumed by the Glue job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleConfig {
    pub name: String,
    /// Service principal allowed to assume the role.
    pub service_principal: String,
    /// Managed policy ARNs attached to the role.
    pub managed_policies: Vec<String>,
    pub inline_policy: InlinePolicyConfig,
    pub depends_on: Vec<String>,
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            service_principal: "glue.amazonaws.com".to_string(),
            managed_policies: vec![GLUE_SERVICE_ROLE_POLICY_ARN.to_string()],
            inline_policy: InlinePolicyConfig::default(),
            depends_on: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InlinePolicyConfig {
    pub name: String,
    pub actions: Vec<String>,
    pub resource: String,
}

impl Default for InlinePolicyConfig {
    fn default() -> Self {
        Self {
            name: "glue-custom-access".to_string(),
            actions: ["s3:*", "glue:*", "logs:*", "lakeformation:*"]
                .iter()
                .map(|a| a.to_string())
                .collect(),
            resource: "*".to_string(),
        }
    }
}

/// Managed Spark ETL job definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub name: String,
    /// Script location; defaults to `s3://<bucket>/scripts/iceberg_etl.py`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_uri: Option<String>,
    pub worker_type: String,
    pub worker_count: u32,
    pub max_retries: u32,
    pub glue_version: String,
    pub python_version: String,
    /// Remote job timeout; `None` keeps the service default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<u32>,
    pub continuous_logging: bool,
    pub spark_ui: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spark_event_logs_path: Option<String>,
    /// Extra default arguments, merged over the generated ones.
    pub arguments: BTreeMap<String, String>,
    pub depends_on: Vec<String>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            script_uri: None,
            worker_type: "G.1X".to_string(),
            worker_count: 2,
            max_retries: 0,
            glue_version: "5.0".to_string(),
            python_version: "3".to_string(),
            timeout_minutes: None,
            continuous_logging: true,
            spark_ui: true,
            temp_dir: None,
            spark_event_logs_path: None,
            arguments: BTreeMap::new(),
            depends_on: Vec::new(),
        }
    }
}

/// Iceberg catalog wiring handed to the Spark job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub name: String,
    /// Warehouse root; defaults to `s3://<bucket>/`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
    pub catalog_impl: String,
    pub io_impl: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            name: "glue_catalog".to_string(),
            warehouse: None,
            catalog_impl: "org.apache.iceberg.aws.glue.GlueCatalog".to_string(),
            io_impl: "org.apache.iceberg.aws.s3.S3FileIO".to_string(),
        }
    }
}

impl CatalogConfig {
    /// Spark properties registering this catalog, in a stable order.
    pub fn spark_properties(&self, warehouse: &str) -> Vec<(String, String)> {
        let prefix = format!("spark.sql.catalog.{}", self.name);
        vec![
            (
                "spark.sql.extensions".to_string(),
                "org.apache.iceberg.spark.extensions.IcebergSparkSessionExtensions".to_string(),
            ),
            (
                prefix.clone(),
                "org.apache.iceberg.spark.SparkCatalog".to_string(),
            ),
            (format!("{prefix}.warehouse"), warehouse.to_string()),
            (format!("{prefix}.catalog-impl"), self.catalog_impl.clone()),
            (format!("{prefix}.io-impl"), self.io_impl.clone()),
        ]
    }

    /// Render the properties as a single Glue `--conf` argument value.
    ///
    /// Glue accepts one `--conf` key, so additional properties are chained
    /// with ` --conf `.
    pub fn spark_conf(&self, warehouse: &str) -> String {
        self.spark_properties(warehouse)
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" --conf ")
    }
}

/// Job run polling behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    /// Default deadline for `--wait`.
    pub timeout_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_factor: 1.5,
            timeout_secs: 3600,
        }
    }
}

impl PollConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyConfig {
    /// Maximum number of independent actions applied at once.
    pub concurrency: usize,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Unsupported log format: {}. Supported: text, json", s),
        }
    }
}

impl DeployConfig {
    /// Load configuration from all sources with priority
    pub fn load() -> Result<Self> {
        sources::load_config()
    }

    /// Load configuration from a specific file path, then apply env overrides.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        sources::load_from_file_path(path)
    }

    /// Parse TOML content and apply overrides from the given env source.
    pub fn from_toml_with_env<E: EnvSource>(content: &str, env: &E) -> Result<Self> {
        sources::load_from_str(content, env)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    pub fn script_uri(&self) -> String {
        self.job
            .script_uri
            .clone()
            .unwrap_or_else(|| format!("s3://{}/scripts/iceberg_etl.py", self.bucket.name))
    }

    pub fn temp_dir(&self) -> String {
        self.job
            .temp_dir
            .clone()
            .unwrap_or_else(|| format!("s3://{}/tmp/", self.bucket.name))
    }

    pub fn spark_event_logs_path(&self) -> String {
        self.job
            .spark_event_logs_path
            .clone()
            .unwrap_or_else(|| format!("s3://{}/spark-logs/", self.bucket.name))
    }

    pub fn warehouse(&self) -> String {
        self.catalog
            .warehouse
            .clone()
            .unwrap_or_else(|| format!("s3://{}/", self.bucket.name))
    }

    /// Default arguments stored on the job definition.
    ///
    /// Generated values come first; `job.arguments` entries replace them
    /// key-by-key.
    pub fn job_arguments(&self) -> BTreeMap<String, String> {
        let mut args = BTreeMap::new();
        args.insert("--TempDir".to_string(), self.temp_dir());
        args.insert(
            "--enable-continuous-cloudwatch-log".to_string(),
            self.job.continuous_logging.to_string(),
        );
        args.insert("--enable-spark-ui".to_string(), self.job.spark_ui.to_string());
        if self.job.spark_ui {
            args.insert(
                "--spark-event-logs-path".to_string(),
                self.spark_event_logs_path(),
            );
        }
        args.insert("--datalake-formats".to_string(), "iceberg".to_string());
        args.insert(
            "--conf".to_string(),
            self.catalog.spark_conf(&self.warehouse()),
        );
        for (key, value) in &self.job.arguments {
            args.insert(key.clone(), value.clone());
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DeployConfig {
        let mut config = DeployConfig::default();
        config.bucket.name = "my-native-s3-table-bucket".to_string();
        config.database.name = "s3tables_db".to_string();
        config.role.name = "glue5-s3tables-role".to_string();
        config.job.name = "glue5-iceberg-s3tables-job".to_string();
        config
    }

    #[test]
    fn test_default_configs() {
        let job = JobConfig::default();
        assert_eq!(job.worker_type, "G.1X");
        assert_eq!(job.worker_count, 2);
        assert_eq!(job.max_retries, 0);
        assert_eq!(job.glue_version, "5.0");

        let role = RoleConfig::default();
        assert_eq!(role.service_principal, "glue.amazonaws.com");
        assert_eq!(role.managed_policies, vec![GLUE_SERVICE_ROLE_POLICY_ARN]);
        assert_eq!(role.inline_policy.actions.len(), 4);

        let log = LogConfig::default();
        assert_eq!(log.level, "info");
        assert_eq!(log.format, LogFormat::Text);
    }

    #[test]
    fn test_bucket_derived_locations() {
        let config = sample();
        assert_eq!(
            config.script_uri(),
            "s3://my-native-s3-table-bucket/scripts/iceberg_etl.py"
        );
        assert_eq!(config.temp_dir(), "s3://my-native-s3-table-bucket/tmp/");
        assert_eq!(
            config.spark_event_logs_path(),
            "s3://my-native-s3-table-bucket/spark-logs/"
        );
        assert_eq!(config.warehouse(), "s3://my-native-s3-table-bucket/");
    }

    #[test]
    fn test_job_arguments_include_catalog_conf() {
        let config = sample();
        let args = config.job_arguments();

        assert_eq!(args["--TempDir"], "s3://my-native-s3-table-bucket/tmp/");
        assert_eq!(args["--enable-spark-ui"], "true");
        assert_eq!(args["--datalake-formats"], "iceberg");

        let conf = &args["--conf"];
        assert!(conf.contains(
            "spark.sql.catalog.glue_catalog=org.apache.iceberg.spark.SparkCatalog"
        ));
        assert!(conf.contains(
            "spark.sql.catalog.glue_catalog.warehouse=s3://my-native-s3-table-bucket/"
        ));
        assert!(conf.contains(" --conf spark.sql.catalog.glue_catalog.io-impl="));
    }

    #[test]
    fn test_job_arguments_user_overrides_win() {
        let mut config = sample();
        config.job.spark_ui = false;
        config
            .job
            .arguments
            .insert("--TempDir".to_string(), "s3://elsewhere/tmp/".to_string());

        let args = config.job_arguments();
        assert_eq!(args["--TempDir"], "s3://elsewhere/tmp/");
        assert_eq!(args["--enable-spark-ui"], "false");
        assert!(!args.contains_key("--spark-event-logs-path"));
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("TEXT".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("yaml".parse::<LogFormat>().is_err());
    }
}
