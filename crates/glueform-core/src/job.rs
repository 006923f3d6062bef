//! Managed ETL job submission and polling
//!
//! [`JobSubmitter`] starts runs through a [`JobApi`] and observes them by
//! polling with exponential backoff and jitter. A poll deadline only stops
//! local waiting; the remote run is never cancelled, and a failed run is
//! never resubmitted.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use glueform_config::{DeployConfig, PollConfig};
use rand::Rng;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::descriptor::{ResourceDescriptor, ResourceKind, ResourceRef};
use crate::error::{GlueformError, Result};

/// Descriptor attribute prefix for job default arguments.
pub const ARGUMENT_PREFIX: &str = "argument.";

/// Glue command name for Spark ETL jobs.
pub const GLUE_ETL_COMMAND: &str = "glueetl";

/// Stand-in deadline for waits too long to represent as an instant.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Definition of the managed job and the arguments each run receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSpec {
    pub name: String,
    /// Role name or ARN assumed by the job.
    pub role: String,
    pub script_location: String,
    pub arguments: BTreeMap<String, String>,
    pub worker_type: String,
    pub worker_count: u32,
    pub max_retries: u32,
    pub glue_version: String,
    pub python_version: String,
    pub timeout_minutes: Option<u32>,
}

impl JobSpec {
    pub fn from_config(config: &DeployConfig) -> Self {
        Self {
            name: config.job.name.clone(),
            role: config.role.name.clone(),
            script_location: config.script_uri(),
            arguments: config.job_arguments(),
            worker_type: config.job.worker_type.clone(),
            worker_count: config.job.worker_count,
            max_retries: config.job.max_retries,
            glue_version: config.job.glue_version.clone(),
            python_version: config.job.python_version.clone(),
            timeout_minutes: config.job.timeout_minutes,
        }
    }

    pub fn reference(&self) -> ResourceRef {
        ResourceRef::new(ResourceKind::Job, self.name.clone())
    }

    /// Flatten the spec into a job descriptor (without dependency edges).
    pub fn descriptor(&self) -> ResourceDescriptor {
        let mut descriptor = ResourceDescriptor::new(ResourceKind::Job, &self.name)
            .with_attribute("role", &self.role)
            .with_attribute("command", GLUE_ETL_COMMAND)
            .with_attribute("script_location", &self.script_location)
            .with_attribute("python_version", &self.python_version)
            .with_attribute("glue_version", &self.glue_version)
            .with_attribute("worker_type", &self.worker_type)
            .with_attribute("number_of_workers", self.worker_count.to_string())
            .with_attribute("max_retries", self.max_retries.to_string());
        if let Some(timeout) = self.timeout_minutes {
            descriptor = descriptor.with_attribute("timeout_minutes", timeout.to_string());
        }
        for (key, value) in &self.arguments {
            descriptor = descriptor.with_attribute(format!("{ARGUMENT_PREFIX}{key}"), value);
        }
        descriptor
    }

    /// Rebuild a spec from a job descriptor produced by [`JobSpec::descriptor`].
    pub fn from_descriptor(descriptor: &ResourceDescriptor) -> Result<Self> {
        let reference = descriptor.reference().to_string();
        let number = |key: &str| -> Result<u32> {
            descriptor.require(key)?.parse::<u32>().map_err(|e| {
                GlueformError::apply(reference.clone(), format!("attribute '{key}': {e}"))
            })
        };

        let timeout_minutes = match descriptor.attribute("timeout_minutes") {
            Some(_) => Some(number("timeout_minutes")?),
            None => None,
        };

        let arguments = descriptor
            .attributes
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(ARGUMENT_PREFIX)
                    .map(|arg| (arg.to_string(), v.clone()))
            })
            .collect();

        Ok(Self {
            name: descriptor.name.clone(),
            role: descriptor.require("role")?.to_string(),
            script_location: descriptor.require("script_location")?.to_string(),
            arguments,
            worker_type: descriptor.require("worker_type")?.to_string(),
            worker_count: number("number_of_workers")?,
            max_retries: number("max_retries")?,
            glue_version: descriptor.require("glue_version")?.to_string(),
            python_version: descriptor.require("python_version")?.to_string(),
            timeout_minutes,
        })
    }
}

/// Identifier of one job run, as issued by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobRunId(String);

impl JobRunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobRunId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Observed state of a job run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobRunStatus {
    Running,
    Succeeded,
    /// Remote failure with its diagnostic message, verbatim
    Failed { message: String },
    /// Local deadline passed before the run finished
    Timeout,
}

impl JobRunStatus {
    /// Whether the remote run has finished.
    pub fn is_finished(&self) -> bool {
        matches!(self, JobRunStatus::Succeeded | JobRunStatus::Failed { .. })
    }
}

impl fmt::Display for JobRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobRunStatus::Running => f.write_str("RUNNING"),
            JobRunStatus::Succeeded => f.write_str("SUCCEEDED"),
            JobRunStatus::Failed { message } => write!(f, "FAILED: {message}"),
            JobRunStatus::Timeout => f.write_str("TIMEOUT"),
        }
    }
}

/// Remote job run API.
///
/// Implementations map the provider's run states onto
/// [`JobRunStatus::Running`], [`JobRunStatus::Succeeded`] and
/// [`JobRunStatus::Failed`]; they never report `Timeout`.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Start a run of the job. Errors are [`GlueformError::JobSubmission`].
    async fn start_run(&self, spec: &JobSpec) -> Result<JobRunId>;

    /// One observation of a run. Errors are [`GlueformError::RemoteState`].
    async fn run_status(&self, job_name: &str, run_id: &JobRunId) -> Result<JobRunStatus>;
}

/// Exponential backoff schedule for polling.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub factor: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from(&PollConfig::default())
    }
}

impl From<&PollConfig> for Backoff {
    fn from(config: &PollConfig) -> Self {
        Self {
            initial: config.initial_delay(),
            max: config.max_delay(),
            factor: config.backoff_factor,
        }
    }
}

impl Backoff {
    /// Grow `current` by the factor, saturating at `max`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.factor)
            .map_or(self.max, |next| next.min(self.max))
    }

    /// Up to 10% random jitter on top of `delay`.
    fn with_jitter(&self, delay: Duration) -> Duration {
        let max_jitter_ms = (delay.as_millis() / 10) as u64;
        if max_jitter_ms == 0 {
            return delay;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..=max_jitter_ms);
        delay + Duration::from_millis(jitter_ms)
    }
}

/// Submits job runs and waits on them.
pub struct JobSubmitter<'a, J: JobApi + ?Sized> {
    api: &'a J,
    backoff: Backoff,
}

impl<'a, J: JobApi + ?Sized> JobSubmitter<'a, J> {
    pub fn new(api: &'a J) -> Self {
        Self {
            api,
            backoff: Backoff::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Start a run; returns as soon as the service accepts it.
    #[instrument(skip(self, spec), fields(job = %spec.name))]
    pub async fn submit(&self, spec: &JobSpec) -> Result<JobRunId> {
        let run_id = self.api.start_run(spec).await.map_err(|e| match e {
            GlueformError::JobSubmission { .. } => e,
            other => GlueformError::job_submission(&spec.name, other.reason()),
        })?;
        info!(run_id = %run_id, max_retries = spec.max_retries, "Job run started");
        Ok(run_id)
    }

    /// Single status observation without waiting.
    pub async fn status(&self, job_name: &str, run_id: &JobRunId) -> Result<JobRunStatus> {
        self.api.run_status(job_name, run_id).await
    }

    /// Poll until the run finishes or `deadline` elapses.
    ///
    /// Returns [`JobRunStatus::Timeout`] on expiry; a status call still in
    /// flight at the deadline is abandoned rather than awaited.
    #[instrument(skip(self), fields(deadline_secs = deadline.as_secs()))]
    pub async fn poll(
        &self,
        job_name: &str,
        run_id: &JobRunId,
        deadline: Duration,
    ) -> Result<JobRunStatus> {
        let started = Instant::now();
        let deadline_at = started
            .checked_add(deadline)
            .unwrap_or_else(|| started + FAR_FUTURE);
        let mut delay = self.backoff.initial;

        loop {
            let status =
                match tokio::time::timeout_at(deadline_at, self.api.run_status(job_name, run_id))
                    .await
                {
                    Ok(status) => status?,
                    Err(_) => {
                        warn!(run_id = %run_id, "Status call outlived the poll deadline");
                        return Ok(JobRunStatus::Timeout);
                    }
                };

            debug!(
                run_id = %run_id,
                status = %status,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Polling job run status"
            );

            if status.is_finished() {
                return Ok(status);
            }

            let now = Instant::now();
            if now >= deadline_at {
                warn!(
                    run_id = %run_id,
                    waited_secs = deadline.as_secs(),
                    "Poll deadline reached; remote run left running"
                );
                return Ok(JobRunStatus::Timeout);
            }

            let sleep_for = self.backoff.with_jitter(delay).min(deadline_at - now);
            tokio::time::sleep(sleep_for).await;
            delay = self.backoff.next_delay(delay);
        }
    }

    /// Submit a run and wait for it, mapping failure and timeout to errors.
    pub async fn run(&self, spec: &JobSpec, deadline: Duration) -> Result<JobRunId> {
        let run_id = self.submit(spec).await?;
        match self.poll(&spec.name, &run_id, deadline).await? {
            JobRunStatus::Succeeded => {
                info!(job = %spec.name, run_id = %run_id, "Job run succeeded");
                Ok(run_id)
            }
            JobRunStatus::Failed { message } => {
                error!(job = %spec.name, run_id = %run_id, message = %message, "Job run failed");
                Err(GlueformError::job_failed(&spec.name, run_id.as_str(), message))
            }
            JobRunStatus::Timeout | JobRunStatus::Running => Err(GlueformError::timeout(
                &spec.name,
                run_id.as_str(),
                deadline.as_secs(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> DeployConfig {
        let mut config = DeployConfig::default();
        config.bucket.name = "etl-bucket".to_string();
        config.database.name = "etl_db".to_string();
        config.role.name = "etl-role".to_string();
        config.job.name = "etl-job".to_string();
        config.job.timeout_minutes = Some(30);
        config
    }

    #[test]
    fn test_descriptor_roundtrips_spec() {
        let spec = JobSpec::from_config(&sample_config());
        let descriptor = spec.descriptor();

        assert_eq!(descriptor.attribute("command"), Some("glueetl"));
        assert_eq!(
            descriptor.attribute("argument.--TempDir"),
            Some("s3://etl-bucket/tmp/")
        );
        assert_eq!(JobSpec::from_descriptor(&descriptor).unwrap(), spec);
    }

    #[test]
    fn test_from_descriptor_reports_missing_attribute() {
        let descriptor = ResourceDescriptor::new(ResourceKind::Job, "broken");
        let err = JobSpec::from_descriptor(&descriptor).unwrap_err();
        assert!(err.to_string().contains("missing attribute 'role'"));
    }

    #[test]
    fn test_backoff_growth_is_capped() {
        let backoff = Backoff {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(2),
            factor: 2.0,
        };
        let d1 = backoff.next_delay(backoff.initial);
        let d2 = backoff.next_delay(d1);
        let d3 = backoff.next_delay(d2);
        assert_eq!(d1, Duration::from_secs(1));
        assert_eq!(d2, Duration::from_secs(2));
        assert_eq!(d3, Duration::from_secs(2));
    }

    #[test]
    fn test_backoff_saturates_on_huge_factor() {
        let backoff = Backoff {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            factor: 1e20,
        };
        assert_eq!(backoff.next_delay(backoff.initial), Duration::from_secs(30));
        assert_eq!(
            backoff.next_delay(Duration::from_secs(30)),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_jitter_is_bounded() {
        let backoff = Backoff::default();
        for _ in 0..1000 {
            let delay = backoff.with_jitter(Duration::from_millis(1000));
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay <= Duration::from_millis(1100));
        }
    }

    #[test]
    fn test_status_display() {
        assert_eq!(JobRunStatus::Running.to_string(), "RUNNING");
        assert_eq!(
            JobRunStatus::Failed {
                message: "OOM".into()
            }
            .to_string(),
            "FAILED: OOM"
        );
        assert!(!JobRunStatus::Timeout.is_finished());
    }
}
