use async_trait::async_trait;
use aws_sdk_glue::error::DisplayErrorContext;
use aws_sdk_glue::types::WorkerType;
use glueform_core::{GlueformError, JobApi, JobRunId, JobRunStatus, JobSpec, Result};
use tracing::{debug, instrument};

use crate::mapping;
use crate::AwsClients;

/// [`JobApi`] over Glue `StartJobRun` / `GetJobRun`.
///
/// Each run carries the spec's arguments, worker shape and timeout, which
/// take precedence over the values stored on the job definition.
pub struct AwsJobApi {
    glue: aws_sdk_glue::Client,
}

impl AwsJobApi {
    pub fn new(clients: &AwsClients) -> Self {
        Self {
            glue: clients.glue.clone(),
        }
    }
}

#[async_trait]
impl JobApi for AwsJobApi {
    #[instrument(skip_all, fields(job = %spec.name))]
    async fn start_run(&self, spec: &JobSpec) -> Result<JobRunId> {
        let rejected = |reason: String| GlueformError::job_submission(&spec.name, reason);
        let workers = mapping::sdk_count(spec.worker_count, "worker_count").map_err(rejected)?;
        let timeout = spec
            .timeout_minutes
            .map(|t| mapping::sdk_count(t, "timeout_minutes"))
            .transpose()
            .map_err(rejected)?;

        let output = self
            .glue
            .start_job_run()
            .job_name(&spec.name)
            .set_arguments(Some(mapping::sdk_arguments(spec)))
            .worker_type(WorkerType::from(spec.worker_type.as_str()))
            .number_of_workers(workers)
            .set_timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                GlueformError::job_submission(&spec.name, DisplayErrorContext(&e).to_string())
            })?;

        output
            .job_run_id()
            .map(JobRunId::new)
            .ok_or_else(|| GlueformError::job_submission(&spec.name, "no run id returned"))
    }

    #[instrument(skip(self, run_id), fields(run_id = %run_id))]
    async fn run_status(&self, job_name: &str, run_id: &JobRunId) -> Result<JobRunStatus> {
        let output = self
            .glue
            .get_job_run()
            .job_name(job_name)
            .run_id(run_id.as_str())
            .send()
            .await
            .map_err(|e| {
                GlueformError::remote_state(
                    format!("job:{job_name}"),
                    DisplayErrorContext(&e).to_string(),
                )
            })?;

        let run = output.job_run().ok_or_else(|| {
            GlueformError::remote_state(
                format!("job:{job_name}"),
                format!("run '{run_id}' missing from GetJobRun response"),
            )
        })?;

        let status = mapping::run_status(run.job_run_state(), run.error_message());
        debug!(
            state = run.job_run_state().map(|s| s.as_str()).unwrap_or("<none>"),
            status = %status,
            "Fetched job run"
        );
        Ok(status)
    }
}
