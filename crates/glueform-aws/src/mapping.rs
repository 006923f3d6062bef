//! Conversions between SDK shapes and descriptor attributes

use std::collections::HashMap;

use aws_sdk_glue::types::{Job, JobRunState};
use glueform_core::job::{ARGUMENT_PREFIX, GLUE_ETL_COMMAND};
use glueform_core::{policy, Attributes, JobRunStatus, JobSpec};

/// Region S3 reports as an empty location constraint.
pub(crate) const DEFAULT_S3_REGION: &str = "us-east-1";

/// Normalise a `GetBucketLocation` constraint to a region name.
pub(crate) fn bucket_region(location_constraint: Option<&str>) -> String {
    match location_constraint {
        None | Some("") => DEFAULT_S3_REGION.to_string(),
        // Legacy alias from before eu-west-1 had its own constraint
        Some("EU") => "eu-west-1".to_string(),
        Some(region) => region.to_string(),
    }
}

/// IAM returns policy documents URL-encoded.
pub(crate) fn decode_policy(raw: &str) -> String {
    let decoded = urlencoding::decode(raw)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    policy::canonicalize(&decoded)
}

/// Glue may echo the role as a full ARN; descriptors use the bare name.
pub(crate) fn role_name(role: &str) -> &str {
    role.rsplit('/').next().unwrap_or(role)
}

/// Observed attributes of a Glue job, keyed like `JobSpec::descriptor`.
pub(crate) fn job_attributes(job: &Job) -> Attributes {
    let mut attrs = Attributes::new();
    if let Some(role) = job.role() {
        attrs.insert("role".into(), role_name(role).to_string());
    }
    if let Some(command) = job.command() {
        attrs.insert(
            "command".into(),
            command.name().unwrap_or(GLUE_ETL_COMMAND).to_string(),
        );
        if let Some(location) = command.script_location() {
            attrs.insert("script_location".into(), location.to_string());
        }
        if let Some(python) = command.python_version() {
            attrs.insert("python_version".into(), python.to_string());
        }
    }
    if let Some(version) = job.glue_version() {
        attrs.insert("glue_version".into(), version.to_string());
    }
    if let Some(worker_type) = job.worker_type() {
        attrs.insert("worker_type".into(), worker_type.as_str().to_string());
    }
    if let Some(workers) = job.number_of_workers() {
        attrs.insert("number_of_workers".into(), workers.to_string());
    }
    attrs.insert("max_retries".into(), job.max_retries().to_string());
    if let Some(timeout) = job.timeout() {
        attrs.insert("timeout_minutes".into(), timeout.to_string());
    }
    if let Some(args) = job.default_arguments() {
        for (key, value) in args {
            attrs.insert(format!("{ARGUMENT_PREFIX}{key}"), value.clone());
        }
    }
    attrs
}

/// Job arguments in the SDK's map type.
pub(crate) fn sdk_arguments(spec: &JobSpec) -> HashMap<String, String> {
    spec.arguments
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Glue takes counts as `i32`.
pub(crate) fn sdk_count(value: u32, field: &str) -> Result<i32, String> {
    i32::try_from(value).map_err(|_| format!("{field} {value} out of range"))
}

/// Collapse Glue run states onto the submitter's status set.
pub(crate) fn run_status(state: Option<&JobRunState>, error_message: Option<&str>) -> JobRunStatus {
    let failed = |fallback: &str| JobRunStatus::Failed {
        message: error_message
            .filter(|m| !m.is_empty())
            .unwrap_or(fallback)
            .to_string(),
    };

    match state {
        Some(JobRunState::Succeeded) => JobRunStatus::Succeeded,
        Some(
            JobRunState::Starting
            | JobRunState::Waiting
            | JobRunState::Running
            | JobRunState::Stopping,
        ) => JobRunStatus::Running,
        Some(JobRunState::Failed) => failed("job run failed"),
        Some(JobRunState::Error) => failed("job run errored"),
        Some(JobRunState::Timeout) => failed("job run exceeded its Glue timeout"),
        Some(JobRunState::Stopped) => failed("job run was stopped"),
        Some(JobRunState::Expired) => failed("job run expired"),
        Some(other) => failed(&format!("unrecognised job run state {}", other.as_str())),
        None => JobRunStatus::Running,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_region_defaults() {
        assert_eq!(bucket_region(None), "us-east-1");
        assert_eq!(bucket_region(Some("")), "us-east-1");
        assert_eq!(bucket_region(Some("EU")), "eu-west-1");
        assert_eq!(bucket_region(Some("ap-south-1")), "ap-south-1");
    }

    #[test]
    fn test_decode_policy_canonicalizes() {
        let encoded = "%7B%22Version%22%3A%222012-10-17%22%2C%22Statement%22%3A%5B%7B%22Effect%22%3A%22Allow%22%2C%22Principal%22%3A%7B%22Service%22%3A%5B%22glue.amazonaws.com%22%5D%7D%2C%22Action%22%3A%22sts%3AAssumeRole%22%7D%5D%7D";
        let expected = glueform_core::PolicyDocument::assume_role("glue.amazonaws.com");
        assert_eq!(decode_policy(encoded), expected.to_canonical_json());
    }

    #[test]
    fn test_role_name_strips_arn() {
        assert_eq!(
            role_name("arn:aws:iam::123456789012:role/service-role/etl-role"),
            "etl-role"
        );
        assert_eq!(role_name("etl-role"), "etl-role");
    }

    #[test]
    fn test_sdk_arguments_carry_every_job_argument() {
        let mut config = glueform_config::DeployConfig::default();
        config.bucket.name = "etl-bucket".to_string();
        config.role.name = "etl-role".to_string();
        config.job.name = "etl".to_string();
        config
            .job
            .arguments
            .insert("--source-date".to_string(), "2024-06-01".to_string());
        let spec = JobSpec::from_config(&config);

        let arguments = sdk_arguments(&spec);
        assert_eq!(arguments.len(), spec.arguments.len());
        assert_eq!(arguments["--source-date"], "2024-06-01");
        assert_eq!(arguments["--TempDir"], "s3://etl-bucket/tmp/");
        assert_eq!(arguments["--datalake-formats"], "iceberg");
    }

    #[test]
    fn test_sdk_count_range() {
        assert_eq!(sdk_count(10, "worker_count"), Ok(10));
        assert_eq!(
            sdk_count(u32::MAX, "worker_count"),
            Err("worker_count 4294967295 out of range".to_string())
        );
    }

    #[test]
    fn test_run_status_mapping() {
        assert_eq!(
            run_status(Some(&JobRunState::Waiting), None),
            JobRunStatus::Running
        );
        assert_eq!(
            run_status(Some(&JobRunState::Succeeded), None),
            JobRunStatus::Succeeded
        );
        assert_eq!(
            run_status(Some(&JobRunState::Failed), Some("OOM")),
            JobRunStatus::Failed {
                message: "OOM".into()
            }
        );
        assert_eq!(
            run_status(Some(&JobRunState::Timeout), Some("")),
            JobRunStatus::Failed {
                message: "job run exceeded its Glue timeout".into()
            }
        );
    }
}
