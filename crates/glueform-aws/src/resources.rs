use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_glue::types::{DatabaseInput, JobCommand, JobUpdate, WorkerType};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use glueform_core::job::{JobSpec, GLUE_ETL_COMMAND};
use glueform_core::{
    AttributeChange, Attributes, GlueformError, ResourceApi, ResourceDescriptor, ResourceKind,
    Result,
};
use tracing::{debug, instrument};

use crate::mapping::{self, DEFAULT_S3_REGION};
use crate::AwsClients;

/// [`ResourceApi`] over S3, Glue and IAM.
pub struct AwsResourceApi {
    clients: AwsClients,
}

fn sdk_reason<E: std::error::Error>(err: &E) -> String {
    DisplayErrorContext(err).to_string()
}

impl AwsResourceApi {
    pub fn new(clients: AwsClients) -> Self {
        Self { clients }
    }

    async fn observe_bucket(&self, d: &ResourceDescriptor) -> Result<Option<Attributes>> {
        let not_found = match self.clients.s3.head_bucket().bucket(&d.name).send().await {
            Ok(_) => false,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => true,
            Err(e) => return Err(remote(d, &e)),
        };
        if not_found {
            return Ok(None);
        }

        let location = self
            .clients
            .s3
            .get_bucket_location()
            .bucket(&d.name)
            .send()
            .await
            .map_err(|e| remote(d, &e))?;
        let mut attrs = Attributes::new();
        attrs.insert(
            "region".into(),
            mapping::bucket_region(location.location_constraint().map(|c| c.as_str())),
        );
        Ok(Some(attrs))
    }

    async fn create_bucket(&self, d: &ResourceDescriptor) -> Result<()> {
        let region = d
            .attribute("region")
            .or(self.clients.region())
            .unwrap_or(DEFAULT_S3_REGION);

        let mut request = self.clients.s3.create_bucket().bucket(&d.name);
        // us-east-1 rejects an explicit location constraint
        if region != DEFAULT_S3_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }
        request.send().await.map_err(|e| apply(d, &e))?;
        Ok(())
    }

    async fn observe_database(&self, d: &ResourceDescriptor) -> Result<Option<Attributes>> {
        match self.clients.glue.get_database().name(&d.name).send().await {
            Ok(output) => {
                let mut attrs = Attributes::new();
                if let Some(description) = output.database().and_then(|db| db.description()) {
                    attrs.insert("description".into(), description.to_string());
                }
                Ok(Some(attrs))
            }
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_entity_not_found_exception()) =>
            {
                Ok(None)
            }
            Err(e) => Err(remote(d, &e)),
        }
    }

    fn database_input(d: &ResourceDescriptor) -> Result<DatabaseInput> {
        DatabaseInput::builder()
            .name(&d.name)
            .set_description(d.attribute("description").map(str::to_string))
            .build()
            .map_err(|e| apply(d, &e))
    }

    async fn observe_role(&self, d: &ResourceDescriptor) -> Result<Option<Attributes>> {
        match self.clients.iam.get_role().role_name(&d.name).send().await {
            Ok(output) => {
                let mut attrs = Attributes::new();
                if let Some(doc) = output.role().and_then(|r| r.assume_role_policy_document()) {
                    attrs.insert("assume_role_policy".into(), mapping::decode_policy(doc));
                }
                Ok(Some(attrs))
            }
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_no_such_entity_exception()) =>
            {
                Ok(None)
            }
            Err(e) => Err(remote(d, &e)),
        }
    }

    async fn observe_policy(&self, d: &ResourceDescriptor) -> Result<Option<Attributes>> {
        let role = d.require("role")?;
        match d.attribute("policy_arn") {
            Some(arn) => {
                let attached = self.attached_policy_arns(d, role).await?;
                Ok(attached
                    .iter()
                    .any(|a| a == arn)
                    .then(|| d.attributes.clone()))
            }
            None => {
                let result = self
                    .clients
                    .iam
                    .get_role_policy()
                    .role_name(role)
                    .policy_name(&d.name)
                    .send()
                    .await;
                match result {
                    Ok(output) => {
                        let mut attrs = Attributes::new();
                        attrs.insert("role".into(), role.to_string());
                        attrs.insert(
                            "document".into(),
                            mapping::decode_policy(output.policy_document()),
                        );
                        Ok(Some(attrs))
                    }
                    Err(e)
                        if e.as_service_error()
                            .is_some_and(|se| se.is_no_such_entity_exception()) =>
                    {
                        Ok(None)
                    }
                    Err(e) => Err(remote(d, &e)),
                }
            }
        }
    }

    /// Managed policy ARNs attached to `role`; empty if the role is absent.
    async fn attached_policy_arns(
        &self,
        d: &ResourceDescriptor,
        role: &str,
    ) -> Result<Vec<String>> {
        let mut arns = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let result = self
                .clients
                .iam
                .list_attached_role_policies()
                .role_name(role)
                .set_marker(marker.take())
                .send()
                .await;
            let output = match result {
                Ok(output) => output,
                Err(e)
                    if e.as_service_error()
                        .is_some_and(|se| se.is_no_such_entity_exception()) =>
                {
                    return Ok(Vec::new());
                }
                Err(e) => return Err(remote(d, &e)),
            };
            arns.extend(
                output
                    .attached_policies()
                    .iter()
                    .filter_map(|p| p.policy_arn().map(str::to_string)),
            );
            match output.marker() {
                Some(next) if output.is_truncated() => marker = Some(next.to_string()),
                _ => return Ok(arns),
            }
        }
    }

    async fn put_policy(&self, d: &ResourceDescriptor) -> Result<()> {
        let role = d.require("role")?;
        match d.attribute("policy_arn") {
            Some(arn) => {
                self.clients
                    .iam
                    .attach_role_policy()
                    .role_name(role)
                    .policy_arn(arn)
                    .send()
                    .await
                    .map_err(|e| apply(d, &e))?;
            }
            None => {
                self.clients
                    .iam
                    .put_role_policy()
                    .role_name(role)
                    .policy_name(&d.name)
                    .policy_document(d.require("document")?)
                    .send()
                    .await
                    .map_err(|e| apply(d, &e))?;
            }
        }
        Ok(())
    }

    async fn observe_job(&self, d: &ResourceDescriptor) -> Result<Option<Attributes>> {
        match self.clients.glue.get_job().job_name(&d.name).send().await {
            Ok(output) => Ok(output.job().map(mapping::job_attributes)),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_entity_not_found_exception()) =>
            {
                Ok(None)
            }
            Err(e) => Err(remote(d, &e)),
        }
    }

    async fn create_job(&self, d: &ResourceDescriptor) -> Result<()> {
        let spec = JobSpec::from_descriptor(d)?;
        let settings = JobSettings::new(d, &spec)?;
        self.clients
            .glue
            .create_job()
            .name(&spec.name)
            .role(&spec.role)
            .command(settings.command)
            .set_default_arguments(Some(settings.arguments))
            .max_retries(settings.max_retries)
            .set_timeout(settings.timeout)
            .worker_type(settings.worker_type)
            .number_of_workers(settings.workers)
            .glue_version(&spec.glue_version)
            .send()
            .await
            .map_err(|e| apply(d, &e))?;
        Ok(())
    }

    async fn update_job(&self, d: &ResourceDescriptor) -> Result<()> {
        let spec = JobSpec::from_descriptor(d)?;
        let settings = JobSettings::new(d, &spec)?;
        // JobUpdate replaces the whole definition, so send every field.
        let update = JobUpdate::builder()
            .role(&spec.role)
            .command(settings.command)
            .set_default_arguments(Some(settings.arguments))
            .max_retries(settings.max_retries)
            .set_timeout(settings.timeout)
            .worker_type(settings.worker_type)
            .number_of_workers(settings.workers)
            .glue_version(&spec.glue_version)
            .build();
        self.clients
            .glue
            .update_job()
            .job_name(&spec.name)
            .job_update(update)
            .send()
            .await
            .map_err(|e| apply(d, &e))?;
        Ok(())
    }
}

/// Job fields converted to the SDK's types.
struct JobSettings {
    command: JobCommand,
    arguments: HashMap<String, String>,
    max_retries: i32,
    timeout: Option<i32>,
    worker_type: WorkerType,
    workers: i32,
}

impl JobSettings {
    fn new(d: &ResourceDescriptor, spec: &JobSpec) -> Result<Self> {
        let to_i32 = |value: u32, field: &str| {
            mapping::sdk_count(value, field)
                .map_err(|reason| GlueformError::apply(d.reference().to_string(), reason))
        };

        Ok(Self {
            command: JobCommand::builder()
                .name(GLUE_ETL_COMMAND)
                .script_location(&spec.script_location)
                .python_version(&spec.python_version)
                .build(),
            arguments: mapping::sdk_arguments(spec),
            max_retries: to_i32(spec.max_retries, "max_retries")?,
            timeout: spec
                .timeout_minutes
                .map(|t| to_i32(t, "timeout_minutes"))
                .transpose()?,
            worker_type: WorkerType::from(spec.worker_type.as_str()),
            workers: to_i32(spec.worker_count, "number_of_workers")?,
        })
    }
}

fn remote<E: std::error::Error>(d: &ResourceDescriptor, err: &E) -> GlueformError {
    GlueformError::remote_state(d.reference().to_string(), sdk_reason(err))
}

fn apply<E: std::error::Error>(d: &ResourceDescriptor, err: &E) -> GlueformError {
    GlueformError::apply(d.reference().to_string(), sdk_reason(err))
}

#[async_trait]
impl ResourceApi for AwsResourceApi {
    #[instrument(skip_all, fields(resource = %descriptor.reference()))]
    async fn observe(&self, descriptor: &ResourceDescriptor) -> Result<Option<Attributes>> {
        let observed = match descriptor.kind {
            ResourceKind::Bucket => self.observe_bucket(descriptor).await,
            ResourceKind::Database => self.observe_database(descriptor).await,
            ResourceKind::Role => self.observe_role(descriptor).await,
            ResourceKind::Policy => self.observe_policy(descriptor).await,
            ResourceKind::Job => self.observe_job(descriptor).await,
        }?;
        debug!(exists = observed.is_some(), "Observed");
        Ok(observed)
    }

    #[instrument(skip_all, fields(resource = %descriptor.reference()))]
    async fn create(&self, descriptor: &ResourceDescriptor) -> Result<()> {
        match descriptor.kind {
            ResourceKind::Bucket => self.create_bucket(descriptor).await,
            ResourceKind::Database => {
                let input = Self::database_input(descriptor)?;
                self.clients
                    .glue
                    .create_database()
                    .database_input(input)
                    .send()
                    .await
                    .map_err(|e| apply(descriptor, &e))?;
                Ok(())
            }
            ResourceKind::Role => {
                self.clients
                    .iam
                    .create_role()
                    .role_name(&descriptor.name)
                    .assume_role_policy_document(descriptor.require("assume_role_policy")?)
                    .send()
                    .await
                    .map_err(|e| apply(descriptor, &e))?;
                Ok(())
            }
            ResourceKind::Policy => self.put_policy(descriptor).await,
            ResourceKind::Job => self.create_job(descriptor).await,
        }
    }

    #[instrument(skip_all, fields(resource = %descriptor.reference(), changes = changes.len()))]
    async fn update(
        &self,
        descriptor: &ResourceDescriptor,
        changes: &[AttributeChange],
    ) -> Result<()> {
        match descriptor.kind {
            ResourceKind::Bucket => Err(GlueformError::apply(
                descriptor.reference().to_string(),
                format!(
                    "bucket settings cannot be changed in place ({})",
                    changes
                        .iter()
                        .map(|c| c.key.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            )),
            ResourceKind::Database => {
                let input = Self::database_input(descriptor)?;
                self.clients
                    .glue
                    .update_database()
                    .name(&descriptor.name)
                    .database_input(input)
                    .send()
                    .await
                    .map_err(|e| apply(descriptor, &e))?;
                Ok(())
            }
            ResourceKind::Role => {
                self.clients
                    .iam
                    .update_assume_role_policy()
                    .role_name(&descriptor.name)
                    .policy_document(descriptor.require("assume_role_policy")?)
                    .send()
                    .await
                    .map_err(|e| apply(descriptor, &e))?;
                Ok(())
            }
            ResourceKind::Policy => self.put_policy(descriptor).await,
            ResourceKind::Job => self.update_job(descriptor).await,
        }
    }
}
