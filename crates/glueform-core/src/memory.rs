//! In-memory cloud for tests and dry runs
//!
//! Implements both [`ResourceApi`] and [`JobApi`] over a mutex-guarded map.
//! Failures and run status sequences can be scripted per resource or job.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use crate::descriptor::{Attributes, ResourceDescriptor, ResourceRef};
use crate::error::{GlueformError, Result};
use crate::job::{JobApi, JobRunId, JobRunStatus, JobSpec};
use crate::reconcile::{AttributeChange, ResourceApi};

#[derive(Debug, Default)]
pub struct InMemoryCloud {
    state: Mutex<CloudState>,
}

#[derive(Debug, Default)]
struct CloudState {
    resources: BTreeMap<ResourceRef, Attributes>,
    observe_failures: BTreeMap<ResourceRef, String>,
    apply_failures: BTreeMap<ResourceRef, String>,
    submission_failures: BTreeMap<String, String>,
    run_scripts: BTreeMap<String, Vec<JobRunStatus>>,
    runs: BTreeMap<JobRunId, RunState>,
    started: Vec<(String, JobRunId)>,
    calls: Vec<String>,
}

#[derive(Debug)]
struct RunState {
    job: String,
    /// Statuses still to report; the last one repeats forever
    pending: VecDeque<JobRunStatus>,
}

impl InMemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pretend `descriptor` already exists exactly as described.
    pub fn seed(&self, descriptor: &ResourceDescriptor) {
        self.lock()
            .resources
            .insert(descriptor.reference(), descriptor.attributes.clone());
    }

    /// Pretend an object exists with the given attributes.
    pub fn seed_attributes(&self, reference: ResourceRef, attributes: Attributes) {
        self.lock().resources.insert(reference, attributes);
    }

    pub fn fail_observe(&self, reference: ResourceRef, reason: impl Into<String>) {
        self.lock().observe_failures.insert(reference, reason.into());
    }

    /// Make create and update on `reference` fail.
    pub fn fail_apply(&self, reference: ResourceRef, reason: impl Into<String>) {
        self.lock().apply_failures.insert(reference, reason.into());
    }

    pub fn fail_submission(&self, job: impl Into<String>, reason: impl Into<String>) {
        self.lock()
            .submission_failures
            .insert(job.into(), reason.into());
    }

    /// Statuses reported by runs of `job` started from now on.
    ///
    /// Defaults to `[Running, Succeeded]`.
    pub fn script_run(&self, job: impl Into<String>, statuses: Vec<JobRunStatus>) {
        self.lock().run_scripts.insert(job.into(), statuses);
    }

    pub fn resource(&self, reference: &ResourceRef) -> Option<Attributes> {
        self.lock().resources.get(reference).cloned()
    }

    /// Every API call so far, as `"<operation> <target>"`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Mutating calls only (create, update, start_run).
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("observe ") && !c.starts_with("run_status "))
            .collect()
    }

    pub fn started_runs(&self) -> Vec<(String, JobRunId)> {
        self.lock().started.clone()
    }
}

#[async_trait]
impl ResourceApi for InMemoryCloud {
    async fn observe(&self, descriptor: &ResourceDescriptor) -> Result<Option<Attributes>> {
        let reference = descriptor.reference();
        let mut state = self.lock();
        state.calls.push(format!("observe {reference}"));
        if let Some(reason) = state.observe_failures.get(&reference) {
            return Err(GlueformError::remote_state(reference.to_string(), reason.clone()));
        }
        Ok(state.resources.get(&reference).cloned())
    }

    async fn create(&self, descriptor: &ResourceDescriptor) -> Result<()> {
        let reference = descriptor.reference();
        let mut state = self.lock();
        state.calls.push(format!("create {reference}"));
        if let Some(reason) = state.apply_failures.get(&reference) {
            return Err(GlueformError::apply(reference.to_string(), reason.clone()));
        }
        if state.resources.contains_key(&reference) {
            return Err(GlueformError::apply(
                reference.to_string(),
                "resource already exists",
            ));
        }
        state
            .resources
            .insert(reference, descriptor.attributes.clone());
        Ok(())
    }

    async fn update(
        &self,
        descriptor: &ResourceDescriptor,
        changes: &[AttributeChange],
    ) -> Result<()> {
        let reference = descriptor.reference();
        let mut state = self.lock();
        state.calls.push(format!("update {reference}"));
        if let Some(reason) = state.apply_failures.get(&reference) {
            return Err(GlueformError::apply(reference.to_string(), reason.clone()));
        }
        let Some(current) = state.resources.get_mut(&reference) else {
            return Err(GlueformError::apply(
                reference.to_string(),
                "resource does not exist",
            ));
        };
        for change in changes {
            current.insert(change.key.clone(), change.desired.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl JobApi for InMemoryCloud {
    async fn start_run(&self, spec: &JobSpec) -> Result<JobRunId> {
        let mut state = self.lock();
        state.calls.push(format!("start_run {}", spec.name));
        if let Some(reason) = state.submission_failures.get(&spec.name) {
            return Err(GlueformError::job_submission(&spec.name, reason.clone()));
        }

        let pending = state
            .run_scripts
            .get(&spec.name)
            .cloned()
            .unwrap_or_else(|| vec![JobRunStatus::Running, JobRunStatus::Succeeded]);
        let run_id = JobRunId::new(format!("jr_{}", Uuid::new_v4().simple()));
        state.runs.insert(
            run_id.clone(),
            RunState {
                job: spec.name.clone(),
                pending: pending.into(),
            },
        );
        state.started.push((spec.name.clone(), run_id.clone()));
        Ok(run_id)
    }

    async fn run_status(&self, job_name: &str, run_id: &JobRunId) -> Result<JobRunStatus> {
        let mut state = self.lock();
        state.calls.push(format!("run_status {run_id}"));
        let unknown = || {
            GlueformError::remote_state(
                format!("job:{job_name}"),
                format!("unknown job run '{run_id}'"),
            )
        };
        let run = state.runs.get_mut(run_id).ok_or_else(unknown)?;
        if run.job != job_name {
            return Err(unknown());
        }
        let status = if run.pending.len() > 1 {
            run.pending.pop_front()
        } else {
            run.pending.front().cloned()
        };
        status.ok_or_else(unknown)
    }
}
