//! glueform core
//!
//! Desired-state descriptors for the bucket, catalog database, IAM role and
//! policies and the managed ETL job, plus the reconciler that applies them
//! and the submitter that runs the job.
//!
//! Remote collaborators sit behind the [`ResourceApi`] and [`JobApi`] traits;
//! [`InMemoryCloud`] implements both for tests and dry runs.

pub mod descriptor;
pub mod error;
pub mod graph;
pub mod job;
pub mod memory;
pub mod policy;
pub mod reconcile;

pub use descriptor::{Attributes, DescriptorSet, ResourceDescriptor, ResourceKind, ResourceRef};
pub use error::{ErrorCode, GlueformError, Result};
pub use job::{Backoff, JobApi, JobRunId, JobRunStatus, JobSpec, JobSubmitter};
pub use memory::InMemoryCloud;
pub use policy::PolicyDocument;
pub use reconcile::{
    plan, ActionKind, ActionOutcome, ApplyReport, ApplySummary, AttributeChange, ObservedState,
    OutcomeStatus, Plan, PlannedAction, Reconciler, ResourceApi,
};
