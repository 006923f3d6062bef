//! Plan and apply the difference between desired and observed state

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::descriptor::{Attributes, DescriptorSet, ResourceDescriptor, ResourceRef};
use crate::error::{GlueformError, Result};
use crate::graph;

/// Remote resource-management API.
///
/// `observe` returns `None` when the object does not exist, and otherwise
/// the attributes it currently has (at least those a descriptor can set).
#[async_trait]
pub trait ResourceApi: Send + Sync {
    async fn observe(&self, descriptor: &ResourceDescriptor) -> Result<Option<Attributes>>;

    async fn create(&self, descriptor: &ResourceDescriptor) -> Result<()>;

    async fn update(
        &self,
        descriptor: &ResourceDescriptor,
        changes: &[AttributeChange],
    ) -> Result<()>;
}

/// Attributes of the remote objects that exist, keyed by reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedState {
    resources: BTreeMap<ResourceRef, Attributes>,
}

impl ObservedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reference: ResourceRef, attributes: Attributes) {
        self.resources.insert(reference, attributes);
    }

    pub fn get(&self, reference: &ResourceRef) -> Option<&Attributes> {
        self.resources.get(reference)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Create,
    Update,
    Noop,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ActionKind::Create => "create",
            ActionKind::Update => "update",
            ActionKind::Noop => "noop",
        })
    }
}

/// One attribute whose observed value differs from the desired one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeChange {
    pub key: String,
    /// `None` when the remote object lacks the attribute entirely
    pub observed: Option<String>,
    pub desired: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedAction {
    pub resource: ResourceRef,
    pub kind: ActionKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<AttributeChange>,
    #[serde(skip)]
    pub descriptor: ResourceDescriptor,
}

/// Actions in dependency order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub actions: Vec<PlannedAction>,
}

impl Plan {
    pub fn count(&self, kind: ActionKind) -> usize {
        self.actions.iter().filter(|a| a.kind == kind).count()
    }

    /// True when applying would change nothing.
    pub fn is_noop(&self) -> bool {
        self.actions.iter().all(|a| a.kind == ActionKind::Noop)
    }

    pub fn position(&self, reference: &ResourceRef) -> Option<usize> {
        self.actions.iter().position(|a| &a.resource == reference)
    }
}

/// Compute the plan for `descriptors` given what exists remotely.
///
/// Only the desired attribute keys are compared; extra observed attributes
/// never cause an update.
pub fn plan(descriptors: &DescriptorSet, observed: &ObservedState) -> Plan {
    let actions = descriptors
        .ordered()
        .map(|descriptor| {
            let reference = descriptor.reference();
            let (kind, changes) = match observed.get(&reference) {
                None => (ActionKind::Create, Vec::new()),
                Some(current) => {
                    let changes = diff(&descriptor.attributes, current);
                    if changes.is_empty() {
                        (ActionKind::Noop, changes)
                    } else {
                        (ActionKind::Update, changes)
                    }
                }
            };
            PlannedAction {
                resource: reference,
                kind,
                changes,
                descriptor: descriptor.clone(),
            }
        })
        .collect();

    Plan { actions }
}

fn diff(desired: &Attributes, observed: &Attributes) -> Vec<AttributeChange> {
    desired
        .iter()
        .filter(|(key, value)| observed.get(*key) != Some(*value))
        .map(|(key, value)| AttributeChange {
            key: key.clone(),
            observed: observed.get(key).cloned(),
            desired: value.clone(),
        })
        .collect()
}

/// Result of applying one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum OutcomeStatus {
    Created,
    Updated,
    Unchanged,
    Failed { reason: String },
    /// Not attempted because a dependency failed or was itself blocked
    Blocked { by: ResourceRef },
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Created => f.write_str("created"),
            OutcomeStatus::Updated => f.write_str("updated"),
            OutcomeStatus::Unchanged => f.write_str("unchanged"),
            OutcomeStatus::Failed { reason } => write!(f, "failed: {reason}"),
            OutcomeStatus::Blocked { by } => write!(f, "blocked by {by}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub resource: ResourceRef,
    pub action: ActionKind,
    #[serde(flatten)]
    pub status: OutcomeStatus,
    #[serde(skip)]
    pub error: Option<GlueformError>,
}

impl ActionOutcome {
    fn is_failed_or_blocked(&self) -> bool {
        matches!(
            self.status,
            OutcomeStatus::Failed { .. } | OutcomeStatus::Blocked { .. }
        )
    }
}

/// Per-action results of an apply, in plan order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub outcomes: Vec<ActionOutcome>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub blocked: usize,
}

impl fmt::Display for ApplySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} unchanged, {} failed, {} blocked",
            self.created, self.updated, self.unchanged, self.failed, self.blocked
        )
    }
}

impl ApplyReport {
    pub fn summary(&self) -> ApplySummary {
        let mut summary = ApplySummary::default();
        for outcome in &self.outcomes {
            match outcome.status {
                OutcomeStatus::Created => summary.created += 1,
                OutcomeStatus::Updated => summary.updated += 1,
                OutcomeStatus::Unchanged => summary.unchanged += 1,
                OutcomeStatus::Failed { .. } => summary.failed += 1,
                OutcomeStatus::Blocked { .. } => summary.blocked += 1,
            }
        }
        summary
    }

    pub fn is_success(&self) -> bool {
        !self.outcomes.iter().any(ActionOutcome::is_failed_or_blocked)
    }

    /// The first failure in plan order.
    pub fn first_error(&self) -> Option<&GlueformError> {
        self.outcomes.iter().find_map(|o| o.error.as_ref())
    }

    pub fn outcome(&self, reference: &ResourceRef) -> Option<&ActionOutcome> {
        self.outcomes.iter().find(|o| &o.resource == reference)
    }
}

/// Drives observe, plan and apply against a [`ResourceApi`].
pub struct Reconciler<'a, R: ResourceApi + ?Sized> {
    api: &'a R,
    concurrency: usize,
}

impl<'a, R: ResourceApi + ?Sized> Reconciler<'a, R> {
    pub fn new(api: &'a R) -> Self {
        Self {
            api,
            concurrency: 1,
        }
    }

    /// Maximum actions applied at once within a dependency level.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Read remote state for every descriptor. Any failure aborts.
    #[instrument(skip_all, fields(resources = descriptors.len()))]
    pub async fn observe(&self, descriptors: &DescriptorSet) -> Result<ObservedState> {
        let mut observed = ObservedState::new();
        for descriptor in descriptors.ordered() {
            let reference = descriptor.reference();
            let current = self.api.observe(descriptor).await.map_err(|e| match e {
                GlueformError::RemoteState { .. } => e,
                other => GlueformError::remote_state(reference.to_string(), other.reason()),
            })?;
            debug!(resource = %reference, exists = current.is_some(), "Observed resource");
            if let Some(attributes) = current {
                observed.insert(reference, attributes);
            }
        }
        Ok(observed)
    }

    pub async fn plan(&self, descriptors: &DescriptorSet) -> Result<Plan> {
        let observed = self.observe(descriptors).await?;
        let plan = plan(descriptors, &observed);
        info!(
            create = plan.count(ActionKind::Create),
            update = plan.count(ActionKind::Update),
            noop = plan.count(ActionKind::Noop),
            "Plan computed"
        );
        Ok(plan)
    }

    /// Apply a plan level by level.
    ///
    /// A failed action blocks its dependents (transitively); independent
    /// branches keep going. Nothing is retried.
    #[instrument(skip_all, fields(actions = plan.actions.len(), concurrency = self.concurrency))]
    pub async fn apply(&self, plan: &Plan) -> ApplyReport {
        let by_ref: BTreeMap<&ResourceRef, &PlannedAction> =
            plan.actions.iter().map(|a| (&a.resource, a)).collect();
        let order: Vec<ResourceRef> = plan.actions.iter().map(|a| a.resource.clone()).collect();
        let levels = graph::levels(&order, |reference| {
            by_ref
                .get(reference)
                .into_iter()
                .flat_map(|action| action.descriptor.depends_on.iter())
        });

        let mut outcomes: BTreeMap<ResourceRef, ActionOutcome> = BTreeMap::new();

        for level in levels {
            let mut runnable = Vec::new();
            for reference in level {
                let Some(action) = by_ref.get(reference).copied() else {
                    continue;
                };
                let blocker = action
                    .descriptor
                    .depends_on
                    .iter()
                    .find(|dep| {
                        outcomes
                            .get(*dep)
                            .is_some_and(ActionOutcome::is_failed_or_blocked)
                    });
                match blocker {
                    Some(dep) => {
                        warn!(resource = %reference, blocked_by = %dep, "Skipping action");
                        outcomes.insert(
                            reference.clone(),
                            ActionOutcome {
                                resource: reference.clone(),
                                action: action.kind,
                                status: OutcomeStatus::Blocked { by: dep.clone() },
                                error: None,
                            },
                        );
                    }
                    None => runnable.push(action),
                }
            }

            let results: Vec<ActionOutcome> = stream::iter(runnable)
                .map(|action| self.execute(action))
                .buffer_unordered(self.concurrency)
                .collect()
                .await;
            for outcome in results {
                outcomes.insert(outcome.resource.clone(), outcome);
            }
        }

        let outcomes = order
            .iter()
            .filter_map(|reference| outcomes.remove(reference))
            .collect();
        let report = ApplyReport { outcomes };
        info!(summary = %report.summary(), "Apply finished");
        report
    }

    async fn execute(&self, action: &PlannedAction) -> ActionOutcome {
        let result = match action.kind {
            ActionKind::Noop => Ok(OutcomeStatus::Unchanged),
            ActionKind::Create => self
                .api
                .create(&action.descriptor)
                .await
                .map(|_| OutcomeStatus::Created),
            ActionKind::Update => self
                .api
                .update(&action.descriptor, &action.changes)
                .await
                .map(|_| OutcomeStatus::Updated),
        };

        match result {
            Ok(status) => {
                if action.kind != ActionKind::Noop {
                    info!(resource = %action.resource, action = %action.kind, "Applied");
                }
                ActionOutcome {
                    resource: action.resource.clone(),
                    action: action.kind,
                    status,
                    error: None,
                }
            }
            Err(e) => {
                let error = match e {
                    GlueformError::Apply { .. } => e,
                    other => GlueformError::apply(action.resource.to_string(), other.reason()),
                };
                warn!(resource = %action.resource, error = %error, "Action failed");
                ActionOutcome {
                    resource: action.resource.clone(),
                    action: action.kind,
                    status: OutcomeStatus::Failed {
                        reason: error.reason(),
                    },
                    error: Some(error),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ResourceKind;

    fn bucket() -> ResourceDescriptor {
        ResourceDescriptor::new(ResourceKind::Bucket, "b").with_attribute("region", "us-east-1")
    }

    #[test]
    fn test_missing_resource_is_create() {
        let set = DescriptorSet::new(vec![bucket()]).unwrap();
        let plan = plan(&set, &ObservedState::new());
        assert_eq!(plan.actions[0].kind, ActionKind::Create);
        assert!(plan.actions[0].changes.is_empty());
    }

    #[test]
    fn test_changed_attribute_is_update() {
        let set = DescriptorSet::new(vec![bucket()]).unwrap();
        let mut observed = ObservedState::new();
        let mut attrs = Attributes::new();
        attrs.insert("region".into(), "eu-west-1".into());
        observed.insert(bucket().reference(), attrs);

        let plan = plan(&set, &observed);
        assert_eq!(plan.actions[0].kind, ActionKind::Update);
        assert_eq!(
            plan.actions[0].changes,
            vec![AttributeChange {
                key: "region".into(),
                observed: Some("eu-west-1".into()),
                desired: "us-east-1".into(),
            }]
        );
    }

    #[test]
    fn test_extra_observed_attributes_are_ignored() {
        let set = DescriptorSet::new(vec![bucket()]).unwrap();
        let mut observed = ObservedState::new();
        let mut attrs = Attributes::new();
        attrs.insert("region".into(), "us-east-1".into());
        attrs.insert("creation_date".into(), "2024-01-01".into());
        observed.insert(bucket().reference(), attrs);

        assert!(plan(&set, &observed).is_noop());
    }

    #[test]
    fn test_summary_display() {
        let summary = ApplySummary {
            created: 2,
            updated: 1,
            unchanged: 3,
            failed: 0,
            blocked: 0,
        };
        assert_eq!(
            summary.to_string(),
            "2 created, 1 updated, 3 unchanged, 0 failed, 0 blocked"
        );
    }

    #[test]
    fn test_outcome_serializes_flat() {
        let outcome = ActionOutcome {
            resource: ResourceRef::new(ResourceKind::Job, "j"),
            action: ActionKind::Create,
            status: OutcomeStatus::Blocked {
                by: ResourceRef::new(ResourceKind::Role, "r"),
            },
            error: None,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["resource"], "job:j");
        assert_eq!(json["status"], "blocked");
        assert_eq!(json["by"], "role:r");
    }
}
