//! Resource descriptors: the desired state of each cloud object
//!
//! A [`DescriptorSet`] is validated on construction: names are unique,
//! every `depends_on` reference resolves, and the graph is acyclic.

use crate::error::{GlueformError, Result};
use crate::graph;
use crate::job::JobSpec;
use crate::policy::PolicyDocument;
use glueform_config::DeployConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Attribute map shared by desired and observed state.
pub type Attributes = BTreeMap<String, String>;

/// Kind of cloud object described by a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Bucket,
    Database,
    Role,
    Policy,
    Job,
}

impl ResourceKind {
    /// Tie-break rank when several resources are ready at once.
    pub fn priority(&self) -> u8 {
        match self {
            ResourceKind::Bucket | ResourceKind::Database => 0,
            ResourceKind::Role => 1,
            ResourceKind::Policy => 2,
            ResourceKind::Job => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Bucket => "bucket",
            ResourceKind::Database => "database",
            ResourceKind::Role => "role",
            ResourceKind::Policy => "policy",
            ResourceKind::Job => "job",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = GlueformError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "bucket" => Ok(ResourceKind::Bucket),
            "database" => Ok(ResourceKind::Database),
            "role" => Ok(ResourceKind::Role),
            "policy" => Ok(ResourceKind::Policy),
            "job" => Ok(ResourceKind::Job),
            _ => Err(GlueformError::validation(format!(
                "unknown resource kind '{s}' (expected bucket, database, role, policy or job)"
            ))),
        }
    }
}

/// Reference to a descriptor, written `kind:name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

impl FromStr for ResourceRef {
    type Err = GlueformError;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, name) = s.split_once(':').ok_or_else(|| {
            GlueformError::validation(format!(
                "dependency reference '{s}' must be written kind:name"
            ))
        })?;
        if name.is_empty() {
            return Err(GlueformError::validation(format!(
                "dependency reference '{s}' has an empty name"
            )));
        }
        Ok(Self::new(kind.parse()?, name))
    }
}

impl Serialize for ResourceRef {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Desired state of one cloud object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceDescriptor {
    pub kind: ResourceKind,
    pub name: String,
    pub attributes: Attributes,
    pub depends_on: BTreeSet<ResourceRef>,
}

impl ResourceDescriptor {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            attributes: Attributes::new(),
            depends_on: BTreeSet::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_dependency(mut self, dependency: ResourceRef) -> Self {
        self.depends_on.insert(dependency);
        self
    }

    pub fn reference(&self) -> ResourceRef {
        ResourceRef::new(self.kind, self.name.clone())
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Attribute lookup that reports a missing key as an apply failure.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.attribute(key).ok_or_else(|| {
            GlueformError::apply(
                self.reference().to_string(),
                format!("descriptor is missing attribute '{key}'"),
            )
        })
    }
}

/// Validated, acyclic set of descriptors.
#[derive(Debug, Clone)]
pub struct DescriptorSet {
    descriptors: BTreeMap<ResourceRef, ResourceDescriptor>,
    order: Vec<ResourceRef>,
}

impl DescriptorSet {
    pub fn new(descriptors: Vec<ResourceDescriptor>) -> Result<Self> {
        let mut by_ref = BTreeMap::new();
        for descriptor in descriptors {
            if descriptor.name.is_empty() {
                return Err(GlueformError::validation(format!(
                    "{} descriptor has an empty name",
                    descriptor.kind
                )));
            }
            let reference = descriptor.reference();
            if by_ref.insert(reference.clone(), descriptor).is_some() {
                return Err(GlueformError::validation(format!(
                    "duplicate resource '{reference}'"
                )));
            }
        }

        for descriptor in by_ref.values() {
            for dependency in &descriptor.depends_on {
                if !by_ref.contains_key(dependency) {
                    return Err(GlueformError::validation(format!(
                        "'{}' depends on '{}', which is not defined",
                        descriptor.reference(),
                        dependency
                    )));
                }
            }
        }

        let order = graph::topological_order(&by_ref)?;
        Ok(Self {
            descriptors: by_ref,
            order,
        })
    }

    /// Build the descriptor set for a deployment config.
    pub fn from_config(config: &DeployConfig) -> Result<Self> {
        let bucket_ref = ResourceRef::new(ResourceKind::Bucket, config.bucket.name.clone());
        let role_ref = ResourceRef::new(ResourceKind::Role, config.role.name.clone());

        let mut bucket = ResourceDescriptor::new(ResourceKind::Bucket, &config.bucket.name);
        if let Some(region) = &config.aws.region {
            bucket = bucket.with_attribute("region", region);
        }
        let bucket = with_extra_dependencies(bucket, &config.bucket.depends_on)?;

        let mut database = ResourceDescriptor::new(ResourceKind::Database, &config.database.name);
        if let Some(description) = &config.database.description {
            database = database.with_attribute("description", description);
        }
        let database = with_extra_dependencies(database, &config.database.depends_on)?;

        let trust = PolicyDocument::assume_role(&config.role.service_principal);
        let role = ResourceDescriptor::new(ResourceKind::Role, &config.role.name)
            .with_attribute("assume_role_policy", trust.to_canonical_json());
        let role = with_extra_dependencies(role, &config.role.depends_on)?;

        let mut descriptors = vec![bucket, database, role];

        for arn in &config.role.managed_policies {
            let name = arn.rsplit('/').next().unwrap_or(arn);
            descriptors.push(
                ResourceDescriptor::new(ResourceKind::Policy, name)
                    .with_attribute("role", &config.role.name)
                    .with_attribute("policy_arn", arn)
                    .with_dependency(role_ref.clone()),
            );
        }

        let inline = &config.role.inline_policy;
        let document = PolicyDocument::allow(inline.actions.iter().cloned(), &inline.resource);
        descriptors.push(
            ResourceDescriptor::new(ResourceKind::Policy, &inline.name)
                .with_attribute("role", &config.role.name)
                .with_attribute("document", document.to_canonical_json())
                .with_dependency(role_ref.clone()),
        );

        let job = JobSpec::from_config(config)
            .descriptor()
            .with_dependency(bucket_ref)
            .with_dependency(role_ref);
        descriptors.push(with_extra_dependencies(job, &config.job.depends_on)?);

        Self::new(descriptors)
    }

    pub fn get(&self, reference: &ResourceRef) -> Option<&ResourceDescriptor> {
        self.descriptors.get(reference)
    }

    /// Descriptors in dependency order.
    pub fn ordered(&self) -> impl Iterator<Item = &ResourceDescriptor> {
        self.order.iter().filter_map(|r| self.descriptors.get(r))
    }

    pub fn order(&self) -> &[ResourceRef] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// The job descriptor, if the set contains exactly one.
    pub fn job(&self) -> Option<&ResourceDescriptor> {
        let mut jobs = self
            .descriptors
            .values()
            .filter(|d| d.kind == ResourceKind::Job);
        match (jobs.next(), jobs.next()) {
            (Some(job), None) => Some(job),
            _ => None,
        }
    }
}

fn with_extra_dependencies(
    mut descriptor: ResourceDescriptor,
    references: &[String],
) -> Result<ResourceDescriptor> {
    for raw in references {
        descriptor.depends_on.insert(raw.parse()?);
    }
    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DeployConfig {
        let mut config = DeployConfig::default();
        config.bucket.name = "my-native-s3-table-bucket".to_string();
        config.database.name = "s3tables_db".to_string();
        config.role.name = "glue5-s3tables-role".to_string();
        config.job.name = "glue5-iceberg-s3tables-job".to_string();
        config
    }

    #[test]
    fn test_ref_parsing() {
        let r: ResourceRef = "role:glue5-s3tables-role".parse().unwrap();
        assert_eq!(r.kind, ResourceKind::Role);
        assert_eq!(r.name, "glue5-s3tables-role");
        assert_eq!(r.to_string(), "role:glue5-s3tables-role");

        assert!("glue5-s3tables-role".parse::<ResourceRef>().is_err());
        assert!("queue:x".parse::<ResourceRef>().is_err());
        assert!("job:".parse::<ResourceRef>().is_err());
    }

    #[test]
    fn test_from_config_builds_all_resources() {
        let set = DescriptorSet::from_config(&config()).unwrap();

        // bucket, database, role, managed attachment, inline policy, job
        assert_eq!(set.len(), 6);

        let job = set.job().unwrap();
        assert_eq!(job.name, "glue5-iceberg-s3tables-job");
        assert!(job.depends_on.contains(&ResourceRef::new(
            ResourceKind::Bucket,
            "my-native-s3-table-bucket"
        )));
        assert!(job
            .depends_on
            .contains(&ResourceRef::new(ResourceKind::Role, "glue5-s3tables-role")));

        let attachment = set
            .get(&ResourceRef::new(ResourceKind::Policy, "AWSGlueServiceRole"))
            .unwrap();
        assert_eq!(
            attachment.attribute("policy_arn"),
            Some("arn:aws:iam::aws:policy/service-role/AWSGlueServiceRole")
        );

        let inline = set
            .get(&ResourceRef::new(ResourceKind::Policy, "glue-custom-access"))
            .unwrap();
        assert!(inline.attribute("document").unwrap().contains("lakeformation:*"));
    }

    #[test]
    fn test_unknown_dependency_is_validation_error() {
        let mut config = config();
        config.job.depends_on = vec!["database:missing_db".to_string()];

        let err = DescriptorSet::from_config(&config).unwrap_err();
        assert!(matches!(err, GlueformError::Validation { .. }));
        assert!(err.to_string().contains("database:missing_db"));
    }

    #[test]
    fn test_config_cycle_is_detected() {
        let mut config = config();
        config.role.depends_on = vec!["job:glue5-iceberg-s3tables-job".to_string()];

        let err = DescriptorSet::from_config(&config).unwrap_err();
        assert!(matches!(err, GlueformError::DependencyCycle { .. }));
    }

    #[test]
    fn test_duplicate_reference_rejected() {
        let err = DescriptorSet::new(vec![
            ResourceDescriptor::new(ResourceKind::Bucket, "b"),
            ResourceDescriptor::new(ResourceKind::Bucket, "b"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate resource 'bucket:b'"));
    }
}
