use glueform_config::DeployConfig;
use glueform_core::{
    ActionKind, DescriptorSet, GlueformError, InMemoryCloud, ObservedState, OutcomeStatus,
    Reconciler, ResourceDescriptor, ResourceKind, ResourceRef,
};

fn deploy_config() -> DeployConfig {
    let mut config = DeployConfig::default();
    config.bucket.name = "my-native-s3-table-bucket".to_string();
    config.database.name = "s3tables_db".to_string();
    config.role.name = "glue5-s3tables-role".to_string();
    config.job.name = "glue5-iceberg-s3tables-job".to_string();
    config
}

fn r(kind: ResourceKind, name: &str) -> ResourceRef {
    ResourceRef::new(kind, name)
}

fn assert_dependency_order(set: &DescriptorSet, plan: &glueform_core::Plan) {
    for (index, action) in plan.actions.iter().enumerate() {
        for dep in &action.descriptor.depends_on {
            let dep_index = plan.position(dep).expect("dependency is planned");
            assert!(
                dep_index < index,
                "{} planned before its dependency {}",
                action.resource,
                dep
            );
        }
    }
    assert_eq!(plan.actions.len(), set.len());
}

#[test]
fn test_bucket_and_role_precede_job() {
    let set = DescriptorSet::new(vec![
        ResourceDescriptor::new(ResourceKind::Job, "J")
            .with_dependency(r(ResourceKind::Bucket, "B"))
            .with_dependency(r(ResourceKind::Role, "R")),
        ResourceDescriptor::new(ResourceKind::Role, "R"),
        ResourceDescriptor::new(ResourceKind::Database, "D"),
        ResourceDescriptor::new(ResourceKind::Bucket, "B"),
    ])
    .unwrap();

    let plan = glueform_core::plan(&set, &ObservedState::new());
    let job = plan.position(&r(ResourceKind::Job, "J")).unwrap();
    assert!(plan.position(&r(ResourceKind::Bucket, "B")).unwrap() < job);
    assert!(plan.position(&r(ResourceKind::Role, "R")).unwrap() < job);
    assert!(plan.actions.iter().all(|a| a.kind == ActionKind::Create));
    assert_dependency_order(&set, &plan);
}

#[test]
fn test_config_plan_respects_dependencies() {
    let set = DescriptorSet::from_config(&deploy_config()).unwrap();
    let plan = glueform_core::plan(&set, &ObservedState::new());
    assert_dependency_order(&set, &plan);

    let kinds: Vec<ResourceKind> = plan.actions.iter().map(|a| a.resource.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ResourceKind::Bucket,
            ResourceKind::Database,
            ResourceKind::Role,
            ResourceKind::Policy,
            ResourceKind::Policy,
            ResourceKind::Job,
        ]
    );
}

#[test]
fn test_cycle_never_yields_a_plan() {
    let result = DescriptorSet::new(vec![
        ResourceDescriptor::new(ResourceKind::Bucket, "b"),
        ResourceDescriptor::new(ResourceKind::Role, "r")
            .with_dependency(r(ResourceKind::Policy, "p")),
        ResourceDescriptor::new(ResourceKind::Policy, "p")
            .with_dependency(r(ResourceKind::Job, "j")),
        ResourceDescriptor::new(ResourceKind::Job, "j")
            .with_dependency(r(ResourceKind::Role, "r")),
    ]);

    match result {
        Err(GlueformError::DependencyCycle { cycle, .. }) => {
            assert_eq!(cycle.len(), 4);
            assert_eq!(cycle.first(), cycle.last());
        }
        other => panic!("expected dependency cycle, got {other:?}"),
    }
}

#[tokio::test]
async fn test_apply_then_replan_is_all_noop() {
    let cloud = InMemoryCloud::new();
    let set = DescriptorSet::from_config(&deploy_config()).unwrap();
    let reconciler = Reconciler::new(&cloud);

    let first = reconciler.plan(&set).await.unwrap();
    assert_eq!(first.count(ActionKind::Create), set.len());

    let report = reconciler.apply(&first).await;
    assert!(report.is_success());
    assert_eq!(report.summary().created, set.len());

    let mutations_before = cloud.mutations().len();
    let second = reconciler.plan(&set).await.unwrap();
    assert!(second.is_noop());

    let report = reconciler.apply(&second).await;
    assert_eq!(report.summary().unchanged, set.len());
    assert_eq!(cloud.mutations().len(), mutations_before);
}

#[tokio::test]
async fn test_drift_produces_update() {
    let cloud = InMemoryCloud::new();
    let set = DescriptorSet::from_config(&deploy_config()).unwrap();
    for descriptor in set.ordered() {
        cloud.seed(descriptor);
    }

    let job_ref = r(ResourceKind::Job, "glue5-iceberg-s3tables-job");
    let mut drifted = cloud.resource(&job_ref).unwrap();
    drifted.insert("number_of_workers".into(), "10".into());
    cloud.seed_attributes(job_ref.clone(), drifted);

    let reconciler = Reconciler::new(&cloud);
    let plan = reconciler.plan(&set).await.unwrap();
    let action = &plan.actions[plan.position(&job_ref).unwrap()];
    assert_eq!(action.kind, ActionKind::Update);
    assert_eq!(action.changes.len(), 1);
    assert_eq!(action.changes[0].observed.as_deref(), Some("10"));
    assert_eq!(action.changes[0].desired, "2");

    let report = reconciler.apply(&plan).await;
    assert_eq!(report.summary().updated, 1);
    assert_eq!(
        cloud.resource(&job_ref).unwrap().get("number_of_workers"),
        Some(&"2".to_string())
    );
}

#[tokio::test]
async fn test_failure_blocks_dependents_only() {
    let cloud = InMemoryCloud::new();
    let role_ref = r(ResourceKind::Role, "glue5-s3tables-role");
    cloud.fail_apply(role_ref.clone(), "AccessDenied: iam:CreateRole");

    let set = DescriptorSet::from_config(&deploy_config()).unwrap();
    let reconciler = Reconciler::new(&cloud);
    let plan = reconciler.plan(&set).await.unwrap();
    let report = reconciler.apply(&plan).await;

    let bucket = report
        .outcome(&r(ResourceKind::Bucket, "my-native-s3-table-bucket"))
        .unwrap();
    assert_eq!(bucket.status, OutcomeStatus::Created);
    let database = report.outcome(&r(ResourceKind::Database, "s3tables_db")).unwrap();
    assert_eq!(database.status, OutcomeStatus::Created);

    let role = report.outcome(&role_ref).unwrap();
    assert_eq!(
        role.status,
        OutcomeStatus::Failed {
            reason: "AccessDenied: iam:CreateRole".into()
        }
    );

    let job = report
        .outcome(&r(ResourceKind::Job, "glue5-iceberg-s3tables-job"))
        .unwrap();
    assert_eq!(
        job.status,
        OutcomeStatus::Blocked {
            by: role_ref.clone()
        }
    );

    let summary = report.summary();
    assert_eq!(summary.created, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.blocked, 3);
    assert!(!report.is_success());
    assert!(matches!(
        report.first_error(),
        Some(GlueformError::Apply { resource, .. }) if resource == "role:glue5-s3tables-role"
    ));

    // Blocked actions never reach the API, and the failure is not retried.
    let mutations = cloud.mutations();
    assert_eq!(
        mutations.iter().filter(|c| c.starts_with("create role:")).count(),
        1
    );
    assert!(!mutations.iter().any(|c| c.contains("job:")));
}

#[tokio::test]
async fn test_blocking_is_transitive() {
    let cloud = InMemoryCloud::new();
    cloud.fail_apply(r(ResourceKind::Bucket, "a"), "BucketAlreadyExists");

    let set = DescriptorSet::new(vec![
        ResourceDescriptor::new(ResourceKind::Bucket, "a"),
        ResourceDescriptor::new(ResourceKind::Role, "b")
            .with_dependency(r(ResourceKind::Bucket, "a")),
        ResourceDescriptor::new(ResourceKind::Job, "c").with_dependency(r(ResourceKind::Role, "b")),
        ResourceDescriptor::new(ResourceKind::Database, "d"),
    ])
    .unwrap();

    let reconciler = Reconciler::new(&cloud).with_concurrency(4);
    let plan = reconciler.plan(&set).await.unwrap();
    let report = reconciler.apply(&plan).await;

    assert_eq!(
        report.outcome(&r(ResourceKind::Job, "c")).unwrap().status,
        OutcomeStatus::Blocked {
            by: r(ResourceKind::Role, "b")
        }
    );
    assert_eq!(
        report.outcome(&r(ResourceKind::Database, "d")).unwrap().status,
        OutcomeStatus::Created
    );
}

#[tokio::test]
async fn test_concurrent_apply_reports_in_plan_order() {
    let cloud = InMemoryCloud::new();
    let set = DescriptorSet::from_config(&deploy_config()).unwrap();
    let reconciler = Reconciler::new(&cloud).with_concurrency(8);

    let plan = reconciler.plan(&set).await.unwrap();
    let report = reconciler.apply(&plan).await;

    let planned: Vec<&ResourceRef> = plan.actions.iter().map(|a| &a.resource).collect();
    let reported: Vec<&ResourceRef> = report.outcomes.iter().map(|o| &o.resource).collect();
    assert_eq!(planned, reported);
    assert!(report.is_success());
}

#[tokio::test]
async fn test_observe_failure_aborts_before_mutation() {
    let cloud = InMemoryCloud::new();
    cloud.fail_observe(
        r(ResourceKind::Database, "s3tables_db"),
        "ThrottlingException",
    );

    let set = DescriptorSet::from_config(&deploy_config()).unwrap();
    let err = Reconciler::new(&cloud).plan(&set).await.unwrap_err();

    assert!(matches!(err, GlueformError::RemoteState { .. }));
    assert_eq!(err.exit_code(), 4);
    assert!(cloud.mutations().is_empty());
}
