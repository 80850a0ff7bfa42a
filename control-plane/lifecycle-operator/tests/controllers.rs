mod common;

use std::sync::Arc;

use common::{
    DEFAULT_NS, Harness, NS, TRACEPARENT, app, app_version, replica_set, task_definition,
    workload, workload_version,
};
use kube::runtime::controller::Action;
use lifecycle_operator::config::OperatorConfig;
use lifecycle_operator::controller::app_version::WorkloadRollup;
use lifecycle_operator::controller::{
    PhaseItem, PhaseReconciler, ReconcileErr, app as app_controller,
    app_version as app_version_controller, workload as keptn_workload,
    workload_version as workload_controller,
};
use lifecycle_operator::crd::{
    CheckType, KeptnApp, KeptnAppVersion, KeptnState, KeptnWorkload, KeptnWorkloadStatus,
    KeptnWorkloadVersion, WorkloadRef,
};
use lifecycle_operator::events::{
    REASON_APP_VERSION_NOT_FOUND, REASON_FAILED, REASON_FINISHED, REASON_RECONCILE_ERROR,
};
use lifecycle_operator::lifecycle::KeptnPhase;
use lifecycle_operator::lifecycle::naming::app_version_name;
use lifecycle_operator::store::ObjectStore;
use opentelemetry::Context;

fn with_frontend(mut av: KeptnAppVersion) -> KeptnAppVersion {
    av.spec.workloads = vec![WorkloadRef {
        name: "frontend".into(),
        version: "1.0.0".into(),
    }];
    av
}

#[test_log::test(tokio::test)]
async fn app_creates_version_for_generation() {
    let h = Harness::new();
    let app = h.seed(app("podtato", "0.1.0", 1)).await;

    let action = app_controller::reconcile(Arc::new(app), h.ctx.clone())
        .await
        .unwrap();
    assert_eq!(action, Action::await_change());

    let name = app_version_name("podtato", "0.1.0", 1);
    let av: KeptnAppVersion = h.get(&name).await;
    assert_eq!(av.spec.app_name, "podtato");
    assert_eq!(av.spec.workloads.len(), 1);
    assert!(av.spec.previous_version.is_none());
    assert!(av.spec.trace_id.contains_key("traceparent"));
    let owners = av.metadata.owner_references.unwrap_or_default();
    assert_eq!(owners[0].kind, "KeptnApp");

    let app: KeptnApp = h.get("podtato").await;
    let status = app.status.unwrap_or_default();
    assert_eq!(status.current_version.as_deref(), Some("0.1.0"));
    assert_eq!(status.observed_generation, Some(1));
}

#[test_log::test(tokio::test)]
async fn new_generation_deprecates_previous_version() {
    let h = Harness::new();
    let old_name = app_version_name("podtato", "0.1.0", 1);
    let mut old = app_version(&old_name);
    old.set_check_state(CheckType::PreDeployment, KeptnState::Succeeded);
    h.seed(old).await;
    let other_version = app_version_name("podtato", "0.0.9", 1);
    let mut unrelated = app_version(&other_version);
    unrelated.spec.version = "0.0.9".into();
    h.seed(unrelated).await;
    let other_app = app_version_name("checkout", "0.1.0", 1);
    let mut unrelated = app_version(&other_app);
    unrelated.spec.app_name = "checkout".into();
    h.seed(unrelated).await;
    let app = h.seed(app("podtato", "0.1.0", 2)).await;

    app_controller::reconcile(Arc::new(app), h.ctx.clone())
        .await
        .unwrap();

    let old: KeptnAppVersion = h.get(&old_name).await;
    assert_eq!(old.state(), KeptnState::Deprecated);
    assert_eq!(old.check_state(CheckType::PreDeployment), KeptnState::Succeeded);
    assert_eq!(
        old.check_state(CheckType::PostDeployment),
        KeptnState::Deprecated
    );

    let current: KeptnAppVersion = h.get(&app_version_name("podtato", "0.1.0", 2)).await;
    assert_eq!(current.state(), KeptnState::Pending);

    for name in [&other_version, &other_app] {
        let untouched: KeptnAppVersion = h.get(name).await;
        assert_eq!(untouched.state(), KeptnState::Pending, "{name}");
        assert_eq!(
            untouched.check_state(CheckType::PostDeployment),
            KeptnState::Pending
        );
    }
}

#[test_log::test(tokio::test)]
async fn workload_rollup_counts_missing_as_pending() {
    let h = Harness::new();
    let mut av = h.seed(with_frontend(app_version("podtato-0.1.0-6b86b273"))).await;
    let rollup = WorkloadRollup::new(&h.ctx);

    let state = rollup.reconcile(&mut av, &Context::new()).await.unwrap();
    assert_eq!(state, KeptnState::Pending);

    let mut wv = workload_version("ReplicaSet", "frontend-rs");
    wv.set_state(KeptnState::Succeeded);
    h.seed(wv).await;

    let state = rollup.reconcile(&mut av, &Context::new()).await.unwrap();
    assert_eq!(state, KeptnState::Succeeded);
    let status = av.status.clone().unwrap_or_default();
    assert_eq!(status.workload_status.len(), 1);
    assert_eq!(status.workload_status[0].status, KeptnState::Succeeded);

    h.store
        .fail_gets_for("podtato-frontend-1.0.0", "connection reset")
        .await;
    let state = rollup.reconcile(&mut av, &Context::new()).await.unwrap();
    assert_eq!(state, KeptnState::Unknown);
}

#[test_log::test(tokio::test)]
async fn app_version_without_checks_completes() {
    let h = Harness::new();
    let av = h.seed(with_frontend(app_version("podtato-0.1.0-6b86b273"))).await;
    let mut wv = workload_version("ReplicaSet", "frontend-rs");
    wv.set_state(KeptnState::Succeeded);
    h.seed(wv).await;

    app_version_controller::reconcile(Arc::new(av), h.ctx.clone())
        .await
        .unwrap();

    let av: KeptnAppVersion = h.get("podtato-0.1.0-6b86b273").await;
    assert_eq!(av.state(), KeptnState::Succeeded);
    assert_eq!(av.current_phase(), KeptnPhase::COMPLETED.short_name);
    assert!(av.is_end_time_set());
    assert!(
        h.events
            .reasons()
            .contains(&"AppCompletedFinished".to_string())
    );

    // a finished app version is not driven again
    let emitted = h.events.all().len();
    let action = app_version_controller::reconcile(Arc::new(av), h.ctx.clone())
        .await
        .unwrap();
    assert_eq!(action, Action::await_change());
    assert_eq!(h.events.all().len(), emitted);
}

#[test_log::test(tokio::test)]
async fn workload_waits_for_its_app_version() {
    let h = Harness::new();
    let wv = h.seed(workload_version("ReplicaSet", "frontend-rs")).await;

    let action = workload_controller::reconcile(Arc::new(wv), h.ctx.clone())
        .await
        .unwrap();

    assert_eq!(action, Action::requeue(h.ctx.cfg.requeue_after()));
    assert_eq!(h.events.count(REASON_APP_VERSION_NOT_FOUND), 1);
    let wv: KeptnWorkloadVersion = h.get("podtato-frontend-1.0.0").await;
    assert!(wv.current_phase().is_empty());
}

async fn seed_passed_app_version(h: &Harness) {
    let mut av = with_frontend(app_version("podtato-0.1.0-6b86b273"));
    av.set_check_state(CheckType::PreDeployment, KeptnState::Succeeded);
    av.set_check_state(CheckType::PreDeploymentEvaluation, KeptnState::Succeeded);
    av.spec
        .trace_id
        .insert("traceparent".into(), TRACEPARENT.into());
    h.seed(av).await;
}

#[test_log::test(tokio::test)]
async fn workload_completes_when_replica_set_is_ready() {
    let h = Harness::new();
    seed_passed_app_version(&h).await;
    h.seed(replica_set("frontend-rs", 2, 2)).await;
    let wv = h.seed(workload_version("ReplicaSet", "frontend-rs")).await;

    workload_controller::reconcile(Arc::new(wv), h.ctx.clone())
        .await
        .unwrap();

    let wv: KeptnWorkloadVersion = h.get("podtato-frontend-1.0.0").await;
    assert_eq!(wv.state(), KeptnState::Succeeded);
    assert!(wv.spec.trace_id.contains_key("traceparent"));
    let status = wv.status.unwrap_or_default();
    assert_eq!(status.deployment_status, KeptnState::Succeeded);
    assert!(status.deployment_start_time.is_some());
    assert!(
        h.events
            .with_reason(REASON_FINISHED)
            .iter()
            .any(|(_, e)| e.phase == KeptnPhase::WORKLOAD_COMPLETED)
    );
}

#[test_log::test(tokio::test)]
async fn workload_deploy_progresses_until_replicas_are_available() {
    let h = Harness::new();
    seed_passed_app_version(&h).await;
    h.seed(replica_set("frontend-rs", 3, 1)).await;
    let wv = h.seed(workload_version("ReplicaSet", "frontend-rs")).await;

    let action = workload_controller::reconcile(Arc::new(wv), h.ctx.clone())
        .await
        .unwrap();

    assert_eq!(action, Action::requeue(h.ctx.cfg.requeue_after()));
    let wv: KeptnWorkloadVersion = h.get("podtato-frontend-1.0.0").await;
    assert_eq!(wv.state(), KeptnState::Progressing);
    assert_eq!(wv.current_phase(), KeptnPhase::WORKLOAD_DEPLOYMENT.short_name);
    let status = wv.status.unwrap_or_default();
    assert_eq!(status.deployment_status, KeptnState::Progressing);
    assert!(status.deployment_start_time.is_some());
}

#[test_log::test(tokio::test)]
async fn unsupported_resource_reference_is_an_error() {
    let h = Harness::new();
    seed_passed_app_version(&h).await;
    let wv = h.seed(workload_version("Deployment", "frontend")).await;

    let err = workload_controller::reconcile(Arc::new(wv), h.ctx.clone())
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileErr::UnsupportedResource(_)), "{err}");
    assert_eq!(h.events.count(REASON_RECONCILE_ERROR), 1);
    let stored = h
        .store
        .list::<KeptnWorkloadVersion>(NS, None)
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
}

#[test_log::test(tokio::test)]
async fn non_blocking_app_version_deploys_after_failed_pre_task() {
    let h = Harness::with_config(OperatorConfig {
        default_namespace: DEFAULT_NS.to_string(),
        block_deployment: false,
        ..Default::default()
    });
    h.seed(task_definition(NS, "task-def")).await;
    let mut av = with_frontend(app_version("podtato-0.1.0-6b86b273"));
    av.spec.pre_deployment_tasks = vec!["task-def".into()];
    let av = h.seed(av).await;
    let mut wv = workload_version("ReplicaSet", "frontend-rs");
    wv.set_state(KeptnState::Succeeded);
    h.seed(wv).await;

    app_version_controller::reconcile(Arc::new(av), h.ctx.clone())
        .await
        .unwrap();
    let av: KeptnAppVersion = h.get("podtato-0.1.0-6b86b273").await;
    assert_eq!(av.state(), KeptnState::Progressing);
    let task = av.item_statuses(CheckType::PreDeployment)[0].name.clone();
    h.set_task_state(&task, KeptnState::Failed, Some("exit code 1"))
        .await;

    app_version_controller::reconcile(Arc::new(av), h.ctx.clone())
        .await
        .unwrap();

    let av: KeptnAppVersion = h.get("podtato-0.1.0-6b86b273").await;
    assert_eq!(av.state(), KeptnState::Succeeded);
    assert!(av.is_end_time_set());
    assert_eq!(av.check_state(CheckType::PreDeployment), KeptnState::Failed);
    let status = av.status.unwrap_or_default();
    assert_eq!(status.workload_overall_status, KeptnState::Succeeded);
    assert_eq!(h.events.count(REASON_FAILED), 0);
}

#[test_log::test(tokio::test)]
async fn blocking_app_version_stops_at_failed_pre_task() {
    let h = Harness::new();
    h.seed(task_definition(NS, "task-def")).await;
    let mut av = with_frontend(app_version("podtato-0.1.0-6b86b273"));
    av.spec.pre_deployment_tasks = vec!["task-def".into()];
    let av = h.seed(av).await;

    app_version_controller::reconcile(Arc::new(av), h.ctx.clone())
        .await
        .unwrap();
    let av: KeptnAppVersion = h.get("podtato-0.1.0-6b86b273").await;
    let task = av.item_statuses(CheckType::PreDeployment)[0].name.clone();
    h.set_task_state(&task, KeptnState::Failed, None).await;

    app_version_controller::reconcile(Arc::new(av), h.ctx.clone())
        .await
        .unwrap();

    let av: KeptnAppVersion = h.get("podtato-0.1.0-6b86b273").await;
    assert_eq!(av.state(), KeptnState::Failed);
    let status = av.status.unwrap_or_default();
    assert_eq!(status.workload_overall_status, KeptnState::Deprecated);
}

#[test_log::test(tokio::test)]
async fn workload_creates_version_with_trace_context() {
    let h = Harness::new();
    let mut wl = workload("1.0.0");
    wl.metadata.annotations = Some([("traceparent".to_string(), TRACEPARENT.to_string())].into());
    let wl = h.seed(wl).await;

    let action = keptn_workload::reconcile(Arc::new(wl), h.ctx.clone())
        .await
        .unwrap();
    assert_eq!(action, Action::await_change());

    let wv: KeptnWorkloadVersion = h.get("podtato-frontend-1.0.0").await;
    assert_eq!(wv.spec.app, "podtato");
    assert_eq!(wv.spec.workload_name, "podtato-frontend");
    assert_eq!(wv.spec.version, "1.0.0");
    assert_eq!(wv.spec.resource_reference.name, "frontend-rs");
    assert_eq!(wv.spec.pre_deployment_tasks, vec!["task-def".to_string()]);
    assert!(wv.spec.previous_version.is_none());
    assert!(wv.spec.trace_id.is_empty());
    let traceparent = wv
        .metadata
        .annotations
        .clone()
        .unwrap_or_default()
        .remove("traceparent")
        .unwrap_or_default();
    assert!(traceparent.contains("4bf92f3577b34da6a3ce929d0e0e4736"), "{traceparent}");
    let owners = wv.metadata.owner_references.clone().unwrap_or_default();
    assert_eq!(owners[0].kind, "KeptnWorkload");

    let wl: KeptnWorkload = h.get("podtato-frontend").await;
    assert_eq!(
        wl.status.unwrap_or_default().current_version.as_deref(),
        Some("1.0.0")
    );
}

#[test_log::test(tokio::test)]
async fn workload_version_bump_records_previous_version() {
    let h = Harness::new();
    let mut wl = workload("1.1.0");
    wl.status = Some(KeptnWorkloadStatus {
        current_version: Some("1.0.0".into()),
    });
    let wl = h.seed(wl).await;

    keptn_workload::reconcile(Arc::new(wl), h.ctx.clone())
        .await
        .unwrap();

    let wv: KeptnWorkloadVersion = h.get("podtato-frontend-1.1.0").await;
    assert_eq!(wv.spec.previous_version.as_deref(), Some("1.0.0"));
    let wl: KeptnWorkload = h.get("podtato-frontend").await;
    assert_eq!(
        wl.status.unwrap_or_default().current_version.as_deref(),
        Some("1.1.0")
    );
}

#[test_log::test(tokio::test)]
async fn workload_with_existing_version_is_left_alone() {
    let h = Harness::new();
    h.seed(workload_version("ReplicaSet", "frontend-rs")).await;
    let wl = h.seed(workload("1.0.0")).await;
    let writes = h.store.write_count().await;

    let action = keptn_workload::reconcile(Arc::new(wl), h.ctx.clone())
        .await
        .unwrap();

    assert_eq!(action, Action::await_change());
    assert_eq!(h.store.write_count().await, writes);
    assert!(h.events.all().is_empty());
}

#[test_log::test(tokio::test)]
async fn created_workload_version_is_seen_by_app_rollup() {
    let h = Harness::new();
    let mut av = h.seed(with_frontend(app_version("podtato-0.1.0-6b86b273"))).await;
    let wl = h.seed(workload("1.0.0")).await;
    keptn_workload::reconcile(Arc::new(wl), h.ctx.clone())
        .await
        .unwrap();

    let mut wv: KeptnWorkloadVersion = h.get("podtato-frontend-1.0.0").await;
    wv.set_state(KeptnState::Succeeded);
    h.store.update_status(&wv).await.unwrap();

    let state = WorkloadRollup::new(&h.ctx)
        .reconcile(&mut av, &Context::new())
        .await
        .unwrap();
    assert_eq!(state, KeptnState::Succeeded);
}
