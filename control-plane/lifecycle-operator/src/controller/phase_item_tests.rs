use std::collections::BTreeMap;

use kube::api::{DynamicObject, ObjectMeta, TypeMeta};

use crate::controller::PhaseItem;
use crate::controller::phase_item::{PhaseResource, check_type_for, from_dynamic};
use crate::crd::common::{LABEL_APP, LABEL_VERSION, LABEL_WORKLOAD};
use crate::crd::{
    CheckType, KeptnAppVersion, KeptnAppVersionSpec, KeptnEvaluationDefinition,
    KeptnEvaluationDefinitionSpec, KeptnState, KeptnTaskDefinition,
    KeptnTaskDefinitionSpec, KeptnWorkloadVersion, KeptnWorkloadVersionSpec,
};
use crate::lifecycle::KeptnPhase;

fn app_version() -> KeptnAppVersion {
    let mut av = KeptnAppVersion::new(
        "podtato-0.1.0-6b86b273",
        KeptnAppVersionSpec {
            app_name: "podtato".into(),
            version: "0.1.0".into(),
            ..Default::default()
        },
    );
    av.metadata.namespace = Some("demo".into());
    av.metadata.uid = Some("uid-av".into());
    av
}

fn workload_version() -> KeptnWorkloadVersion {
    let mut wv = KeptnWorkloadVersion::new(
        "podtato-frontend-0.1.0",
        KeptnWorkloadVersionSpec {
            app: "podtato".into(),
            workload_name: "podtato-frontend".into(),
            version: "0.1.0".into(),
            ..Default::default()
        },
    );
    wv.metadata.namespace = Some("demo".into());
    wv.metadata.uid = Some("uid-wv".into());
    wv
}

fn states(wv: &KeptnWorkloadVersion) -> [KeptnState; 6] {
    let s = wv.status.clone().unwrap_or_default();
    [
        s.pre_deployment_status,
        s.pre_deployment_evaluation_status,
        s.deployment_status,
        s.post_deployment_status,
        s.post_deployment_evaluation_status,
        s.status,
    ]
}

#[test]
fn failure_deprecates_following_phases() {
    use KeptnState::*;
    let cases = [
        (
            KeptnPhase::WORKLOAD_PRE_DEPLOYMENT,
            [Pending, Deprecated, Deprecated, Deprecated, Deprecated, Failed],
        ),
        (
            KeptnPhase::WORKLOAD_PRE_EVALUATION,
            [Pending, Pending, Deprecated, Deprecated, Deprecated, Failed],
        ),
        (
            KeptnPhase::WORKLOAD_DEPLOYMENT,
            [Pending, Pending, Pending, Deprecated, Deprecated, Failed],
        ),
        (
            KeptnPhase::WORKLOAD_POST_DEPLOYMENT,
            [Pending, Pending, Pending, Pending, Deprecated, Failed],
        ),
        (
            KeptnPhase::WORKLOAD_POST_EVALUATION,
            [Pending, Pending, Pending, Pending, Pending, Failed],
        ),
    ];

    for (phase, expected) in cases {
        let mut wv = workload_version();
        wv.deprecate_remaining_phases(phase);
        assert_eq!(states(&wv), expected, "after {phase}");
    }
}

#[test]
fn deprecated_phase_keeps_completed_history() {
    let mut wv = workload_version();
    wv.set_check_state(CheckType::PreDeployment, KeptnState::Succeeded);
    wv.set_check_state(CheckType::PreDeploymentEvaluation, KeptnState::Failed);
    wv.deprecate_remaining_phases(KeptnPhase::DEPRECATED);

    use KeptnState::*;
    assert_eq!(
        states(&wv),
        [Succeeded, Failed, Deprecated, Deprecated, Deprecated, Deprecated]
    );
}

#[test]
fn app_deploy_failure_deprecates_post_phases() {
    let mut av = app_version();
    av.deprecate_remaining_phases(KeptnPhase::APP_DEPLOYMENT);
    let status = av.status.unwrap_or_default();
    assert_eq!(status.workload_overall_status, KeptnState::Pending);
    assert_eq!(status.post_deployment_status, KeptnState::Deprecated);
    assert_eq!(status.post_deployment_evaluation_status, KeptnState::Deprecated);
    assert_eq!(status.status, KeptnState::Failed);
}

#[test]
fn check_types_of_phases() {
    assert_eq!(
        check_type_for(KeptnPhase::APP_PRE_DEPLOYMENT),
        Some(CheckType::PreDeployment)
    );
    assert_eq!(
        check_type_for(KeptnPhase::WORKLOAD_POST_DEPLOYMENT),
        Some(CheckType::PostDeployment)
    );
    assert_eq!(
        check_type_for(KeptnPhase::WORKLOAD_PRE_EVALUATION),
        Some(CheckType::PreDeploymentEvaluation)
    );
    assert_eq!(
        check_type_for(KeptnPhase::APP_POST_EVALUATION),
        Some(CheckType::PostDeploymentEvaluation)
    );
    assert_eq!(check_type_for(KeptnPhase::APP_DEPLOYMENT), None);
    assert_eq!(check_type_for(KeptnPhase::RECONCILE_TASK), None);
}

#[test]
fn generated_task_is_owned_and_labelled() {
    let wv = workload_version();
    let mut definition = KeptnTaskDefinition::new(
        "task-def",
        KeptnTaskDefinitionSpec {
            retries: Some(3),
            timeout: Some("2m".into()),
            parameters: BTreeMap::from([("env".to_string(), "prod".to_string())]),
        },
    );
    definition.metadata.namespace = Some("keptn-lifecycle-toolkit-system".into());

    let task = wv.generate_task(&definition, CheckType::PreDeployment);

    let name = task.metadata.name.clone().unwrap_or_default();
    assert!(name.starts_with("pre-task-def-"), "{name}");
    assert_eq!(task.metadata.namespace.as_deref(), Some("demo"));
    assert_eq!(task.spec.task_definition, "task-def");
    assert_eq!(task.spec.retries, Some(3));
    assert_eq!(task.spec.timeout.as_deref(), Some("2m"));
    assert_eq!(task.spec.parameters.get("env").map(String::as_str), Some("prod"));
    assert_eq!(task.spec.context.object_type, "Workload");
    assert_eq!(task.spec.context.task_type, "pre");
    assert_eq!(task.spec.context.workload_version, "0.1.0");
    assert!(task.spec.context.app_version.is_empty());

    let labels = task.metadata.labels.clone().unwrap_or_default();
    assert_eq!(labels.get(LABEL_APP).map(String::as_str), Some("podtato"));
    assert_eq!(labels.get(LABEL_VERSION).map(String::as_str), Some("0.1.0"));
    assert_eq!(
        labels.get(LABEL_WORKLOAD).map(String::as_str),
        Some("podtato-frontend")
    );

    let owners = task.metadata.owner_references.unwrap_or_default();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].kind, "KeptnWorkloadVersion");
    assert_eq!(owners[0].uid, "uid-wv");
    assert_eq!(owners[0].controller, Some(true));
}

#[test]
fn generated_app_evaluation_has_no_workload_label() {
    let av = app_version();
    let definition = KeptnEvaluationDefinition::new(
        "slo",
        KeptnEvaluationDefinitionSpec::default(),
    );

    let evaluation = av.generate_evaluation(&definition, CheckType::PostDeploymentEvaluation);

    let name = evaluation.metadata.name.clone().unwrap_or_default();
    assert!(name.starts_with("post-eval-slo-"), "{name}");
    assert_eq!(evaluation.spec.app_version, "0.1.0");
    assert_eq!(evaluation.spec.evaluation_definition, "slo");
    assert_eq!(
        evaluation.spec.check_type,
        Some(CheckType::PostDeploymentEvaluation)
    );
    let labels = evaluation.metadata.labels.unwrap_or_default();
    assert!(!labels.contains_key(LABEL_WORKLOAD));
}

#[test]
fn dynamic_app_version_is_narrowed() {
    let av = app_version();
    let obj = DynamicObject {
        types: Some(TypeMeta {
            api_version: "lifecycle.keptn.sh/v1".into(),
            kind: "KeptnAppVersion".into(),
        }),
        metadata: av.metadata.clone(),
        data: serde_json::json!({ "spec": av.spec }),
    };

    match from_dynamic(obj) {
        Ok(PhaseResource::AppVersion(parsed)) => {
            assert_eq!(parsed.spec.app_name, "podtato");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn dynamic_object_of_other_kind_is_rejected() {
    let obj = DynamicObject {
        types: Some(TypeMeta {
            api_version: "apps/v1".into(),
            kind: "Deployment".into(),
        }),
        metadata: ObjectMeta {
            name: Some("frontend".into()),
            ..Default::default()
        },
        data: serde_json::json!({}),
    };

    let err = from_dynamic(obj).unwrap_err();
    assert!(err.to_string().contains("Deployment"), "{err}");
}
