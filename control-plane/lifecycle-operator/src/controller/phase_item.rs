//! Capability set shared by the resources that walk through lifecycle phases.

use std::collections::BTreeMap;

use kube::{Resource, ResourceExt, api::DynamicObject};

use super::ReconcileErr;
use crate::crd::common::{API_GROUP, LABEL_APP, LABEL_VERSION, LABEL_WORKLOAD, TraceCarrier, now};
use crate::crd::{
    CheckType, ItemStatus, KeptnAppVersion, KeptnAppVersionStatus,
    KeptnEvaluation, KeptnEvaluationDefinition, KeptnEvaluationSpec, KeptnState,
    KeptnTask, KeptnTaskDefinition, KeptnTaskSpec, KeptnWorkloadVersion,
    KeptnWorkloadVersionStatus, TaskContext,
};
use crate::lifecycle::KeptnPhase;
use crate::lifecycle::naming::{generate_evaluation_name, generate_task_name};
use crate::store::KubeObject;
use crate::telemetry::SpanItem;

/// A resource the phase handler and the task/evaluation engines can drive.
pub trait PhaseItem: KubeObject + SpanItem {
    /// `App` or `Workload`; copied into generated tasks.
    fn object_type(&self) -> &'static str;
    fn state(&self) -> KeptnState;
    fn set_state(&mut self, state: KeptnState);
    fn current_phase(&self) -> &str;
    fn set_current_phase(&mut self, phase: &str);
    fn version(&self) -> &str;
    fn app_name(&self) -> &str;
    /// Empty for app-scoped resources.
    fn workload_name(&self) -> &str;
    fn previous_version(&self) -> Option<&str>;
    fn trace_id(&self) -> &TraceCarrier;

    fn start_time(&self) -> Option<&str>;
    fn end_time(&self) -> Option<&str>;
    fn set_start_time(&mut self);
    /// Stamp the end time of the whole resource.
    fn complete(&mut self);

    /// Definition names requested for `check`.
    fn requested(&self, check: CheckType) -> &[String];
    fn item_statuses(&self, check: CheckType) -> &[ItemStatus];
    fn set_item_statuses(&mut self, check: CheckType, statuses: Vec<ItemStatus>);
    fn check_state(&self, check: CheckType) -> KeptnState;
    fn set_check_state(&mut self, check: CheckType, state: KeptnState);

    /// Mark every phase after `phase` as deprecated and set the aggregate
    /// state accordingly.
    fn deprecate_remaining_phases(&mut self, phase: KeptnPhase);

    fn is_end_time_set(&self) -> bool {
        self.end_time().is_some()
    }

    fn child_labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::from([
            (LABEL_APP.to_string(), self.app_name().to_string()),
            (LABEL_VERSION.to_string(), self.version().to_string()),
        ]);
        if !self.workload_name().is_empty() {
            labels.insert(LABEL_WORKLOAD.to_string(), self.workload_name().to_string());
        }
        labels
    }

    /// Task run for `definition`, owned by this resource.
    fn generate_task(
        &self,
        definition: &KeptnTaskDefinition,
        check: CheckType,
    ) -> KeptnTask {
        let definition_name = definition.name_any();
        let (app_version, workload_version) = if self.workload_name().is_empty() {
            (self.version().to_string(), String::new())
        } else {
            (String::new(), self.version().to_string())
        };
        let mut task = KeptnTask::new(
            &generate_task_name(check, &definition_name),
            KeptnTaskSpec {
                task_definition: definition_name,
                context: TaskContext {
                    workload_name: self.workload_name().to_string(),
                    app_name: self.app_name().to_string(),
                    app_version,
                    workload_version,
                    task_type: check.to_string(),
                    object_type: self.object_type().to_string(),
                },
                parameters: definition.spec.parameters.clone(),
                check_type: Some(check),
                retries: definition.spec.retries,
                timeout: definition.spec.timeout.clone(),
            },
        );
        task.metadata.namespace = self.namespace();
        task.metadata.labels = Some(self.child_labels());
        task.metadata.owner_references =
            Some(self.controller_owner_ref(&()).into_iter().collect());
        task
    }

    /// Evaluation run for `definition`, owned by this resource.
    fn generate_evaluation(
        &self,
        definition: &KeptnEvaluationDefinition,
        check: CheckType,
    ) -> KeptnEvaluation {
        let definition_name = definition.name_any();
        let (app_version, workload_version) = if self.workload_name().is_empty() {
            (self.version().to_string(), String::new())
        } else {
            (String::new(), self.version().to_string())
        };
        let mut evaluation = KeptnEvaluation::new(
            &generate_evaluation_name(check, &definition_name),
            KeptnEvaluationSpec {
                workload: self.workload_name().to_string(),
                workload_version,
                app_name: self.app_name().to_string(),
                app_version,
                evaluation_definition: definition_name,
                check_type: Some(check),
                retries: definition.spec.retries,
                retry_interval: definition.spec.retry_interval.clone(),
            },
        );
        evaluation.metadata.namespace = self.namespace();
        evaluation.metadata.labels = Some(self.child_labels());
        evaluation.metadata.owner_references =
            Some(self.controller_owner_ref(&()).into_iter().collect());
        evaluation
    }
}

/// Check type driven by a task or evaluation phase.
pub fn check_type_for(phase: KeptnPhase) -> Option<CheckType> {
    if phase.is_pre_task() {
        Some(CheckType::PreDeployment)
    } else if phase.is_post_task() {
        Some(CheckType::PostDeployment)
    } else if phase.is_pre_evaluation() {
        Some(CheckType::PreDeploymentEvaluation)
    } else if phase.is_post_evaluation() {
        Some(CheckType::PostDeploymentEvaluation)
    } else {
        None
    }
}

/// Phase statuses in lifecycle order, plus the aggregate.
struct PhaseStates<'a> {
    pre_deployment: &'a mut KeptnState,
    pre_evaluation: &'a mut KeptnState,
    deployment: &'a mut KeptnState,
    post_deployment: &'a mut KeptnState,
    post_evaluation: &'a mut KeptnState,
    overall: &'a mut KeptnState,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Stage {
    PreDeployment,
    PreEvaluation,
    Deployment,
    PostDeployment,
    PostEvaluation,
}

fn stage_of(phase: KeptnPhase) -> Option<Stage> {
    if phase.is_pre_task() {
        Some(Stage::PreDeployment)
    } else if phase.is_pre_evaluation() {
        Some(Stage::PreEvaluation)
    } else if phase == KeptnPhase::APP_DEPLOYMENT
        || phase == KeptnPhase::WORKLOAD_DEPLOYMENT
    {
        Some(Stage::Deployment)
    } else if phase.is_post_task() {
        Some(Stage::PostDeployment)
    } else if phase.is_post_evaluation() {
        Some(Stage::PostEvaluation)
    } else {
        None
    }
}

fn deprecate(state: &mut KeptnState) {
    *state = KeptnState::Deprecated;
}

impl PhaseStates<'_> {
    fn deprecate_after(self, phase: KeptnPhase) {
        if phase == KeptnPhase::DEPRECATED {
            for state in [
                self.pre_deployment,
                self.pre_evaluation,
                self.deployment,
                self.post_deployment,
                self.post_evaluation,
            ] {
                if !state.is_completed() {
                    deprecate(state);
                }
            }
            *self.overall = KeptnState::Deprecated;
            return;
        }

        match stage_of(phase) {
            Some(Stage::PreDeployment) => {
                deprecate(self.pre_evaluation);
                deprecate(self.deployment);
                deprecate(self.post_deployment);
                deprecate(self.post_evaluation);
            }
            Some(Stage::PreEvaluation) => {
                deprecate(self.deployment);
                deprecate(self.post_deployment);
                deprecate(self.post_evaluation);
            }
            Some(Stage::Deployment) => {
                deprecate(self.post_deployment);
                deprecate(self.post_evaluation);
            }
            Some(Stage::PostDeployment) => deprecate(self.post_evaluation),
            Some(Stage::PostEvaluation) | None => {}
        }
        *self.overall = KeptnState::Failed;
    }
}

macro_rules! check_fields {
    ($status:expr, $check:expr) => {
        match $check {
            CheckType::PreDeployment => {
                (&mut $status.pre_deployment_status, &mut $status.pre_deployment_task_status)
            }
            CheckType::PostDeployment => {
                (&mut $status.post_deployment_status, &mut $status.post_deployment_task_status)
            }
            CheckType::PreDeploymentEvaluation => (
                &mut $status.pre_deployment_evaluation_status,
                &mut $status.pre_deployment_evaluation_task_status,
            ),
            CheckType::PostDeploymentEvaluation => (
                &mut $status.post_deployment_evaluation_status,
                &mut $status.post_deployment_evaluation_task_status,
            ),
        }
    };
}

fn app_check_state(status: &KeptnAppVersionStatus, check: CheckType) -> KeptnState {
    match check {
        CheckType::PreDeployment => status.pre_deployment_status,
        CheckType::PostDeployment => status.post_deployment_status,
        CheckType::PreDeploymentEvaluation => status.pre_deployment_evaluation_status,
        CheckType::PostDeploymentEvaluation => status.post_deployment_evaluation_status,
    }
}

fn app_item_statuses(status: &KeptnAppVersionStatus, check: CheckType) -> &[ItemStatus] {
    match check {
        CheckType::PreDeployment => &status.pre_deployment_task_status,
        CheckType::PostDeployment => &status.post_deployment_task_status,
        CheckType::PreDeploymentEvaluation => &status.pre_deployment_evaluation_task_status,
        CheckType::PostDeploymentEvaluation => &status.post_deployment_evaluation_task_status,
    }
}

fn workload_check_state(
    status: &KeptnWorkloadVersionStatus,
    check: CheckType,
) -> KeptnState {
    match check {
        CheckType::PreDeployment => status.pre_deployment_status,
        CheckType::PostDeployment => status.post_deployment_status,
        CheckType::PreDeploymentEvaluation => status.pre_deployment_evaluation_status,
        CheckType::PostDeploymentEvaluation => status.post_deployment_evaluation_status,
    }
}

fn workload_item_statuses(
    status: &KeptnWorkloadVersionStatus,
    check: CheckType,
) -> &[ItemStatus] {
    match check {
        CheckType::PreDeployment => &status.pre_deployment_task_status,
        CheckType::PostDeployment => &status.post_deployment_task_status,
        CheckType::PreDeploymentEvaluation => &status.pre_deployment_evaluation_task_status,
        CheckType::PostDeploymentEvaluation => &status.post_deployment_evaluation_task_status,
    }
}

fn requested_checks<'a>(
    check: CheckType,
    pre_tasks: &'a [String],
    post_tasks: &'a [String],
    pre_evaluations: &'a [String],
    post_evaluations: &'a [String],
) -> &'a [String] {
    match check {
        CheckType::PreDeployment => pre_tasks,
        CheckType::PostDeployment => post_tasks,
        CheckType::PreDeploymentEvaluation => pre_evaluations,
        CheckType::PostDeploymentEvaluation => post_evaluations,
    }
}

impl PhaseItem for KeptnAppVersion {
    fn object_type(&self) -> &'static str {
        "App"
    }

    fn state(&self) -> KeptnState {
        self.status.as_ref().map(|s| s.status).unwrap_or_default()
    }

    fn set_state(&mut self, state: KeptnState) {
        self.status.get_or_insert_with(Default::default).status = state;
    }

    fn current_phase(&self) -> &str {
        self.status
            .as_ref()
            .map(|s| s.current_phase.as_str())
            .unwrap_or_default()
    }

    fn set_current_phase(&mut self, phase: &str) {
        self.status.get_or_insert_with(Default::default).current_phase =
            phase.to_string();
    }

    fn version(&self) -> &str {
        &self.spec.version
    }

    fn app_name(&self) -> &str {
        &self.spec.app_name
    }

    fn workload_name(&self) -> &str {
        ""
    }

    fn previous_version(&self) -> Option<&str> {
        self.spec.previous_version.as_deref()
    }

    fn trace_id(&self) -> &TraceCarrier {
        &self.spec.trace_id
    }

    fn start_time(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.start_time.as_deref())
    }

    fn end_time(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.end_time.as_deref())
    }

    fn set_start_time(&mut self) {
        let status = self.status.get_or_insert_with(Default::default);
        if status.start_time.is_none() {
            status.start_time = Some(now());
        }
    }

    fn complete(&mut self) {
        let status = self.status.get_or_insert_with(Default::default);
        if status.end_time.is_none() {
            status.end_time = Some(now());
        }
    }

    fn requested(&self, check: CheckType) -> &[String] {
        requested_checks(
            check,
            &self.spec.pre_deployment_tasks,
            &self.spec.post_deployment_tasks,
            &self.spec.pre_deployment_evaluations,
            &self.spec.post_deployment_evaluations,
        )
    }

    fn item_statuses(&self, check: CheckType) -> &[ItemStatus] {
        self.status
            .as_ref()
            .map(|s| app_item_statuses(s, check))
            .unwrap_or_default()
    }

    fn set_item_statuses(&mut self, check: CheckType, statuses: Vec<ItemStatus>) {
        let status = self.status.get_or_insert_with(Default::default);
        *check_fields!(status, check).1 = statuses;
    }

    fn check_state(&self, check: CheckType) -> KeptnState {
        self.status
            .as_ref()
            .map(|s| app_check_state(s, check))
            .unwrap_or_default()
    }

    fn set_check_state(&mut self, check: CheckType, state: KeptnState) {
        let status = self.status.get_or_insert_with(Default::default);
        *check_fields!(status, check).0 = state;
    }

    fn deprecate_remaining_phases(&mut self, phase: KeptnPhase) {
        let s = self.status.get_or_insert_with(Default::default);
        PhaseStates {
            pre_deployment: &mut s.pre_deployment_status,
            pre_evaluation: &mut s.pre_deployment_evaluation_status,
            deployment: &mut s.workload_overall_status,
            post_deployment: &mut s.post_deployment_status,
            post_evaluation: &mut s.post_deployment_evaluation_status,
            overall: &mut s.status,
        }
        .deprecate_after(phase);
    }
}

impl PhaseItem for KeptnWorkloadVersion {
    fn object_type(&self) -> &'static str {
        "Workload"
    }

    fn state(&self) -> KeptnState {
        self.status.as_ref().map(|s| s.status).unwrap_or_default()
    }

    fn set_state(&mut self, state: KeptnState) {
        self.status.get_or_insert_with(Default::default).status = state;
    }

    fn current_phase(&self) -> &str {
        self.status
            .as_ref()
            .map(|s| s.current_phase.as_str())
            .unwrap_or_default()
    }

    fn set_current_phase(&mut self, phase: &str) {
        self.status.get_or_insert_with(Default::default).current_phase =
            phase.to_string();
    }

    fn version(&self) -> &str {
        &self.spec.version
    }

    fn app_name(&self) -> &str {
        &self.spec.app
    }

    fn workload_name(&self) -> &str {
        &self.spec.workload_name
    }

    fn previous_version(&self) -> Option<&str> {
        self.spec.previous_version.as_deref()
    }

    fn trace_id(&self) -> &TraceCarrier {
        &self.spec.trace_id
    }

    fn start_time(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.start_time.as_deref())
    }

    fn end_time(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.end_time.as_deref())
    }

    fn set_start_time(&mut self) {
        let status = self.status.get_or_insert_with(Default::default);
        if status.start_time.is_none() {
            status.start_time = Some(now());
        }
    }

    fn complete(&mut self) {
        let status = self.status.get_or_insert_with(Default::default);
        if status.end_time.is_none() {
            status.end_time = Some(now());
        }
    }

    fn requested(&self, check: CheckType) -> &[String] {
        requested_checks(
            check,
            &self.spec.pre_deployment_tasks,
            &self.spec.post_deployment_tasks,
            &self.spec.pre_deployment_evaluations,
            &self.spec.post_deployment_evaluations,
        )
    }

    fn item_statuses(&self, check: CheckType) -> &[ItemStatus] {
        self.status
            .as_ref()
            .map(|s| workload_item_statuses(s, check))
            .unwrap_or_default()
    }

    fn set_item_statuses(&mut self, check: CheckType, statuses: Vec<ItemStatus>) {
        let status = self.status.get_or_insert_with(Default::default);
        *check_fields!(status, check).1 = statuses;
    }

    fn check_state(&self, check: CheckType) -> KeptnState {
        self.status
            .as_ref()
            .map(|s| workload_check_state(s, check))
            .unwrap_or_default()
    }

    fn set_check_state(&mut self, check: CheckType, state: KeptnState) {
        let status = self.status.get_or_insert_with(Default::default);
        *check_fields!(status, check).0 = state;
    }

    fn deprecate_remaining_phases(&mut self, phase: KeptnPhase) {
        let s = self.status.get_or_insert_with(Default::default);
        PhaseStates {
            pre_deployment: &mut s.pre_deployment_status,
            pre_evaluation: &mut s.pre_deployment_evaluation_status,
            deployment: &mut s.deployment_status,
            post_deployment: &mut s.post_deployment_status,
            post_evaluation: &mut s.post_deployment_evaluation_status,
            overall: &mut s.status,
        }
        .deprecate_after(phase);
    }
}

/// A phase-driven resource received without static type information.
#[derive(Clone, Debug)]
pub enum PhaseResource {
    AppVersion(Box<KeptnAppVersion>),
    WorkloadVersion(Box<KeptnWorkloadVersion>),
}

impl PhaseResource {
    pub fn kind(&self) -> &'static str {
        match self {
            PhaseResource::AppVersion(_) => "KeptnAppVersion",
            PhaseResource::WorkloadVersion(_) => "KeptnWorkloadVersion",
        }
    }
}

/// Narrow a dynamic object to one of the kinds implementing [`PhaseItem`].
pub fn from_dynamic(obj: DynamicObject) -> Result<PhaseResource, ReconcileErr> {
    let kind = obj
        .types
        .as_ref()
        .map(|t| t.kind.clone())
        .unwrap_or_default();
    let is_kind = |expected: &str| {
        obj.types
            .as_ref()
            .is_some_and(|t| t.kind == expected && t.api_version.starts_with(API_GROUP))
    };

    if is_kind(&KeptnAppVersion::kind(&())) {
        let parsed = obj.try_parse::<KeptnAppVersion>().map_err(|e| {
            ReconcileErr::UnsupportedResource(format!("{kind}: {e}"))
        })?;
        Ok(PhaseResource::AppVersion(Box::new(parsed)))
    } else if is_kind(&KeptnWorkloadVersion::kind(&())) {
        let parsed = obj.try_parse::<KeptnWorkloadVersion>().map_err(|e| {
            ReconcileErr::UnsupportedResource(format!("{kind}: {e}"))
        })?;
        Ok(PhaseResource::WorkloadVersion(Box::new(parsed)))
    } else {
        Err(ReconcileErr::UnsupportedResource(format!(
            "'{}' of kind '{kind}' does not walk through lifecycle phases",
            obj.name_any()
        )))
    }
}
