use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{
    ItemStatus, KeptnState, PhaseTraceIds, TraceCarrier, WorkloadRef,
    WorkloadStatus,
};

/// One immutable revision of a `KeptnApp`, created per app generation.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "lifecycle.keptn.sh",
    version = "v1",
    kind = "KeptnAppVersion",
    plural = "keptnappversions",
    shortname = "kav",
    namespaced,
    status = "KeptnAppVersionStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct KeptnAppVersionSpec {
    pub app_name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workloads: Vec<WorkloadRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_deployment_tasks: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_deployment_tasks: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_deployment_evaluations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_deployment_evaluations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
    /// Trace context of the app reconcile that created this revision
    #[serde(default, skip_serializing_if = "TraceCarrier::is_empty")]
    pub trace_id: TraceCarrier,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeptnAppVersionStatus {
    #[serde(default)]
    pub pre_deployment_status: KeptnState,
    #[serde(default)]
    pub post_deployment_status: KeptnState,
    #[serde(default)]
    pub pre_deployment_evaluation_status: KeptnState,
    #[serde(default)]
    pub post_deployment_evaluation_status: KeptnState,
    /// Rolled-up state of every workload version of this revision
    #[serde(default)]
    pub workload_overall_status: KeptnState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workload_status: Vec<WorkloadStatus>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub current_phase: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_deployment_task_status: Vec<ItemStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_deployment_task_status: Vec<ItemStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_deployment_evaluation_task_status: Vec<ItemStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_deployment_evaluation_task_status: Vec<ItemStatus>,
    #[serde(
        default,
        rename = "phaseTraceIDs",
        skip_serializing_if = "PhaseTraceIds::is_empty"
    )]
    pub phase_trace_ids: PhaseTraceIds,
    /// Aggregate state of the whole revision
    #[serde(default)]
    pub status: KeptnState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

impl KeptnAppVersion {
    /// Name of the workload version backing `workload` in this revision.
    pub fn workload_version_name(&self, workload: &WorkloadRef) -> String {
        format!("{}-{}-{}", self.spec.app_name, workload.name, workload.version)
    }
}
