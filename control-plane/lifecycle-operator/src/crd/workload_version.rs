use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{ItemStatus, KeptnState, PhaseTraceIds, TraceCarrier};

/// One revision of a workload belonging to an app version.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "lifecycle.keptn.sh",
    version = "v1",
    kind = "KeptnWorkloadVersion",
    plural = "keptnworkloadversions",
    shortname = "kwv",
    namespaced,
    status = "KeptnWorkloadVersionStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct KeptnWorkloadVersionSpec {
    /// App the workload belongs to
    pub app: String,
    pub workload_name: String,
    pub version: String,
    /// The pod owner (ReplicaSet, StatefulSet, DaemonSet) whose readiness
    /// decides the deploy phase
    pub resource_reference: ResourceReference,
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
    #[serde(default, skip_serializing_if = "TraceCarrier::is_empty")]
    pub trace_id: TraceCarrier,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceReference {
    #[serde(default)]
    pub uid: String,
    pub kind: String,
    pub name: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeptnWorkloadVersionStatus {
    #[serde(default)]
    pub pre_deployment_status: KeptnState,
    #[serde(default)]
    pub deployment_status: KeptnState,
    #[serde(default)]
    pub post_deployment_status: KeptnState,
    #[serde(default)]
    pub pre_deployment_evaluation_status: KeptnState,
    #[serde(default)]
    pub post_deployment_evaluation_status: KeptnState,
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
    #[serde(default)]
    pub status: KeptnState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    /// First time the deploy phase looked at the referenced resource
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_start_time: Option<String>,
}
