use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::WorkloadRef;

/// A versioned application made of workloads, with checks around its rollout.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "lifecycle.keptn.sh",
    version = "v1",
    kind = "KeptnApp",
    plural = "keptnapps",
    shortname = "kapp",
    namespaced,
    status = "KeptnAppStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct KeptnAppSpec {
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workloads: Vec<WorkloadRef>,
    /// Task definitions to run before any workload is deployed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_deployment_tasks: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_deployment_tasks: Vec<String>,
    /// Evaluation definitions gating the deployment
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_deployment_evaluations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_deployment_evaluations: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeptnAppStatus {
    /// Name of the app version created for the latest generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
