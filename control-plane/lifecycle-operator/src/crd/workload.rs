use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::workload_version::ResourceReference;

/// A workload of an app, as discovered next to its pod owner.
///
/// Every version it reports gets its own [`KeptnWorkloadVersion`].
///
/// [`KeptnWorkloadVersion`]: super::KeptnWorkloadVersion
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "lifecycle.keptn.sh",
    version = "v1",
    kind = "KeptnWorkload",
    plural = "keptnworkloads",
    shortname = "kwl",
    namespaced,
    status = "KeptnWorkloadStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct KeptnWorkloadSpec {
    pub app: String,
    pub version: String,
    pub resource_reference: ResourceReference,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_deployment_tasks: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_deployment_tasks: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_deployment_evaluations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_deployment_evaluations: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeptnWorkloadStatus {
    /// Version a workload version was last created for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_version: Option<String>,
}
