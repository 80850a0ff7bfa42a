use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{CheckType, KeptnState};

/// A single run of a task definition. Executed by an external runner that
/// reports back through `status.status`.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "lifecycle.keptn.sh",
    version = "v1",
    kind = "KeptnTask",
    plural = "keptntasks",
    namespaced,
    status = "KeptnTaskStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct KeptnTaskSpec {
    pub task_definition: String,
    pub context: TaskContext,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_type: Option<CheckType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<i32>,
    /// Duration string such as "5m"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskContext {
    #[serde(default)]
    pub workload_name: String,
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub workload_version: String,
    /// "pre" or "post"
    #[serde(default)]
    pub task_type: String,
    /// "App" or "Workload"
    #[serde(default)]
    pub object_type: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeptnTaskStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    #[serde(default)]
    pub status: KeptnState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl KeptnTask {
    pub fn state(&self) -> KeptnState {
        self.status.as_ref().map(|s| s.status).unwrap_or_default()
    }

    pub fn failure_reason(&self) -> String {
        self.status
            .as_ref()
            .and_then(|s| s.reason.clone().or_else(|| s.message.clone()))
            .unwrap_or_default()
    }
}

/// Reusable description of a task. Looked up by name from the parent's
/// namespace first, then from the operator's default namespace.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "lifecycle.keptn.sh",
    version = "v1",
    kind = "KeptnTaskDefinition",
    plural = "keptntaskdefinitions",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct KeptnTaskDefinitionSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    /// Default parameters handed to every task run
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}
