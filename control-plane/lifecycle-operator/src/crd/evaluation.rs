use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{CheckType, KeptnState};

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "lifecycle.keptn.sh",
    version = "v1",
    kind = "KeptnEvaluation",
    plural = "keptnevaluations",
    namespaced,
    status = "KeptnEvaluationStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct KeptnEvaluationSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workload: String,
    #[serde(default)]
    pub workload_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_version: String,
    pub evaluation_definition: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_type: Option<CheckType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_interval: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeptnEvaluationStatus {
    #[serde(default)]
    pub retry_count: i32,
    /// Result per objective, keyed by metric name
    #[serde(default)]
    pub evaluation_status: BTreeMap<String, EvaluationStatusItem>,
    #[serde(default)]
    pub overall_status: KeptnState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct EvaluationStatusItem {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub status: KeptnState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl KeptnEvaluation {
    pub fn state(&self) -> KeptnState {
        self.status
            .as_ref()
            .map(|s| s.overall_status)
            .unwrap_or_default()
    }

    /// Objectives that reported `Failed`, in key order.
    pub fn failed_objectives(&self) -> Vec<(&str, &EvaluationStatusItem)> {
        self.status
            .iter()
            .flat_map(|s| s.evaluation_status.iter())
            .filter(|(_, item)| item.status.is_failed())
            .map(|(k, item)| (k.as_str(), item))
            .collect()
    }
}

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "lifecycle.keptn.sh",
    version = "v1",
    kind = "KeptnEvaluationDefinition",
    plural = "keptnevaluationdefinitions",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct KeptnEvaluationDefinitionSpec {
    #[serde(default)]
    pub objectives: Vec<Objective>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_interval: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Objective {
    pub key_metric_ref: MetricReference,
    /// Target expression, e.g. "<500"
    pub evaluation_target: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct MetricReference {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}
