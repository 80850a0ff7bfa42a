use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Operator settings that can change without a restart.
///
/// Unset fields fall back to the value the operator was started with.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "options.keptn.sh",
    version = "v1alpha1",
    kind = "KeptnConfig",
    plural = "keptnconfigs",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct KeptnConfigSpec {
    /// OTLP collector for lifecycle spans. Empty disables export.
    #[serde(rename = "OTelCollectorUrl", skip_serializing_if = "Option::is_none")]
    pub otel_collector_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_events_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_deployment: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability_timeout_seconds: Option<u64>,
}
