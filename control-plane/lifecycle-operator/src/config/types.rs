use std::time::Duration;

use envconfig::Envconfig;

use crate::lifecycle::DeploymentPolicy;

#[derive(Envconfig, Clone, Debug)]
pub struct OperatorConfig {
    /// Namespace searched for task/evaluation definitions not found next to
    /// the resource.
    /// Env: KLT_DEFAULT_NAMESPACE
    #[envconfig(
        from = "KLT_DEFAULT_NAMESPACE",
        default = "keptn-lifecycle-toolkit-system"
    )]
    pub default_namespace: String,

    /// When false, failed pre-deployment checks do not block the deployment.
    #[envconfig(from = "KLT_BLOCK_DEPLOYMENT", default = "true")]
    pub block_deployment: bool,

    #[envconfig(from = "KLT_CLOUDEVENTS_ENDPOINT")]
    pub cloud_events_endpoint: Option<String>,

    /// How long a workload may take to become ready before its deploy phase
    /// fails.
    #[envconfig(from = "KLT_OBSERVABILITY_TIMEOUT_SECS", default = "300")]
    pub observability_timeout_secs: u64,

    #[envconfig(from = "KLT_REQUEUE_SECS", default = "5")]
    pub requeue_secs: u64,

    #[envconfig(nested)]
    pub telemetry: TelemetryConfig,
}

#[derive(Envconfig, Clone, Debug)]
pub struct TelemetryConfig {
    /// OTLP endpoint for lifecycle spans; spans are not exported when unset
    #[envconfig(from = "OTEL_COLLECTOR_URL")]
    pub collector_url: Option<String>,

    #[envconfig(from = "OTEL_SERVICE_NAME", default = "lifecycle-operator")]
    pub service_name: String,
}

impl OperatorConfig {
    pub fn requeue_after(&self) -> Duration {
        Duration::from_secs(self.requeue_secs)
    }

    pub fn observability_timeout(&self) -> Duration {
        Duration::from_secs(self.observability_timeout_secs)
    }

    pub fn deployment_policy(&self) -> DeploymentPolicy {
        DeploymentPolicy::from_flag(self.block_deployment)
    }

    /// CloudEvents sink, only when it looks like an http(s) URL.
    pub fn cloud_events_target(&self) -> Option<&str> {
        super::http_endpoint(self.cloud_events_endpoint.as_deref())
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            default_namespace: "keptn-lifecycle-toolkit-system".to_string(),
            block_deployment: true,
            cloud_events_endpoint: None,
            observability_timeout_secs: 300,
            requeue_secs: 5,
            telemetry: TelemetryConfig {
                collector_url: None,
                service_name: "lifecycle-operator".to_string(),
            },
        }
    }
}
