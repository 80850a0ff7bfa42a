use std::sync::Arc;
use std::time::Duration;

use kube::{ResourceExt, runtime::controller::Action};
use tracing::{debug, info, instrument, warn};

use super::{ControllerContext, ReconcileErr};
use crate::config::LiveSettings;
use crate::crd::{KeptnConfig, KeptnConfigSpec};
use crate::store::ObjectStore;

/// Apply a `KeptnConfig` to the running operator: live settings first, then
/// the span exporter. A collector that cannot be set up fails the call and
/// the config is retried.
#[instrument(skip_all, fields(ns = %config.namespace().unwrap_or_default(), name = %config.name_any()))]
pub async fn reconcile<S: ObjectStore>(
    config: Arc<KeptnConfig>,
    ctx: Arc<ControllerContext<S>>,
) -> Result<Action, ReconcileErr> {
    let settings = settings_for(&config.spec, &ctx);
    if ctx.live.update(settings.clone()) {
        info!(
            block_deployment = settings.block_deployment,
            observability_timeout = ?settings.observability_timeout,
            cloud_events_endpoint = ?settings.cloud_events_endpoint,
            "live settings updated"
        );
    }

    let collector = config
        .spec
        .otel_collector_url
        .as_deref()
        .or(ctx.cfg.telemetry.collector_url.as_deref());
    match ctx.tracers.configure(collector) {
        Ok(true) => info!(collector = ?collector, "span exporter switched"),
        Ok(false) => debug!(collector = ?collector, "span exporter unchanged"),
        Err(e) => {
            warn!(error = %e, "could not set up span exporter");
            return Err(e.into());
        }
    }
    Ok(Action::await_change())
}

/// Settings requested by `spec`, with unset fields taken from the startup
/// configuration.
pub fn settings_for<S>(spec: &KeptnConfigSpec, ctx: &ControllerContext<S>) -> LiveSettings {
    let startup = &ctx.cfg;
    LiveSettings {
        block_deployment: spec.block_deployment.unwrap_or(startup.block_deployment),
        observability_timeout: spec
            .observability_timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or_else(|| startup.observability_timeout()),
        cloud_events_endpoint: spec
            .cloud_events_endpoint
            .clone()
            .or_else(|| startup.cloud_events_endpoint.clone()),
    }
}
