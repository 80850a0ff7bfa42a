use std::sync::Arc;

use keptn_observability::{TelemetryError, TracerFactory};
use kube::runtime::controller::Action;
use opentelemetry_sdk::trace::Tracer;
use tracing::warn;

use crate::config::{LiveOptions, OperatorConfig};
use crate::events::{EventSender, EventSubject, LifecycleEvent};
use crate::lifecycle::DeploymentPolicy;
use crate::store::{ObjectStore, StoreError};
use crate::telemetry::SpanStore;

pub mod app;
pub mod app_version;
pub mod config;
pub mod definition;
pub mod deprecation;
pub mod evaluation;
pub mod phase;
pub mod phase_item;
pub mod task;
pub mod workload;
pub mod workload_version;

#[cfg(test)]
mod phase_item_tests;

pub use phase::{PhaseHandler, PhaseReconciler, PhaseResult};
pub use phase_item::{PhaseItem, PhaseResource};

pub const TRACER_NAME: &str = "keptn/lifecycle-operator";

#[derive(thiserror::Error, Debug)]
pub enum ReconcileErr {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(
        "{kind} '{name}' found neither in '{namespace}' nor in '{default_namespace}'"
    )]
    DefinitionNotFound {
        kind: String,
        name: String,
        namespace: String,
        default_namespace: String,
    },
    #[error("unsupported resource: {0}")]
    UnsupportedResource(String),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ReconcileErr {
    pub fn is_definition_not_found(&self) -> bool {
        matches!(self, ReconcileErr::DefinitionNotFound { .. })
    }
}

/// Shared state of all lifecycle controllers.
pub struct ControllerContext<S> {
    pub store: S,
    pub events: Arc<dyn EventSender>,
    pub spans: Arc<SpanStore>,
    pub tracers: Arc<dyn TracerFactory>,
    pub cfg: OperatorConfig,
    /// Settings a `KeptnConfig` may change at runtime. Seeded from `cfg`.
    pub live: Arc<LiveOptions>,
}

impl<S: ObjectStore> ControllerContext<S> {
    pub fn new(
        store: S,
        events: Arc<dyn EventSender>,
        tracers: Arc<dyn TracerFactory>,
        cfg: OperatorConfig,
    ) -> Self {
        let live = Arc::new(LiveOptions::from_config(&cfg));
        Self::with_live(store, events, tracers, cfg, live)
    }

    /// Context sharing `live` with other consumers, e.g. the cloud event sink.
    pub fn with_live(
        store: S,
        events: Arc<dyn EventSender>,
        tracers: Arc<dyn TracerFactory>,
        cfg: OperatorConfig,
        live: Arc<LiveOptions>,
    ) -> Self {
        Self {
            store,
            events,
            spans: Arc::new(SpanStore::new()),
            tracers,
            cfg,
            live,
        }
    }

    pub fn tracer(&self) -> Tracer {
        self.tracers.tracer(TRACER_NAME)
    }

    pub async fn emit(&self, subject: &EventSubject, event: LifecycleEvent) {
        self.events.emit(subject, &event).await;
    }

    pub fn deployment_policy(&self) -> DeploymentPolicy {
        self.live.deployment_policy()
    }

    pub fn phase_handler(&self) -> PhaseHandler<'_, S> {
        PhaseHandler::new(self)
    }
}

/// Requeue after the configured delay on any reconcile error.
pub fn error_policy<K, S>(
    _obj: Arc<K>,
    err: &ReconcileErr,
    ctx: Arc<ControllerContext<S>>,
) -> Action {
    warn!(error = %err, "reconcile failed, requeueing");
    Action::requeue(ctx.cfg.requeue_after())
}
