use std::sync::Arc;

use kube::{Resource, ResourceExt, runtime::controller::Action};
use opentelemetry::trace::{SpanKind, TraceContextExt, Tracer as _};
use tracing::{info, instrument, warn};

use super::deprecation::deprecate_previous_generations;
use super::{ControllerContext, ReconcileErr};
use crate::crd::{KeptnApp, KeptnAppVersion, KeptnAppVersionSpec};
use crate::events::{EventSubject, LifecycleEvent, REASON_FAILED, Severity};
use crate::lifecycle::KeptnPhase;
use crate::lifecycle::naming::app_version_name;
use crate::store::ObjectStore;

/// Make sure the current generation of an app has its app version, then
/// deprecate the versions of older generations.
#[instrument(skip_all, fields(ns = %app.namespace().unwrap_or_default(), name = %app.name_any()))]
pub async fn reconcile<S: ObjectStore>(
    app: Arc<KeptnApp>,
    ctx: Arc<ControllerContext<S>>,
) -> Result<Action, ReconcileErr> {
    let namespace = app.namespace().unwrap_or_default();
    let generation = app.metadata.generation.unwrap_or(1);
    let version_name = app_version_name(&app.name_any(), &app.spec.version, generation);

    if ctx
        .store
        .get_opt::<KeptnAppVersion>(&namespace, &version_name)
        .await?
        .is_some()
    {
        return Ok(Action::await_change());
    }

    let app_version = generate_app_version(&ctx, &app, &version_name);
    if let Err(e) = ctx.store.create(&app_version).await {
        warn!(error = %e, app_version = %version_name, "could not create app version");
        ctx.emit(
            &EventSubject::of(&app_version),
            LifecycleEvent::new(
                KeptnPhase::CREATE_APP_VERSION,
                Severity::Warning,
                REASON_FAILED,
                "Could not create KeptnAppVersion",
                &app.spec.version,
            ),
        )
        .await;
        return Err(e.into());
    }
    info!(app_version = %version_name, "app version created");

    let mut app = (*app).clone();
    let status = app.status.get_or_insert_with(Default::default);
    status.current_version = Some(app.spec.version.clone());
    status.observed_generation = Some(generation);
    ctx.store.update_status(&app).await?;

    if generation != 1 {
        if let Err(e) = deprecate_previous_generations(&ctx.store, &app).await {
            warn!(error = %e, "could not deprecate previous app versions");
            ctx.emit(
                &EventSubject::of(&app),
                LifecycleEvent::new(
                    KeptnPhase::DEPRECATE_APP_VERSION,
                    Severity::Warning,
                    REASON_FAILED,
                    format!(
                        "could not deprecate outdated revisions of KeptnAppVersion: {version_name}"
                    ),
                    &app.spec.version,
                ),
            )
            .await;
            return Ok(Action::requeue(ctx.cfg.requeue_after()));
        }
    }

    Ok(Action::await_change())
}

/// App version for the app's current generation with its spec copied in and a
/// fresh trace context below the app's own.
pub fn generate_app_version<S: ObjectStore>(
    ctx: &ControllerContext<S>,
    app: &KeptnApp,
    version_name: &str,
) -> KeptnAppVersion {
    let previous_version = app
        .status
        .as_ref()
        .and_then(|s| s.current_version.clone())
        .filter(|current| *current != app.spec.version);

    let parent = ctx.spans.extract(app.annotations());
    let tracer = ctx.tracer();
    let span = tracer
        .span_builder(version_name.to_string())
        .with_kind(SpanKind::Producer)
        .start_with_context(&tracer, &parent);
    let cx = parent.with_span(span);
    let trace_id = ctx.spans.inject(&cx);
    cx.span().end();

    let mut app_version = KeptnAppVersion::new(
        version_name,
        KeptnAppVersionSpec {
            app_name: app.name_any(),
            version: app.spec.version.clone(),
            workloads: app.spec.workloads.clone(),
            pre_deployment_tasks: app.spec.pre_deployment_tasks.clone(),
            post_deployment_tasks: app.spec.post_deployment_tasks.clone(),
            pre_deployment_evaluations: app.spec.pre_deployment_evaluations.clone(),
            post_deployment_evaluations: app.spec.post_deployment_evaluations.clone(),
            previous_version,
            trace_id,
        },
    );
    app_version.metadata.namespace = app.namespace();
    app_version.metadata.owner_references =
        Some(app.controller_owner_ref(&()).into_iter().collect());
    app_version
}
