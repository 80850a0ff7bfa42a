use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::{DaemonSet, ReplicaSet, StatefulSet};
use kube::{ResourceExt, runtime::controller::Action};
use opentelemetry::Context;
use tracing::{debug, info, instrument, warn};

use super::phase::ChecksReconciler;
use super::phase_item::check_type_for;
use super::{ControllerContext, PhaseItem, PhaseReconciler, PhaseResult, ReconcileErr};
use crate::crd::common::now;
use crate::crd::{CheckType, KeptnAppVersion, KeptnState, KeptnWorkloadVersion};
use crate::events::{
    EventSubject, LifecycleEvent, REASON_APP_VERSION_NOT_FOUND, REASON_FAILED,
    REASON_FINISHED, REASON_GET_APP_VERSION_FAILED, Severity,
};
use crate::lifecycle::KeptnPhase;
use crate::lifecycle::phases::WORKLOAD_PHASES;
use crate::store::ObjectStore;
use crate::telemetry::{add_span_event, finish_span};

/// Walk a workload version through its phases once the app version it
/// belongs to passed its pre-deployment checks.
#[instrument(skip_all, fields(ns = %obj.namespace().unwrap_or_default(), name = %obj.name_any()))]
pub async fn reconcile<S: ObjectStore>(
    obj: Arc<KeptnWorkloadVersion>,
    ctx: Arc<ControllerContext<S>>,
) -> Result<Action, ReconcileErr> {
    let mut workload_version = (*obj).clone();
    let state = workload_version.state();
    if state.is_deprecated() || (state.is_completed() && workload_version.is_end_time_set()) {
        return Ok(Action::await_change());
    }

    if workload_version.current_phase().is_empty()
        && !app_pre_deployment_passed(&ctx, &mut workload_version).await?
    {
        return Ok(Action::requeue(ctx.cfg.requeue_after()));
    }

    let parent_cx = ctx.spans.extract(&workload_version.spec.trace_id);
    let workload_cx =
        ctx.spans
            .get_span(&parent_cx, &ctx.tracer(), &mut workload_version, "");

    if workload_version.current_phase().is_empty() {
        workload_version.set_start_time();
        add_span_event(
            &workload_cx,
            "Workload Version Pre-Deployment Tasks started".to_string(),
        );
    }

    let policy = ctx.deployment_policy();
    let handler = ctx.phase_handler();
    let phases = WORKLOAD_PHASES
        .iter()
        .copied()
        .take_while(|p| *p != KeptnPhase::WORKLOAD_COMPLETED);
    for phase in phases {
        let check = check_type_for(phase);
        let done = match check {
            Some(c @ (CheckType::PreDeployment | CheckType::PreDeploymentEvaluation)) => {
                policy.pre_deployment_passed(workload_version.check_state(c))
            }
            Some(c) => workload_version.check_state(c).is_succeeded(),
            None => workload_version
                .status
                .as_ref()
                .is_some_and(|s| s.deployment_status.is_succeeded()),
        };
        if done {
            continue;
        }

        let result = match check {
            Some(c) => {
                let reconciler = ChecksReconciler::new(&ctx, phase, c);
                handler
                    .handle_phase(&workload_cx, &mut workload_version, phase, &reconciler)
                    .await?
            }
            None => {
                let reconciler = DeploymentCheck::new(&ctx);
                handler
                    .handle_phase(&workload_cx, &mut workload_version, phase, &reconciler)
                    .await?
            }
        };
        if !result.proceed {
            if workload_version.state().is_failed() {
                finish_span(&workload_cx, KeptnState::Failed, &workload_version.name_any());
                ctx.spans.unbind_span(&workload_version, "");
                emit(
                    &ctx,
                    &workload_version,
                    KeptnPhase::WORKLOAD_COMPLETED,
                    Severity::Warning,
                    REASON_FAILED,
                    "has failed",
                )
                .await;
            }
            return Ok(result.action());
        }
    }

    if !workload_version.is_end_time_set() {
        workload_version.set_current_phase(KeptnPhase::COMPLETED.short_name);
        workload_version.set_state(KeptnState::Succeeded);
        workload_version.complete();
        ctx.store.update_status(&workload_version).await?;
        info!("workload version completed");

        emit(
            &ctx,
            &workload_version,
            KeptnPhase::WORKLOAD_COMPLETED,
            Severity::Normal,
            REASON_FINISHED,
            "has finished",
        )
        .await;
        finish_span(&workload_cx, KeptnState::Succeeded, &workload_version.name_any());
        ctx.spans.unbind_span(&workload_version, "");
    }
    Ok(PhaseResult::stop().action())
}

/// Whether the app version owning `workload_version` let it start.
///
/// Copies the app's deployment trace context into the workload version the
/// first time it passes.
async fn app_pre_deployment_passed<S: ObjectStore>(
    ctx: &ControllerContext<S>,
    workload_version: &mut KeptnWorkloadVersion,
) -> Result<bool, ReconcileErr> {
    let phase = KeptnPhase::WORKLOAD_PRE_DEPLOYMENT;
    let namespace = workload_version.namespace().unwrap_or_default();

    let app_versions = match ctx.store.list::<KeptnAppVersion>(&namespace, None).await {
        Ok(list) => list,
        Err(e) => {
            warn!(error = %e, "could not list app versions");
            emit(
                ctx,
                workload_version,
                phase,
                Severity::Warning,
                REASON_GET_APP_VERSION_FAILED,
                "has failed since app could not be retrieved",
            )
            .await;
            return Ok(false);
        }
    };

    let Some(app_version) = latest_app_version_for(app_versions, workload_version) else {
        debug!(app = %workload_version.spec.app, "no app version lists this workload yet");
        emit(
            ctx,
            workload_version,
            phase,
            Severity::Warning,
            REASON_APP_VERSION_NOT_FOUND,
            "has failed since app could not be found",
        )
        .await;
        return Ok(false);
    };

    let app_pre_eval = app_version.check_state(CheckType::PreDeploymentEvaluation);
    if !ctx.deployment_policy().pre_deployment_passed(app_pre_eval) {
        if app_pre_eval.is_failed() {
            emit(
                ctx,
                workload_version,
                phase,
                Severity::Warning,
                REASON_FAILED,
                "has failed since app has failed",
            )
            .await;
        }
        return Ok(false);
    }

    if workload_version.spec.trace_id.is_empty() {
        let status = app_version.status.as_ref();
        workload_version.spec.trace_id = status
            .and_then(|s| s.phase_trace_ids.get(KeptnPhase::APP_DEPLOYMENT.short_name))
            .cloned()
            .unwrap_or_else(|| app_version.spec.trace_id.clone());
        let updated = ctx.store.update(&*workload_version).await?;
        workload_version.metadata = updated.metadata;
    }
    Ok(true)
}

/// Newest non-deprecated app version of the workload's app that lists the
/// workload at its version.
pub fn latest_app_version_for(
    app_versions: Vec<KeptnAppVersion>,
    workload_version: &KeptnWorkloadVersion,
) -> Option<KeptnAppVersion> {
    app_versions
        .into_iter()
        .filter(|av| !av.state().is_deprecated())
        .filter(|av| av.spec.app_name == workload_version.spec.app)
        .filter(|av| {
            av.spec.workloads.iter().any(|w| {
                w.version == workload_version.spec.version
                    && format!("{}-{}", av.spec.app_name, w.name)
                        == workload_version.spec.workload_name
            })
        })
        .max_by(|a, b| {
            a.metadata
                .creation_timestamp
                .cmp(&b.metadata.creation_timestamp)
        })
}

async fn emit<S: ObjectStore>(
    ctx: &ControllerContext<S>,
    workload_version: &KeptnWorkloadVersion,
    phase: KeptnPhase,
    severity: Severity,
    reason: &str,
    message: &str,
) {
    ctx.emit(
        &EventSubject::of(workload_version),
        LifecycleEvent::new(phase, severity, reason, message, workload_version.version()),
    )
    .await;
}

/// `true` once `timeout` has passed since `started`. Unset or unreadable
/// start times never time out.
pub fn is_timed_out(started: Option<&str>, timeout: Duration, now: DateTime<Utc>) -> bool {
    let Some(started) = started.and_then(|s| DateTime::parse_from_rfc3339(s).ok()) else {
        return false;
    };
    match chrono::Duration::from_std(timeout) {
        Ok(timeout) => now > started.with_timezone(&Utc) + timeout,
        Err(_) => false,
    }
}

pub fn replica_set_ready(rs: &ReplicaSet) -> bool {
    let desired = rs.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let available = rs
        .status
        .as_ref()
        .and_then(|s| s.available_replicas)
        .unwrap_or_default();
    desired == available
}

pub fn stateful_set_ready(sts: &StatefulSet) -> bool {
    let desired = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let available = sts
        .status
        .as_ref()
        .and_then(|s| s.available_replicas)
        .unwrap_or_default();
    desired == available
}

pub fn daemon_set_ready(ds: &DaemonSet) -> bool {
    ds.status
        .as_ref()
        .is_some_and(|s| s.desired_number_scheduled == s.number_ready)
}

/// Deploy phase of a workload version: waits for the referenced pod owner to
/// become ready within the observability timeout.
pub struct DeploymentCheck<'a, S> {
    ctx: &'a ControllerContext<S>,
}

impl<'a, S: ObjectStore> DeploymentCheck<'a, S> {
    pub fn new(ctx: &'a ControllerContext<S>) -> Self {
        Self { ctx }
    }

    async fn is_running(&self, workload_version: &KeptnWorkloadVersion) -> Result<bool, ReconcileErr> {
        let namespace = workload_version.namespace().unwrap_or_default();
        let reference = &workload_version.spec.resource_reference;
        let store = &self.ctx.store;
        match reference.kind.as_str() {
            "ReplicaSet" => Ok(replica_set_ready(
                &store.get::<ReplicaSet>(&namespace, &reference.name).await?,
            )),
            "StatefulSet" => Ok(stateful_set_ready(
                &store.get::<StatefulSet>(&namespace, &reference.name).await?,
            )),
            "DaemonSet" => Ok(daemon_set_ready(
                &store.get::<DaemonSet>(&namespace, &reference.name).await?,
            )),
            other => Err(ReconcileErr::UnsupportedResource(format!(
                "resource reference of kind '{other}' cannot be checked for readiness"
            ))),
        }
    }
}

#[async_trait]
impl<'a, S: ObjectStore> PhaseReconciler<KeptnWorkloadVersion> for DeploymentCheck<'a, S> {
    async fn reconcile(
        &self,
        item: &mut KeptnWorkloadVersion,
        _phase_cx: &Context,
    ) -> Result<KeptnState, ReconcileErr> {
        let started = item
            .status
            .as_ref()
            .and_then(|s| s.deployment_start_time.clone());
        if is_timed_out(
            started.as_deref(),
            self.ctx.live.observability_timeout(),
            Utc::now(),
        ) {
            item.status.get_or_insert_with(Default::default).deployment_status =
                KeptnState::Failed;
            self.ctx.store.update_status(&*item).await?;
            emit(
                self.ctx,
                item,
                KeptnPhase::WORKLOAD_DEPLOYMENT,
                Severity::Warning,
                REASON_FINISHED,
                "has reached timeout",
            )
            .await;
            return Ok(KeptnState::Failed);
        }

        let running = self.is_running(item).await?;

        let status = item.status.get_or_insert_with(Default::default);
        if status.deployment_start_time.is_none() {
            status.deployment_start_time = Some(now());
            status.deployment_status = KeptnState::Progressing;
        }
        if running {
            status.deployment_status = KeptnState::Succeeded;
        }
        let state = status.deployment_status;
        self.ctx.store.update_status(&*item).await?;
        Ok(state)
    }
}
