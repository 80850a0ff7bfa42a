use std::sync::Arc;

use async_trait::async_trait;
use kube::{ResourceExt, runtime::controller::Action};
use opentelemetry::Context;
use tracing::{info, instrument, warn};

use super::phase::ChecksReconciler;
use super::phase_item::check_type_for;
use super::{ControllerContext, PhaseItem, PhaseReconciler, PhaseResult, ReconcileErr};
use crate::crd::common::WorkloadStatus;
use crate::crd::{CheckType, KeptnAppVersion, KeptnState, KeptnWorkloadVersion};
use crate::events::{
    EventSubject, LifecycleEvent, REASON_FAILED, REASON_FINISHED, Severity,
};
use crate::lifecycle::naming::workload_version_name;
use crate::lifecycle::phases::APP_PHASES;
use crate::lifecycle::{
    KeptnPhase, StatusSummary, get_overall_state, update_status_summary,
};
use crate::store::ObjectStore;
use crate::telemetry::{add_span_event, finish_span};

/// Walk an app version through its phases until one of them is still running
/// or has failed.
#[instrument(skip_all, fields(ns = %obj.namespace().unwrap_or_default(), name = %obj.name_any()))]
pub async fn reconcile<S: ObjectStore>(
    obj: Arc<KeptnAppVersion>,
    ctx: Arc<ControllerContext<S>>,
) -> Result<Action, ReconcileErr> {
    let mut app_version = (*obj).clone();
    let state = app_version.state();
    if state.is_deprecated() || (state.is_completed() && app_version.is_end_time_set()) {
        return Ok(Action::await_change());
    }

    let parent_cx = ctx.spans.extract(&app_version.spec.trace_id);
    let app_cx = ctx
        .spans
        .get_span(&parent_cx, &ctx.tracer(), &mut app_version, "");

    if app_version.current_phase().is_empty() {
        app_version.set_start_time();
        add_span_event(&app_cx, "App Version Pre-Deployment Tasks started".to_string());
    }

    let policy = ctx.deployment_policy();
    let handler = ctx.phase_handler();
    let phases = APP_PHASES
        .iter()
        .copied()
        .take_while(|p| *p != KeptnPhase::APP_COMPLETED);
    for phase in phases {
        let check = check_type_for(phase);
        let done = match check {
            Some(c @ (CheckType::PreDeployment | CheckType::PreDeploymentEvaluation)) => {
                policy.pre_deployment_passed(app_version.check_state(c))
            }
            Some(c) => app_version.check_state(c).is_succeeded(),
            None => app_version
                .status
                .as_ref()
                .is_some_and(|s| s.workload_overall_status.is_succeeded()),
        };
        if done {
            continue;
        }

        let result = match check {
            Some(c) => {
                let reconciler = ChecksReconciler::new(&ctx, phase, c);
                handler
                    .handle_phase(&app_cx, &mut app_version, phase, &reconciler)
                    .await?
            }
            None => {
                let reconciler = WorkloadRollup::new(&ctx);
                handler
                    .handle_phase(&app_cx, &mut app_version, phase, &reconciler)
                    .await?
            }
        };
        if !result.proceed {
            if app_version.state().is_failed() {
                close_failed(&ctx, &app_cx, &app_version).await;
            }
            return Ok(result.action());
        }
    }

    finish(&ctx, &app_cx, &mut app_version).await?;
    Ok(PhaseResult::stop().action())
}

async fn close_failed<S: ObjectStore>(
    ctx: &ControllerContext<S>,
    app_cx: &Context,
    app_version: &KeptnAppVersion,
) {
    finish_span(app_cx, KeptnState::Failed, &app_version.name_any());
    ctx.spans.unbind_span(app_version, "");
    ctx.emit(
        &EventSubject::of(app_version),
        LifecycleEvent::new(
            KeptnPhase::APP_COMPLETED,
            Severity::Warning,
            REASON_FAILED,
            "has failed",
            app_version.version(),
        ),
    )
    .await;
}

async fn finish<S: ObjectStore>(
    ctx: &ControllerContext<S>,
    app_cx: &Context,
    app_version: &mut KeptnAppVersion,
) -> Result<(), ReconcileErr> {
    if app_version.is_end_time_set() {
        return Ok(());
    }
    app_version.set_current_phase(KeptnPhase::COMPLETED.short_name);
    app_version.set_state(KeptnState::Succeeded);
    app_version.complete();
    ctx.store.update_status(&*app_version).await?;
    info!("app version completed");

    ctx.emit(
        &EventSubject::of(&*app_version),
        LifecycleEvent::new(
            KeptnPhase::APP_COMPLETED,
            Severity::Normal,
            REASON_FINISHED,
            "has finished",
            app_version.version(),
        ),
    )
    .await;
    finish_span(app_cx, KeptnState::Succeeded, &app_version.name_any());
    ctx.spans.unbind_span(&*app_version, "");
    Ok(())
}

/// Deploy phase of an app version: folds the state of its workload versions.
/// A workload version that does not exist yet counts as pending, one that
/// cannot be read as unknown.
pub struct WorkloadRollup<'a, S> {
    ctx: &'a ControllerContext<S>,
}

impl<'a, S: ObjectStore> WorkloadRollup<'a, S> {
    pub fn new(ctx: &'a ControllerContext<S>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl<'a, S: ObjectStore> PhaseReconciler<KeptnAppVersion> for WorkloadRollup<'a, S> {
    async fn reconcile(
        &self,
        item: &mut KeptnAppVersion,
        _phase_cx: &Context,
    ) -> Result<KeptnState, ReconcileErr> {
        let namespace = item.namespace().unwrap_or_default();
        let mut summary = StatusSummary::with_total(item.spec.workloads.len());
        let mut workload_status = Vec::with_capacity(item.spec.workloads.len());

        for workload in &item.spec.workloads {
            let name =
                workload_version_name(&item.spec.app_name, &workload.name, &workload.version);
            let state = match self
                .ctx
                .store
                .get_opt::<KeptnWorkloadVersion>(&namespace, &name)
                .await
            {
                Ok(Some(wv)) => wv.state(),
                Ok(None) => KeptnState::Pending,
                Err(e) => {
                    warn!(error = %e, workload_version = %name, "could not read workload version");
                    KeptnState::Unknown
                }
            };
            summary = update_status_summary(state, summary);
            workload_status.push(WorkloadStatus {
                workload: workload.clone(),
                status: state,
            });
        }

        let overall = get_overall_state(&summary);
        let status = item.status.get_or_insert_with(Default::default);
        status.workload_overall_status = overall;
        status.workload_status = workload_status;
        self.ctx.store.update_status(&*item).await?;
        Ok(overall)
    }
}
