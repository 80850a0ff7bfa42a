//! Drives one lifecycle phase per call.

use std::time::Duration;

use async_trait::async_trait;
use kube::runtime::controller::Action;
use opentelemetry::Context;
use tracing::{debug, warn};

use super::evaluation::EvaluationEngine;
use super::task::TaskEngine;
use super::{ControllerContext, PhaseItem, ReconcileErr};
use crate::crd::{CheckType, KeptnState};
use crate::events::{
    EventSubject, LifecycleEvent, REASON_FAILED, REASON_FINISHED,
    REASON_RECONCILE_ERROR, REASON_STARTED, Severity,
};
use crate::lifecycle::{KeptnPhase, get_overall_state};
use crate::store::ObjectStore;
use crate::telemetry::finish_span;

/// Work done inside one phase. Returns the phase's current state.
#[async_trait]
pub trait PhaseReconciler<P: PhaseItem>: Send + Sync {
    async fn reconcile(
        &self,
        item: &mut P,
        phase_cx: &Context,
    ) -> Result<KeptnState, ReconcileErr>;
}

/// Outcome of [`PhaseHandler::handle_phase`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseResult {
    /// The phase succeeded and the caller may move on to the next one.
    pub proceed: bool,
    pub requeue_after: Option<Duration>,
}

impl PhaseResult {
    /// Stop without requeueing.
    pub fn stop() -> Self {
        Self {
            proceed: false,
            requeue_after: None,
        }
    }

    pub fn action(&self) -> Action {
        match self.requeue_after {
            Some(delay) => Action::requeue(delay),
            None => Action::await_change(),
        }
    }
}

pub struct PhaseHandler<'a, S> {
    ctx: &'a ControllerContext<S>,
}

impl<'a, S: ObjectStore> PhaseHandler<'a, S> {
    pub fn new(ctx: &'a ControllerContext<S>) -> Self {
        Self { ctx }
    }

    /// Run `reconciler` for `phase` on `item` and react to the state it
    /// reports. The item's status is written back whenever its aggregate
    /// state or current phase changed, also when the reconciler failed.
    pub async fn handle_phase<P: PhaseItem>(
        &self,
        parent_cx: &Context,
        item: &mut P,
        phase: KeptnPhase,
        reconciler: &dyn PhaseReconciler<P>,
    ) -> Result<PhaseResult, ReconcileErr> {
        if item.state().is_deprecated() {
            debug!(%phase, "resource is deprecated, skipping phase");
            return Ok(PhaseResult::stop());
        }

        let old_state = item.state();
        let old_phase = item.current_phase().to_string();
        let requeue = Some(self.ctx.cfg.requeue_after());

        if old_phase != phase.short_name {
            self.emit(item, phase, Severity::Normal, REASON_STARTED, "has started")
                .await;
            item.set_current_phase(phase.short_name);
        }

        let phase_cx =
            self.ctx
                .spans
                .get_span(parent_cx, &self.ctx.tracer(), item, phase.short_name);

        let result = match reconciler.reconcile(item, &phase_cx).await {
            Err(e) => {
                warn!(error = %e, %phase, "phase could not get reconciled");
                self.emit(
                    item,
                    phase,
                    Severity::Warning,
                    REASON_RECONCILE_ERROR,
                    "could not get reconciled",
                )
                .await;
                if let Err(persist) =
                    self.persist_if_changed(item, old_state, &old_phase).await
                {
                    warn!(error = %persist, "could not persist status after reconcile error");
                }
                return Err(e);
            }
            Ok(state) if state.is_succeeded() => {
                finish_span(&phase_cx, state, phase.short_name);
                self.ctx.spans.unbind_span(&*item, phase.short_name);
                self.emit(item, phase, Severity::Normal, REASON_FINISHED, "has finished")
                    .await;
                PhaseResult {
                    proceed: true,
                    requeue_after: requeue,
                }
            }
            Ok(state) if state.is_completed() => {
                item.set_state(KeptnState::Failed);
                item.complete();
                finish_span(&phase_cx, KeptnState::Failed, phase.short_name);
                self.ctx.spans.unbind_span(&*item, phase.short_name);
                self.emit(item, phase, Severity::Warning, REASON_FAILED, "has failed")
                    .await;
                item.deprecate_remaining_phases(phase);
                PhaseResult::stop()
            }
            Ok(_) => {
                item.set_state(KeptnState::Progressing);
                PhaseResult {
                    proceed: false,
                    requeue_after: requeue,
                }
            }
        };

        self.persist_if_changed(item, old_state, &old_phase).await?;
        Ok(result)
    }

    async fn persist_if_changed<P: PhaseItem>(
        &self,
        item: &P,
        old_state: KeptnState,
        old_phase: &str,
    ) -> Result<(), ReconcileErr> {
        if item.state() != old_state || item.current_phase() != old_phase {
            self.ctx.store.update_status(item).await?;
        }
        Ok(())
    }

    async fn emit<P: PhaseItem>(
        &self,
        item: &P,
        phase: KeptnPhase,
        severity: Severity,
        reason: &str,
        message: &str,
    ) {
        self.ctx
            .emit(
                &EventSubject::of(item),
                LifecycleEvent::new(phase, severity, reason, message, item.version()),
            )
            .await;
    }
}

/// Runs the tasks or evaluations of one check type and records the result on
/// the item.
///
/// The recorded check state is the real outcome. The state handed back to
/// the phase handler for pre-deployment checks goes through the deployment
/// policy, so a non-blocking operator lets the lifecycle continue past a
/// failed pre-deployment phase.
pub struct ChecksReconciler<'a, S> {
    ctx: &'a ControllerContext<S>,
    phase: KeptnPhase,
    check: CheckType,
}

impl<'a, S: ObjectStore> ChecksReconciler<'a, S> {
    pub fn new(
        ctx: &'a ControllerContext<S>,
        phase: KeptnPhase,
        check: CheckType,
    ) -> Self {
        Self { ctx, phase, check }
    }
}

#[async_trait]
impl<'a, S: ObjectStore, P: PhaseItem> PhaseReconciler<P> for ChecksReconciler<'a, S> {
    async fn reconcile(
        &self,
        item: &mut P,
        phase_cx: &Context,
    ) -> Result<KeptnState, ReconcileErr> {
        let (statuses, summary) = match self.check {
            CheckType::PreDeployment | CheckType::PostDeployment => {
                TaskEngine::new(self.ctx)
                    .reconcile(phase_cx, &*item, self.phase, self.check)
                    .await?
            }
            CheckType::PreDeploymentEvaluation | CheckType::PostDeploymentEvaluation => {
                EvaluationEngine::new(self.ctx)
                    .reconcile(phase_cx, &*item, self.phase, self.check)
                    .await?
            }
        };

        let state = get_overall_state(&summary);
        item.set_check_state(self.check, state);
        item.set_item_statuses(self.check, statuses);
        self.ctx.store.update_status(&*item).await?;

        match self.check {
            CheckType::PreDeployment | CheckType::PreDeploymentEvaluation => {
                let policy = self.ctx.deployment_policy();
                let gated = policy.apply(state);
                if gated != state {
                    warn!(phase = %self.phase, %state, "pre-deployment checks failed, deployment not blocked");
                }
                Ok(gated)
            }
            CheckType::PostDeployment | CheckType::PostDeploymentEvaluation => Ok(state),
        }
    }
}
