use kube::ResourceExt;
use opentelemetry::Context;
use tracing::{debug, info};

use super::definition::resolve_definition;
use super::{ControllerContext, PhaseItem, ReconcileErr};
use crate::crd::{
    CheckType, ItemStatus, KeptnEvaluation, KeptnEvaluationDefinition,
};
use crate::events::{
    EventSubject, LifecycleEvent, REASON_FAILED, REASON_STATUS_CHANGED, Severity,
};
use crate::lifecycle::{KeptnPhase, StatusSummary, update_status_summary};
use crate::store::ObjectStore;
use crate::telemetry::{add_span_event, finish_span};

/// Creates and tracks the evaluations a phase requested.
///
/// Unlike [`TaskEngine`](super::task::TaskEngine), a definition that cannot
/// be resolved or an evaluation that cannot be created fails the whole call.
pub struct EvaluationEngine<'a, S> {
    ctx: &'a ControllerContext<S>,
}

impl<'a, S: ObjectStore> EvaluationEngine<'a, S> {
    pub fn new(ctx: &'a ControllerContext<S>) -> Self {
        Self { ctx }
    }

    pub async fn reconcile<P: PhaseItem>(
        &self,
        phase_cx: &Context,
        parent: &P,
        phase: KeptnPhase,
        check: CheckType,
    ) -> Result<(Vec<ItemStatus>, StatusSummary), ReconcileErr> {
        let namespace = parent.namespace().unwrap_or_default();
        let requested = parent.requested(check);
        let prior = parent.item_statuses(check);
        let subject = EventSubject::of(parent);

        let mut summary = StatusSummary::with_total(requested.len());
        let mut statuses = Vec::with_capacity(requested.len());

        for definition_name in requested {
            let recorded = ItemStatus::recorded_state(prior, definition_name);
            let mut item = ItemStatus::lookup(prior, definition_name);

            if item.status.is_completed() {
                summary = update_status_summary(item.status, summary);
                statuses.push(item);
                continue;
            }

            let mut evaluation = None;
            if !item.name.is_empty() {
                evaluation = self
                    .ctx
                    .store
                    .get_opt::<KeptnEvaluation>(&namespace, &item.name)
                    .await?;
                if evaluation.is_none() {
                    info!(evaluation = %item.name, %definition_name, "evaluation vanished, recreating");
                    item.name.clear();
                }
            }

            match evaluation {
                None => {
                    item.name = self
                        .create_evaluation(phase_cx, parent, &subject, definition_name, phase, check)
                        .await?;
                    item.set_start_time();
                }
                Some(mut evaluation) => {
                    item.status = evaluation.state();
                    if item.status.is_completed() {
                        self.complete_evaluation(phase_cx, parent, &mut evaluation)
                            .await;
                        item.set_end_time();
                    }
                }
            }

            let previous = recorded.unwrap_or_default();
            if previous != item.status {
                self.ctx
                    .emit(
                        &subject,
                        LifecycleEvent::new(
                            KeptnPhase::RECONCILE_EVALUATION,
                            Severity::Normal,
                            REASON_STATUS_CHANGED,
                            format!(
                                "evaluation status changed from {previous} to {}",
                                item.status
                            ),
                            parent.version(),
                        ),
                    )
                    .await;
            }

            summary = update_status_summary(item.status, summary);
            statuses.push(item);
        }

        Ok((statuses, summary))
    }

    async fn create_evaluation<P: PhaseItem>(
        &self,
        phase_cx: &Context,
        parent: &P,
        subject: &EventSubject,
        definition_name: &str,
        phase: KeptnPhase,
        check: CheckType,
    ) -> Result<String, ReconcileErr> {
        let namespace = parent.namespace().unwrap_or_default();
        let definition: KeptnEvaluationDefinition = resolve_definition(
            &self.ctx.store,
            definition_name,
            &namespace,
            &self.ctx.cfg.default_namespace,
        )
        .await?;

        let mut evaluation = parent.generate_evaluation(&definition, check);
        evaluation
            .annotations_mut()
            .extend(self.ctx.spans.inject(phase_cx));

        if let Err(e) = self.ctx.store.create(&evaluation).await {
            self.ctx
                .emit(
                    subject,
                    LifecycleEvent::new(
                        KeptnPhase::CREATE_EVALUATION,
                        Severity::Warning,
                        REASON_FAILED,
                        "could not create KeptnEvaluation",
                        parent.version(),
                    ),
                )
                .await;
            return Err(e.into());
        }

        let name = evaluation.name_any();
        debug!(evaluation = %name, %definition_name, %phase, "evaluation created");
        self.ctx
            .spans
            .get_span(phase_cx, &self.ctx.tracer(), &mut evaluation, "");
        Ok(name)
    }

    async fn complete_evaluation<P: PhaseItem>(
        &self,
        phase_cx: &Context,
        parent: &P,
        evaluation: &mut KeptnEvaluation,
    ) {
        let name = evaluation.name_any();
        let state = evaluation.state();
        let cx = self
            .ctx
            .spans
            .get_span(phase_cx, &self.ctx.tracer(), evaluation, "");

        if state.is_failed() {
            let message = failure_message(evaluation, |line| {
                add_span_event(&cx, line.to_string());
            });
            self.ctx
                .emit(
                    &EventSubject::of(&*evaluation),
                    LifecycleEvent::new(
                        KeptnPhase::RECONCILE_EVALUATION,
                        Severity::Warning,
                        REASON_FAILED,
                        message,
                        parent.version(),
                    ),
                )
                .await;
        }

        finish_span(&cx, state, &name);
        self.ctx.spans.unbind_span(&*evaluation, "");
    }
}

/// `evaluation failed` followed by one line per failed objective. Each line is
/// also handed to `on_objective`.
pub fn failure_message(
    evaluation: &KeptnEvaluation,
    mut on_objective: impl FnMut(&str),
) -> String {
    let mut message = String::from("evaluation failed");
    for (objective, result) in evaluation.failed_objectives() {
        let line = format!(
            "evaluation of '{objective}' failed with value: '{}' and reason: '{}'",
            result.value,
            result.message.as_deref().unwrap_or_default()
        );
        on_objective(&line);
        message.push('\n');
        message.push_str(&line);
    }
    message
}
