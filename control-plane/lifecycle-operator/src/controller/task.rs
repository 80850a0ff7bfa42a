use kube::ResourceExt;
use opentelemetry::Context;
use tracing::{debug, info, warn};

use super::definition::resolve_definition;
use super::{ControllerContext, PhaseItem, ReconcileErr};
use crate::crd::{CheckType, ItemStatus, KeptnState, KeptnTask, KeptnTaskDefinition};
use crate::events::{
    EventSubject, LifecycleEvent, REASON_FAILED, REASON_STATUS_CHANGED, Severity,
};
use crate::lifecycle::{KeptnPhase, StatusSummary, update_status_summary};
use crate::store::ObjectStore;
use crate::telemetry::{add_span_event, finish_span};

/// Creates and tracks the task runs a phase requested.
pub struct TaskEngine<'a, S> {
    ctx: &'a ControllerContext<S>,
}

impl<'a, S: ObjectStore> TaskEngine<'a, S> {
    pub fn new(ctx: &'a ControllerContext<S>) -> Self {
        Self { ctx }
    }

    /// Advance every task `parent` requested for `check`.
    ///
    /// Items already completed are carried over without touching their task.
    /// A task whose definition cannot be resolved or whose creation fails is
    /// logged and left out; its siblings still progress.
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

            let mut task = None;
            if !item.name.is_empty() {
                task = self
                    .ctx
                    .store
                    .get_opt::<KeptnTask>(&namespace, &item.name)
                    .await?;
                if task.is_none() {
                    info!(task = %item.name, %definition_name, "task vanished, recreating");
                    item.name.clear();
                }
            }

            match task {
                None => {
                    match self
                        .create_task(phase_cx, parent, &subject, definition_name, check)
                        .await
                    {
                        Ok(name) => {
                            item.name = name;
                            item.set_start_time();
                        }
                        Err(e) => {
                            warn!(error = %e, %definition_name, parent = %subject.name, "could not create task, skipping");
                            continue;
                        }
                    }
                }
                Some(mut task) => {
                    item.status = task.state();
                    if item.status.is_completed() {
                        self.complete_task(phase_cx, &mut task);
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
                            phase,
                            Severity::Normal,
                            REASON_STATUS_CHANGED,
                            format!("task status changed from {previous} to {}", item.status),
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

    async fn create_task<P: PhaseItem>(
        &self,
        phase_cx: &Context,
        parent: &P,
        subject: &EventSubject,
        definition_name: &str,
        check: CheckType,
    ) -> Result<String, ReconcileErr> {
        let namespace = parent.namespace().unwrap_or_default();
        let definition: KeptnTaskDefinition = resolve_definition(
            &self.ctx.store,
            definition_name,
            &namespace,
            &self.ctx.cfg.default_namespace,
        )
        .await?;

        let mut task = parent.generate_task(&definition, check);
        task.annotations_mut().extend(self.ctx.spans.inject(phase_cx));

        if let Err(e) = self.ctx.store.create(&task).await {
            self.ctx
                .emit(
                    subject,
                    LifecycleEvent::new(
                        KeptnPhase::CREATE_TASK,
                        Severity::Warning,
                        REASON_FAILED,
                        "could not create KeptnTask",
                        parent.version(),
                    ),
                )
                .await;
            return Err(e.into());
        }

        let name = task.name_any();
        debug!(task = %name, %definition_name, "task created");
        self.ctx
            .spans
            .get_span(phase_cx, &self.ctx.tracer(), &mut task, "");
        Ok(name)
    }

    fn complete_task(&self, phase_cx: &Context, task: &mut KeptnTask) {
        let name = task.name_any();
        let state = task.state();
        let cx = self
            .ctx
            .spans
            .get_span(phase_cx, &self.ctx.tracer(), task, "");
        if state == KeptnState::Failed {
            add_span_event(
                &cx,
                format!(
                    "task '{name}' failed with reason: '{}'",
                    task.failure_reason()
                ),
            );
        }
        finish_span(&cx, state, &name);
        self.ctx.spans.unbind_span(&*task, "");
    }
}
