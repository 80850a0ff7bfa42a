//! Correlation of tracing spans with (resource, phase) pairs across
//! reconcile calls.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use opentelemetry::{
    Context, KeyValue,
    propagation::TextMapPropagator,
    trace::{SpanKind, Status, TraceContextExt, Tracer as _},
};
use opentelemetry_sdk::{propagation::TraceContextPropagator, trace::Tracer};
use tracing::trace;

use crate::crd::common::TraceCarrier;
use crate::crd::{
    KeptnAppVersion, KeptnEvaluation, KeptnState, KeptnTask,
    KeptnWorkloadVersion,
};

/// Objects that own lifecycle spans.
pub trait SpanItem {
    /// Key identifying the span of `phase` on this object.
    fn span_key(&self, phase: &str) -> String;
    fn span_name(&self, phase: &str) -> String;
    fn span_attributes(&self) -> Vec<KeyValue>;
    /// Remember the trace context of `phase` on the object.
    fn set_phase_trace_id(&mut self, phase: &str, carrier: TraceCarrier);
}

/// Span correlator.
///
/// Holds the context of every open span keyed by [`SpanItem::span_key`].
/// Spans are started on first request and handed back on every later
/// request until they are unbound.
#[derive(Default)]
pub struct SpanStore {
    spans: Mutex<HashMap<String, Context>>,
    propagator: TraceContextPropagator,
}

impl SpanStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Context>> {
        self.spans
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Context of the span bound to (`item`, `phase`), starting it below
    /// `parent` if there is none yet. A newly started span's trace context is
    /// written to the item's phase trace ids.
    pub fn get_span<T: SpanItem>(
        &self,
        parent: &Context,
        tracer: &Tracer,
        item: &mut T,
        phase: &str,
    ) -> Context {
        let key = item.span_key(phase);
        let mut spans = self.lock();
        if let Some(cx) = spans.get(&key) {
            return cx.clone();
        }

        let span = tracer
            .span_builder(item.span_name(phase))
            .with_kind(SpanKind::Consumer)
            .with_attributes(item.span_attributes())
            .start_with_context(tracer, parent);
        let cx = parent.with_span(span);

        item.set_phase_trace_id(phase, self.inject(&cx));
        trace!(%key, "span bound");
        spans.insert(key, cx.clone());
        cx
    }

    /// Release the binding of (`item`, `phase`). Returns whether a span was
    /// bound.
    pub fn unbind_span<T: SpanItem>(&self, item: &T, phase: &str) -> bool {
        let key = item.span_key(phase);
        let removed = self.lock().remove(&key).is_some();
        trace!(%key, removed, "span unbound");
        removed
    }

    pub fn is_bound<T: SpanItem>(&self, item: &T, phase: &str) -> bool {
        self.lock().contains_key(&item.span_key(phase))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// W3C trace context of `cx` as a string map.
    pub fn inject(&self, cx: &Context) -> TraceCarrier {
        let mut carrier: HashMap<String, String> = HashMap::new();
        self.propagator.inject_context(cx, &mut carrier);
        carrier.into_iter().collect()
    }

    /// Parent context from a stored trace carrier.
    pub fn extract(&self, carrier: &TraceCarrier) -> Context {
        let carrier: HashMap<String, String> = carrier
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.propagator.extract(&carrier)
    }
}

/// Record the outcome of a completed item or phase on its span and end it.
pub fn finish_span(cx: &Context, state: KeptnState, subject: &str) {
    let span = cx.span();
    if state.is_succeeded() {
        span.add_event(format!("{subject} has finished"), vec![]);
        span.set_status(Status::Ok);
    } else {
        span.add_event(format!("{subject} has failed"), vec![]);
        span.set_status(Status::error(format!("{subject} {state}")));
    }
    span.end();
}

pub fn add_span_event(cx: &Context, message: String) {
    cx.span().add_event(message, vec![]);
}

fn app_attributes(app: &str, version: &str, namespace: &str) -> Vec<KeyValue> {
    vec![
        KeyValue::new("keptn.deployment.app.name", app.to_string()),
        KeyValue::new("keptn.deployment.app.version", version.to_string()),
        KeyValue::new("keptn.deployment.app.namespace", namespace.to_string()),
    ]
}

impl SpanItem for KeptnAppVersion {
    fn span_key(&self, phase: &str) -> String {
        format!(
            "{}.{}.{}.{}.{}",
            self.spec
                .trace_id
                .get("traceparent")
                .map(String::as_str)
                .unwrap_or_default(),
            self.spec.app_name,
            self.metadata.namespace.as_deref().unwrap_or_default(),
            self.spec.version,
            phase
        )
    }

    fn span_name(&self, phase: &str) -> String {
        if phase.is_empty() {
            self.metadata.name.clone().unwrap_or_default()
        } else {
            phase.to_string()
        }
    }

    fn span_attributes(&self) -> Vec<KeyValue> {
        app_attributes(
            &self.spec.app_name,
            &self.spec.version,
            self.metadata.namespace.as_deref().unwrap_or_default(),
        )
    }

    fn set_phase_trace_id(&mut self, phase: &str, carrier: TraceCarrier) {
        self.status
            .get_or_insert_with(Default::default)
            .phase_trace_ids
            .insert(phase.to_string(), carrier);
    }
}

impl SpanItem for KeptnWorkloadVersion {
    fn span_key(&self, phase: &str) -> String {
        format!(
            "{}.{}.{}.{}.{}",
            self.spec
                .trace_id
                .get("traceparent")
                .map(String::as_str)
                .unwrap_or_default(),
            self.spec.workload_name,
            self.metadata.namespace.as_deref().unwrap_or_default(),
            self.spec.version,
            phase
        )
    }

    fn span_name(&self, phase: &str) -> String {
        if phase.is_empty() {
            self.metadata.name.clone().unwrap_or_default()
        } else {
            phase.to_string()
        }
    }

    fn span_attributes(&self) -> Vec<KeyValue> {
        let mut attrs = app_attributes(
            &self.spec.app,
            &self.spec.version,
            self.metadata.namespace.as_deref().unwrap_or_default(),
        );
        attrs.push(KeyValue::new(
            "keptn.deployment.workload.name",
            self.spec.workload_name.clone(),
        ));
        attrs.push(KeyValue::new(
            "keptn.deployment.workload.version",
            self.spec.version.clone(),
        ));
        attrs
    }

    fn set_phase_trace_id(&mut self, phase: &str, carrier: TraceCarrier) {
        self.status
            .get_or_insert_with(Default::default)
            .phase_trace_ids
            .insert(phase.to_string(), carrier);
    }
}

impl SpanItem for KeptnTask {
    fn span_key(&self, _phase: &str) -> String {
        self.metadata.name.clone().unwrap_or_default()
    }

    fn span_name(&self, _phase: &str) -> String {
        self.metadata.name.clone().unwrap_or_default()
    }

    fn span_attributes(&self) -> Vec<KeyValue> {
        let ctx = &self.spec.context;
        vec![
            KeyValue::new("keptn.deployment.app.name", ctx.app_name.clone()),
            KeyValue::new("keptn.deployment.app.version", ctx.app_version.clone()),
            KeyValue::new("keptn.deployment.workload.name", ctx.workload_name.clone()),
            KeyValue::new("keptn.deployment.task.name", self.spec.task_definition.clone()),
        ]
    }

    fn set_phase_trace_id(&mut self, _phase: &str, _carrier: TraceCarrier) {}
}

impl SpanItem for KeptnEvaluation {
    fn span_key(&self, _phase: &str) -> String {
        self.metadata.name.clone().unwrap_or_default()
    }

    fn span_name(&self, _phase: &str) -> String {
        self.metadata.name.clone().unwrap_or_default()
    }

    fn span_attributes(&self) -> Vec<KeyValue> {
        vec![
            KeyValue::new("keptn.deployment.app.name", self.spec.app_name.clone()),
            KeyValue::new("keptn.deployment.app.version", self.spec.app_version.clone()),
            KeyValue::new("keptn.deployment.workload.name", self.spec.workload.clone()),
            KeyValue::new(
                "keptn.deployment.evaluation.name",
                self.spec.evaluation_definition.clone(),
            ),
        ]
    }

    fn set_phase_trace_id(&mut self, _phase: &str, _carrier: TraceCarrier) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::KeptnAppVersionSpec;
    use keptn_observability::{TracerFactory, TracerRegistry};

    fn app_version() -> KeptnAppVersion {
        let mut av = KeptnAppVersion::new(
            "podtato-1.0.0-6b86b273",
            KeptnAppVersionSpec {
                app_name: "podtato".into(),
                version: "1.0.0".into(),
                ..Default::default()
            },
        );
        av.metadata.namespace = Some("demo".into());
        av
    }

    #[test]
    fn span_is_reused_until_unbound() {
        let registry = TracerRegistry::new("test");
        let tracer = registry.tracer("test");
        let store = SpanStore::new();
        let mut av = app_version();

        let first = store.get_span(&Context::new(), &tracer, &mut av, "AppPreDeployTasks");
        let second = store.get_span(&Context::new(), &tracer, &mut av, "AppPreDeployTasks");
        assert_eq!(
            first.span().span_context().span_id(),
            second.span().span_context().span_id()
        );
        assert_eq!(store.len(), 1);

        let carrier = &av.status.as_ref().unwrap().phase_trace_ids["AppPreDeployTasks"];
        assert!(carrier.contains_key("traceparent"));

        assert!(store.unbind_span(&av, "AppPreDeployTasks"));
        assert!(!store.unbind_span(&av, "AppPreDeployTasks"));
        assert!(store.is_empty());
    }

    #[test]
    fn extract_restores_parent_trace() {
        let registry = TracerRegistry::new("test");
        let tracer = registry.tracer("test");
        let store = SpanStore::new();
        let mut av = app_version();

        let cx = store.get_span(&Context::new(), &tracer, &mut av, "AppDeploy");
        let carrier = store.inject(&cx);
        let restored = store.extract(&carrier);
        assert_eq!(
            restored.span().span_context().trace_id(),
            cx.span().span_context().trace_id()
        );
    }
}
