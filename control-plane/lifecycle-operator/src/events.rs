//! Lifecycle notifications, fanned out to Kubernetes events and an optional
//! CloudEvents sink.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::{
    Client, Resource, ResourceExt,
    runtime::events::{Event, EventType, Recorder, Reporter},
};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::LiveOptions;
use crate::lifecycle::KeptnPhase;

pub const REASON_STARTED: &str = "Started";
pub const REASON_FINISHED: &str = "Finished";
pub const REASON_FAILED: &str = "Failed";
pub const REASON_STATUS_CHANGED: &str = "StatusChanged";
pub const REASON_RECONCILE_ERROR: &str = "ReconcileError";
pub const REASON_APP_VERSION_NOT_FOUND: &str = "AppVersionNotFound";
pub const REASON_GET_APP_VERSION_FAILED: &str = "GetAppVersionFailed";

const CLOUD_EVENT_SOURCE: &str = "keptn.sh";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Normal,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "Normal",
            Severity::Warning => "Warning",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Severity> for EventType {
    fn from(value: Severity) -> Self {
        match value {
            Severity::Normal => EventType::Normal,
            Severity::Warning => EventType::Warning,
        }
    }
}

/// The object an event is attached to.
#[derive(Clone, Debug)]
pub struct EventSubject {
    pub reference: ObjectReference,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl EventSubject {
    pub fn of<K: Resource<DynamicType = ()>>(obj: &K) -> Self {
        Self {
            reference: obj.object_ref(&()),
            kind: K::kind(&()).to_string(),
            namespace: obj.namespace().unwrap_or_default(),
            name: obj.name_any(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub phase: KeptnPhase,
    pub severity: Severity,
    /// Short reason such as `Started`; prefixed by the phase short name.
    pub reason: String,
    pub message: String,
    pub version: String,
}

impl LifecycleEvent {
    pub fn new(
        phase: KeptnPhase,
        severity: Severity,
        reason: &str,
        message: impl Into<String>,
        version: &str,
    ) -> Self {
        Self {
            phase,
            severity,
            reason: reason.to_string(),
            message: message.into(),
            version: version.to_string(),
        }
    }

    /// Reason as shown on the Kubernetes event, e.g. `AppPreDeployTasksStarted`.
    pub fn k8s_reason(&self) -> String {
        format!("{}{}", self.phase.short_name, self.reason)
    }

    /// CloudEvent type, e.g. `App Pre-Deployment Tasks.Started`.
    pub fn cloud_event_type(&self) -> String {
        format!("{}.{}", self.phase.long_name, self.reason)
    }

    pub fn note(&self, subject: &EventSubject) -> String {
        if self.version.is_empty() {
            format!(
                "{}: {} / Namespace: {}, Name: {}",
                self.phase.long_name, self.message, subject.namespace, subject.name
            )
        } else {
            format!(
                "{}: {} / Namespace: {}, Name: {}, Version: {}",
                self.phase.long_name,
                self.message,
                subject.namespace,
                subject.name,
                self.version
            )
        }
    }
}

/// Fire-and-forget event sink. Implementations log delivery failures and
/// never return them.
#[async_trait]
pub trait EventSender: Send + Sync {
    async fn emit(&self, subject: &EventSubject, event: &LifecycleEvent);
}

pub struct K8sEventSender {
    recorder: Recorder,
}

impl K8sEventSender {
    pub fn new(client: Client, controller: &str) -> Self {
        let reporter = Reporter {
            controller: controller.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventSender for K8sEventSender {
    async fn emit(&self, subject: &EventSubject, event: &LifecycleEvent) {
        let result = self
            .recorder
            .publish(
                &Event {
                    type_: event.severity.into(),
                    reason: event.k8s_reason(),
                    note: Some(event.note(subject)),
                    action: event.phase.short_name.to_string(),
                    secondary: None,
                },
                &subject.reference,
            )
            .await;
        if let Err(e) = result {
            warn!(error = ?e, kind = %subject.kind, ns = %subject.namespace, name = %subject.name, "failed to publish kubernetes event");
        }
    }
}

/// Posts events in CloudEvents binary content mode to the endpoint currently
/// set in the live options. Nothing is sent while no http(s) endpoint is set.
pub struct CloudEventSender {
    http: reqwest::Client,
    live: Arc<LiveOptions>,
}

impl CloudEventSender {
    pub fn new(live: Arc<LiveOptions>) -> Self {
        Self {
            http: reqwest::Client::new(),
            live,
        }
    }

    pub fn endpoint(&self) -> Option<String> {
        self.live.cloud_events_target()
    }
}

#[async_trait]
impl EventSender for CloudEventSender {
    async fn emit(&self, subject: &EventSubject, event: &LifecycleEvent) {
        let Some(endpoint) = self.endpoint() else {
            return;
        };
        let body = json!({
            "message": event.note(subject),
            "type": event.severity.as_str(),
            "version": event.version,
        });
        let id = format!("{:032x}", rand::random::<u128>());
        let result = self
            .http
            .post(endpoint.as_str())
            .header("ce-specversion", "1.0")
            .header("ce-id", id)
            .header("ce-source", CLOUD_EVENT_SOURCE)
            .header("ce-type", event.cloud_event_type())
            .header("ce-time", chrono::Utc::now().to_rfc3339())
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);
        if let Err(e) = result {
            debug!(error = %e, %endpoint, "failed to send cloud event");
        }
    }
}

/// Forwards every event to each registered sender in order.
#[derive(Default)]
pub struct EventMultiplexer {
    senders: Vec<Arc<dyn EventSender>>,
}

impl EventMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, sender: Arc<dyn EventSender>) -> Self {
        self.senders.push(sender);
        self
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

#[async_trait]
impl EventSender for EventMultiplexer {
    async fn emit(&self, subject: &EventSubject, event: &LifecycleEvent) {
        debug!(
            reason = %event.k8s_reason(),
            name = %subject.name,
            senders = self.senders.len(),
            "emitting event"
        );
        for sender in &self.senders {
            sender.emit(subject, event).await;
        }
    }
}

/// Build the production fan-out: cloud events first, then Kubernetes events.
pub fn default_multiplexer(
    client: Client,
    controller: &str,
    live: Arc<LiveOptions>,
) -> EventMultiplexer {
    EventMultiplexer::new()
        .register(Arc::new(CloudEventSender::new(live)))
        .register(Arc::new(K8sEventSender::new(client, controller)))
}
