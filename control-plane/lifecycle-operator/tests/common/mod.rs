#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{ReplicaSet, ReplicaSetSpec, ReplicaSetStatus};
use keptn_observability::TracerRegistry;
use kube::api::ObjectMeta;
use lifecycle_operator::config::OperatorConfig;
use lifecycle_operator::controller::ControllerContext;
use lifecycle_operator::crd::workload_version::ResourceReference;
use lifecycle_operator::crd::{
    KeptnApp, KeptnAppSpec, KeptnAppVersion, KeptnAppVersionSpec,
    KeptnEvaluationDefinition, KeptnEvaluationDefinitionSpec, KeptnState,
    KeptnTask, KeptnTaskDefinition, KeptnTaskDefinitionSpec, KeptnTaskStatus,
    KeptnWorkload, KeptnWorkloadSpec, KeptnWorkloadVersion, KeptnWorkloadVersionSpec,
    WorkloadRef,
};
use lifecycle_operator::events::{EventSender, EventSubject, LifecycleEvent};
use lifecycle_operator::store::{InMemoryStore, ObjectStore};

pub const NS: &str = "demo";
pub const DEFAULT_NS: &str = "keptn-lifecycle-toolkit-system";
pub const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

/// Event sender that keeps everything it is handed.
#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<(EventSubject, LifecycleEvent)>>,
}

impl RecordingEvents {
    pub fn all(&self) -> Vec<(EventSubject, LifecycleEvent)> {
        self.events.lock().unwrap().clone()
    }

    /// Kubernetes reasons in emission order, e.g. `AppPreDeployTasksStarted`.
    pub fn reasons(&self) -> Vec<String> {
        self.all().iter().map(|(_, e)| e.k8s_reason()).collect()
    }

    pub fn count(&self, reason: &str) -> usize {
        self.all().iter().filter(|(_, e)| e.reason == reason).count()
    }

    pub fn with_reason(&self, reason: &str) -> Vec<(EventSubject, LifecycleEvent)> {
        self.all()
            .into_iter()
            .filter(|(_, e)| e.reason == reason)
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

#[async_trait]
impl EventSender for RecordingEvents {
    async fn emit(&self, subject: &EventSubject, event: &LifecycleEvent) {
        self.events
            .lock()
            .unwrap()
            .push((subject.clone(), event.clone()));
    }
}

pub struct Harness {
    pub store: InMemoryStore,
    pub events: Arc<RecordingEvents>,
    pub tracers: Arc<TracerRegistry>,
    pub ctx: Arc<ControllerContext<InMemoryStore>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(OperatorConfig {
            default_namespace: DEFAULT_NS.to_string(),
            ..Default::default()
        })
    }

    pub fn with_config(cfg: OperatorConfig) -> Self {
        let store = InMemoryStore::new();
        let events = Arc::new(RecordingEvents::default());
        let tracers = Arc::new(TracerRegistry::new("lifecycle-operator-test"));
        let ctx = Arc::new(ControllerContext::new(
            store.clone(),
            events.clone(),
            tracers.clone(),
            cfg,
        ));
        Self {
            store,
            events,
            tracers,
            ctx,
        }
    }

    pub async fn seed<K: lifecycle_operator::store::KubeObject>(&self, obj: K) -> K {
        self.store.seed(&obj).await.unwrap()
    }

    pub async fn get<K: lifecycle_operator::store::KubeObject>(&self, name: &str) -> K {
        self.store.get::<K>(NS, name).await.unwrap()
    }

    pub async fn tasks(&self) -> Vec<KeptnTask> {
        self.store.list::<KeptnTask>(NS, None).await.unwrap()
    }

    /// Report `state` for the task called `name`, as a task runner would.
    pub async fn set_task_state(&self, name: &str, state: KeptnState, reason: Option<&str>) {
        let mut task: KeptnTask = self.get(name).await;
        task.status = Some(KeptnTaskStatus {
            status: state,
            reason: reason.map(str::to_string),
            ..Default::default()
        });
        self.store.update_status(&task).await.unwrap();
    }
}

fn meta(namespace: &str, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

pub fn task_definition(namespace: &str, name: &str) -> KeptnTaskDefinition {
    KeptnTaskDefinition {
        metadata: meta(namespace, name),
        spec: KeptnTaskDefinitionSpec::default(),
    }
}

pub fn evaluation_definition(namespace: &str, name: &str) -> KeptnEvaluationDefinition {
    KeptnEvaluationDefinition {
        metadata: meta(namespace, name),
        spec: KeptnEvaluationDefinitionSpec::default(),
    }
}

pub fn app(name: &str, version: &str, generation: i64) -> KeptnApp {
    let mut app = KeptnApp::new(
        name,
        KeptnAppSpec {
            version: version.to_string(),
            workloads: vec![WorkloadRef {
                name: "frontend".into(),
                version: "1.0.0".into(),
            }],
            ..Default::default()
        },
    );
    app.metadata.namespace = Some(NS.to_string());
    app.metadata.generation = Some(generation);
    app
}

pub fn app_version(name: &str) -> KeptnAppVersion {
    let mut av = KeptnAppVersion::new(
        name,
        KeptnAppVersionSpec {
            app_name: "podtato".into(),
            version: "0.1.0".into(),
            ..Default::default()
        },
    );
    av.metadata.namespace = Some(NS.to_string());
    av
}

pub fn workload_version(kind: &str, owner: &str) -> KeptnWorkloadVersion {
    let mut wv = KeptnWorkloadVersion::new(
        "podtato-frontend-1.0.0",
        KeptnWorkloadVersionSpec {
            app: "podtato".into(),
            workload_name: "podtato-frontend".into(),
            version: "1.0.0".into(),
            resource_reference: ResourceReference {
                uid: String::new(),
                kind: kind.to_string(),
                name: owner.to_string(),
            },
            ..Default::default()
        },
    );
    wv.metadata.namespace = Some(NS.to_string());
    wv
}

pub fn replica_set(name: &str, replicas: i32, available: i32) -> ReplicaSet {
    ReplicaSet {
        metadata: meta(NS, name),
        spec: Some(ReplicaSetSpec {
            replicas: Some(replicas),
            ..Default::default()
        }),
        status: Some(ReplicaSetStatus {
            available_replicas: Some(available),
            ..Default::default()
        }),
    }
}

/// `podtato-frontend` at `version`, owned by the ReplicaSet `frontend-rs`.
pub fn workload(version: &str) -> KeptnWorkload {
    let mut workload = KeptnWorkload::new(
        "podtato-frontend",
        KeptnWorkloadSpec {
            app: "podtato".into(),
            version: version.to_string(),
            resource_reference: ResourceReference {
                uid: String::new(),
                kind: "ReplicaSet".into(),
                name: "frontend-rs".into(),
            },
            pre_deployment_tasks: vec!["task-def".into()],
            ..Default::default()
        },
    );
    workload.metadata.namespace = Some(NS.to_string());
    workload
}
