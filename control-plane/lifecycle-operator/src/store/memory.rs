use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{KubeObject, ObjectStore, StoreError, object_key};

type ObjectRef = (String, String, String);

fn key<K: KubeObject>(namespace: &str, name: &str) -> ObjectRef {
    (
        K::kind(&()).to_string(),
        namespace.to_string(),
        name.to_string(),
    )
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<ObjectRef, Value>,
    uid_seq: u64,
    resource_version: u64,
    failing_gets: HashMap<String, String>,
    get_counts: HashMap<String, usize>,
    writes: usize,
}

impl Inner {
    fn bump_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }
}

/// Process-local [`ObjectStore`].
///
/// Mirrors the API server closely enough for the lifecycle engine: uids and
/// resource versions are assigned on create, `update` keeps the stored status
/// and `update_status` only touches the status. Reads and writes are counted
/// and reads can be made to fail, which tests use to observe the engine.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `obj` as-is (plus uid) without counting it as a write.
    pub async fn seed<K: KubeObject>(&self, obj: &K) -> Result<K, StoreError> {
        let created = self.create(obj).await?;
        self.inner.write().await.writes -= 1;
        Ok(created)
    }

    /// Make every `get` of an object called `name` fail with `message`.
    pub async fn fail_gets_for(&self, name: &str, message: &str) {
        self.inner
            .write()
            .await
            .failing_gets
            .insert(name.to_string(), message.to_string());
    }

    pub async fn clear_failures(&self) {
        self.inner.write().await.failing_gets.clear();
    }

    /// How often an object called `name` was read, of any kind.
    pub async fn get_count(&self, name: &str) -> usize {
        self.inner
            .read()
            .await
            .get_counts
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    /// Creates, updates and status updates since construction.
    pub async fn write_count(&self) -> usize {
        self.inner.read().await.writes
    }
}

fn decode<K: KubeObject>(value: &Value) -> Result<K, StoreError> {
    Ok(serde_json::from_value(value.clone())?)
}

fn matches_selector(value: &Value, selector: Option<&str>) -> bool {
    let Some(selector) = selector else {
        return true;
    };
    let labels = value.pointer("/metadata/labels");
    selector
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels
                .and_then(|l| l.get(k.trim()))
                .and_then(Value::as_str)
                == Some(v.trim()),
            None => labels.and_then(|l| l.get(term)).is_some(),
        })
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get<K: KubeObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<K, StoreError> {
        let mut inner = self.inner.write().await;
        *inner.get_counts.entry(name.to_string()).or_default() += 1;
        if let Some(message) = inner.failing_gets.get(name) {
            return Err(StoreError::Unavailable(message.clone()));
        }
        match inner.objects.get(&key::<K>(namespace, name)) {
            Some(value) => decode(value),
            None => Err(StoreError::not_found::<K>(namespace, name)),
        }
    }

    async fn create<K: KubeObject>(&self, obj: &K) -> Result<K, StoreError> {
        let (ns, name) = object_key(obj)?;
        let key = key::<K>(&ns, &name);
        let mut inner = self.inner.write().await;
        if inner.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: key.0,
                namespace: ns,
                name,
            });
        }

        let mut obj = obj.clone();
        let uid_seq = inner.uid_seq + 1;
        inner.uid_seq = uid_seq;
        let resource_version = inner.bump_version();
        let meta = obj.meta_mut();
        if meta.uid.is_none() {
            meta.uid = Some(format!("uid-{uid_seq:06}"));
        }
        if meta.generation.is_none() {
            meta.generation = Some(1);
        }
        meta.resource_version = Some(resource_version);

        inner.objects.insert(key, serde_json::to_value(&obj)?);
        inner.writes += 1;
        Ok(obj)
    }

    async fn update<K: KubeObject>(&self, obj: &K) -> Result<K, StoreError> {
        let (ns, name) = object_key(obj)?;
        let key = key::<K>(&ns, &name);
        let mut inner = self.inner.write().await;
        let Some(stored) = inner.objects.get(&key) else {
            return Err(StoreError::not_found::<K>(&ns, &name));
        };
        let stored_status = stored.get("status").cloned();

        let mut obj = obj.clone();
        obj.meta_mut().resource_version = Some(inner.bump_version());
        let mut value = serde_json::to_value(&obj)?;
        if let (Some(map), Some(status)) = (value.as_object_mut(), stored_status) {
            map.insert("status".to_string(), status);
        }
        let updated = decode(&value)?;
        inner.objects.insert(key, value);
        inner.writes += 1;
        Ok(updated)
    }

    async fn update_status<K: KubeObject>(
        &self,
        obj: &K,
    ) -> Result<K, StoreError> {
        let (ns, name) = object_key(obj)?;
        let key = key::<K>(&ns, &name);
        let status = serde_json::to_value(obj)?
            .get("status")
            .cloned()
            .unwrap_or(Value::Null);
        let mut inner = self.inner.write().await;
        let resource_version = inner.bump_version();
        let Some(stored) = inner.objects.get_mut(&key) else {
            return Err(StoreError::not_found::<K>(&ns, &name));
        };
        if let Some(map) = stored.as_object_mut() {
            map.insert("status".to_string(), status);
        }
        if let Some(meta) = stored.pointer_mut("/metadata") {
            meta["resourceVersion"] = Value::String(resource_version);
        }
        let updated = decode(stored)?;
        inner.writes += 1;
        Ok(updated)
    }

    async fn list<K: KubeObject>(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<K>, StoreError> {
        let kind = K::kind(&()).to_string();
        let inner = self.inner.read().await;
        inner
            .objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && ns == namespace)
            .filter(|(_, value)| matches_selector(value, label_selector))
            .map(|(_, value)| decode(value))
            .collect()
    }
}
