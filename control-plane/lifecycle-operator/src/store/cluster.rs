use async_trait::async_trait;
use kube::{
    Client,
    api::{Api, ListParams, Patch, PatchParams, PostParams},
};
use serde_json::{Value, json};

use super::{KubeObject, ObjectStore, StoreError, object_key};

/// [`ObjectStore`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn api<K: KubeObject>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn map_err<K: KubeObject>(namespace: &str, name: &str, err: kube::Error) -> StoreError {
    match &err {
        kube::Error::Api(resp) if resp.code == 404 => {
            StoreError::not_found::<K>(namespace, name)
        }
        kube::Error::Api(resp) if resp.code == 409 => StoreError::AlreadyExists {
            kind: K::kind(&()).to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        _ => StoreError::Api(err),
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: KubeObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<K, StoreError> {
        self.api::<K>(namespace)
            .get(name)
            .await
            .map_err(|e| map_err::<K>(namespace, name, e))
    }

    async fn create<K: KubeObject>(&self, obj: &K) -> Result<K, StoreError> {
        let (ns, name) = object_key(obj)?;
        self.api::<K>(&ns)
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| map_err::<K>(&ns, &name, e))
    }

    async fn update<K: KubeObject>(&self, obj: &K) -> Result<K, StoreError> {
        let (ns, name) = object_key(obj)?;
        self.api::<K>(&ns)
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| map_err::<K>(&ns, &name, e))
    }

    async fn update_status<K: KubeObject>(
        &self,
        obj: &K,
    ) -> Result<K, StoreError> {
        let (ns, name) = object_key(obj)?;
        let status = serde_json::to_value(obj)?
            .get("status")
            .cloned()
            .unwrap_or(Value::Null);
        let patch = json!({ "status": status });
        self.api::<K>(&ns)
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_err::<K>(&ns, &name, e))
    }

    async fn list<K: KubeObject>(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<K>, StoreError> {
        let mut lp = ListParams::default();
        if let Some(selector) = label_selector {
            lp = lp.labels(selector);
        }
        self.api::<K>(namespace)
            .list(&lp)
            .await
            .map(|list| list.items)
            .map_err(StoreError::Api)
    }
}
