//! Object access used by the lifecycle engine.
//!
//! Every read and write goes through [`ObjectStore`] so the engine can run
//! against the cluster ([`KubeStore`]) or a process-local map
//! ([`InMemoryStore`]).

use std::fmt::Debug;

use async_trait::async_trait;
use kube::Resource;
use kube::core::NamespaceResourceScope;
use serde::{Serialize, de::DeserializeOwned};

mod cluster;
mod memory;

pub use cluster::KubeStore;
pub use memory::InMemoryStore;

/// Namespaced, statically typed API objects the store can handle.
pub trait KubeObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<T> KubeObject for T where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} '{namespace}/{name}' not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },
    #[error("{kind} '{namespace}/{name}' already exists")]
    AlreadyExists {
        kind: String,
        namespace: String,
        name: String,
    },
    #[error("invalid object: {0}")]
    Invalid(String),
    #[error("kubernetes api error: {0}")]
    Api(#[source] kube::Error),
    #[error("object codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn not_found<K: KubeObject>(namespace: &str, name: &str) -> Self {
        StoreError::NotFound {
            kind: K::kind(&()).to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn get<K: KubeObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<K, StoreError>;

    async fn create<K: KubeObject>(&self, obj: &K) -> Result<K, StoreError>;

    /// Replace the whole object.
    async fn update<K: KubeObject>(&self, obj: &K) -> Result<K, StoreError>;

    /// Write back only the status sub-document.
    async fn update_status<K: KubeObject>(
        &self,
        obj: &K,
    ) -> Result<K, StoreError>;

    /// Objects in `namespace`, optionally filtered by an equality label
    /// selector (`a=b,c=d`).
    async fn list<K: KubeObject>(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<K>, StoreError>;

    async fn get_opt<K: KubeObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, StoreError> {
        match self.get::<K>(namespace, name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Namespace and name of an object, failing when either is missing.
pub(crate) fn object_key<K: KubeObject>(
    obj: &K,
) -> Result<(String, String), StoreError> {
    let meta = obj.meta();
    match (meta.namespace.as_deref(), meta.name.as_deref()) {
        (Some(ns), Some(name)) if !ns.is_empty() && !name.is_empty() => {
            Ok((ns.to_string(), name.to_string()))
        }
        _ => Err(StoreError::Invalid(format!(
            "{} without namespace or name",
            K::kind(&())
        ))),
    }
}
