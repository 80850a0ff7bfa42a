use tracing::debug;

use super::ReconcileErr;
use crate::store::{KubeObject, ObjectStore};

/// Look a definition up next to the resource, then in `default_namespace`.
pub async fn resolve_definition<K, S>(
    store: &S,
    name: &str,
    namespace: &str,
    default_namespace: &str,
) -> Result<K, ReconcileErr>
where
    K: KubeObject,
    S: ObjectStore,
{
    if let Some(def) = store.get_opt::<K>(namespace, name).await? {
        return Ok(def);
    }
    if namespace != default_namespace {
        debug!(%name, %namespace, %default_namespace, "definition not in resource namespace, trying default");
        if let Some(def) = store.get_opt::<K>(default_namespace, name).await? {
            return Ok(def);
        }
    }
    Err(ReconcileErr::DefinitionNotFound {
        kind: K::kind(&()).to_string(),
        name: name.to_string(),
        namespace: namespace.to_string(),
        default_namespace: default_namespace.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{KeptnTaskDefinition, KeptnTaskDefinitionSpec};
    use crate::store::InMemoryStore;
    use tracing_test::traced_test;

    fn definition(ns: &str) -> KeptnTaskDefinition {
        let mut def =
            KeptnTaskDefinition::new("smoke", KeptnTaskDefinitionSpec::default());
        def.metadata.namespace = Some(ns.into());
        def
    }

    #[tokio::test]
    async fn prefers_local_namespace() {
        let store = InMemoryStore::new();
        let mut local = definition("demo");
        local.spec.retries = Some(1);
        store.seed(&local).await.unwrap();
        store.seed(&definition("keptn-system")).await.unwrap();

        let found: KeptnTaskDefinition =
            resolve_definition(&store, "smoke", "demo", "keptn-system")
                .await
                .unwrap();
        assert_eq!(found.metadata.namespace.as_deref(), Some("demo"));
        assert_eq!(found.spec.retries, Some(1));
    }

    #[traced_test]
    #[tokio::test]
    async fn falls_back_to_default_namespace() {
        let store = InMemoryStore::new();
        store.seed(&definition("keptn-system")).await.unwrap();

        let found: KeptnTaskDefinition =
            resolve_definition(&store, "smoke", "demo", "keptn-system")
                .await
                .unwrap();
        assert_eq!(found.metadata.namespace.as_deref(), Some("keptn-system"));
        assert!(logs_contain("definition not in resource namespace"));
    }

    #[tokio::test]
    async fn missing_everywhere_is_distinguishable() {
        let store = InMemoryStore::new();
        let err = resolve_definition::<KeptnTaskDefinition, _>(
            &store,
            "smoke",
            "demo",
            "keptn-system",
        )
        .await
        .unwrap_err();
        assert!(err.is_definition_not_found());
    }

    #[tokio::test]
    async fn store_failures_propagate() {
        let store = InMemoryStore::new();
        store.fail_gets_for("smoke", "connection refused").await;
        let err = resolve_definition::<KeptnTaskDefinition, _>(
            &store,
            "smoke",
            "demo",
            "keptn-system",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ReconcileErr::Store(_)));
    }
}
