use std::fmt::Debug;
use std::sync::Arc;

use futures_util::StreamExt;
use keptn_observability::TracerFactory;
use kube::{
    Api, Client, Resource,
    runtime::{
        Controller, controller::Action, reflector::ObjectRef, watcher::Config,
    },
};
use tracing::{error, info};

use crate::config::{LiveOptions, OperatorConfig};
use crate::controller::{
    ControllerContext, app, app_version, config, error_policy, workload,
    workload_version,
};
use crate::crd::{
    KeptnApp, KeptnAppVersion, KeptnConfig, KeptnWorkload, KeptnWorkloadVersion,
};
use crate::events::default_multiplexer;
use crate::store::KubeStore;

/// Reporting component name on Kubernetes events.
pub const CONTROLLER_NAME: &str = "keptn-lifecycle-operator";

pub fn build_context(
    client: Client,
    cfg: OperatorConfig,
    tracers: Arc<dyn TracerFactory>,
) -> Arc<ControllerContext<KubeStore>> {
    let live = Arc::new(LiveOptions::from_config(&cfg));
    let events = default_multiplexer(client.clone(), CONTROLLER_NAME, live.clone());
    Arc::new(ControllerContext::with_live(
        KubeStore::new(client),
        Arc::new(events),
        tracers,
        cfg,
        live,
    ))
}

async fn report<K: Resource, E: Debug>(
    kind: &str,
    res: Result<(ObjectRef<K>, Action), E>,
) {
    match res {
        Ok((obj, action)) => {
            info!(%kind, name = %obj.name, "reconciled: requeue={:?}", action)
        }
        Err(e) => error!(%kind, error = ?e, "reconcile error"),
    }
}

/// Run the lifecycle controllers until all of their watch streams end.
pub async fn run_all(
    client: Client,
    cfg: OperatorConfig,
    tracers: Arc<dyn TracerFactory>,
) -> anyhow::Result<()> {
    let ctx = build_context(client.clone(), cfg, tracers);

    let configs = Controller::new(Api::<KeptnConfig>::all(client.clone()), Config::default())
        .run(config::reconcile, error_policy, ctx.clone())
        .for_each(|res| report("KeptnConfig", res));

    let apps = Controller::new(Api::<KeptnApp>::all(client.clone()), Config::default())
        .run(app::reconcile, error_policy, ctx.clone())
        .for_each(|res| report("KeptnApp", res));

    let app_versions = Controller::new(
        Api::<KeptnAppVersion>::all(client.clone()),
        Config::default(),
    )
    .run(app_version::reconcile, error_policy, ctx.clone())
    .for_each(|res| report("KeptnAppVersion", res));

    let workloads = Controller::new(
        Api::<KeptnWorkload>::all(client.clone()),
        Config::default(),
    )
    .run(workload::reconcile, error_policy, ctx.clone())
    .for_each(|res| report("KeptnWorkload", res));

    let workload_versions = Controller::new(
        Api::<KeptnWorkloadVersion>::all(client),
        Config::default(),
    )
    .run(workload_version::reconcile, error_policy, ctx)
    .for_each(|res| report("KeptnWorkloadVersion", res));

    info!("lifecycle controllers started");
    tokio::join!(configs, apps, app_versions, workloads, workload_versions);
    Ok(())
}
