use std::sync::Arc;

use kube::{Resource, ResourceExt, runtime::controller::Action};
use tracing::{info, instrument, warn};

use super::{ControllerContext, ReconcileErr};
use crate::crd::{KeptnWorkload, KeptnWorkloadVersion, KeptnWorkloadVersionSpec};
use crate::events::{EventSubject, LifecycleEvent, REASON_FAILED, Severity};
use crate::lifecycle::KeptnPhase;
use crate::lifecycle::naming::{
    MAX_K8S_OBJECT_LENGTH, MIN_NAME_PART_LENGTH, create_resource_name,
};
use crate::store::ObjectStore;

/// Make sure the version a workload currently reports has its workload
/// version.
#[instrument(skip_all, fields(ns = %workload.namespace().unwrap_or_default(), name = %workload.name_any()))]
pub async fn reconcile<S: ObjectStore>(
    workload: Arc<KeptnWorkload>,
    ctx: Arc<ControllerContext<S>>,
) -> Result<Action, ReconcileErr> {
    let namespace = workload.namespace().unwrap_or_default();
    let version_name = workload_version_name_of(&workload);

    if ctx
        .store
        .get_opt::<KeptnWorkloadVersion>(&namespace, &version_name)
        .await?
        .is_some()
    {
        return Ok(Action::await_change());
    }

    let workload_version = generate_workload_version(&ctx, &workload, &version_name);
    if let Err(e) = ctx.store.create(&workload_version).await {
        warn!(error = %e, workload_version = %version_name, "could not create workload version");
        ctx.emit(
            &EventSubject::of(&workload_version),
            LifecycleEvent::new(
                KeptnPhase::CREATE_WORKLOAD_VERSION,
                Severity::Warning,
                REASON_FAILED,
                "could not create KeptnWorkloadVersion",
                &workload.spec.version,
            ),
        )
        .await;
        return Err(e.into());
    }
    info!(workload_version = %version_name, "workload version created");

    let mut workload = (*workload).clone();
    workload
        .status
        .get_or_insert_with(Default::default)
        .current_version = Some(workload.spec.version.clone());
    ctx.store.update_status(&workload).await?;

    Ok(Action::await_change())
}

/// `{workload}-{version}`, shortened to fit a resource name.
pub fn workload_version_name_of(workload: &KeptnWorkload) -> String {
    create_resource_name(
        MAX_K8S_OBJECT_LENGTH,
        MIN_NAME_PART_LENGTH,
        &[&workload.name_any(), &workload.spec.version],
    )
}

/// Workload version for the workload's current version. The trace context
/// found on the workload is carried over as annotations; the app's deployment
/// trace is attached later, once the app version lets the workload start.
pub fn generate_workload_version<S: ObjectStore>(
    ctx: &ControllerContext<S>,
    workload: &KeptnWorkload,
    version_name: &str,
) -> KeptnWorkloadVersion {
    let previous_version = workload
        .status
        .as_ref()
        .and_then(|s| s.current_version.clone())
        .filter(|current| *current != workload.spec.version);

    let cx = ctx.spans.extract(workload.annotations());
    let spec = &workload.spec;

    let mut workload_version = KeptnWorkloadVersion::new(
        version_name,
        KeptnWorkloadVersionSpec {
            app: spec.app.clone(),
            workload_name: workload.name_any(),
            version: spec.version.clone(),
            resource_reference: spec.resource_reference.clone(),
            pre_deployment_tasks: spec.pre_deployment_tasks.clone(),
            post_deployment_tasks: spec.post_deployment_tasks.clone(),
            pre_deployment_evaluations: spec.pre_deployment_evaluations.clone(),
            post_deployment_evaluations: spec.post_deployment_evaluations.clone(),
            previous_version,
            ..Default::default()
        },
    );
    workload_version.metadata.namespace = workload.namespace();
    workload_version.metadata.annotations = Some(ctx.spans.inject(&cx));
    workload_version.metadata.owner_references =
        Some(workload.controller_owner_ref(&()).into_iter().collect());
    workload_version
}
