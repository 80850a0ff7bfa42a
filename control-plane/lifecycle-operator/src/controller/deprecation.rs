use kube::ResourceExt;
use tracing::{debug, info, warn};

use super::{PhaseItem, ReconcileErr};
use crate::crd::{KeptnApp, KeptnAppVersion};
use crate::lifecycle::KeptnPhase;
use crate::lifecycle::naming::app_version_name;
use crate::store::ObjectStore;

/// Deprecate the app versions recorded for every generation of `app` before
/// the current one, newest first.
///
/// Missing versions are skipped. A failure on one generation does not stop
/// the sweep; the last failure is returned once all generations were visited.
/// Returns how many versions were deprecated.
pub async fn deprecate_previous_generations<S: ObjectStore>(
    store: &S,
    app: &KeptnApp,
) -> Result<usize, ReconcileErr> {
    let namespace = app.namespace().unwrap_or_default();
    let app_name = app.name_any();
    let generation = app.metadata.generation.unwrap_or(1);

    let mut deprecated = 0;
    let mut last_err = None;

    for previous in (1..generation).rev() {
        let name = app_version_name(&app_name, &app.spec.version, previous);
        match store.get_opt::<KeptnAppVersion>(&namespace, &name).await {
            Ok(None) => {
                debug!(%name, generation = previous, "no app version for generation");
            }
            Ok(Some(version)) if version.state().is_deprecated() => {}
            Ok(Some(mut version)) => {
                version.deprecate_remaining_phases(KeptnPhase::DEPRECATED);
                match store.update_status(&version).await {
                    Ok(_) => {
                        info!(%name, generation = previous, "app version deprecated");
                        deprecated += 1;
                    }
                    Err(e) => {
                        warn!(error = %e, %name, "could not deprecate app version");
                        last_err = Some(e);
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, %name, "could not fetch app version");
                last_err = Some(e);
            }
        }
    }

    match last_err {
        Some(e) => Err(e.into()),
        None => Ok(deprecated),
    }
}
