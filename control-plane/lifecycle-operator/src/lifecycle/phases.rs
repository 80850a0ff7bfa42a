use std::fmt;

/// A lifecycle phase: a display name for events plus the short machine name
/// persisted in `status.currentPhase` and used as span / trace-id key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KeptnPhase {
    pub long_name: &'static str,
    pub short_name: &'static str,
}

const fn phase(long_name: &'static str, short_name: &'static str) -> KeptnPhase {
    KeptnPhase {
        long_name,
        short_name,
    }
}

impl KeptnPhase {
    pub const WORKLOAD_PRE_DEPLOYMENT: KeptnPhase =
        phase("Workload Pre-Deployment Tasks", "WorkloadPreDeployTasks");
    pub const WORKLOAD_POST_DEPLOYMENT: KeptnPhase =
        phase("Workload Post-Deployment Tasks", "WorkloadPostDeployTasks");
    pub const WORKLOAD_PRE_EVALUATION: KeptnPhase = phase(
        "Workload Pre-Deployment Evaluations",
        "WorkloadPreDeployEvaluations",
    );
    pub const WORKLOAD_POST_EVALUATION: KeptnPhase = phase(
        "Workload Post-Deployment Evaluations",
        "WorkloadPostDeployEvaluations",
    );
    pub const WORKLOAD_DEPLOYMENT: KeptnPhase =
        phase("Workload Deployment", "WorkloadDeploy");
    pub const APP_PRE_DEPLOYMENT: KeptnPhase =
        phase("App Pre-Deployment Tasks", "AppPreDeployTasks");
    pub const APP_POST_DEPLOYMENT: KeptnPhase =
        phase("App Post-Deployment Tasks", "AppPostDeployTasks");
    pub const APP_PRE_EVALUATION: KeptnPhase =
        phase("App Pre-Deployment Evaluations", "AppPreDeployEvaluations");
    pub const APP_POST_EVALUATION: KeptnPhase =
        phase("App Post-Deployment Evaluations", "AppPostDeployEvaluations");
    pub const APP_DEPLOYMENT: KeptnPhase = phase("App Deployment", "AppDeploy");
    pub const RECONCILE_EVALUATION: KeptnPhase =
        phase("Reconcile Evaluation", "ReconcileEvaluation");
    pub const RECONCILE_TASK: KeptnPhase =
        phase("Reconcile Task", "ReconcileTask");
    pub const RECONCILE_WORKLOAD: KeptnPhase =
        phase("Reconcile Workloads", "ReconcileWorkload");
    pub const CREATE_EVALUATION: KeptnPhase =
        phase("Create Evaluation", "CreateEvaluation");
    pub const CREATE_TASK: KeptnPhase = phase("Create Task", "CreateTask");
    pub const CREATE_WORKLOAD: KeptnPhase =
        phase("Create Workload", "CreateWorkload");
    pub const UPDATE_WORKLOAD: KeptnPhase =
        phase("Update Workload", "UpdateWorkload");
    pub const CREATE_WORKLOAD_VERSION: KeptnPhase =
        phase("Create WorkloadVersion", "CreateWorkloadVersion");
    pub const CREATE_APP_VERSION: KeptnPhase =
        phase("Create AppVersion", "CreateAppVersion");
    pub const DEPRECATE_APP_VERSION: KeptnPhase =
        phase("Deprecate AppVersion", "DeprecateAppVersion");
    pub const APP_COMPLETED: KeptnPhase = phase("App Completed", "AppCompleted");
    pub const WORKLOAD_COMPLETED: KeptnPhase =
        phase("Workload Completed", "WorkloadCompleted");
    pub const COMPLETED: KeptnPhase = phase("Completed", "Completed");
    pub const DEPRECATED: KeptnPhase = phase("Deprecated", "Deprecated");

    pub fn is_evaluation(&self) -> bool {
        self.short_name.contains("DeployEvaluations")
    }

    pub fn is_pre_evaluation(&self) -> bool {
        self.short_name.contains("PreDeployEvaluations")
    }

    pub fn is_post_evaluation(&self) -> bool {
        self.short_name.contains("PostDeployEvaluations")
    }

    pub fn is_task(&self) -> bool {
        self.short_name.contains("DeployTasks")
    }

    pub fn is_pre_task(&self) -> bool {
        self.short_name.contains("PreDeployTasks")
    }

    pub fn is_post_task(&self) -> bool {
        self.short_name.contains("PostDeployTasks")
    }
}

impl fmt::Display for KeptnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name)
    }
}

pub static PHASES: &[KeptnPhase] = &[
    KeptnPhase::WORKLOAD_PRE_DEPLOYMENT,
    KeptnPhase::WORKLOAD_POST_DEPLOYMENT,
    KeptnPhase::WORKLOAD_PRE_EVALUATION,
    KeptnPhase::WORKLOAD_POST_EVALUATION,
    KeptnPhase::WORKLOAD_DEPLOYMENT,
    KeptnPhase::APP_PRE_DEPLOYMENT,
    KeptnPhase::APP_POST_DEPLOYMENT,
    KeptnPhase::APP_PRE_EVALUATION,
    KeptnPhase::APP_POST_EVALUATION,
    KeptnPhase::APP_DEPLOYMENT,
    KeptnPhase::RECONCILE_EVALUATION,
    KeptnPhase::RECONCILE_TASK,
    KeptnPhase::RECONCILE_WORKLOAD,
    KeptnPhase::CREATE_EVALUATION,
    KeptnPhase::CREATE_TASK,
    KeptnPhase::CREATE_WORKLOAD,
    KeptnPhase::UPDATE_WORKLOAD,
    KeptnPhase::CREATE_WORKLOAD_VERSION,
    KeptnPhase::CREATE_APP_VERSION,
    KeptnPhase::DEPRECATE_APP_VERSION,
    KeptnPhase::APP_COMPLETED,
    KeptnPhase::WORKLOAD_COMPLETED,
    KeptnPhase::COMPLETED,
    KeptnPhase::DEPRECATED,
];

/// Ordered phases an app version walks through.
pub static APP_PHASES: &[KeptnPhase] = &[
    KeptnPhase::APP_PRE_DEPLOYMENT,
    KeptnPhase::APP_PRE_EVALUATION,
    KeptnPhase::APP_DEPLOYMENT,
    KeptnPhase::APP_POST_DEPLOYMENT,
    KeptnPhase::APP_POST_EVALUATION,
    KeptnPhase::APP_COMPLETED,
];

/// Ordered phases a workload version walks through.
pub static WORKLOAD_PHASES: &[KeptnPhase] = &[
    KeptnPhase::WORKLOAD_PRE_DEPLOYMENT,
    KeptnPhase::WORKLOAD_PRE_EVALUATION,
    KeptnPhase::WORKLOAD_DEPLOYMENT,
    KeptnPhase::WORKLOAD_POST_DEPLOYMENT,
    KeptnPhase::WORKLOAD_POST_EVALUATION,
    KeptnPhase::WORKLOAD_COMPLETED,
];

/// Short name for a phase given either of its names; empty when unknown.
pub fn get_short_phase_name(name: &str) -> &'static str {
    PHASES
        .iter()
        .find(|p| p.short_name == name)
        .or_else(|| PHASES.iter().find(|p| p.long_name == name))
        .map(|p| p.short_name)
        .unwrap_or("")
}

/// Phase for a persisted short or long name.
pub fn find_phase(name: &str) -> Option<KeptnPhase> {
    let short = get_short_phase_name(name);
    PHASES.iter().copied().find(|p| p.short_name == short)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_lookup() {
        assert_eq!(
            get_short_phase_name("AppPreDeployTasks"),
            "AppPreDeployTasks"
        );
        assert_eq!(
            get_short_phase_name("Workload Post-Deployment Evaluations"),
            "WorkloadPostDeployEvaluations"
        );
        assert_eq!(get_short_phase_name("not-a-phase"), "");
        assert_eq!(find_phase("App Deployment"), Some(KeptnPhase::APP_DEPLOYMENT));
        assert_eq!(find_phase(""), None);
    }

    #[test]
    fn classification() {
        let p = KeptnPhase::WORKLOAD_PRE_EVALUATION;
        assert!(p.is_evaluation() && p.is_pre_evaluation());
        assert!(!p.is_post_evaluation() && !p.is_task());

        let p = KeptnPhase::APP_POST_DEPLOYMENT;
        assert!(p.is_task() && p.is_post_task() && !p.is_pre_task());
        assert!(!p.is_evaluation());

        let p = KeptnPhase::APP_DEPLOYMENT;
        assert!(!p.is_task() && !p.is_evaluation());
    }

    #[test]
    fn short_names_fit_label_values() {
        for p in PHASES {
            assert!(p.short_name.len() <= 30, "{} too long", p.short_name);
        }
    }
}
