pub mod app;
pub mod app_version;
pub mod common;
pub mod config;
pub mod evaluation;
pub mod task;
pub mod workload;
pub mod workload_version;

pub use app::{KeptnApp, KeptnAppSpec, KeptnAppStatus};
pub use app_version::{
    KeptnAppVersion, KeptnAppVersionSpec, KeptnAppVersionStatus,
};
pub use common::{CheckType, ItemStatus, KeptnState, WorkloadRef};
pub use config::{KeptnConfig, KeptnConfigSpec};
pub use evaluation::{
    KeptnEvaluation, KeptnEvaluationDefinition, KeptnEvaluationDefinitionSpec,
    KeptnEvaluationSpec, KeptnEvaluationStatus,
};
pub use task::{
    KeptnTask, KeptnTaskDefinition, KeptnTaskDefinitionSpec, KeptnTaskSpec,
    KeptnTaskStatus, TaskContext,
};
pub use workload::{KeptnWorkload, KeptnWorkloadSpec, KeptnWorkloadStatus};
pub use workload_version::{
    KeptnWorkloadVersion, KeptnWorkloadVersionSpec,
    KeptnWorkloadVersionStatus, ResourceReference,
};
