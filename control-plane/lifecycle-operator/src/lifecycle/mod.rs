pub mod naming;
pub mod phases;
pub mod summary;

pub use phases::{KeptnPhase, get_short_phase_name};
pub use summary::{
    DeploymentPolicy, StatusSummary, get_overall_state, update_status_summary,
};
