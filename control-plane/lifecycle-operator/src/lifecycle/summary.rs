use crate::crd::KeptnState;

/// Tally of child item states for one phase.
///
/// `total` is the number of requested items and is set by the caller; the
/// other counters are filled by [`update_status_summary`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusSummary {
    pub total: usize,
    pub progressing: usize,
    pub failed: usize,
    pub succeeded: usize,
    pub pending: usize,
    pub unknown: usize,
    pub deprecated: usize,
}

impl StatusSummary {
    pub fn with_total(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Number of items folded so far.
    pub fn folded(&self) -> usize {
        self.progressing
            + self.failed
            + self.succeeded
            + self.pending
            + self.unknown
            + self.deprecated
    }
}

/// Count `state` into exactly one bucket of `summary`.
pub fn update_status_summary(
    state: KeptnState,
    mut summary: StatusSummary,
) -> StatusSummary {
    match state {
        KeptnState::Progressing => summary.progressing += 1,
        KeptnState::Succeeded => summary.succeeded += 1,
        KeptnState::Failed => summary.failed += 1,
        KeptnState::Unknown => summary.unknown += 1,
        KeptnState::Deprecated | KeptnState::Cancelled => {
            summary.deprecated += 1
        }
        KeptnState::Pending => summary.pending += 1,
    }
    summary
}

/// Collapse a summary into one state. First match wins:
/// failed or deprecated, progressing, pending, unknown or incomplete fold,
/// succeeded.
pub fn get_overall_state(summary: &StatusSummary) -> KeptnState {
    if summary.failed > 0 || summary.deprecated > 0 {
        return KeptnState::Failed;
    }
    if summary.progressing > 0 {
        return KeptnState::Progressing;
    }
    if summary.pending > 0 {
        return KeptnState::Pending;
    }
    if summary.unknown > 0 || summary.folded() != summary.total {
        return KeptnState::Unknown;
    }
    KeptnState::Succeeded
}

/// Deployment-blocking toggle applied to pre-deployment checks.
///
/// With blocking on, states pass through unchanged. With blocking off a
/// failed pre-deployment phase lets the lifecycle continue: [`apply`] reports
/// it as succeeded for gating decisions while the recorded phase status keeps
/// `Failed`.
///
/// [`apply`]: DeploymentPolicy::apply
#[derive(Clone, Copy, Debug)]
pub struct DeploymentPolicy {
    blocking: bool,
    mapping: fn(KeptnState) -> KeptnState,
}

impl DeploymentPolicy {
    pub fn blocking() -> Self {
        Self {
            blocking: true,
            mapping: |s| s,
        }
    }

    pub fn non_blocking() -> Self {
        Self {
            blocking: false,
            mapping: |s| {
                if s.is_failed() {
                    KeptnState::Succeeded
                } else {
                    s
                }
            },
        }
    }

    pub fn from_flag(block_deployment: bool) -> Self {
        if block_deployment {
            Self::blocking()
        } else {
            Self::non_blocking()
        }
    }

    /// Policy with a caller-supplied mapping.
    pub fn custom(blocking: bool, mapping: fn(KeptnState) -> KeptnState) -> Self {
        Self { blocking, mapping }
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    /// State used to decide whether the lifecycle may move past a
    /// pre-deployment phase.
    pub fn apply(&self, state: KeptnState) -> KeptnState {
        (self.mapping)(state)
    }

    pub fn pre_deployment_passed(&self, state: KeptnState) -> bool {
        self.apply(state).is_succeeded()
    }
}

impl Default for DeploymentPolicy {
    fn default() -> Self {
        Self::blocking()
    }
}
