use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const API_GROUP: &str = "lifecycle.keptn.sh";

pub const LABEL_APP: &str = "keptn.sh/app";
pub const LABEL_VERSION: &str = "keptn.sh/version";
pub const LABEL_WORKLOAD: &str = "keptn.sh/workload";

/// W3C trace context as injected by a text map propagator.
pub type TraceCarrier = BTreeMap<String, String>;

/// Trace context per phase short name.
pub type PhaseTraceIds = BTreeMap<String, TraceCarrier>;

/// Lifecycle state shared by every phase, item and aggregate.
///
/// Empty or unrecognized values read back as `Pending`.
#[derive(
    Deserialize,
    Serialize,
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    JsonSchema,
)]
#[serde(rename_all = "PascalCase")]
pub enum KeptnState {
    Progressing,
    Succeeded,
    Failed,
    Unknown,
    Deprecated,
    Cancelled,
    // catch-all, must stay the last variant
    #[default]
    #[serde(other)]
    Pending,
}

impl KeptnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeptnState::Pending => "Pending",
            KeptnState::Progressing => "Progressing",
            KeptnState::Succeeded => "Succeeded",
            KeptnState::Failed => "Failed",
            KeptnState::Unknown => "Unknown",
            KeptnState::Deprecated => "Deprecated",
            KeptnState::Cancelled => "Cancelled",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(
            self,
            KeptnState::Succeeded
                | KeptnState::Failed
                | KeptnState::Deprecated
                | KeptnState::Cancelled
        )
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, KeptnState::Succeeded)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, KeptnState::Failed)
    }

    pub fn is_deprecated(&self) -> bool {
        matches!(self, KeptnState::Deprecated | KeptnState::Cancelled)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, KeptnState::Pending)
    }
}

impl fmt::Display for KeptnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which slot of the lifecycle a task or evaluation was requested for.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum CheckType {
    #[serde(rename = "pre")]
    PreDeployment,
    #[serde(rename = "post")]
    PostDeployment,
    #[serde(rename = "pre-eval")]
    PreDeploymentEvaluation,
    #[serde(rename = "post-eval")]
    PostDeploymentEvaluation,
}

impl CheckType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckType::PreDeployment => "pre",
            CheckType::PostDeployment => "post",
            CheckType::PreDeploymentEvaluation => "pre-eval",
            CheckType::PostDeploymentEvaluation => "post-eval",
        }
    }
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress record for one requested task or evaluation definition.
#[derive(
    Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct ItemStatus {
    /// Definition the item was requested for
    #[serde(default)]
    pub definition_name: String,
    /// Name of the created child object; empty until creation succeeded
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub status: KeptnState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

impl ItemStatus {
    pub fn pending(definition_name: &str) -> Self {
        Self {
            definition_name: definition_name.to_string(),
            ..Default::default()
        }
    }

    /// Record for `definition_name`, or a fresh pending one.
    pub fn lookup(statuses: &[ItemStatus], definition_name: &str) -> Self {
        statuses
            .iter()
            .find(|s| s.definition_name == definition_name)
            .cloned()
            .unwrap_or_else(|| Self::pending(definition_name))
    }

    /// Previously recorded state for `definition_name`, if any was recorded.
    pub fn recorded_state(
        statuses: &[ItemStatus],
        definition_name: &str,
    ) -> Option<KeptnState> {
        statuses
            .iter()
            .find(|s| s.definition_name == definition_name)
            .map(|s| s.status)
    }

    pub fn set_start_time(&mut self) {
        if self.start_time.is_none() {
            self.start_time = Some(now());
        }
    }

    pub fn set_end_time(&mut self) {
        if self.end_time.is_none() {
            self.end_time = Some(now());
        }
    }
}

#[derive(
    Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema,
)]
pub struct WorkloadRef {
    pub name: String,
    pub version: String,
}

/// Rolled-up state of one workload inside an app version.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct WorkloadStatus {
    pub workload: WorkloadRef,
    #[serde(default)]
    pub status: KeptnState,
}

/// RFC 3339 timestamp for status fields.
pub fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_or_unknown_string_reads_as_pending() {
        let s: KeptnState = serde_json::from_str("\"\"").unwrap();
        assert_eq!(s, KeptnState::Pending);
        let s: KeptnState = serde_json::from_str("\"Whatever\"").unwrap();
        assert_eq!(s, KeptnState::Pending);
        let s: KeptnState = serde_json::from_str("\"Cancelled\"").unwrap();
        assert_eq!(s, KeptnState::Cancelled);
    }

    #[test]
    fn pending_writes_its_own_name() {
        assert_eq!(
            serde_json::to_string(&KeptnState::Pending).unwrap(),
            "\"Pending\""
        );
        let status: WorkloadStatus =
            serde_json::from_str(r#"{"workload":{"name":"a","version":"1"},"status":"Bogus"}"#)
                .unwrap();
        assert_eq!(status.status, KeptnState::Pending);
        let status: WorkloadStatus =
            serde_json::from_str(r#"{"workload":{"name":"a","version":"1"}}"#).unwrap();
        assert_eq!(status.status, KeptnState::Pending);
    }

    #[test]
    fn predicates() {
        use KeptnState::*;
        for s in [Succeeded, Failed, Deprecated, Cancelled] {
            assert!(s.is_completed(), "{s} should be completed");
        }
        for s in [Pending, Progressing, Unknown] {
            assert!(!s.is_completed(), "{s} should not be completed");
        }
        assert!(Deprecated.is_deprecated() && Cancelled.is_deprecated());
        assert!(!Failed.is_deprecated());
        assert!(KeptnState::default().is_pending());
        assert!(Failed.is_failed() && !Succeeded.is_failed());
    }

    #[test]
    fn item_lookup_defaults_to_pending() {
        let statuses = vec![ItemStatus {
            definition_name: "a".into(),
            name: "pre-a-12345".into(),
            status: KeptnState::Progressing,
            ..Default::default()
        }];
        assert_eq!(ItemStatus::lookup(&statuses, "a").name, "pre-a-12345");
        let b = ItemStatus::lookup(&statuses, "b");
        assert_eq!(b, ItemStatus::pending("b"));
        assert_eq!(ItemStatus::recorded_state(&statuses, "b"), None);
    }

    #[test]
    fn check_type_wire_names() {
        let json =
            serde_json::to_string(&CheckType::PostDeploymentEvaluation).unwrap();
        assert_eq!(json, "\"post-eval\"");
        assert_eq!(CheckType::PreDeployment.to_string(), "pre");
    }
}
