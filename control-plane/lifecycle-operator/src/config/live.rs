use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use super::OperatorConfig;
use crate::lifecycle::DeploymentPolicy;

/// Settings a `KeptnConfig` resource may change while the operator runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiveSettings {
    pub block_deployment: bool,
    pub observability_timeout: Duration,
    pub cloud_events_endpoint: Option<String>,
}

impl LiveSettings {
    pub fn from_config(cfg: &OperatorConfig) -> Self {
        Self {
            block_deployment: cfg.block_deployment,
            observability_timeout: cfg.observability_timeout(),
            cloud_events_endpoint: cfg.cloud_events_endpoint.clone(),
        }
    }
}

/// Current [`LiveSettings`], shared by the controllers and the event sinks.
#[derive(Debug)]
pub struct LiveOptions {
    current: RwLock<LiveSettings>,
}

impl LiveOptions {
    pub fn new(settings: LiveSettings) -> Self {
        Self {
            current: RwLock::new(settings),
        }
    }

    pub fn from_config(cfg: &OperatorConfig) -> Self {
        Self::new(LiveSettings::from_config(cfg))
    }

    pub fn snapshot(&self) -> LiveSettings {
        self.read().clone()
    }

    /// Replace the settings. Returns whether anything changed.
    pub fn update(&self, settings: LiveSettings) -> bool {
        let mut current = self.write();
        if *current == settings {
            return false;
        }
        *current = settings;
        true
    }

    pub fn deployment_policy(&self) -> DeploymentPolicy {
        DeploymentPolicy::from_flag(self.read().block_deployment)
    }

    pub fn observability_timeout(&self) -> Duration {
        self.read().observability_timeout
    }

    pub fn cloud_events_target(&self) -> Option<String> {
        http_endpoint(self.read().cloud_events_endpoint.as_deref()).map(str::to_string)
    }

    fn read(&self) -> RwLockReadGuard<'_, LiveSettings> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, LiveSettings> {
        self.current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// `endpoint` trimmed, when it looks like an http(s) URL.
pub fn http_endpoint(endpoint: Option<&str>) -> Option<&str> {
    endpoint.map(str::trim).filter(|e| e.starts_with("http"))
}
