//! In-memory daemon for tests and offline use.
//!
//! Behaves like a freshly started tor with no torrc: every key is unset
//! until SETCONF assigns it, and a reset removes it again.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ConfSetting, ControlError, ControlResult, TorDaemon};

#[derive(Debug, Default)]
struct DaemonState {
    conf: HashMap<String, Vec<String>>,
    set_calls: usize,
    fail_get: Option<String>,
    fail_set: Option<String>,
}

/// In-memory [`TorDaemon`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryTorDaemon {
    state: Arc<RwLock<DaemonState>>,
}

impl InMemoryTorDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed `key` as if it came from torrc.
    pub async fn insert(&self, key: &str, values: &[&str]) {
        let mut state = self.state.write().await;
        state.conf.insert(
            key.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        );
    }

    /// Current values for `key`.
    pub async fn values(&self, key: &str) -> Vec<String> {
        let state = self.state.read().await;
        state.conf.get(key).cloned().unwrap_or_default()
    }

    /// Whether `UseBridges` is enabled.
    pub async fn use_bridges(&self) -> bool {
        self.values(super::keys::USE_BRIDGES)
            .await
            .first()
            .is_some_and(|v| v == "1")
    }

    /// Number of successful SETCONF calls.
    pub async fn set_calls(&self) -> usize {
        self.state.read().await.set_calls
    }

    /// Make every GETCONF fail with `message` (`None` restores normal behavior).
    pub async fn fail_get(&self, message: Option<&str>) {
        self.state.write().await.fail_get = message.map(str::to_string);
    }

    /// Make every SETCONF fail with `message` (`None` restores normal behavior).
    pub async fn fail_set(&self, message: Option<&str>) {
        self.state.write().await.fail_set = message.map(str::to_string);
    }
}

#[async_trait]
impl TorDaemon for InMemoryTorDaemon {
    async fn get_conf(&self, key: &str) -> ControlResult<Vec<String>> {
        let state = self.state.read().await;
        if let Some(ref message) = state.fail_get {
            return Err(ControlError::Rejected {
                code: 552,
                message: message.clone(),
            });
        }
        Ok(state.conf.get(key).cloned().unwrap_or_default())
    }

    async fn set_conf(&self, settings: &[ConfSetting]) -> ControlResult<()> {
        let mut state = self.state.write().await;
        if let Some(ref message) = state.fail_set {
            return Err(ControlError::Rejected {
                code: 553,
                message: message.clone(),
            });
        }
        for setting in settings {
            if setting.values.is_empty() {
                state.conf.remove(&setting.key);
            } else {
                state
                    .conf
                    .insert(setting.key.clone(), setting.values.clone());
            }
        }
        state.set_calls += 1;
        Ok(())
    }
}
