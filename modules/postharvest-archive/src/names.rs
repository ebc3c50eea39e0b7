//! Persisted viewer names: the detected name and the manual override.

use std::sync::Arc;

use postharvest_common::keys;
use serde_json::Value;

use crate::error::{ArchiveError, Result};
use crate::kv::KvStore;

#[derive(Clone)]
pub struct NameStore {
    kv: Arc<dyn KvStore>,
}

impl NameStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn viewer_name(&self) -> Result<Option<String>> {
        self.get(keys::VIEWER_NAME).await
    }

    pub async fn set_viewer_name(&self, name: &str) -> Result<()> {
        self.set(keys::VIEWER_NAME, name).await
    }

    pub async fn manual_override(&self) -> Result<Option<String>> {
        self.get(keys::MANUAL_OVERRIDE_NAME).await
    }

    /// An empty name clears the override.
    pub async fn set_manual_override(&self, name: &str) -> Result<()> {
        self.set(keys::MANUAL_OVERRIDE_NAME, name).await
    }

    /// The manual override when set, else the detected name.
    pub async fn effective_name(&self) -> Result<Option<String>> {
        match self.manual_override().await? {
            Some(name) => Ok(Some(name)),
            None => self.viewer_name().await,
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .kv
            .get(key)
            .await
            .map_err(|e| ArchiveError::Storage(format!("{e:#}")))?;
        Ok(value
            .and_then(|v| v.as_str().map(|s| s.trim().to_string()))
            .filter(|s| !s.is_empty()))
    }

    async fn set(&self, key: &str, name: &str) -> Result<()> {
        self.kv
            .set(key, Value::String(name.trim().to_string()))
            .await
            .map_err(|e| ArchiveError::Storage(format!("{e:#}")))
    }
}
