//! Prosthetic store: per-model corrective prompt fragments.
//!
//! A prosthetic is a stored fragment that, injected into a model's system
//! prompt, measurably improves behavior on a known failure pattern. The
//! router reads at most once per turn per model; updates arrive out-of-band
//! from the controller workflow.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::persist::{self, StoreError};

/// One corrective fragment. Level 1 is a gentle reminder; level 3 is fully
/// prescriptive step-by-step instructions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prosthetic {
    pub text: String,
    pub level: u8,
    /// Pattern this fragment was written against, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_id: Option<String>,
}

impl Prosthetic {
    pub fn new(text: impl Into<String>, level: u8) -> Self {
        Self {
            text: text.into(),
            level: level.clamp(1, 3),
            pattern_id: None,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProstheticDoc {
    version: u32,
    #[serde(default)]
    by_model: HashMap<String, Prosthetic>,
}

/// Durable (model → fragment) map at `prosthetics.json` under the data root.
pub struct ProstheticStore {
    path: PathBuf,
    by_model: RwLock<HashMap<String, Prosthetic>>,
}

impl ProstheticStore {
    pub async fn open(data_root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = data_root.as_ref().join("prosthetics.json");
        let by_model = persist::read_json::<ProstheticDoc>(&path)
            .await?
            .map(|doc| doc.by_model)
            .unwrap_or_default();
        info!(count = by_model.len(), "prosthetic store loaded");
        Ok(Self {
            path,
            by_model: RwLock::new(by_model),
        })
    }

    pub async fn get(&self, model_id: &str) -> Option<Prosthetic> {
        self.by_model.read().await.get(model_id).cloned()
    }

    pub async fn set(&self, model_id: &str, prosthetic: Prosthetic) -> Result<(), StoreError> {
        let snapshot = {
            let mut map = self.by_model.write().await;
            map.insert(model_id.to_string(), prosthetic);
            map.clone()
        };
        self.save(snapshot).await
    }

    pub async fn remove(&self, model_id: &str) -> Result<(), StoreError> {
        let snapshot = {
            let mut map = self.by_model.write().await;
            map.remove(model_id);
            map.clone()
        };
        self.save(snapshot).await
    }

    async fn save(&self, by_model: HashMap<String, Prosthetic>) -> Result<(), StoreError> {
        persist::write_json_atomic(&self.path, &ProstheticDoc { version: 1, by_model }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProstheticStore::open(dir.path()).await.unwrap();
        store
            .set("m", Prosthetic::new("Always call the named tool.", 1))
            .await
            .unwrap();
        assert_eq!(store.get("m").await.unwrap().level, 1);

        let reopened = ProstheticStore::open(dir.path()).await.unwrap();
        assert_eq!(
            reopened.get("m").await.unwrap().text,
            "Always call the named tool."
        );
    }

    #[tokio::test]
    async fn level_is_clamped() {
        assert_eq!(Prosthetic::new("x", 0).level, 1);
        assert_eq!(Prosthetic::new("x", 9).level, 3);
    }

    #[tokio::test]
    async fn missing_model_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProstheticStore::open(dir.path()).await.unwrap();
        assert!(store.get("absent").await.is_none());
    }
}
