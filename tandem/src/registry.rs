//! Capability registry: persistent per-model profiles.
//!
//! Read-mostly; the only writer is probe completion, which replaces a
//! model's profile document whole. Profiles live under
//! `profiles/<model>.json` relative to the data root.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::persist::{self, StoreError};
use crate::probe::{LatencyCurve, ProbeResult, ProfileResult, SpeedRating};
use crate::score::{ModelRole, RawScores};

/// Operating settings a probe run recommends for a model.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimalSettings {
    pub temperature: f32,
    pub context_size: u32,
}

impl Default for OptimalSettings {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            context_size: 8192,
        }
    }
}

/// One model's capability profile. Mutated only by probe completion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelProfile {
    pub model_id: String,
    pub provider: String,
    pub test_version: u32,
    pub tested_at: DateTime<Utc>,
    pub scores: RawScores,
    pub overall: u32,
    pub role: ModelRole,
    /// Executor (or main) partners this model scored well with.
    #[serde(default)]
    pub optimal_pairings: Vec<String>,
    #[serde(default)]
    pub settings: OptimalSettings,
    /// Canonical tools the executor stage may expose for this model.
    #[serde(default)]
    pub enabled_tools: Vec<String>,
    pub probes: Vec<ProbeResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<LatencyCurve>,
}

impl ModelProfile {
    /// Builds the profile document from a finished probe run.
    pub fn from_probe_run(result: ProfileResult, enabled_tools: Vec<String>) -> Self {
        let context_size = result
            .latency
            .as_ref()
            .map(|c| c.recommended_context)
            .filter(|&c| c > 0)
            .unwrap_or(OptimalSettings::default().context_size);
        Self {
            model_id: result.model_id,
            provider: result.provider,
            test_version: result.test_version,
            tested_at: result.tested_at,
            scores: result.scores,
            overall: result.overall,
            role: result.role,
            optimal_pairings: Vec::new(),
            settings: OptimalSettings {
                context_size,
                ..OptimalSettings::default()
            },
            enabled_tools,
            probes: result.probes,
            latency: result.latency,
        }
    }

    /// Score of a named probe, when it ran.
    pub fn probe_score(&self, name: &str) -> Option<u32> {
        self.probes
            .iter()
            .find(|p| p.test_name == name)
            .map(|p| p.score)
    }

    pub fn speed_rating(&self) -> Option<SpeedRating> {
        self.latency.as_ref().map(|c| c.speed_rating)
    }
}

/// File-safe name for a model id (ids may contain `/` or `:`).
fn profile_file_name(model_id: &str) -> String {
    let safe: String = model_id
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '.' || c == '_' { c } else { '_' })
        .collect();
    format!("{safe}.json")
}

/// Persistent store of model profiles.
pub struct CapabilityRegistry {
    dir: PathBuf,
    profiles: RwLock<HashMap<String, ModelProfile>>,
}

impl CapabilityRegistry {
    /// Opens the registry, loading every profile under `dir`.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        let mut profiles = HashMap::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|e| e != "json") {
                continue;
            }
            match persist::read_json::<ModelProfile>(&path).await {
                Ok(Some(profile)) => {
                    profiles.insert(profile.model_id.clone(), profile);
                }
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable profile"),
            }
        }
        info!(count = profiles.len(), dir = %dir.display(), "capability registry loaded");
        Ok(Self {
            dir,
            profiles: RwLock::new(profiles),
        })
    }

    pub async fn get(&self, model_id: &str) -> Option<ModelProfile> {
        self.profiles.read().await.get(model_id).cloned()
    }

    pub async fn all(&self) -> Vec<ModelProfile> {
        let mut out: Vec<_> = self.profiles.read().await.values().cloned().collect();
        out.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        out
    }

    /// Replaces a model's profile, whole. Never partially updates.
    pub async fn upsert(&self, profile: ModelProfile) -> Result<(), StoreError> {
        let path = self.dir.join(profile_file_name(&profile.model_id));
        persist::write_json_atomic(&path, &profile).await?;
        self.profiles
            .write()
            .await
            .insert(profile.model_id.clone(), profile);
        Ok(())
    }

    /// Records the partner list a combo run found for `model_id`.
    pub async fn set_pairings(
        &self,
        model_id: &str,
        pairings: Vec<String>,
    ) -> Result<(), StoreError> {
        let updated = {
            let mut profiles = self.profiles.write().await;
            let Some(profile) = profiles.get_mut(model_id) else {
                return Ok(());
            };
            profile.optimal_pairings = pairings;
            profile.clone()
        };
        let path = self.dir.join(profile_file_name(&updated.model_id));
        persist::write_json_atomic(&path, &updated).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::TEST_VERSION;

    fn profile(model_id: &str) -> ModelProfile {
        ModelProfile {
            model_id: model_id.to_string(),
            provider: "local".to_string(),
            test_version: TEST_VERSION,
            tested_at: Utc::now(),
            scores: RawScores::default(),
            overall: 70,
            role: ModelRole::Executor,
            optimal_pairings: Vec::new(),
            settings: OptimalSettings::default(),
            enabled_tools: vec!["read_file".to_string()],
            probes: Vec::new(),
            latency: None,
        }
    }

    #[tokio::test]
    async fn save_then_load_yields_identical_record() {
        let dir = tempfile::tempdir().unwrap();
        let registry = CapabilityRegistry::open(dir.path()).await.unwrap();
        registry.upsert(profile("org/model:7b")).await.unwrap();

        let reopened = CapabilityRegistry::open(dir.path()).await.unwrap();
        let loaded = reopened.get("org/model:7b").await.unwrap();
        assert_eq!(loaded.model_id, "org/model:7b");
        assert_eq!(loaded.overall, 70);
        assert_eq!(loaded.role, ModelRole::Executor);
        assert_eq!(loaded.enabled_tools, vec!["read_file".to_string()]);
    }

    #[tokio::test]
    async fn upsert_replaces_whole_profile() {
        let dir = tempfile::tempdir().unwrap();
        let registry = CapabilityRegistry::open(dir.path()).await.unwrap();
        registry.upsert(profile("m")).await.unwrap();
        let mut second = profile("m");
        second.overall = 90;
        second.enabled_tools = Vec::new();
        registry.upsert(second).await.unwrap();

        let current = registry.get("m").await.unwrap();
        assert_eq!(current.overall, 90);
        assert!(current.enabled_tools.is_empty());
        assert_eq!(registry.all().await.len(), 1);
    }

    #[tokio::test]
    async fn set_pairings_persists() {
        let dir = tempfile::tempdir().unwrap();
        let registry = CapabilityRegistry::open(dir.path()).await.unwrap();
        registry.upsert(profile("m")).await.unwrap();
        registry
            .set_pairings("m", vec!["exec-1".to_string()])
            .await
            .unwrap();
        let reopened = CapabilityRegistry::open(dir.path()).await.unwrap();
        assert_eq!(
            reopened.get("m").await.unwrap().optimal_pairings,
            vec!["exec-1".to_string()]
        );
    }

    #[test]
    fn profile_file_name_is_file_safe() {
        assert_eq!(profile_file_name("org/model:7b"), "org_model_7b.json");
    }
}
