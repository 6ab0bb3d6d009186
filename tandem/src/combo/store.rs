//! Per-pair combo records, persisted beside the registry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::persist::{self, StoreError};

use super::ComboRecord;

#[derive(Debug, Default, Serialize, Deserialize)]
struct ComboDoc {
    version: u32,
    #[serde(default)]
    records: HashMap<String, ComboRecord>,
}

/// `combo-results.json` under the data root; one record per pair, re-runs
/// replace.
pub struct ComboStore {
    path: PathBuf,
    records: RwLock<HashMap<String, ComboRecord>>,
}

impl ComboStore {
    pub async fn open(data_root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = data_root.as_ref().join("combo-results.json");
        let records = persist::read_json::<ComboDoc>(&path)
            .await?
            .map(|doc| doc.records)
            .unwrap_or_default();
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub async fn get(&self, main: &str, executor: &str) -> Option<ComboRecord> {
        self.records
            .read()
            .await
            .get(&ComboRecord::pair_key(main, executor))
            .cloned()
    }

    pub async fn all(&self) -> Vec<ComboRecord> {
        let mut out: Vec<_> = self.records.read().await.values().cloned().collect();
        out.sort_by(|a, b| b.overall_score.cmp(&a.overall_score));
        out
    }

    pub async fn upsert(&self, record: ComboRecord) -> Result<(), StoreError> {
        let snapshot = {
            let mut records = self.records.write().await;
            records.insert(
                ComboRecord::pair_key(&record.main_model_id, &record.executor_model_id),
                record,
            );
            records.clone()
        };
        persist::write_json_atomic(
            &self.path,
            &ComboDoc {
                version: 1,
                records: snapshot,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combo::TierScores;
    use chrono::Utc;

    fn record(main: &str, executor: &str, overall: u32) -> ComboRecord {
        ComboRecord {
            main_model_id: main.to_string(),
            executor_model_id: executor.to_string(),
            overall_score: overall,
            tier_scores: TierScores::default(),
            category_scores: HashMap::new(),
            tests: Vec::new(),
            avg_latency_ms: 0,
            passed: 0,
            failed: 0,
            excluded: false,
            gate_failed: false,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn rerun_replaces_the_pair_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = ComboStore::open(dir.path()).await.unwrap();
        store.upsert(record("a", "b", 40)).await.unwrap();
        store.upsert(record("a", "b", 80)).await.unwrap();
        assert_eq!(store.all().await.len(), 1);
        assert_eq!(store.get("a", "b").await.unwrap().overall_score, 80);
    }

    #[tokio::test]
    async fn records_survive_reopen_sorted_by_score() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = ComboStore::open(dir.path()).await.unwrap();
            store.upsert(record("a", "b", 40)).await.unwrap();
            store.upsert(record("a", "c", 90)).await.unwrap();
        }
        let store = ComboStore::open(dir.path()).await.unwrap();
        let all = store.all().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].executor_model_id, "c");
    }
}
