//! Failure log: per-workspace append-only journal with pattern detection.
//!
//! One versioned JSON document per workspace under
//! `projects/<hash>/failure-log.json`. Writes are serialized behind a mutex
//! and flushed atomically on every state change; reads see the last
//! completed write. Entries are append-only until resolution; patterns are
//! derived and re-derivable from entries.

mod classify;
mod patterns;

pub use classify::{classify_error_type, fingerprint};
pub use patterns::{detect, pattern_def, FailureCategory, PatternDef, Severity, PATTERNS};

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::persist::{self, StoreError};

/// Current document schema version.
pub const DOC_VERSION: u32 = 2;

/// Bounded example list per pattern.
const MAX_PATTERN_EXAMPLES: usize = 10;

/// One production failure. Immutable after creation except resolution fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FailureEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_model_id: Option<String>,
    pub category: FailureCategory,
    pub error_type: String,
    pub fingerprint: String,
    pub conversation_depth: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_id: Option<String>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
}

/// Mutable per-pattern state (the static half lives in the catalog).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PatternState {
    pub count: u64,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    /// Entry ids, capped at ten.
    #[serde(default)]
    pub examples: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_prosthetic: Option<String>,
}

/// Catalog + state view returned by pattern queries.
#[derive(Clone, Debug, Serialize)]
pub struct FailurePattern {
    pub id: String,
    pub name: String,
    pub severity: Severity,
    pub count: u64,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub examples: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_prosthetic: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FailureStats {
    pub total: u64,
    pub resolved: u64,
    #[serde(default)]
    pub by_category: HashMap<String, u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct FailureLogDoc {
    version: u32,
    next_id: u64,
    entries: Vec<FailureEntry>,
    #[serde(default)]
    patterns: HashMap<String, PatternState>,
    #[serde(default)]
    stats: FailureStats,
}

impl Default for FailureLogDoc {
    fn default() -> Self {
        Self {
            version: DOC_VERSION,
            next_id: 1,
            entries: Vec::new(),
            patterns: HashMap::new(),
            stats: FailureStats::default(),
        }
    }
}

impl FailureLogDoc {
    fn recompute_stats(&mut self) {
        let mut stats = FailureStats {
            total: self.entries.len() as u64,
            resolved: self.entries.iter().filter(|e| e.resolved).count() as u64,
            by_category: HashMap::new(),
        };
        for entry in &self.entries {
            *stats
                .by_category
                .entry(entry.category.as_str().to_string())
                .or_default() += 1;
        }
        self.stats = stats;
    }

    /// Rebuilds pattern state from entries (used after bulk removals).
    fn rederive_patterns(&mut self) {
        let suggestions: HashMap<String, String> = self
            .patterns
            .iter()
            .filter_map(|(id, s)| s.suggested_prosthetic.clone().map(|p| (id.clone(), p)))
            .collect();
        self.patterns.clear();
        let entries = std::mem::take(&mut self.entries);
        for entry in &entries {
            if let Some(pattern_id) = &entry.pattern_id {
                let state = self.patterns.entry(pattern_id.clone()).or_default();
                state.count += 1;
                state.first_seen.get_or_insert(entry.timestamp);
                state.last_seen = Some(entry.timestamp);
                if state.examples.len() < MAX_PATTERN_EXAMPLES {
                    state.examples.push(entry.id);
                }
            }
        }
        self.entries = entries;
        for (id, prosthetic) in suggestions {
            if let Some(state) = self.patterns.get_mut(&id) {
                state.suggested_prosthetic = Some(prosthetic);
            }
        }
    }
}

/// Inputs to [`FailureLog::log_failure`].
#[derive(Clone, Debug)]
pub struct LogFailureParams {
    pub model_id: String,
    pub executor_model_id: Option<String>,
    pub category: FailureCategory,
    /// Raw error text; classified by the rubric.
    pub error: String,
    /// The user query that failed; only its fingerprint is stored.
    pub query: String,
    pub conversation_depth: u32,
}

/// Query filters for [`FailureLog::get_failures`]. Default: everything,
/// newest first, first 50.
#[derive(Clone, Debug)]
pub struct FailureFilter {
    pub model_id: Option<String>,
    pub category: Option<FailureCategory>,
    pub pattern_id: Option<String>,
    pub resolved: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    pub offset: usize,
    pub limit: usize,
}

impl Default for FailureFilter {
    fn default() -> Self {
        Self {
            model_id: None,
            category: None,
            pattern_id: None,
            resolved: None,
            since: None,
            offset: 0,
            limit: 50,
        }
    }
}

struct LogState {
    workspace_hash: String,
    doc: FailureLogDoc,
}

/// The per-workspace failure journal.
pub struct FailureLog {
    data_root: PathBuf,
    state: Mutex<LogState>,
}

fn doc_path(data_root: &Path, workspace_hash: &str) -> PathBuf {
    data_root
        .join("projects")
        .join(workspace_hash)
        .join("failure-log.json")
}

/// Migrates an on-disk document to the current version.
fn migrate(value: Value) -> Result<FailureLogDoc, StoreError> {
    let found = value["version"].as_u64().unwrap_or(1) as u32;
    if found > DOC_VERSION {
        return Err(StoreError::Version {
            found,
            supported: DOC_VERSION,
        });
    }
    let mut doc: FailureLogDoc = serde_json::from_value(value)?;
    if found < DOC_VERSION {
        // v1 → v2: stats were introduced; everything else is shape-stable.
        doc.version = DOC_VERSION;
        doc.recompute_stats();
    }
    Ok(doc)
}

async fn load_doc(data_root: &Path, workspace_hash: &str) -> Result<FailureLogDoc, StoreError> {
    match persist::read_value(&doc_path(data_root, workspace_hash)).await? {
        Some(value) => migrate(value),
        None => Ok(FailureLogDoc::default()),
    }
}

impl FailureLog {
    /// Opens (or creates) the journal for one workspace.
    pub async fn open(
        data_root: impl AsRef<Path>,
        workspace_hash: &str,
    ) -> Result<Self, StoreError> {
        let data_root = data_root.as_ref().to_path_buf();
        let doc = load_doc(&data_root, workspace_hash).await?;
        info!(
            workspace = workspace_hash,
            entries = doc.entries.len(),
            "failure log opened"
        );
        Ok(Self {
            data_root,
            state: Mutex::new(LogState {
                workspace_hash: workspace_hash.to_string(),
                doc,
            }),
        })
    }

    /// Rebinds to another workspace when the hash changed. Dependents call
    /// this lazily before reads after a workspace switch.
    pub async fn ensure_workspace(&self, workspace_hash: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.workspace_hash == workspace_hash {
            return Ok(());
        }
        debug!(from = %state.workspace_hash, to = workspace_hash, "failure log rebinding");
        state.doc = load_doc(&self.data_root, workspace_hash).await?;
        state.workspace_hash = workspace_hash.to_string();
        Ok(())
    }

    async fn flush(&self, state: &LogState) -> Result<(), StoreError> {
        let path = doc_path(&self.data_root, &state.workspace_hash);
        if let Err(e) = persist::write_json_atomic(&path, &state.doc).await {
            // In-memory state stays consistent; the next mutation retries.
            warn!(error = %e, "failure log flush failed");
            return Err(e);
        }
        Ok(())
    }

    /// Classifies, fingerprints, detects the pattern, appends, and flushes.
    pub async fn log_failure(
        &self,
        params: LogFailureParams,
    ) -> Result<FailureEntry, StoreError> {
        let error_type = classify_error_type(&params.error).to_string();
        let pattern = detect(params.category, &error_type);
        let mut state = self.state.lock().await;

        let entry = FailureEntry {
            id: state.doc.next_id,
            timestamp: Utc::now(),
            model_id: params.model_id,
            executor_model_id: params.executor_model_id,
            category: params.category,
            error_type,
            fingerprint: fingerprint(&params.query),
            conversation_depth: params.conversation_depth,
            pattern_id: pattern.map(|p| p.id.to_string()),
            resolved: false,
            resolved_by: None,
        };
        state.doc.next_id += 1;

        if let Some(def) = pattern {
            let pattern_state = state.doc.patterns.entry(def.id.to_string()).or_default();
            pattern_state.count += 1;
            pattern_state.first_seen.get_or_insert(entry.timestamp);
            pattern_state.last_seen = Some(entry.timestamp);
            if pattern_state.examples.len() < MAX_PATTERN_EXAMPLES {
                pattern_state.examples.push(entry.id);
            }
        }

        state.doc.entries.push(entry.clone());
        state.doc.recompute_stats();
        self.flush(&state).await?;
        debug!(id = entry.id, error_type = %entry.error_type, "failure logged");
        Ok(entry)
    }

    /// Filtered entries, newest first.
    pub async fn get_failures(&self, filter: &FailureFilter) -> Vec<FailureEntry> {
        let state = self.state.lock().await;
        let mut out: Vec<FailureEntry> = state
            .doc
            .entries
            .iter()
            .filter(|e| filter.model_id.as_ref().is_none_or(|m| &e.model_id == m))
            .filter(|e| filter.category.is_none_or(|c| e.category == c))
            .filter(|e| {
                filter
                    .pattern_id
                    .as_ref()
                    .is_none_or(|p| e.pattern_id.as_ref() == Some(p))
            })
            .filter(|e| filter.resolved.is_none_or(|r| e.resolved == r))
            .filter(|e| filter.since.is_none_or(|s| e.timestamp >= s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        out.into_iter().skip(filter.offset).take(filter.limit).collect()
    }

    /// All observed patterns, sorted by count descending.
    pub async fn get_patterns(&self) -> Vec<FailurePattern> {
        let state = self.state.lock().await;
        let mut out: Vec<FailurePattern> = state
            .doc
            .patterns
            .iter()
            .filter_map(|(id, s)| {
                pattern_def(id).map(|def| FailurePattern {
                    id: id.clone(),
                    name: def.name.to_string(),
                    severity: def.severity,
                    count: s.count,
                    first_seen: s.first_seen,
                    last_seen: s.last_seen,
                    examples: s.examples.clone(),
                    suggested_prosthetic: s.suggested_prosthetic.clone(),
                })
            })
            .collect();
        out.sort_by(|a, b| b.count.cmp(&a.count).then(a.id.cmp(&b.id)));
        out
    }

    /// Patterns with at least `threshold` occurrences.
    pub async fn patterns_above_threshold(&self, threshold: u64) -> Vec<FailurePattern> {
        self.get_patterns()
            .await
            .into_iter()
            .filter(|p| p.count >= threshold)
            .collect()
    }

    /// Marks entries resolved, crediting the prosthetic that fixed them.
    pub async fn mark_resolved(
        &self,
        ids: &[u64],
        prosthetic_id: &str,
    ) -> Result<usize, StoreError> {
        let mut state = self.state.lock().await;
        let mut touched_patterns = Vec::new();
        let mut updated = 0;
        for entry in state.doc.entries.iter_mut() {
            if ids.contains(&entry.id) && !entry.resolved {
                entry.resolved = true;
                entry.resolved_by = Some(prosthetic_id.to_string());
                if let Some(p) = &entry.pattern_id {
                    touched_patterns.push(p.clone());
                }
                updated += 1;
            }
        }
        for pattern_id in touched_patterns {
            if let Some(pattern_state) = state.doc.patterns.get_mut(&pattern_id) {
                pattern_state.suggested_prosthetic = Some(prosthetic_id.to_string());
            }
        }
        if updated > 0 {
            state.doc.recompute_stats();
            self.flush(&state).await?;
        }
        Ok(updated)
    }

    /// Removes resolved entries older than `days`; unresolved entries are
    /// kept regardless of age.
    pub async fn clear_old(&self, days: i64) -> Result<usize, StoreError> {
        let cutoff = Utc::now() - Duration::days(days);
        let mut state = self.state.lock().await;
        let before = state.doc.entries.len();
        state
            .doc
            .entries
            .retain(|e| !e.resolved || e.timestamp >= cutoff);
        let removed = before - state.doc.entries.len();
        if removed > 0 {
            state.doc.rederive_patterns();
            state.doc.recompute_stats();
            self.flush(&state).await?;
        }
        Ok(removed)
    }

    /// Removes every entry for one model and re-derives patterns.
    pub async fn clear_for_model(&self, model_id: &str) -> Result<usize, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.doc.entries.len();
        state.doc.entries.retain(|e| e.model_id != model_id);
        let removed = before - state.doc.entries.len();
        if removed > 0 {
            state.doc.rederive_patterns();
            state.doc.recompute_stats();
            self.flush(&state).await?;
        }
        Ok(removed)
    }

    pub async fn stats(&self) -> FailureStats {
        self.state.lock().await.doc.stats.clone()
    }

    /// Total entry count (monotonic except for explicit clears).
    pub async fn len(&self) -> usize {
        self.state.lock().await.doc.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_failure(model: &str) -> LogFailureParams {
        LogFailureParams {
            model_id: model.to_string(),
            executor_model_id: None,
            category: FailureCategory::Tool,
            error: "tool not called despite instruction".to_string(),
            query: "read the file 'a.rs'".to_string(),
            conversation_depth: 2,
        }
    }

    #[tokio::test]
    async fn five_suppression_failures_form_a_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let log = FailureLog::open(dir.path(), "abc123").await.unwrap();
        for _ in 0..5 {
            log.log_failure(tool_failure("m")).await.unwrap();
        }
        let patterns = log.patterns_above_threshold(5).await;
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].id, "TOOL_SUPPRESSION");
        assert!(patterns[0].count >= 5);
        assert_eq!(patterns[0].severity, Severity::High);
    }

    #[tokio::test]
    async fn entries_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let log = FailureLog::open(dir.path(), "ws1").await.unwrap();
            log.log_failure(tool_failure("m")).await.unwrap();
        }
        let log = FailureLog::open(dir.path(), "ws1").await.unwrap();
        assert_eq!(log.len().await, 1);
        let entries = log.get_failures(&FailureFilter::default()).await;
        assert_eq!(entries[0].error_type, "tool_not_called");
        assert_eq!(entries[0].pattern_id.as_deref(), Some("TOOL_SUPPRESSION"));
    }

    #[tokio::test]
    async fn workspaces_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let log = FailureLog::open(dir.path(), "ws1").await.unwrap();
        log.log_failure(tool_failure("m")).await.unwrap();

        log.ensure_workspace("ws2").await.unwrap();
        assert!(log.get_failures(&FailureFilter::default()).await.is_empty());

        log.ensure_workspace("ws1").await.unwrap();
        let entries = log.get_failures(&FailureFilter::default()).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].model_id, "m");
    }

    #[tokio::test]
    async fn filters_and_paging() {
        let dir = tempfile::tempdir().unwrap();
        let log = FailureLog::open(dir.path(), "ws").await.unwrap();
        log.log_failure(tool_failure("a")).await.unwrap();
        log.log_failure(tool_failure("b")).await.unwrap();
        log.log_failure(LogFailureParams {
            category: FailureCategory::Intent,
            error: "intent misread".to_string(),
            ..tool_failure("a")
        })
        .await
        .unwrap();

        let only_a = log
            .get_failures(&FailureFilter {
                model_id: Some("a".to_string()),
                ..FailureFilter::default()
            })
            .await;
        assert_eq!(only_a.len(), 2);

        let intents = log
            .get_failures(&FailureFilter {
                category: Some(FailureCategory::Intent),
                ..FailureFilter::default()
            })
            .await;
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].pattern_id.as_deref(), Some("INTENT_MISUNDERSTANDING"));

        let paged = log
            .get_failures(&FailureFilter {
                limit: 1,
                offset: 1,
                ..FailureFilter::default()
            })
            .await;
        assert_eq!(paged.len(), 1);
    }

    #[tokio::test]
    async fn mark_resolved_sets_fields_and_suggests_prosthetic() {
        let dir = tempfile::tempdir().unwrap();
        let log = FailureLog::open(dir.path(), "ws").await.unwrap();
        let entry = log.log_failure(tool_failure("m")).await.unwrap();
        let updated = log.mark_resolved(&[entry.id], "prosthetic-7").await.unwrap();
        assert_eq!(updated, 1);

        let entries = log.get_failures(&FailureFilter::default()).await;
        assert!(entries[0].resolved);
        assert_eq!(entries[0].resolved_by.as_deref(), Some("prosthetic-7"));
        let patterns = log.get_patterns().await;
        assert_eq!(
            patterns[0].suggested_prosthetic.as_deref(),
            Some("prosthetic-7")
        );
    }

    #[tokio::test]
    async fn clear_old_keeps_unresolved() {
        let dir = tempfile::tempdir().unwrap();
        let log = FailureLog::open(dir.path(), "ws").await.unwrap();
        let resolved = log.log_failure(tool_failure("m")).await.unwrap();
        log.log_failure(tool_failure("m")).await.unwrap();
        log.mark_resolved(&[resolved.id], "p").await.unwrap();

        // Cutoff in the future: resolved entries of any age are removed.
        let removed = log.clear_old(-1).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(log.len().await, 1);
        assert!(!log.get_failures(&FailureFilter::default()).await[0].resolved);
    }

    #[tokio::test]
    async fn clear_for_model_rederives_patterns() {
        let dir = tempfile::tempdir().unwrap();
        let log = FailureLog::open(dir.path(), "ws").await.unwrap();
        log.log_failure(tool_failure("gone")).await.unwrap();
        log.log_failure(tool_failure("kept")).await.unwrap();
        let removed = log.clear_for_model("gone").await.unwrap();
        assert_eq!(removed, 1);
        let patterns = log.get_patterns().await;
        assert_eq!(patterns[0].count, 1);
    }

    #[tokio::test]
    async fn v1_documents_migrate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("projects").join("ws").join("failure-log.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            serde_json::json!({
                "version": 1,
                "next_id": 2,
                "entries": [{
                    "id": 1,
                    "timestamp": "2025-11-02T10:00:00Z",
                    "model_id": "m",
                    "category": "tool",
                    "error_type": "wrong_tool",
                    "fingerprint": "aabbccddeeff0011",
                    "conversation_depth": 1,
                    "pattern_id": "WRONG_TOOL_SELECTION"
                }],
                "patterns": {}
            })
            .to_string(),
        )
        .unwrap();

        let log = FailureLog::open(dir.path(), "ws").await.unwrap();
        assert_eq!(log.len().await, 1);
        assert_eq!(log.stats().await.total, 1);
    }
}
