//! Client for the semantic-search (RAG) collaborator. The core never
//! performs semantic search itself.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("rag transport: {0}")]
    Transport(String),
    #[error("rag protocol: {0}")]
    Protocol(String),
}

/// Filter for a RAG query.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagQuery {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<RagFilter>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RagResult {
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub snippet: String,
    #[serde(default)]
    pub symbol_name: Option<String>,
    #[serde(default)]
    pub symbol_type: Option<String>,
    #[serde(default)]
    pub language: String,
    pub score: f64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RagResponse {
    pub results: Vec<RagResult>,
    pub query: String,
    #[serde(default)]
    pub latency: u64,
    #[serde(default)]
    pub total_results: u32,
}

/// Proxy route: forwards a query to the indexer collaborator so dashboard
/// clients reach it through one base URL.
pub async fn rag_query(
    axum::extract::State(state): axum::extract::State<std::sync::Arc<crate::app::AppState>>,
    axum::Json(query): axum::Json<RagQuery>,
) -> Result<axum::Json<RagResponse>, crate::response::ApiError> {
    state
        .rag
        .query(query)
        .await
        .map(axum::Json)
        .map_err(|e| match e {
            RagError::Transport(msg) => {
                crate::response::ApiError::internal(format!("rag unavailable: {msg}"))
            }
            RagError::Protocol(msg) => crate::response::ApiError::internal(msg),
        })
}

/// HTTP client for the indexer service.
#[derive(Clone)]
pub struct RagClient {
    base_url: String,
    http: reqwest::Client,
}

impl RagClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn query(&self, query: RagQuery) -> Result<RagResponse, RagError> {
        let url = format!("{}/api/rag/query", self.base_url.trim_end_matches('/'));
        debug!(url = %url, query = %query.query, "rag query");
        let resp = self
            .http
            .post(&url)
            .json(&query)
            .send()
            .await
            .map_err(|e| RagError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(RagError::Protocol(format!("status {}", resp.status())));
        }
        resp.json::<RagResponse>()
            .await
            .map_err(|e| RagError::Protocol(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_serializes_camel_case() {
        let q = RagQuery {
            query: "port config".to_string(),
            limit: Some(5),
            filter: Some(RagFilter {
                file_types: vec!["rs".to_string()],
                paths: vec![],
            }),
        };
        let v = serde_json::to_value(&q).unwrap();
        assert_eq!(v["filter"]["fileTypes"][0], "rs");
        assert!(v["filter"].get("paths").is_none());
    }

    #[test]
    fn response_deserializes_wire_shape() {
        let body = serde_json::json!({
            "results": [{
                "filePath": "src/config.rs",
                "startLine": 10,
                "endLine": 24,
                "snippet": "let port = 8443;",
                "symbolName": "load",
                "symbolType": "function",
                "language": "rust",
                "score": 0.92
            }],
            "query": "port config",
            "latency": 12,
            "totalResults": 1
        });
        let resp: RagResponse = serde_json::from_value(body).unwrap();
        assert_eq!(resp.results[0].file_path, "src/config.rs");
        assert_eq!(resp.total_results, 1);
    }
}
