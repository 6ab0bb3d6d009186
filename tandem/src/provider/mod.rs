//! Unified chat-completion client for upstream model providers.
//!
//! One [`ProviderClient`] per provider target, reused across turns (the
//! reqwest client is the connection pool). Targets: a local inference host
//! speaking the OpenAI HTTP shape, a hosted OpenAI-compatible API, or an
//! Azure-style deployment. Local calls attach a stop-sequence list to
//! suppress chat-template leakage.
//!
//! All failures are values ([`ProviderError`]); nothing crosses the router
//! boundary as a panic. Transport errors are retried once with jittered
//! backoff; timeouts and protocol errors are surfaced as-is.

mod mock;
mod request;
mod response;

pub use mock::{Reply, ScriptedBackend};
pub use response::{ChatResponse, ResponseMessage, Usage};

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

use crate::message::{Message, ToolSpec};

/// Stop sequences attached to local-host calls so chat-template control
/// tokens never leak into content.
pub const LOCAL_STOP_SEQUENCES: &[&str] = &[
    "<|im_end|>",
    "<|im_start|>",
    "<|endoftext|>",
    "<|eot_id|>",
    "</s>",
];

/// Tool choice signaling for a chat call: model may pick (auto), must not
/// call tools (none), or must call one (required).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ToolChoiceMode {
    #[default]
    Auto,
    None,
    Required,
}

impl ToolChoiceMode {
    pub fn as_wire(&self) -> &'static str {
        match self {
            ToolChoiceMode::Auto => "auto",
            ToolChoiceMode::None => "none",
            ToolChoiceMode::Required => "required",
        }
    }
}

/// Upstream provider target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provider {
    /// Local inference host, OpenAI-compatible (LM Studio, Ollama, llama.cpp).
    Local { base_url: String },
    /// Hosted OpenAI-compatible API. `api_key_env` names the credential variable.
    OpenAiCompatible { base_url: String, api_key_env: String },
    /// Azure-style deployment: per-deployment URL and `api-key` header.
    Azure {
        endpoint: String,
        deployment: String,
        api_version: String,
        api_key_env: String,
    },
}

impl Provider {
    /// Local host with the conventional default base URL.
    pub fn local_default() -> Self {
        Provider::Local {
            base_url: "http://localhost:1234".to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Local { .. } => "local",
            Provider::OpenAiCompatible { .. } => "openai",
            Provider::Azure { .. } => "azure",
        }
    }

    fn chat_url(&self) -> String {
        match self {
            Provider::Local { base_url } | Provider::OpenAiCompatible { base_url, .. } => {
                format!("{}/v1/chat/completions", base_url.trim_end_matches('/'))
            }
            Provider::Azure {
                endpoint,
                deployment,
                api_version,
                ..
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint.trim_end_matches('/'),
                deployment,
                api_version
            ),
        }
    }

    fn models_url(&self) -> String {
        match self {
            Provider::Local { base_url } | Provider::OpenAiCompatible { base_url, .. } => {
                format!("{}/v1/models", base_url.trim_end_matches('/'))
            }
            Provider::Azure {
                endpoint,
                api_version,
                ..
            } => format!(
                "{}/openai/models?api-version={}",
                endpoint.trim_end_matches('/'),
                api_version
            ),
        }
    }

    /// Stop sequences for this provider; only local hosts need them.
    fn stop_sequences(&self) -> Option<Vec<String>> {
        match self {
            Provider::Local { .. } => {
                Some(LOCAL_STOP_SEQUENCES.iter().map(|s| s.to_string()).collect())
            }
            _ => None,
        }
    }
}

/// Per-call options.
#[derive(Clone, Debug)]
pub struct CallOptions {
    pub timeout: Duration,
    pub tool_choice: ToolChoiceMode,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            tool_choice: ToolChoiceMode::Auto,
            temperature: None,
            max_tokens: None,
        }
    }
}

impl CallOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Deterministic options used by probe runs.
    pub fn deterministic(timeout: Duration) -> Self {
        Self {
            timeout,
            temperature: Some(0.0),
            ..Self::default()
        }
    }
}

/// Errors from provider calls, by error class of the handling policy:
/// transport retried once, timeout and protocol surfaced, configuration
/// rejected at the boundary.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("timeout after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
    #[error("protocol: {detail}")]
    Protocol { status: Option<u16>, detail: String },
    #[error("configuration: {0}")]
    Configuration(String),
}

impl ProviderError {
    fn retryable(&self) -> bool {
        matches!(self, ProviderError::Transport(_))
    }

    /// Failure-log error text for classification (`classify_error_type`).
    pub fn failure_text(&self) -> String {
        self.to_string()
    }
}

/// The chat seam: everything that talks to a model goes through this trait,
/// so probes, the router, and the combo evaluator can run against a scripted
/// backend in tests.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        tools: Option<&[ToolSpec]>,
        opts: &CallOptions,
    ) -> Result<ChatResponse, ProviderError>;

    /// Model ids the provider currently serves.
    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        Ok(Vec::new())
    }

    /// Provider name for failure-log entries and profile documents.
    fn provider_name(&self) -> &str {
        "unknown"
    }
}

/// Real provider client: reqwest pool plus provider target.
pub struct ProviderClient {
    http: reqwest::Client,
    provider: Provider,
}

impl ProviderClient {
    pub fn new(provider: Provider) -> Result<Self, ProviderError> {
        // Auth is resolved per call, but a missing credential variable is a
        // startup configuration error, not a per-turn surprise.
        if let Some(env) = match &provider {
            Provider::OpenAiCompatible { api_key_env, .. } => Some(api_key_env),
            Provider::Azure { api_key_env, .. } => Some(api_key_env),
            Provider::Local { .. } => None,
        } {
            if std::env::var(env).is_err() {
                return Err(ProviderError::Configuration(format!(
                    "credential variable {env} is not set"
                )));
            }
        }
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;
        Ok(Self { http, provider })
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    fn auth_headers(&self) -> Result<Vec<(&'static str, String)>, ProviderError> {
        match &self.provider {
            Provider::Local { .. } => Ok(Vec::new()),
            Provider::OpenAiCompatible { api_key_env, .. } => {
                let key = std::env::var(api_key_env)
                    .map_err(|_| ProviderError::Configuration(format!("{api_key_env} not set")))?;
                Ok(vec![("authorization", format!("Bearer {key}"))])
            }
            Provider::Azure { api_key_env, .. } => {
                let key = std::env::var(api_key_env)
                    .map_err(|_| ProviderError::Configuration(format!("{api_key_env} not set")))?;
                Ok(vec![("api-key", key)])
            }
        }
    }

    async fn send_once(
        &self,
        url: &str,
        body: &serde_json::Value,
        timeout: Duration,
        started: Instant,
    ) -> Result<ChatResponse, ProviderError> {
        let mut req = self.http.post(url).json(body).timeout(timeout);
        for (name, value) in self.auth_headers()? {
            req = req.header(name, value);
        }
        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    elapsed_ms: started.elapsed().as_millis() as u64,
                }
            } else {
                ProviderError::Transport(e.to_string())
            }
        })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        if status.is_server_error() {
            return Err(ProviderError::Transport(format!(
                "upstream {status}: {}",
                truncate(&text, 200)
            )));
        }
        if !status.is_success() {
            return Err(ProviderError::Protocol {
                status: Some(status.as_u16()),
                detail: truncate(&text, 400),
            });
        }
        let body: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            ProviderError::Protocol {
                status: Some(status.as_u16()),
                detail: format!("malformed body: {e}"),
            }
        })?;
        let response = ChatResponse::new(body, started.elapsed().as_millis() as u64);
        // The envelope guarantee: choices[0].message must exist, even if both
        // content and tool_calls are empty.
        response.message()?;
        Ok(response)
    }
}

#[async_trait]
impl ChatBackend for ProviderClient {
    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        tools: Option<&[ToolSpec]>,
        opts: &CallOptions,
    ) -> Result<ChatResponse, ProviderError> {
        if model.is_empty() {
            return Err(ProviderError::Configuration("missing model id".to_string()));
        }
        let url = self.provider.chat_url();
        let body = request::chat_payload(model, messages, tools, opts, self.provider.stop_sequences());
        let started = Instant::now();
        debug!(model, url = %url, "provider call");

        match self.send_once(&url, &body, opts.timeout, started).await {
            Ok(resp) => Ok(resp),
            Err(e) if e.retryable() => {
                let backoff = Duration::from_millis(rand::thread_rng().gen_range(100..400));
                warn!(model, error = %e, backoff_ms = backoff.as_millis() as u64, "transport error, retrying once");
                tokio::time::sleep(backoff).await;
                self.send_once(&url, &body, opts.timeout, Instant::now()).await
            }
            Err(e) => Err(e),
        }
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let mut req = self.http.get(self.provider.models_url());
        for (name, value) in self.auth_headers()? {
            req = req.header(name, value);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ProviderError::Protocol {
                status: Some(resp.status().as_u16()),
                detail: "model listing failed".to_string(),
            });
        }
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Protocol {
                status: None,
                detail: format!("malformed model list: {e}"),
            })?;
        let ids = body["data"]
            .as_array()
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m["id"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        Ok(ids)
    }

    fn provider_name(&self) -> &str {
        self.provider.name()
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}
