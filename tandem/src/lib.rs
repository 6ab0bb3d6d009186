//! # Tandem
//!
//! Context-management middleware for agentic LLM work: probe what each model
//! can and cannot do, route every turn through the right model (or pair of
//! models), and rewrite prompts and tool sets on the fly using corrective
//! fragments learned from observed failures.
//!
//! ## Main modules
//!
//! - [`provider`]: unified chat client for local hosts, hosted
//!   OpenAI-compatible APIs, and Azure-style deployments ([`ChatBackend`],
//!   [`ProviderClient`], [`ScriptedBackend`]).
//! - [`probe`]: the capability probe battery ([`probe::run_profile`],
//!   [`probe::CATALOG`], context-latency sweep).
//! - [`score`]: weighted capability scoring and role recommendation.
//! - [`registry`]: persistent per-model profiles ([`CapabilityRegistry`]).
//! - [`failure`]: per-workspace failure journal with pattern detection
//!   ([`FailureLog`]).
//! - [`prosthetic`]: corrective prompt fragments ([`ProstheticStore`]).
//! - [`router`]: single/dual-model dispatch ([`IntentRouter`], [`Intent`]).
//! - [`combo`]: main×executor pair evaluation and pairing recommendation.
//! - [`compress`]: transcript compression ([`compress::compress`]).
//! - [`ide`]: IDE tool-vocabulary mapping ([`IdeMapper`]).
//! - [`core`]: the startup-owned service handle ([`TandemCore`]).
//!
//! The dual-model pipeline in one line: client turn → IDE mapper → router →
//! (planning call → intent parse → execution call) → OpenAI-shaped response;
//! failures feed the journal, probes feed the registry, and both feed the
//! next turn's prompts.

pub mod cache;
pub mod combo;
pub mod compress;
pub mod core;
pub mod failure;
pub mod ide;
pub mod message;
pub mod persist;
pub mod probe;
pub mod prosthetic;
pub mod provider;
pub mod registry;
pub mod router;
pub mod score;

pub use cache::{Cache, CacheError, InMemoryCache};
pub use combo::{
    recommend_pairing, ComboEvaluator, ComboProgress, ComboRecord, ComboStore, PairingConstraints,
    PairingRecommendation,
};
pub use compress::{
    compress, estimate_tokens, CompressionAction, CompressionDecision, CompressionMode,
    CompressionResult, CompressionStats, CompressorConfig,
};
pub use self::core::{CoreError, TandemCore};
pub use failure::{
    classify_error_type, FailureCategory, FailureEntry, FailureFilter, FailureLog, FailurePattern,
    LogFailureParams, Severity,
};
pub use ide::{parse_ide_suffix, IdeMapper, IdeMapping, MappedCall, CANONICAL_TOOLS};
pub use message::{Message, Role, ToolCall, ToolSpec};
pub use persist::StoreError;
pub use probe::{
    run_profile, Axis, LatencyCurve, ProbeCategory, ProbeOptions, ProbeResult, ProfileResult,
    SpeedRating, ToolFormat,
};
pub use prosthetic::{Prosthetic, ProstheticStore};
pub use provider::{
    CallOptions, ChatBackend, ChatResponse, Provider, ProviderClient, ProviderError,
    ScriptedBackend, ToolChoiceMode,
};
pub use registry::{CapabilityRegistry, ModelProfile, OptimalSettings};
pub use router::{
    auto_select, Intent, IntentAction, IntentRouter, RouteMode, RouteRequest, RouteResult,
    RouterConfig, RouterError,
};
pub use score::{recommend_role, ModelRole, RawScores, ScoreBreakdown};
