use crate::error::ProviderError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;

pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of a connection probe.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub latency_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_hint: Option<u64>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub modified_at: Option<OffsetDateTime>,
}

/// A structured generation request, shared by all providers.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub model: String,
    /// Sampling temperature, `0.0..=2.0`
    pub temperature: f32,
    pub max_tokens: u32,
    /// Deadline for the whole call; enforced at the next suspension point.
    pub timeout: Duration,
}

impl GenerationRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            model: model.into(),
            temperature: 0.1,
            max_tokens: 2000,
            timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }
}

/// A successful generation, tagged with which attempt produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaggedGeneration {
    pub value: serde_json::Value,
    pub provider: String,
    pub model: String,
    /// Index into the gateway's attempt order; 0 is the primary.
    ///
    /// Metadata only. Callers must not derive ordering semantics from it.
    pub attempt_index: usize,
}

/// One failed attempt, as recorded by the gateway.
#[derive(Debug)]
pub struct AttemptFailure {
    pub provider: String,
    pub error: ProviderError,
}
