pub mod endpoints;
pub mod service;

use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

/// Admin-facing request for the LLM settings. Secrets arrive in plaintext
/// and are encrypted before they touch the database; an absent key keeps the
/// stored one.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct LlmSettingsRequest {
    pub primary_provider: Option<ProviderEntryRequest>,
    pub fallback_providers: Vec<ProviderEntryRequest>,
    pub default_model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub confidence_threshold: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProviderEntryRequest {
    pub provider: String,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub base_url: Option<Url>,
    /// Plaintext API key; `None` keeps the key already stored for this
    /// provider name.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct SmtpSettingsRequest {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    /// Plaintext password; `None` keeps the stored one.
    pub password: Option<String>,
    pub from: Option<String>,
    pub tls: Option<bool>,
}
