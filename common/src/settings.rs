use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

/// Keys of the singleton configuration documents in the `setting` table.
pub const LLM: &str = "llm";
pub const SMTP: &str = "smtp";
pub const NOTIFICATIONS: &str = "notifications";
pub const PROCESSING: &str = "processing";

#[derive(Debug, thiserror::Error)]
#[error("invalid setting '{field}': {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

fn range(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ValidationError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError {
            field,
            message: format!("{value} not in [{min}, {max}]"),
        })
    }
}

/// One provider in the gateway's attempt order. The API key is stored
/// encrypted; it is decrypted only when constructing the provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_enc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_provider: Option<ProviderEntry>,
    pub fallback_providers: Vec<ProviderEntry>,
    pub default_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub confidence_threshold: f64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            primary_provider: None,
            fallback_providers: Vec::new(),
            default_model: "llama3".into(),
            temperature: 0.1,
            max_tokens: 2000,
            confidence_threshold: 0.8,
        }
    }
}

impl LlmSettings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        range("temperature", self.temperature as f64, 0.0, 2.0)?;
        range("max_tokens", self.max_tokens as f64, 100.0, 4000.0)?;
        range("confidence_threshold", self.confidence_threshold, 0.0, 1.0)?;
        Ok(())
    }

    /// The gateway attempt order: primary first, then fallbacks.
    pub fn attempt_order(&self) -> impl Iterator<Item = &ProviderEntry> {
        self.primary_provider
            .iter()
            .chain(self.fallback_providers.iter())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_enc: Option<String>,
    pub from: String,
    pub tls: bool,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 587,
            username: None,
            password_enc: None,
            from: "vulndash@localhost".into(),
            tls: true,
        }
    }
}

impl SmtpSettings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.is_empty() {
            return Err(ValidationError {
                field: "host",
                message: "must not be empty".into(),
            });
        }
        if self.from.is_empty() {
            return Err(ValidationError {
                field: "from",
                message: "must not be empty".into(),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct NotificationSettings {
    pub recipients: Vec<String>,
    pub alert_on_kev: bool,
    pub alert_on_high_epss: bool,
    pub epss_threshold: f64,
    pub digest_enabled: bool,
    pub digest_hours: u32,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            recipients: Vec::new(),
            alert_on_kev: true,
            alert_on_high_epss: true,
            epss_threshold: 0.5,
            digest_enabled: false,
            digest_hours: 24,
        }
    }
}

impl NotificationSettings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        range("epss_threshold", self.epss_threshold, 0.0, 1.0)?;
        range("digest_hours", self.digest_hours as f64, 1.0, 168.0)?;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ProcessingSettings {
    pub interval_minutes: u32,
    pub batch_size: u32,
    pub max_attempts: u32,
    pub raw_entry_retention_days: u32,
    pub max_raw_text_bytes: usize,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            interval_minutes: 30,
            batch_size: 10,
            max_attempts: 3,
            raw_entry_retention_days: 7,
            max_raw_text_bytes: 64 * 1024,
        }
    }
}

impl ProcessingSettings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        range("interval_minutes", self.interval_minutes as f64, 1.0, 1440.0)?;
        range("batch_size", self.batch_size as f64, 1.0, 100.0)?;
        range("max_attempts", self.max_attempts as f64, 1.0, 10.0)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    #[test_log::test]
    fn defaults_are_valid() {
        LlmSettings::default().validate().unwrap();
        SmtpSettings::default().validate().unwrap();
        NotificationSettings::default().validate().unwrap();
        ProcessingSettings::default().validate().unwrap();
    }

    #[rstest]
    #[case(-0.1)]
    #[case(1.1)]
    #[test_log::test]
    fn epss_threshold_out_of_range(#[case] value: f64) {
        let settings = NotificationSettings {
            epss_threshold: value,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[rstest]
    #[case(0, false)]
    #[case(1, true)]
    #[case(1440, true)]
    #[case(1441, false)]
    #[test_log::test]
    fn interval_bounds(#[case] minutes: u32, #[case] ok: bool) {
        let settings = ProcessingSettings {
            interval_minutes: minutes,
            ..Default::default()
        };
        assert_eq!(settings.validate().is_ok(), ok);
    }

    #[test_log::test]
    fn attempt_order_starts_with_primary() {
        let entry = |name: &str| ProviderEntry {
            provider: name.into(),
            base_url: None,
            api_key_enc: None,
            model: None,
        };

        let settings = LlmSettings {
            primary_provider: Some(entry("ollama")),
            fallback_providers: vec![entry("openai"), entry("anthropic")],
            ..Default::default()
        };

        let order: Vec<_> = settings
            .attempt_order()
            .map(|e| e.provider.as_str())
            .collect();
        assert_eq!(order, ["ollama", "openai", "anthropic"]);
    }
}
