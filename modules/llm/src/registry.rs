use crate::provider::{LlmProvider, anthropic, ollama, openai};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};
use url::Url;

/// Configuration for a single provider instance. Secrets arrive here already
/// decrypted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model override for this provider; falls back to the global default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("unknown provider '{name}', known providers: {}", known.join(", "))]
    UnknownProvider { name: String, known: Vec<String> },
    #[error("provider '{provider}' requires field '{field}'")]
    MissingField {
        provider: &'static str,
        field: &'static str,
    },
    #[error("provider '{provider}': invalid '{field}': {message}")]
    InvalidField {
        provider: &'static str,
        field: &'static str,
        message: String,
    },
}

type Constructor =
    Arc<dyn Fn(&ProviderConfig) -> Result<Arc<dyn LlmProvider>, FactoryError> + Send + Sync>;

/// Process-wide mapping of provider name to constructor.
///
/// New providers may be registered at runtime; resolution of an unknown name
/// reports the known set.
pub struct ProviderRegistry {
    constructors: RwLock<BTreeMap<String, Constructor>>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        let registry = Self {
            constructors: RwLock::new(BTreeMap::new()),
        };

        registry.register(ollama::NAME, |config| {
            let base_url = config.base_url.clone().ok_or(FactoryError::MissingField {
                provider: ollama::NAME,
                field: "base_url",
            })?;
            Ok(Arc::new(ollama::OllamaProvider::new(base_url)))
        });

        registry.register(openai::NAME, |config| {
            let api_key = required_key(config, openai::NAME)?;
            let base_url = base_url_or(config, openai::NAME, openai::DEFAULT_BASE_URL)?;
            Ok(Arc::new(openai::OpenAiProvider::new(base_url, api_key)))
        });

        registry.register(anthropic::NAME, |config| {
            let api_key = required_key(config, anthropic::NAME)?;
            let base_url = base_url_or(config, anthropic::NAME, anthropic::DEFAULT_BASE_URL)?;
            Ok(Arc::new(anthropic::AnthropicProvider::new(
                base_url, api_key,
            )))
        });

        registry
    }
}

impl ProviderRegistry {
    pub fn register<F>(&self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&ProviderConfig) -> Result<Arc<dyn LlmProvider>, FactoryError>
            + Send
            + Sync
            + 'static,
    {
        self.constructors
            .write()
            .insert(name.into(), Arc::new(constructor));
    }

    pub fn known(&self) -> Vec<String> {
        self.constructors.read().keys().cloned().collect()
    }

    pub fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>, FactoryError> {
        let constructor = self
            .constructors
            .read()
            .get(&config.provider)
            .cloned()
            .ok_or_else(|| FactoryError::UnknownProvider {
                name: config.provider.clone(),
                known: self.known(),
            })?;

        constructor(config)
    }
}

fn required_key(config: &ProviderConfig, provider: &'static str) -> Result<String, FactoryError> {
    config
        .api_key
        .clone()
        .filter(|key| !key.is_empty())
        .ok_or(FactoryError::MissingField {
            provider,
            field: "api_key",
        })
}

fn base_url_or(
    config: &ProviderConfig,
    provider: &'static str,
    default: &str,
) -> Result<Url, FactoryError> {
    match &config.base_url {
        Some(url) => Ok(url.clone()),
        None => default.parse().map_err(|err| FactoryError::InvalidField {
            provider,
            field: "base_url",
            message: format!("{err}"),
        }),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn config(provider: &str) -> ProviderConfig {
        ProviderConfig {
            provider: provider.into(),
            base_url: Some("http://localhost:11434".parse().unwrap()),
            api_key: Some("key".into()),
            model: None,
        }
    }

    #[test_log::test]
    fn builtin_providers_resolve() {
        let registry = ProviderRegistry::default();
        for name in ["ollama", "openai", "anthropic"] {
            registry.create(&config(name)).expect(name);
        }
    }

    #[test_log::test]
    fn unknown_provider_lists_known() {
        let registry = ProviderRegistry::default();
        let err = registry.create(&config("watsonx")).unwrap_err();
        match err {
            FactoryError::UnknownProvider { name, known } => {
                assert_eq!(name, "watsonx");
                assert_eq!(known, vec!["anthropic", "ollama", "openai"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test_log::test]
    fn hosted_providers_require_api_key() {
        let registry = ProviderRegistry::default();
        let mut config = config("openai");
        config.api_key = None;

        assert!(matches!(
            registry.create(&config),
            Err(FactoryError::MissingField {
                field: "api_key",
                ..
            })
        ));
    }

    #[test_log::test]
    fn local_provider_requires_base_url() {
        let registry = ProviderRegistry::default();
        let mut config = config("ollama");
        config.base_url = None;

        assert!(matches!(
            registry.create(&config),
            Err(FactoryError::MissingField {
                field: "base_url",
                ..
            })
        ));
    }

    #[test_log::test]
    fn runtime_registration() {
        let registry = ProviderRegistry::default();
        registry.register("echo", |config| {
            let _ = config;
            Err(FactoryError::MissingField {
                provider: "echo",
                field: "nothing",
            })
        });

        assert!(registry.known().contains(&"echo".to_string()));
    }
}
