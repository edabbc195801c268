use super::{LlmSettingsRequest, SmtpSettingsRequest};
use crate::Error;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait, IntoActiveModel};
use tracing::instrument;
use uuid::Uuid;
use vulndash_common::{
    crypto::SecretCipher,
    db::Database,
    model::Revisioned,
    settings::{
        self, LlmSettings, NotificationSettings, ProcessingSettings, ProviderEntry, SmtpSettings,
    },
};
use vulndash_entity::setting;

/// Reads and writes of the singleton configuration documents.
///
/// Secrets are encrypted on the way in and stripped on the way out; readers
/// never see ciphertext or plaintext key material.
#[derive(Clone)]
pub struct SettingsService {
    db: Database,
    cipher: SecretCipher,
}

impl SettingsService {
    pub fn new(db: Database, cipher: SecretCipher) -> Self {
        Self { db, cipher }
    }

    /// Read a document for the admin surface, with secret fields removed.
    pub async fn read(&self, key: &str) -> Result<Revisioned<serde_json::Value>, Error> {
        let row = setting::Entity::find_by_id(key).one(&*self.db).await?;

        let (mut value, revision) = match row {
            Some(row) => (row.value, row.revision.to_string()),
            None => (self.default_document(key)?, String::new()),
        };

        redact(&mut value);

        Ok(Revisioned { value, revision })
    }

    #[instrument(skip_all, err)]
    pub async fn update_llm(&self, request: LlmSettingsRequest) -> Result<(), Error> {
        let stored: LlmSettings = setting::fetch(settings::LLM, &*self.db).await?;

        let mut next = LlmSettings {
            primary_provider: request
                .primary_provider
                .map(|entry| self.provider_entry(entry, &stored))
                .transpose()?,
            fallback_providers: request
                .fallback_providers
                .into_iter()
                .map(|entry| self.provider_entry(entry, &stored))
                .collect::<Result<_, _>>()?,
            ..stored
        };
        if let Some(model) = request.default_model {
            next.default_model = model;
        }
        if let Some(temperature) = request.temperature {
            next.temperature = temperature;
        }
        if let Some(max_tokens) = request.max_tokens {
            next.max_tokens = max_tokens;
        }
        if let Some(threshold) = request.confidence_threshold {
            next.confidence_threshold = threshold;
        }

        next.validate()
            .map_err(|err| Error::bad_request(err.to_string(), None::<&str>))?;

        self.store(settings::LLM, serde_json::to_value(&next)?).await
    }

    /// Resolve one provider entry, encrypting a fresh key or carrying over
    /// the stored one.
    fn provider_entry(
        &self,
        request: super::ProviderEntryRequest,
        stored: &LlmSettings,
    ) -> Result<ProviderEntry, Error> {
        let api_key_enc = match request.api_key {
            Some(plaintext) => Some(
                self.cipher
                    .encrypt(&plaintext)
                    .map_err(|err| Error::Internal(err.to_string()))?,
            ),
            None => stored
                .attempt_order()
                .find(|entry| entry.provider == request.provider)
                .and_then(|entry| entry.api_key_enc.clone()),
        };

        Ok(ProviderEntry {
            provider: request.provider,
            base_url: request.base_url,
            api_key_enc,
            model: request.model,
        })
    }

    #[instrument(skip_all, err)]
    pub async fn update_smtp(&self, request: SmtpSettingsRequest) -> Result<(), Error> {
        let stored: SmtpSettings = setting::fetch(settings::SMTP, &*self.db).await?;

        let next = SmtpSettings {
            host: request.host.unwrap_or(stored.host),
            port: request.port.unwrap_or(stored.port),
            username: request.username.or(stored.username),
            password_enc: match request.password {
                Some(plaintext) => Some(
                    self.cipher
                        .encrypt(&plaintext)
                        .map_err(|err| Error::Internal(err.to_string()))?,
                ),
                None => stored.password_enc,
            },
            from: request.from.unwrap_or(stored.from),
            tls: request.tls.unwrap_or(stored.tls),
        };

        next.validate()
            .map_err(|err| Error::bad_request(err.to_string(), None::<&str>))?;

        self.store(settings::SMTP, serde_json::to_value(&next)?)
            .await
    }

    #[instrument(skip_all, err)]
    pub async fn update_notifications(&self, next: NotificationSettings) -> Result<(), Error> {
        next.validate()
            .map_err(|err| Error::bad_request(err.to_string(), None::<&str>))?;

        self.store(settings::NOTIFICATIONS, serde_json::to_value(&next)?)
            .await
    }

    #[instrument(skip_all, err)]
    pub async fn update_processing(&self, next: ProcessingSettings) -> Result<(), Error> {
        next.validate()
            .map_err(|err| Error::bad_request(err.to_string(), None::<&str>))?;

        self.store(settings::PROCESSING, serde_json::to_value(&next)?)
            .await
    }

    /// The decrypted LLM settings, for internal consumers only.
    pub async fn llm_settings(&self) -> Result<LlmSettings, Error> {
        Ok(setting::fetch(settings::LLM, &*self.db).await?)
    }

    async fn store(&self, key: &str, value: serde_json::Value) -> Result<(), Error> {
        let existing = setting::Entity::find_by_id(key).one(&*self.db).await?;

        match existing {
            Some(row) => {
                let mut active = row.into_active_model();
                active.value = Set(value);
                active.revision = Set(Uuid::now_v7());
                active.update(&*self.db).await?;
            }
            None => {
                let row = setting::ActiveModel {
                    key: Set(key.to_string()),
                    value: Set(value),
                    revision: Set(Uuid::now_v7()),
                };
                row.insert(&*self.db).await?;
            }
        }

        Ok(())
    }

    fn default_document(&self, key: &str) -> Result<serde_json::Value, Error> {
        Ok(match key {
            settings::LLM => serde_json::to_value(LlmSettings::default())?,
            settings::SMTP => serde_json::to_value(SmtpSettings::default())?,
            settings::NOTIFICATIONS => serde_json::to_value(NotificationSettings::default())?,
            settings::PROCESSING => serde_json::to_value(ProcessingSettings::default())?,
            other => return Err(Error::NotFound(other.to_string())),
        })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

/// Drop every `*_enc` field, recursively. What remains is safe to show.
fn redact(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            map.retain(|key, _| !key.ends_with("_enc"));
            for value in map.values_mut() {
                redact(value);
            }
        }
        serde_json::Value::Array(values) => {
            for value in values {
                redact(value);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test_log::test]
    fn redact_strips_nested_secrets() {
        let mut value = json!({
            "host": "smtp.example.com",
            "password_enc": "ciphertext",
            "providers": [
                { "provider": "openai", "api_key_enc": "ciphertext" },
                { "provider": "ollama" },
            ],
        });

        redact(&mut value);

        assert_eq!(
            value,
            json!({
                "host": "smtp.example.com",
                "providers": [
                    { "provider": "openai" },
                    { "provider": "ollama" },
                ],
            })
        );
    }
}
