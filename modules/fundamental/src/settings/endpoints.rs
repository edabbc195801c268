use super::{LlmSettingsRequest, SmtpSettingsRequest, service::SettingsService};
use crate::Error;
use actix_web::{
    HttpResponse, Responder, get, put, web,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use vulndash_common::{
    crypto::SecretCipher,
    db::Database,
    settings::{LlmSettings, NotificationSettings, ProcessingSettings},
};
use vulndash_module_llm::{ProviderConfig, ProviderRegistry};

/// mount the settings and LLM operations endpoints
pub fn configure(
    config: &mut utoipa_actix_web::service_config::ServiceConfig,
    db: Database,
    cipher: SecretCipher,
    registry: Arc<ProviderRegistry>,
) {
    config
        .app_data(web::Data::new(SettingsService::new(db, cipher.clone())))
        .app_data(web::Data::new(LlmOps { registry, cipher }))
        .service(read_setting)
        .service(update_llm)
        .service(update_smtp)
        .service(update_notifications)
        .service(update_processing)
        .service(test_providers)
        .service(list_models);
}

#[utoipa::path(
    tag = "settings",
    operation_id = "getSettings",
    params(
        ("key", Path, description = "One of llm, smtp, notifications, processing"),
    ),
    responses(
        (status = 200, description = "The document, with secrets removed",
            headers(("etag" = String, description = "Revision ID"))),
        (status = 404, description = "Unknown settings document"),
    )
)]
#[get("/settings/{key}")]
/// Read a configuration document
async fn read_setting(
    service: web::Data<SettingsService>,
    key: web::Path<String>,
) -> Result<impl Responder, Error> {
    let revisioned = service.read(&key).await?;

    Ok(HttpResponse::Ok()
        .append_header((
            actix_web::http::header::ETAG,
            actix_web::http::header::ETag(actix_web::http::header::EntityTag::new_strong(
                revisioned.revision,
            )),
        ))
        .json(revisioned.value))
}

#[utoipa::path(
    tag = "settings",
    operation_id = "updateLlmSettings",
    request_body = LlmSettingsRequest,
    responses(
        (status = 204, description = "Stored"),
        (status = 400, description = "A value was out of range"),
    )
)]
#[put("/settings/llm")]
/// Update the LLM settings
async fn update_llm(
    service: web::Data<SettingsService>,
    web::Json(request): web::Json<LlmSettingsRequest>,
) -> Result<impl Responder, Error> {
    service.update_llm(request).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    tag = "settings",
    operation_id = "updateSmtpSettings",
    request_body = SmtpSettingsRequest,
    responses(
        (status = 204, description = "Stored"),
        (status = 400, description = "A value was out of range"),
    )
)]
#[put("/settings/smtp")]
/// Update the SMTP settings
async fn update_smtp(
    service: web::Data<SettingsService>,
    web::Json(request): web::Json<SmtpSettingsRequest>,
) -> Result<impl Responder, Error> {
    service.update_smtp(request).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    tag = "settings",
    operation_id = "updateNotificationSettings",
    responses(
        (status = 204, description = "Stored"),
        (status = 400, description = "A value was out of range"),
    )
)]
#[put("/settings/notifications")]
/// Update the notification settings
async fn update_notifications(
    service: web::Data<SettingsService>,
    web::Json(request): web::Json<NotificationSettings>,
) -> Result<impl Responder, Error> {
    service.update_notifications(request).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    tag = "settings",
    operation_id = "updateProcessingSettings",
    responses(
        (status = 204, description = "Stored"),
        (status = 400, description = "A value was out of range"),
    )
)]
#[put("/settings/processing")]
/// Update the processing settings
async fn update_processing(
    service: web::Data<SettingsService>,
    web::Json(request): web::Json<ProcessingSettings>,
) -> Result<impl Responder, Error> {
    service.update_processing(request).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Constructs providers from stored settings for probes and model listing.
pub struct LlmOps {
    registry: Arc<ProviderRegistry>,
    cipher: SecretCipher,
}

impl LlmOps {
    pub fn new(registry: Arc<ProviderRegistry>, cipher: SecretCipher) -> Self {
        Self { registry, cipher }
    }

    pub fn provider(
        &self,
        settings: &LlmSettings,
        name: &str,
    ) -> Result<Arc<dyn vulndash_module_llm::LlmProvider>, Error> {
        let entry = settings
            .attempt_order()
            .find(|entry| entry.provider == name)
            .ok_or_else(|| Error::NotFound(format!("provider '{name}' is not configured")))?;

        let api_key = entry
            .api_key_enc
            .as_deref()
            .map(|enc| self.cipher.decrypt(enc))
            .transpose()
            .map_err(|err| Error::Internal(err.to_string()))?;

        self.registry
            .create(&ProviderConfig {
                provider: entry.provider.clone(),
                base_url: entry.base_url.clone(),
                api_key,
                model: entry.model.clone(),
            })
            .map_err(|err| Error::bad_request(err.to_string(), None::<&str>))
    }

    pub async fn probe_all(&self, settings: &LlmSettings) -> Vec<ProviderProbe> {
        let mut probes = Vec::new();

        for entry in settings.attempt_order() {
            let result = match self.provider(settings, &entry.provider) {
                Ok(provider) => provider.test_connection().await.map_err(|e| e.to_string()),
                Err(err) => Err(err.to_string()),
            };

            probes.push(match result {
                Ok(probe) => ProviderProbe {
                    provider: entry.provider.clone(),
                    ok: probe.ok,
                    latency_ms: Some(probe.latency_ms),
                    error: probe.reason,
                },
                Err(error) => ProviderProbe {
                    provider: entry.provider.clone(),
                    ok: false,
                    latency_ms: None,
                    error: Some(error),
                },
            });
        }

        probes
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProviderProbe {
    pub provider: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[utoipa::path(
    tag = "llm",
    operation_id = "testProviders",
    responses(
        (status = 200, description = "Connection probes for every configured provider", body = [ProviderProbe]),
    )
)]
#[get("/llm/test")]
/// Probe every configured provider
async fn test_providers(
    service: web::Data<SettingsService>,
    ops: web::Data<LlmOps>,
) -> Result<impl Responder, Error> {
    let settings = service.llm_settings().await?;
    Ok(web::Json(ops.probe_all(&settings).await))
}

#[derive(Debug, Deserialize, IntoParams)]
struct ModelsQuery {
    /// Provider to ask; defaults to the primary
    provider: Option<String>,
}

#[utoipa::path(
    tag = "llm",
    operation_id = "listProviderModels",
    params(ModelsQuery),
    responses(
        (status = 200, description = "Models offered by the provider"),
        (status = 404, description = "The provider is not configured"),
    )
)]
#[get("/llm/models")]
/// List models available from a configured provider
async fn list_models(
    service: web::Data<SettingsService>,
    ops: web::Data<LlmOps>,
    web::Query(query): web::Query<ModelsQuery>,
) -> Result<impl Responder, Error> {
    let settings = service.llm_settings().await?;

    let name = match query.provider {
        Some(name) => name,
        None => settings
            .primary_provider
            .as_ref()
            .map(|entry| entry.provider.clone())
            .ok_or_else(|| Error::NotFound("no primary provider configured".into()))?,
    };

    let provider = ops.provider(&settings, &name)?;
    let models = provider
        .list_models()
        .await
        .map_err(|err| Error::bad_request(err.to_string(), None::<&str>))?;

    Ok(web::Json(models))
}
