use super::Health;
use crate::{
    Error,
    settings::{endpoints::LlmOps, service::SettingsService},
};
use actix_web::{Responder, get, web};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use std::sync::Arc;
use vulndash_common::{crypto::SecretCipher, db::Database};
use vulndash_entity::{email_alert, raw_entry, review_queue_item};
use vulndash_module_llm::ProviderRegistry;

/// mount the health endpoint
pub fn configure(
    config: &mut utoipa_actix_web::service_config::ServiceConfig,
    db: Database,
    cipher: SecretCipher,
    registry: Arc<ProviderRegistry>,
) {
    config
        .app_data(web::Data::new(HealthContext {
            db: db.clone(),
            settings: SettingsService::new(db, cipher.clone()),
            ops: LlmOps::new(registry, cipher),
        }))
        .service(health);
}

pub struct HealthContext {
    db: Database,
    settings: SettingsService,
    ops: LlmOps,
}

#[utoipa::path(
    tag = "health",
    operation_id = "getHealth",
    responses(
        (status = 200, description = "Liveness of the database and providers", body = Health),
    )
)]
#[get("/health")]
/// Health of the database, the configured providers, and the queues
async fn health(context: web::Data<HealthContext>) -> Result<impl Responder, Error> {
    let database = context.db.ping().await.is_ok();

    let providers = match context.settings.llm_settings().await {
        Ok(settings) => context.ops.probe_all(&settings).await,
        Err(_) => Vec::new(),
    };

    let pending_raw_entries = raw_entry::Entity::find()
        .filter(raw_entry::Column::Status.eq(raw_entry::Status::Pending))
        .count(&*context.db)
        .await
        .unwrap_or(0);

    let pending_review_items = review_queue_item::Entity::find()
        .filter(
            review_queue_item::Column::Decision.eq(review_queue_item::Decision::Pending),
        )
        .count(&*context.db)
        .await
        .unwrap_or(0);

    let pending_alerts = email_alert::Entity::find()
        .filter(email_alert::Column::Status.eq(email_alert::Status::Pending))
        .count(&*context.db)
        .await
        .unwrap_or(0);

    let ok = database && providers.iter().all(|probe| probe.ok);

    Ok(web::Json(Health {
        ok,
        database,
        providers,
        pending_raw_entries,
        pending_review_items,
        pending_alerts,
    }))
}
