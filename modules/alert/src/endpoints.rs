use crate::{
    sender::AlertSender,
    service::{AlertService, Error},
};
use actix_web::{HttpResponse, Responder, get, post, web};
use uuid::Uuid;
use vulndash_common::{crypto::SecretCipher, db::Database, model::Paginated};

/// mount the email administration endpoints
pub fn configure(
    config: &mut utoipa_actix_web::service_config::ServiceConfig,
    db: Database,
    cipher: SecretCipher,
) {
    config
        .app_data(web::Data::new(AlertService::new(db.clone())))
        .app_data(web::Data::new(AlertSender::new(db, cipher)))
        .service(list_alerts)
        .service(requeue)
        .service(test_smtp);
}

#[utoipa::path(
    tag = "email",
    operation_id = "listEmailAlerts",
    params(Paginated),
    responses(
        (status = 200, description = "The alert send log"),
    )
)]
#[get("/email/alerts")]
/// List alert emails and their delivery state
async fn list_alerts(
    service: web::Data<AlertService>,
    web::Query(paginated): web::Query<Paginated>,
) -> Result<impl Responder, Error> {
    Ok(web::Json(service.list(paginated).await?))
}

#[utoipa::path(
    tag = "email",
    operation_id = "requeueEmailAlert",
    params(
        ("id", Path, description = "The alert to re-queue"),
    ),
    responses(
        (status = 204, description = "The alert is pending again"),
        (status = 404, description = "No such alert"),
        (status = 409, description = "The alert is not in a failed state"),
    )
)]
#[post("/email/alerts/{id}/requeue")]
/// Re-queue a failed alert
async fn requeue(
    service: web::Data<AlertService>,
    id: web::Path<Uuid>,
) -> Result<impl Responder, Error> {
    service.requeue(id.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    tag = "email",
    operation_id = "testSmtpConnection",
    responses(
        (status = 200, description = "Result of the SMTP probe"),
    )
)]
#[post("/email/test")]
/// Probe the configured SMTP endpoint
async fn test_smtp(sender: web::Data<AlertSender>) -> Result<impl Responder, Error> {
    let ok = sender.test_connection().await?;
    Ok(web::Json(serde_json::json!({ "ok": ok })))
}
