use super::ReviewQueueService;
use crate::Error;
use actix_web::{HttpResponse, Responder, get, post, web};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;
use vulndash_common::{db::Database, model::Paginated};
use vulndash_entity::review_queue_item::Decision;
use vulndash_module_ingestor::service::{IngestService, review::ReviewEdits};

/// mount the review queue endpoints
pub fn configure(
    config: &mut utoipa_actix_web::service_config::ServiceConfig,
    db: Database,
    ingest: IngestService,
) {
    config
        .app_data(web::Data::new(ReviewQueueService::new(db)))
        .app_data(web::Data::new(ingest))
        .service(list)
        .service(read)
        .service(approve)
        .service(reject);
}

#[derive(Debug, Default, Deserialize, IntoParams)]
struct ListQuery {
    /// Restrict to one decision state
    decision: Option<Decision>,
}

#[utoipa::path(
    tag = "review",
    operation_id = "listReviewQueue",
    params(ListQuery, Paginated),
    responses(
        (status = 200, description = "Review queue items"),
    )
)]
#[get("/review-queue")]
/// List review queue items
async fn list(
    service: web::Data<ReviewQueueService>,
    web::Query(query): web::Query<ListQuery>,
    web::Query(paginated): web::Query<Paginated>,
) -> Result<impl Responder, Error> {
    Ok(web::Json(service.list(query.decision, paginated).await?))
}

#[utoipa::path(
    tag = "review",
    operation_id = "getReviewItem",
    params(
        ("id", Path, description = "The review item id"),
    ),
    responses(
        (status = 200, description = "The review item"),
        (status = 404, description = "No such item"),
    )
)]
#[get("/review-queue/{id}")]
/// Get a review queue item
async fn read(
    service: web::Data<ReviewQueueService>,
    id: web::Path<Uuid>,
) -> Result<impl Responder, Error> {
    Ok(match service.get(id.into_inner()).await? {
        Some(item) => HttpResponse::Ok().json(item),
        None => HttpResponse::NotFound().finish(),
    })
}

#[utoipa::path(
    tag = "review",
    operation_id = "approveReviewItem",
    request_body = ReviewEdits,
    params(
        ("id", Path, description = "The review item id"),
    ),
    responses(
        (status = 200, description = "Promoted to the curated store"),
        (status = 400, description = "Edits were invalid, e.g. a changed CVE id"),
        (status = 404, description = "No such item"),
        (status = 409, description = "The item was already decided"),
    )
)]
#[post("/review-queue/{id}/approve")]
/// Approve an item, merging optional edits
async fn approve(
    ingest: web::Data<IngestService>,
    id: web::Path<Uuid>,
    web::Json(edits): web::Json<ReviewEdits>,
) -> Result<impl Responder, Error> {
    Ok(web::Json(
        ingest.approve_review(id.into_inner(), edits).await?,
    ))
}

#[utoipa::path(
    tag = "review",
    operation_id = "rejectReviewItem",
    params(
        ("id", Path, description = "The review item id"),
    ),
    responses(
        (status = 204, description = "Rejected; the raw entry is skipped"),
        (status = 404, description = "No such item"),
        (status = 409, description = "The item was already decided"),
    )
)]
#[post("/review-queue/{id}/reject")]
/// Reject an item
async fn reject(
    ingest: web::Data<IngestService>,
    id: web::Path<Uuid>,
) -> Result<impl Responder, Error> {
    ingest.reject_review(id.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
