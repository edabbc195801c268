use crate::{
    model::{Source, SourceConfiguration},
    service::{Error, SourceService},
};
use actix_web::{
    HttpResponse, Responder, delete, get,
    http::header::{self, ETag, EntityTag, IfMatch},
    post, put, web,
};
use vulndash_common::{db::Database, model::Revisioned};

/// mount the source administration endpoints
pub fn configure(config: &mut utoipa_actix_web::service_config::ServiceConfig, db: Database) {
    config
        .app_data(web::Data::new(SourceService::new(db)))
        .service(list)
        .service(create)
        .service(read)
        .service(update)
        .service(delete)
        .service(force);
}

/// Extract the revision from an `If-Match` header.
fn revision(if_match: &IfMatch) -> Option<&str> {
    match if_match {
        IfMatch::Any => None,
        IfMatch::Items(items) => items.first().map(|etag| etag.tag()),
    }
}

#[utoipa::path(
    tag = "source",
    operation_id = "listSources",
    responses(
        (status = 200, description = "List configured sources", body = [Source]),
    )
)]
#[get("/sources")]
/// List configured sources
async fn list(service: web::Data<SourceService>) -> Result<impl Responder, Error> {
    Ok(web::Json(service.list().await?))
}

#[utoipa::path(
    tag = "source",
    operation_id = "createSource",
    request_body = SourceConfiguration,
    params(
        ("name", Path, description = "The name of the source"),
    ),
    responses(
        (status = 201, description = "Created a new source"),
        (status = 400, description = "The configuration was not valid"),
        (status = 409, description = "A source with that name already exists"),
    )
)]
#[post("/sources/{name}")]
/// Create a new source
async fn create(
    service: web::Data<SourceService>,
    name: web::Path<String>,
    web::Json(configuration): web::Json<SourceConfiguration>,
) -> Result<impl Responder, Error> {
    let id = service.create(name.into_inner(), configuration).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({ "id": id })))
}

#[utoipa::path(
    tag = "source",
    operation_id = "getSource",
    params(
        ("name", Path, description = "The name of the source"),
    ),
    responses(
        (status = 200, description = "The source configuration", body = Source,
            headers(("etag" = String, description = "Revision ID"))),
        (status = 404, description = "No source with that name"),
    )
)]
#[get("/sources/{name}")]
/// Get a source
async fn read(
    service: web::Data<SourceService>,
    name: web::Path<String>,
) -> Result<Option<impl Responder>, Error> {
    Ok(service
        .read(&name)
        .await?
        .map(|Revisioned { value, revision }| {
            HttpResponse::Ok()
                .append_header((header::ETAG, ETag(EntityTag::new_strong(revision))))
                .json(value)
        }))
}

#[utoipa::path(
    tag = "source",
    operation_id = "updateSource",
    request_body = SourceConfiguration,
    params(
        ("name", Path, description = "The name of the source"),
        ("if-match" = Option<String>, Header, description = "The revision to update"),
    ),
    responses(
        (status = 204, description = "Updated the source"),
        (status = 404, description = "No source with that name"),
        (status = 412, description = "The revision did not match"),
    )
)]
#[put("/sources/{name}")]
/// Update an existing source
async fn update(
    service: web::Data<SourceService>,
    name: web::Path<String>,
    web::Header(if_match): web::Header<IfMatch>,
    web::Json(configuration): web::Json<SourceConfiguration>,
) -> Result<impl Responder, Error> {
    service
        .update(&name, revision(&if_match), configuration)
        .await?;

    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    tag = "source",
    operation_id = "deleteSource",
    params(
        ("name", Path, description = "The name of the source"),
        ("if-match" = Option<String>, Header, description = "The revision to delete"),
    ),
    responses(
        (status = 204, description = "The source was deleted or did not exist"),
        (status = 412, description = "The revision did not match"),
    )
)]
#[delete("/sources/{name}")]
/// Delete a source
async fn delete(
    service: web::Data<SourceService>,
    name: web::Path<String>,
    web::Header(if_match): web::Header<IfMatch>,
) -> Result<impl Responder, Error> {
    service.delete(&name, revision(&if_match)).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    tag = "source",
    operation_id = "forceRunSource",
    params(
        ("name", Path, description = "The name of the source"),
    ),
    responses(
        (status = 204, description = "The source will run on the next poll tick"),
        (status = 404, description = "No source with that name"),
    )
)]
#[post("/sources/{name}/force")]
/// Force a source to run as soon as possible
async fn force(
    service: web::Data<SourceService>,
    name: web::Path<String>,
) -> Result<impl Responder, Error> {
    service.force_run(&name).await?;
    Ok(HttpResponse::NoContent().finish())
}
