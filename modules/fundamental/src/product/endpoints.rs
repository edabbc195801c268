use super::{ProductRequest, ProductSearch, service::ProductService};
use crate::Error;
use actix_web::{HttpResponse, Responder, delete, get, post, put, web};
use uuid::Uuid;
use vulndash_common::{db::Database, model::Paginated};

/// mount the inventory administration endpoints
pub fn configure(config: &mut utoipa_actix_web::service_config::ServiceConfig, db: Database) {
    config
        .app_data(web::Data::new(ProductService::new(db)))
        .service(search)
        // static segment must win over the `{id}` capture
        .service(sync_log)
        .service(read)
        .service(create)
        .service(update)
        .service(delete)
        .service(set_monitored);
}

#[utoipa::path(
    tag = "inventory",
    operation_id = "searchProducts",
    params(ProductSearch, Paginated),
    responses(
        (status = 200, description = "Matching inventory entries, ranked by relevance"),
    )
)]
#[get("/inventory")]
/// Search the product inventory
async fn search(
    service: web::Data<ProductService>,
    web::Query(query): web::Query<ProductSearch>,
    web::Query(paginated): web::Query<Paginated>,
) -> Result<impl Responder, Error> {
    Ok(web::Json(service.search(&query, paginated).await?))
}

#[utoipa::path(
    tag = "inventory",
    operation_id = "getProduct",
    params(
        ("id", Path, description = "The product id"),
    ),
    responses(
        (status = 200, description = "The inventory entry"),
        (status = 404, description = "No such entry"),
    )
)]
#[get("/inventory/{id}")]
/// Get a single inventory entry
async fn read(
    service: web::Data<ProductService>,
    id: web::Path<Uuid>,
) -> Result<impl Responder, Error> {
    Ok(match service.get(id.into_inner()).await? {
        Some(product) => HttpResponse::Ok().json(product),
        None => HttpResponse::NotFound().finish(),
    })
}

#[utoipa::path(
    tag = "inventory",
    operation_id = "createProduct",
    request_body = ProductRequest,
    responses(
        (status = 201, description = "Created a custom inventory entry"),
        (status = 400, description = "The request was not valid"),
        (status = 409, description = "Duplicate tuple or CPE URI"),
    )
)]
#[post("/inventory")]
/// Create a custom inventory entry
async fn create(
    service: web::Data<ProductService>,
    web::Json(request): web::Json<ProductRequest>,
) -> Result<impl Responder, Error> {
    let product = service.create_custom(request).await?;
    Ok(HttpResponse::Created().json(product))
}

#[utoipa::path(
    tag = "inventory",
    operation_id = "updateProduct",
    request_body = ProductRequest,
    params(
        ("id", Path, description = "The product id"),
    ),
    responses(
        (status = 200, description = "Updated the entry"),
        (status = 404, description = "No such entry"),
        (status = 409, description = "Catalog entries cannot be edited"),
    )
)]
#[put("/inventory/{id}")]
/// Update a custom inventory entry
async fn update(
    service: web::Data<ProductService>,
    id: web::Path<Uuid>,
    web::Json(request): web::Json<ProductRequest>,
) -> Result<impl Responder, Error> {
    Ok(web::Json(service.update(id.into_inner(), request).await?))
}

#[utoipa::path(
    tag = "inventory",
    operation_id = "deleteProduct",
    params(
        ("id", Path, description = "The product id"),
    ),
    responses(
        (status = 204, description = "Deleted the entry"),
        (status = 404, description = "No such entry"),
        (status = 409, description = "Catalog entries cannot be deleted"),
    )
)]
#[delete("/inventory/{id}")]
/// Delete a custom inventory entry
async fn delete(
    service: web::Data<ProductService>,
    id: web::Path<Uuid>,
) -> Result<impl Responder, Error> {
    service.delete(id.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    tag = "inventory",
    operation_id = "setProductMonitored",
    request_body = bool,
    params(
        ("id", Path, description = "The product id"),
    ),
    responses(
        (status = 204, description = "Updated the monitored flag"),
        (status = 404, description = "No such entry"),
    )
)]
#[put("/inventory/{id}/monitored")]
/// Toggle monitoring of an inventory entry
async fn set_monitored(
    service: web::Data<ProductService>,
    id: web::Path<Uuid>,
    web::Json(monitored): web::Json<bool>,
) -> Result<impl Responder, Error> {
    service.set_monitored(id.into_inner(), monitored).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    tag = "inventory",
    operation_id = "listSyncLog",
    params(Paginated),
    responses(
        (status = 200, description = "Recent catalog sync cycles"),
    )
)]
#[get("/inventory/sync-log")]
/// List catalog sync cycles
async fn sync_log(
    service: web::Data<ProductService>,
    web::Query(paginated): web::Query<Paginated>,
) -> Result<impl Responder, Error> {
    Ok(web::Json(service.sync_log(paginated).await?))
}
