use super::{
    ExportFormat, Kpis, RemediationState, TrendPoint, VulnerabilityFilters, VulnerabilityList,
    service::{VulnerabilityService, to_csv},
};
use crate::Error;
use actix_web::{HttpResponse, Responder, get, post, web};
use serde::Deserialize;
use utoipa::IntoParams;
use vulndash_common::{db::Database, model::Paginated};

/// mount the public query surface
pub fn configure(config: &mut utoipa_actix_web::service_config::ServiceConfig, db: Database) {
    config
        .app_data(web::Data::new(VulnerabilityService::new(db)))
        .service(list)
        .service(get_one)
        .service(remediate)
        .service(trends)
        .service(kpis)
        .service(export);
}

#[utoipa::path(
    tag = "vulnerability",
    operation_id = "listVulnerabilities",
    params(VulnerabilityFilters, Paginated),
    responses(
        (status = 200, description = "Matching curated records", body = VulnerabilityList),
    )
)]
#[get("/vulnerabilities")]
/// List curated vulnerabilities
async fn list(
    service: web::Data<VulnerabilityService>,
    web::Query(filters): web::Query<VulnerabilityFilters>,
    web::Query(paginated): web::Query<Paginated>,
) -> Result<impl Responder, Error> {
    Ok(web::Json(service.list(&filters, paginated).await?))
}

#[utoipa::path(
    tag = "vulnerability",
    operation_id = "getVulnerability",
    params(
        ("cve_id", Path, description = "The CVE identifier"),
    ),
    responses(
        (status = 200, description = "The curated record"),
        (status = 404, description = "No record for this CVE"),
    )
)]
#[get("/vulnerabilities/{cve_id}")]
/// Get a single curated vulnerability
async fn get_one(
    service: web::Data<VulnerabilityService>,
    cve_id: web::Path<String>,
) -> Result<impl Responder, Error> {
    Ok(match service.get(&cve_id).await? {
        Some(details) => HttpResponse::Ok().json(details),
        None => HttpResponse::NotFound().finish(),
    })
}

#[utoipa::path(
    tag = "vulnerability",
    operation_id = "toggleRemediation",
    params(
        ("cve_id", Path, description = "The CVE identifier"),
    ),
    responses(
        (status = 200, description = "The new remediation state", body = RemediationState),
        (status = 404, description = "No record for this CVE"),
    )
)]
#[post("/vulnerabilities/{cve_id}/remediate")]
/// Toggle the remediation flag of a record
async fn remediate(
    service: web::Data<VulnerabilityService>,
    cve_id: web::Path<String>,
) -> Result<impl Responder, Error> {
    let model = service.toggle_remediation(&cve_id).await?;

    Ok(web::Json(RemediationState {
        cve_id: model.id,
        remediated: model.remediated_at.is_some(),
        remediated_at: model.remediated_at,
    }))
}

#[derive(Debug, Deserialize, IntoParams)]
struct TrendsQuery {
    /// Window in days, `1..=365`
    #[serde(default = "default_days")]
    days: u32,
}

fn default_days() -> u32 {
    30
}

#[utoipa::path(
    tag = "vulnerability",
    operation_id = "getTrends",
    params(TrendsQuery),
    responses(
        (status = 200, description = "Daily counts over the window", body = [TrendPoint]),
        (status = 400, description = "Window out of range"),
    )
)]
#[get("/trends")]
/// Time series of newly curated records
async fn trends(
    service: web::Data<VulnerabilityService>,
    web::Query(query): web::Query<TrendsQuery>,
) -> Result<impl Responder, Error> {
    if !(1..=365).contains(&query.days) {
        return Err(Error::bad_request(
            "days out of range",
            Some("expected 1..=365"),
        ));
    }

    Ok(web::Json(service.trends(query.days).await?))
}

#[utoipa::path(
    tag = "vulnerability",
    operation_id = "getKpis",
    responses(
        (status = 200, description = "Aggregate counts", body = Kpis),
    )
)]
#[get("/kpis")]
/// Aggregate dashboard counters
async fn kpis(service: web::Data<VulnerabilityService>) -> Result<impl Responder, Error> {
    Ok(web::Json(service.kpis().await?))
}

#[derive(Debug, Default, Deserialize, IntoParams)]
struct ExportQuery {
    #[serde(default)]
    format: ExportFormat,
}

#[utoipa::path(
    tag = "vulnerability",
    operation_id = "exportVulnerabilities",
    params(VulnerabilityFilters, ExportQuery),
    responses(
        (status = 200, description = "The current filter selection as CSV or JSON"),
    )
)]
#[get("/export")]
/// Export the current filter selection
async fn export(
    service: web::Data<VulnerabilityService>,
    web::Query(filters): web::Query<VulnerabilityFilters>,
    web::Query(query): web::Query<ExportQuery>,
) -> Result<impl Responder, Error> {
    let records = service.export(&filters).await?;

    Ok(match query.format {
        ExportFormat::Json => HttpResponse::Ok().json(records),
        ExportFormat::Csv => HttpResponse::Ok()
            .content_type("text/csv; charset=utf-8")
            .body(to_csv(&records)?),
    })
}
