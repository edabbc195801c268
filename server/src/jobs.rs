use actix_web::{HttpResponse, Responder, post, web};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use vulndash_module_fundamental::Error;
use vulndash_module_importer::cpe::sync::{CpeSyncJob, SyncError};
use vulndash_module_ingestor::{scheduler::Processor, service::Error as IngestError};

/// Handles for manual job control on the admin surface.
#[derive(Clone)]
pub struct JobsContext {
    processor: Processor,
    sync: CpeSyncJob,
    /// Process shutdown token; manual runs get a child of it.
    cancel: CancellationToken,
    manual_sync: Arc<Mutex<Option<CancellationToken>>>,
}

impl JobsContext {
    pub fn new(processor: Processor, sync: CpeSyncJob, cancel: CancellationToken) -> Self {
        Self {
            processor,
            sync,
            cancel,
            manual_sync: Arc::new(Mutex::new(None)),
        }
    }
}

/// mount the job control endpoints
pub fn configure(config: &mut utoipa_actix_web::service_config::ServiceConfig, jobs: JobsContext) {
    config
        .app_data(web::Data::new(jobs))
        .service(process_now)
        .service(sync_now)
        .service(cancel_sync)
        .service(retention_now);
}

#[utoipa::path(
    tag = "jobs",
    operation_id = "triggerProcessing",
    responses(
        (status = 200, description = "Batch summary"),
        (status = 409, description = "A batch is already running"),
    )
)]
#[post("/jobs/process")]
/// Run one extraction batch now, bypassing the cadence
async fn process_now(jobs: web::Data<JobsContext>) -> Result<impl Responder, Error> {
    let summary = jobs
        .processor
        .process_batch(&jobs.cancel)
        .await
        .map_err(|err| match err {
            IngestError::Conflict(msg) => Error::Conflict(msg.into()),
            err => Error::Internal(err.to_string()),
        })?;

    Ok(web::Json(summary))
}

#[utoipa::path(
    tag = "jobs",
    operation_id = "triggerCatalogSync",
    responses(
        (status = 202, description = "A sync cycle was started"),
        (status = 409, description = "A cycle is already running"),
    )
)]
#[post("/jobs/sync")]
/// Start a catalog sync cycle now
async fn sync_now(jobs: web::Data<JobsContext>) -> Result<impl Responder, Error> {
    if jobs.sync.is_running() {
        return Err(Error::Conflict("a sync cycle is already running".into()));
    }

    let token = jobs.cancel.child_token();
    *jobs.manual_sync.lock() = Some(token.clone());

    let sync = jobs.sync.clone();
    tokio::spawn(async move {
        match sync.run_cycle(&token).await {
            Ok(log) => log::info!(
                "manual CPE sync finished: +{} ~{} -{}",
                log.added,
                log.updated,
                log.deprecated
            ),
            Err(SyncError::Busy) => {}
            Err(err) => log::error!("manual CPE sync failed: {err}"),
        }
    });

    Ok(HttpResponse::Accepted().json(serde_json::json!({ "started": true })))
}

#[utoipa::path(
    tag = "jobs",
    operation_id = "cancelCatalogSync",
    responses(
        (status = 204, description = "Cancellation requested; the job stops at the next page boundary"),
    )
)]
#[post("/jobs/sync/cancel")]
/// Cancel a manually started sync cycle
async fn cancel_sync(jobs: web::Data<JobsContext>) -> Result<impl Responder, Error> {
    if let Some(token) = jobs.manual_sync.lock().take() {
        token.cancel();
    }

    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    tag = "jobs",
    operation_id = "triggerRetention",
    responses(
        (status = 200, description = "Number of raw entries deleted"),
    )
)]
#[post("/jobs/retention")]
/// Run the raw-entry retention sweep now
async fn retention_now(jobs: web::Data<JobsContext>) -> Result<impl Responder, Error> {
    let deleted = jobs
        .processor
        .retention_sweep()
        .await
        .map_err(|err| Error::Internal(err.to_string()))?;

    Ok(web::Json(serde_json::json!({ "deleted": deleted })))
}
