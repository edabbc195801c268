use crate::{
    extractor::ExtractionEngine,
    service::{Error, IngestService, close_raw_entry},
};
use futures::StreamExt;
use rand::RngExt;
use sea_orm::{
    ActiveEnum, ActiveValue::Set, ColumnTrait, DbBackend, EntityTrait, QueryFilter, Statement,
};
use serde::Serialize;
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use time::OffsetDateTime;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use vulndash_common::{
    crypto::SecretCipher,
    db::Database,
    settings::{self, LlmSettings, ProcessingSettings},
};
use vulndash_entity::{raw_entry, setting};
use vulndash_module_llm::{Gateway, ProviderConfig, ProviderRegistry, gateway::Attempt};

/// How often the loop wakes up to check whether a batch is due.
const TICK: Duration = Duration::from_secs(30);
const RETENTION_TICK: Duration = Duration::from_secs(60 * 60);

const BACKOFF_BASE: Duration = Duration::from_secs(60);
const BACKOFF_CAP: Duration = Duration::from_secs(60 * 60);

/// Counts for one processed batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct BatchSummary {
    pub claimed: u64,
    pub processed: u64,
    pub needs_review: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Drives raw entries through extraction on a cadence.
///
/// Maintains the processing invariants: an atomic `pending → in_progress`
/// claim, at most `batch_size` in flight, and a skipped (never queued)
/// cadence while a batch is still active.
#[derive(Clone)]
pub struct Processor {
    db: Database,
    ingest: IngestService,
    registry: Arc<ProviderRegistry>,
    cipher: SecretCipher,
    active: Arc<tokio::sync::Mutex<()>>,
}

impl Processor {
    pub fn new(
        db: Database,
        ingest: IngestService,
        registry: Arc<ProviderRegistry>,
        cipher: SecretCipher,
    ) -> Self {
        Self {
            db,
            ingest,
            registry,
            cipher,
            active: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// The scheduler loop. Runs until cancelled; cancellation is observed at
    /// batch boundaries.
    pub async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        // entries stranded in_progress by an unclean stop go back to pending
        self.release_in_flight().await?;

        let mut interval = tokio::time::interval(TICK);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut last_batch: Option<OffsetDateTime> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let settings =
                setting::fetch::<ProcessingSettings>(settings::PROCESSING, &*self.db).await?;

            let due = match last_batch {
                None => true,
                Some(last) => {
                    OffsetDateTime::now_utc() - last
                        >= time::Duration::minutes(settings.interval_minutes as i64)
                }
            };
            if !due {
                continue;
            }

            match self.process_batch(&cancel).await {
                Ok(summary) => {
                    last_batch = Some(OffsetDateTime::now_utc());
                    if summary.claimed > 0 {
                        log::info!(
                            "batch complete: {} processed, {} review, {} skipped, {} failed",
                            summary.processed,
                            summary.needs_review,
                            summary.skipped,
                            summary.failed
                        );
                    }
                }
                Err(Error::Conflict(_)) => {
                    // previous batch still active, skip this cadence
                    log::debug!("batch still active, skipping tick");
                }
                Err(err) => log::error!("batch processing failed: {err}"),
            }
        }

        self.release_in_flight().await?;

        Ok(())
    }

    /// Process one batch now. Also the entry point for the admin trigger,
    /// which bypasses the cadence but not the in-flight bound.
    #[instrument(skip_all, err)]
    pub async fn process_batch(&self, cancel: &CancellationToken) -> Result<BatchSummary, Error> {
        let Ok(_guard) = self.active.try_lock() else {
            return Err(Error::Conflict("a batch is already running".into()));
        };

        let processing =
            setting::fetch::<ProcessingSettings>(settings::PROCESSING, &*self.db).await?;
        let llm = setting::fetch::<LlmSettings>(settings::LLM, &*self.db).await?;

        self.requeue_failed(processing.max_attempts).await?;

        let entries = self.claim_batch(processing.batch_size).await?;

        let summary = BatchSummary {
            claimed: entries.len() as u64,
            ..Default::default()
        };

        if entries.is_empty() {
            return Ok(summary);
        }

        let engine = self.build_engine(&llm, &processing);
        let max_attempts = processing.max_attempts;

        let processed = AtomicU64::new(0);
        let needs_review = AtomicU64::new(0);
        let skipped = AtomicU64::new(0);
        let failed = AtomicU64::new(0);

        futures::stream::iter(entries)
            .for_each_concurrent(processing.batch_size as usize, |entry| {
                let engine = &engine;
                let processed = &processed;
                let needs_review = &needs_review;
                let skipped = &skipped;
                let failed = &failed;
                async move {
                    if cancel.is_cancelled() {
                        // hand the claim back; the entry was never started
                        if let Err(err) = self.unclaim(entry.id).await {
                            log::error!("failed to unclaim entry {}: {err}", entry.id);
                        }
                        return;
                    }

                    match self.process_entry(engine, max_attempts, entry).await {
                        Outcome::Processed => processed.fetch_add(1, Ordering::Relaxed),
                        Outcome::NeedsReview => needs_review.fetch_add(1, Ordering::Relaxed),
                        Outcome::Skipped => skipped.fetch_add(1, Ordering::Relaxed),
                        Outcome::Failed => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
            .await;

        Ok(BatchSummary {
            processed: processed.into_inner(),
            needs_review: needs_review.into_inner(),
            skipped: skipped.into_inner(),
            failed: failed.into_inner(),
            ..summary
        })
    }

    /// One entry, start to finish. Persistence trouble raises the retry
    /// count; nothing escapes.
    async fn process_entry(
        &self,
        engine: &ExtractionEngine,
        max_attempts: u32,
        entry: raw_entry::Model,
    ) -> Outcome {
        let result = engine.extract(&entry.text).await;

        let outcome = if result.metadata.all_providers_failed && result.cve_id.is_none() {
            close_raw_entry(
                entry.id,
                raw_entry::Status::Skipped,
                None,
                Some("no CVE identifier found".into()),
                &*self.db,
            )
            .await
            .map(|()| Outcome::Skipped)
        } else if !result.needs_review && result.cve_id.is_some() {
            self.ingest
                .promote_extraction(entry.id, &result)
                .await
                .map(|_| Outcome::Processed)
        } else {
            self.ingest
                .queue_review(entry.id, &result)
                .await
                .map(|_| Outcome::NeedsReview)
        };

        match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                log::warn!("persisting entry {} failed: {err}", entry.id);
                match self.mark_failed(&entry, &err.to_string(), max_attempts).await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        log::error!("unable to record failure for {}: {err}", entry.id);
                        Outcome::Failed
                    }
                }
            }
        }
    }

    /// Atomically claim up to `limit` due pending entries.
    async fn claim_batch(&self, limit: u32) -> Result<Vec<raw_entry::Model>, Error> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
UPDATE raw_entry SET status = 'in_progress'
WHERE id IN (
    SELECT id FROM raw_entry
    WHERE status = 'pending'
      AND (next_attempt_at IS NULL OR next_attempt_at <= now())
    ORDER BY fetched_at
    LIMIT $1
    FOR UPDATE SKIP LOCKED
)
RETURNING *
"#,
            [(limit as i64).into()],
        );

        Ok(raw_entry::Entity::find()
            .from_raw_sql(stmt)
            .all(&*self.db)
            .await?)
    }

    /// `failed → pending` for entries whose backoff has elapsed.
    async fn requeue_failed(&self, max_attempts: u32) -> Result<(), Error> {
        let result = raw_entry::Entity::update_many()
            .col_expr(
                raw_entry::Column::Status,
                raw_entry::Status::Pending.as_enum(),
            )
            .filter(raw_entry::Column::Status.eq(raw_entry::Status::Failed))
            .filter(raw_entry::Column::Attempts.lt(max_attempts as i32))
            .filter(raw_entry::Column::NextAttemptAt.lte(OffsetDateTime::now_utc()))
            .exec(&*self.db)
            .await?;

        if result.rows_affected > 0 {
            log::debug!("requeued {} failed entries", result.rows_affected);
        }

        Ok(())
    }

    async fn mark_failed(
        &self,
        entry: &raw_entry::Model,
        error: &str,
        max_attempts: u32,
    ) -> Result<Outcome, Error> {
        let attempts = entry.attempts + 1;

        if attempts >= max_attempts as i32 {
            let update = raw_entry::ActiveModel {
                id: Set(entry.id),
                status: Set(raw_entry::Status::Skipped),
                attempts: Set(attempts),
                terminal_at: Set(Some(OffsetDateTime::now_utc())),
                last_error: Set(Some(error.into())),
                ..Default::default()
            };
            raw_entry::Entity::update(update).exec(&*self.db).await?;
            return Ok(Outcome::Skipped);
        }

        let delay = backoff_delay(attempts as u32);
        let update = raw_entry::ActiveModel {
            id: Set(entry.id),
            status: Set(raw_entry::Status::Failed),
            attempts: Set(attempts),
            next_attempt_at: Set(Some(OffsetDateTime::now_utc() + delay)),
            last_error: Set(Some(error.into())),
            ..Default::default()
        };
        raw_entry::Entity::update(update).exec(&*self.db).await?;

        Ok(Outcome::Failed)
    }

    async fn unclaim(&self, id: uuid::Uuid) -> Result<(), Error> {
        let update = raw_entry::ActiveModel {
            id: Set(id),
            status: Set(raw_entry::Status::Pending),
            ..Default::default()
        };
        raw_entry::Entity::update(update).exec(&*self.db).await?;
        Ok(())
    }

    /// Return all `in_progress` entries to `pending`.
    async fn release_in_flight(&self) -> Result<(), Error> {
        let result = raw_entry::Entity::update_many()
            .col_expr(
                raw_entry::Column::Status,
                raw_entry::Status::Pending.as_enum(),
            )
            .filter(raw_entry::Column::Status.eq(raw_entry::Status::InProgress))
            .exec(&*self.db)
            .await?;

        if result.rows_affected > 0 {
            log::info!("released {} in-flight entries", result.rows_affected);
        }

        Ok(())
    }

    /// The retention loop: hourly tick, deleting terminal entries past the
    /// retention window. Entries linked to a curated record are kept.
    pub async fn run_retention(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(RETENTION_TICK);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            match self.retention_sweep().await {
                Ok(0) => {}
                Ok(deleted) => log::info!("retention sweep deleted {deleted} raw entries"),
                Err(err) => log::error!("retention sweep failed: {err}"),
            }
        }

        Ok(())
    }

    #[instrument(skip_all, err)]
    pub async fn retention_sweep(&self) -> Result<u64, Error> {
        let processing =
            setting::fetch::<ProcessingSettings>(settings::PROCESSING, &*self.db).await?;

        let cutoff = OffsetDateTime::now_utc()
            - time::Duration::days(processing.raw_entry_retention_days as i64);

        let result = raw_entry::Entity::delete_many()
            .filter(raw_entry::Column::TerminalAt.lt(cutoff))
            .filter(raw_entry::Column::VulnerabilityId.is_null())
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected)
    }

    /// Build the gateway from current settings. Providers which fail to
    /// construct are skipped with a warning; the engine falls back to
    /// regex-only extraction when none remain.
    fn build_engine(&self, llm: &LlmSettings, processing: &ProcessingSettings) -> ExtractionEngine {
        let mut attempts = Vec::new();

        for entry in llm.attempt_order() {
            let api_key = match &entry.api_key_enc {
                Some(encrypted) => match self.cipher.decrypt(encrypted) {
                    Ok(key) => Some(key),
                    Err(err) => {
                        log::warn!("cannot decrypt api key for '{}': {err}", entry.provider);
                        continue;
                    }
                },
                None => None,
            };

            let config = ProviderConfig {
                provider: entry.provider.clone(),
                base_url: entry.base_url.clone(),
                api_key,
                model: entry.model.clone(),
            };

            match self.registry.create(&config) {
                Ok(provider) => attempts.push(Attempt {
                    provider,
                    model: entry.model.clone(),
                }),
                Err(err) => log::warn!("skipping provider '{}': {err}", entry.provider),
            }
        }

        ExtractionEngine::new(
            Gateway::new(attempts, llm.default_model.clone()),
            llm,
            processing,
        )
    }
}

enum Outcome {
    Processed,
    NeedsReview,
    Skipped,
    Failed,
}

/// Exponential backoff with jitter for entry retries.
pub fn backoff_delay(attempts: u32) -> Duration {
    let exp = BACKOFF_BASE.saturating_mul(1u32 << attempts.min(6));
    let capped = exp.min(BACKOFF_CAP);
    let jitter = rand::rng().random_range(0.8..1.2);
    capped.mul_f64(jitter)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test_log::test]
    fn backoff_grows_and_stays_bounded() {
        for attempts in 0..10 {
            let delay = backoff_delay(attempts);
            // base * 2^attempts, within jitter bounds and below the cap
            assert!(delay >= BACKOFF_BASE.mul_f64(0.8));
            assert!(delay <= BACKOFF_CAP.mul_f64(1.2));
        }

        let early = backoff_delay(1);
        let late = backoff_delay(5);
        assert!(late > early);
    }
}
