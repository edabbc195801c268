use crate::{
    model::SourceConfiguration,
    runner::Runner,
    service::SourceService,
};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use vulndash_common::{crypto::SecretCipher, db::Database};
use vulndash_entity::source;
use vulndash_module_ingestor::service::IngestService;

/// run the source poll loop
pub async fn importer(
    db: Database,
    ingest: IngestService,
    cipher: SecretCipher,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    Server {
        service: SourceService::new(db.clone()),
        runner: Runner::new(db, ingest, cipher),
        cancel,
    }
    .run()
    .await
}

struct Server {
    service: SourceService,
    runner: Runner,
    cancel: CancellationToken,
}

impl Server {
    #[instrument(skip_all, err)]
    async fn run(&self) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            log::debug!("checking sources");

            let sources = self.service.all_rows().await?;
            for row in sources {
                if self.cancel.is_cancelled() {
                    break;
                }

                let Ok(configuration) =
                    serde_json::from_value::<SourceConfiguration>(row.configuration.clone())
                else {
                    log::warn!("source '{}' has an unreadable configuration", row.name);
                    continue;
                };

                if configuration.common().disabled || can_wait(&row, &configuration) {
                    continue;
                }

                log::info!("starting run: {} ({})", row.name, configuration.kind());

                self.service.update_start(row.id).await?;

                let last_error = match self.runner.run_once(&row).await {
                    Ok(report) => {
                        log::info!(
                            "run complete: {}: {} fetched, {} staged, {} enriched, {} deduplicated",
                            row.name,
                            report.fetched,
                            report.staged,
                            report.enriched,
                            report.deduplicated
                        );
                        None
                    }
                    Err(err) => {
                        log::warn!("run failed: {}: {err}", row.name);
                        Some(err.to_string())
                    }
                };

                self.service.update_finish(row.id, last_error).await?;
            }
        }

        Ok(())
    }
}

/// check if the source still sits inside its polling period
fn can_wait(row: &source::Model, configuration: &SourceConfiguration) -> bool {
    let Some(last) = row.last_run else {
        return false;
    };

    (OffsetDateTime::now_utc() - last) < configuration.common().period
}
