use super::parse_cpe23;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter,
};
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use time::OffsetDateTime;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use url::Url;
use uuid::Uuid;
use vulndash_common::db::Database;
use vulndash_entity::{product, sync_log};

pub const DEFAULT_CATALOG_URL: &str = "https://services.nvd.nist.gov/rest/json/cpes/2.0";

const PAGE_SIZE: u32 = 2000;
/// Minimum delay between catalog requests, independent of page latency.
const MIN_REQUEST_DELAY: Duration = Duration::from_millis(600);
const MAX_PAGE_RETRIES: u32 = 3;
/// Weekly by default.
const CYCLE_PERIOD: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("a sync cycle is already running")]
    Busy,
    #[error(transparent)]
    Database(#[from] sea_orm::DbErr),
    #[error("catalog request failed: {0}")]
    Catalog(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogPage {
    results_per_page: u32,
    start_index: u32,
    total_results: u32,
    #[serde(default)]
    products: Vec<CatalogProduct>,
}

#[derive(Debug, Deserialize)]
struct CatalogProduct {
    cpe: CatalogCpe,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogCpe {
    cpe_name: String,
    #[serde(default)]
    deprecated: bool,
    #[serde(default)]
    titles: Vec<Title>,
}

#[derive(Debug, Deserialize)]
struct Title {
    title: String,
    #[serde(default)]
    lang: String,
}

#[derive(Debug, Default)]
struct Counters {
    added: i64,
    updated: i64,
    deprecated: i64,
    failed: i64,
}

/// Incremental sync of the product inventory against the external CPE
/// dictionary.
///
/// Holds an exclusive lease for the cycle so two runs never overlap; custom
/// inventory entries are out of bounds by construction, the sync only ever
/// touches `source = external_catalog` rows.
#[derive(Clone)]
pub struct CpeSyncJob {
    db: Database,
    client: reqwest::Client,
    url: Url,
    lease: Arc<tokio::sync::Mutex<()>>,
}

impl CpeSyncJob {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            client: reqwest::Client::new(),
            url: Url::parse(DEFAULT_CATALOG_URL).expect("hardcoded URL must parse"),
            lease: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn with_url(mut self, url: Url) -> Self {
        self.url = url;
        self
    }

    /// `true` while a cycle holds the lease.
    pub fn is_running(&self) -> bool {
        self.lease.try_lock().is_err()
    }

    /// The weekly loop. Manual triggers call [`Self::run_cycle`] directly.
    pub async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(CYCLE_PERIOD);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            match self.run_cycle(&cancel).await {
                Ok(log) => log::info!(
                    "CPE sync finished: +{} ~{} -{} ({} failed)",
                    log.added,
                    log.updated,
                    log.deprecated,
                    log.failed
                ),
                Err(SyncError::Busy) => log::debug!("CPE sync already running"),
                Err(err) => log::error!("CPE sync failed: {err}"),
            }
        }

        Ok(())
    }

    /// One full pass over the catalog. Progress is committed incrementally
    /// and never rolled back; an aborted cycle resumes from the catalog's
    /// authoritative state next time.
    #[instrument(skip_all, err)]
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<sync_log::Model, SyncError> {
        let Ok(_lease) = self.lease.try_lock() else {
            return Err(SyncError::Busy);
        };

        let started_at = OffsetDateTime::now_utc();
        let log = sync_log::ActiveModel {
            id: Set(Uuid::now_v7()),
            started_at: Set(started_at),
            finished_at: Set(None),
            status: Set(sync_log::Status::Running),
            added: Set(0),
            updated: Set(0),
            deprecated: Set(0),
            failed: Set(0),
            error: Set(None),
        };
        let log = log.insert(&*self.db).await?;

        let mut counters = Counters::default();
        let mut start_index = 0u32;

        loop {
            if cancel.is_cancelled() {
                return self
                    .finish(log, counters, sync_log::Status::Failed, Some("cancelled".into()))
                    .await;
            }

            let page = match self.fetch_page(start_index).await {
                Ok(page) => page,
                Err(err) => {
                    counters.failed += 1;
                    return self
                        .finish(log, counters, sync_log::Status::Failed, Some(err.to_string()))
                        .await;
                }
            };

            for entry in &page.products {
                match self.upsert(&entry.cpe).await {
                    Ok(Upsert::Added) => counters.added += 1,
                    Ok(Upsert::Updated) => counters.updated += 1,
                    Ok(Upsert::Touched) => {}
                    Ok(Upsert::Skipped) => counters.failed += 1,
                    Err(err) => {
                        log::warn!("upsert of '{}' failed: {err}", entry.cpe.cpe_name);
                        counters.failed += 1;
                    }
                }
            }

            let seen = page.start_index + page.results_per_page;
            if seen >= page.total_results || page.products.is_empty() {
                break;
            }
            start_index = seen;

            tokio::time::sleep(MIN_REQUEST_DELAY).await;
        }

        // full pass complete: anything not touched this cycle is gone from
        // the catalog
        counters.deprecated = self.deprecate_untouched(started_at).await?;

        self.finish(log, counters, sync_log::Status::Succeeded, None)
            .await
    }

    async fn fetch_page(&self, start_index: u32) -> Result<CatalogPage, SyncError> {
        let mut delay = Duration::from_secs(2);

        for attempt in 0..=MAX_PAGE_RETRIES {
            let result = self
                .client
                .get(self.url.clone())
                .query(&[("startIndex", start_index.to_string())])
                .query(&[("resultsPerPage", PAGE_SIZE.to_string())])
                .send()
                .await
                .and_then(|response| response.error_for_status());

            match result {
                Ok(response) => match response.json::<CatalogPage>().await {
                    Ok(page) => return Ok(page),
                    Err(err) => {
                        log::warn!("catalog page {start_index} unparsable: {err}");
                    }
                },
                Err(err) => {
                    log::warn!("catalog page {start_index} failed (attempt {attempt}): {err}");
                }
            }

            if attempt < MAX_PAGE_RETRIES {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }

        Err(SyncError::Catalog(format!(
            "page {start_index} failed after {MAX_PAGE_RETRIES} retries"
        )))
    }

    async fn upsert(&self, entry: &CatalogCpe) -> Result<Upsert, SyncError> {
        let Some(parts) = parse_cpe23(&entry.cpe_name) else {
            log::debug!("skipping malformed CPE name '{}'", entry.cpe_name);
            return Ok(Upsert::Skipped);
        };

        let (Some(vendor), Some(name)) = (parts.vendor, parts.product) else {
            return Ok(Upsert::Skipped);
        };

        let description = entry
            .titles
            .iter()
            .find(|t| t.lang == "en")
            .or_else(|| entry.titles.first())
            .map(|t| t.title.clone());

        let now = OffsetDateTime::now_utc();

        let existing = product::Entity::find()
            .filter(product::Column::CpeUri.eq(entry.cpe_name.as_str()))
            .one(&*self.db)
            .await?;

        match existing {
            None => {
                let model = product::ActiveModel {
                    id: Set(Uuid::now_v7()),
                    vendor: Set(vendor),
                    name: Set(name),
                    version: Set(parts.version),
                    cpe_uri: Set(Some(entry.cpe_name.clone())),
                    description: Set(description),
                    source: Set(product::Source::ExternalCatalog),
                    monitored: Set(false),
                    deprecated: Set(entry.deprecated),
                    last_synced_at: Set(Some(now)),
                    created_at: Set(now),
                };
                model.insert(&*self.db).await?;
                Ok(Upsert::Added)
            }
            Some(existing) => {
                let changed = existing.vendor != vendor
                    || existing.name != name
                    || existing.version != parts.version
                    || existing.description != description
                    || existing.deprecated != entry.deprecated;

                let mut active = existing.into_active_model();
                active.last_synced_at = Set(Some(now));

                if changed {
                    active.vendor = Set(vendor);
                    active.name = Set(name);
                    active.version = Set(parts.version);
                    active.description = Set(description);
                    active.deprecated = Set(entry.deprecated);
                }

                active.update(&*self.db).await?;

                Ok(if changed { Upsert::Updated } else { Upsert::Touched })
            }
        }
    }

    /// Flag catalog entries absent from this cycle. Custom entries are never
    /// part of this statement.
    async fn deprecate_untouched(&self, started_at: OffsetDateTime) -> Result<i64, SyncError> {
        let result = product::Entity::update_many()
            .col_expr(
                product::Column::Deprecated,
                sea_orm::sea_query::Expr::value(true),
            )
            .filter(product::Column::Source.eq(product::Source::ExternalCatalog))
            .filter(product::Column::Deprecated.eq(false))
            .filter(
                sea_orm::Condition::any()
                    .add(product::Column::LastSyncedAt.lt(started_at))
                    .add(product::Column::LastSyncedAt.is_null()),
            )
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected as i64)
    }

    async fn finish(
        &self,
        log: sync_log::Model,
        counters: Counters,
        status: sync_log::Status,
        error: Option<String>,
    ) -> Result<sync_log::Model, SyncError> {
        let update = sync_log::ActiveModel {
            id: Set(log.id),
            finished_at: Set(Some(OffsetDateTime::now_utc())),
            status: Set(status),
            added: Set(counters.added),
            updated: Set(counters.updated),
            deprecated: Set(counters.deprecated),
            failed: Set(counters.failed),
            error: Set(error),
            ..Default::default()
        };

        Ok(sync_log::Entity::update(update).exec(&*self.db).await?)
    }
}

enum Upsert {
    Added,
    Updated,
    Touched,
    Skipped,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test_log::test]
    fn catalog_page_parses() {
        let page: CatalogPage = serde_json::from_value(serde_json::json!({
            "resultsPerPage": 2,
            "startIndex": 0,
            "totalResults": 2,
            "products": [
                {
                    "cpe": {
                        "cpeName": "cpe:2.3:a:acme:cms:2.1:*:*:*:*:*:*:*",
                        "deprecated": false,
                        "titles": [ { "title": "Acme CMS 2.1", "lang": "en" } ]
                    }
                },
                {
                    "cpe": {
                        "cpeName": "cpe:2.3:a:acme:cms:2.2:*:*:*:*:*:*:*",
                        "deprecated": true
                    }
                }
            ]
        }))
        .unwrap();

        assert_eq!(page.products.len(), 2);
        assert!(page.products[1].cpe.deprecated);
        assert_eq!(page.products[0].cpe.titles[0].title, "Acme CMS 2.1");
    }
}
