pub mod review;

use crate::model::ExtractionResult;
use parking_lot::Mutex;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel,
    QueryFilter, TransactionTrait, sea_query::OnConflict,
};
use std::{collections::HashMap, sync::Arc};
use time::OffsetDateTime;
use tokio::sync::mpsc::UnboundedSender;
use tracing::instrument;
use uuid::Uuid;
use vulndash_common::{cve, db::Database, settings::NotificationSettings};
use vulndash_entity::{
    product, raw_entry, setting,
    vulnerability::{self, Severity},
    vulnerability_product,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Database(#[from] sea_orm::DbErr),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Lifecycle transitions published by the curated store.
///
/// Fired at most once per logical transition, computed inside the write
/// transaction and delivered after commit in commit order per CVE.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreEvent {
    /// `kev` moved from false/null to true.
    KevSet { vulnerability_id: String },
    /// `epss_score` crossed the configured threshold from below.
    EpssCrossed { vulnerability_id: String, score: f64 },
}

/// One write against the curated store. `None` fields leave the stored value
/// untouched.
#[derive(Clone, Debug, Default)]
pub struct VulnerabilityWrite {
    pub cve_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub vendor: Option<String>,
    pub product: Option<String>,
    pub severity: Option<Severity>,
    pub cvss_score: Option<f64>,
    pub cvss_vector: Option<String>,
    pub epss_score: Option<f64>,
    pub epss_percentile: Option<f64>,
    pub kev: Option<bool>,
    pub published_at: Option<OffsetDateTime>,
    /// Extraction metadata travels as a bundle, gated on higher confidence.
    pub extraction: Option<ExtractionProvenance>,
}

#[derive(Clone, Debug)]
pub struct ExtractionProvenance {
    pub confidence: f64,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub fallback_attempt: i32,
    pub warnings: Vec<String>,
}

impl VulnerabilityWrite {
    pub fn from_extraction(result: &ExtractionResult) -> Result<Self, Error> {
        let cve_id = result
            .cve_id
            .clone()
            .ok_or_else(|| Error::BadRequest("extraction carries no CVE id".into()))?;

        Ok(Self {
            cve_id,
            title: result.title.clone(),
            description: result.description.clone(),
            vendor: result.vendor.clone(),
            product: result.product.clone(),
            severity: (result.severity != Severity::Unknown).then_some(result.severity),
            cvss_score: result.cvss_score,
            cvss_vector: result.cvss_vector.clone(),
            extraction: Some(ExtractionProvenance {
                confidence: result.confidence_score,
                provider: result.metadata.provider.clone(),
                model: result.metadata.model.clone(),
                fallback_attempt: result.metadata.fallback_attempt as i32,
                warnings: result.metadata.warnings.clone(),
            }),
            ..Default::default()
        })
    }
}

/// Write side of the curated store, plus the review queue transitions which
/// feed it.
///
/// Writes are serialized per CVE id; all expected failures surface as typed
/// errors.
#[derive(Clone)]
pub struct IngestService {
    db: Database,
    events: UnboundedSender<StoreEvent>,
    locks: KeyedMutex,
}

impl IngestService {
    pub fn new(db: Database, events: UnboundedSender<StoreEvent>) -> Self {
        Self {
            db,
            events,
            locks: KeyedMutex::default(),
        }
    }

    /// Promote an extraction to the curated store and close out its raw
    /// entry in the same transaction.
    #[instrument(skip_all, fields(raw_entry = %raw_entry_id), err)]
    pub async fn promote_extraction(
        &self,
        raw_entry_id: Uuid,
        result: &ExtractionResult,
    ) -> Result<vulnerability::Model, Error> {
        let write = VulnerabilityWrite::from_extraction(result)?;
        self.promote(Some(raw_entry_id), write).await
    }

    /// Promote a write, optionally closing out the raw entry it came from.
    pub async fn promote(
        &self,
        raw_entry_id: Option<Uuid>,
        write: VulnerabilityWrite,
    ) -> Result<vulnerability::Model, Error> {
        if cve::normalize(&write.cve_id).as_deref() != Some(write.cve_id.as_str()) {
            return Err(Error::BadRequest(format!(
                "not a valid CVE id: '{}'",
                write.cve_id
            )));
        }

        let _guard = self.locks.lock(&write.cve_id).await;

        let tx = self.db.begin().await?;

        let (model, events) = upsert(&write, true, &tx).await?;

        if let Some(raw_entry_id) = raw_entry_id {
            close_raw_entry(
                raw_entry_id,
                raw_entry::Status::Processed,
                Some(&model.id),
                None,
                &tx,
            )
            .await?;
        }

        tx.commit().await?;

        self.publish(events);

        Ok(model)
    }

    /// Apply EPSS/KEV enrichment to an existing record. Unknown CVEs are
    /// ignored; enrichment alone does not create curated records.
    #[instrument(skip_all, fields(cve = %write.cve_id), err)]
    pub async fn apply_enrichment(
        &self,
        write: VulnerabilityWrite,
    ) -> Result<Option<vulnerability::Model>, Error> {
        let _guard = self.locks.lock(&write.cve_id).await;

        let tx = self.db.begin().await?;

        if vulnerability::Entity::find_by_id(write.cve_id.as_str())
            .one(&tx)
            .await?
            .is_none()
        {
            tx.rollback().await?;
            return Ok(None);
        }

        let (model, events) = upsert(&write, false, &tx).await?;
        tx.commit().await?;

        self.publish(events);

        Ok(Some(model))
    }

    fn publish(&self, events: Vec<StoreEvent>) {
        for event in events {
            if self.events.send(event).is_err() {
                log::debug!("no alert engine attached, dropping store event");
            }
        }
    }
}

/// Insert-or-merge inside the caller's transaction, returning the stored
/// model plus the lifecycle events this write caused.
async fn upsert(
    write: &VulnerabilityWrite,
    create: bool,
    tx: &impl ConnectionTrait,
) -> Result<(vulnerability::Model, Vec<StoreEvent>), Error> {
    let now = OffsetDateTime::now_utc();
    let notifications = setting::fetch::<NotificationSettings>(vulndash_common::settings::NOTIFICATIONS, tx).await?;

    let existing = vulnerability::Entity::find_by_id(write.cve_id.as_str())
        .one(tx)
        .await?;

    let (mut model, is_new) = match existing {
        Some(model) => (model, false),
        None if create => (
            vulnerability::Model {
                id: write.cve_id.clone(),
                title: None,
                description: None,
                vendor: None,
                product: None,
                severity: Severity::Unknown,
                cvss_score: None,
                cvss_vector: None,
                epss_score: None,
                epss_percentile: None,
                kev: false,
                kev_since: None,
                published_at: None,
                remediated_at: None,
                confidence: 0.0,
                extraction_provider: None,
                extraction_model: None,
                fallback_attempt: 0,
                validation_warnings: serde_json::json!([]),
                created_at: now,
                updated_at: now,
            },
            true,
        ),
        None => return Err(Error::NotFound(write.cve_id.clone())),
    };

    let events = merge_into(&mut model, write, now, notifications.epss_threshold);

    // write every column; the per-key lock makes this race free within the
    // process
    let active = model.clone().into_active_model().reset_all();
    let stored = if is_new {
        active.insert(tx).await?
    } else {
        active.update(tx).await?
    };

    link_products(&stored, tx).await?;

    Ok((stored, events))
}

/// Merge a write into the stored model. Pure, so the semantics are testable
/// without a database.
///
/// Rules: non-null incoming wins; `remediated_at` is preserved; extraction
/// metadata is replaced only when the incoming confidence exceeds the stored
/// one; KEV never flips back to false on the calendar day it was raised.
fn merge_into(
    model: &mut vulnerability::Model,
    write: &VulnerabilityWrite,
    now: OffsetDateTime,
    epss_threshold: f64,
) -> Vec<StoreEvent> {
    let mut events = Vec::new();

    if let Some(title) = &write.title {
        model.title = Some(title.clone());
    }
    if let Some(description) = &write.description {
        model.description = Some(description.clone());
    }
    if let Some(vendor) = &write.vendor {
        model.vendor = Some(product::canonicalize(vendor));
    }
    if let Some(product_name) = &write.product {
        model.product = Some(product::canonicalize(product_name));
    }
    if let Some(severity) = write.severity {
        model.severity = severity;
    }
    if let Some(score) = write.cvss_score {
        model.cvss_score = Some(score);
    }
    if let Some(vector) = &write.cvss_vector {
        model.cvss_vector = Some(vector.clone());
    }
    if let Some(published_at) = write.published_at {
        model.published_at = Some(published_at);
    }

    if let Some(score) = write.epss_score {
        let crossed = epss_threshold < 1.0
            && score >= epss_threshold
            && !model.epss_score.is_some_and(|old| old >= epss_threshold);
        if crossed {
            events.push(StoreEvent::EpssCrossed {
                vulnerability_id: model.id.clone(),
                score,
            });
        }
        model.epss_score = Some(score);
        model.epss_percentile = write.epss_percentile.or(model.epss_percentile);
    }

    match write.kev {
        Some(true) if !model.kev => {
            model.kev = true;
            model.kev_since = Some(now);
            events.push(StoreEvent::KevSet {
                vulnerability_id: model.id.clone(),
            });
        }
        Some(false) if model.kev => {
            // sticky within the day it was raised, to avoid flapping
            let same_day = model.kev_since.is_some_and(|since| since.date() == now.date());
            if !same_day {
                model.kev = false;
            }
        }
        _ => {}
    }

    if let Some(extraction) = &write.extraction {
        if extraction.confidence > model.confidence {
            model.confidence = extraction.confidence;
            model.extraction_provider = extraction.provider.clone();
            model.extraction_model = extraction.model.clone();
            model.fallback_attempt = extraction.fallback_attempt;
            model.validation_warnings =
                serde_json::to_value(&extraction.warnings).unwrap_or_else(|_| serde_json::json!([]));
        }
    }

    model.updated_at = now;

    events
}

/// Best effort many-to-many linking against the product inventory. A missing
/// product is not an error.
async fn link_products(
    model: &vulnerability::Model,
    tx: &impl ConnectionTrait,
) -> Result<(), Error> {
    let (Some(vendor), Some(name)) = (&model.vendor, &model.product) else {
        return Ok(());
    };

    let products = product::Entity::find()
        .filter(product::Column::Vendor.eq(vendor.as_str()))
        .filter(product::Column::Name.eq(name.as_str()))
        .all(tx)
        .await?;

    if products.is_empty() {
        return Ok(());
    }

    let links = products.into_iter().map(|p| vulnerability_product::ActiveModel {
        vulnerability_id: Set(model.id.clone()),
        product_id: Set(p.id),
    });

    vulnerability_product::Entity::insert_many(links)
        .on_conflict(
            OnConflict::columns([
                vulnerability_product::Column::VulnerabilityId,
                vulnerability_product::Column::ProductId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .do_nothing()
        .exec(tx)
        .await?;

    Ok(())
}

/// Move a raw entry to a terminal status.
pub(crate) async fn close_raw_entry(
    id: Uuid,
    status: raw_entry::Status,
    vulnerability_id: Option<&str>,
    error: Option<String>,
    tx: &impl ConnectionTrait,
) -> Result<(), Error> {
    let now = OffsetDateTime::now_utc();

    let update = raw_entry::ActiveModel {
        id: Set(id),
        status: Set(status),
        terminal_at: Set(Some(now)),
        vulnerability_id: Set(vulnerability_id.map(ToString::to_string)),
        last_error: Set(error),
        ..Default::default()
    };

    raw_entry::Entity::update(update).exec(tx).await?;

    Ok(())
}

/// Serializes writes per CVE id within the process.
#[derive(Clone, Default)]
struct KeyedMutex {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl KeyedMutex {
    async fn lock(&self, key: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let mutex = {
            let mut map = self.inner.lock();
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };

        mutex.lock_owned().await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use time::macros::datetime;

    fn stored(id: &str) -> vulnerability::Model {
        vulnerability::Model {
            id: id.into(),
            title: Some("old title".into()),
            description: None,
            vendor: Some("acme".into()),
            product: Some("cms".into()),
            severity: Severity::High,
            cvss_score: Some(7.5),
            cvss_vector: None,
            epss_score: Some(0.1),
            epss_percentile: Some(0.5),
            kev: false,
            kev_since: None,
            published_at: None,
            remediated_at: Some(datetime!(2026-01-02 03:04:05 UTC)),
            confidence: 0.9,
            extraction_provider: Some("ollama".into()),
            extraction_model: Some("llama3".into()),
            fallback_attempt: 0,
            validation_warnings: serde_json::json!([]),
            created_at: datetime!(2026-01-01 00:00:00 UTC),
            updated_at: datetime!(2026-01-01 00:00:00 UTC),
        }
    }

    fn write(id: &str) -> VulnerabilityWrite {
        VulnerabilityWrite {
            cve_id: id.into(),
            ..Default::default()
        }
    }

    const NOW: OffsetDateTime = datetime!(2026-02-01 12:00:00 UTC);

    #[test_log::test]
    fn kev_transition_fires_once() {
        let mut model = stored("CVE-2024-5555");

        let events = merge_into(
            &mut model,
            &VulnerabilityWrite {
                kev: Some(true),
                ..write("CVE-2024-5555")
            },
            NOW,
            0.5,
        );

        assert_eq!(
            events,
            vec![StoreEvent::KevSet {
                vulnerability_id: "CVE-2024-5555".into()
            }]
        );
        assert!(model.kev);
        assert_eq!(model.kev_since, Some(NOW));

        // repeating the same transition emits nothing further
        let events = merge_into(
            &mut model,
            &VulnerabilityWrite {
                kev: Some(true),
                ..write("CVE-2024-5555")
            },
            NOW,
            0.5,
        );
        assert!(events.is_empty());
        assert!(model.kev);
    }

    #[test_log::test]
    fn kev_is_sticky_same_day() {
        let mut model = stored("CVE-2024-5555");
        merge_into(
            &mut model,
            &VulnerabilityWrite {
                kev: Some(true),
                ..write("CVE-2024-5555")
            },
            NOW,
            0.5,
        );

        // clearing on the same calendar day is ignored
        merge_into(
            &mut model,
            &VulnerabilityWrite {
                kev: Some(false),
                ..write("CVE-2024-5555")
            },
            datetime!(2026-02-01 23:59:00 UTC),
            0.5,
        );
        assert!(model.kev);

        // the next day it may clear
        merge_into(
            &mut model,
            &VulnerabilityWrite {
                kev: Some(false),
                ..write("CVE-2024-5555")
            },
            datetime!(2026-02-02 00:01:00 UTC),
            0.5,
        );
        assert!(!model.kev);
    }

    #[test_log::test]
    fn epss_crossing_fires_on_threshold() {
        let mut model = stored("CVE-2024-0001");

        let events = merge_into(
            &mut model,
            &VulnerabilityWrite {
                epss_score: Some(0.5),
                ..write("CVE-2024-0001")
            },
            NOW,
            0.5,
        );

        assert_eq!(
            events,
            vec![StoreEvent::EpssCrossed {
                vulnerability_id: "CVE-2024-0001".into(),
                score: 0.5
            }]
        );

        // already above: no second crossing
        let events = merge_into(
            &mut model,
            &VulnerabilityWrite {
                epss_score: Some(0.7),
                ..write("CVE-2024-0001")
            },
            NOW,
            0.5,
        );
        assert!(events.is_empty());
    }

    #[test_log::test]
    fn epss_threshold_zero_triggers_any_score() {
        let mut model = stored("CVE-2024-0001");
        model.epss_score = None;

        let events = merge_into(
            &mut model,
            &VulnerabilityWrite {
                epss_score: Some(0.0),
                ..write("CVE-2024-0001")
            },
            NOW,
            0.0,
        );
        assert_eq!(events.len(), 1);
    }

    #[test_log::test]
    fn epss_threshold_one_never_triggers() {
        let mut model = stored("CVE-2024-0001");
        model.epss_score = None;

        let events = merge_into(
            &mut model,
            &VulnerabilityWrite {
                epss_score: Some(1.0),
                ..write("CVE-2024-0001")
            },
            NOW,
            1.0,
        );
        assert!(events.is_empty());
    }

    #[test_log::test]
    fn merge_preserves_remediation_and_nulls() {
        let mut model = stored("CVE-2024-0001");
        let original_remediated = model.remediated_at;

        merge_into(
            &mut model,
            &VulnerabilityWrite {
                title: Some("new title".into()),
                ..write("CVE-2024-0001")
            },
            NOW,
            0.5,
        );

        assert_eq!(model.title.as_deref(), Some("new title"));
        assert_eq!(model.remediated_at, original_remediated);
        // untouched fields survive
        assert_eq!(model.vendor.as_deref(), Some("acme"));
        assert_eq!(model.cvss_score, Some(7.5));
    }

    #[test_log::test]
    fn lower_confidence_keeps_stored_metadata() {
        let mut model = stored("CVE-2024-0001");

        merge_into(
            &mut model,
            &VulnerabilityWrite {
                extraction: Some(ExtractionProvenance {
                    confidence: 0.5,
                    provider: Some("openai".into()),
                    model: Some("gpt".into()),
                    fallback_attempt: 1,
                    warnings: vec!["w".into()],
                }),
                ..write("CVE-2024-0001")
            },
            NOW,
            0.5,
        );

        assert_eq!(model.confidence, 0.9);
        assert_eq!(model.extraction_provider.as_deref(), Some("ollama"));

        merge_into(
            &mut model,
            &VulnerabilityWrite {
                extraction: Some(ExtractionProvenance {
                    confidence: 0.95,
                    provider: Some("openai".into()),
                    model: Some("gpt".into()),
                    fallback_attempt: 0,
                    warnings: vec![],
                }),
                ..write("CVE-2024-0001")
            },
            NOW,
            0.5,
        );

        assert_eq!(model.confidence, 0.95);
        assert_eq!(model.extraction_provider.as_deref(), Some("openai"));
    }

    #[test_log::test]
    fn vendor_is_canonicalized_on_merge() {
        let mut model = stored("CVE-2024-0001");

        merge_into(
            &mut model,
            &VulnerabilityWrite {
                vendor: Some("  Acme Corp ".into()),
                ..write("CVE-2024-0001")
            },
            NOW,
            0.5,
        );

        assert_eq!(model.vendor.as_deref(), Some("acme corp"));
    }
}
