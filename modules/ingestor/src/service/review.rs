use super::{Error, ExtractionProvenance, IngestService, VulnerabilityWrite, close_raw_entry, upsert};
use crate::model::ExtractionResult;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait, TransactionTrait};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;
use vulndash_entity::{
    raw_entry,
    review_queue_item::{self, Decision},
    vulnerability::{self, Severity},
};

/// Field overrides a reviewer may apply on approval.
///
/// Changing the CVE id is not allowed; such items must be rejected and the
/// text re-ingested.
#[derive(Clone, Debug, Default, serde::Deserialize, utoipa::ToSchema)]
pub struct ReviewEdits {
    pub cve_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub vendor: Option<String>,
    pub product: Option<String>,
    pub severity: Option<Severity>,
    pub cvss_score: Option<f64>,
    pub cvss_vector: Option<String>,
}

impl IngestService {
    /// Park a low-confidence extraction in the review queue and mark its raw
    /// entry accordingly, in one transaction.
    #[instrument(skip_all, fields(raw_entry = %raw_entry_id), err)]
    pub async fn queue_review(
        &self,
        raw_entry_id: Uuid,
        result: &ExtractionResult,
    ) -> Result<review_queue_item::Model, Error> {
        let tx = self.db.begin().await?;

        let item = review_queue_item::ActiveModel {
            id: Set(Uuid::now_v7()),
            raw_entry_id: Set(raw_entry_id),
            cve_id: Set(result.cve_id.clone()),
            title: Set(result.title.clone()),
            description: Set(result.description.clone()),
            vendor: Set(result.vendor.clone()),
            product: Set(result.product.clone()),
            severity: Set(result.severity),
            cvss_score: Set(result.cvss_score),
            cvss_vector: Set(result.cvss_vector.clone()),
            confidence: Set(result.confidence_score),
            extraction_provider: Set(result.metadata.provider.clone()),
            extraction_model: Set(result.metadata.model.clone()),
            fallback_attempt: Set(result.metadata.fallback_attempt as i32),
            validation_warnings: Set(serde_json::to_value(&result.metadata.warnings)
                .unwrap_or_else(|_| serde_json::json!([]))),
            decision: Set(Decision::Pending),
            decided_at: Set(None),
            created_at: Set(OffsetDateTime::now_utc()),
        };

        let item = item.insert(&tx).await?;

        close_raw_entry(raw_entry_id, raw_entry::Status::NeedsReview, None, None, &tx).await?;

        tx.commit().await?;

        Ok(item)
    }

    /// Approve an item: merge reviewer edits and promote to the curated
    /// store. Atomic per item.
    #[instrument(skip_all, fields(item = %id), err)]
    pub async fn approve_review(
        &self,
        id: Uuid,
        edits: ReviewEdits,
    ) -> Result<vulnerability::Model, Error> {
        let item = review_queue_item::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if item.decision != Decision::Pending {
            return Err(Error::Conflict("item was already decided".into()));
        }

        if let Some(edited) = &edits.cve_id {
            if Some(edited.as_str()) != item.cve_id.as_deref() {
                return Err(Error::BadRequest(
                    "changing the CVE id is not allowed; reject and re-ingest instead".into(),
                ));
            }
        }

        let cve_id = item
            .cve_id
            .clone()
            .ok_or_else(|| Error::BadRequest("cannot approve an item without a CVE id".into()))?;

        let write = VulnerabilityWrite {
            cve_id,
            title: edits.title.or(item.title),
            description: edits.description.or(item.description),
            vendor: edits.vendor.or(item.vendor),
            product: edits.product.or(item.product),
            severity: edits
                .severity
                .or((item.severity != Severity::Unknown).then_some(item.severity)),
            cvss_score: edits.cvss_score.or(item.cvss_score),
            cvss_vector: edits.cvss_vector.or(item.cvss_vector),
            extraction: Some(ExtractionProvenance {
                confidence: item.confidence,
                provider: item.extraction_provider,
                model: item.extraction_model,
                fallback_attempt: item.fallback_attempt,
                warnings: serde_json::from_value(item.validation_warnings).unwrap_or_default(),
            }),
            ..Default::default()
        };

        let _guard = self.locks.lock(&write.cve_id).await;

        let tx = self.db.begin().await?;

        let (model, events) = upsert(&write, true, &tx).await?;

        close_raw_entry(
            item.raw_entry_id,
            raw_entry::Status::Processed,
            Some(&model.id),
            None,
            &tx,
        )
        .await?;

        let decided = review_queue_item::ActiveModel {
            id: Set(id),
            decision: Set(Decision::Approved),
            decided_at: Set(Some(OffsetDateTime::now_utc())),
            ..Default::default()
        };
        review_queue_item::Entity::update(decided).exec(&tx).await?;

        tx.commit().await?;

        self.publish(events);

        Ok(model)
    }

    /// Reject an item; the raw entry is marked skipped.
    #[instrument(skip_all, fields(item = %id), err)]
    pub async fn reject_review(&self, id: Uuid) -> Result<(), Error> {
        let item = review_queue_item::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if item.decision != Decision::Pending {
            return Err(Error::Conflict("item was already decided".into()));
        }

        let tx = self.db.begin().await?;

        let decided = review_queue_item::ActiveModel {
            id: Set(id),
            decision: Set(Decision::Rejected),
            decided_at: Set(Some(OffsetDateTime::now_utc())),
            ..Default::default()
        };
        review_queue_item::Entity::update(decided).exec(&tx).await?;

        close_raw_entry(
            item.raw_entry_id,
            raw_entry::Status::Skipped,
            None,
            Some("rejected by reviewer".into()),
            &tx,
        )
        .await?;

        tx.commit().await?;

        Ok(())
    }
}
