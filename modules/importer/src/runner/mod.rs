pub mod epss;
pub mod kev;
pub mod nvd;
pub mod rss;

use crate::model::{RunReport, SourceConfiguration};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;
use vulndash_common::{crypto::SecretCipher, db::Database};
use vulndash_entity::{raw_entry, source};
use vulndash_module_ingestor::service::IngestService;

/// Executes one run of a configured source.
pub struct Runner {
    db: Database,
    ingest: IngestService,
    cipher: SecretCipher,
    client: reqwest::Client,
}

impl Runner {
    pub fn new(db: Database, ingest: IngestService, cipher: SecretCipher) -> Self {
        Self {
            db,
            ingest,
            cipher,
            client: reqwest::Client::new(),
        }
    }

    #[instrument(skip_all, fields(source = %row.name), err)]
    pub async fn run_once(&self, row: &source::Model) -> anyhow::Result<RunReport> {
        let configuration: SourceConfiguration =
            serde_json::from_value(row.configuration.clone())?;

        match &configuration {
            SourceConfiguration::Nvd(nvd) => {
                nvd::run(self, row.id, nvd, row.last_success).await
            }
            SourceConfiguration::Kev(kev) => kev::run(self, row.id, kev).await,
            SourceConfiguration::Rss(rss) => rss::run(self, row.id, rss).await,
            SourceConfiguration::Epss(epss) => epss::run(self, epss).await,
        }
    }

    /// Stage raw text for extraction, deduplicating identical text per
    /// source. Returns `true` when a new entry was created.
    pub(crate) async fn stage(
        &self,
        source_id: Uuid,
        text: String,
    ) -> Result<bool, sea_orm::DbErr> {
        let known = raw_entry::Entity::find()
            .filter(raw_entry::Column::SourceId.eq(source_id))
            .filter(raw_entry::Column::Text.eq(text.as_str()))
            .count(&*self.db)
            .await?;

        if known > 0 {
            return Ok(false);
        }

        let entry = raw_entry::ActiveModel {
            id: Set(Uuid::now_v7()),
            source_id: Set(source_id),
            text: Set(text),
            fetched_at: Set(OffsetDateTime::now_utc()),
            status: Set(raw_entry::Status::Pending),
            attempts: Set(0),
            next_attempt_at: Set(None),
            terminal_at: Set(None),
            last_error: Set(None),
            vulnerability_id: Set(None),
        };
        entry.insert(&*self.db).await?;

        Ok(true)
    }

    pub(crate) fn db(&self) -> &Database {
        &self.db
    }

    pub(crate) fn ingest(&self) -> &IngestService {
        &self.ingest
    }

    pub(crate) fn cipher(&self) -> &SecretCipher {
        &self.cipher
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }
}
