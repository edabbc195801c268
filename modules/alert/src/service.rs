use actix_web::{HttpResponse, ResponseError, body::BoxBody};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use time::OffsetDateTime;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;
use vulndash_common::{
    db::Database,
    error::ErrorInformation,
    model::{Paginated, PaginatedResults},
    settings::{self, NotificationSettings},
};
use vulndash_entity::{
    email_alert::{self, AlertType, Status},
    setting,
};
use vulndash_module_ingestor::service::StoreEvent;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Database(#[from] sea_orm::DbErr),
    #[error("alert not found: {0}")]
    NotFound(Uuid),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("smtp failure: {0}")]
    Smtp(String),
}

impl ResponseError for Error {
    fn error_response(&self) -> HttpResponse<BoxBody> {
        match self {
            Self::NotFound(id) => {
                HttpResponse::NotFound().json(ErrorInformation::new("NotFound", id))
            }
            Self::Conflict(msg) => {
                HttpResponse::Conflict().json(ErrorInformation::new("Conflict", msg))
            }
            Self::Smtp(msg) => {
                HttpResponse::BadGateway().json(ErrorInformation::new("Smtp", msg))
            }
            err => {
                log::warn!("{err}");
                HttpResponse::InternalServerError().json(ErrorInformation::new("Internal", ""))
            }
        }
    }
}

/// Queue side of the alert engine: turns store events into pending alert
/// rows, deduplicated by `(vulnerability_id, alert_type, recipient)`.
#[derive(Clone)]
pub struct AlertService {
    db: Database,
}

impl AlertService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Consume curated-store events until the channel closes or the process
    /// shuts down.
    pub async fn run_listener(
        &self,
        mut events: UnboundedReceiver<StoreEvent>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            if let Err(err) = self.handle_event(&event).await {
                // failure isolation: a bad alert must not affect the store
                log::error!("handling store event failed: {err}");
            }
        }

        Ok(())
    }

    /// Evaluate one event against the notification settings and queue alert
    /// rows for every configured recipient.
    #[instrument(skip_all, err)]
    pub async fn handle_event(&self, event: &StoreEvent) -> Result<u64, Error> {
        let config =
            setting::fetch::<NotificationSettings>(settings::NOTIFICATIONS, &*self.db).await?;

        let (vulnerability_id, alert_type) = match event {
            StoreEvent::KevSet { vulnerability_id } if config.alert_on_kev => {
                (vulnerability_id, AlertType::Kev)
            }
            StoreEvent::EpssCrossed {
                vulnerability_id,
                score,
            } if config.alert_on_high_epss && *score >= config.epss_threshold => {
                (vulnerability_id, AlertType::HighEpss)
            }
            _ => return Ok(0),
        };

        let mut queued = 0;
        for recipient in &config.recipients {
            if self
                .is_duplicate(vulnerability_id, alert_type, recipient)
                .await?
            {
                continue;
            }

            let alert = email_alert::ActiveModel {
                id: Set(Uuid::now_v7()),
                vulnerability_id: Set(vulnerability_id.clone()),
                alert_type: Set(alert_type),
                recipient: Set(recipient.clone()),
                status: Set(Status::Pending),
                error: Set(None),
                sent_via_digest: Set(false),
                created_at: Set(OffsetDateTime::now_utc()),
                sent_at: Set(None),
            };
            alert.insert(&*self.db).await?;
            queued += 1;
        }

        Ok(queued)
    }

    /// `true` when a non-failed alert already exists for the tuple.
    async fn is_duplicate(
        &self,
        vulnerability_id: &str,
        alert_type: AlertType,
        recipient: &str,
    ) -> Result<bool, Error> {
        let count = email_alert::Entity::find()
            .filter(email_alert::Column::VulnerabilityId.eq(vulnerability_id))
            .filter(email_alert::Column::AlertType.eq(alert_type))
            .filter(email_alert::Column::Recipient.eq(recipient))
            .filter(email_alert::Column::Status.ne(Status::Failed))
            .count(&*self.db)
            .await?;

        Ok(count > 0)
    }

    pub async fn list(
        &self,
        paginated: Paginated,
    ) -> Result<PaginatedResults<email_alert::Model>, Error> {
        let paginated = paginated.clamped();

        let total = email_alert::Entity::find().count(&*self.db).await?;
        let items = email_alert::Entity::find()
            .order_by_desc(email_alert::Column::CreatedAt)
            .offset(paginated.offset)
            .limit(paginated.limit)
            .all(&*self.db)
            .await?;

        Ok(PaginatedResults { items, total })
    }

    /// `failed → pending`; retrying is a manual decision.
    #[instrument(skip_all, fields(alert = %id), err)]
    pub async fn requeue(&self, id: Uuid) -> Result<(), Error> {
        let alert = email_alert::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or(Error::NotFound(id))?;

        if alert.status != Status::Failed {
            return Err(Error::Conflict("only failed alerts can be re-queued".into()));
        }

        let update = email_alert::ActiveModel {
            id: Set(id),
            status: Set(Status::Pending),
            error: Set(None),
            ..Default::default()
        };
        email_alert::Entity::update(update).exec(&*self.db).await?;

        Ok(())
    }
}
