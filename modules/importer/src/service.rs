use crate::model::{Source, SourceConfiguration};
use actix_web::{HttpResponse, ResponseError, body::BoxBody};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;
use vulndash_common::{
    db::{Database, DatabaseErrors},
    error::ErrorInformation,
    model::Revisioned,
};
use vulndash_entity::source;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Database(#[from] sea_orm::DbErr),
    #[error("source not found: {0}")]
    NotFound(String),
    #[error("a source with this name already exists")]
    Conflict,
    #[error("mid-air collision, the source changed while editing")]
    RevisionMismatch,
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl ResponseError for Error {
    fn error_response(&self) -> HttpResponse<BoxBody> {
        match self {
            Self::NotFound(msg) => {
                HttpResponse::NotFound().json(ErrorInformation::new("NotFound", msg))
            }
            Self::Conflict => HttpResponse::Conflict().json(ErrorInformation::new("Conflict", self)),
            Self::RevisionMismatch => HttpResponse::PreconditionFailed()
                .json(ErrorInformation::new("RevisionMismatch", self)),
            Self::InvalidConfiguration(msg) => {
                HttpResponse::BadRequest().json(ErrorInformation::new("InvalidConfiguration", msg))
            }
            err => {
                log::warn!("{err}");
                HttpResponse::InternalServerError().json(ErrorInformation::new("Internal", ""))
            }
        }
    }
}

/// CRUD plus run bookkeeping for feed sources.
#[derive(Clone)]
pub struct SourceService {
    db: Database,
}

impl SourceService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn list(&self) -> Result<Vec<Source>, Error> {
        let sources = source::Entity::find()
            .order_by_asc(source::Column::Name)
            .all(&*self.db)
            .await?;

        sources.into_iter().map(into_source).collect()
    }

    pub async fn read(&self, name: &str) -> Result<Option<Revisioned<Source>>, Error> {
        let Some(row) = source::Entity::find()
            .filter(source::Column::Name.eq(name))
            .one(&*self.db)
            .await?
        else {
            return Ok(None);
        };

        let revision = row.revision.to_string();
        Ok(Some(Revisioned {
            value: into_source(row)?,
            revision,
        }))
    }

    #[instrument(skip_all, fields(name), err)]
    pub async fn create(
        &self,
        name: String,
        configuration: SourceConfiguration,
    ) -> Result<Uuid, Error> {
        validate(&configuration)?;

        let id = Uuid::now_v7();
        let entry = source::ActiveModel {
            id: Set(id),
            name: Set(name),
            configuration: Set(serde_json::to_value(&configuration)
                .map_err(|err| Error::InvalidConfiguration(err.to_string()))?),
            revision: Set(Uuid::now_v7()),
            last_run: Set(None),
            last_success: Set(None),
            last_error: Set(None),
        };

        entry.insert(&*self.db).await.map_err(|err| {
            if err.is_duplicate() {
                Error::Conflict
            } else {
                err.into()
            }
        })?;

        Ok(id)
    }

    #[instrument(skip_all, fields(name), err)]
    pub async fn update(
        &self,
        name: &str,
        revision: Option<&str>,
        configuration: SourceConfiguration,
    ) -> Result<(), Error> {
        validate(&configuration)?;

        let row = self.fetch(name).await?;
        check_revision(&row, revision)?;

        let update = source::ActiveModel {
            id: Set(row.id),
            configuration: Set(serde_json::to_value(&configuration)
                .map_err(|err| Error::InvalidConfiguration(err.to_string()))?),
            revision: Set(Uuid::now_v7()),
            ..Default::default()
        };

        source::Entity::update(update).exec(&*self.db).await?;

        Ok(())
    }

    pub async fn delete(&self, name: &str, revision: Option<&str>) -> Result<bool, Error> {
        let Some(row) = source::Entity::find()
            .filter(source::Column::Name.eq(name))
            .one(&*self.db)
            .await?
        else {
            return Ok(false);
        };

        check_revision(&row, revision)?;

        let result = source::Entity::delete_by_id(row.id).exec(&*self.db).await?;
        Ok(result.rows_affected > 0)
    }

    /// Clear `last_run`, making the source due on the next poll tick.
    pub async fn force_run(&self, name: &str) -> Result<(), Error> {
        let row = self.fetch(name).await?;

        let update = source::ActiveModel {
            id: Set(row.id),
            last_run: Set(None),
            ..Default::default()
        };
        source::Entity::update(update).exec(&*self.db).await?;

        Ok(())
    }

    pub(crate) async fn update_start(&self, id: Uuid) -> Result<(), Error> {
        let update = source::ActiveModel {
            id: Set(id),
            last_run: Set(Some(OffsetDateTime::now_utc())),
            ..Default::default()
        };
        source::Entity::update(update).exec(&*self.db).await?;
        Ok(())
    }

    pub(crate) async fn update_finish(
        &self,
        id: Uuid,
        error: Option<String>,
    ) -> Result<(), Error> {
        let update = source::ActiveModel {
            id: Set(id),
            last_success: if error.is_none() {
                Set(Some(OffsetDateTime::now_utc()))
            } else {
                sea_orm::ActiveValue::NotSet
            },
            last_error: Set(error),
            ..Default::default()
        };
        source::Entity::update(update).exec(&*self.db).await?;
        Ok(())
    }

    pub(crate) async fn all_rows(&self) -> Result<Vec<source::Model>, Error> {
        Ok(source::Entity::find().all(&*self.db).await?)
    }

    async fn fetch(&self, name: &str) -> Result<source::Model, Error> {
        source::Entity::find()
            .filter(source::Column::Name.eq(name))
            .one(&*self.db)
            .await?
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }
}

fn check_revision(row: &source::Model, revision: Option<&str>) -> Result<(), Error> {
    match revision {
        Some(expected) if expected != row.revision.to_string() => Err(Error::RevisionMismatch),
        _ => Ok(()),
    }
}

fn into_source(row: source::Model) -> Result<Source, Error> {
    let configuration = serde_json::from_value(row.configuration)
        .map_err(|err| Error::InvalidConfiguration(err.to_string()))?;

    Ok(Source {
        id: row.id,
        name: row.name,
        configuration,
        last_run: row.last_run,
        last_success: row.last_success,
        last_error: row.last_error,
    })
}

/// Polling periods are bounded to one minute through one week.
fn validate(configuration: &SourceConfiguration) -> Result<(), Error> {
    let period = configuration.common().period;
    let minutes = period.as_secs() / 60;
    if !(1..=10080).contains(&minutes) {
        return Err(Error::InvalidConfiguration(format!(
            "polling period {} out of range (1m..=7d)",
            humantime::format_duration(period)
        )));
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{CommonSource, RssSource};
    use rstest::rstest;
    use std::time::Duration;

    fn rss(period_secs: u64) -> SourceConfiguration {
        SourceConfiguration::Rss(RssSource {
            common: CommonSource {
                period: Duration::from_secs(period_secs),
                disabled: false,
            },
            url: "https://example.com/feed.xml".parse().unwrap(),
        })
    }

    #[rstest]
    #[case(59, false)]
    #[case(60, true)]
    #[case(10080 * 60, true)]
    #[case(10081 * 60, false)]
    #[test_log::test]
    fn period_bounds(#[case] seconds: u64, #[case] ok: bool) {
        assert_eq!(validate(&rss(seconds)).is_ok(), ok);
    }
}
