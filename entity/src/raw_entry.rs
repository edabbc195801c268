use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "raw_entry")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    pub source_id: Uuid,
    pub text: String,
    pub fetched_at: OffsetDateTime,
    pub status: Status,
    pub attempts: i32,
    pub next_attempt_at: Option<OffsetDateTime>,
    /// Set when the entry reaches a terminal status; drives retention.
    pub terminal_at: Option<OffsetDateTime>,
    pub last_error: Option<String>,
    /// Backref to the curated record this entry produced, set at most once.
    pub vulnerability_id: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::source::Entity",
        from = "Column::SourceId",
        to = "super::source::Column::Id"
    )]
    Source,

    #[sea_orm(
        belongs_to = "super::vulnerability::Entity",
        from = "Column::VulnerabilityId",
        to = "super::vulnerability::Column::Id"
    )]
    Vulnerability,
}

impl Related<super::source::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Source.def()
    }
}

impl Related<super::vulnerability::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vulnerability.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "raw_entry_status")]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "in_progress")]
    InProgress,
    #[sea_orm(string_value = "processed")]
    Processed,
    #[sea_orm(string_value = "needs_review")]
    NeedsReview,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "skipped")]
    Skipped,
}

impl Status {
    /// A terminal entry is never picked up by the scheduler again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::NeedsReview | Self::Skipped)
    }
}
