use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Shadow of a low-confidence extraction, waiting for a human decision.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "review_queue_item")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub raw_entry_id: Uuid,
    /// May be absent when even the regex gate found nothing.
    pub cve_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub vendor: Option<String>,
    pub product: Option<String>,
    pub severity: super::vulnerability::Severity,
    pub cvss_score: Option<f64>,
    pub cvss_vector: Option<String>,
    pub confidence: f64,
    pub extraction_provider: Option<String>,
    pub extraction_model: Option<String>,
    pub fallback_attempt: i32,
    pub validation_warnings: serde_json::Value,
    pub decision: Decision,
    pub decided_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::raw_entry::Entity",
        from = "Column::RawEntryId",
        to = "super::raw_entry::Column::Id"
    )]
    RawEntry,
}

impl Related<super::raw_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RawEntry.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "review_decision")]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}
