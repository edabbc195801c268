use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "source")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub name: String,
    /// The tagged feed configuration, see `vulndash-module-importer`
    pub configuration: serde_json::Value,
    pub revision: Uuid,
    pub last_run: Option<OffsetDateTime>,
    pub last_success: Option<OffsetDateTime>,
    pub last_error: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::raw_entry::Entity")]
    RawEntry,
}

impl Related<super::raw_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RawEntry.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
