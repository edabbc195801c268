use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "product")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    /// Canonical form: trimmed and lowercased before any comparison.
    pub vendor: String,
    pub name: String,
    pub version: Option<String>,
    #[sea_orm(unique)]
    pub cpe_uri: Option<String>,
    pub description: Option<String>,
    pub source: Source,
    pub monitored: bool,
    pub deprecated: bool,
    pub last_synced_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::vulnerability_product::Entity")]
    VulnerabilityProduct,
}

impl Related<super::vulnerability_product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VulnerabilityProduct.def()
    }
}

impl Related<super::vulnerability::Entity> for Entity {
    fn to() -> RelationDef {
        super::vulnerability_product::Relation::Vulnerability.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::vulnerability_product::Relation::Product.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "product_source")]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Synced from the external CPE dictionary; subject to deprecation.
    #[sea_orm(string_value = "external_catalog")]
    ExternalCatalog,
    /// Entered through the admin surface; never touched by sync.
    #[sea_orm(string_value = "custom")]
    Custom,
}

/// Canonicalize a vendor or product component for comparison.
pub fn canonicalize(value: &str) -> String {
    value.trim().to_lowercase()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test_log::test]
    fn canonical_form() {
        assert_eq!(canonicalize("  Acme Corp "), "acme corp");
        assert_eq!(canonicalize("ACME"), "acme");
    }
}
