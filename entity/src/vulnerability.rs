use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "vulnerability")]
pub struct Model {
    /// The CVE identifier
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub vendor: Option<String>,
    pub product: Option<String>,
    pub severity: Severity,
    pub cvss_score: Option<f64>,
    pub cvss_vector: Option<String>,
    pub epss_score: Option<f64>,
    pub epss_percentile: Option<f64>,
    pub kev: bool,
    /// When the KEV flag was last raised; guards against same-day flapping.
    pub kev_since: Option<OffsetDateTime>,
    pub published_at: Option<OffsetDateTime>,
    pub remediated_at: Option<OffsetDateTime>,
    pub confidence: f64,
    pub extraction_provider: Option<String>,
    pub extraction_model: Option<String>,
    pub fallback_attempt: i32,
    pub validation_warnings: serde_json::Value,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::vulnerability_product::Entity")]
    VulnerabilityProduct,

    #[sea_orm(has_many = "super::raw_entry::Entity")]
    RawEntry,

    #[sea_orm(has_many = "super::email_alert::Entity")]
    EmailAlert,
}

impl Related<super::vulnerability_product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VulnerabilityProduct.def()
    }
}

impl Related<super::raw_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RawEntry.def()
    }
}

impl Related<super::email_alert::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EmailAlert.def()
    }
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        super::vulnerability_product::Relation::Product.def()
    }

    fn via() -> Option<RelationDef> {
        Some(
            super::vulnerability_product::Relation::Vulnerability
                .def()
                .rev(),
        )
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "severity")]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Severity {
    #[sea_orm(string_value = "critical")]
    Critical,
    #[sea_orm(string_value = "high")]
    High,
    #[sea_orm(string_value = "medium")]
    Medium,
    #[sea_orm(string_value = "low")]
    Low,
    #[sea_orm(string_value = "none")]
    None,
    #[default]
    #[sea_orm(string_value = "unknown")]
    Unknown,
}

impl Severity {
    /// Map a free-form severity label to the enum. Anything unrecognized
    /// becomes [`Severity::Unknown`].
    pub fn normalize(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => Self::Critical,
            "HIGH" => Self::High,
            "MEDIUM" | "MODERATE" => Self::Medium,
            "LOW" => Self::Low,
            "NONE" => Self::None,
            _ => Self::Unknown,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("critical", Severity::Critical)]
    #[case("CRITICAL", Severity::Critical)]
    #[case(" High ", Severity::High)]
    #[case("moderate", Severity::Medium)]
    #[case("none", Severity::None)]
    #[case("severe", Severity::Unknown)]
    #[case("", Severity::Unknown)]
    #[test_log::test]
    fn normalize(#[case] input: &str, #[case] expected: Severity) {
        assert_eq!(Severity::normalize(input), expected);
    }
}
