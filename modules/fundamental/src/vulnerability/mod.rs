pub mod endpoints;
pub mod service;

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use vulndash_entity::{product, vulnerability};

/// Filters accepted by the public list and export endpoints.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, IntoParams, ToSchema)]
pub struct VulnerabilityFilters {
    pub vendor: Option<String>,
    pub product: Option<String>,
    pub severity: Option<vulnerability::Severity>,
    pub min_cvss: Option<f64>,
    pub min_epss: Option<f64>,
    #[serde(default)]
    pub kev_only: bool,
    #[serde(default)]
    pub hide_remediated: bool,
    /// Free-text match across id, title, description, vendor and product
    pub search: Option<String>,
}

/// The public list envelope.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct VulnerabilityList {
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
    pub vulnerabilities: Vec<vulnerability::Model>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct VulnerabilityDetails {
    #[serde(flatten)]
    pub vulnerability: vulnerability::Model,
    /// Inventory products linked to this record
    pub products: Vec<product::Model>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RemediationState {
    pub cve_id: String,
    pub remediated: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub remediated_at: Option<time::OffsetDateTime>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TrendPoint {
    #[schema(value_type = String)]
    pub day: time::Date,
    pub total: i64,
    pub kev: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Kpis {
    pub total: u64,
    pub kev: u64,
    pub high_epss: u64,
    pub new_today: u64,
    pub new_this_week: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}
