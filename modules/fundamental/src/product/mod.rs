pub mod endpoints;
pub mod service;

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use vulndash_entity::product;

/// Create or update payload for a custom inventory entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProductRequest {
    pub vendor: String,
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub cpe_uri: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub monitored: bool,
}

/// Search parameters for the inventory.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, IntoParams)]
pub struct ProductSearch {
    /// Ranked full-text query over vendor, name and description
    pub q: Option<String>,
    /// Exact vendor match (canonicalized)
    pub vendor: Option<String>,
    #[serde(default)]
    pub monitored_only: bool,
    pub source: Option<ProductSourceFilter>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProductSourceFilter {
    ExternalCatalog,
    Custom,
}

impl From<ProductSourceFilter> for product::Source {
    fn from(value: ProductSourceFilter) -> Self {
        match value {
            ProductSourceFilter::ExternalCatalog => product::Source::ExternalCatalog,
            ProductSourceFilter::Custom => product::Source::Custom,
        }
    }
}
