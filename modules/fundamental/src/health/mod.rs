pub mod endpoints;

use crate::settings::endpoints::ProviderProbe;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Health {
    /// Overall verdict: everything below is fine
    pub ok: bool,
    pub database: bool,
    pub providers: Vec<ProviderProbe>,
    /// Numbers an operator wants at a glance
    pub pending_raw_entries: u64,
    pub pending_review_items: u64,
    pub pending_alerts: u64,
}
