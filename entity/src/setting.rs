use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Singleton configuration documents, keyed by name.
///
/// The typed models live next to their consumers; this table only stores the
/// serialized form plus a revision for optimistic concurrency.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "setting")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    pub value: serde_json::Value,
    pub revision: Uuid,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Fetch and deserialize a configuration document, falling back to its
/// default when the row is absent or fails to parse.
pub async fn fetch<T>(key: &str, db: &impl ConnectionTrait) -> Result<T, DbErr>
where
    T: serde::de::DeserializeOwned + Default,
{
    let Some(row) = Entity::find_by_id(key).one(db).await? else {
        return Ok(T::default());
    };

    Ok(serde_json::from_value(row.value).unwrap_or_else(|err| {
        // a malformed document must not take the pipeline down
        tracing::warn!("setting '{key}' failed to parse, using defaults: {err}");
        T::default()
    }))
}
