use super::{ProductRequest, ProductSearch};
use crate::Error;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DbBackend, EntityTrait,
    FromQueryResult, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Statement,
};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;
use vulndash_common::{
    db::{Database, DatabaseErrors},
    model::{Paginated, PaginatedResults},
};
use vulndash_entity::{product, sync_log};

/// Inventory reads and custom-entry writes.
///
/// Catalog entries (`source = external_catalog`) belong to the sync job;
/// this service only flips their monitored flag.
#[derive(Clone)]
pub struct ProductService {
    db: Database,
}

impl ProductService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Ranked search across vendor, product name and description.
    ///
    /// Uses the full-text companion column for real queries and falls back
    /// to plain filtered listing when no query is given. Short terms also
    /// match by substring, so partial vendor names behave as expected.
    pub async fn search(
        &self,
        search: &ProductSearch,
        paginated: Paginated,
    ) -> Result<PaginatedResults<product::Model>, Error> {
        let paginated = paginated.clamped();

        match search.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            Some(query) => self.search_ranked(query, search, paginated).await,
            None => self.list_filtered(search, paginated).await,
        }
    }

    async fn search_ranked(
        &self,
        query: &str,
        search: &ProductSearch,
        paginated: Paginated,
    ) -> Result<PaginatedResults<product::Model>, Error> {
        let pattern = format!("%{}%", query.replace('%', "\\%").replace('_', "\\_"));
        let vendor = search.vendor.as_deref().map(product::canonicalize);
        let source: Option<product::Source> = search.source.map(Into::into);
        let source = source.map(|s| match s {
            product::Source::ExternalCatalog => "external_catalog",
            product::Source::Custom => "custom",
        });

        const MATCH: &str = r#"
FROM product
WHERE (textsearch @@ plainto_tsquery('english', $1)
       OR vendor ILIKE $2
       OR name ILIKE $2)
  AND ($3::text IS NULL OR vendor = $3)
  AND (NOT $4 OR monitored)
  AND ($5::text IS NULL OR source::text = $5)
"#;

        let values: Vec<sea_orm::Value> = vec![
            query.into(),
            pattern.into(),
            vendor.into(),
            search.monitored_only.into(),
            source.into(),
        ];

        #[derive(FromQueryResult)]
        struct CountRow {
            total: i64,
        }

        let count = CountRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            format!("SELECT count(*) AS total {MATCH}"),
            values.clone(),
        ))
        .one(&*self.db)
        .await?
        .map(|row| row.total.max(0) as u64)
        .unwrap_or(0);

        let mut values = values;
        values.push((paginated.limit as i64).into());
        values.push((paginated.offset as i64).into());

        let items = product::Entity::find()
            .from_raw_sql(Statement::from_sql_and_values(
                DbBackend::Postgres,
                format!(
                    r#"SELECT * {MATCH}
ORDER BY ts_rank(textsearch, plainto_tsquery('english', $1)) DESC, vendor, name
LIMIT $6 OFFSET $7"#
                ),
                values,
            ))
            .all(&*self.db)
            .await?;

        Ok(PaginatedResults {
            items,
            total: count,
        })
    }

    async fn list_filtered(
        &self,
        search: &ProductSearch,
        paginated: Paginated,
    ) -> Result<PaginatedResults<product::Model>, Error> {
        let mut condition = Condition::all();
        if let Some(vendor) = &search.vendor {
            condition = condition.add(product::Column::Vendor.eq(product::canonicalize(vendor)));
        }
        if search.monitored_only {
            condition = condition.add(product::Column::Monitored.eq(true));
        }
        if let Some(source) = search.source {
            condition = condition.add(product::Column::Source.eq(product::Source::from(source)));
        }

        let total = product::Entity::find()
            .filter(condition.clone())
            .count(&*self.db)
            .await?;

        let items = product::Entity::find()
            .filter(condition)
            .order_by_asc(product::Column::Vendor)
            .order_by_asc(product::Column::Name)
            .offset(paginated.offset)
            .limit(paginated.limit)
            .all(&*self.db)
            .await?;

        Ok(PaginatedResults { items, total })
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<product::Model>, Error> {
        Ok(product::Entity::find_by_id(id).one(&*self.db).await?)
    }

    #[instrument(skip_all, err)]
    pub async fn create_custom(&self, request: ProductRequest) -> Result<product::Model, Error> {
        let (vendor, name) = validated_names(&request)?;

        let model = product::ActiveModel {
            id: Set(Uuid::now_v7()),
            vendor: Set(vendor),
            name: Set(name),
            version: Set(request.version.filter(|v| !v.trim().is_empty())),
            cpe_uri: Set(request.cpe_uri.filter(|v| !v.trim().is_empty())),
            description: Set(request.description),
            source: Set(product::Source::Custom),
            monitored: Set(request.monitored),
            deprecated: Set(false),
            last_synced_at: Set(None),
            created_at: Set(OffsetDateTime::now_utc()),
        };

        model.insert(&*self.db).await.map_err(|err| {
            if err.is_duplicate() {
                Error::Conflict("a product with this tuple or CPE already exists".into())
            } else {
                err.into()
            }
        })
    }

    /// Field edits apply to custom entries only; the catalog owns the rest.
    #[instrument(skip_all, fields(id = %id), err)]
    pub async fn update(&self, id: Uuid, request: ProductRequest) -> Result<product::Model, Error> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if existing.source != product::Source::Custom {
            return Err(Error::Conflict(
                "catalog entries are maintained by the sync job".into(),
            ));
        }

        let (vendor, name) = validated_names(&request)?;

        let update = product::ActiveModel {
            id: Set(id),
            vendor: Set(vendor),
            name: Set(name),
            version: Set(request.version.filter(|v| !v.trim().is_empty())),
            cpe_uri: Set(request.cpe_uri.filter(|v| !v.trim().is_empty())),
            description: Set(request.description),
            monitored: Set(request.monitored),
            ..Default::default()
        };

        Ok(product::Entity::update(update)
            .exec(&*self.db)
            .await
            .map_err(|err| {
                if err.is_duplicate() {
                    Error::Conflict("a product with this tuple or CPE already exists".into())
                } else {
                    Error::from(err)
                }
            })?)
    }

    #[instrument(skip_all, fields(id = %id), err)]
    pub async fn delete(&self, id: Uuid) -> Result<(), Error> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if existing.source != product::Source::Custom {
            return Err(Error::Conflict("only custom entries can be deleted".into()));
        }

        product::Entity::delete_by_id(id).exec(&*self.db).await?;

        Ok(())
    }

    pub async fn set_monitored(&self, id: Uuid, monitored: bool) -> Result<(), Error> {
        if self.get(id).await?.is_none() {
            return Err(Error::NotFound(id.to_string()));
        }

        let update = product::ActiveModel {
            id: Set(id),
            monitored: Set(monitored),
            ..Default::default()
        };
        product::Entity::update(update).exec(&*self.db).await?;

        Ok(())
    }

    /// Recent sync cycles, newest first.
    pub async fn sync_log(
        &self,
        paginated: Paginated,
    ) -> Result<PaginatedResults<sync_log::Model>, Error> {
        let paginated = paginated.clamped();

        let total = sync_log::Entity::find().count(&*self.db).await?;
        let items = sync_log::Entity::find()
            .order_by_desc(sync_log::Column::StartedAt)
            .offset(paginated.offset)
            .limit(paginated.limit)
            .all(&*self.db)
            .await?;

        Ok(PaginatedResults { items, total })
    }
}

fn validated_names(request: &ProductRequest) -> Result<(String, String), Error> {
    let vendor = product::canonicalize(&request.vendor);
    let name = request.name.trim().to_string();

    if vendor.is_empty() {
        return Err(Error::bad_request("vendor must not be empty", None::<&str>));
    }
    if name.is_empty() {
        return Err(Error::bad_request("name must not be empty", None::<&str>));
    }

    Ok((vendor, name))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test_log::test]
    fn names_are_canonicalized() {
        let request = ProductRequest {
            vendor: "  Acme Corp ".into(),
            name: " CMS ".into(),
            version: None,
            cpe_uri: None,
            description: None,
            monitored: false,
        };

        let (vendor, name) = validated_names(&request).unwrap();
        assert_eq!(vendor, "acme corp");
        assert_eq!(name, "CMS");
    }

    #[test_log::test]
    fn empty_vendor_is_rejected() {
        let request = ProductRequest {
            vendor: "   ".into(),
            name: "CMS".into(),
            version: None,
            cpe_uri: None,
            description: None,
            monitored: false,
        };

        assert!(validated_names(&request).is_err());
    }
}
