use super::{Kpis, TrendPoint, VulnerabilityDetails, VulnerabilityFilters, VulnerabilityList};
use crate::Error;
use sea_orm::{
    ColumnTrait, Condition, DbBackend, EntityTrait, FromQueryResult, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Statement,
};
use sea_query::extension::postgres::PgExpr;
use time::OffsetDateTime;
use tracing::instrument;
use vulndash_common::{
    db::Database,
    model::Paginated,
    settings::{self, NotificationSettings},
};
use vulndash_entity::{product, setting, vulnerability};

/// Read side of the curated store, as served by the public API.
#[derive(Clone)]
pub struct VulnerabilityService {
    db: Database,
}

impl VulnerabilityService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn list(
        &self,
        filters: &VulnerabilityFilters,
        paginated: Paginated,
    ) -> Result<VulnerabilityList, Error> {
        let paginated = paginated.clamped();
        let condition = condition(filters);

        let total = vulnerability::Entity::find()
            .filter(condition.clone())
            .count(&*self.db)
            .await?;

        let vulnerabilities = vulnerability::Entity::find()
            .filter(condition)
            .order_by_desc(vulnerability::Column::CreatedAt)
            .order_by_asc(vulnerability::Column::Id)
            .offset(paginated.offset)
            .limit(paginated.limit)
            .all(&*self.db)
            .await?;

        Ok(VulnerabilityList {
            total,
            limit: paginated.limit,
            offset: paginated.offset,
            vulnerabilities,
        })
    }

    pub async fn get(&self, cve_id: &str) -> Result<Option<VulnerabilityDetails>, Error> {
        let Some(vulnerability) = vulnerability::Entity::find_by_id(cve_id)
            .one(&*self.db)
            .await?
        else {
            return Ok(None);
        };

        let products = vulnerability
            .find_related(product::Entity)
            .all(&*self.db)
            .await?;

        Ok(Some(VulnerabilityDetails {
            vulnerability,
            products,
        }))
    }

    /// Atomically flip `remediated_at` between null and now.
    #[instrument(skip_all, fields(cve = cve_id), err)]
    pub async fn toggle_remediation(&self, cve_id: &str) -> Result<vulnerability::Model, Error> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
UPDATE vulnerability
SET remediated_at = CASE WHEN remediated_at IS NULL THEN now() ELSE NULL END,
    updated_at = now()
WHERE id = $1
RETURNING *
"#,
            [cve_id.into()],
        );

        vulnerability::Entity::find()
            .from_raw_sql(stmt)
            .one(&*self.db)
            .await?
            .ok_or_else(|| Error::NotFound(cve_id.to_string()))
    }

    /// Daily counts of newly curated records over the window.
    pub async fn trends(&self, days: u32) -> Result<Vec<TrendPoint>, Error> {
        #[derive(FromQueryResult)]
        struct Row {
            day: time::Date,
            total: i64,
            kev: i64,
        }

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
SELECT date_trunc('day', created_at)::date AS day,
       count(*) AS total,
       count(*) FILTER (WHERE kev) AS kev
FROM vulnerability
WHERE created_at >= now() - make_interval(days => $1)
GROUP BY day
ORDER BY day
"#,
            [(days as i32).into()],
        );

        let rows = Row::find_by_statement(stmt).all(&*self.db).await?;

        Ok(rows
            .into_iter()
            .map(|row| TrendPoint {
                day: row.day,
                total: row.total,
                kev: row.kev,
            })
            .collect())
    }

    pub async fn kpis(&self) -> Result<Kpis, Error> {
        let notifications =
            setting::fetch::<NotificationSettings>(settings::NOTIFICATIONS, &*self.db).await?;

        let now = OffsetDateTime::now_utc();
        let midnight = now.replace_time(time::Time::MIDNIGHT);

        let total = vulnerability::Entity::find().count(&*self.db).await?;

        let kev = vulnerability::Entity::find()
            .filter(vulnerability::Column::Kev.eq(true))
            .count(&*self.db)
            .await?;

        let high_epss = vulnerability::Entity::find()
            .filter(vulnerability::Column::EpssScore.gte(notifications.epss_threshold))
            .count(&*self.db)
            .await?;

        let new_today = vulnerability::Entity::find()
            .filter(vulnerability::Column::CreatedAt.gte(midnight))
            .count(&*self.db)
            .await?;

        let new_this_week = vulnerability::Entity::find()
            .filter(vulnerability::Column::CreatedAt.gte(now - time::Duration::days(7)))
            .count(&*self.db)
            .await?;

        Ok(Kpis {
            total,
            kev,
            high_epss,
            new_today,
            new_this_week,
        })
    }

    /// All records matching the filter, for export.
    pub async fn export(
        &self,
        filters: &VulnerabilityFilters,
    ) -> Result<Vec<vulnerability::Model>, Error> {
        Ok(vulnerability::Entity::find()
            .filter(condition(filters))
            .order_by_asc(vulnerability::Column::Id)
            .all(&*self.db)
            .await?)
    }
}

/// Render records as CSV.
pub fn to_csv(records: &[vulnerability::Model]) -> Result<String, Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer.write_record([
        "cve_id",
        "title",
        "vendor",
        "product",
        "severity",
        "cvss_score",
        "epss_score",
        "kev",
        "published_at",
        "remediated",
        "confidence",
    ])?;

    for record in records {
        writer.write_record([
            record.id.clone(),
            record.title.clone().unwrap_or_default(),
            record.vendor.clone().unwrap_or_default(),
            record.product.clone().unwrap_or_default(),
            record.severity.to_string(),
            record
                .cvss_score
                .map(|s| format!("{s:.1}"))
                .unwrap_or_default(),
            record
                .epss_score
                .map(|s| format!("{s:.4}"))
                .unwrap_or_default(),
            record.kev.to_string(),
            record
                .published_at
                .and_then(|t| t.format(&time::format_description::well_known::Rfc3339).ok())
                .unwrap_or_default(),
            record.remediated_at.is_some().to_string(),
            format!("{:.2}", record.confidence),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| Error::Internal(err.to_string()))?;

    String::from_utf8(bytes).map_err(|err| Error::Internal(err.to_string()))
}

fn condition(filters: &VulnerabilityFilters) -> Condition {
    let mut condition = Condition::all();

    if let Some(vendor) = &filters.vendor {
        condition = condition.add(vulnerability::Column::Vendor.eq(product::canonicalize(vendor)));
    }
    if let Some(product_name) = &filters.product {
        condition =
            condition.add(vulnerability::Column::Product.eq(product::canonicalize(product_name)));
    }
    if let Some(severity) = filters.severity {
        condition = condition.add(vulnerability::Column::Severity.eq(severity));
    }
    if let Some(min_cvss) = filters.min_cvss {
        condition = condition.add(vulnerability::Column::CvssScore.gte(min_cvss));
    }
    if let Some(min_epss) = filters.min_epss {
        condition = condition.add(vulnerability::Column::EpssScore.gte(min_epss));
    }
    if filters.kev_only {
        condition = condition.add(vulnerability::Column::Kev.eq(true));
    }
    if filters.hide_remediated {
        condition = condition.add(vulnerability::Column::RemediatedAt.is_null());
    }
    if let Some(search) = filters.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", escape_like(search));
        condition = condition.add(
            Condition::any()
                .add(vulnerability::Column::Id.into_expr().ilike(pattern.clone()))
                .add(vulnerability::Column::Title.into_expr().ilike(pattern.clone()))
                .add(vulnerability::Column::Description.into_expr().ilike(pattern.clone()))
                .add(vulnerability::Column::Vendor.into_expr().ilike(pattern.clone()))
                .add(vulnerability::Column::Product.into_expr().ilike(pattern)),
        );
    }

    condition
}

/// Escape LIKE wildcards in user input.
fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod test {
    use super::*;
    use time::macros::datetime;
    use vulndash_entity::vulnerability::Severity;

    fn record() -> vulnerability::Model {
        vulnerability::Model {
            id: "CVE-2024-1234".into(),
            title: Some("Acme, \"CMS\" bypass".into()),
            description: None,
            vendor: Some("acme".into()),
            product: Some("cms".into()),
            severity: Severity::Critical,
            cvss_score: Some(9.8),
            cvss_vector: None,
            epss_score: Some(0.9731),
            epss_percentile: None,
            kev: true,
            kev_since: None,
            published_at: Some(datetime!(2024-06-01 00:00:00 UTC)),
            remediated_at: None,
            confidence: 0.95,
            extraction_provider: None,
            extraction_model: None,
            fallback_attempt: 0,
            validation_warnings: serde_json::json!([]),
            created_at: datetime!(2024-06-02 00:00:00 UTC),
            updated_at: datetime!(2024-06-02 00:00:00 UTC),
        }
    }

    #[test_log::test]
    fn csv_escapes_and_formats() {
        let csv = to_csv(&[record()]).unwrap();
        let mut lines = csv.lines();

        assert_eq!(
            lines.next().unwrap(),
            "cve_id,title,vendor,product,severity,cvss_score,epss_score,kev,published_at,remediated,confidence"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("CVE-2024-1234,"));
        // quoted field with embedded comma and quotes
        assert!(row.contains(r#""Acme, ""CMS"" bypass""#));
        assert!(row.contains("9.8"));
        assert!(row.contains("0.9731"));
        assert!(row.contains("true"));
    }

    #[test_log::test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_done"), "50\\%\\_done");
    }
}
