use super::Runner;
use crate::model::{KevSource, RunReport};
use sea_orm::EntityTrait;
use serde::Deserialize;
use uuid::Uuid;
use vulndash_entity::vulnerability;
use vulndash_module_ingestor::service::VulnerabilityWrite;

#[derive(Debug, Deserialize)]
struct Catalog {
    #[serde(default)]
    vulnerabilities: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogEntry {
    #[serde(rename = "cveID")]
    cve_id: String,
    #[serde(default)]
    vendor_project: String,
    #[serde(default)]
    product: String,
    #[serde(default)]
    vulnerability_name: String,
    #[serde(default)]
    short_description: String,
    #[serde(default)]
    date_added: String,
}

/// Walk the KEV catalog: known CVEs get the KEV flag raised in place,
/// unknown ones are staged for extraction.
pub async fn run(runner: &Runner, source_id: Uuid, source: &KevSource) -> anyhow::Result<RunReport> {
    let catalog = runner
        .client()
        .get(source.url.clone())
        .send()
        .await?
        .error_for_status()?
        .json::<Catalog>()
        .await?;

    let mut report = RunReport::default();

    for entry in catalog.vulnerabilities {
        report.fetched += 1;

        let known = vulnerability::Entity::find_by_id(entry.cve_id.as_str())
            .one(&**runner.db())
            .await?
            .is_some();

        if known {
            let write = VulnerabilityWrite {
                cve_id: entry.cve_id.clone(),
                kev: Some(true),
                ..Default::default()
            };
            if runner.ingest().apply_enrichment(write).await?.is_some() {
                report.enriched += 1;
            }
            continue;
        }

        if runner.stage(source_id, compose(&entry)).await? {
            report.staged += 1;
        } else {
            report.deduplicated += 1;
        }
    }

    Ok(report)
}

fn compose(entry: &CatalogEntry) -> String {
    format!(
        "{}: {} in {} {}. {} Listed in the CISA Known Exploited Vulnerabilities \
         catalog since {}.",
        entry.cve_id,
        entry.vulnerability_name,
        entry.vendor_project,
        entry.product,
        entry.short_description,
        entry.date_added,
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test_log::test]
    fn compose_includes_catalog_context() {
        let entry: CatalogEntry = serde_json::from_value(serde_json::json!({
            "cveID": "CVE-2024-5555",
            "vendorProject": "Acme",
            "product": "CMS",
            "vulnerabilityName": "Acme CMS Authentication Bypass",
            "shortDescription": "Allows remote administrative access.",
            "dateAdded": "2024-06-01",
        }))
        .unwrap();

        let text = compose(&entry);
        assert!(text.starts_with("CVE-2024-5555: Acme CMS Authentication Bypass in Acme CMS."));
        assert!(text.contains("Known Exploited Vulnerabilities catalog since 2024-06-01"));
    }
}
