use super::Runner;
use crate::model::{EpssSource, RunReport};
use sea_orm::{EntityTrait, QuerySelect};
use serde::Deserialize;
use vulndash_entity::vulnerability;
use vulndash_module_ingestor::service::VulnerabilityWrite;

/// The EPSS API accepts a comma separated list of CVE ids.
const CHUNK: usize = 100;
const PAGE_DELAY: std::time::Duration = std::time::Duration::from_millis(600);

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    data: Vec<Score>,
}

#[derive(Debug, Deserialize)]
struct Score {
    cve: String,
    /// The API reports numbers as strings.
    epss: String,
    percentile: String,
}

/// Refresh EPSS scores for every curated record.
pub async fn run(runner: &Runner, source: &EpssSource) -> anyhow::Result<RunReport> {
    let ids: Vec<String> = vulnerability::Entity::find()
        .select_only()
        .column(vulnerability::Column::Id)
        .into_tuple()
        .all(&**runner.db())
        .await?;

    let mut report = RunReport::default();

    for chunk in ids.chunks(CHUNK) {
        let response = runner
            .client()
            .get(source.url.clone())
            .query(&[("cve", chunk.join(","))])
            .send()
            .await?
            .error_for_status()?
            .json::<ApiResponse>()
            .await?;

        for score in response.data {
            report.fetched += 1;

            let (Ok(epss), Ok(percentile)) =
                (score.epss.parse::<f64>(), score.percentile.parse::<f64>())
            else {
                log::warn!("unparsable EPSS data for {}", score.cve);
                continue;
            };

            let write = VulnerabilityWrite {
                cve_id: score.cve,
                epss_score: Some(epss),
                epss_percentile: Some(percentile),
                ..Default::default()
            };

            if runner.ingest().apply_enrichment(write).await?.is_some() {
                report.enriched += 1;
            }
        }

        tokio::time::sleep(PAGE_DELAY).await;
    }

    Ok(report)
}
