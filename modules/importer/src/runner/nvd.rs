use super::Runner;
use crate::model::{NvdSource, RunReport};
use serde::Deserialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

const PAGE_SIZE: u32 = 2000;
/// NVD asks clients to pace their requests.
const PAGE_DELAY: std::time::Duration = std::time::Duration::from_millis(6000);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    results_per_page: u32,
    start_index: u32,
    total_results: u32,
    #[serde(default)]
    vulnerabilities: Vec<Vulnerability>,
}

#[derive(Debug, Deserialize)]
struct Vulnerability {
    cve: Cve,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Cve {
    id: String,
    #[serde(default)]
    descriptions: Vec<Description>,
    #[serde(default)]
    metrics: Metrics,
}

#[derive(Debug, Deserialize)]
struct Description {
    lang: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Metrics {
    #[serde(default)]
    cvss_metric_v31: Vec<CvssMetric>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CvssMetric {
    cvss_data: CvssData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CvssData {
    base_score: f64,
    #[serde(default)]
    base_severity: Option<String>,
    #[serde(default)]
    vector_string: Option<String>,
}

/// Page through CVEs modified since the last successful run and stage each
/// as a raw entry.
pub async fn run(
    runner: &Runner,
    source_id: Uuid,
    source: &NvdSource,
    since: Option<OffsetDateTime>,
) -> anyhow::Result<RunReport> {
    let mut report = RunReport::default();
    let mut start_index = 0u32;

    let api_key = source
        .api_key_enc
        .as_deref()
        .map(|enc| runner.cipher().decrypt(enc))
        .transpose()?;

    loop {
        let mut request = runner
            .client()
            .get(source.url.clone())
            .query(&[("startIndex", start_index.to_string())])
            .query(&[("resultsPerPage", PAGE_SIZE.to_string())]);

        if let Some(since) = since {
            request = request
                .query(&[("lastModStartDate", since.format(&Rfc3339)?)])
                .query(&[("lastModEndDate", OffsetDateTime::now_utc().format(&Rfc3339)?)]);
        }

        if let Some(api_key) = &api_key {
            request = request.header("apiKey", api_key);
        }

        let page = request
            .send()
            .await?
            .error_for_status()?
            .json::<ApiResponse>()
            .await?;

        for vulnerability in &page.vulnerabilities {
            report.fetched += 1;

            let text = compose(&vulnerability.cve);
            if runner.stage(source_id, text).await? {
                report.staged += 1;
            } else {
                report.deduplicated += 1;
            }
        }

        let seen = page.start_index + page.results_per_page;
        if seen >= page.total_results || page.vulnerabilities.is_empty() {
            break;
        }
        start_index = seen;

        tokio::time::sleep(PAGE_DELAY).await;
    }

    Ok(report)
}

/// Flatten the API record into advisory-style text for the extraction
/// pipeline.
fn compose(cve: &Cve) -> String {
    let description = cve
        .descriptions
        .iter()
        .find(|d| d.lang == "en")
        .or_else(|| cve.descriptions.first())
        .map(|d| d.value.as_str())
        .unwrap_or("No description provided.");

    let mut text = format!("{}: {description}", cve.id);

    if let Some(metric) = cve.metrics.cvss_metric_v31.first() {
        text.push_str(&format!(" CVSS {:.1}", metric.cvss_data.base_score));
        if let Some(severity) = &metric.cvss_data.base_severity {
            text.push_str(&format!(" ({severity})"));
        }
        if let Some(vector) = &metric.cvss_data.vector_string {
            text.push_str(&format!(" {vector}"));
        }
        text.push('.');
    }

    text
}

#[cfg(test)]
mod test {
    use super::*;

    #[test_log::test]
    fn compose_prefers_english_description() {
        let cve: Cve = serde_json::from_value(serde_json::json!({
            "id": "CVE-2024-1234",
            "descriptions": [
                { "lang": "es", "value": "Una vulnerabilidad." },
                { "lang": "en", "value": "An authentication bypass." },
            ],
            "metrics": {
                "cvssMetricV31": [
                    { "cvssData": { "baseScore": 9.8, "baseSeverity": "CRITICAL",
                                    "vectorString": "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H" } }
                ]
            }
        }))
        .unwrap();

        let text = compose(&cve);
        assert!(text.starts_with("CVE-2024-1234: An authentication bypass."));
        assert!(text.contains("CVSS 9.8 (CRITICAL)"));
    }

    #[test_log::test]
    fn compose_handles_missing_metrics() {
        let cve: Cve = serde_json::from_value(serde_json::json!({
            "id": "CVE-2024-9999",
            "descriptions": [],
        }))
        .unwrap();

        assert_eq!(compose(&cve), "CVE-2024-9999: No description provided.");
    }
}
