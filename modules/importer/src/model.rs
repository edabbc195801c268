use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;
use url::Url;
use utoipa::ToSchema;
use uuid::Uuid;

/// Fields shared by every feed configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CommonSource {
    /// Polling period (humantime, e.g. `30m`, `2h`)
    #[serde(with = "humantime_serde")]
    #[schema(value_type = String)]
    pub period: Duration,
    #[serde(default)]
    pub disabled: bool,
}

/// The tagged feed configuration, stored as JSON on the `source` row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SourceConfiguration {
    Nvd(NvdSource),
    Kev(KevSource),
    Rss(RssSource),
    Epss(EpssSource),
}

impl SourceConfiguration {
    pub fn common(&self) -> &CommonSource {
        match self {
            Self::Nvd(nvd) => &nvd.common,
            Self::Kev(kev) => &kev.common,
            Self::Rss(rss) => &rss.common,
            Self::Epss(epss) => &epss.common,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Nvd(_) => "nvd",
            Self::Kev(_) => "kev",
            Self::Rss(_) => "rss",
            Self::Epss(_) => "epss",
        }
    }
}

/// The NVD CVE API (2.0).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NvdSource {
    #[serde(flatten)]
    pub common: CommonSource,
    #[serde(default = "default::nvd_url")]
    #[schema(value_type = String)]
    pub url: Url,
    /// Optional API key raising the NVD rate limits, stored encrypted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_enc: Option<String>,
}

/// The CISA Known Exploited Vulnerabilities catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct KevSource {
    #[serde(flatten)]
    pub common: CommonSource,
    #[serde(default = "default::kev_url")]
    #[schema(value_type = String)]
    pub url: Url,
}

/// A vendor advisory RSS feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RssSource {
    #[serde(flatten)]
    pub common: CommonSource,
    #[schema(value_type = String)]
    pub url: Url,
}

/// The FIRST EPSS scoring API; enriches curated records.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EpssSource {
    #[serde(flatten)]
    pub common: CommonSource,
    #[serde(default = "default::epss_url")]
    #[schema(value_type = String)]
    pub url: Url,
}

mod default {
    use url::Url;

    pub fn nvd_url() -> Url {
        Url::parse("https://services.nvd.nist.gov/rest/json/cves/2.0")
            .expect("hardcoded URL must parse")
    }

    pub fn kev_url() -> Url {
        Url::parse(
            "https://www.cisa.gov/sites/default/files/feeds/known_exploited_vulnerabilities.json",
        )
        .expect("hardcoded URL must parse")
    }

    pub fn epss_url() -> Url {
        Url::parse("https://api.first.org/data/v1/epss").expect("hardcoded URL must parse")
    }
}

/// A configured source as exposed through the admin surface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Source {
    pub id: Uuid,
    pub name: String,
    pub configuration: SourceConfiguration,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_run: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_success: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Counters reported by one source run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RunReport {
    /// Items seen in the feed
    pub fetched: u64,
    /// New raw entries staged
    pub staged: u64,
    /// Curated records enriched in place
    pub enriched: u64,
    /// Items skipped as already known
    pub deduplicated: u64,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test_log::test]
    fn configuration_round_trips_with_tag() {
        let config = SourceConfiguration::Rss(RssSource {
            common: CommonSource {
                period: Duration::from_secs(1800),
                disabled: false,
            },
            url: "https://example.com/security.xml".parse().unwrap(),
        });

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["rss"]["period"], "30m");

        let back: SourceConfiguration = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test_log::test]
    fn nvd_defaults_apply() {
        let config: SourceConfiguration =
            serde_json::from_value(serde_json::json!({ "nvd": { "period": "2h" } })).unwrap();

        match config {
            SourceConfiguration::Nvd(nvd) => {
                assert_eq!(nvd.url.host_str(), Some("services.nvd.nist.gov"));
                assert_eq!(nvd.common.period, Duration::from_secs(7200));
            }
            other => panic!("unexpected configuration: {other:?}"),
        }
    }
}
