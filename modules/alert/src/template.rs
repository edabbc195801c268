use vulndash_entity::{email_alert::AlertType, vulnerability};

/// Subject and HTML body for a single alert email.
pub fn render_alert(alert_type: AlertType, vuln: &vulnerability::Model) -> (String, String) {
    let subject = match alert_type {
        AlertType::Kev => format!("[VulnDash] Actively exploited: {}", vuln.id),
        AlertType::HighEpss => format!("[VulnDash] High exploitation probability: {}", vuln.id),
    };

    let body = format!(
        r#"<html><body>
<h2>{title}</h2>
{lead}
<table>
{rows}
</table>
<p>{description}</p>
</body></html>"#,
        title = escape(&subject),
        lead = match alert_type {
            AlertType::Kev =>
                "<p>This vulnerability was added to the CISA Known Exploited Vulnerabilities catalog.</p>",
            AlertType::HighEpss =>
                "<p>The exploitation probability of this vulnerability crossed your configured threshold.</p>",
        },
        rows = detail_rows(vuln),
        description = escape(vuln.description.as_deref().unwrap_or("No description available.")),
    );

    (subject, body)
}

/// One digest email covering a batch of alerts.
pub fn render_digest(entries: &[(AlertType, vulnerability::Model)]) -> (String, String) {
    let subject = format!("[VulnDash] Digest: {} new alerts", entries.len());

    let mut items = String::new();
    for (alert_type, vuln) in entries {
        let reason = match alert_type {
            AlertType::Kev => "known exploited",
            AlertType::HighEpss => "high EPSS",
        };
        items.push_str(&format!(
            "<li><b>{}</b> ({reason}) — {} / {} — {}</li>\n",
            escape(&vuln.id),
            escape(vuln.vendor.as_deref().unwrap_or("unknown vendor")),
            escape(vuln.product.as_deref().unwrap_or("unknown product")),
            escape(vuln.title.as_deref().unwrap_or("untitled")),
        ));
    }

    let body = format!(
        r#"<html><body>
<h2>VulnDash digest</h2>
<ul>
{items}</ul>
</body></html>"#
    );

    (subject, body)
}

fn detail_rows(vuln: &vulnerability::Model) -> String {
    let mut rows = String::new();
    let mut row = |name: &str, value: String| {
        rows.push_str(&format!(
            "<tr><td><b>{name}</b></td><td>{}</td></tr>\n",
            escape(&value)
        ));
    };

    row("CVE", vuln.id.clone());
    row("Severity", vuln.severity.to_string());
    if let Some(score) = vuln.cvss_score {
        row("CVSS", format!("{score:.1}"));
    }
    if let Some(epss) = vuln.epss_score {
        row("EPSS", format!("{epss:.3}"));
    }
    if let Some(vendor) = &vuln.vendor {
        row("Vendor", vendor.clone());
    }
    if let Some(product) = &vuln.product {
        row("Product", product.clone());
    }

    rows
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod test {
    use super::*;
    use time::OffsetDateTime;
    use vulndash_entity::vulnerability::Severity;

    fn vuln() -> vulnerability::Model {
        vulnerability::Model {
            id: "CVE-2024-5555".into(),
            title: Some("Acme CMS bypass".into()),
            description: Some("Remote attackers <script> & so on.".into()),
            vendor: Some("acme".into()),
            product: Some("cms".into()),
            severity: Severity::Critical,
            cvss_score: Some(9.8),
            cvss_vector: None,
            epss_score: Some(0.97),
            epss_percentile: None,
            kev: true,
            kev_since: None,
            published_at: None,
            remediated_at: None,
            confidence: 0.9,
            extraction_provider: None,
            extraction_model: None,
            fallback_attempt: 0,
            validation_warnings: serde_json::json!([]),
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test_log::test]
    fn kev_alert_mentions_catalog() {
        let (subject, body) = render_alert(AlertType::Kev, &vuln());

        assert_eq!(subject, "[VulnDash] Actively exploited: CVE-2024-5555");
        assert!(body.contains("Known Exploited Vulnerabilities catalog"));
        assert!(body.contains("CVE-2024-5555"));
    }

    #[test_log::test]
    fn html_is_escaped() {
        let (_, body) = render_alert(AlertType::HighEpss, &vuln());
        assert!(body.contains("&lt;script&gt;"));
        assert!(!body.contains("<script>"));
    }

    #[test_log::test]
    fn digest_lists_every_entry() {
        let entries = vec![
            (AlertType::Kev, vuln()),
            (AlertType::HighEpss, {
                let mut v = vuln();
                v.id = "CVE-2024-6666".into();
                v
            }),
        ];

        let (subject, body) = render_digest(&entries);
        assert_eq!(subject, "[VulnDash] Digest: 2 new alerts");
        assert!(body.contains("CVE-2024-5555"));
        assert!(body.contains("CVE-2024-6666"));
        assert!(body.contains("high EPSS"));
    }
}
