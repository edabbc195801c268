use serde_json::Value;
use vulndash_common::cve;
use vulndash_entity::vulnerability::Severity;

/// Extracted fields after hard validation, before confidence scoring.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Candidate {
    pub cve_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub vendor: Option<String>,
    pub product: Option<String>,
    pub severity: Severity,
    pub cvss_score: Option<f64>,
    pub cvss_vector: Option<String>,
}

/// Validate the model's JSON against the typed schema.
///
/// Nothing downstream touches the raw JSON again; every field is checked or
/// normalized here. Format validation outranks whatever the model claims.
pub fn validate(value: &Value, raw_text: &str) -> (Candidate, Vec<String>) {
    let mut warnings = Vec::new();
    let mut candidate = Candidate {
        title: text_field(value, "title"),
        description: text_field(value, "description"),
        vendor: text_field(value, "vendor").map(|v| v.trim().to_lowercase()),
        product: text_field(value, "product").map(|v| v.trim().to_lowercase()),
        cvss_vector: text_field(value, "cvss_vector"),
        ..Default::default()
    };

    // CVE gate: the regex is authoritative. A malformed claim is discarded,
    // and an identifier present in the raw text backfills a missing one.
    candidate.cve_id = match text_field(value, "cve_id") {
        Some(claimed) => match cve::normalize(&claimed) {
            Some(id) => Some(id),
            None => {
                warnings.push(format!("model reported malformed CVE id '{claimed}'"));
                backfill_cve(raw_text, &mut warnings)
            }
        },
        None => backfill_cve(raw_text, &mut warnings),
    };

    candidate.severity = match text_field(value, "severity") {
        Some(label) => {
            let severity = Severity::normalize(&label);
            if severity == Severity::Unknown {
                warnings.push(format!("unrecognized severity '{label}'"));
            }
            severity
        }
        None => Severity::Unknown,
    };

    candidate.cvss_score = match number_field(value, "cvss_score") {
        Some(score) if (0.0..=10.0).contains(&score) => Some(score),
        Some(score) => {
            warnings.push(format!("CVSS score {score} out of range"));
            None
        }
        None => None,
    };

    (candidate, warnings)
}

fn backfill_cve(raw_text: &str, warnings: &mut Vec<String>) -> Option<String> {
    let found = cve::extract_first(raw_text);
    if found.is_some() {
        warnings.push("CVE id recovered from raw text".into());
    }
    found
}

/// Read a string field, turning blanks and non-strings into `None`.
fn text_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// Read a numeric field, accepting numbers and numeric strings.
fn number_field(value: &Value, key: &str) -> Option<f64> {
    match value.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    const RAW: &str = "An advisory about CVE-2024-1234 affecting Acme CMS.";

    #[test_log::test]
    fn clean_output_passes_without_warnings() {
        let output = json!({
            "cve_id": "CVE-2024-1234",
            "title": "Acme CMS authentication bypass",
            "description": "Remote attackers can bypass authentication.",
            "vendor": "Acme",
            "product": "CMS",
            "severity": "CRITICAL",
            "cvss_score": 9.8,
            "cvss_vector": "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H",
        });

        let (candidate, warnings) = validate(&output, RAW);

        assert!(warnings.is_empty());
        assert_eq!(candidate.cve_id.as_deref(), Some("CVE-2024-1234"));
        assert_eq!(candidate.vendor.as_deref(), Some("acme"));
        assert_eq!(candidate.product.as_deref(), Some("cms"));
        assert_eq!(candidate.severity, Severity::Critical);
        assert_eq!(candidate.cvss_score, Some(9.8));
    }

    #[test_log::test]
    fn malformed_cve_claim_is_replaced_by_regex() {
        let output = json!({ "cve_id": "CVE-24-12" });
        let (candidate, warnings) = validate(&output, RAW);

        assert_eq!(candidate.cve_id.as_deref(), Some("CVE-2024-1234"));
        assert_eq!(warnings.len(), 2);
    }

    #[test_log::test]
    fn missing_cve_backfilled_with_warning() {
        let output = json!({ "cve_id": null });
        let (candidate, warnings) = validate(&output, RAW);

        assert_eq!(candidate.cve_id.as_deref(), Some("CVE-2024-1234"));
        assert_eq!(warnings, vec!["CVE id recovered from raw text"]);
    }

    #[test_log::test]
    fn no_cve_anywhere_stays_none() {
        let output = json!({ "cve_id": null });
        let (candidate, warnings) = validate(&output, "no identifier in this text");

        assert_eq!(candidate.cve_id, None);
        assert!(warnings.is_empty());
    }

    #[rstest]
    #[case(json!(0.0), Some(0.0), 0)]
    #[case(json!(10.0), Some(10.0), 0)]
    #[case(json!(-0.1), None, 1)]
    #[case(json!(10.1), None, 1)]
    #[case(json!("7.5"), Some(7.5), 0)]
    #[case(json!(null), None, 0)]
    #[test_log::test]
    fn cvss_range_gate(
        #[case] score: serde_json::Value,
        #[case] expected: Option<f64>,
        #[case] warnings: usize,
    ) {
        let output = json!({ "cve_id": "CVE-2024-1234", "cvss_score": score });
        let (candidate, warns) = validate(&output, RAW);

        assert_eq!(candidate.cvss_score, expected);
        assert_eq!(warns.len(), warnings);
    }

    #[test_log::test]
    fn blank_strings_become_null() {
        let output = json!({
            "cve_id": "CVE-2024-1234",
            "title": "   ",
            "vendor": "",
        });
        let (candidate, _) = validate(&output, RAW);

        assert_eq!(candidate.title, None);
        assert_eq!(candidate.vendor, None);
    }

    #[test_log::test]
    fn unknown_severity_warns() {
        let output = json!({ "cve_id": "CVE-2024-1234", "severity": "severe" });
        let (candidate, warnings) = validate(&output, RAW);

        assert_eq!(candidate.severity, Severity::Unknown);
        assert_eq!(warnings, vec!["unrecognized severity 'severe'"]);
    }
}
