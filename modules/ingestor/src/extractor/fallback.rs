use crate::model::{ExtractionMetadata, ExtractionResult};
use vulndash_common::cve;
use vulndash_entity::vulnerability::Severity;

/// Confidence assigned to regex-only extractions. Low enough that they can
/// never bypass review.
pub const FALLBACK_CONFIDENCE: f64 = 0.20;

/// Rule-based recovery when every provider failed.
///
/// Pulls the first CVE identifier out of the raw text and leaves everything
/// else null. The result always needs review.
pub fn extract(raw_text: &str, warnings: Vec<String>) -> ExtractionResult {
    let cve_id = cve::extract_first(raw_text);

    ExtractionResult {
        cve_id: cve_id.clone(),
        title: None,
        description: None,
        vendor: None,
        product: None,
        severity: Severity::Unknown,
        cvss_score: None,
        cvss_vector: None,
        confidence_score: if cve_id.is_some() {
            FALLBACK_CONFIDENCE
        } else {
            0.0
        },
        needs_review: true,
        metadata: ExtractionMetadata {
            provider: None,
            model: None,
            fallback_attempt: 0,
            warnings,
            all_providers_failed: true,
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test_log::test]
    fn recovers_cve_from_text() {
        let result = extract("Exploitation of CVE-2024-1234 observed in the wild.", vec![]);

        assert_eq!(result.cve_id.as_deref(), Some("CVE-2024-1234"));
        assert_eq!(result.confidence_score, FALLBACK_CONFIDENCE);
        assert!(result.needs_review);
        assert!(result.metadata.all_providers_failed);
        assert_eq!(result.vendor, None);
        assert_eq!(result.severity, Severity::Unknown);
    }

    #[test_log::test]
    fn no_cve_yields_zero_confidence() {
        let result = extract("an advisory without an identifier", vec![]);

        assert_eq!(result.cve_id, None);
        assert_eq!(result.confidence_score, 0.0);
        assert!(result.needs_review);
    }
}
