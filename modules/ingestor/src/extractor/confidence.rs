use super::validate::Candidate;
use vulndash_entity::vulnerability::Severity;

const W_CVE: f64 = 0.30;
const W_VENDOR_PRODUCT: f64 = 0.20;
const W_SEVERITY: f64 = 0.15;
const W_CVSS: f64 = 0.10;
const W_DESCRIPTION: f64 = 0.15;
const W_TITLE: f64 = 0.10;

const MIN_DESCRIPTION_LEN: usize = 64;
const MIN_TITLE_LEN: usize = 8;

const WARNING_PENALTY: f64 = 0.05;
const WARNING_PENALTY_CAP: f64 = 0.20;
const FALLBACK_PENALTY: f64 = 0.05;
const FALLBACK_PENALTY_CAP: f64 = 0.15;

/// Deterministic confidence for a validated candidate.
///
/// Weighted criterion sum minus warning and fallback penalties, clamped to
/// `[0, 1]`. This value gates autonomous promotion, so it must not depend on
/// anything the model self-reports.
pub fn score(candidate: &Candidate, warnings: usize, fallback_attempt: usize) -> f64 {
    let mut score = 0.0;

    if candidate.cve_id.is_some() {
        score += W_CVE;
    }
    if candidate.vendor.is_some() && candidate.product.is_some() {
        score += W_VENDOR_PRODUCT;
    }
    if candidate.severity != Severity::Unknown {
        score += W_SEVERITY;
    }
    if candidate.cvss_score.is_some() {
        score += W_CVSS;
    }
    if candidate
        .description
        .as_ref()
        .is_some_and(|d| d.chars().count() >= MIN_DESCRIPTION_LEN)
    {
        score += W_DESCRIPTION;
    }
    if candidate
        .title
        .as_ref()
        .is_some_and(|t| t.chars().count() >= MIN_TITLE_LEN)
    {
        score += W_TITLE;
    }

    score -= (warnings as f64 * WARNING_PENALTY).min(WARNING_PENALTY_CAP);
    score -= (fallback_attempt as f64 * FALLBACK_PENALTY).min(FALLBACK_PENALTY_CAP);

    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod test {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    fn full_candidate() -> Candidate {
        Candidate {
            cve_id: Some("CVE-2024-1234".into()),
            title: Some("Acme CMS authentication bypass".into()),
            description: Some(
                "Critical authentication bypass in Acme CMS version 2.1 allows remote \
                 attackers to obtain administrative access."
                    .into(),
            ),
            vendor: Some("acme".into()),
            product: Some("cms".into()),
            severity: Severity::Critical,
            cvss_score: Some(9.8),
            cvss_vector: None,
        }
    }

    #[test_log::test]
    fn complete_record_scores_full() {
        assert_close(score(&full_candidate(), 0, 0), 1.0);
    }

    #[test_log::test]
    fn empty_record_scores_zero() {
        assert_close(score(&Candidate::default(), 0, 0), 0.0);
    }

    #[test_log::test]
    fn fallback_penalty_accumulates_and_caps() {
        let candidate = full_candidate();
        assert_close(score(&candidate, 0, 1), 0.95);
        assert_close(score(&candidate, 0, 2), 0.90);
        // cap at 0.15 even for deep fallback chains
        assert_close(score(&candidate, 0, 7), 0.85);
    }

    #[test_log::test]
    fn warning_penalty_caps_at_four() {
        let candidate = full_candidate();
        assert_close(score(&candidate, 1, 0), 0.95);
        assert_close(score(&candidate, 4, 0), 0.80);
        assert_close(score(&candidate, 10, 0), 0.80);
    }

    #[test_log::test]
    fn never_negative() {
        assert_close(score(&Candidate::default(), 10, 7), 0.0);
    }

    #[test_log::test]
    fn short_description_does_not_count() {
        let candidate = Candidate {
            description: Some("too short".into()),
            ..full_candidate()
        };
        assert_close(score(&candidate, 0, 0), 0.85);
    }

    #[test_log::test]
    fn trivial_title_does_not_count() {
        let candidate = Candidate {
            title: Some("Bug".into()),
            ..full_candidate()
        };
        assert_close(score(&candidate, 0, 0), 0.90);
    }
}
