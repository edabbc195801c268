use regex::Regex;
use std::sync::LazyLock;

/// The authoritative CVE identifier pattern.
///
/// Format validation wins over anything a model claims about an identifier.
static CVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bCVE-\d{4}-\d{4,7}\b").expect("hardcoded regex must parse"));

static CVE_EXACT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^CVE-\d{4}-\d{4,7}$").expect("hardcoded regex must parse"));

/// Check whether the value is a well-formed CVE identifier.
pub fn is_valid(id: &str) -> bool {
    CVE_EXACT_RE.is_match(id)
}

/// Normalize a candidate identifier: trim, uppercase, then validate.
pub fn normalize(id: &str) -> Option<String> {
    let id = id.trim().to_uppercase();
    is_valid(&id).then_some(id)
}

/// Extract the first well-formed CVE identifier from free text.
pub fn extract_first(text: &str) -> Option<String> {
    CVE_RE.find(text).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("CVE-2024-1234", true)]
    #[case("CVE-2024-1234567", true)]
    #[case("CVE-2024-123", false)]
    #[case("CVE-2024-12345678", false)]
    #[case("CVE-24-1234", false)]
    #[case("cve-2024-1234", false)]
    #[case("CVE-2024-1234 ", false)]
    #[test_log::test]
    fn validate(#[case] id: &str, #[case] expected: bool) {
        assert_eq!(is_valid(id), expected);
    }

    #[test_log::test]
    fn normalize_case_and_whitespace() {
        assert_eq!(
            normalize("  cve-2021-44228 "),
            Some("CVE-2021-44228".to_string())
        );
        assert_eq!(normalize("not-a-cve"), None);
    }

    #[test_log::test]
    fn extract_from_text() {
        assert_eq!(
            extract_first("Critical issue CVE-2024-1234 and also CVE-2024-9999."),
            Some("CVE-2024-1234".to_string())
        );
        assert_eq!(extract_first("no identifier here"), None);
        // an over-long digit run must not match
        assert_eq!(extract_first("CVE-2024-123456789"), None);
    }
}
