pub mod sync;

/// Components of a CPE 2.3 formatted name relevant to the inventory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CpeParts {
    pub part: Option<String>,
    pub vendor: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
}

/// Parse a CPE 2.3 formatted name into its leading components.
///
/// The wildcard (`*`), NA (`-`), and empty components map to `None`. Returns
/// `None` for anything that is not a `cpe:2.3:` name with enough fields.
pub fn parse_cpe23(uri: &str) -> Option<CpeParts> {
    let fields = split_unescaped(uri);

    if fields.len() < 6 || fields[0] != "cpe" || fields[1] != "2.3" {
        return None;
    }

    Some(CpeParts {
        part: component(&fields[2]),
        vendor: component(&fields[3]),
        product: component(&fields[4]),
        version: component(&fields[5]),
    })
}

fn component(value: &str) -> Option<String> {
    match value {
        "" | "*" | "-" => None,
        value => Some(unescape(value).to_lowercase().replace('_', " ")),
    }
}

/// Split on `:`, honoring backslash escapes inside components.
fn split_unescaped(value: &str) -> Vec<String> {
    let mut fields = vec![String::new()];
    let mut escaped = false;

    for c in value.chars() {
        match (escaped, c) {
            (true, c) => {
                let last = fields.last_mut().expect("fields is never empty");
                last.push('\\');
                last.push(c);
                escaped = false;
            }
            (false, '\\') => escaped = true,
            (false, ':') => fields.push(String::new()),
            (false, c) => fields.last_mut().expect("fields is never empty").push(c),
        }
    }

    fields
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut escaped = false;

    for c in value.chars() {
        match (escaped, c) {
            (true, c) => {
                out.push(c);
                escaped = false;
            }
            (false, '\\') => escaped = true,
            (false, c) => out.push(c),
        }
    }

    out
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    #[test_log::test]
    fn parses_full_name() {
        let parts = parse_cpe23("cpe:2.3:a:acme:cms:2.1:*:*:*:*:*:*:*").unwrap();

        assert_eq!(parts.part.as_deref(), Some("a"));
        assert_eq!(parts.vendor.as_deref(), Some("acme"));
        assert_eq!(parts.product.as_deref(), Some("cms"));
        assert_eq!(parts.version.as_deref(), Some("2.1"));
    }

    #[rstest]
    #[case("cpe:2.3:a:acme:cms:*:*:*:*:*:*:*:*", None)]
    #[case("cpe:2.3:a:acme:cms:-:*:*:*:*:*:*:*", None)]
    #[test_log::test]
    fn wildcard_and_na_versions_are_absent(
        #[case] uri: &str,
        #[case] expected: Option<&str>,
    ) {
        let parts = parse_cpe23(uri).unwrap();
        assert_eq!(parts.version.as_deref(), expected);
    }

    #[test_log::test]
    fn underscores_become_spaces() {
        let parts = parse_cpe23("cpe:2.3:a:acme_corp:content_server:1.0:*:*:*:*:*:*:*").unwrap();
        assert_eq!(parts.vendor.as_deref(), Some("acme corp"));
        assert_eq!(parts.product.as_deref(), Some("content server"));
    }

    #[test_log::test]
    fn escaped_colon_stays_in_component() {
        let parts = parse_cpe23(r"cpe:2.3:a:acme:cms\:pro:2.1:*:*:*:*:*:*:*").unwrap();
        assert_eq!(parts.product.as_deref(), Some("cms:pro"));
    }

    #[rstest]
    #[case("")]
    #[case("cpe:/a:acme:cms:2.1")]
    #[case("cpe:2.3:a:acme")]
    #[case("not a cpe at all")]
    #[test_log::test]
    fn rejects_malformed_names(#[case] uri: &str) {
        assert_eq!(parse_cpe23(uri), None);
    }
}
