use super::Runner;
use crate::model::{RssSource, RunReport};
use quick_xml::{Reader, events::Event};
use uuid::Uuid;

/// Poll an RSS feed and stage one raw entry per item.
pub async fn run(runner: &Runner, source_id: Uuid, source: &RssSource) -> anyhow::Result<RunReport> {
    let body = runner
        .client()
        .get(source.url.clone())
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let items = parse_items(&body)?;

    let mut report = RunReport::default();

    for item in items {
        report.fetched += 1;

        if runner.stage(source_id, item.compose()).await? {
            report.staged += 1;
        } else {
            report.deduplicated += 1;
        }
    }

    Ok(report)
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Item {
    pub title: String,
    pub description: String,
    pub link: String,
}

impl Item {
    fn compose(&self) -> String {
        let mut text = self.title.clone();
        if !self.description.is_empty() {
            text.push_str("\n\n");
            text.push_str(&self.description);
        }
        if !self.link.is_empty() {
            text.push_str("\n\n");
            text.push_str(&self.link);
        }
        text
    }
}

/// Minimal RSS 2.0 item extraction: title, description, link per `<item>`.
pub(crate) fn parse_items(xml: &str) -> anyhow::Result<Vec<Item>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<Item> = None;
    let mut field: Option<&'static str> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => match start.name().as_ref() {
                b"item" => current = Some(Item::default()),
                b"title" if current.is_some() => field = Some("title"),
                b"description" if current.is_some() => field = Some("description"),
                b"link" if current.is_some() => field = Some("link"),
                _ => field = None,
            },
            Event::End(end) => match end.name().as_ref() {
                b"item" => {
                    if let Some(item) = current.take() {
                        if !item.title.is_empty() || !item.description.is_empty() {
                            items.push(item);
                        }
                    }
                }
                _ => field = None,
            },
            Event::Text(text) => {
                if let (Some(item), Some(field)) = (current.as_mut(), field) {
                    let value = strip_tags(&text.decode()?);
                    let target = match field {
                        "title" => &mut item.title,
                        "description" => &mut item.description,
                        _ => &mut item.link,
                    };
                    if !target.is_empty() {
                        target.push(' ');
                    }
                    target.push_str(value.trim());
                }
            }
            Event::CData(data) => {
                if let (Some(item), Some(field)) = (current.as_mut(), field) {
                    let raw = String::from_utf8_lossy(&data);
                    let value = strip_tags(&raw);
                    let target = match field {
                        "title" => &mut item.title,
                        "description" => &mut item.description,
                        _ => &mut item.link,
                    };
                    if !target.is_empty() {
                        target.push(' ');
                    }
                    target.push_str(value.trim());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(items)
}

/// Feeds love HTML in descriptions; drop the markup, keep the text.
fn strip_tags(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_tag = false;

    for c in value.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }

    out
}

#[cfg(test)]
mod test {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Acme Security Advisories</title>
    <link>https://acme.example/security</link>
    <item>
      <title>ACME-SA-2024-01: CVE-2024-1234 authentication bypass</title>
      <description><![CDATA[<p>A <b>critical</b> flaw in Acme CMS 2.1.</p>]]></description>
      <link>https://acme.example/sa/2024-01</link>
    </item>
    <item>
      <title>ACME-SA-2024-02: denial of service</title>
      <description>Crafted packets crash the service.</description>
      <link>https://acme.example/sa/2024-02</link>
    </item>
  </channel>
</rss>"#;

    #[test_log::test]
    fn parses_items_and_strips_markup() {
        let items = parse_items(FEED).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].title,
            "ACME-SA-2024-01: CVE-2024-1234 authentication bypass"
        );
        assert_eq!(items[0].description, "A critical flaw in Acme CMS 2.1.");
        assert_eq!(items[0].link, "https://acme.example/sa/2024-01");
    }

    #[test_log::test]
    fn channel_title_is_not_an_item() {
        let items = parse_items(FEED).unwrap();
        assert!(items.iter().all(|i| !i.title.contains("Advisories")));
    }

    #[test_log::test]
    fn compose_joins_fields() {
        let item = Item {
            title: "title".into(),
            description: "description".into(),
            link: "https://example.com".into(),
        };
        assert_eq!(item.compose(), "title\n\ndescription\n\nhttps://example.com");
    }
}
