//! RSS item extraction and per-item policy.
//!
//! Parsing is a flat `quick_xml` event walk that only looks at the
//! `title`, `link`, `description` and `pubDate` children of each `<item>`.

use chrono::{DateTime, Duration, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesRef, Event};
use scraper::{Html, Selector};
use url::Url;

/// Raw `<item>` fields as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Title,
    Link,
    Description,
    PubDate,
}

impl FeedItem {
    fn push(&mut self, field: Field, text: &str) {
        match field {
            Field::Title => self.title.push_str(text),
            Field::Link => self.link.push_str(text),
            Field::Description => self.description.push_str(text),
            Field::PubDate => self.pub_date.get_or_insert_with(String::new).push_str(text),
        }
    }
}

/// Read at most `limit` items from an RSS document.
pub fn parse_items(xml: &str, limit: usize) -> Result<Vec<FeedItem>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut items = Vec::new();
    let mut current: Option<FeedItem> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.local_name();
                if name.as_ref() == b"item" {
                    current = Some(FeedItem::default());
                    field = None;
                } else if current.is_some() {
                    field = match name.as_ref() {
                        b"title" => Some(Field::Title),
                        b"link" => Some(Field::Link),
                        b"description" => Some(Field::Description),
                        b"pubDate" => Some(Field::PubDate),
                        _ => None,
                    };
                }
            }
            Event::End(e) => {
                field = None;
                if e.local_name().as_ref() == b"item" {
                    if let Some(item) = current.take() {
                        items.push(item);
                        if items.len() >= limit {
                            break;
                        }
                    }
                }
            }
            Event::Text(e) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    let text = e.decode().map_err(quick_xml::Error::from)?;
                    item.push(f, &text);
                }
            }
            Event::CData(e) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    item.push(f, &String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    item.push(f, &resolve_reference(&e)?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(items)
}

/// Expand `&amp;`, `&#39;` and friends. Unknown named entities are kept verbatim.
fn resolve_reference(reference: &BytesRef<'_>) -> Result<String, quick_xml::Error> {
    if let Ok(Some(ch)) = reference.resolve_char_ref() {
        return Ok(ch.to_string());
    }
    let name = reference.decode().map_err(quick_xml::Error::from)?;
    Ok(match quick_xml::escape::resolve_predefined_entity(&name) {
        Some(resolved) => resolved.to_string(),
        None => format!("&{name};"),
    })
}

/// Parse an RFC 2822 `pubDate`, falling back to RFC 3339.
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Recency window check. Unknown dates always pass.
pub fn is_fresh(
    published: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    lookback: Duration,
    future_skew: Duration,
) -> bool {
    match published {
        None => true,
        Some(at) => now - at <= lookback && at - now <= future_skew,
    }
}

/// First absolute anchor in the item description that points off-provider.
///
/// The description sometimes already carries the publisher URL while the
/// `link` field is the aggregator's redirect wrapper.
pub fn description_link(description: &str, is_provider: impl Fn(&Url) -> bool) -> Option<String> {
    if description.trim().is_empty() {
        return None;
    }
    let fragment = Html::parse_fragment(description);
    let anchor = Selector::parse("a[href]").ok()?;
    let href = fragment.select(&anchor).next()?.value().attr("href")?;
    let url = Url::parse(href.trim()).ok()?;
    let web = matches!(url.scheme(), "http" | "https");
    (web && !is_provider(&url)).then(|| url.to_string())
}
