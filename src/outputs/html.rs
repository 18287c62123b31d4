//! Newsletter files on disk.
//!
//! The report body comes from the model as an HTML fragment. It is wrapped in
//! a minimal document with a header bar in the country's accent color and
//! written to `{output_dir}/{YYYY-MM-DD}/{country-slug}.html`.

use crate::outputs::NewsletterSink;
use crate::utils::{escape_html, slugify};
use chrono::{Local, NaiveDate};
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct HtmlFileSink {
    output_dir: PathBuf,
    /// Fixed date for the day directory; today when unset.
    date: Option<NaiveDate>,
}

impl HtmlFileSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            date: None,
        }
    }

    #[cfg(test)]
    fn for_date(output_dir: impl Into<PathBuf>, date: NaiveDate) -> Self {
        Self {
            output_dir: output_dir.into(),
            date: Some(date),
        }
    }

    fn target(&self, country_name: &str) -> PathBuf {
        let date = self.date.unwrap_or_else(|| Local::now().date_naive());
        let stem = match slugify(country_name) {
            s if s.is_empty() => "country".to_string(),
            s => s,
        };
        self.output_dir
            .join(date.format("%Y-%m-%d").to_string())
            .join(format!("{stem}.html"))
    }
}

/// Full document around a report fragment.
pub fn render_document(body: &str, country_name: &str, brand_label: &str, accent_color: &str) -> String {
    let title = escape_html(&format!("{brand_label} | {country_name}"));
    let brand = escape_html(brand_label);
    let country = escape_html(country_name);
    let color = escape_html(accent_color);
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
body {{ font-family: Arial, Helvetica, sans-serif; margin: 0; color: #222; }}
header {{ background: {color}; color: #fff; padding: 16px 24px; }}
main {{ padding: 8px 24px 24px; max-width: 860px; }}
h2 {{ border-bottom: 2px solid {color}; padding-bottom: 4px; }}
a {{ color: {color}; }}
</style>
</head>
<body>
<header><strong>{brand}</strong> · {country}</header>
<main>
{body}
</main>
</body>
</html>
"#
    )
}

impl NewsletterSink for HtmlFileSink {
    #[instrument(level = "info", skip_all, fields(country = %country_name))]
    async fn deliver(
        &self,
        html: &str,
        country_name: &str,
        brand_label: &str,
        accent_color: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let path = self.target(country_name);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let document = render_document(html, country_name, brand_label, accent_color);
        fs::write(&path, document).await?;
        info!(path = %path.display(), bytes = html.len(), "Wrote newsletter");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_document_escapes_chrome_not_body() {
        let doc = render_document("<h1>Report</h1>", "Trinidad & Tobago", "Nexans", "#E1251B");
        assert!(doc.contains("<title>Nexans | Trinidad &amp; Tobago</title>"));
        assert!(doc.contains("background: #E1251B;"));
        assert!(doc.contains("<main>\n<h1>Report</h1>\n</main>"));
    }

    #[tokio::test]
    async fn test_deliver_writes_dated_file() {
        let root = std::env::temp_dir().join(format!("cable_news_sink_{}", std::process::id()));
        let date = NaiveDate::from_ymd_opt(2025, 5, 6).unwrap();
        let sink = HtmlFileSink::for_date(&root, date);

        sink.deliver("<p>hola</p>", "Costa Rica", "Nexans", "#00A3E0")
            .await
            .unwrap();

        let written = std::fs::read_to_string(root.join("2025-05-06").join("costa-rica.html")).unwrap();
        assert!(written.contains("<p>hola</p>"));
        assert!(written.contains("<strong>Nexans</strong> · Costa Rica"));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_blank_name_gets_fallback_stem() {
        let sink = HtmlFileSink::for_date("/tmp/out", NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
        assert_eq!(sink.target("  "), PathBuf::from("/tmp/out/2025-01-02/country.html"));
    }
}
