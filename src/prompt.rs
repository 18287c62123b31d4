//! Prompt text for the country report.
//!
//! The system instruction fixes the report layout (HTML only, grouped by
//! category, closing recommendations); the user content is a flat list of
//! article titles and links.

use crate::config::{CountryProfile, NewsAgentConfig};
use crate::models::Article;
use itertools::Itertools;
use std::fmt::Write;

/// Report categories, in the order the model should emit them.
const CATEGORIES: [&str; 8] = [
    "Energy & Grids",
    "Renewables & Hydrogen",
    "Construction & Buildings",
    "Public Infrastructure",
    "Telecom & Data Centers",
    "Tenders & CAPEX",
    "Macro & Regulation",
    "Commercial Opportunities",
];

/// Per-country facts the instruction is written around.
#[derive(Debug, Clone)]
pub struct CountryContext<'a> {
    pub name: &'a str,
    pub local_brand: Option<&'a str>,
    pub competitors: &'a [String],
    pub parent_brand: Option<&'a str>,
    pub timezone: &'a str,
}

impl<'a> CountryContext<'a> {
    pub fn new(country: &'a CountryProfile, agent: &'a NewsAgentConfig) -> Self {
        Self {
            name: &country.name,
            local_brand: country.local_brand(),
            competitors: &country.key_competitors,
            parent_brand: agent.parent_brand.as_deref().map(str::trim).filter(|b| !b.is_empty()),
            timezone: &agent.timezone,
        }
    }

    fn watch_list(&self) -> String {
        let company = match (self.parent_brand, self.local_brand) {
            (Some(parent), Some(local)) => format!("{parent}'s local brand {local}"),
            (Some(parent), None) => parent.to_string(),
            (None, Some(local)) => local.to_string(),
            (None, None) => "our company".to_string(),
        };
        let competitors: Vec<&str> = self
            .competitors
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect();
        if competitors.is_empty() {
            format!("{company} and its competitors")
        } else {
            format!("{company} and competitors such as {}", competitors.iter().join(", "))
        }
    }
}

/// System instruction for one country's executive report.
pub fn system_instruction(ctx: &CountryContext<'_>) -> String {
    let country = ctx.name;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "You are an executive-level analyst covering energy, mining and infrastructure."
    );
    let _ = writeln!(
        out,
        "Read the supplied news and write an executive report in HTML about {country} only. \
         Ignore any item that is not relevant to {country}."
    );
    let _ = writeln!(out, "Dates are interpreted in the {} timezone.", ctx.timezone);
    let _ = writeln!(out);
    let _ = writeln!(out, "Group the news into these categories, omitting empty ones:");
    for category in CATEGORIES {
        let _ = writeln!(out, "- {category}");
    }
    let _ = writeln!(
        out,
        "Commercial Opportunities covers newly announced projects, awards, financial closes, \
         new plants, expansions, open tenders and moves by {}.",
        ctx.watch_list()
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "Strict HTML format:");
    let _ = writeln!(out, "<h1>Executive Report: {country}</h1>");
    let _ = writeln!(out, "One <h2> per category, items as <ul><li>.");
    let _ = writeln!(
        out,
        "Each item: <strong>Title:</strong> executive summary (two lines at most). <a href='URL'>Link</a>."
    );
    let _ = writeln!(
        out,
        "Prefix each Commercial Opportunities item with an urgency marker: \
         High (open tender, recent award, imminent financial close), \
         Medium (new project or confirmed expansion), \
         Low (competitor move or market signal)."
    );
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Finish with <h2>Strategic Recommendations – {country}</h2>: one or two paragraphs, \
         written as the marketing manager for {country} at a cable and electrical/telecom \
         solutions manufacturer, naming the companies, projects or tenders from the report \
         that deserve prospecting."
    );
    let _ = write!(
        out,
        "Do not invent information. Return only the HTML, without markdown or greetings."
    );
    out
}

/// User content: one line per article.
pub fn article_digest(country_name: &str, articles: &[Article]) -> String {
    let mut out = format!("News for {country_name}:\n\n");
    for article in articles {
        let _ = writeln!(out, "- {} - URL: {}", article.title(), article.url());
    }
    out
}
