//! Ordered fallbacks for unwrapping an aggregator redirect link.
//!
//! Every strategy looks at a shared [`Probe`] and either produces a publisher
//! URL or passes. Page fetches are cached on the probe, so later strategies
//! reuse what earlier ones downloaded instead of hitting the network again.

use crate::provider::NewsProvider;
use crate::resolve::batchexecute;
use async_trait::async_trait;
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

/// One step of the resolution chain.
#[async_trait]
pub trait ResolveStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Some(url)` ends the chain; `None` hands over to the next strategy.
    async fn try_resolve(&self, probe: &mut Probe<'_>) -> Option<String>;
}

/// `data-n-a-sg` / `data-n-a-ts` pair found on an article page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signing {
    pub signature: String,
    pub timestamp: String,
}

/// Result of a GET against one candidate page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects, regardless of status.
    pub final_url: Url,
    /// Body, kept only for successful responses.
    pub html: Option<String>,
    pub signing: Option<Signing>,
}

/// Everything known about one redirect link while the chain runs.
pub struct Probe<'a> {
    http: &'a Client,
    provider: &'a NewsProvider,
    original: &'a str,
    token: &'a str,
    candidates: Vec<String>,
    pages: Vec<Option<Option<FetchedPage>>>,
}

impl<'a> Probe<'a> {
    pub fn new(http: &'a Client, provider: &'a NewsProvider, original: &'a str, token: &'a str) -> Self {
        let mut candidates = vec![provider.article_page_url(token)];
        if candidates[0] != original {
            candidates.push(original.to_string());
        }
        let pages = vec![None; candidates.len()];
        Self {
            http,
            provider,
            original,
            token,
            candidates,
            pages,
        }
    }

    pub fn provider(&self) -> &NewsProvider {
        self.provider
    }

    pub fn token(&self) -> &str {
        self.token
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    /// Fetch candidate `index` once; failed fetches are cached as `None`.
    pub async fn page(&mut self, index: usize) -> Option<&FetchedPage> {
        if self.pages.get(index)?.is_none() {
            let fetched = fetch_page(self.http, &self.candidates[index]).await;
            self.pages[index] = Some(fetched);
        }
        self.pages[index].as_ref()?.as_ref()
    }
}

async fn fetch_page(http: &Client, url: &str) -> Option<FetchedPage> {
    let response = match http.get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            debug!(%url, error = %e, "Candidate page fetch failed");
            return None;
        }
    };
    let final_url = response.url().clone();
    let html = if response.status().is_success() {
        response.text().await.ok()
    } else {
        debug!(%url, status = %response.status(), "Candidate page returned error status");
        None
    };
    let signing = html.as_deref().and_then(extract_signing);
    Some(FetchedPage {
        final_url,
        html,
        signing,
    })
}

fn is_web(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

// ---------------------------------------------------------------------------
// Offline decode
// ---------------------------------------------------------------------------

const TOKEN_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

static EMBEDDED_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i-u)https?://[\x21\x23-\x26\x28-\x7E]+").expect("embedded url pattern")
});

/// Older tokens are base64 protobuf with the publisher URL stored verbatim.
pub fn decode_embedded_url(token: &str) -> Option<String> {
    let bytes = TOKEN_ENGINE.decode(token).ok()?;
    EMBEDDED_URL
        .find_iter(&bytes)
        .filter_map(|m| std::str::from_utf8(m.as_bytes()).ok())
        .find_map(|candidate| Url::parse(candidate).ok())
        .map(|url| url.to_string())
}

/// Decodes the token locally without touching the network.
pub struct EmbeddedUrl;

#[async_trait]
impl ResolveStrategy for EmbeddedUrl {
    fn name(&self) -> &'static str {
        "embedded-url"
    }

    async fn try_resolve(&self, probe: &mut Probe<'_>) -> Option<String> {
        let url = decode_embedded_url(probe.token())?;
        (!probe.provider().owns(&url)).then_some(url)
    }
}

// ---------------------------------------------------------------------------
// HTTP redirect fast path
// ---------------------------------------------------------------------------

/// Accepts the landing URL when the client was redirected off the aggregator.
pub struct RedirectFollow;

#[async_trait]
impl ResolveStrategy for RedirectFollow {
    fn name(&self) -> &'static str {
        "redirect"
    }

    async fn try_resolve(&self, probe: &mut Probe<'_>) -> Option<String> {
        let provider = probe.provider().clone();
        for index in 0..probe.candidate_count() {
            let Some(page) = probe.page(index).await else {
                continue;
            };
            if is_web(&page.final_url) && !provider.owns_url(&page.final_url) {
                return Some(page.final_url.to_string());
            }
            if page.signing.is_some() {
                // signed shell page: the answer comes from the RPC, not redirects
                break;
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Signed batch RPC
// ---------------------------------------------------------------------------

/// Read the signing attributes off an article shell page.
pub fn extract_signing(html: &str) -> Option<Signing> {
    let document = Html::parse_document(html);
    let attr = |name: &str| {
        let selector = Selector::parse(&format!("[{name}]")).ok()?;
        document
            .select(&selector)
            .filter_map(|el| el.value().attr(name))
            .map(str::trim)
            .find(|v| !v.is_empty())
            .map(str::to_string)
    };
    Some(Signing {
        signature: attr("data-n-a-sg")?,
        timestamp: attr("data-n-a-ts")?,
    })
}

/// Exchanges token + signature for the publisher URL.
pub struct BatchExecute;

#[async_trait]
impl ResolveStrategy for BatchExecute {
    fn name(&self) -> &'static str {
        "batchexecute"
    }

    async fn try_resolve(&self, probe: &mut Probe<'_>) -> Option<String> {
        let mut signing = None;
        for index in 0..probe.candidate_count() {
            if let Some(found) = probe.page(index).await.and_then(|p| p.signing.clone()) {
                signing = Some(found);
                break;
            }
        }
        let Some(signing) = signing else {
            debug!(original = probe.original, "No signing attributes on candidate pages");
            return None;
        };

        let body = batchexecute::request_body(probe.token(), &signing.timestamp, &signing.signature)?;
        let response = probe
            .http
            .post(probe.provider().batch_execute_url())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded;charset=UTF-8")
            .body(body)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            debug!(status = %response.status(), "batchexecute rejected the request");
            return None;
        }
        let text = response.text().await.ok()?;
        let url = batchexecute::parse_response(&text);
        if url.is_none() {
            debug!(snippet = %crate::utils::truncate_for_log(&text, 200), "batchexecute returned no url");
        }
        url.filter(|u| !probe.provider().owns(u))
    }
}

// ---------------------------------------------------------------------------
// Outbound link scrape
// ---------------------------------------------------------------------------

/// Attribute sources in priority order; markup has shifted between versions.
const OUTBOUND_SOURCES: [(&str, &str); 2] = [("[data-n-au]", "data-n-au"), ("a[href]", "href")];

/// First absolute link on the page that leaves the aggregator.
pub fn extract_outbound_link(html: &str, provider: &NewsProvider) -> Option<String> {
    let document = Html::parse_document(html);
    OUTBOUND_SOURCES.iter().find_map(|(css, attr)| {
        let selector = Selector::parse(css).ok()?;
        document
            .select(&selector)
            .filter_map(|el| el.value().attr(attr))
            .filter_map(|href| Url::parse(href.trim()).ok())
            .find(|url| is_web(url) && !provider.owns_url(url))
            .map(|url| url.to_string())
    })
}

/// Scrapes already-decoded links out of the fetched HTML.
///
/// Only unsigned pages are scraped. A signed page belongs to the batch RPC,
/// and when that fails the link stays unresolved.
pub struct OutboundLink;

#[async_trait]
impl ResolveStrategy for OutboundLink {
    fn name(&self) -> &'static str {
        "outbound-link"
    }

    async fn try_resolve(&self, probe: &mut Probe<'_>) -> Option<String> {
        let provider = probe.provider().clone();
        for index in 0..probe.candidate_count() {
            if probe.page(index).await.is_some_and(|page| page.signing.is_some()) {
                return None;
            }
        }
        for index in 0..probe.candidate_count() {
            let found = probe
                .page(index)
                .await
                .and_then(|page| page.html.as_deref())
                .and_then(|html| extract_outbound_link(html, &provider));
            if found.is_some() {
                return found;
            }
        }
        None
    }
}

/// The default chain: offline decode, redirect, batch RPC, HTML scrape.
pub fn default_chain() -> Vec<Box<dyn ResolveStrategy>> {
    vec![
        Box::new(EmbeddedUrl),
        Box::new(RedirectFollow),
        Box::new(BatchExecute),
        Box::new(OutboundLink),
    ]
}
