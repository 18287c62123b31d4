//! Per-country feed collection.
//!
//! One country's cycle runs every search query in order, then every static
//! feed, merging everything into a single [`ArticleSet`]. A query that fails
//! (transport, status or XML) is logged and contributes nothing; only
//! cancellation stops the cycle early.

use crate::cancel::{CancelToken, Cancelled};
use crate::config::{CountryProfile, NewsAgentConfig};
use crate::error::FetchError;
use crate::feeds::query::{QUERY_CHUNK_SIZE, build_queries};
use crate::feeds::rss::{FeedItem, description_link, is_fresh, parse_items, parse_pub_date};
use crate::models::{Article, ArticleSet};
use crate::provider::{Locale, NewsProvider};
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Items read from a single search response.
pub const QUERY_ITEM_LIMIT: usize = 100;
/// Items read from a single static feed.
pub const STATIC_FEED_ITEM_LIMIT: usize = 50;

/// Tuning knobs for one fetch cycle.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub lookback: chrono::Duration,
    pub future_skew: chrono::Duration,
    /// `when:<N>d` value put into each query.
    pub lookback_days: u32,
    pub chunk_size: usize,
    pub query_delay: Duration,
    pub static_feed_delay: Duration,
    pub query_item_limit: usize,
    pub static_feed_item_limit: usize,
    pub max_articles: usize,
    pub default_language: String,
    pub parent_brand: Option<String>,
}

impl FetchPolicy {
    pub fn from_config(agent: &NewsAgentConfig) -> Self {
        Self {
            lookback: chrono::Duration::hours(i64::from(agent.lookback_hours)),
            future_skew: chrono::Duration::hours(i64::from(agent.future_skew_hours)),
            lookback_days: agent.lookback_days(),
            chunk_size: QUERY_CHUNK_SIZE,
            query_delay: Duration::from_millis(agent.query_delay_ms),
            static_feed_delay: Duration::from_millis(agent.static_feed_delay_ms),
            query_item_limit: QUERY_ITEM_LIMIT,
            static_feed_item_limit: STATIC_FEED_ITEM_LIMIT,
            max_articles: agent.max_articles_per_country,
            default_language: agent.default_language.clone(),
            parent_brand: agent.parent_brand.clone(),
        }
    }

    fn locale_for(&self, country: &CountryProfile) -> Locale {
        let language = country
            .language
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or(&self.default_language);
        Locale::new(language, country.code.as_str())
    }
}

/// Which item link a source trusts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkSource {
    /// Search results: prefer the publisher anchor in the description.
    Search,
    /// Static feeds: take `<link>` as is.
    Verbatim,
}

/// Outcome of turning one feed document into articles.
#[derive(Debug, Default)]
struct ItemBatch {
    articles: Vec<Article>,
    stale: usize,
    blank: usize,
}

pub struct FeedFetcher {
    http: Client,
    provider: NewsProvider,
    policy: FetchPolicy,
}

impl FeedFetcher {
    pub fn new(http: Client, provider: NewsProvider, policy: FetchPolicy) -> Self {
        Self {
            http,
            provider,
            policy,
        }
    }

    /// Run a single search query and return the fresh, well-formed items.
    ///
    /// The result is not deduplicated; callers merge through an [`ArticleSet`].
    #[instrument(level = "info", skip_all, fields(country = country_code, query_len = query.len()))]
    pub async fn fetch_query(
        &self,
        query: &str,
        locale: &Locale,
        country_code: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<Article>, FetchError> {
        let url = self.provider.search_url(query, locale);
        let xml = self.get_text(&url, cancel).await?;
        let batch = self.convert(
            &xml,
            self.policy.query_item_limit,
            LinkSource::Search,
            country_code,
            Utc::now(),
        )?;
        info!(
            count = batch.articles.len(),
            stale = batch.stale,
            blank = batch.blank,
            "Search query returned items"
        );
        Ok(batch.articles)
    }

    /// Fetch one plain RSS feed configured for the country.
    #[instrument(level = "info", skip_all, fields(country = country_code, %url))]
    pub async fn fetch_static_feed(
        &self,
        url: &str,
        country_code: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<Article>, FetchError> {
        let xml = self.get_text(url, cancel).await?;
        let batch = self.convert(
            &xml,
            self.policy.static_feed_item_limit,
            LinkSource::Verbatim,
            country_code,
            Utc::now(),
        )?;
        debug!(count = batch.articles.len(), stale = batch.stale, "Static feed parsed");
        Ok(batch.articles)
    }

    /// Everything for one country: queries, then static feeds, deduplicated,
    /// newest first and capped at the configured maximum.
    #[instrument(level = "info", skip_all, fields(country = %country.code))]
    pub async fn fetch_country(
        &self,
        country: &CountryProfile,
        cancel: &CancelToken,
    ) -> Result<Vec<Article>, Cancelled> {
        let locale = self.policy.locale_for(country);
        let queries = build_queries(
            country,
            self.policy.parent_brand.as_deref(),
            self.policy.lookback_days,
            self.policy.chunk_size,
        );
        info!(queries = queries.len(), feeds = country.extra_rss_feeds.len(), "Fetching country news");

        let mut set = ArticleSet::new();

        for query in &queries {
            match self.fetch_query(query, &locale, &country.code, cancel).await {
                Ok(articles) => {
                    let added = set.extend(articles);
                    debug!(added, total = set.len(), "Merged query results");
                }
                Err(FetchError::Cancelled(c)) => return Err(c),
                Err(e) => warn!(error = %e, "Search query failed, skipping"),
            }
            cancel.sleep(self.policy.query_delay).await?;
        }

        for feed in &country.extra_rss_feeds {
            match self.fetch_static_feed(feed, &country.code, cancel).await {
                Ok(articles) => {
                    let added = set.extend(articles);
                    info!(url = %feed, added, "Static feed merged");
                    cancel.sleep(self.policy.static_feed_delay).await?;
                }
                Err(FetchError::Cancelled(c)) => return Err(c),
                Err(e) => warn!(url = %feed, error = %e, "Static feed failed, skipping"),
            }
        }

        if set.is_empty() {
            warn!("No fresh articles from any query or feed");
        }
        let unique = set.len();
        let articles = set.into_newest(self.policy.max_articles);
        info!(unique, kept = articles.len(), "Country fetch complete");
        Ok(articles)
    }

    async fn get_text(&self, url: &str, cancel: &CancelToken) -> Result<String, FetchError> {
        cancel
            .run(async {
                let response = self.http.get(url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::Status(status));
                }
                Ok(response.text().await?)
            })
            .await?
    }

    fn convert(
        &self,
        xml: &str,
        limit: usize,
        source: LinkSource,
        country_code: &str,
        now: DateTime<Utc>,
    ) -> Result<ItemBatch, FetchError> {
        let mut batch = ItemBatch::default();
        for item in parse_items(xml, limit)? {
            let FeedItem {
                title,
                link,
                description,
                pub_date,
            } = item;

            let published_at = pub_date.as_deref().and_then(parse_pub_date);
            if !is_fresh(published_at, now, self.policy.lookback, self.policy.future_skew) {
                batch.stale += 1;
                continue;
            }
            if title.trim().is_empty() || link.trim().is_empty() {
                batch.blank += 1;
                continue;
            }

            let url = match source {
                LinkSource::Search => description_link(&description, |u| self.provider.owns_url(u))
                    .unwrap_or_else(|| link.trim().to_string()),
                LinkSource::Verbatim => link.trim().to_string(),
            };
            batch
                .articles
                .push(Article::new(title, url, published_at, country_code));
        }
        Ok(batch)
    }
}
