//! Per-country run loop.
//!
//! Countries are processed strictly one after another:
//!
//! ```text
//! fetch_country -> resolve_all -> summarize -> deliver
//! ```
//!
//! A country with no articles or an empty summary is skipped. A failed
//! delivery or a panic inside one country's cycle is logged and the loop moves
//! on. Only cancellation ends the run early.

use crate::cancel::{CancelToken, Cancelled};
use crate::config::{CountryProfile, NewsAgentConfig};
use crate::feeds::FeedFetcher;
use crate::models::Article;
use crate::outputs::NewsletterSink;
use crate::prompt::CountryContext;
use crate::resolve::{ResolveLink, resolve_all};
use crate::summary::{Sleeper, SummaryClient};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// What happened to one country.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountryOutcome {
    Delivered { articles: usize },
    NoArticles,
    EmptySummary,
    DeliveryFailed,
    Faulted,
}

/// Tally of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunReport {
    fn record(&mut self, outcome: CountryOutcome) {
        match outcome {
            CountryOutcome::Delivered { .. } => self.delivered += 1,
            CountryOutcome::NoArticles | CountryOutcome::EmptySummary => self.skipped += 1,
            CountryOutcome::DeliveryFailed | CountryOutcome::Faulted => self.failed += 1,
        }
    }

    /// True when at least one newsletter went out.
    pub fn any_success(&self) -> bool {
        self.delivered > 0
    }
}

pub struct Pipeline<R, S, K> {
    agent: NewsAgentConfig,
    fetcher: FeedFetcher,
    resolver: R,
    summarizer: SummaryClient<S>,
    sink: K,
}

impl<R, S, K> Pipeline<R, S, K>
where
    R: ResolveLink,
    S: Sleeper,
    K: NewsletterSink,
{
    pub fn new(
        agent: NewsAgentConfig,
        fetcher: FeedFetcher,
        resolver: R,
        summarizer: SummaryClient<S>,
        sink: K,
    ) -> Self {
        Self {
            agent,
            fetcher,
            resolver,
            summarizer,
            sink,
        }
    }

    /// Process every configured country in order.
    #[instrument(level = "info", skip_all, fields(countries = self.agent.countries.len()))]
    pub async fn run(&self, cancel: &CancelToken) -> Result<RunReport, Cancelled> {
        let t0 = Instant::now();
        let mut report = RunReport::default();

        for country in &self.agent.countries {
            let outcome = match AssertUnwindSafe(self.process_country(country, cancel))
                .catch_unwind()
                .await
            {
                Ok(result) => result?,
                Err(_) => {
                    error!(country = %country.code, "Country cycle panicked; continuing");
                    CountryOutcome::Faulted
                }
            };
            info!(country = %country.code, ?outcome, "Country finished");
            report.record(outcome);
        }

        info!(
            delivered = report.delivered,
            skipped = report.skipped,
            failed = report.failed,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Run complete"
        );
        Ok(report)
    }

    #[instrument(level = "info", skip_all, fields(country = %country.code))]
    async fn process_country(
        &self,
        country: &CountryProfile,
        cancel: &CancelToken,
    ) -> Result<CountryOutcome, Cancelled> {
        let articles = self.fetcher.fetch_country(country, cancel).await?;
        if articles.is_empty() {
            warn!("No articles found; skipping country");
            return Ok(CountryOutcome::NoArticles);
        }
        let newest = articles.first().and_then(Article::published_at);
        info!(articles = articles.len(), newest = ?newest, "Fetched articles");

        let articles = resolve_all(
            &self.resolver,
            articles,
            self.agent.resolve_concurrency,
            cancel,
        )
        .await?;

        let ctx = CountryContext::new(country, &self.agent);
        let html = self.summarizer.summarize(&articles, &ctx, cancel).await;
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        if html.trim().is_empty() {
            warn!(articles = articles.len(), "Summary came back empty; skipping delivery");
            return Ok(CountryOutcome::EmptySummary);
        }

        match self
            .sink
            .deliver(&html, &country.name, country.brand_label(), country.accent_color())
            .await
        {
            Ok(()) => Ok(CountryOutcome::Delivered {
                articles: articles.len(),
            }),
            Err(e) => {
                error!(error = %e, "Newsletter delivery failed");
                Ok(CountryOutcome::DeliveryFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeminiConfig;
    use crate::feeds::FetchPolicy;
    use crate::http::{api_client, browser_client};
    use crate::provider::NewsProvider;
    use crate::resolve::LinkResolver;
    use chrono::Utc;
    use mockito::{Matcher, Server};
    use std::error::Error;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Delivery {
        html: String,
        country: String,
        brand: String,
        color: String,
    }

    #[derive(Default)]
    struct RecordingSink {
        deliveries: Mutex<Vec<Delivery>>,
        fail_for: Option<&'static str>,
    }

    impl NewsletterSink for RecordingSink {
        async fn deliver(
            &self,
            html: &str,
            country_name: &str,
            brand_label: &str,
            accent_color: &str,
        ) -> Result<(), Box<dyn Error + Send + Sync>> {
            if self.fail_for == Some(country_name) {
                return Err("smtp unavailable".into());
            }
            self.deliveries.lock().unwrap().push(Delivery {
                html: html.to_string(),
                country: country_name.to_string(),
                brand: brand_label.to_string(),
                color: accent_color.to_string(),
            });
            Ok(())
        }
    }

    struct NoWait;

    impl Sleeper for NoWait {
        async fn sleep(&self, _delay: Duration, _cancel: &CancelToken) -> Result<(), Cancelled> {
            Ok(())
        }
    }

    fn country(code: &str, name: &str, terms: &[&str]) -> CountryProfile {
        CountryProfile {
            code: code.to_string(),
            name: name.to_string(),
            demand_drivers: terms.iter().map(|t| t.to_string()).collect(),
            ..CountryProfile::default()
        }
    }

    fn agent(countries: Vec<CountryProfile>) -> NewsAgentConfig {
        NewsAgentConfig {
            lookback_hours: 24,
            query_delay_ms: 0,
            static_feed_delay_ms: 0,
            countries,
            ..NewsAgentConfig::default()
        }
    }

    fn pipeline(server: &Server, agent: NewsAgentConfig, sink: RecordingSink) -> Pipeline<LinkResolver, NoWait, RecordingSink> {
        let provider = NewsProvider::with_origin(&server.url()).unwrap();
        let browser = browser_client(Duration::from_secs(5)).unwrap();
        let gemini = GeminiConfig {
            api_key: Some("k".to_string()),
            model_id: "gemini-test".to_string(),
            base_url: server.url(),
            ..GeminiConfig::default()
        };
        Pipeline::new(
            agent.clone(),
            FeedFetcher::new(browser.clone(), provider.clone(), FetchPolicy::from_config(&agent)),
            LinkResolver::new(browser, provider),
            SummaryClient::new(api_client(Duration::from_secs(5)).unwrap(), &gemini, NoWait),
            sink,
        )
    }

    fn feed_with(title: &str, link: &str) -> String {
        format!(
            "<rss><channel><item><title>{title}</title><link>{link}</link><pubDate>{}</pubDate><description></description></item></channel></rss>",
            Utc::now().to_rfc2822()
        )
    }

    fn gemini_reply(text: &str) -> String {
        serde_json::json!({"candidates": [{"content": {"parts": [{"text": text}]}}]}).to_string()
    }

    const GEMINI_PATH: &str = "/v1beta/models/gemini-test:generateContent";

    #[tokio::test]
    async fn test_end_to_end_single_article() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/rss/search")
            .match_query(Matcher::UrlEncoded("q".into(), "(copper mine) location:Chile when:1d".into()))
            .with_body(feed_with("Copper Mine Expansion", "https://publisher.example/copper"))
            .expect(1)
            .create_async()
            .await;
        let gemini = server
            .mock("POST", GEMINI_PATH)
            .match_body(Matcher::Regex(
                r"- Copper Mine Expansion - URL: https://publisher\.example/copper".into(),
            ))
            .with_body(gemini_reply("```html\n<h1>Executive Report: Chile</h1>\n```"))
            .expect(1)
            .create_async()
            .await;

        let pipeline = pipeline(
            &server,
            agent(vec![country("CL", "Chile", &["copper mine"])]),
            RecordingSink::default(),
        );
        let report = pipeline.run(&CancelToken::never()).await.unwrap();

        gemini.assert_async().await;
        assert!(report.any_success());
        assert_eq!(report, RunReport { delivered: 1, skipped: 0, failed: 0 });

        let deliveries = pipeline.sink.deliveries.lock().unwrap().clone();
        assert_eq!(
            deliveries,
            vec![Delivery {
                html: "<h1>Executive Report: Chile</h1>".to_string(),
                country: "Chile".to_string(),
                brand: "Chile".to_string(),
                color: "#E1251B".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_country_without_articles_skips_summary() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/rss/search")
            .match_query(Matcher::Any)
            .with_body("<rss><channel></channel></rss>")
            .create_async()
            .await;
        let gemini = server.mock("POST", Matcher::Any).expect(0).create_async().await;

        let pipeline = pipeline(
            &server,
            agent(vec![country("PE", "Peru", &["mina"])]),
            RecordingSink::default(),
        );
        let report = pipeline.run(&CancelToken::never()).await.unwrap();

        gemini.assert_async().await;
        assert!(!report.any_success());
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn test_empty_summary_and_failed_delivery_do_not_stop_run() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/rss/search")
            .match_query(Matcher::UrlEncoded("gl".into(), "CO".into()))
            .with_body(feed_with("Subestación nueva", "https://p.example/co"))
            .create_async()
            .await;
        server
            .mock("GET", "/rss/search")
            .match_query(Matcher::UrlEncoded("gl".into(), "MX".into()))
            .with_body(feed_with("Nueva planta", "https://p.example/mx"))
            .create_async()
            .await;
        server
            .mock("GET", "/rss/search")
            .match_query(Matcher::UrlEncoded("gl".into(), "PA".into()))
            .with_body(feed_with("Licitación eléctrica", "https://p.example/pa"))
            .create_async()
            .await;
        server
            .mock("POST", GEMINI_PATH)
            .match_body(Matcher::Regex("News for Colombia".into()))
            .with_body(gemini_reply("   "))
            .create_async()
            .await;
        server
            .mock("POST", GEMINI_PATH)
            .match_body(Matcher::Regex("News for (Mexico|Panama)".into()))
            .with_body(gemini_reply("<h1>ok</h1>"))
            .create_async()
            .await;

        let sink = RecordingSink {
            fail_for: Some("Mexico"),
            ..RecordingSink::default()
        };
        let mut panama = country("PA", "Panama", &["licitación"]);
        panama.local_brand = Some("Nexans Panamá".to_string());
        panama.brand_color = Some("#00A3E0".to_string());
        let pipeline = pipeline(
            &server,
            agent(vec![
                country("CO", "Colombia", &["subestación"]),
                country("MX", "Mexico", &["planta"]),
                panama,
            ]),
            sink,
        );
        let report = pipeline.run(&CancelToken::never()).await.unwrap();

        assert_eq!(report, RunReport { delivered: 1, skipped: 1, failed: 1 });
        let deliveries = pipeline.sink.deliveries.lock().unwrap().clone();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].country, "Panama");
        assert_eq!(deliveries[0].brand, "Nexans Panamá");
        assert_eq!(deliveries[0].color, "#00A3E0");
    }

    #[tokio::test]
    async fn test_cancelled_run_returns_cancelled() {
        let server = Server::new_async().await;
        let source = crate::cancel::CancelSource::new();
        let token = source.token();
        source.cancel();

        let pipeline = pipeline(
            &server,
            agent(vec![country("CL", "Chile", &["cobre"])]),
            RecordingSink::default(),
        );
        assert_eq!(pipeline.run(&token).await, Err(Cancelled));
    }
}
