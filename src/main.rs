//! # Cable News
//!
//! A country-scoped market-intelligence agent: it collects recent news for
//! each configured country from RSS search, unwraps aggregator redirect links
//! to publisher URLs, has Gemini write an executive HTML report, and hands
//! the report to a newsletter sink.
//!
//! ## Usage
//!
//! ```sh
//! cable_news -c ./cable_news.yaml -o ./newsletters
//! ```
//!
//! ## Architecture
//!
//! Countries run one at a time through the same pipeline:
//! 1. **Queries**: term categories become chunked OR-queries ([`feeds::query`])
//! 2. **Fetching**: RSS search plus static feeds, deduplicated by title hash
//!    ([`feeds::fetcher`])
//! 3. **Resolution**: redirect links unwrapped, five at a time ([`resolve`])
//! 4. **Summarization**: one Gemini call with rate-limit retries ([`summary`])
//! 5. **Delivery**: wrapped HTML written per country and day ([`outputs`])
//!
//! `Ctrl-C` cancels the run cooperatively; in-flight requests are dropped.

use clap::Parser;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cancel;
mod cli;
mod config;
mod error;
mod feeds;
mod http;
mod models;
mod outputs;
mod pipeline;
mod prompt;
mod provider;
mod resolve;
mod summary;
mod utils;

use cancel::CancelSource;
use cli::Cli;
use config::load_config;
use feeds::{FeedFetcher, FetchPolicy};
use outputs::HtmlFileSink;
use pipeline::Pipeline;
use provider::NewsProvider;
use resolve::LinkResolver;
use summary::{SummaryClient, TokioSleeper};
use utils::ensure_writable_dir;

/// Per-request timeout for feed, article page and RPC traffic.
const BROWSER_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "cable_news starting up");

    let args = Cli::parse();
    debug!(config = %args.config, output_dir = %args.output_dir, only = ?args.only, "Parsed CLI arguments");

    // ---- Configuration ----
    let mut config = match load_config(&args.config, args.gemini_api_key.as_deref()).await {
        Ok(config) => config,
        Err(e) => {
            error!(path = %args.config, error = %e, "Failed to load configuration");
            return Err(e.into());
        }
    };
    config.retain_countries(&args.only);
    if config.news_agent.countries.is_empty() {
        error!(only = ?args.only, "No configured country matches --only");
        return Err("no countries selected".into());
    }

    // Early check: output dir must be writable before any network work
    if let Err(e) = ensure_writable_dir(&args.output_dir).await {
        error!(
            path = %args.output_dir,
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    // ---- Cancellation ----
    let source = CancelSource::new();
    let cancel = source.token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; cancelling run");
            source.cancel();
        }
    });

    // ---- Components ----
    let provider = NewsProvider::google();
    let browser = http::browser_client(BROWSER_TIMEOUT)?;
    let api = http::api_client(config.gemini.timeout())?;

    let fetcher = FeedFetcher::new(
        browser.clone(),
        provider.clone(),
        FetchPolicy::from_config(&config.news_agent),
    );
    let resolver = LinkResolver::new(browser, provider);
    let summarizer = SummaryClient::new(api, &config.gemini, TokioSleeper);
    let sink = HtmlFileSink::new(&args.output_dir);

    let pipeline = Pipeline::new(config.news_agent, fetcher, resolver, summarizer, sink);

    // ---- Run ----
    let report = match pipeline.run(&cancel).await {
        Ok(report) => report,
        Err(e) => {
            warn!(elapsed_secs = start_time.elapsed().as_secs(), "Run cancelled");
            return Err(e.into());
        }
    };

    if !report.any_success() {
        warn!(
            skipped = report.skipped,
            failed = report.failed,
            "No newsletter was produced in this run"
        );
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        delivered = report.delivered,
        "Execution complete"
    );

    Ok(())
}
