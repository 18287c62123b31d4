//! Redirect-link resolution.
//!
//! Feed items from the aggregator point at wrapper URLs such as
//! `https://news.google.com/rss/articles/<token>?oc=5`. [`LinkResolver`] turns
//! those into publisher URLs by running an ordered chain of
//! [`strategies::ResolveStrategy`] values:
//!
//! | Order | Strategy | Network |
//! |-------|----------|---------|
//! | 1 | decode URL embedded in the token | none |
//! | 2 | follow HTTP redirects off the aggregator | GET |
//! | 3 | signed `batchexecute` RPC | GET + POST |
//! | 4 | scrape outbound links from the page | cached GET |
//!
//! Resolution is best effort. Every miss, transport error or panic ends in
//! the original URL, never in an error.

pub mod batchexecute;
pub mod scheduler;
pub mod strategies;

use crate::provider::{NewsProvider, extract_token};
use futures::FutureExt;
use reqwest::Client;
use std::panic::AssertUnwindSafe;
use strategies::{Probe, ResolveStrategy};
use tracing::{debug, instrument, warn};

pub use scheduler::resolve_all;

/// Anything that can map a link to a better one.
pub trait ResolveLink {
    /// Always returns a URL; falls back to `url` itself.
    async fn resolve(&self, url: &str) -> String;
}

pub struct LinkResolver {
    http: Client,
    provider: NewsProvider,
    chain: Vec<Box<dyn ResolveStrategy>>,
}

impl LinkResolver {
    /// Resolver with the default strategy chain.
    pub fn new(http: Client, provider: NewsProvider) -> Self {
        Self::with_chain(http, provider, strategies::default_chain())
    }

    pub fn with_chain(http: Client, provider: NewsProvider, chain: Vec<Box<dyn ResolveStrategy>>) -> Self {
        Self {
            http,
            provider,
            chain,
        }
    }

    async fn run_chain(&self, url: &str, token: &str) -> Option<String> {
        let mut probe = Probe::new(&self.http, &self.provider, url, token);
        for strategy in &self.chain {
            if let Some(resolved) = strategy.try_resolve(&mut probe).await {
                debug!(strategy = strategy.name(), %resolved, "Resolved redirect link");
                return Some(resolved);
            }
        }
        None
    }
}

impl ResolveLink for LinkResolver {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn resolve(&self, url: &str) -> String {
        if !self.provider.is_redirect_url(url) {
            return url.to_string();
        }
        let Some(token) = extract_token(url) else {
            debug!("Redirect link carries no token");
            return url.to_string();
        };

        match AssertUnwindSafe(self.run_chain(url, token)).catch_unwind().await {
            Ok(Some(resolved)) => resolved,
            Ok(None) => {
                debug!("All resolution strategies missed, keeping original");
                url.to_string()
            }
            Err(_) => {
                warn!("Resolution panicked, keeping original");
                url.to_string()
            }
        }
    }
}
