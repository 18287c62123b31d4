//! Country news ingestion from RSS search.
//!
//! # Flow
//!
//! 1. [`query`] compiles a [`CountryProfile`](crate::config::CountryProfile)
//!    into chunked OR-queries plus an optional brand query
//! 2. [`fetcher`] runs each query against the provider's RSS search, parses
//!    items with [`rss`], filters by recency and merges into a run-scoped
//!    dedup set
//! 3. configured static feeds are merged the same way, then the set is sorted
//!    newest first and capped
//!
//! Links produced here may still be redirect wrappers; see
//! [`crate::resolve`].

pub mod fetcher;
pub mod query;
pub mod rss;

pub use fetcher::{FeedFetcher, FetchPolicy};
