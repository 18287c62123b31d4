//! Data models for fetched articles.
//!
//! - [`Article`]: one feed entry, identified by a digest of its title
//! - [`ArticleSet`]: the dedup arena owned by a single country's fetch cycle
//!
//! Articles are transient. They are rebuilt on every run and dropped once the
//! country's summary has been produced.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Lowercase hex SHA-256 of the raw title text.
///
/// Titles are the uniqueness key: the same story shows up under many URLs
/// across queries. No case or whitespace normalization is applied.
pub fn content_hash(title: &str) -> String {
    hex::encode(Sha256::digest(title.as_bytes()))
}

/// A single news item as read from a feed.
///
/// The value is immutable. Link resolution produces a new `Article` through
/// [`Article::with_url`] and keeps every other field, the hash included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    hash: String,
    title: String,
    url: String,
    published_at: Option<DateTime<Utc>>,
    country_code: String,
}

impl Article {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        published_at: Option<DateTime<Utc>>,
        country_code: impl Into<String>,
    ) -> Self {
        let title = title.into();
        Self {
            hash: content_hash(&title),
            title,
            url: url.into(),
            published_at,
            country_code: country_code.into(),
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// `None` when the feed gave no parseable publish date.
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    /// Same article pointing at a different link.
    pub fn with_url(self, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..self
        }
    }
}

/// Run-scoped `hash -> Article` arena. First insert wins.
#[derive(Debug, Default)]
pub struct ArticleSet {
    index: HashMap<String, usize>,
    articles: Vec<Article>,
}

impl ArticleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when an article with the same hash is already held.
    pub fn insert(&mut self, article: Article) -> bool {
        if self.index.contains_key(article.hash()) {
            return false;
        }
        self.index
            .insert(article.hash().to_string(), self.articles.len());
        self.articles.push(article);
        true
    }

    /// Insert every article, returning how many were new.
    pub fn extend(&mut self, articles: impl IntoIterator<Item = Article>) -> usize {
        let mut added = 0;
        for article in articles {
            if self.insert(article) {
                added += 1;
            }
        }
        added
    }

    #[cfg(test)]
    pub fn get(&self, hash: &str) -> Option<&Article> {
        self.index.get(hash).map(|&i| &self.articles[i])
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    /// Newest first, unknown dates last, capped at `max`.
    pub fn into_newest(self, max: usize) -> Vec<Article> {
        let mut articles = self.articles;
        // stable: equal timestamps keep first-seen order
        articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        articles.truncate(max);
        articles
    }
}
