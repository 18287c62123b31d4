//! Search query construction.
//!
//! Each term category becomes one or more OR-groups of at most
//! [`QUERY_CHUNK_SIZE`] terms:
//!
//! ```text
//! (term OR term OR ...) location:<Country> when:<N>d
//! ```
//!
//! The search backend silently truncates long query strings, so oversized
//! categories are split into several queries instead of one long one.

use crate::config::CountryProfile;
use itertools::Itertools;

pub const QUERY_CHUNK_SIZE: usize = 8;

#[derive(Debug, Clone)]
pub struct QueryBuilder {
    /// `None` for global scope.
    location: Option<String>,
    days: u32,
    chunk_size: usize,
}

impl QueryBuilder {
    pub fn new(location: Option<&str>, days: u32) -> Self {
        Self {
            location: location.map(str::to_string),
            days,
            chunk_size: QUERY_CHUNK_SIZE,
        }
    }

    pub fn for_country(country: &CountryProfile, days: u32) -> Self {
        let location = (!country.is_global).then_some(country.name.as_str());
        Self::new(location, days)
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn finish(&self, group: &str) -> String {
        match &self.location {
            Some(location) => format!("({group}) location:{location} when:{}d", self.days),
            None => format!("({group}) when:{}d", self.days),
        }
    }

    /// Zero queries for an empty (or all-blank) category, otherwise one per chunk.
    pub fn category(&self, terms: &[String]) -> Vec<String> {
        let valid: Vec<&str> = terms
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();

        valid
            .chunks(self.chunk_size)
            .map(|chunk| self.finish(&chunk.iter().join(" OR ")))
            .collect()
    }

    /// `(Parent OR "Local Brand")`, or just the quoted local brand.
    pub fn brand(&self, parent_brand: Option<&str>, local_brand: &str) -> String {
        let quoted = format!("\"{}\"", local_brand.trim());
        let group = match parent_brand.map(str::trim).filter(|p| !p.is_empty()) {
            Some(parent) => format!("{parent} OR {quoted}"),
            None => quoted,
        };
        self.finish(&group)
    }
}

/// Every query for one country: the categories in order, then the brand query.
pub fn build_queries(
    country: &CountryProfile,
    parent_brand: Option<&str>,
    days: u32,
    chunk_size: usize,
) -> Vec<String> {
    let builder = QueryBuilder::for_country(country, days).with_chunk_size(chunk_size);
    let mut queries: Vec<String> = country
        .term_categories()
        .iter()
        .flat_map(|terms| builder.category(terms))
        .collect();

    if let Some(local_brand) = country.local_brand() {
        queries.push(builder.brand(parent_brand, local_brand));
    }
    queries
}
