//! YAML configuration for the news agent.
//!
//! The document has two sections: `news_agent` (run tuning plus one profile
//! per country) and `gemini` (summarization endpoint and retry policy).
//! Values left out fall back to the defaults below.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};

/// Whole configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub news_agent: NewsAgentConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
}

/// Run-level settings shared by every country.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NewsAgentConfig {
    pub default_language: String,
    pub timezone: String,
    pub lookback_hours: u32,
    pub max_articles_per_country: usize,
    /// Company name OR'd into every country's brand query.
    pub parent_brand: Option<String>,
    pub query_delay_ms: u64,
    pub static_feed_delay_ms: u64,
    /// How far in the future a publish date may lie before the item is dropped.
    pub future_skew_hours: u32,
    pub resolve_concurrency: usize,
    pub countries: Vec<CountryProfile>,
}

impl Default for NewsAgentConfig {
    fn default() -> Self {
        Self {
            default_language: "es".to_string(),
            timezone: "America/Bogota".to_string(),
            lookback_hours: 24,
            max_articles_per_country: 120,
            parent_brand: None,
            query_delay_ms: 1500,
            static_feed_delay_ms: 500,
            future_skew_hours: 48,
            resolve_concurrency: 5,
            countries: Vec::new(),
        }
    }
}

impl NewsAgentConfig {
    /// `when:<N>d` window for search queries, never below one day.
    pub fn lookback_days(&self) -> u32 {
        (self.lookback_hours / 24).max(1)
    }
}

/// Term lists and presentation settings for one country.
///
/// Each term category is compiled into its own group of search queries.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CountryProfile {
    /// Region code used for `gl`/`ceid` (e.g. `CO`).
    pub code: String,
    /// Display name, also used as the `location:` qualifier.
    pub name: String,
    /// Global scope drops the location qualifier from every query.
    pub is_global: bool,
    /// Overrides `default_language` for this country.
    pub language: Option<String>,
    pub demand_drivers: Vec<String>,
    pub institutions: Vec<String>,
    pub operators: Vec<String>,
    pub macro_signals: Vec<String>,
    pub extra_entities: Vec<String>,
    pub sales_intelligence: Vec<String>,
    pub key_competitors: Vec<String>,
    pub local_brand: Option<String>,
    pub brand_color: Option<String>,
    /// Plain RSS feeds fetched after the search queries.
    pub extra_rss_feeds: Vec<String>,
}

pub const DEFAULT_ACCENT_COLOR: &str = "#E1251B";

impl CountryProfile {
    /// Term categories in query order.
    pub fn term_categories(&self) -> [&[String]; 7] {
        [
            &self.demand_drivers,
            &self.institutions,
            &self.operators,
            &self.macro_signals,
            &self.extra_entities,
            &self.sales_intelligence,
            &self.key_competitors,
        ]
    }

    pub fn local_brand(&self) -> Option<&str> {
        self.local_brand
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
    }

    pub fn brand_label(&self) -> &str {
        self.local_brand().unwrap_or(&self.name)
    }

    pub fn accent_color(&self) -> &str {
        self.brand_color
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(DEFAULT_ACCENT_COLOR)
    }
}

/// Summarization endpoint and its rate-limit handling.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub model_id: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub max_retries: u32,
    pub default_retry_delay_secs: u64,
    pub retry_margin_secs: u64,
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model_id: "gemini-1.5-pro".to_string(),
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            max_retries: 3,
            default_retry_delay_secs: 65,
            retry_margin_secs: 5,
            timeout_secs: 300,
        }
    }
}

impl GeminiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    /// Parse a YAML document without validating it.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Check the invariants the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let agent = &self.news_agent;
        if agent.countries.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one country must be configured".to_string(),
            ));
        }
        for (i, country) in agent.countries.iter().enumerate() {
            if country.code.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("country #{i} has no code")));
            }
            if country.name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "country {} has no name",
                    country.code
                )));
            }
        }
        if agent.lookback_hours == 0 {
            return Err(ConfigError::Invalid("lookback_hours must be >= 1".to_string()));
        }
        if agent.max_articles_per_country == 0 {
            return Err(ConfigError::Invalid(
                "max_articles_per_country must be >= 1".to_string(),
            ));
        }
        if agent.resolve_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "resolve_concurrency must be >= 1".to_string(),
            ));
        }
        if self
            .gemini
            .api_key
            .as_deref()
            .is_none_or(|k| k.trim().is_empty())
        {
            return Err(ConfigError::Invalid("gemini api key is missing".to_string()));
        }
        Ok(())
    }

    /// Keep only the countries whose code is listed (case-insensitive).
    pub fn retain_countries(&mut self, codes: &[String]) {
        if codes.is_empty() {
            return;
        }
        self.news_agent
            .countries
            .retain(|c| codes.iter().any(|code| code.eq_ignore_ascii_case(&c.code)));
    }
}

/// Load, override and validate the configuration file at `path`.
#[instrument(level = "info", skip(api_key_override))]
pub async fn load_config(
    path: &str,
    api_key_override: Option<&str>,
) -> Result<AppConfig, ConfigError> {
    let yaml = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
    let mut config = AppConfig::from_yaml(&yaml)?;
    if let Some(key) = api_key_override {
        config.gemini.api_key = Some(key.to_string());
    }
    config.validate()?;
    info!(
        countries = config.news_agent.countries.len(),
        model = %config.gemini.model_id,
        "Loaded configuration"
    );
    Ok(config)
}
