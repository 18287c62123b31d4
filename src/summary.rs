//! Country report generation through the Gemini `generateContent` API.
//!
//! # Failure model
//!
//! [`SummaryClient::summarize`] never returns an error. The caller only sees
//! an empty string when nothing usable came back:
//!
//! | Response | Behavior |
//! |----------|----------|
//! | 200 with candidate text | fences stripped, text returned |
//! | 429 | wait the server-suggested delay, retry up to `max_retries` times |
//! | any other status | empty, no retry |
//! | transport error, bad JSON | empty, no retry |
//! | cancellation during a call or a wait | empty |
//!
//! # Rate-limit delay
//!
//! The 429 body carries `error.details[].retryDelay` as `"<N>s"`. When present
//! the wait is `N + safety_margin`; otherwise it is `default_delay`.

use crate::cancel::{CancelToken, Cancelled};
use crate::config::GeminiConfig;
use crate::models::Article;
use crate::prompt::{CountryContext, article_digest, system_instruction};
use crate::utils::{looks_truncated, strip_code_fences, truncate_for_log};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

/// Backoff settings for rate-limited calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first.
    pub max_retries: u32,
    /// Wait used when the server gives no usable hint.
    pub default_delay: Duration,
    /// Added on top of a server-provided hint.
    pub safety_margin: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            default_delay: Duration::from_secs(65),
            safety_margin: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &GeminiConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            default_delay: Duration::from_secs(config.default_retry_delay_secs),
            safety_margin: Duration::from_secs(config.retry_margin_secs),
        }
    }

    /// Wait before the next attempt, given the body of a 429 response.
    pub fn delay_for(&self, body: &str) -> Duration {
        match parse_retry_hint(body) {
            Some(hint) => hint + self.safety_margin,
            None => self.default_delay,
        }
    }
}

/// First `retryDelay` in `error.details[]`, e.g. `"10s"` or `"7.5s"`.
fn parse_retry_hint(body: &str) -> Option<Duration> {
    let envelope: ErrorEnvelope = serde_json::from_str(body).ok()?;
    let raw = envelope
        .error
        .details
        .iter()
        .find_map(|detail| detail.get("retryDelay")?.as_str())?;
    let secs: f64 = raw.trim().strip_suffix('s')?.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

/// Where backoff waits happen. Swapped for a recorder in tests.
pub trait Sleeper {
    async fn sleep(&self, delay: Duration, cancel: &CancelToken) -> Result<(), Cancelled>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration, cancel: &CancelToken) -> Result<(), Cancelled> {
        cancel.sleep(delay).await
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    system_instruction: Instruction<'a>,
    contents: [Instruction<'a>; 1],
}

#[derive(Serialize)]
struct Instruction<'a> {
    parts: [TextPart<'a>; 1],
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    details: Vec<serde_json::Value>,
}

/// `candidates[0].content.parts[0].text`, or why it is missing.
fn extract_text(body: &str) -> Result<String, String> {
    let response: GenerateResponse = serde_json::from_str(body).map_err(|e| {
        if looks_truncated(&e) {
            format!("truncated response: {e}")
        } else {
            format!("malformed response: {e}")
        }
    })?;
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .ok_or_else(|| "response has no candidate text".to_string())
}

/// Gemini client with rate-limit aware retries.
pub struct SummaryClient<S = TokioSleeper> {
    http: Client,
    endpoint: String,
    api_key: String,
    policy: RetryPolicy,
    sleeper: S,
}

impl<S> fmt::Debug for SummaryClient<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SummaryClient")
            .field("endpoint", &self.endpoint)
            .field("policy", &self.policy)
            .finish()
    }
}

impl<S: Sleeper> SummaryClient<S> {
    pub fn new(http: Client, config: &GeminiConfig, sleeper: S) -> Self {
        Self {
            http,
            endpoint: format!(
                "{}/v1beta/models/{}:generateContent",
                config.base_url.trim_end_matches('/'),
                config.model_id
            ),
            api_key: config.api_key.clone().unwrap_or_default(),
            policy: RetryPolicy::from_config(config),
            sleeper,
        }
    }

    async fn send(&self, request: &GenerateRequest<'_>) -> reqwest::Result<(StatusCode, String)> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;
        let status = response.status();
        Ok((status, response.text().await?))
    }

    /// HTML report for `articles`, or an empty string.
    #[instrument(level = "info", skip_all, fields(country = ctx.name, articles = articles.len()))]
    pub async fn summarize(
        &self,
        articles: &[Article],
        ctx: &CountryContext<'_>,
        cancel: &CancelToken,
    ) -> String {
        if articles.is_empty() {
            return String::new();
        }

        let instruction = system_instruction(ctx);
        let digest = article_digest(ctx.name, articles);
        let request = GenerateRequest {
            system_instruction: Instruction {
                parts: [TextPart { text: &instruction }],
            },
            contents: [Instruction {
                parts: [TextPart { text: &digest }],
            }],
        };

        let total_t0 = Instant::now();
        for attempt in 0..=self.policy.max_retries {
            let (status, body) = match cancel.run(self.send(&request)).await {
                Ok(Ok(reply)) => reply,
                Ok(Err(e)) => {
                    error!(attempt, error = %e, "Summarization request failed");
                    return String::new();
                }
                Err(Cancelled) => {
                    warn!("Summarization cancelled");
                    return String::new();
                }
            };

            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt == self.policy.max_retries {
                    error!(max = self.policy.max_retries, "Rate limit persisted after retries; giving up");
                    return String::new();
                }
                let delay = self.policy.delay_for(&body);
                warn!(
                    attempt = attempt + 1,
                    max = self.policy.max_retries,
                    ?delay,
                    "Rate limited; backing off"
                );
                if self.sleeper.sleep(delay, cancel).await.is_err() {
                    warn!("Summarization cancelled during backoff");
                    return String::new();
                }
                continue;
            }

            if !status.is_success() {
                error!(%status, body = %truncate_for_log(&body, 500), "Summarization endpoint error");
                return String::new();
            }

            return match extract_text(&body) {
                Ok(text) => {
                    let html = strip_code_fences(&text);
                    info!(
                        chars = html.len(),
                        elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                        "Summary produced"
                    );
                    html
                }
                Err(reason) => {
                    error!(%reason, body = %truncate_for_log(&body, 500), "Unusable summarization response");
                    String::new()
                }
            };
        }
        String::new()
    }
}
