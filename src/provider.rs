//! Endpoints of the news aggregator.
//!
//! The origin defaults to `https://news.google.com` and is injectable so the
//! fetcher and resolver can be pointed at a local mock server.

use url::Url;

pub const GOOGLE_NEWS_ORIGIN: &str = "https://news.google.com";

const BATCH_EXECUTE_PATH: &str = "/_/DotsSplashUi/data/batchexecute";

/// Path markers that precede the encoded article token.
pub const TOKEN_MARKERS: [&str; 2] = ["articles/", "read/"];

/// Language/region pair sent with every search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale {
    pub language: String,
    pub region: String,
}

impl Locale {
    pub fn new(language: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            region: region.into(),
        }
    }

    /// `hl` parameter, e.g. `es-CO`.
    pub fn host_language(&self) -> String {
        format!("{}-{}", self.language, self.region)
    }

    /// `ceid` parameter, e.g. `CO:es-CO`.
    pub fn edition_id(&self) -> String {
        format!("{}:{}", self.region, self.host_language())
    }
}

#[derive(Debug, Clone)]
pub struct NewsProvider {
    origin: Url,
}

impl NewsProvider {
    pub fn google() -> Self {
        Self {
            origin: Url::parse(GOOGLE_NEWS_ORIGIN).expect("static origin is a valid url"),
        }
    }

    /// Provider rooted at another origin, e.g. a local mock server.
    #[cfg(test)]
    pub fn with_origin(origin: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            origin: Url::parse(origin)?,
        })
    }

    fn base(&self) -> &str {
        self.origin.as_str().trim_end_matches('/')
    }

    /// RSS search URL for one query.
    pub fn search_url(&self, query: &str, locale: &Locale) -> String {
        format!(
            "{}/rss/search?q={}&hl={}&gl={}&ceid={}",
            self.base(),
            urlencoding::encode(query),
            urlencoding::encode(&locale.host_language()),
            urlencoding::encode(&locale.region),
            urlencoding::encode(&locale.edition_id()),
        )
    }

    /// Article permalink page, the one that carries the signing attributes.
    pub fn article_page_url(&self, token: &str) -> String {
        format!("{}/articles/{}", self.base(), token)
    }

    pub fn batch_execute_url(&self) -> String {
        format!("{}{}", self.base(), BATCH_EXECUTE_PATH)
    }

    /// True when `url` points at the aggregator itself.
    pub fn owns(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        self.owns_url(&parsed)
    }

    pub fn owns_url(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let same_origin = Some(host) == self.origin.host_str()
            && url.port_or_known_default() == self.origin.port_or_known_default();
        same_origin || host == "google.com" || host.ends_with(".google.com")
    }

    /// Redirect wrapper links are provider-owned and carry an article token.
    ///
    /// Only the path is inspected; markers inside the query string do not count.
    pub fn is_redirect_url(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        self.owns_url(&parsed) && TOKEN_MARKERS.iter().any(|m| parsed.path().contains(m))
    }
}

impl Default for NewsProvider {
    fn default() -> Self {
        Self::google()
    }
}

/// Token following the last `articles/` or `read/` marker, query string removed.
pub fn extract_token(url: &str) -> Option<&str> {
    let start = TOKEN_MARKERS
        .iter()
        .filter_map(|m| url.rfind(m).map(|i| i + m.len()))
        .max()?;
    let rest = &url[start..];
    let token = rest.split(['?', '#']).next().unwrap_or_default();
    let token = token.trim_end_matches('/');
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_url_encodes_query_and_locale() {
        let provider = NewsProvider::google();
        let url = provider.search_url(
            "(copper mine OR \"data center\") location:Chile when:1d",
            &Locale::new("es", "CL"),
        );
        assert!(url.starts_with("https://news.google.com/rss/search?q=%28copper%20mine%20OR%20"));
        assert!(url.ends_with("&hl=es-CL&gl=CL&ceid=CL%3Aes-CL"));
    }

    #[test]
    fn test_endpoint_urls() {
        let provider = NewsProvider::with_origin("http://127.0.0.1:4000/").unwrap();
        assert_eq!(provider.article_page_url("CBMi"), "http://127.0.0.1:4000/articles/CBMi");
        assert_eq!(
            provider.batch_execute_url(),
            "http://127.0.0.1:4000/_/DotsSplashUi/data/batchexecute"
        );
    }

    #[test]
    fn test_owns_google_hosts_and_origin() {
        let provider = NewsProvider::with_origin("http://127.0.0.1:4000").unwrap();
        assert!(provider.owns("http://127.0.0.1:4000/articles/x"));
        assert!(!provider.owns("http://127.0.0.1:4001/story"));
        assert!(provider.owns("https://news.google.com/rss/articles/x"));
        assert!(provider.owns("https://www.google.com/url?q=x"));
        assert!(!provider.owns("https://notgoogle.com/x"));
        assert!(!provider.owns("not a url"));
    }

    #[test]
    fn test_is_redirect_url() {
        let provider = NewsProvider::google();
        assert!(provider.is_redirect_url("https://news.google.com/rss/articles/CBMiabc?oc=5"));
        assert!(provider.is_redirect_url("https://news.google.com/read/CBMiabc"));
        assert!(!provider.is_redirect_url("https://news.google.com/topics/abc"));
        assert!(!provider.is_redirect_url("https://www.reuters.com/world/articles/abc"));
        assert!(!provider.is_redirect_url("https://www.google.com/url?q=https://x.com/articles/y"));
        assert!(!provider.is_redirect_url("https://news.google.com/search?q=read/more"));
    }

    #[test]
    fn test_extract_token_handles_both_markers() {
        assert_eq!(
            extract_token("https://news.google.com/rss/articles/CBMiXyz?oc=5&hl=en"),
            Some("CBMiXyz")
        );
        assert_eq!(extract_token("https://news.google.com/read/CBMiAbc"), Some("CBMiAbc"));
        assert_eq!(extract_token("https://news.google.com/rss/articles/?oc=5"), None);
        assert_eq!(extract_token("https://news.google.com/topics/abc"), None);
    }
}
