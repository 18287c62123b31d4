//! Bounded-concurrency resolution over a country's article list.

use crate::cancel::{CancelToken, Cancelled};
use crate::models::Article;
use crate::resolve::ResolveLink;
use futures::stream::{self, StreamExt};
use std::time::Instant;
use tracing::{info, instrument};

/// Resolve every article's link with at most `concurrency` in flight.
///
/// Output is index-aligned with the input and has the same length. When
/// `cancel` fires, pending and in-flight resolutions are dropped and
/// [`Cancelled`] is returned.
#[instrument(level = "info", skip_all, fields(
    count = articles.len(),
    country = articles.first().map(Article::country_code).unwrap_or_default(),
    concurrency = concurrency
))]
pub async fn resolve_all<R>(
    resolver: &R,
    articles: Vec<Article>,
    concurrency: usize,
    cancel: &CancelToken,
) -> Result<Vec<Article>, Cancelled>
where
    R: ResolveLink,
{
    let t0 = Instant::now();
    let work = stream::iter(articles)
        .map(|article| async move {
            let resolved = resolver.resolve(article.url()).await;
            article.with_url(resolved)
        })
        .buffered(concurrency.max(1))
        .collect::<Vec<_>>();

    let resolved = cancel.run(work).await?;
    info!(
        count = resolved.len(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "Resolved article links"
    );
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelSource;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Appends `#r` to each URL after a delay derived from the URL itself.
    #[derive(Default)]
    struct SlowResolver {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ResolveLink for SlowResolver {
        async fn resolve(&self, url: &str) -> String {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let jitter = url.bytes().map(u64::from).sum::<u64>() % 17;
            tokio::time::sleep(Duration::from_millis(2 + jitter)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            format!("{url}#r")
        }
    }

    struct Stuck;

    impl ResolveLink for Stuck {
        async fn resolve(&self, _url: &str) -> String {
            std::future::pending().await
        }
    }

    fn articles(n: usize) -> Vec<Article> {
        (0..n)
            .map(|i| Article::new(format!("story {i}"), format!("https://p.example/{i}"), None, "MX"))
            .collect()
    }

    #[tokio::test]
    async fn test_output_is_index_aligned() {
        let resolver = SlowResolver::default();
        let input = articles(23);
        let hashes: Vec<String> = input.iter().map(|a| a.hash().to_string()).collect();

        let output = resolve_all(&resolver, input, 5, &CancelToken::never())
            .await
            .unwrap();

        assert_eq!(output.len(), 23);
        for (i, article) in output.iter().enumerate() {
            assert_eq!(article.hash(), hashes[i]);
            assert_eq!(article.url(), format!("https://p.example/{i}#r"));
        }
    }

    #[tokio::test]
    async fn test_concurrency_ceiling_is_respected() {
        let resolver = SlowResolver::default();
        resolve_all(&resolver, articles(30), 5, &CancelToken::never())
            .await
            .unwrap();
        let peak = resolver.peak.load(Ordering::SeqCst);
        assert!(peak <= 5, "peak in flight was {peak}");
        assert!(peak >= 2);
    }

    #[tokio::test]
    async fn test_ceiling_of_one_and_empty_input() {
        let resolver = SlowResolver::default();
        let output = resolve_all(&resolver, articles(4), 1, &CancelToken::never())
            .await
            .unwrap();
        assert_eq!(output.len(), 4);
        assert_eq!(resolver.peak.load(Ordering::SeqCst), 1);

        let empty = resolve_all(&resolver, Vec::new(), 5, &CancelToken::never())
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_aborts_in_flight_work() {
        let source = CancelSource::new();
        let token = source.token();
        let canceller = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            source.cancel();
        };

        let (result, _) = tokio::join!(resolve_all(&Stuck, articles(8), 5, &token), canceller);
        assert_eq!(result, Err(Cancelled));
    }
}
