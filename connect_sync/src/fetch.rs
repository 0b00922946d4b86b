//! Paged reads from a remote list API.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::SourceError;
use crate::retry::RetryPolicy;

/// Largest key filter Amazon Connect accepts in one metrics request.
pub const MAX_FILTER_KEYS: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

/// One paginated remote call, with its request parameters fixed.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Send;

    /// Name of the remote operation, for logs and errors.
    fn operation(&self) -> &'static str;

    /// Fetch one page. `filter` is empty for sources that take no key filter.
    async fn fetch_page(
        &self,
        filter: &[String],
        next_token: Option<String>,
    ) -> Result<Page<Self::Item>, SourceError>;
}

#[derive(Debug, Clone, Copy)]
pub struct Fetcher {
    policy: RetryPolicy,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new(RetryPolicy::remote_page())
    }
}

impl Fetcher {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Follow continuation tokens until the source has nothing more. A page
    /// that fails with a retryable error is requested again under the policy.
    pub async fn fetch_all<S>(&self, source: &S, filter: &[String]) -> Result<Vec<S::Item>, SourceError>
    where
        S: PageSource + ?Sized,
    {
        let mut items = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let token = next_token.take();
            let page = self
                .policy
                .run(source.operation(), move || source.fetch_page(filter, token.clone()))
                .await?;
            debug!("{} returned {} items", source.operation(), page.items.len());
            items.extend(page.items);
            match page.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }
        Ok(items)
    }

    /// Split `keys` into groups of at most `chunk_size` and fetch every group
    /// in full, keeping the order of `keys`. No keys means no requests.
    pub async fn fetch_chunked<S>(
        &self,
        source: &S,
        keys: &[String],
        chunk_size: usize,
    ) -> Result<Vec<S::Item>, SourceError>
    where
        S: PageSource + ?Sized,
    {
        let mut items = Vec::new();
        for chunk in keys.chunks(chunk_size.max(1)) {
            info!("Pulling {} for {} keys", source.operation(), chunk.len());
            items.extend(self.fetch_all(source, chunk).await?);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Echoes its filter back, two keys per page.
    #[derive(Default)]
    struct EchoSource {
        requests: Mutex<Vec<(usize, Option<String>)>>,
        transient_failures: Mutex<u32>,
        terminal: bool,
    }

    #[async_trait]
    impl PageSource for EchoSource {
        type Item = String;

        fn operation(&self) -> &'static str {
            "Echo"
        }

        async fn fetch_page(
            &self,
            filter: &[String],
            next_token: Option<String>,
        ) -> Result<Page<String>, SourceError> {
            self.requests
                .lock()
                .unwrap()
                .push((filter.len(), next_token.clone()));
            {
                let mut failures = self.transient_failures.lock().unwrap();
                if *failures > 0 || self.terminal {
                    *failures = failures.saturating_sub(1);
                    return Err(SourceError::Remote {
                        operation: "Echo",
                        retryable: !self.terminal,
                        message: String::from("throttled"),
                    });
                }
            }
            let start: usize = next_token.as_deref().map_or(0, |t| t.parse().unwrap());
            let end = (start + 2).min(filter.len());
            Ok(Page {
                items: filter[start..end].to_vec(),
                next_token: (end < filter.len()).then(|| end.to_string()),
            })
        }
    }

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("arn:queue/{}", i)).collect()
    }

    #[tokio::test]
    async fn follows_continuation_tokens() {
        let source = EchoSource::default();
        let filter = keys(5);

        let items = Fetcher::default().fetch_all(&source, &filter).await.unwrap();

        assert_eq!(items, filter);
        let tokens: Vec<Option<String>> = source
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, t)| t.clone())
            .collect();
        assert_eq!(tokens, vec![None, Some("2".into()), Some("4".into())]);
    }

    #[tokio::test]
    async fn chunks_keys_by_limit() {
        let source = EchoSource::default();
        let all = keys(250);

        let items = Fetcher::default()
            .fetch_chunked(&source, &all, MAX_FILTER_KEYS)
            .await
            .unwrap();

        assert_eq!(items, all);
        let first_pages: Vec<usize> = source
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, t)| t.is_none())
            .map(|(n, _)| *n)
            .collect();
        assert_eq!(first_pages, vec![100, 100, 50]);
    }

    #[tokio::test]
    async fn no_keys_means_no_requests() {
        let source = EchoSource::default();
        let items = Fetcher::default()
            .fetch_chunked(&source, &[], MAX_FILTER_KEYS)
            .await
            .unwrap();
        assert!(items.is_empty());
        assert!(source.requests.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_a_throttled_page_once() {
        let source = EchoSource {
            transient_failures: Mutex::new(1),
            ..Default::default()
        };
        let started = Instant::now();

        let items = Fetcher::default().fetch_all(&source, &keys(1)).await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(source.requests.lock().unwrap().len(), 2);
        assert_eq!(started.elapsed(), Duration::from_millis(4_000));
    }

    #[tokio::test(start_paused = true)]
    async fn second_throttle_is_surfaced() {
        let source = EchoSource {
            transient_failures: Mutex::new(2),
            ..Default::default()
        };
        let err = Fetcher::default().fetch_all(&source, &keys(1)).await.unwrap_err();
        assert!(matches!(err, SourceError::Remote { retryable: true, .. }));
        assert_eq!(source.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn terminal_error_is_not_retried() {
        let source = EchoSource {
            terminal: true,
            ..Default::default()
        };
        let err = Fetcher::default().fetch_all(&source, &keys(3)).await.unwrap_err();
        assert!(matches!(err, SourceError::Remote { retryable: false, .. }));
        assert_eq!(source.requests.lock().unwrap().len(), 1);
    }
}
