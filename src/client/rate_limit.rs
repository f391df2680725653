//! Middle decorator: shapes request rate against a single ticker, the way
//! `downloader` paces concurrent per-file fetches instead of hammering the
//! upstream registry. The ticker period is this decorator's one tunable.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Interval, interval};

use super::HttpClient;
use crate::error::ProxyError;
use crate::http_types::{UpstreamRequest, UpstreamResponse};

pub struct RateLimitedClient {
    inner: Arc<dyn HttpClient>,
    ticker: Mutex<Interval>,
}

impl RateLimitedClient {
    pub fn new(inner: Arc<dyn HttpClient>, period: Duration) -> Self {
        Self {
            inner,
            ticker: Mutex::new(interval(period)),
        }
    }
}

#[async_trait]
impl HttpClient for RateLimitedClient {
    async fn execute(&self, request: UpstreamRequest) -> Result<UpstreamResponse, ProxyError> {
        self.ticker.lock().await.tick().await;
        self.inner.execute(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use url::Url;

    struct Immediate;

    #[async_trait]
    impl HttpClient for Immediate {
        async fn execute(&self, _request: UpstreamRequest) -> Result<UpstreamResponse, ProxyError> {
            Ok(UpstreamResponse {
                status: http::StatusCode::OK,
                headers: http::HeaderMap::new(),
                body: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn first_request_passes_through_immediately() {
        let client = RateLimitedClient::new(Arc::new(Immediate), Duration::from_millis(50));
        let started = Instant::now();
        let request = UpstreamRequest::get(Url::parse("http://example.test/").unwrap());
        client.execute(request).await.unwrap();
        // `interval` fires its first tick right away.
        assert!(started.elapsed() < Duration::from_millis(40));
    }

    #[tokio::test]
    async fn second_request_waits_out_the_period() {
        let client = RateLimitedClient::new(Arc::new(Immediate), Duration::from_millis(40));
        let req = || UpstreamRequest::get(Url::parse("http://example.test/").unwrap());
        client.execute(req()).await.unwrap();
        let started = Instant::now();
        client.execute(req()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
