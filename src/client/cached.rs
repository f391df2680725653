//! Innermost decorator before the base transport: caches whole response
//! bytes for `GET`/`HEAD` requests, keyed by URL, through a
//! `CoalescingCache`. 5xx responses are never retained: they're returned
//! to the caller the first time (and shared with anyone who raced in
//! during that fetch), then evicted immediately so the next independent
//! request tries the upstream again.

use async_trait::async_trait;
use http::Method;
use std::sync::Arc;
use tracing::{debug, warn};

use super::HttpClient;
use crate::cache::{CoalescingCache, WireResponse};
use crate::error::ProxyError;
use crate::http_types::{UpstreamRequest, UpstreamResponse};

pub struct CachedClient {
    inner: Arc<dyn HttpClient>,
    cache: CoalescingCache<String, Vec<u8>, ProxyError>,
}

impl CachedClient {
    pub fn new(inner: Arc<dyn HttpClient>) -> Self {
        Self {
            inner,
            cache: CoalescingCache::new(),
        }
    }

    fn cacheable(method: &Method) -> bool {
        matches!(*method, Method::GET | Method::HEAD)
    }
}

#[async_trait]
impl HttpClient for CachedClient {
    async fn execute(&self, request: UpstreamRequest) -> Result<UpstreamResponse, ProxyError> {
        if !Self::cacheable(&request.method) {
            return self.inner.execute(request).await;
        }

        let key = request.url.to_string();
        let inner = Arc::clone(&self.inner);
        let fetch_request = request.clone();

        let outcome = self
            .cache
            .get_or_set(key.clone(), move || async move {
                debug!(url = %fetch_request.url, "cache miss, fetching upstream");
                let response = inner.execute(fetch_request).await?;
                let wire = WireResponse {
                    status: response.status.as_u16(),
                    headers: response
                        .headers
                        .iter()
                        .filter_map(|(name, value)| {
                            value
                                .to_str()
                                .ok()
                                .map(|v| (name.as_str().to_string(), v.to_string()))
                        })
                        .collect(),
                    body: response.body,
                };
                Ok(wire.encode())
            })
            .await;

        let bytes = match outcome {
            Ok(bytes) => bytes,
            Err(err) => return Err(err),
        };

        // Every egress rehydrates an independent `UpstreamResponse` from
        // the stored wire bytes rather than handing out a shared object.
        let wire = WireResponse::decode(&bytes)
            .map_err(|e| ProxyError::Transport(format!("corrupt cache entry: {e}")))?;

        if wire.status >= 500 {
            warn!(url = %key, status = wire.status, "evicting 5xx response, not caching it");
            self.cache.del(&key);
        }

        decode_response(&wire)
    }
}

fn decode_response(wire: &WireResponse) -> Result<UpstreamResponse, ProxyError> {
    let status = http::StatusCode::from_u16(wire.status)
        .map_err(|e| ProxyError::Transport(format!("invalid cached status: {e}")))?;

    let mut headers = http::HeaderMap::new();
    for (name, value) in &wire.headers {
        if let (Ok(name), Ok(value)) = (
            http::HeaderName::try_from(name.as_str()),
            http::HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }

    Ok(UpstreamResponse {
        status,
        headers,
        body: wire.body.clone(),
    })
}
