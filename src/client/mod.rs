//! HTTP client decorator stack: a User-Agent decorator wraps a
//! rate-limiting decorator wraps a caching decorator wraps the base
//! `reqwest` transport. Each layer implements the same `HttpClient` trait
//! as the thing it wraps, grounded on `pypi::PyPiClient` (which builds its
//! own `reqwest::Client`, sets `User-Agent`, and layers conditional-request
//! headers on top) and `downloader`'s rate-shaping over `tokio::time`.

pub mod cached;
pub mod rate_limit;
pub mod user_agent;

use async_trait::async_trait;

use crate::error::ProxyError;
use crate::http_types::{UpstreamRequest, UpstreamResponse};

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: UpstreamRequest) -> Result<UpstreamResponse, ProxyError>;
}

/// The base transport: a thin wrapper over `reqwest::Client`.
pub struct BaseClient {
    inner: reqwest::Client,
}

impl BaseClient {
    pub fn new(timeout: std::time::Duration) -> Result<Self, ProxyError> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ProxyError::from)?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl HttpClient for BaseClient {
    async fn execute(&self, request: UpstreamRequest) -> Result<UpstreamResponse, ProxyError> {
        let mut builder = self.inner.request(request.method, request.url);
        builder = builder.headers(request.headers);
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}
