//! Outermost decorator: stamps every request with the proxy's configured
//! `User-Agent`, overwriting whatever the client sent. Mirrors
//! `PyPiClient`'s practice of always sending its own `User-Agent` to
//! upstream rather than forwarding the caller's.

use async_trait::async_trait;
use http::HeaderValue;
use std::sync::Arc;

use super::HttpClient;
use crate::error::ProxyError;
use crate::http_types::{UpstreamRequest, UpstreamResponse};

pub struct UserAgentClient {
    inner: Arc<dyn HttpClient>,
    user_agent: HeaderValue,
}

impl UserAgentClient {
    pub fn new(inner: Arc<dyn HttpClient>, user_agent: &str) -> Result<Self, ProxyError> {
        let user_agent = HeaderValue::from_str(user_agent)
            .map_err(|e| ProxyError::Transport(format!("invalid user agent: {e}")))?;
        Ok(Self { inner, user_agent })
    }
}

#[async_trait]
impl HttpClient for UserAgentClient {
    async fn execute(&self, mut request: UpstreamRequest) -> Result<UpstreamResponse, ProxyError> {
        request
            .headers
            .insert(http::header::USER_AGENT, self.user_agent.clone());
        self.inner.execute(request).await
    }
}
