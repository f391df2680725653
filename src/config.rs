//! Proxy configuration, loaded the way `pybun`'s CLI surface loads
//! settings: `clap` flags with `env` fallback for the demo binary, and a
//! plain `Default` for library/test use where nothing is bound to a real
//! process environment.

use std::time::Duration;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "timewarp-registry",
    about = "A time-warping registry proxy for npm, PyPI, and cargo clients."
)]
pub struct ProxyConfig {
    /// Upstream npm registry base URL.
    #[arg(long, env = "TIMEWARP_NPM_BASE_URL", default_value = "https://registry.npmjs.org")]
    pub npm_base_url: String,

    /// Upstream PyPI base URL.
    #[arg(long, env = "TIMEWARP_PYPI_BASE_URL", default_value = "https://pypi.org")]
    pub pypi_base_url: String,

    /// `User-Agent` sent on every upstream request, overwriting the
    /// caller's own.
    #[arg(long, env = "TIMEWARP_USER_AGENT", default_value = "timewarp-registry/0.1")]
    pub user_agent: String,

    /// Minimum spacing between upstream requests, in milliseconds. `0`
    /// disables rate limiting entirely.
    #[arg(long, env = "TIMEWARP_RATE_LIMIT_MS", default_value_t = 0)]
    pub rate_limit_period_ms: u64,

    /// Per-request upstream timeout, in seconds.
    #[arg(long, env = "TIMEWARP_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,
}

impl ProxyConfig {
    pub fn rate_limit_period(&self) -> Option<Duration> {
        (self.rate_limit_period_ms > 0).then(|| Duration::from_millis(self.rate_limit_period_ms))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            npm_base_url: "https://registry.npmjs.org".to_string(),
            pypi_base_url: "https://pypi.org".to_string(),
            user_agent: "timewarp-registry/0.1".to_string(),
            rate_limit_period_ms: 0,
            request_timeout_secs: 30,
        }
    }
}
