use thiserror::Error;

/// Everything that can go wrong while warping a registry response, tagged
/// with the HTTP status the dispatch handler should answer with.
#[derive(Debug, Clone, Error)]
pub enum ProxyError {
    #[error("bad credential: {0}")]
    BadCredential(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unsupported accept: {0}")]
    UnsupportedAccept(String),

    #[error("upstream transport error: {0}")]
    Transport(String),

    #[error("failed to decode upstream body as json: {0}")]
    Decode(String),

    #[error("rewrite failed: {0}")]
    Rewrite(String),

    #[error("failed to re-encode rewritten body: {0}")]
    Serialize(String),
}

impl ProxyError {
    /// HTTP status this error should surface as. Every variant maps to
    /// either 400 (credential/parameter errors) or 502 (everything that
    /// goes wrong talking to, or trusting, the upstream registry).
    pub fn status(&self) -> u16 {
        match self {
            ProxyError::BadCredential(_) | ProxyError::BadRequest(_) => 400,
            ProxyError::UnsupportedAccept(_)
            | ProxyError::Transport(_)
            | ProxyError::Decode(_)
            | ProxyError::Rewrite(_)
            | ProxyError::Serialize(_) => 502,
        }
    }

    /// Short, newline-terminated message suitable as the entire body of
    /// an error response. Never leaks partial upstream bodies.
    pub fn body(&self) -> String {
        format!("{self}\n")
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(value: reqwest::Error) -> Self {
        ProxyError::Transport(value.to_string())
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(value: serde_json::Error) -> Self {
        ProxyError::Decode(value.to_string())
    }
}
