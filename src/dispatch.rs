//! The single time-warp HTTP handler. Recognizes the platform from the
//! request's Basic-auth temporal credential (not its path — package
//! managers have no notion of this proxy, so there is no router to speak
//! of), builds a scrubbed upstream request, and either passes the
//! response through untouched or applies the matching content rewriter.
//!
//! Grounded on `vm-package-server::upstream`'s "recognize platform → build
//! upstream request → scrub headers → fetch → branch on content-type"
//! shape, and on `pypi::PyPiClient` for the `reqwest`-based fetch
//! plumbing, adapted here to single-handler credential-driven dispatch.

use std::sync::Arc;

use base64::Engine;
use http::{HeaderMap, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::cargo_index;
use crate::client::cached::CachedClient;
use crate::client::rate_limit::RateLimitedClient;
use crate::client::user_agent::UserAgentClient;
use crate::client::{BaseClient, HttpClient};
use crate::config::ProxyConfig;
use crate::credential::{Platform, TemporalCredential};
use crate::error::ProxyError;
use crate::glob;
use crate::http_types::{UpstreamRequest, UpstreamResponse};
use crate::rewrite::{npm, pypi_project, pypi_simple};

pub struct ProxyState {
    client: Arc<dyn HttpClient>,
    config: ProxyConfig,
}

impl ProxyState {
    pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        let base: Arc<dyn HttpClient> = Arc::new(BaseClient::new(config.request_timeout())?);
        let cached: Arc<dyn HttpClient> = Arc::new(CachedClient::new(base));
        let rate_limited: Arc<dyn HttpClient> = match config.rate_limit_period() {
            Some(period) => Arc::new(RateLimitedClient::new(cached, period)),
            None => cached,
        };
        let client: Arc<dyn HttpClient> = Arc::new(UserAgentClient::new(rate_limited, &config.user_agent)?);
        Ok(Self { client, config })
    }

    pub fn with_client(client: Arc<dyn HttpClient>, config: ProxyConfig) -> Self {
        Self { client, config }
    }
}

/// Handle one request end-to-end. Never returns an `Err`: failures are
/// translated into the HTTP status/body they specify.
pub async fn handle(request: UpstreamRequest, state: &ProxyState) -> UpstreamResponse {
    match handle_inner(request, state).await {
        Ok(response) => response,
        Err(err) => {
            warn!(status = err.status(), %err, "request failed");
            let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::BAD_GATEWAY);
            UpstreamResponse::error(status, &err.body())
        }
    }
}

async fn handle_inner(request: UpstreamRequest, state: &ProxyState) -> Result<UpstreamResponse, ProxyError> {
    let credential = parse_credential(&request)?;

    match credential.platform() {
        Platform::Npm => handle_npm(request, &credential, state).await,
        Platform::Pypi => handle_pypi(request, &credential, state).await,
        Platform::CargoSparse => handle_cargo_sparse(&request, &credential),
        Platform::CargoGitArchive => handle_cargo_git_archive(&request, &credential, state).await,
    }
}

fn parse_credential(request: &UpstreamRequest) -> Result<TemporalCredential, ProxyError> {
    let header = request
        .header("authorization")
        .ok_or_else(|| ProxyError::BadCredential("missing Authorization header".to_string()))?;
    let encoded = header
        .strip_prefix("Basic ")
        .ok_or_else(|| ProxyError::BadCredential("Authorization header is not HTTP Basic".to_string()))?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| ProxyError::BadCredential(format!("invalid base64 in Authorization header: {e}")))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| ProxyError::BadCredential("Authorization header is not valid UTF-8".to_string()))?;
    let (username, password) = decoded
        .split_once(':')
        .ok_or_else(|| ProxyError::BadCredential("Authorization header missing ':' separator".to_string()))?;
    TemporalCredential::parse(username, password)
}

/// Header hygiene applied to every upstream request: §4.6 step 3.
fn scrub_headers(mut headers: HeaderMap) -> Result<HeaderMap, ProxyError> {
    headers.remove(http::header::AUTHORIZATION);
    headers.remove(http::header::ACCEPT_ENCODING);
    headers.insert(http::header::CONNECTION, http::HeaderValue::from_static("close"));

    if let Some(accept) = headers
        .get(http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    {
        let has_install_v1 = accept.contains("application/vnd.npm.install-v1+json");
        let has_json = accept.contains("application/json");

        if has_install_v1 && !has_json {
            return Err(ProxyError::UnsupportedAccept(
                "npm install-v1 format lacks the temporal metadata needed to warp safely".to_string(),
            ));
        }
        if has_install_v1 && has_json {
            headers.insert(http::header::ACCEPT, http::HeaderValue::from_static("application/json"));
        }
    }

    Ok(headers)
}

async fn fetch_upstream(
    original: UpstreamRequest,
    upstream_url: Url,
    state: &ProxyState,
) -> Result<UpstreamResponse, ProxyError> {
    let headers = scrub_headers(original.headers)?;
    let request = UpstreamRequest {
        method: original.method,
        url: upstream_url,
        headers,
        body: original.body,
    };
    state.client.execute(request).await
}

/// Swap the scheme/host/port of `original` for the ones in `base`,
/// preserving path and query exactly.
fn build_upstream_url(base: &str, original: &Url) -> Result<Url, ProxyError> {
    let base_url = Url::parse(base).map_err(|e| ProxyError::Transport(format!("invalid upstream base url: {e}")))?;
    let mut url = original.clone();
    url.set_scheme(base_url.scheme())
        .map_err(|_| ProxyError::Transport("failed to set upstream scheme".to_string()))?;
    url.set_host(base_url.host_str())
        .map_err(|e| ProxyError::Transport(format!("failed to set upstream host: {e}")))?;
    url.set_port(base_url.port())
        .map_err(|_| ProxyError::Transport("failed to set upstream port".to_string()))?;
    Ok(url)
}

fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    }
}

fn is_rewritable_json(response: &UpstreamResponse) -> bool {
    response.status == StatusCode::OK
        && response
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"))
}

fn json_response_with_headers(
    original: &UpstreamResponse,
    value: &serde_json::Value,
) -> Result<UpstreamResponse, ProxyError> {
    let body = serde_json::to_vec(value).map_err(|e| ProxyError::Serialize(e.to_string()))?;
    let mut headers = original.headers.clone();
    headers.remove(http::header::CONTENT_LENGTH);
    Ok(UpstreamResponse {
        status: original.status,
        headers,
        body,
    })
}

// --- npm -------------------------------------------------------------

/// Shapes the spec's dispatch table recognizes for npm: `/<name>` or
/// `/@scope/<name>`. Checked via the glob matcher first since it is this
/// proxy's one URL-shape filter; the split below still does the exact
/// segment-count/non-emptiness validation the glob's plain `*` (which
/// can itself span `/`) can't express on its own.
fn is_npm_package_path(path: &str) -> bool {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return false;
    }
    let recognized_shape =
        glob::matches("/*", path).unwrap_or(false) || glob::matches("/@*/*", path).unwrap_or(false);
    if !recognized_shape {
        return false;
    }
    match trimmed.split('/').collect::<Vec<_>>().as_slice() {
        [name] => !name.starts_with('@'),
        [scope, name] => scope.starts_with('@') && !name.is_empty(),
        _ => false,
    }
}

async fn handle_npm(
    request: UpstreamRequest,
    credential: &TemporalCredential,
    state: &ProxyState,
) -> Result<UpstreamResponse, ProxyError> {
    let TemporalCredential::Warp { instant, .. } = credential else {
        unreachable!("npm credentials always carry a warp instant")
    };

    let path = request.url.path().to_string();
    if !is_npm_package_path(&path) {
        debug!(%path, "npm path is not a package document, redirecting upstream");
        let location = format!("{}{}", state.config.npm_base_url, path_and_query(&request.url));
        return Ok(UpstreamResponse::redirect(&location));
    }

    let upstream_url = build_upstream_url(&state.config.npm_base_url, &request.url)?;
    let response = fetch_upstream(request, upstream_url, state).await?;

    if !is_rewritable_json(&response) {
        return Ok(response);
    }

    let doc: serde_json::Value = serde_json::from_slice(&response.body)?;
    if !npm::recognizes(&doc) {
        return Ok(response);
    }

    debug!(%path, warp = %instant, "rewriting npm package document");
    let rewritten = npm::rewrite(doc, *instant)?;
    json_response_with_headers(&response, &rewritten)
}

// --- PyPI --------------------------------------------------------------

fn parse_pypi_project_json_path(path: &str) -> Option<String> {
    if !glob::matches("/pypi/*/json", path).unwrap_or(false) {
        return None;
    }
    let trimmed = path.trim_start_matches('/');
    match trimmed.split('/').collect::<Vec<_>>().as_slice() {
        ["pypi", name, "json"] if !name.is_empty() => Some((*name).to_string()),
        _ => None,
    }
}

fn parse_pypi_simple_path(path: &str) -> Option<String> {
    if !glob::matches("/simple/**", path).unwrap_or(false) {
        return None;
    }
    let trimmed = path.trim_start_matches('/').trim_end_matches('/');
    match trimmed.split('/').collect::<Vec<_>>().as_slice() {
        ["simple", name] if !name.is_empty() => Some((*name).to_string()),
        _ => None,
    }
}

async fn handle_pypi(
    request: UpstreamRequest,
    credential: &TemporalCredential,
    state: &ProxyState,
) -> Result<UpstreamResponse, ProxyError> {
    let TemporalCredential::Warp { instant, .. } = credential else {
        unreachable!("pypi credentials always carry a warp instant")
    };
    let instant = *instant;
    let path = request.url.path().to_string();

    if let Some(project) = parse_pypi_project_json_path(&path) {
        let upstream_url = build_upstream_url(&state.config.pypi_base_url, &request.url)?;
        let response = fetch_upstream(request, upstream_url, state).await?;

        if !is_rewritable_json(&response) {
            return Ok(response);
        }
        let doc: serde_json::Value = serde_json::from_slice(&response.body)?;
        if !pypi_project::recognizes(&doc) {
            return Ok(response);
        }

        debug!(%project, warp = %instant, "rewriting PyPI project document");
        let base_url = state.config.pypi_base_url.clone();
        let client = Arc::clone(&state.client);
        let rewritten = pypi_project::rewrite(doc, instant, move |tag| {
            fetch_version_doc(client, base_url, project, tag)
        })
        .await?;

        return json_response_with_headers(&response, &rewritten);
    }

    if parse_pypi_simple_path(&path).is_some() {
        let upstream_url = build_upstream_url(&state.config.pypi_base_url, &request.url)?;
        let response = fetch_upstream(request, upstream_url, state).await?;

        if !is_rewritable_json(&response) {
            return Ok(response);
        }
        let doc: serde_json::Value = serde_json::from_slice(&response.body)?;
        let rewritten = pypi_simple::rewrite(doc, instant)?;
        return json_response_with_headers(&response, &rewritten);
    }

    let location = format!("{}{}", state.config.pypi_base_url, path_and_query(&request.url));
    Ok(UpstreamResponse::redirect(&location))
}

async fn fetch_version_doc(
    client: Arc<dyn HttpClient>,
    base_url: String,
    project: String,
    tag: String,
) -> Result<serde_json::Value, ProxyError> {
    let url = Url::parse(&format!("{base_url}/pypi/{project}/{tag}/json"))
        .map_err(|e| ProxyError::Transport(format!("invalid version-doc url: {e}")))?;
    let response = client.execute(UpstreamRequest::get(url)).await?;
    if response.status != StatusCode::OK {
        return Err(ProxyError::Transport(format!(
            "version-specific fetch for '{project}' '{tag}' returned status {}",
            response.status
        )));
    }
    serde_json::from_slice(&response.body).map_err(ProxyError::from)
}

// --- cargo ---------------------------------------------------------------

fn handle_cargo_sparse(
    request: &UpstreamRequest,
    credential: &TemporalCredential,
) -> Result<UpstreamResponse, ProxyError> {
    let TemporalCredential::Commit { hash, .. } = credential else {
        unreachable!("cargosparse credentials always carry a commit hash")
    };
    let path = request.url.path();
    if path == "/config.json" {
        return Ok(cargo_index::config_json());
    }
    Ok(cargo_index::sparse_redirect(hash, path))
}

async fn handle_cargo_git_archive(
    request: &UpstreamRequest,
    credential: &TemporalCredential,
    state: &ProxyState,
) -> Result<UpstreamResponse, ProxyError> {
    let TemporalCredential::Commit { hash, .. } = credential else {
        unreachable!("cargogitarchive credentials always carry a commit hash")
    };

    if request.url.path() != "/index.git.tar" {
        return Err(ProxyError::BadRequest(format!(
            "unsupported cargogitarchive path '{}'",
            request.url.path()
        )));
    }

    let names = cargo_index::parse_package_names(request.header("x-package-names"))?;
    let body = cargo_index::build_git_archive(&state.client, hash, &names).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/x-tar"),
    );
    Ok(UpstreamResponse {
        status: StatusCode::OK,
        headers,
        body,
    })
}
