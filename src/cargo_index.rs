//! `cargosparse` and `cargogitarchive` subhandlers: cargo's sparse-index
//! protocol speaks plain HTTP, so most of it is satisfied with local
//! replies and commit-pinned redirects rather than content rewriting.
//! Grounded on the `{"dl", "api"}` config shape and `<aa>/<bb>/<name>`
//! index-path convention documented by cargo's own sparse-registry
//! client.

use std::sync::Arc;

use http::StatusCode;
use url::Url;

use crate::client::HttpClient;
use crate::error::ProxyError;
use crate::http_types::{UpstreamRequest, UpstreamResponse};

const INDEX_BASE: &str = "https://raw.githubusercontent.com/rust-lang/crates.io-index";

pub fn config_json() -> UpstreamResponse {
    UpstreamResponse::json(
        StatusCode::OK,
        &serde_json::json!({
            "dl": "https://static.crates.io/crates",
            "api": "/",
        }),
    )
}

pub fn sparse_redirect(commit_hash: &str, path: &str) -> UpstreamResponse {
    let path = path.trim_start_matches('/');
    UpstreamResponse::redirect(&format!("{INDEX_BASE}/{commit_hash}/{path}"))
}

/// A crate's path within the sparse index: 1/2/3-letter names get their
/// own depth-1 or depth-1-with-first-letter buckets, everything else is
/// bucketed by its first four (lowercased) characters.
pub fn sparse_index_path(name: &str) -> String {
    let lower = name.to_lowercase();
    match lower.len() {
        0 => lower,
        1 => format!("1/{lower}"),
        2 => format!("2/{lower}"),
        3 => format!("3/{}/{lower}", &lower[..1]),
        _ => format!("{}/{}/{lower}", &lower[..2], &lower[2..4]),
    }
}

/// Fetch each name's index blob at `commit_hash` and assemble them into a
/// tar stream at their sparse-index paths.
pub async fn build_git_archive(
    client: &Arc<dyn HttpClient>,
    commit_hash: &str,
    names: &[String],
) -> Result<Vec<u8>, ProxyError> {
    let mut builder = tar::Builder::new(Vec::new());

    for name in names {
        let path = sparse_index_path(name);
        let url = format!("{INDEX_BASE}/{commit_hash}/{path}");
        let url = Url::parse(&url).map_err(|e| ProxyError::Transport(format!("bad index url: {e}")))?;
        let response = client.execute(UpstreamRequest::get(url)).await?;

        if !response.status.is_success() {
            return Err(ProxyError::Transport(format!(
                "failed to fetch index blob for '{name}': upstream status {}",
                response.status
            )));
        }

        let mut header = tar::Header::new_gnu();
        header.set_size(response.body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, &path, response.body.as_slice())
            .map_err(|e| ProxyError::Serialize(format!("failed to append '{path}' to tar: {e}")))?;
    }

    builder
        .into_inner()
        .map_err(|e| ProxyError::Serialize(format!("failed to finalize tar stream: {e}")))
}

/// Parse the comma-separated `X-Package-Names` header required by
/// `cargogitarchive`.
pub fn parse_package_names(header_value: Option<&str>) -> Result<Vec<String>, ProxyError> {
    let value = header_value
        .ok_or_else(|| ProxyError::BadRequest("missing X-Package-Names header".to_string()))?;
    let names: Vec<String> = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if names.is_empty() {
        return Err(ProxyError::BadRequest("X-Package-Names header is empty".to_string()));
    }
    Ok(names)
}
