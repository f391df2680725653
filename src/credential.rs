//! Parsing of the per-request temporal credential carried in HTTP Basic auth.
//!
//! Package-manager clients have no awareness of this proxy, so the warp
//! target and the platform dialect are smuggled in through the URL userinfo
//! (`http://npm:2015-05-13T10:31:26Z@localhost:PORT/`), which reqwest and
//! every other HTTP client already knows how to send as `Authorization:
//! Basic ...`.

use percent_encoding::percent_decode_str;
use std::fmt;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::ProxyError;

/// Earliest warp instant we'll accept. Registries the proxy understands
/// did not exist before this date.
const MIN_WARP_YEAR_2000: i64 = 946_684_800;

/// How far into the future a warp instant may reach, to absorb clock skew
/// between the caller and this proxy.
const MAX_FUTURE_SKEW_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Npm,
    Pypi,
    CargoSparse,
    CargoGitArchive,
}

impl Platform {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "npm" => Some(Platform::Npm),
            "pypi" => Some(Platform::Pypi),
            "cargosparse" => Some(Platform::CargoSparse),
            "cargogitarchive" => Some(Platform::CargoGitArchive),
            _ => None,
        }
    }

    /// Whether this platform's secret is a target instant (as opposed to a
    /// commit hash).
    fn is_time_based(self) -> bool {
        matches!(self, Platform::Npm | Platform::Pypi)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Platform::Npm => "npm",
            Platform::Pypi => "pypi",
            Platform::CargoSparse => "cargosparse",
            Platform::CargoGitArchive => "cargogitarchive",
        };
        write!(f, "{s}")
    }
}

/// The decoded `(platform, secret)` pair extracted from a request's Basic
/// auth. `secret` is either a warp instant or a commit hash, depending on
/// the platform.
#[derive(Debug, Clone)]
pub enum TemporalCredential {
    Warp {
        platform: Platform,
        instant: OffsetDateTime,
    },
    Commit {
        platform: Platform,
        hash: String,
    },
}

impl TemporalCredential {
    pub fn platform(&self) -> Platform {
        match self {
            TemporalCredential::Warp { platform, .. } => *platform,
            TemporalCredential::Commit { platform, .. } => *platform,
        }
    }

    /// Parse a `username:password` pair out of an HTTP Basic `Authorization`
    /// header value (already base64-decoded, as `user:pass`).
    pub fn parse(username: &str, password: &str) -> Result<Self, ProxyError> {
        let platform = Platform::from_tag(username)
            .ok_or_else(|| ProxyError::BadCredential(format!("unknown platform '{username}'")))?;

        let secret = decode_if_percent_encoded(password);

        if platform.is_time_based() {
            let instant = parse_warp_instant(&secret)?;
            Ok(TemporalCredential::Warp { platform, instant })
        } else {
            let hash = parse_commit_hash(&secret)?;
            Ok(TemporalCredential::Commit { platform, hash })
        }
    }
}

/// Decode the secret only if it actually looks percent-encoded, i.e.
/// decoding changes it. Never double-decode.
fn decode_if_percent_encoded(secret: &str) -> String {
    let decoded = percent_decode_str(secret).decode_utf8_lossy();
    if decoded.as_ref() != secret {
        decoded.into_owned()
    } else {
        secret.to_string()
    }
}

fn parse_warp_instant(secret: &str) -> Result<OffsetDateTime, ProxyError> {
    let instant = OffsetDateTime::parse(secret, &Rfc3339)
        .map_err(|e| ProxyError::BadCredential(format!("invalid RFC 3339 timestamp: {e}")))?;

    if instant.unix_timestamp() < MIN_WARP_YEAR_2000 {
        return Err(ProxyError::BadCredential(
            "warp instant predates 2000-01-01".to_string(),
        ));
    }

    let now = OffsetDateTime::now_utc();
    if instant.unix_timestamp() > now.unix_timestamp() + MAX_FUTURE_SKEW_SECS {
        return Err(ProxyError::BadCredential(
            "warp instant is more than 24h in the future".to_string(),
        ));
    }

    Ok(instant)
}

fn parse_commit_hash(secret: &str) -> Result<String, ProxyError> {
    if secret.is_empty() || secret.len() > 40 || secret.len() < 7 {
        return Err(ProxyError::BadCredential(
            "commit hash must be 7 to 40 hex characters".to_string(),
        ));
    }
    if !secret.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ProxyError::BadCredential(
            "commit hash must be hexadecimal".to_string(),
        ));
    }
    Ok(secret.to_string())
}
