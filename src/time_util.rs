//! Shared RFC 3339 parse/format helpers for the registry-content rewriters,
//! which all compare upload/modification timestamps against the warp
//! target. Kept separate from `credential`'s own parsing since that module
//! layers additional acceptance-window validation specific to the warp
//! instant itself.

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::ProxyError;

pub fn parse(value: &str) -> Result<OffsetDateTime, ProxyError> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|e| ProxyError::Rewrite(format!("invalid RFC 3339 timestamp '{value}': {e}")))
}

pub fn format(instant: OffsetDateTime) -> Result<String, ProxyError> {
    instant
        .format(&Rfc3339)
        .map_err(|e| ProxyError::Serialize(format!("failed to format timestamp: {e}")))
}
