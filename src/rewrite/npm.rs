//! Rewrites an npm package document so it reflects upstream state as of a
//! target instant: future versions are dropped from `time`/`versions`,
//! `time.modified` and `dist-tags.latest` are recomputed, and the
//! top-level `repository`/`description` are copied from whichever version
//! is now "latest".
//!
//! Recognized by the presence of a top-level `time` key.

use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::error::ProxyError;
use crate::time_util;

pub fn recognizes(doc: &Value) -> bool {
    doc.get("time").is_some()
}

pub fn rewrite(mut doc: Value, target: OffsetDateTime) -> Result<Value, ProxyError> {
    let obj = doc
        .as_object_mut()
        .ok_or_else(|| ProxyError::Rewrite("npm document is not a JSON object".to_string()))?;

    let time_obj = obj
        .get("time")
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| ProxyError::Rewrite("npm document missing 'time' object".to_string()))?;

    if let Some(created) = time_obj.get("created").and_then(Value::as_str) {
        if time_util::parse(created)? > target {
            return Err(ProxyError::Rewrite(
                "package did not yet exist at the target instant".to_string(),
            ));
        }
    }

    let mut latest: Option<(String, OffsetDateTime)> = None;
    let mut future: Vec<String> = Vec::new();

    for (key, value) in &time_obj {
        if key == "created" || key == "modified" {
            continue;
        }
        let Some(ts) = value.as_str().and_then(|s| time_util::parse(s).ok()) else {
            continue;
        };
        if ts > target {
            future.push(key.clone());
        } else if latest.as_ref().is_none_or(|(_, latest_ts)| ts >= *latest_ts) {
            // `>=` so a later key in iteration order wins on an exact tie,
            // matching the upstream source's last-write-wins behavior.
            latest = Some((key.clone(), ts));
        }
    }

    future.sort();

    let (latest_version, latest_ts) = latest.ok_or_else(|| {
        ProxyError::Rewrite("no npm version exists at or before the target instant".to_string())
    })?;

    let (repository, description) = obj
        .get("versions")
        .and_then(Value::as_object)
        .and_then(|versions| versions.get(&latest_version))
        .map(|v| (v.get("repository").cloned(), v.get("description").cloned()))
        .unwrap_or((None, None));

    if let Some(time_mut) = obj.get_mut("time").and_then(Value::as_object_mut) {
        for key in &future {
            time_mut.remove(key);
        }
        time_mut.insert("modified".to_string(), Value::String(time_util::format(latest_ts)?));
    }

    if let Some(versions) = obj.get_mut("versions").and_then(Value::as_object_mut) {
        versions.retain(|key, _| future.binary_search(key).is_err());
    }

    match repository {
        Some(v) => obj.insert("repository".to_string(), v),
        None => obj.remove("repository"),
    };
    match description {
        Some(v) => obj.insert("description".to_string(), v),
        None => obj.remove("description"),
    };

    let mut dist_tags = Map::new();
    dist_tags.insert("latest".to_string(), Value::String(latest_version));
    obj.insert("dist-tags".to_string(), Value::Object(dist_tags));

    Ok(doc)
}
