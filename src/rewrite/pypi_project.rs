//! Rewrites a PyPI project JSON document (`/pypi/<name>/json`) so it
//! reflects upstream state as of a target instant: release files uploaded
//! after the target are dropped, releases left with no surviving files
//! disappear entirely, and `info` is replaced with whatever the
//! version-specific endpoint reports for the "latest" surviving release.
//!
//! Recognized by the presence of a top-level `releases` key.

use serde_json::Value;
use std::future::Future;
use time::{Duration, OffsetDateTime};

use crate::error::ProxyError;
use crate::time_util;

pub fn recognizes(doc: &Value) -> bool {
    doc.get("releases").is_some()
}

/// `fetch_version_doc` retrieves `/pypi/<project>/<tag>/json` for the
/// winning tag; the rewriter only needs its `info` object.
pub async fn rewrite<F, Fut>(
    original: Value,
    target: OffsetDateTime,
    fetch_version_doc: F,
) -> Result<Value, ProxyError>
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<Value, ProxyError>>,
{
    let releases = original
        .get("releases")
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| ProxyError::Rewrite("PyPI document missing 'releases' object".to_string()))?;

    // Inclusive at second granularity: a file uploaded exactly at `target`
    // survives.
    let cutoff = target + Duration::seconds(1);

    let mut surviving = serde_json::Map::new();
    let mut first_seen: Vec<(String, OffsetDateTime)> = Vec::new();

    for (tag, files) in releases {
        let files = files.as_array().cloned().unwrap_or_default();
        let mut retained = Vec::new();
        let mut earliest: Option<OffsetDateTime> = None;

        for file in files {
            let Some(ts_str) = file.get("upload_time_iso_8601").and_then(Value::as_str) else {
                continue;
            };
            let Ok(ts) = time_util::parse(ts_str) else {
                continue;
            };
            if ts < cutoff {
                if earliest.is_none_or(|e| ts < e) {
                    earliest = Some(ts);
                }
                retained.push(file);
            }
        }

        if let Some(earliest) = earliest {
            surviving.insert(tag.clone(), Value::Array(retained));
            first_seen.push((tag, earliest));
        }
    }

    // Among surviving tags, the one whose earliest *retained* file is most
    // recent wins, even if another tag's true earliest upload was earlier
    // overall (spec.md §9: firstSeen is relative to retained files only).
    let mut latest_tag = first_seen
        .iter()
        .max_by_key(|(_, ts)| *ts)
        .map(|(tag, _)| tag.clone());

    // If every release was filtered away entirely, fall back to the
    // project's nominal latest version so the merge-in fetch still has a
    // target — mirroring the documented asymmetry with the npm rewriter,
    // which fails hard instead of emptying out.
    if latest_tag.is_none() {
        latest_tag = original
            .get("info")
            .and_then(|info| info.get("version"))
            .and_then(Value::as_str)
            .map(str::to_string);
    }

    let mut doc = original;
    let obj = doc.as_object_mut().expect("checked above");
    obj.insert("releases".to_string(), Value::Object(surviving));

    let Some(latest_tag) = latest_tag else {
        return Err(ProxyError::Rewrite(
            "no PyPI release exists at or before the target instant and no fallback version is available"
                .to_string(),
        ));
    };

    let version_doc = fetch_version_doc(latest_tag).await?;
    let latest_info = version_doc
        .get("info")
        .cloned()
        .ok_or_else(|| ProxyError::Rewrite("version-specific document missing 'info'".to_string()))?;
    obj.insert("info".to_string(), latest_info);

    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn target(s: &str) -> OffsetDateTime {
        time_util::parse(s).unwrap()
    }

    #[tokio::test]
    async fn drops_future_files_and_empties_releases_with_no_survivors() {
        let doc = json!({
            "info": {"name": "app", "version": "9.9.9"},
            "releases": {
                "1.0.0": [{"upload_time_iso_8601": "2023-01-01T00:00:00Z"}],
                "2.0.0": [{"upload_time_iso_8601": "2024-01-01T00:00:00Z"}],
            },
        });

        let result = rewrite(doc, target("2022-01-01T00:00:00Z"), |tag| async move {
            Ok(json!({"info": {"name": "app", "version": tag}}))
        })
        .await
        .unwrap();

        assert_eq!(result["releases"], json!({}));
        assert_eq!(result["info"]["version"], "9.9.9");
    }

    #[tokio::test]
    async fn retains_files_at_or_before_target_and_merges_latest_info() {
        let doc = json!({
            "info": {"name": "app", "version": "0.0.0"},
            "releases": {
                "1.0.0": [{"upload_time_iso_8601": "2021-01-01T00:00:00Z"}],
                "2.0.0": [{"upload_time_iso_8601": "2022-06-01T00:00:00Z"}],
            },
        });

        let result = rewrite(doc, target("2022-01-01T00:00:00Z"), |tag| async move {
            Ok(json!({"info": {"name": "app", "version": tag, "summary": "merged"}}))
        })
        .await
        .unwrap();

        assert!(result["releases"].get("2.0.0").is_none());
        assert!(result["releases"].get("1.0.0").is_some());
        assert_eq!(result["info"]["version"], "1.0.0");
        assert_eq!(result["info"]["summary"], "merged");
    }

    #[tokio::test]
    async fn a_failing_fallback_fetch_propagates_as_a_rewrite_error() {
        let doc = json!({
            "info": {"name": "app", "version": "1.0.0"},
            "releases": {
                "1.0.0": [{"upload_time_iso_8601": "2021-01-01T00:00:00Z"}],
            },
        });

        let err = rewrite(doc, target("2022-01-01T00:00:00Z"), |_tag| async move {
            Err(ProxyError::Transport("upstream down".to_string()))
        })
        .await
        .unwrap_err();

        assert_eq!(err.status(), 502);
    }

    #[test]
    fn recognizes_documents_with_a_releases_field() {
        assert!(recognizes(&json!({"releases": {}})));
        assert!(!recognizes(&json!({"time": {}})));
    }
}
