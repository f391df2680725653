//! Rewrites a PyPI simple-index JSON document (`/simple/<name>/`, PEP 691
//! shape) so it reflects upstream state as of a target instant: files
//! uploaded after the target are dropped, and `versions` is narrowed to
//! those still referenced by a surviving file. Yanked flags and all other
//! file attributes are preserved verbatim.
//!
//! Recognized by the request's URL path shape (`/simple/<name>/`), not by
//! document content, since callers decide to invoke this rewriter before
//! the body is even parsed.

use serde_json::Value;
use time::OffsetDateTime;

use crate::error::ProxyError;
use crate::time_util;

pub fn rewrite(mut doc: Value, target: OffsetDateTime) -> Result<Value, ProxyError> {
    let obj = doc
        .as_object_mut()
        .ok_or_else(|| ProxyError::Rewrite("simple-index document is not a JSON object".to_string()))?;

    let files = obj.get("files").and_then(Value::as_array).cloned().unwrap_or_default();
    let mut retained = Vec::new();
    for file in files {
        let Some(ts_str) = file.get("upload-time").and_then(Value::as_str) else {
            continue;
        };
        let Ok(ts) = time_util::parse(ts_str) else {
            continue;
        };
        if ts <= target {
            retained.push(file);
        }
    }

    let versions = obj.get("versions").and_then(Value::as_array).cloned().unwrap_or_default();
    let retained_versions: Vec<Value> = versions
        .into_iter()
        .filter(|version| {
            let Some(version_str) = version.as_str() else {
                return false;
            };
            retained.iter().any(|file| {
                file.get("filename")
                    .and_then(Value::as_str)
                    .is_some_and(|filename| filename.contains(version_str))
            })
        })
        .collect();

    obj.insert("files".to_string(), Value::Array(retained));
    obj.insert("versions".to_string(), Value::Array(retained_versions));

    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn target(s: &str) -> OffsetDateTime {
        time_util::parse(s).unwrap()
    }

    #[test]
    fn retains_yanked_files_uploaded_before_target() {
        let doc = json!({
            "files": [
                {"filename": "app-0.9.0.tar.gz", "upload-time": "2021-01-01T00:00:00Z", "yanked": true},
                {"filename": "app-2.0.0.tar.gz", "upload-time": "2023-01-01T00:00:00Z", "yanked": false},
            ],
            "versions": ["0.9.0", "2.0.0"],
        });

        let result = rewrite(doc, target("2022-01-01T00:00:00Z")).unwrap();

        assert_eq!(result["files"].as_array().unwrap().len(), 1);
        assert_eq!(result["files"][0]["yanked"], true);
        assert_eq!(result["versions"], json!(["0.9.0"]));
    }

    #[test]
    fn upload_time_exactly_at_target_is_retained() {
        let doc = json!({
            "files": [{"filename": "app-1.0.0.tar.gz", "upload-time": "2022-01-01T00:00:00Z"}],
            "versions": ["1.0.0"],
        });
        let result = rewrite(doc, target("2022-01-01T00:00:00Z")).unwrap();
        assert_eq!(result["files"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn version_with_no_surviving_file_is_dropped() {
        let doc = json!({
            "files": [{"filename": "app-2.0.0.tar.gz", "upload-time": "2023-01-01T00:00:00Z"}],
            "versions": ["2.0.0"],
        });
        let result = rewrite(doc, target("2022-01-01T00:00:00Z")).unwrap();
        assert_eq!(result["versions"], json!([]));
    }

    #[test]
    fn rewrite_of_an_already_consistent_document_is_idempotent() {
        let doc = json!({
            "files": [{"filename": "app-1.0.0.tar.gz", "upload-time": "2021-01-01T00:00:00Z"}],
            "versions": ["1.0.0"],
        });
        let once = rewrite(doc, target("2022-01-01T00:00:00Z")).unwrap();
        let twice = rewrite(once.clone(), target("2022-01-01T00:00:00Z")).unwrap();
        assert_eq!(once, twice);
    }
}
