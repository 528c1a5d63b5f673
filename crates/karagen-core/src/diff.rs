//! Diff document parsing.
//!
//! Reads the JSON produced by `oasdiff`-style tools and turns it into the
//! list of newly added endpoints. Several shapes are accepted because the
//! tool's output differs between its `diff` and `breaking` commands and
//! hand-written diffs tend to be plain path mappings:
//!
//! * `{"endpoints": {"added": [{"method": "GET", "path": "/pets"}]}}`
//! * `{"paths": {"added": {...} | [...], "modified": {"/p": {"operations": {"added": [...]}}}}}`
//! * `{"added": {"/pets": ["get", "post"]}}` or the same mapping at the root
//! * `[{"operation": "GET", "path": "/pets", "text": "..."}]` or `["GET /pets", "/users"]`
//!
//! A path listed without a method expands to every operation the OpenAPI
//! document declares for it.

use std::path::Path;

use serde_json::{Map, Value as JsonValue};
use tokio::fs;

use crate::endpoint::Endpoint;
use crate::openapi::{OpenApiContext, HTTP_METHODS};
use crate::{Error, Result};

/// A parsed diff document
#[derive(Debug, Clone)]
pub struct DiffDocument {
    json: JsonValue,
}

/// One addition as found in the document, before expansion against the spec
#[derive(Debug, Clone, PartialEq)]
struct Addition {
    path: String,
    method: Option<String>,
    summary: Option<String>,
}

impl Addition {
    fn new(path: &str, method: Option<&str>, summary: Option<String>) -> Self {
        Self {
            path: path.trim().to_string(),
            method: method.map(|m| m.trim().to_ascii_uppercase()),
            summary,
        }
    }
}

impl DiffDocument {
    /// Load a diff document from a JSON file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await?;
        Self::parse_str(&content).map_err(|e| {
            Error::diff(format!(
                "Failed to parse diff document at {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Parse a diff document from JSON text
    pub fn parse_str(content: &str) -> Result<Self> {
        let json: JsonValue = serde_json::from_str(content)?;
        match json {
            JsonValue::Object(_) | JsonValue::Array(_) => Ok(Self { json }),
            _ => Err(Error::diff("document root must be an object or an array")),
        }
    }

    /// Get a reference to the raw JSON value
    pub fn as_json(&self) -> &JsonValue {
        &self.json
    }

    /// Newly added endpoints, one per distinct method and path.
    ///
    /// Summaries come from the diff entry when it carries one, otherwise from
    /// the matching operation in `spec`, otherwise they are empty.
    pub fn added_endpoints(&self, spec: &OpenApiContext) -> Vec<Endpoint> {
        let mut additions = Vec::new();
        match &self.json {
            JsonValue::Array(items) => collect_change_list(items, &mut additions),
            JsonValue::Object(map) => collect_object(map, &mut additions),
            _ => {}
        }

        let mut endpoints: Vec<Endpoint> = Vec::new();
        for addition in additions {
            let methods = match &addition.method {
                Some(method) => vec![method.clone()],
                None => {
                    let declared = spec.methods_for_path(&addition.path);
                    if declared.is_empty() {
                        log::warn!(
                            "Diff lists {} without a method and the spec declares none; skipping",
                            addition.path
                        );
                    }
                    declared
                }
            };

            for method in methods {
                let summary = addition
                    .summary
                    .clone()
                    .or_else(|| spec.operation_summary(&addition.path, &method));

                match endpoints
                    .iter_mut()
                    .find(|e| e.method == method && e.path == addition.path)
                {
                    Some(existing) => {
                        if existing.summary.is_empty() {
                            existing.summary = summary.unwrap_or_default();
                        }
                    }
                    None => endpoints.push(Endpoint::new(addition.path.clone(), &method, summary)),
                }
            }
        }

        log::debug!("Extracted {} added endpoint(s) from diff", endpoints.len());
        endpoints
    }
}

fn collect_object(map: &Map<String, JsonValue>, out: &mut Vec<Addition>) {
    let mut recognised = false;

    if let Some(added) = map.get("endpoints").and_then(|e| e.get("added")) {
        recognised = true;
        if let Some(items) = added.as_array() {
            collect_change_list(items, out);
        }
    }

    if let Some(paths) = map.get("paths").and_then(JsonValue::as_object) {
        recognised = true;
        if let Some(added) = paths.get("added") {
            collect_path_mapping(added, out);
        }
        if let Some(modified) = paths.get("modified").and_then(JsonValue::as_object) {
            for (path, change) in modified {
                if let Some(added_ops) = change.get("operations").and_then(|o| o.get("added")) {
                    collect_methods(path, added_ops, out);
                }
            }
        }
    }

    if recognised {
        return;
    }

    if let Some(added) = map.get("added") {
        collect_path_mapping(added, out);
    } else if map.keys().any(|k| k.starts_with('/')) {
        collect_path_mapping(&JsonValue::Object(map.clone()), out);
    }
}

/// `{"/path": <methods>}` or `["/path", ...]`
fn collect_path_mapping(value: &JsonValue, out: &mut Vec<Addition>) {
    match value {
        JsonValue::Object(paths) => {
            for (path, methods) in paths {
                collect_methods(path, methods, out);
            }
        }
        JsonValue::Array(items) => collect_change_list(items, out),
        _ => {}
    }
}

/// The value attached to a path: a method list, a method map, or nothing usable
fn collect_methods(path: &str, value: &JsonValue, out: &mut Vec<Addition>) {
    match value {
        JsonValue::String(method) => out.push(Addition::new(path, Some(method.as_str()), None)),
        JsonValue::Array(items) => {
            for item in items {
                match item {
                    JsonValue::String(method) => out.push(Addition::new(path, Some(method.as_str()), None)),
                    JsonValue::Object(_) => {
                        let method = item
                            .get("method")
                            .or_else(|| item.get("operation"))
                            .and_then(JsonValue::as_str);
                        out.push(Addition::new(path, method, entry_summary(item)));
                    }
                    _ => {}
                }
            }
        }
        JsonValue::Object(map) => {
            if let Some(added) = map.get("operations").and_then(|o| o.get("added")) {
                collect_methods(path, added, out);
                return;
            }
            let before = out.len();
            for (key, operation) in map {
                if is_http_method(key) {
                    out.push(Addition::new(path, Some(key.as_str()), entry_summary(operation)));
                }
            }
            if out.len() == before {
                out.push(Addition::new(path, None, entry_summary(value)));
            }
        }
        _ => out.push(Addition::new(path, None, None)),
    }
}

/// Flat lists: endpoint objects, breaking-change records, or `"GET /path"` strings
fn collect_change_list(items: &[JsonValue], out: &mut Vec<Addition>) {
    for item in items {
        match item {
            JsonValue::String(line) => {
                let mut parts = line.split_whitespace();
                match (parts.next(), parts.next()) {
                    (Some(method), Some(path)) if is_http_method(method) => {
                        out.push(Addition::new(path, Some(method), None))
                    }
                    (Some(path), _) if path.starts_with('/') => {
                        out.push(Addition::new(path, None, None))
                    }
                    _ => log::warn!("Ignoring unrecognised diff entry: {}", line),
                }
            }
            JsonValue::Object(_) => {
                let Some(path) = item.get("path").and_then(JsonValue::as_str) else {
                    log::warn!("Ignoring diff entry without a path: {}", item);
                    continue;
                };
                let method = item
                    .get("method")
                    .or_else(|| item.get("operation"))
                    .and_then(JsonValue::as_str);
                out.push(Addition::new(path, method, entry_summary(item)));
            }
            _ => {}
        }
    }
}

fn entry_summary(value: &JsonValue) -> Option<String> {
    ["summary", "description", "text"]
        .iter()
        .filter_map(|key| value.get(*key).and_then(JsonValue::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(String::from)
}

fn is_http_method(candidate: &str) -> bool {
    HTTP_METHODS.contains(&candidate.to_ascii_lowercase().as_str())
}
