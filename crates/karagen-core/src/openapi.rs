//! OpenAPI specification loading and lookups.
//!
//! The document is consumed read-only: it is embedded verbatim in the prompt
//! and queried for operation summaries when the diff does not carry them.
//!
//! # Examples
//!
//! ```no_run
//! use karagen_core::openapi::OpenApiContext;
//! use karagen_core::error::Result;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let spec = OpenApiContext::from_file("openapi/base.yml").await?;
//!
//! if let Some(title) = spec.title() {
//!     println!("API Title: {}", title);
//! }
//! println!("{:?}", spec.operation_summary("/pets", "get"));
//! # Ok(())
//! # }
//! ```

// Internal imports (std, crate)
use std::path::Path;

use crate::Error;

// External imports (alphabetized)
use serde_json::Value as JsonValue;
use tokio::fs;

/// HTTP methods that may appear as keys of an OpenAPI path item
pub const HTTP_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Represents an OpenAPI specification
#[derive(Debug, Clone)]
pub struct OpenApiContext {
    /// The parsed document (YAML is normalized to JSON values)
    pub json: JsonValue,
    /// The document text exactly as read
    raw: String,
}

impl OpenApiContext {
    /// Load an OpenAPI document from a file (supports both YAML and JSON)
    pub async fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await?;
        Self::parse_content(&content).map_err(|e| {
            Error::openapi(format!(
                "Failed to parse OpenAPI spec at {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Parse content as either JSON or YAML
    pub fn parse_content(content: &str) -> Result<Self, String> {
        let json = if let Ok(json) = serde_json::from_str::<JsonValue>(content) {
            json
        } else if let Ok(json) = serde_yaml::from_str::<JsonValue>(content) {
            json
        } else {
            return Err("content is neither valid JSON nor YAML".to_string());
        };

        if !json.is_object() {
            return Err("document root is not a mapping".to_string());
        }

        Ok(Self {
            json,
            raw: content.to_string(),
        })
    }

    /// Get a reference to the parsed document
    pub fn as_json(&self) -> &JsonValue {
        &self.json
    }

    /// The document text as it was read from disk
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Get the title of the API
    pub fn title(&self) -> Option<&str> {
        self.json.get("info")?.get("title")?.as_str()
    }

    /// Get the version of the API
    pub fn version(&self) -> Option<&str> {
        self.json.get("info")?.get("version")?.as_str()
    }

    /// Get the base URL of the API
    pub fn base_path(&self) -> Option<String> {
        // OpenAPI 3.x servers
        if let Some(url) = self
            .json
            .get("servers")
            .and_then(JsonValue::as_array)
            .and_then(|servers| servers.first())
            .and_then(|server| server.get("url"))
            .and_then(JsonValue::as_str)
        {
            return Some(url.to_string());
        }

        // Swagger 2.0 host + basePath
        let host = self.json.get("host").and_then(JsonValue::as_str)?;
        let base_path = self
            .json
            .get("basePath")
            .and_then(JsonValue::as_str)
            .unwrap_or("");
        let scheme = match self.json.get("schemes").and_then(JsonValue::as_array) {
            Some(schemes) if schemes.iter().any(|s| s.as_str() == Some("https")) => "https",
            Some(schemes) => schemes
                .first()
                .and_then(JsonValue::as_str)
                .unwrap_or("https"),
            None => "https",
        };
        Some(format!("{}://{}{}", scheme, host, base_path))
    }

    /// Methods declared for `path`, upper-cased, in document order
    pub fn methods_for_path(&self, path: &str) -> Vec<String> {
        self.path_item(path)
            .and_then(JsonValue::as_object)
            .map(|item| {
                item.keys()
                    .filter(|k| HTTP_METHODS.contains(&k.to_ascii_lowercase().as_str()))
                    .map(|k| k.to_ascii_uppercase())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Summary of an operation, falling back to its description
    pub fn operation_summary(&self, path: &str, method: &str) -> Option<String> {
        let item = self.path_item(path)?.as_object()?;
        let operation = item
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(method))
            .map(|(_, v)| v)?;

        ["summary", "description"]
            .iter()
            .filter_map(|key| operation.get(*key).and_then(JsonValue::as_str))
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(String::from)
    }

    fn path_item(&self, path: &str) -> Option<&JsonValue> {
        self.json.get("paths")?.get(path)
    }

    /// Sanitize a string to be safe for use as a filename across all operating systems
    /// Replaces any non-alphanumeric characters with underscores
    pub fn sanitize_filename(name: &str) -> String {
        name.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}
