//! Endpoint descriptors and base-path grouping.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::openapi::OpenApiContext;

static PATH_PARAM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[^/}]*\}").unwrap());

/// A newly added operation, as described to the model
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Path template as written in the spec (e.g. "/pets/{petId}")
    pub path: String,
    /// Upper-cased HTTP method
    pub method: String,
    /// Summary or description; empty when neither the diff nor the spec has one
    pub summary: String,
}

impl Endpoint {
    pub fn new(
        path: impl Into<String>,
        method: impl AsRef<str>,
        summary: Option<String>,
    ) -> Self {
        Self {
            path: path.into(),
            method: method.as_ref().trim().to_ascii_uppercase(),
            summary: summary.unwrap_or_default(),
        }
    }

    /// `METHOD path`, the form embedded in prompts
    pub fn signature(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    /// Path prefix before the first `{parameter}` segment.
    ///
    /// `/pets/{id}/toys` groups under `/pets`; a path whose first segment is
    /// a parameter groups under `/`.
    pub fn base_path(&self) -> String {
        let segments: Vec<&str> = self
            .path
            .split('/')
            .take_while(|segment| !PATH_PARAM.is_match(segment))
            .filter(|segment| !segment.is_empty())
            .collect();
        format!("/{}", segments.join("/"))
    }

    /// File stem for a per-endpoint feature file, e.g. `get_pets_petid`
    pub fn file_stem(&self) -> String {
        slug(&format!("{}_{}", self.method, self.path))
    }
}

/// Partition endpoints by base path.
///
/// Every endpoint lands in exactly one group; order inside a group follows
/// the input order.
pub fn group_by_base_path(endpoints: &[Endpoint]) -> BTreeMap<String, Vec<Endpoint>> {
    let mut groups: BTreeMap<String, Vec<Endpoint>> = BTreeMap::new();
    for endpoint in endpoints {
        groups
            .entry(endpoint.base_path())
            .or_default()
            .push(endpoint.clone());
    }
    groups
}

/// Lower-cased, filesystem-safe name with runs of `_` collapsed.
/// An input with no usable characters becomes `root`.
pub fn slug(name: &str) -> String {
    let sanitized = OpenApiContext::sanitize_filename(name).to_ascii_lowercase();
    let collapsed = sanitized
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    if collapsed.is_empty() {
        "root".to_string()
    } else {
        collapsed
    }
}
