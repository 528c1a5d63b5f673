//! Feature file layout and writing.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::endpoint::{group_by_base_path, slug, Endpoint};
use crate::Result;

/// Extension of every generated file
pub const FEATURE_EXTENSION: &str = "feature";

/// File stem used when all endpoints go into one file
pub const COMBINED_STEM: &str = "auto_generated";

/// How endpoints are split across feature files
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    /// One file for the whole diff
    #[default]
    Combined,
    /// One file per base path
    PerGroup,
    /// One file per endpoint
    PerEndpoint,
}

impl Layout {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layout::Combined => "combined",
            Layout::PerGroup => "per-group",
            Layout::PerEndpoint => "per-endpoint",
        }
    }

    /// Split endpoints into generation units, one per output file
    pub fn units(&self, endpoints: &[Endpoint]) -> Vec<Unit> {
        if endpoints.is_empty() {
            return Vec::new();
        }

        let units = match self {
            Layout::Combined => vec![Unit {
                label: "all endpoints".to_string(),
                file_stem: COMBINED_STEM.to_string(),
                endpoints: endpoints.to_vec(),
            }],
            Layout::PerGroup => group_by_base_path(endpoints)
                .into_iter()
                .map(|(base, group)| Unit {
                    file_stem: slug(&base),
                    label: base,
                    endpoints: group,
                })
                .collect(),
            Layout::PerEndpoint => endpoints
                .iter()
                .map(|e| Unit {
                    label: e.signature(),
                    file_stem: e.file_stem(),
                    endpoints: vec![e.clone()],
                })
                .collect(),
        };

        dedupe_stems(units)
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Endpoints that share one prompt and one output file
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    /// Human-readable name for logs and failure reports
    pub label: String,
    /// Output file name without extension
    pub file_stem: String,
    pub endpoints: Vec<Endpoint>,
}

/// Distinct paths can sanitize to the same stem (`/a-b` and `/a_b`)
fn dedupe_stems(mut units: Vec<Unit>) -> Vec<Unit> {
    let mut seen = HashSet::new();
    for unit in &mut units {
        let base = unit.file_stem.clone();
        let mut n = 2;
        while !seen.insert(unit.file_stem.clone()) {
            unit.file_stem = format!("{}_{}", base, n);
            n += 1;
        }
    }
    units
}

/// Writes generated text into the output directory
#[derive(Debug, Clone)]
pub struct FeatureWriter {
    out_dir: PathBuf,
    dry_run: bool,
    suffix: Option<String>,
}

impl FeatureWriter {
    pub fn new(out_dir: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            out_dir: out_dir.into(),
            dry_run,
            suffix: None,
        }
    }

    /// Append `_YYYYmmdd_HHMMSS` to every file name
    pub fn with_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.suffix = Some(at.format("%Y%m%d_%H%M%S").to_string());
        self
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn file_name(&self, stem: &str) -> String {
        match &self.suffix {
            Some(suffix) => format!("{}_{}.{}", stem, suffix, FEATURE_EXTENSION),
            None => format!("{}.{}", stem, FEATURE_EXTENSION),
        }
    }

    /// Write `content` verbatim; in dry-run mode print it instead
    pub async fn write(&self, stem: &str, content: &str) -> Result<PathBuf> {
        let path = self.out_dir.join(self.file_name(stem));

        if self.dry_run {
            println!("--- {} (dry run, not written) ---", path.display());
            println!("{}", content);
            return Ok(path);
        }

        fs::create_dir_all(&self.out_dir).await?;
        fs::write(&path, content).await?;
        log::info!("Wrote {}", path.display());
        Ok(path)
    }
}
