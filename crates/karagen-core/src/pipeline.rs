//! The generation run: load inputs, build prompts, call the model, write files.

use std::path::PathBuf;

use chrono::Utc;

use crate::{
    diff::DiffDocument,
    error::Result,
    generator::Generator,
    openapi::OpenApiContext,
    output::{FeatureWriter, Layout},
    prompt::{build_prompt, PromptTemplate},
};

/// Inputs and switches for one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// OpenAPI document (YAML or JSON)
    pub spec_path: PathBuf,
    /// oasdiff-style JSON
    pub diff_path: PathBuf,
    /// Directory that receives the feature files
    pub out_dir: PathBuf,
    pub layout: Layout,
    /// Print instead of writing
    pub dry_run: bool,
    /// Append a UTC timestamp to file names
    pub timestamp: bool,
    /// Tera template replacing the built-in prompt
    pub prompt_file: Option<PathBuf>,
}

impl RunOptions {
    pub fn new(
        spec_path: impl Into<PathBuf>,
        diff_path: impl Into<PathBuf>,
        out_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            spec_path: spec_path.into(),
            diff_path: diff_path.into(),
            out_dir: out_dir.into(),
            layout: Layout::default(),
            dry_run: false,
            timestamp: false,
            prompt_file: None,
        }
    }
}

/// A unit whose generation failed while the run carried on
#[derive(Debug, Clone, PartialEq)]
pub struct UnitFailure {
    pub unit: String,
    pub error: String,
}

/// Outcome of a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Number of added endpoints found in the diff
    pub endpoints: usize,
    /// Files written (or, in dry-run mode, that would have been written)
    pub written: Vec<PathBuf>,
    pub failures: Vec<UnitFailure>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Main entry point for feature generation.
///
/// Unreadable or malformed inputs abort the run. A diff without added
/// endpoints returns an empty report before the generator is touched. With
/// the per-group and per-endpoint layouts a failed generation is recorded and
/// the remaining units still run; with the combined layout it is an error.
pub async fn run<G: Generator>(options: &RunOptions, generator: &G) -> Result<RunReport> {
    // 1. Load inputs
    let spec = OpenApiContext::from_file(&options.spec_path).await?;
    log::debug!(
        "Loaded spec {} ({} {})",
        options.spec_path.display(),
        spec.title().unwrap_or("untitled"),
        spec.version().unwrap_or("")
    );
    let diff = DiffDocument::from_file(&options.diff_path).await?;

    // 2. Extract added endpoints
    let endpoints = diff.added_endpoints(&spec);
    let mut report = RunReport {
        endpoints: endpoints.len(),
        ..RunReport::default()
    };
    if endpoints.is_empty() {
        log::info!("No new endpoints in {}", options.diff_path.display());
        return Ok(report);
    }

    let template = match &options.prompt_file {
        Some(path) => Some(PromptTemplate::from_file(path).await?),
        None => None,
    };

    let mut writer = FeatureWriter::new(&options.out_dir, options.dry_run);
    if options.timestamp {
        writer = writer.with_timestamp(Utc::now());
    }

    // 3. Generate one file per unit
    let units = options.layout.units(&endpoints);
    log::info!(
        "Generating {} feature file(s) for {} endpoint(s) ({} layout)",
        units.len(),
        endpoints.len(),
        options.layout
    );

    for unit in units {
        let prompt = build_prompt(spec.raw(), &unit.endpoints, template.as_ref())?;
        log::debug!("Prompt for {}:\n{}", unit.label, prompt);

        let text = match generator.generate(&prompt).await {
            Ok(text) => text,
            Err(e) if options.layout != Layout::Combined => {
                log::error!("Generation failed for {}: {}", unit.label, e);
                report.failures.push(UnitFailure {
                    unit: unit.label.clone(),
                    error: e.to_string(),
                });
                continue;
            }
            Err(e) => return Err(e),
        };

        let path = writer.write(&unit.file_stem, &text).await?;
        report.written.push(path);
    }

    Ok(report)
}
