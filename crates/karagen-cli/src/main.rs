//! karagen CLI entrypoint
//! Parses command-line arguments, checks the API credential and runs the generator.

// Internal imports (std, crate)
use std::path::PathBuf;

// External imports (alphabetized)
use anyhow::Context;
use clap::Parser;
use karagen_core::{
    ApiKey, ChatCompletionsClient, Config, Layout, Provider, RetryPolicy, Retrying, RunOptions,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "karagen")]
#[command(author, version, about = "Generate Karate tests from an OpenAPI spec and an oasdiff report", long_about = None)]
struct Cli {
    /// Path to the OpenAPI spec (.yml/.json)
    #[arg(long)]
    spec: PathBuf,
    /// Path to the oasdiff JSON file
    #[arg(long)]
    diff: PathBuf,
    /// Output directory for the .feature files
    #[arg(long)]
    out: PathBuf,
    /// Do not write files, just print what would be written
    #[arg(long)]
    dry: bool,
    /// Print debug information
    #[arg(long)]
    verbose: bool,
    /// Tera template replacing the built-in prompt
    #[arg(long)]
    prompt_file: Option<PathBuf>,
    /// How endpoints are split into feature files
    #[arg(long, value_enum)]
    layout: Option<Layout>,
    /// Completion provider
    #[arg(long, value_enum)]
    provider: Option<Provider>,
    /// Model name (defaults to the provider's model)
    #[arg(long)]
    model: Option<String>,
    /// Base URL of an OpenAI-compatible API
    #[arg(long)]
    base_url: Option<Url>,
    /// Retries after a failed completion request (0 disables retrying)
    #[arg(long)]
    retries: Option<u32>,
    /// Append a UTC timestamp to output file names
    #[arg(long)]
    timestamp: bool,
    /// Configuration file (YAML or TOML); defaults to ./karagen.yaml or ~/.karagen/karagen.yaml
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    /// Flags take precedence over the config file
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(provider) = self.provider {
            if provider != config.provider {
                // Provider-specific settings from the file no longer apply
                config.api_key_env = None;
                config.model = None;
                config.base_url = None;
            }
            config.provider = provider;
        }
        if let Some(model) = &self.model {
            config.model = Some(model.clone());
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = Some(base_url.clone());
        }
        if let Some(layout) = self.layout {
            config.layout = layout;
        }
        if let Some(retries) = self.retries {
            config.retry.max_attempts = retries.saturating_add(1);
        }
        if self.timestamp {
            config.timestamp = true;
        }
    }

    fn run_options(&self, config: &Config) -> RunOptions {
        RunOptions {
            spec_path: self.spec.clone(),
            diff_path: self.diff.clone(),
            out_dir: self.out.clone(),
            layout: config.layout,
            dry_run: self.dry,
            timestamp: config.timestamp,
            prompt_file: self.prompt_file.clone(),
        }
    }
}

fn init_logging(verbose: bool) {
    let default_directive = if verbose {
        "karagen=debug,karagen_core=debug"
    } else {
        "karagen=info,karagen_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .await
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::discover().await.context("Failed to load config")?,
    };
    cli.apply_overrides(&mut config);

    // The credential is checked before any input file is opened
    let api_key_env = config.api_key_env();
    let api_key = ApiKey::from_env(&api_key_env)?;
    debug!(provider = %config.provider, model = %config.model(), "Using completion provider");

    let client = ChatCompletionsClient::from_config(&config, api_key)
        .context("Failed to create completion client")?;
    let policy = if config.retry.max_attempts > 1 {
        config.retry.clone()
    } else {
        RetryPolicy::none()
    };
    let generator = Retrying::new(client, policy);

    let options = cli.run_options(&config);
    let report = karagen_core::run(&options, &generator)
        .await
        .context("Feature generation failed")?;

    if report.endpoints == 0 {
        info!("No new endpoints found in diff; nothing to generate");
        return Ok(());
    }

    for path in &report.written {
        if cli.dry {
            info!("Would write {}", path.display());
        } else {
            info!("Wrote {}", path.display());
        }
    }

    if !report.is_success() {
        for failure in &report.failures {
            warn!(unit = %failure.unit, "{}", failure.error);
        }
        anyhow::bail!(
            "{} of {} feature file(s) could not be generated",
            report.failures.len(),
            report.failures.len() + report.written.len()
        );
    }

    println!(
        "✅ Generated {} feature file(s) for {} endpoint(s) in {}",
        report.written.len(),
        report.endpoints,
        options.out_dir.display()
    );
    Ok(())
}
