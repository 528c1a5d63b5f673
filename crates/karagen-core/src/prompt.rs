//! Prompt construction.
//!
//! Prompts are rendered with Tera. The built-in template asks for Karate
//! feature files covering the listed endpoints; a custom template can be
//! supplied with `--prompt-file` and sees the same context:
//!
//! * `spec`: the OpenAPI document text
//! * `endpoints`: list of `{path, method, summary}`
//! * `endpoint_list`: the endpoints pre-rendered as a bullet list

use std::path::Path;

use serde_json::json;
use tera::{Context, Tera};
use tokio::fs;

use crate::endpoint::Endpoint;
use crate::Result;

/// Built-in prompt
pub const DEFAULT_TEMPLATE: &str = r#"You are an expert in Karate API testing.
Here is the OpenAPI spec:
{{ spec }}

The new endpoints introduced are:
{{ endpoint_list }}

Generate Karate .feature tests with basic validations for these endpoints.
Cover the success path and at least one negative case per endpoint.
Return only the contents of the .feature file, without Markdown fences or commentary.
"#;

/// A user-supplied prompt template
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    source: String,
}

impl PromptTemplate {
    /// Compile-check and wrap template text
    pub fn new(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let mut tera = Tera::default();
        tera.add_raw_template("prompt", &source)?;
        Ok(Self { source })
    }

    /// Load a template file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = fs::read_to_string(path.as_ref()).await?;
        Self::new(source)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Render the bullet list used for `endpoint_list`
pub fn endpoint_list(endpoints: &[Endpoint]) -> String {
    endpoints
        .iter()
        .map(|e| {
            if e.summary.is_empty() {
                format!("- {}", e.signature())
            } else {
                format!("- {}: {}", e.signature(), e.summary)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the prompt for one batch of endpoints.
///
/// The result always names every endpoint as `METHOD path`; when a custom
/// template leaves some out, the endpoint list is appended.
pub fn build_prompt(
    spec_text: &str,
    endpoints: &[Endpoint],
    template: Option<&PromptTemplate>,
) -> Result<String> {
    let list = endpoint_list(endpoints);

    let mut context = Context::new();
    context.insert("spec", spec_text.trim_end());
    context.insert("endpoints", &json!(endpoints));
    context.insert("endpoint_list", &list);

    let source = template.map(PromptTemplate::as_str).unwrap_or(DEFAULT_TEMPLATE);
    let mut prompt = Tera::one_off(source, &context, false)?;

    let missing = endpoints
        .iter()
        .any(|e| !prompt.contains(&e.signature()));
    if missing {
        log::debug!("Prompt template omits some endpoints; appending the endpoint list");
        if !prompt.ends_with('\n') {
            prompt.push('\n');
        }
        prompt.push_str("\nThe new endpoints introduced are:\n");
        prompt.push_str(&list);
        prompt.push('\n');
    }

    Ok(prompt)
}
