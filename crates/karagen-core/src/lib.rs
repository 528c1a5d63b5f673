//! karagen Core Library
//!
//! This library turns an OpenAPI document plus an `oasdiff` report into Karate
//! `.feature` files: it extracts the newly added endpoints, builds a prompt
//! describing them and hands it to a text-generation backend, writing the
//! model's answer verbatim.

pub mod config;
pub mod diff;
pub mod endpoint;
pub mod error;
pub mod generator;
pub mod openapi;
pub mod output;
pub mod pipeline;
pub mod prompt;

pub use crate::{
    config::Config,
    diff::DiffDocument,
    endpoint::{group_by_base_path, Endpoint},
    error::{Error, Result},
    generator::{ApiKey, ChatCompletionsClient, Generator, Provider, RetryPolicy, Retrying},
    openapi::OpenApiContext,
    output::{FeatureWriter, Layout},
    pipeline::{run, RunOptions, RunReport, UnitFailure},
    prompt::{build_prompt, PromptTemplate},
};
