//! Vision LLM extraction.
//!
//! The model is shown the page images and forced to call a single tool whose
//! input schema matches the result type. The tool input is the extraction.

pub mod anthropic;
pub mod openai;

#[cfg(test)]
mod test_server;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, instrument};

use crate::base::{
    config::{Config, LlmProvider},
    prompts::build_risk_of_bias_prompt,
    tools::{ToolSpec, forest_plot_tool, risk_of_bias_tool},
    types::{BiasStudiesData, ForestPlotData, PageImage, Res},
};

// Traits.

/// Generic LLM client trait that clients must implement.
///
/// This trait defines the core functionality for interacting with vision models.
/// Implementing this trait allows different LLM providers to be used with the parser.
#[async_trait]
pub trait GenericLlmClient: Send + Sync + 'static {
    /// Run a forced tool call over the given images.
    ///
    /// The request is a single user turn holding every image, in order,
    /// followed by the prompt. The model must call `tool`; its input is
    /// returned as-is.
    async fn extract(&self, images: &[PageImage], prompt: &str, tool: &ToolSpec) -> Res<Value>;
}

// Structs.

/// LLM client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct LlmClient {
    inner: Arc<dyn GenericLlmClient>,
}

impl Deref for LlmClient {
    type Target = dyn GenericLlmClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl LlmClient {
    pub fn new(inner: Arc<dyn GenericLlmClient>) -> Self {
        Self { inner }
    }

    /// Create the client for the configured provider.
    pub fn from_config(config: &Config) -> Res<Self> {
        match config.llm_provider {
            LlmProvider::Anthropic => LlmClient::anthropic(config),
            LlmProvider::OpenAi => Ok(LlmClient::openai(config)),
        }
    }

    /// Extract forest plot statistics from the page images.
    #[instrument(name = "LlmClient::parse_forest_plot", skip_all, fields(images = images.len()))]
    pub async fn parse_forest_plot(&self, images: &[PageImage], directive: &str) -> Res<ForestPlotData> {
        let data: ForestPlotData = self.extract_typed(images, directive, forest_plot_tool()).await?;

        info!("Forest plot has {} studies.", data.studies.len());

        Ok(data)
    }

    /// Extract risk of bias classifications for the given studies.
    #[instrument(name = "LlmClient::parse_risk_of_bias", skip_all, fields(images = images.len(), studies = study_titles.len()))]
    pub async fn parse_risk_of_bias(&self, images: &[PageImage], directive: &str, study_titles: &[String]) -> Res<BiasStudiesData> {
        let prompt = build_risk_of_bias_prompt(directive, study_titles);
        let data: BiasStudiesData = self.extract_typed(images, &prompt, risk_of_bias_tool()).await?;

        info!("Risk of bias graph has {} studies.", data.bias_studies.len());

        Ok(data)
    }

    async fn extract_typed<T: DeserializeOwned>(&self, images: &[PageImage], prompt: &str, tool: &ToolSpec) -> Res<T> {
        let input = self.extract(images, prompt, tool).await?;

        serde_json::from_value(input).map_err(|e| anyhow::anyhow!("Tool `{}` returned malformed input: {e}", tool.name))
    }
}

/// Error raised when the model answers without calling the tool.
pub fn missing_tool_call() -> anyhow::Error {
    anyhow::anyhow!("LLM did not return tool response")
}
