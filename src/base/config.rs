//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, sync::Arc};

use serde::Deserialize;

use crate::base::prompts;

use super::types::{Res, Void};

/// Default object storage bucket holding page images.
fn default_storage_bucket() -> String {
    "reviews".to_string()
}

/// Default table listing page sections.
fn default_pages_table() -> String {
    "review_pages".to_string()
}

/// Default table receiving parsed reviews.
fn default_parsed_reviews_table() -> String {
    "parsed_reviews".to_string()
}

/// Default LLM provider.
fn default_llm_provider() -> LlmProvider {
    LlmProvider::Anthropic
}

/// Default Anthropic API base URL.
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

/// Default Anthropic model to use.
fn default_anthropic_model() -> String {
    "claude-sonnet-4-5".to_string()
}

/// Default OpenAI model to use.
fn default_openai_model() -> String {
    "gpt-4.1".to_string()
}

/// Default max output tokens per extraction.
fn default_llm_max_tokens() -> u32 {
    4096
}

/// Default timeout for a single extraction call.
fn default_llm_timeout_secs() -> u64 {
    120
}

/// Default forest plot directive.
fn default_forest_plot_directive() -> String {
    prompts::FOREST_PLOT_DIRECTIVE.to_string()
}

/// Default risk of bias directive.
fn default_risk_of_bias_directive() -> String {
    prompts::RISK_OF_BIAS_DIRECTIVE.to_string()
}

/// Default address for the HTTP listener.
fn default_listen_address() -> String {
    "0.0.0.0:8000".to_string()
}

/// Which vision LLM performs the extraction.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Anthropic,
    OpenAi,
}

/// Configuration for the review parser.
#[derive(Debug, Clone)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConfigInner {
    /// Backend base URL, e.g. `https://xyz.supabase.co` (`SUPABASE_URL`).
    pub supabase_url: String,
    /// Object storage bucket holding page images (`STORAGE_BUCKET`).
    #[serde(default = "default_storage_bucket")]
    pub storage_bucket: String,
    /// Table listing the image sections of each page (`PAGES_TABLE`).
    #[serde(default = "default_pages_table")]
    pub pages_table: String,
    /// Table receiving parsed reviews, keyed by `review_id` (`PARSED_REVIEWS_TABLE`).
    #[serde(default = "default_parsed_reviews_table")]
    pub parsed_reviews_table: String,
    /// LLM provider, `anthropic` or `openai` (`LLM_PROVIDER`).
    #[serde(default = "default_llm_provider")]
    pub llm_provider: LlmProvider,
    /// Anthropic API key (`ANTHROPIC_API_KEY`).
    #[serde(default)]
    pub anthropic_api_key: String,
    /// Anthropic API base URL (`ANTHROPIC_BASE_URL`).
    #[serde(default = "default_anthropic_base_url")]
    pub anthropic_base_url: String,
    /// Anthropic model to use (`ANTHROPIC_MODEL`).
    #[serde(default = "default_anthropic_model")]
    pub anthropic_model: String,
    /// OpenAI API key (`OPENAI_API_KEY`).
    #[serde(default)]
    pub openai_api_key: String,
    /// Optional OpenAI-compatible API base URL (`OPENAI_BASE_URL`).
    #[serde(default)]
    pub openai_base_url: Option<String>,
    /// OpenAI model to use (`OPENAI_MODEL`).
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    /// Max output tokens for each extraction (`LLM_MAX_TOKENS`).
    #[serde(default = "default_llm_max_tokens")]
    pub llm_max_tokens: u32,
    /// Timeout, in seconds, for each extraction call (`LLM_TIMEOUT_SECS`).
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,
    /// Optional custom forest plot directive to override the default (`FOREST_PLOT_DIRECTIVE`).
    #[serde(default = "default_forest_plot_directive")]
    pub forest_plot_directive: String,
    /// Optional custom risk of bias directive to override the default (`RISK_OF_BIAS_DIRECTIVE`).
    /// The list of study titles is always prepended.
    #[serde(default = "default_risk_of_bias_directive")]
    pub risk_of_bias_directive: String,
    /// Address the HTTP server binds to (`LISTEN_ADDRESS`).
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
}

impl Config {
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(config::Environment::default().prefix("REVIEW_PARSER"));

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        result.validate()?;

        Ok(result)
    }

    /// Check the loaded values for consistency.
    pub fn validate(&self) -> Void {
        if reqwest::Url::parse(&self.supabase_url).is_err() {
            return Err(anyhow::anyhow!("Supabase URL `{}` is not a valid URL.", self.supabase_url));
        }

        match self.llm_provider {
            LlmProvider::Anthropic if self.anthropic_api_key.is_empty() => {
                return Err(anyhow::anyhow!("Anthropic API key is required when the LLM provider is `anthropic`."));
            }
            LlmProvider::OpenAi if self.openai_api_key.is_empty() => {
                return Err(anyhow::anyhow!("OpenAI API key is required when the LLM provider is `openai`."));
            }
            _ => {}
        }

        if self.llm_max_tokens < 1 || self.llm_max_tokens > 64000 {
            return Err(anyhow::anyhow!("LLM max tokens must be between 1 and 64000."));
        }

        if self.llm_timeout_secs == 0 {
            return Err(anyhow::anyhow!("LLM timeout must be at least one second."));
        }

        Ok(())
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        Config {
            inner: Arc::new(ConfigInner {
                supabase_url: "http://127.0.0.1:54321".to_string(),
                llm_provider: LlmProvider::Anthropic,
                anthropic_api_key: "sk-ant-test".to_string(),
                llm_max_tokens: default_llm_max_tokens(),
                llm_timeout_secs: default_llm_timeout_secs(),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(create_test_config().validate().is_ok());
    }

    #[test]
    fn test_invalid_supabase_url() {
        let mut config = create_test_config();
        Arc::make_mut(&mut config.inner).supabase_url = "not a url".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_provider_key() {
        let mut config = create_test_config();
        let inner = Arc::make_mut(&mut config.inner);
        inner.llm_provider = LlmProvider::OpenAi;

        assert!(config.validate().is_err());

        Arc::make_mut(&mut config.inner).openai_api_key = "sk-test".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_token_and_timeout_bounds() {
        let mut config = create_test_config();
        Arc::make_mut(&mut config.inner).llm_max_tokens = 0;
        assert!(config.validate().is_err());

        let mut config = create_test_config();
        Arc::make_mut(&mut config.inner).llm_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_provider_names() {
        let provider: LlmProvider = serde_json::from_str("\"openai\"").unwrap();
        assert_eq!(provider, LlmProvider::OpenAi);
        assert!(serde_json::from_str::<LlmProvider>("\"gemini\"").is_err());
    }
}
