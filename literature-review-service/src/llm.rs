use async_trait::async_trait;
use rig::{agent::Agent, client::CompletionClient, completion::Prompt, providers::openrouter};
use tracing::debug;
use triage_flow::{LanguageModel, ModelError};

use crate::config::ServiceConfig;

/// Phrases (lowercased) that identify a provider rate-limit response.
const RATE_LIMIT_PHRASES: [&str; 4] = [
    "rate limit",
    "rate-limit",
    "too many requests",
    "resource_exhausted",
];

/// Words that mark a following `429` token as an HTTP status.
const STATUS_WORDS: [&str; 4] = ["status", "code", "http", "error"];

/// Quota wording from billing failures, which waiting does not fix.
const BILLING_WORDS: [&str; 3] = ["credit", "billing", "payment"];

/// Deterministic, bounded completions through OpenRouter.
pub struct OpenRouterModel {
    agent: Agent<openrouter::CompletionModel>,
    model_name: String,
}

impl OpenRouterModel {
    pub fn new(api_key: &str, model_name: &str, max_tokens: u64) -> Self {
        let client = openrouter::Client::new(api_key);
        let agent = client
            .agent(model_name)
            .temperature(0.0)
            .max_tokens(max_tokens)
            .build();
        Self {
            agent,
            model_name: model_name.to_string(),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            &config.openrouter_api_key,
            &config.llm_model,
            config.llm_max_tokens,
        )
    }
}

/// Map a provider error message onto the rate-limit / other split.
pub fn classify_model_error(message: String) -> ModelError {
    let lowered = message.to_lowercase();
    let rate_limited = RATE_LIMIT_PHRASES
        .iter()
        .any(|phrase| lowered.contains(phrase))
        || has_status_429(&lowered)
        || (lowered.contains("quota exceeded")
            && !BILLING_WORDS.iter().any(|word| lowered.contains(word)));

    if rate_limited {
        ModelError::RateLimited(message)
    } else {
        ModelError::Request(message)
    }
}

/// `429` as a whole token, at the start or right after status wording.
fn has_status_429(lowered: &str) -> bool {
    let tokens: Vec<&str> = lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .collect();

    tokens.iter().enumerate().any(|(i, token)| {
        *token == "429" && (i == 0 || STATUS_WORDS.contains(&tokens[i - 1]))
    })
}

#[async_trait]
impl LanguageModel for OpenRouterModel {
    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        debug!(model = %self.model_name, prompt_chars = prompt.len(), "Sending prompt");
        self.agent
            .prompt(prompt.to_string())
            .await
            .map_err(|e| classify_model_error(e.to_string()))
    }
}
