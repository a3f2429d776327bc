use async_trait::async_trait;

use crate::error::ModelError;

/// A hosted generative model that turns a prompt into a text completion.
///
/// Implementations must report provider rate limiting as
/// [`ModelError::RateLimited`] so callers can back off instead of failing.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ModelError>;
}
