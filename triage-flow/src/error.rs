use thiserror::Error;

/// Failure reported by an [`ArticleSearch`](crate::ArticleSearch) backend.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search query failed: {0}")]
    QueryFailed(String),

    #[error("Search backend unavailable: {0}")]
    Unavailable(String),
}

/// Failure reported by a [`LanguageModel`](crate::LanguageModel).
///
/// The rate-limit kind is kept distinct so the retry policy can recognise it.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("Model rate limited: {0}")]
    RateLimited(String),

    #[error("Model request failed: {0}")]
    Request(String),
}

impl ModelError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ModelError::RateLimited(_))
    }
}

/// Why a raw model reply could not be turned into an article analysis.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("No JSON object found in model response")]
    NoJsonObject,

    #[error("Model response is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Model response has no article_metadata object")]
    MissingMetadata,

    #[error("article_metadata is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("article_metadata has an invalid field: {0}")]
    InvalidMetadata(#[source] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum TriageError {
    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

pub type Result<T> = std::result::Result<T, TriageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_umbrella_error_is_transparent() {
        let err: TriageError = NormalizeError::MissingField("title").into();
        assert_eq!(
            err.to_string(),
            "article_metadata is missing required field `title`"
        );

        let err: TriageError = ModelError::RateLimited("slow down".into()).into();
        assert!(matches!(err, TriageError::Model(ref e) if e.is_rate_limit()));
    }
}
