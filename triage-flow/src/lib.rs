pub mod article;
pub mod error;
pub mod model;
pub mod normalizer;
pub mod prompt;
pub mod retry;
pub mod scoring;
pub mod search;
pub mod stream;

// Re-export commonly used types
pub use article::{ArticleAnalysis, ArticleMetadata, CandidateArticle};
pub use error::{ModelError, NormalizeError, Result, SearchError, TriageError};
pub use model::LanguageModel;
pub use normalizer::{extract_json, normalize};
pub use prompt::{DEFAULT_ANALYSIS_PROMPT, build_analysis_prompt};
pub use retry::{RetryPolicy, RetryingModel, Sleeper, TokioSleeper};
pub use scoring::{Score, score};
pub use search::{ArticleSearch, InMemoryArticleSearch};
pub use stream::{AnalysisRequest, LiteratureReviewer, StreamEvent, StreamStatus};
