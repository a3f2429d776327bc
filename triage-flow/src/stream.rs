//! Streaming orchestration: search once, then analyze candidates one by one.
//!
//! A stream always starts with a `processing` metadata event, carries exactly one
//! analysis or error event per candidate in search order, and ends with a
//! `complete` metadata event. The only exception is a failed or panicking
//! search, which produces a single error event. Nothing runs until the stream is polled, and
//! dropping it stops all further work.

use futures::FutureExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::{
    article::{ArticleAnalysis, CandidateArticle},
    error::Result,
    model::LanguageModel,
    normalizer::normalize,
    prompt::build_analysis_prompt,
    retry::{RetryPolicy, RetryingModel, Sleeper, TokioSleeper},
    search::ArticleSearch,
};

/// Throttle between consecutive model calls, independent of rate-limit backoff.
pub const DEFAULT_ITEM_DELAY: Duration = Duration::from_secs(5);

/// One literature review request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Free-text search query, e.g. a list of actionable events.
    pub query: String,
    /// Replacement rubric prompt; `{article}` marks where the article goes.
    pub rubric: Option<String>,
}

impl AnalysisRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            rubric: None,
        }
    }

    pub fn with_rubric(mut self, rubric: impl Into<String>) -> Self {
        self.rubric = Some(rubric.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Processing,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressMetadata {
    pub total_articles: usize,
    pub current_article: usize,
    pub status: StreamStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub article_number: usize,
    pub total_articles: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleEvent {
    pub progress: Progress,
    pub analysis: ArticleAnalysis,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_number: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_articles: Option<usize>,
}

/// One line of the outbound stream, serialized as `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    Metadata(ProgressMetadata),
    ArticleAnalysis(ArticleEvent),
    Error(ErrorEvent),
}

impl StreamEvent {
    pub fn processing(total_articles: usize) -> Self {
        StreamEvent::Metadata(ProgressMetadata {
            total_articles,
            current_article: 0,
            status: StreamStatus::Processing,
        })
    }

    pub fn complete(total_articles: usize) -> Self {
        StreamEvent::Metadata(ProgressMetadata {
            total_articles,
            current_article: total_articles,
            status: StreamStatus::Complete,
        })
    }

    pub fn analysis(article_number: usize, total_articles: usize, analysis: ArticleAnalysis) -> Self {
        StreamEvent::ArticleAnalysis(ArticleEvent {
            progress: Progress {
                article_number,
                total_articles,
            },
            analysis,
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error(ErrorEvent {
            message: message.into(),
            article_number: None,
            total_articles: None,
        })
    }

    pub fn item_error(message: impl Into<String>, article_number: usize, total_articles: usize) -> Self {
        StreamEvent::Error(ErrorEvent {
            message: message.into(),
            article_number: Some(article_number),
            total_articles: Some(total_articles),
        })
    }

    /// Serialize as one newline-terminated JSON line.
    pub fn to_ndjson_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Runs the search → analyze → score pipeline for one request at a time.
#[derive(Clone)]
pub struct LiteratureReviewer {
    search: Arc<dyn ArticleSearch>,
    model: RetryingModel,
    sleeper: Arc<dyn Sleeper>,
    item_delay: Duration,
}

impl LiteratureReviewer {
    pub fn new(
        search: Arc<dyn ArticleSearch>,
        model: Arc<dyn LanguageModel>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            search,
            model: RetryingModel::new(model, policy),
            sleeper: Arc::new(TokioSleeper),
            item_delay: DEFAULT_ITEM_DELAY,
        }
    }

    pub fn with_item_delay(mut self, item_delay: Duration) -> Self {
        self.item_delay = item_delay;
        self
    }

    /// Use `sleeper` for both the inter-item throttle and retry backoff.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.model = self.model.with_sleeper(sleeper.clone());
        self.sleeper = sleeper;
        self
    }

    /// The rate-limit aware model, for callers that need plain completions.
    pub fn model(&self) -> &RetryingModel {
        &self.model
    }

    /// Analyze a single candidate: prompt, call the model, normalize and score.
    pub async fn analyze(
        &self,
        article: &CandidateArticle,
        rubric: Option<&str>,
    ) -> Result<ArticleAnalysis> {
        let prompt = build_analysis_prompt(rubric, article);
        let raw = self.model.call(&prompt).await?;
        Ok(normalize(&raw, article)?)
    }

    async fn review_article(
        &self,
        article: &CandidateArticle,
        article_number: usize,
        total_articles: usize,
        rubric: Option<&str>,
    ) -> StreamEvent {
        let outcome = AssertUnwindSafe(self.analyze(article, rubric))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(analysis)) => {
                info!(
                    article_number,
                    pmid = %article.id,
                    overall_points = analysis.article_metadata.overall_points,
                    "Article analyzed"
                );
                StreamEvent::analysis(article_number, total_articles, analysis)
            }
            Ok(Err(e)) => {
                warn!(article_number, pmid = %article.id, error = %e, "Article analysis failed");
                StreamEvent::item_error(
                    format!("Failed to analyze article {}: {}", article.id, e),
                    article_number,
                    total_articles,
                )
            }
            Err(_) => {
                error!(article_number, pmid = %article.id, "Article analysis panicked");
                StreamEvent::item_error(
                    format!("Internal error while analyzing article {}", article.id),
                    article_number,
                    total_articles,
                )
            }
        }
    }

    /// Lazily stream the events for `request`.
    pub fn stream(&self, request: AnalysisRequest) -> BoxStream<'static, StreamEvent> {
        let reviewer = self.clone();

        Box::pin(async_stream::stream! {
            info!(query = %request.query, "Starting literature search");

            let outcome = AssertUnwindSafe(reviewer.search.search(&request.query))
                .catch_unwind()
                .await;
            let articles = match outcome {
                Ok(Ok(articles)) => articles,
                Ok(Err(e)) => {
                    error!(error = %e, "Literature search failed");
                    yield StreamEvent::error(e.to_string());
                    return;
                }
                Err(_) => {
                    error!("Literature search panicked");
                    yield StreamEvent::error("Internal error during search");
                    return;
                }
            };

            let total_articles = articles.len();
            info!(total_articles, "Search returned candidates");
            yield StreamEvent::processing(total_articles);

            for (offset, article) in articles.iter().enumerate() {
                let article_number = offset + 1;
                if article_number > 1 {
                    reviewer.sleeper.sleep(reviewer.item_delay).await;
                }
                yield reviewer
                    .review_article(article, article_number, total_articles, request.rubric.as_deref())
                    .await;
            }

            info!(total_articles, "Literature review complete");
            yield StreamEvent::complete(total_articles);
        })
    }
}
