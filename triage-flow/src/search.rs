use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::{article::CandidateArticle, error::SearchError};

/// Default number of candidates a search returns.
pub const DEFAULT_TOP_K: usize = 15;

/// Semantic search over an external article index.
///
/// Returns at most K candidates, most similar first.
#[async_trait]
pub trait ArticleSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<CandidateArticle>, SearchError>;
}

/// In-memory implementation of ArticleSearch
///
/// Ranks articles by how often the query's terms occur in their text. Useful for
/// local runs against a small exported corpus and for tests.
pub struct InMemoryArticleSearch {
    articles: Arc<Vec<CandidateArticle>>,
    top_k: usize,
}

impl InMemoryArticleSearch {
    pub fn new(articles: Vec<CandidateArticle>) -> Self {
        Self {
            articles: Arc::new(articles),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

fn query_terms(query: &str) -> BTreeSet<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|term| term.chars().count() > 1)
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl ArticleSearch for InMemoryArticleSearch {
    async fn search(&self, query: &str) -> Result<Vec<CandidateArticle>, SearchError> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut ranked: Vec<(usize, &CandidateArticle)> = self
            .articles
            .iter()
            .filter_map(|article| {
                let content = article.content.to_lowercase();
                let hits: usize = terms
                    .iter()
                    .map(|term| content.matches(term.as_str()).count())
                    .sum();
                (hits > 0).then_some((hits, article))
            })
            .collect();

        // Stable sort keeps corpus order among equally ranked articles.
        ranked.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(ranked
            .into_iter()
            .take(self.top_k)
            .map(|(_, article)| article.clone())
            .collect())
    }
}
