pub mod pgvector;
pub mod pubmed;

pub use pgvector::PgVectorSearch;
pub use pubmed::PubMedSearch;

use anyhow::Context as _;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use triage_flow::{ArticleSearch, CandidateArticle, InMemoryArticleSearch};

use crate::config::{SearchBackend, ServiceConfig};

/// Create the search collaborator selected by the configuration.
pub async fn create_article_search(config: &ServiceConfig) -> anyhow::Result<Arc<dyn ArticleSearch>> {
    match &config.search_backend {
        SearchBackend::PgVector {
            database_url,
            table,
        } => {
            info!("Using pgvector article search");
            let search = PgVectorSearch::connect(database_url, table, config.search_top_k).await?;
            Ok(Arc::new(search))
        }
        SearchBackend::PubMed => {
            info!("Using PubMed E-utilities article search");
            Ok(Arc::new(PubMedSearch::new(config.search_top_k)))
        }
        SearchBackend::Memory { path } => {
            let articles = load_corpus(path).await?;
            info!(
                "Using in-memory article search over {} articles from {}",
                articles.len(),
                path.display()
            );
            Ok(Arc::new(
                InMemoryArticleSearch::new(articles).with_top_k(config.search_top_k),
            ))
        }
    }
}

/// Read a JSON array of `{id, content}` articles.
pub async fn load_corpus(path: &Path) -> anyhow::Result<Vec<CandidateArticle>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read article corpus {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Article corpus {} is not a JSON array of articles", path.display()))
}
