use anyhow::anyhow;
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::{Arc, Mutex};
use tracing::info;
use triage_flow::{ArticleSearch, CandidateArticle, SearchError};

/// Nearest-neighbour search over a pgvector table of embedded articles.
///
/// The table needs `pmid text`, `content text` and an `embedding vector`
/// produced with the same model used here for queries.
pub struct PgVectorSearch {
    pool: PgPool,
    table: String,
    top_k: usize,
    embedder: Arc<Mutex<TextEmbedding>>,
}

fn load_embedding_model() -> anyhow::Result<TextEmbedding> {
    TextEmbedding::try_new(
        InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(true),
    )
}

impl PgVectorSearch {
    pub async fn connect(database_url: &str, table: &str, top_k: usize) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        // Model loading reads ONNX weights from disk; keep it off the async workers.
        let embedder = tokio::task::spawn_blocking(load_embedding_model).await??;

        info!(table, top_k, "Connected pgvector article search");

        Ok(Self {
            pool,
            table: table.to_string(),
            top_k,
            embedder: Arc::new(Mutex::new(embedder)),
        })
    }

    async fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let input = text.to_owned();
        let embedder = self.embedder.clone();

        let embedding = tokio::task::spawn_blocking(move || {
            let mut model = embedder
                .lock()
                .map_err(|_| anyhow!("Embedding model lock poisoned"))?;
            let embeddings = model.embed(vec![input], None)?;
            embeddings
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("Embedding model returned no vectors"))
        })
        .await??;

        info!(dimensions = embedding.len(), "Query embedded");
        Ok(embedding)
    }
}

#[async_trait]
impl ArticleSearch for PgVectorSearch {
    async fn search(&self, query: &str) -> Result<Vec<CandidateArticle>, SearchError> {
        let embedding = self
            .embed_query(query)
            .await
            .map_err(|e| SearchError::QueryFailed(format!("Embedding generation failed: {}", e)))?;

        let sql = format!(
            "SELECT pmid, content                      \
             FROM {}                                   \
             ORDER BY embedding <-> $1::real[]::vector \
             LIMIT $2",
            self.table
        );

        let rows = sqlx::query_as::<_, (String, String)>(&sql)
            .bind(embedding)
            .bind(i64::try_from(self.top_k).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SearchError::QueryFailed(format!("Database query failed: {}", e)))?;

        info!("Retrieved {} articles from vector search", rows.len());

        Ok(rows
            .into_iter()
            .map(|(pmid, content)| CandidateArticle::new(pmid, content))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires network + model download (~23 MB)
    async fn test_embed_query_dimensions() {
        let embedder = tokio::task::spawn_blocking(load_embedding_model)
            .await
            .unwrap()
            .unwrap();
        let search = PgVectorSearch {
            pool: PgPoolOptions::new()
                .connect_lazy("postgres://localhost/articles")
                .unwrap(),
            table: "pubmed_articles".to_string(),
            top_k: 15,
            embedder: Arc::new(Mutex::new(embedder)),
        };

        let embedding = search.embed_query("KMT2A rearrangement").await.unwrap();
        assert_eq!(embedding.len(), 384);
    }
}
