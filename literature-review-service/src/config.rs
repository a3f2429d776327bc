use anyhow::{Context as _, anyhow};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use triage_flow::{RetryPolicy, search::DEFAULT_TOP_K};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_LLM_MODEL: &str = "google/gemini-2.0-flash-001";
pub const DEFAULT_LLM_MAX_TOKENS: u64 = 8192;
pub const DEFAULT_ARTICLES_TABLE: &str = "pubmed_articles";

/// Where candidate articles come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchBackend {
    /// pgvector nearest-neighbour search over pre-embedded articles.
    PgVector { database_url: String, table: String },
    /// NCBI E-utilities keyword search.
    PubMed,
    /// A JSON array of `{id, content}` loaded into memory.
    Memory { path: PathBuf },
}

/// Configuration for the literature review service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub openrouter_api_key: String,
    pub llm_model: String,
    pub llm_max_tokens: u64,
    pub search_backend: SearchBackend,
    pub search_top_k: usize,
    pub item_delay: Duration,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
}

impl ServiceConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup, e.g. a map in tests.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let openrouter_api_key = lookup("OPENROUTER_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow!("OPENROUTER_API_KEY environment variable is required"))?;

        let backend = lookup("SEARCH_BACKEND").unwrap_or_else(|| "pgvector".to_string());
        let search_backend = match backend.to_lowercase().as_str() {
            "pgvector" => SearchBackend::PgVector {
                database_url: lookup("ARTICLES_DATABASE_URL").ok_or_else(|| {
                    anyhow!("ARTICLES_DATABASE_URL must be set for the pgvector search backend")
                })?,
                table: table_name(lookup("ARTICLES_TABLE"))?,
            },
            "pubmed" => SearchBackend::PubMed,
            "memory" => SearchBackend::Memory {
                path: lookup("ARTICLES_PATH")
                    .map(PathBuf::from)
                    .ok_or_else(|| anyhow!("ARTICLES_PATH must be set for the memory search backend"))?,
            },
            other => return Err(anyhow!("Unknown SEARCH_BACKEND: {}", other)),
        };

        let policy = RetryPolicy::default();

        Ok(Self {
            port: parse_or(&lookup, "PORT", DEFAULT_PORT)?,
            openrouter_api_key,
            llm_model: lookup("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            llm_max_tokens: parse_or(&lookup, "LLM_MAX_TOKENS", DEFAULT_LLM_MAX_TOKENS)?,
            search_backend,
            search_top_k: parse_or(&lookup, "SEARCH_TOP_K", DEFAULT_TOP_K)?,
            item_delay: Duration::from_secs(parse_or(
                &lookup,
                "ITEM_DELAY_SECS",
                triage_flow::stream::DEFAULT_ITEM_DELAY.as_secs(),
            )?),
            retry_base_delay: Duration::from_secs(parse_or(
                &lookup,
                "RETRY_BASE_DELAY_SECS",
                policy.base_delay.as_secs(),
            )?),
            retry_max_delay: Duration::from_secs(parse_or(
                &lookup,
                "RETRY_MAX_DELAY_SECS",
                policy.max_delay.as_secs(),
            )?),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .with_base_delay(self.retry_base_delay)
            .with_max_delay(self.retry_max_delay)
    }
}

/// The table name is spliced into SQL, so only plain (optionally schema
/// qualified) identifiers are accepted.
fn table_name(raw: Option<String>) -> anyhow::Result<String> {
    let Some(table) = raw else {
        return Ok(DEFAULT_ARTICLES_TABLE.to_string());
    };
    let valid = table.split('.').all(|part| {
        let mut chars = part.chars();
        chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    });
    if valid {
        Ok(table)
    } else {
        Err(anyhow!("Invalid ARTICLES_TABLE: {:?}", table))
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}
