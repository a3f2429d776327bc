use serde::{Deserialize, Serialize};

/// Body of `POST /articles/analyze`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeArticlesRequest {
    /// Search query, typically the actionable events extracted from case notes.
    #[serde(alias = "query")]
    pub events_text: Option<String>,
    /// Rubric prompt override; `{article}` marks where the article goes.
    #[serde(alias = "prompt")]
    pub methodology_content: Option<String>,
    pub disease: Option<String>,
}

/// Body of `POST /extract/disease`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractDiseaseRequest {
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractDiseaseResponse {
    pub disease: String,
}

/// Body of `POST /extract/events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractEventsRequest {
    pub text: Option<String>,
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractEventsResponse {
    pub events: Vec<String>,
    pub raw: String,
}
