use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One article returned by the search step, pending analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateArticle {
    /// External accession number, e.g. a PubMed id.
    pub id: String,
    /// Full article text handed to the model.
    pub content: String,
}

impl CandidateArticle {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }

    /// PubMed landing page for this article.
    pub fn link(&self) -> String {
        format!("https://pubmed.ncbi.nlm.nih.gov/{}/", self.id)
    }
}

/// Structured metadata the model extracts from one article.
///
/// `PMID`, `link`, `overall_points` and `point_breakdown` are filled in by the
/// normalizer; whatever the model put there is discarded. Unknown keys the model
/// returns (`year`, ...) are kept in `extra`, as are optional rubric fields of
/// the wrong type, which read as absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleMetadata {
    #[serde(rename = "PMID", default)]
    pub pmid: String,
    #[serde(default)]
    pub link: String,
    pub title: String,
    pub cancer_focus: bool,
    pub type_of_cancer: String,
    pub paper_type: String,
    pub actionable_events: Vec<String>,
    #[serde(default, deserialize_with = "lenient_flag", skip_serializing_if = "Option::is_none")]
    pub pediatric_focus: Option<bool>,
    #[serde(default, deserialize_with = "lenient_flag", skip_serializing_if = "Option::is_none")]
    pub drugs_tested: Option<bool>,
    #[serde(default, deserialize_with = "lenient_list", skip_serializing_if = "Option::is_none")]
    pub drug_results: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_flag", skip_serializing_if = "Option::is_none")]
    pub cell_studies: Option<bool>,
    #[serde(default, deserialize_with = "lenient_flag", skip_serializing_if = "Option::is_none")]
    pub mice_studies: Option<bool>,
    #[serde(default, deserialize_with = "lenient_flag", skip_serializing_if = "Option::is_none")]
    pub case_report: Option<bool>,
    #[serde(default, deserialize_with = "lenient_flag", skip_serializing_if = "Option::is_none")]
    pub series_of_case_reports: Option<bool>,
    #[serde(default, deserialize_with = "lenient_flag", skip_serializing_if = "Option::is_none")]
    pub clinical_study: Option<bool>,
    #[serde(default, deserialize_with = "lenient_flag", skip_serializing_if = "Option::is_none")]
    pub clinical_study_on_children: Option<bool>,
    #[serde(default, deserialize_with = "lenient_flag", skip_serializing_if = "Option::is_none")]
    pub novelty: Option<bool>,
    #[serde(default)]
    pub overall_points: i64,
    #[serde(default)]
    pub point_breakdown: BTreeMap<String, i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A validated, scored analysis of one article, as sent to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleAnalysis {
    pub article_metadata: ArticleMetadata,
    pub full_article_text: String,
}

/// Rubric flags the model may omit or fill with anything.
pub(crate) const OPTIONAL_FLAGS: [&str; 9] = [
    "pediatric_focus",
    "drugs_tested",
    "cell_studies",
    "mice_studies",
    "case_report",
    "series_of_case_reports",
    "clinical_study",
    "clinical_study_on_children",
    "novelty",
];

pub(crate) const OPTIONAL_LISTS: [&str; 1] = ["drug_results"];

/// `Some` only for an array made entirely of strings.
pub(crate) fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

fn lenient_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(deserializer)?.as_bool())
}

fn lenient_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(string_list(&Value::deserialize(deserializer)?))
}
