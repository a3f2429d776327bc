//! Turns a free-text model reply into a validated [`ArticleAnalysis`].
//!
//! Extraction follows a fixed fallback chain: a fenced ```` ```json ```` block,
//! then the span from the first `{` to the last `}`, then failure. A reply that
//! cannot be normalized is reported to the caller and never re-requested.

use serde_json::{Map, Value};

use crate::article::{
    ArticleAnalysis, ArticleMetadata, CandidateArticle, OPTIONAL_FLAGS, OPTIONAL_LISTS, string_list,
};
use crate::error::NormalizeError;
use crate::scoring::score;

const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";

/// Checked in this order; the first one missing is reported.
pub const REQUIRED_FIELDS: [&str; 5] = [
    "title",
    "cancer_focus",
    "type_of_cancer",
    "paper_type",
    "actionable_events",
];

/// Keys owned by the normalizer rather than the model.
const INJECTED_FIELDS: [&str; 5] = [
    "PMID",
    "link",
    "overall_points",
    "point_breakdown",
    "full_article_text",
];

/// Locate the JSON object embedded in a model reply.
pub fn extract_json(raw: &str) -> Result<&str, NormalizeError> {
    let text = raw.trim();
    if let Some(block) = fenced_json_block(text) {
        return Ok(block);
    }
    brace_span(text).ok_or(NormalizeError::NoJsonObject)
}

fn fenced_json_block(text: &str) -> Option<&str> {
    // ASCII lowercasing keeps byte offsets valid for `text`.
    let lowered = text.to_ascii_lowercase();
    let open = lowered.find(JSON_FENCE)?;
    let body_start = open + JSON_FENCE.len();
    let close = body_start + text[body_start..].find(FENCE)?;
    Some(text[body_start..close].trim())
}

fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Parse, validate, identify and score one model reply for `article`.
pub fn normalize(raw: &str, article: &CandidateArticle) -> Result<ArticleAnalysis, NormalizeError> {
    let json = extract_json(raw)?;
    let value: Value = serde_json::from_str(json).map_err(NormalizeError::InvalidJson)?;

    let mut fields = match value {
        Value::Object(mut top) => match top.remove("article_metadata") {
            Some(Value::Object(fields)) => fields,
            _ => return Err(NormalizeError::MissingMetadata),
        },
        _ => return Err(NormalizeError::MissingMetadata),
    };

    if let Some(missing) = REQUIRED_FIELDS
        .iter()
        .find(|field| fields.get(**field).is_none_or(Value::is_null))
    {
        return Err(NormalizeError::MissingField(*missing));
    }

    for key in INJECTED_FIELDS {
        fields.remove(key);
    }
    let mistyped = take_mistyped_optionals(&mut fields);

    let mut metadata: ArticleMetadata =
        serde_json::from_value(Value::Object(fields)).map_err(NormalizeError::InvalidMetadata)?;
    metadata.extra.extend(mistyped);
    metadata.pmid = article.id.clone();
    metadata.link = article.link();

    let score = score(&metadata);
    metadata.overall_points = score.overall_points;
    metadata.point_breakdown = score.breakdown;

    Ok(ArticleAnalysis {
        article_metadata: metadata,
        full_article_text: article.content.clone(),
    })
}

/// Optional rubric fields only count when well typed. Anything else is kept
/// verbatim alongside the unknown keys and scores nothing.
fn take_mistyped_optionals(fields: &mut Map<String, Value>) -> Map<String, Value> {
    let mut mistyped = Map::new();
    for key in OPTIONAL_FLAGS {
        if fields.get(key).is_some_and(|v| !v.is_null() && !v.is_boolean()) {
            if let Some(value) = fields.remove(key) {
                mistyped.insert(key.to_string(), value);
            }
        }
    }
    for key in OPTIONAL_LISTS {
        if fields
            .get(key)
            .is_some_and(|v| !v.is_null() && string_list(v).is_none())
        {
            if let Some(value) = fields.remove(key) {
                mistyped.insert(key.to_string(), value);
            }
        }
    }
    mistyped
}
