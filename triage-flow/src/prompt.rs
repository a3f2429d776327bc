use crate::article::CandidateArticle;

/// Placeholder a rubric template uses to mark where the article goes.
pub const ARTICLE_PLACEHOLDER: &str = "{article}";

/// Default rubric prompt. Point values mirror [`crate::scoring`]; the model's own
/// total is ignored and recomputed.
pub const DEFAULT_ANALYSIS_PROMPT: &str = r#"You are an expert pediatric oncologist and the chair of the International Leukemia Tumor Board. You evaluate full research articles related to oncology, especially pediatric leukemia, to identify advancements in treatment and understanding of the disease. You read one full article at a time.

<Article>
{article}
</Article>

<Instructions>
Read the article, extract the fields below and return them as a single JSON object.

- PMID: the PubMed id, or "N/A".
- title: the title of the paper.
- link: https://pubmed.ncbi.nlm.nih.gov/<PMID>/ when the PMID is known, otherwise "N/A".
- year: publication year.
- cancer_focus: whether the article relates to cancer (true/false).
- pediatric_focus: whether it focuses on pediatric cancer (true/false). +10 points.
- type_of_cancer: the specific cancer discussed, e.g. "Leukemia (AML, ALL)", "Neuroblastoma".
- paper_type: clinical trial, case report, in vitro study, review, retrospective study, ... Clinical trials +10 points, reviews -5 points.
- actionable_events: specific actionable events such as "KMT2A rearrangement" or "FLT3 mutation". +5 points each.
- drugs_tested: whether drugs were tested (true/false). +5 points.
- drug_results: the result of each drug tested. +5 points each.
- cell_studies: drugs tested on cells in vitro (true/false). +5 points.
- mice_studies: drugs tested on mice or PDX models (true/false). +10 points.
- case_report: presents a case report (true/false). +5 points.
- series_of_case_reports: presents multiple case reports (true/false). +10 points.
- clinical_study: describes a clinical study (true/false). +15 points.
- clinical_study_on_children: the clinical study was on children (true/false). +20 points.
- novelty: describes a novel mechanism or therapeutic strategy (true/false). +10 points.
- overall_points: the sum of the points above.

Infer information that is not stated explicitly. Respond with valid JSON only, in exactly this structure:

```json
{
  "article_metadata": {
    "PMID": "...",
    "title": "...",
    "link": "...",
    "year": "...",
    "cancer_focus": true,
    "pediatric_focus": false,
    "type_of_cancer": "...",
    "paper_type": "...",
    "actionable_events": ["..."],
    "drugs_tested": false,
    "drug_results": ["..."],
    "cell_studies": false,
    "mice_studies": false,
    "case_report": false,
    "series_of_case_reports": false,
    "clinical_study": false,
    "clinical_study_on_children": false,
    "novelty": false,
    "overall_points": 0
  }
}
```
</Instructions>"#;

fn article_block(article: &CandidateArticle) -> String {
    format!(
        "<PMID>{}</PMID>\n<Full Article Text>\n{}\n</Full Article Text>",
        article.id, article.content
    )
}

/// Render the rubric prompt for one article.
///
/// A caller-supplied template replaces the default. When the template has no
/// `{article}` placeholder the article is appended after it.
pub fn build_analysis_prompt(template: Option<&str>, article: &CandidateArticle) -> String {
    let template = template.unwrap_or(DEFAULT_ANALYSIS_PROMPT);
    let block = article_block(article);
    if template.contains(ARTICLE_PLACEHOLDER) {
        template.replace(ARTICLE_PLACEHOLDER, &block)
    } else {
        format!("{template}\n\n<Article>\n{block}\n</Article>")
    }
}
