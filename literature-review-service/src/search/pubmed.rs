use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::{info, warn};
use triage_flow::{ArticleSearch, CandidateArticle, SearchError};

const EUTILS_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Keyword search against PubMed through the NCBI E-utilities.
///
/// Only titles and abstracts are available this way, so the article text the
/// model sees is shorter than with the warehouse backend.
pub struct PubMedSearch {
    client: reqwest::Client,
    base_url: String,
    top_k: usize,
}

impl PubMedSearch {
    pub fn new(top_k: usize) -> Self {
        Self::with_base_url(EUTILS_BASE_URL, top_k)
    }

    pub fn with_base_url(base_url: &str, top_k: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            top_k,
        }
    }

    async fn search_pmids(&self, query: &str) -> Result<Vec<String>, SearchError> {
        let search_url = format!(
            "{}/esearch.fcgi?db=pubmed&term={}&retmax={}&sort=relevance&retmode=json",
            self.base_url,
            urlencoding::encode(query),
            self.top_k
        );

        let search_data: Value = self
            .client
            .get(&search_url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| SearchError::Unavailable(format!("PubMed search request failed: {}", e)))?
            .json()
            .await
            .map_err(|e| SearchError::QueryFailed(format!("Failed to parse search response: {}", e)))?;

        let pmids = search_data["esearchresult"]["idlist"]
            .as_array()
            .ok_or_else(|| SearchError::QueryFailed("No PMID list in search results".to_string()))?;

        Ok(pmids
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect())
    }

    async fn fetch_articles(&self, pmids: &[String]) -> Result<String, SearchError> {
        let fetch_url = format!(
            "{}/efetch.fcgi?db=pubmed&id={}&retmode=xml",
            self.base_url,
            pmids.join(",")
        );

        self.client
            .get(&fetch_url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| SearchError::Unavailable(format!("PubMed fetch request failed: {}", e)))?
            .text()
            .await
            .map_err(|e| SearchError::QueryFailed(format!("Failed to read fetch response: {}", e)))
    }
}

#[async_trait]
impl ArticleSearch for PubMedSearch {
    async fn search(&self, query: &str) -> Result<Vec<CandidateArticle>, SearchError> {
        let pmids = self.search_pmids(query).await?;
        if pmids.is_empty() {
            warn!(query, "PubMed search found no articles");
            return Ok(Vec::new());
        }

        info!("PubMed search found {} articles, fetching details", pmids.len());
        let xml = self.fetch_articles(&pmids).await?;
        let mut articles = parse_pubmed_xml(&xml)?;
        order_by_pmids(&mut articles, &pmids);
        Ok(articles)
    }
}

/// efetch does not promise to keep the relevance order of esearch.
fn order_by_pmids(articles: &mut [CandidateArticle], pmids: &[String]) {
    articles.sort_by_key(|article| {
        pmids
            .iter()
            .position(|pmid| *pmid == article.id)
            .unwrap_or(usize::MAX)
    });
}

/// Pull PMID, title and abstract out of an efetch XML document.
///
/// Entities are decoded and inline markup such as `<i>` or `<sup>` is reduced
/// to its text.
pub fn parse_pubmed_xml(xml: &str) -> Result<Vec<CandidateArticle>, SearchError> {
    let document = Html::parse_document(xml);

    // The HTML parser lowercases element names.
    let article_sel = Selector::parse("pubmedarticle")
        .map_err(|e| SearchError::QueryFailed(format!("invalid article selector: {e:?}")))?;
    let pmid_sel = Selector::parse("medlinecitation > pmid")
        .map_err(|e| SearchError::QueryFailed(format!("invalid PMID selector: {e:?}")))?;
    let title_sel = Selector::parse("articletitle")
        .map_err(|e| SearchError::QueryFailed(format!("invalid title selector: {e:?}")))?;
    let abstract_sel = Selector::parse("abstracttext")
        .map_err(|e| SearchError::QueryFailed(format!("invalid abstract selector: {e:?}")))?;

    let mut articles = Vec::new();

    for element in document.select(&article_sel) {
        let pmid = match element.select(&pmid_sel).next().map(element_text) {
            Some(pmid) if !pmid.is_empty() => pmid,
            _ => continue,
        };

        let title = element
            .select(&title_sel)
            .next()
            .map(element_text)
            .unwrap_or_default();
        let abstract_text = element
            .select(&abstract_sel)
            .map(element_text)
            .collect::<Vec<_>>()
            .join("\n");

        articles.push(CandidateArticle::new(
            pmid,
            format!("Title: {}\n\n{}", title, abstract_text),
        ));
    }

    Ok(articles)
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EFETCH: &str = r#"<?xml version="1.0" ?>
<PubmedArticleSet>
<PubmedArticle>
  <MedlineCitation Status="MEDLINE" Owner="NLM">
    <PMID Version="1">37101762</PMID>
    <Article>
      <ArticleTitle>Palbociclib in Acute Leukemias With KMT2A-rearrangement</ArticleTitle>
      <Abstract>
        <AbstractText Label="BACKGROUND">KMT2A rearranged leukemias have a poor prognosis.</AbstractText>
        <AbstractText Label="RESULTS">2 responses among 16 patients.</AbstractText>
      </Abstract>
    </Article>
  </MedlineCitation>
</PubmedArticle>
<PubmedArticle>
  <MedlineCitation>
    <PMID Version="1">35211470</PMID>
    <Article>
      <ArticleTitle>Effects of NRAS Mutations on Leukemogenesis</ArticleTitle>
    </Article>
  </MedlineCitation>
</PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn test_parse_pubmed_xml() {
        let articles = parse_pubmed_xml(EFETCH).unwrap();

        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].id, "37101762");
        assert_eq!(
            articles[0].content,
            "Title: Palbociclib in Acute Leukemias With KMT2A-rearrangement\n\n\
             KMT2A rearranged leukemias have a poor prognosis.\n2 responses among 16 patients."
        );
        assert_eq!(articles[1].id, "35211470");
        assert_eq!(articles[1].content, "Title: Effects of NRAS Mutations on Leukemogenesis\n\n");
    }

    #[test]
    fn test_decodes_entities_and_strips_inline_markup() {
        let xml = r#"<PubmedArticleSet><PubmedArticle><MedlineCitation>
    <PMID Version="1">38000001</PMID>
    <Article>
      <ArticleTitle>Venetoclax &amp; azacitidine in <i>FLT3</i>-mutated AML</ArticleTitle>
      <Abstract>
        <AbstractText>Blasts fell to &lt;5% in 10<sup>9</sup>/L cohorts.</AbstractText>
      </Abstract>
    </Article>
    <CommentsCorrectionsList>
      <CommentsCorrections><PMID Version="1">12345</PMID></CommentsCorrections>
    </CommentsCorrectionsList>
  </MedlineCitation></PubmedArticle></PubmedArticleSet>"#;

        let articles = parse_pubmed_xml(xml).unwrap();

        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].id, "38000001");
        assert_eq!(
            articles[0].content,
            "Title: Venetoclax & azacitidine in FLT3-mutated AML\n\n\
             Blasts fell to <5% in 109/L cohorts."
        );
    }

    #[test]
    fn test_results_follow_search_relevance_order() {
        let mut articles = parse_pubmed_xml(EFETCH).unwrap();
        let pmids = vec!["35211470".to_string(), "37101762".to_string()];

        order_by_pmids(&mut articles, &pmids);

        let ids: Vec<_> = articles.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["35211470", "37101762"]);
    }

    #[test]
    fn test_unknown_pmids_sort_last() {
        let mut articles = vec![
            CandidateArticle::new("9", "x"),
            CandidateArticle::new("2", "y"),
            CandidateArticle::new("1", "z"),
        ];

        order_by_pmids(&mut articles, &["1".to_string(), "2".to_string()]);

        let ids: Vec<_> = articles.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "9"]);
    }
}
