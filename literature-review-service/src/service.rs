use axum::{
    Router,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::{HeaderValue, Request, StatusCode, header},
    middleware::{Next, from_fn},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use bytes::Bytes;
use futures::StreamExt;
use serde_json::{Value, json};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info};
use triage_flow::{AnalysisRequest, LiteratureReviewer, ModelError, StreamEvent};
use uuid::Uuid;

use crate::{
    config::ServiceConfig,
    llm::OpenRouterModel,
    models::{
        AnalyzeArticlesRequest, ExtractDiseaseRequest, ExtractDiseaseResponse, ExtractEventsRequest,
        ExtractEventsResponse,
    },
    prompts::{DISEASE_EXTRACTION_PROMPT, EVENTS_EXTRACTION_PROMPT, parse_events},
    search::create_article_search,
};

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

const CASE_INPUT_MARKER: &str = "Case input:";

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn rejection_error(rejection: JsonRejection) -> ApiError {
    (
        rejection.status(),
        Json(json!({ "error": rejection.body_text() })),
    )
}

fn model_error(e: ModelError) -> ApiError {
    let status = match e {
        ModelError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        ModelError::Request(_) => StatusCode::BAD_GATEWAY,
    };
    (status, Json(json!({ "error": e.to_string() })))
}

#[derive(Clone)]
pub struct AppState {
    pub reviewer: Arc<LiteratureReviewer>,
}

impl AppState {
    pub fn new(reviewer: LiteratureReviewer) -> Self {
        Self {
            reviewer: Arc::new(reviewer),
        }
    }
}

pub async fn create_app(config: &ServiceConfig) -> anyhow::Result<Router> {
    let app_state = create_app_state(config).await?;
    Ok(build_router(app_state))
}

async fn create_app_state(config: &ServiceConfig) -> anyhow::Result<AppState> {
    let search = create_article_search(config).await?;
    let model = Arc::new(OpenRouterModel::from_config(config));
    let reviewer = LiteratureReviewer::new(search, model, config.retry_policy())
        .with_item_delay(config.item_delay);

    Ok(AppState::new(reviewer))
}

/// Middleware to add correlation ID to all requests
async fn correlation_id_middleware(mut request: Request<Body>, next: Next) -> Response {
    let correlation_id = Uuid::new_v4().to_string();

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert("x-correlation-id", value.clone());
        let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
        let mut response = next.run(request).instrument(span).await;
        response.headers_mut().insert("x-correlation-id", value);
        return response;
    }

    next.run(request).await
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/articles/analyze", post(analyze_articles))
        .route("/extract/disease", post(extract_disease))
        .route("/extract/events", post(extract_events))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Literature Review Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Retrieves biomedical literature for a case and scores each article with an LLM rubric",
        "endpoints": {
            "POST /articles/analyze": "Stream scored article analyses as newline-delimited JSON",
            "POST /extract/disease": "Extract the primary disease from case notes",
            "POST /extract/events": "Extract actionable events from case notes",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

fn required_text<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, ApiError> {
    match value.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text),
        _ => Err(bad_request_error(&format!("Missing {} field", field))),
    }
}

fn validate_analyze_request(request: &AnalyzeArticlesRequest) -> Result<AnalysisRequest, ApiError> {
    let query = required_text(&request.events_text, "events_text")?;
    let mut analysis = AnalysisRequest::new(query);

    if request.methodology_content.is_some() {
        let rubric = required_text(&request.methodology_content, "methodology_content")?;
        analysis = analysis.with_rubric(rubric);
    }

    Ok(analysis)
}

fn ndjson_line(event: &StreamEvent) -> Bytes {
    match event.to_ndjson_line() {
        Ok(line) => Bytes::from(line),
        Err(e) => {
            error!(error = %e, "Failed to serialize stream event");
            let fallback = StreamEvent::error("Failed to serialize stream event");
            Bytes::from(
                fallback
                    .to_ndjson_line()
                    .unwrap_or_else(|_| "{\"type\":\"error\"}\n".to_string()),
            )
        }
    }
}

async fn analyze_articles(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeArticlesRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(rejection_error)?;
    let analysis = validate_analyze_request(&request)?;

    info!(
        query = %analysis.query,
        disease = ?request.disease,
        custom_rubric = analysis.rubric.is_some(),
        "Starting article analysis stream"
    );

    let body = state
        .reviewer
        .stream(analysis)
        .map(|event| Ok::<_, Infallible>(ndjson_line(&event)));

    Ok((
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response())
}

async fn extract_disease(
    State(state): State<AppState>,
    payload: Result<Json<ExtractDiseaseRequest>, JsonRejection>,
) -> ApiResult<ExtractDiseaseResponse> {
    let Json(request) = payload.map_err(rejection_error)?;
    let text = required_text(&request.text, "text")?;

    let prompt = format!("{}{}", DISEASE_EXTRACTION_PROMPT, text);
    let reply = state.reviewer.model().call(&prompt).await.map_err(|e| {
        error!(error = %e, "Disease extraction failed");
        model_error(e)
    })?;

    let disease = reply.trim().to_string();
    info!(%disease, "Disease extracted");
    Ok(Json(ExtractDiseaseResponse { disease }))
}

/// Clients may send the instructions already joined to the case notes; such a
/// text is passed through unchanged.
fn events_prompt(text: &str, prompt: &Option<String>) -> Result<String, ApiError> {
    if prompt.is_none() && text.contains(CASE_INPUT_MARKER) {
        return Ok(text.to_string());
    }
    let instructions = match prompt {
        Some(_) => required_text(prompt, "prompt")?,
        None => EVENTS_EXTRACTION_PROMPT,
    };
    Ok(format!("{}\n\n{}\n{}", instructions, CASE_INPUT_MARKER, text))
}

async fn extract_events(
    State(state): State<AppState>,
    payload: Result<Json<ExtractEventsRequest>, JsonRejection>,
) -> ApiResult<ExtractEventsResponse> {
    let Json(request) = payload.map_err(rejection_error)?;
    let text = required_text(&request.text, "text")?;
    let prompt = events_prompt(text, &request.prompt)?;
    let raw = state.reviewer.model().call(&prompt).await.map_err(|e| {
        error!(error = %e, "Event extraction failed");
        model_error(e)
    })?;

    let events = parse_events(&raw);
    info!(count = events.len(), "Actionable events extracted");
    Ok(Json(ExtractEventsResponse { events, raw }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::to_bytes;
    use std::sync::Mutex;
    use std::time::Duration;
    use tower::ServiceExt;
    use triage_flow::{
        CandidateArticle, InMemoryArticleSearch, LanguageModel, RetryPolicy, StreamStatus,
    };

    /// Answers extraction prompts with fixed text and analysis prompts with JSON.
    #[derive(Default)]
    struct CannedModel {
        prompts: Mutex<Vec<String>>,
    }

    impl CannedModel {
        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LanguageModel for CannedModel {
        async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if prompt.contains("Case input:") {
                return Ok("\"KMT2A::MLLT3 fusion\" \"CD33\"".to_string());
            }
            if prompt.contains("Case notes:") {
                return Ok("  AML\n".to_string());
            }
            if prompt.contains("<PMID>37190240</PMID>") {
                return Ok("no json here".to_string());
            }
            Ok(json!({"article_metadata": {
                "title": "t",
                "cancer_focus": true,
                "type_of_cancer": "AML",
                "paper_type": "Clinical trial",
                "actionable_events": ["KMT2A rearrangement"]
            }})
            .to_string())
        }
    }

    fn app() -> Router {
        app_with(Arc::new(CannedModel::default()))
    }

    fn app_with(model: Arc<CannedModel>) -> Router {
        let search = InMemoryArticleSearch::new(vec![
            CandidateArticle::new("37101762", "Palbociclib in KMT2A rearranged leukemia."),
            CandidateArticle::new("37190240", "FLT3 inhibitors in leukemia: a review."),
        ]);
        let reviewer =
            LiteratureReviewer::new(Arc::new(search), model, RetryPolicy::default())
                .with_item_delay(Duration::ZERO);
        build_router(AppState::new(reviewer))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_analyze_streams_ndjson() {
        let response = app()
            .oneshot(post_json("/articles/analyze", json!({"events_text": "leukemia"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            HeaderValue::from_static(NDJSON_CONTENT_TYPE)
        );
        assert!(response.headers().contains_key("x-correlation-id"));

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.ends_with('\n'));

        let events: Vec<StreamEvent> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(events.len(), 4);
        assert!(matches!(
            &events[0],
            StreamEvent::Metadata(m) if m.status == StreamStatus::Processing && m.total_articles == 2
        ));
        match &events[1] {
            StreamEvent::ArticleAnalysis(event) => {
                assert_eq!(event.progress.article_number, 1);
                assert_eq!(event.analysis.article_metadata.overall_points, 15);
            }
            other => panic!("expected an analysis event, got {other:?}"),
        }
        assert!(matches!(&events[2], StreamEvent::Error(e) if e.article_number == Some(2)));
        assert!(matches!(
            &events[3],
            StreamEvent::Metadata(m) if m.status == StreamStatus::Complete && m.current_article == 2
        ));
    }

    #[tokio::test]
    async fn test_analyze_accepts_query_alias_and_prompt_override() {
        let response = app()
            .oneshot(post_json(
                "/articles/analyze",
                json!({"query": "leukemia", "prompt": "Rubric: {article}"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_analyze_rejects_missing_query_before_streaming() {
        let response = app()
            .oneshot(post_json("/articles/analyze", json!({"events_text": "   "})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({"error": "Missing events_text field"})
        );
    }

    #[tokio::test]
    async fn test_analyze_rejects_blank_rubric() {
        let response = app()
            .oneshot(post_json(
                "/articles/analyze",
                json!({"events_text": "NRAS", "methodology_content": ""}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_analyze_rejects_malformed_body() {
        let request = Request::builder()
            .method("POST")
            .uri("/articles/analyze")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("not json"))
            .unwrap();

        let response = app().oneshot(request).await.unwrap();

        assert!(response.status().is_client_error());
        assert!(body_json(response).await.get("error").is_some());
    }

    #[tokio::test]
    async fn test_extract_disease() {
        let response = app()
            .oneshot(post_json("/extract/disease", json!({"text": "4-year-old with AML"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"disease": "AML"}));
    }

    #[tokio::test]
    async fn test_extract_events() {
        let response = app()
            .oneshot(post_json("/extract/events", json!({"text": "KMT2A::MLLT3, CD33+"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["events"], json!(["KMT2A::MLLT3 fusion", "CD33"]));
    }

    #[tokio::test]
    async fn test_extract_events_wraps_notes_in_default_prompt() {
        let model = Arc::new(CannedModel::default());
        let response = app_with(model.clone())
            .oneshot(post_json("/extract/events", json!({"text": "NRAS G12D"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            model.prompts(),
            vec![format!("{EVENTS_EXTRACTION_PROMPT}\n\nCase input:\nNRAS G12D")]
        );
    }

    #[tokio::test]
    async fn test_extract_events_passes_through_prepared_prompt() {
        let model = Arc::new(CannedModel::default());
        let text = "List the events.\n\nCase input:\nNRAS G12D";
        let response = app_with(model.clone())
            .oneshot(post_json("/extract/events", json!({"text": text})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(model.prompts(), vec![text.to_string()]);
        let body = body_json(response).await;
        assert_eq!(body["raw"], "\"KMT2A::MLLT3 fusion\" \"CD33\"");
    }

    #[tokio::test]
    async fn test_extract_requires_text() {
        let response = app()
            .oneshot(post_json("/extract/events", json!({})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }
}
