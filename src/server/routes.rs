//! Axum route handlers for the document Q&A server.
//!
//! # Routes
//!
//! - `GET    /`              — HTML page (upload form, question form, history)
//! - `POST   /upload`        — Multipart upload from the page, re-renders it
//! - `POST   /ask`           — Question form from the page, re-renders it
//! - `POST   /api/documents` — Multipart upload, returns an `IngestReport`
//! - `POST   /api/ask`       — `{"question": ...}` -> `{"answer", "history"}`
//! - `GET    /api/history`   — Chat history as JSON
//! - `DELETE /api/history`   — Clear the chat history
//! - `GET    /health`        — Liveness probe

use std::sync::Arc;

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{FormRejection, JsonRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tera::Tera;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::views::{self, PageView};
use crate::document::UploadedFile;
use crate::error::{RagError, Result};
use crate::history::ChatHistory;
use crate::pipeline::{IngestPipeline, IngestReport, DEFAULT_DOC_ID};
use crate::response::ResponseGenerator;

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestPipeline>,
    pub responder: Arc<ResponseGenerator>,
    /// One conversation shared by every client.
    pub history: Arc<RwLock<ChatHistory>>,
    pub templates: Arc<Tera>,
    /// Doc id used when an upload does not name one.
    pub doc_id: String,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(pipeline: IngestPipeline, responder: ResponseGenerator) -> Result<Self> {
        Ok(Self {
            pipeline: Arc::new(pipeline),
            responder: Arc::new(responder),
            history: Arc::new(RwLock::new(ChatHistory::new())),
            templates: Arc::new(views::load_templates()?),
            doc_id: DEFAULT_DOC_ID.to_string(),
            max_upload_bytes: 20 * 1024 * 1024,
        })
    }

    pub fn with_doc_id(mut self, doc_id: impl Into<String>) -> Self {
        self.doc_id = doc_id.into();
        self
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    fn render(&self, view: &PageView) -> Result<String> {
        let history = self.history.read().clone();
        views::render_page(&self.templates, view, &history)
    }

    /// Answer against a snapshot of the history, then record the exchange.
    ///
    /// The lock is not held across the agent run.
    async fn answer(&self, question: &str) -> Result<String> {
        let snapshot = self.history.read().clone();
        let answer = self.responder.get_response(question, &snapshot).await?;
        self.history
            .write()
            .record_exchange(question.trim(), answer.clone());
        Ok(answer)
    }
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;
    Router::new()
        .route("/", get(index_handler))
        .route("/upload", post(upload_page_handler))
        .route("/ask", post(ask_page_handler))
        .route("/api/documents", post(upload_api_handler))
        .route("/api/ask", post(ask_api_handler))
        .route(
            "/api/history",
            get(history_handler).delete(clear_history_handler),
        )
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// HTTP status for a pipeline failure.
fn status_for(err: &RagError) -> StatusCode {
    if err.is_client_error() {
        return StatusCode::BAD_REQUEST;
    }
    match err {
        RagError::Embedding { .. }
        | RagError::VectorStore { .. }
        | RagError::Llm { .. }
        | RagError::Http(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn log_failure(status: StatusCode, err: &RagError) {
    if status.is_server_error() {
        tracing::error!("Request failed: {}", err);
    } else {
        tracing::warn!("Request rejected: {}", err);
    }
}

fn json_error(err: RagError) -> (StatusCode, Json<Value>) {
    let status = status_for(&err);
    log_failure(status, &err);
    (status, Json(serde_json::json!({ "error": err.to_string() })))
}

/// Render the page with an error banner, keeping the failure's status code.
fn page_error(state: &AppState, err: RagError) -> Response {
    let status = status_for(&err);
    log_failure(status, &err);
    match state.render(&PageView::error(err.to_string())) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(render_err) => {
            tracing::error!("Failed to render page: {}", render_err);
            (StatusCode::INTERNAL_SERVER_ERROR, render_err.to_string()).into_response()
        }
    }
}

fn page(state: &AppState, view: PageView) -> Response {
    match state.render(&view) {
        Ok(html) => Html(html).into_response(),
        Err(err) => page_error(state, err),
    }
}

// ---------------------------------------------------------------------------
// Multipart
// ---------------------------------------------------------------------------

/// Fields accepted by both upload routes.
struct UploadForm {
    file: UploadedFile,
    doc_id: Option<String>,
}

async fn read_upload(mut multipart: Multipart) -> Result<UploadForm> {
    let mut file = None;
    let mut doc_id = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| RagError::invalid_request(format!("malformed multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| {
                    RagError::invalid_request(format!("failed to read '{}': {}", file_name, e))
                })?;
                let mut upload = UploadedFile::new(file_name, bytes);
                if let Some(content_type) = content_type {
                    upload = upload.with_content_type(content_type);
                }
                file = Some(upload);
            }
            Some("doc_id") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| RagError::invalid_request(format!("invalid doc_id: {}", e)))?;
                let value = value.trim();
                if !value.is_empty() {
                    doc_id = Some(value.to_string());
                }
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| RagError::invalid_request("missing multipart field 'file'"))?;
    Ok(UploadForm { file, doc_id })
}

/// Turn an extractor rejection into a client error so it gets the usual error shape.
fn rejected(rejection: impl std::fmt::Display) -> RagError {
    RagError::invalid_request(rejection.to_string())
}

async fn ingest(
    state: &AppState,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<IngestReport> {
    let form = read_upload(multipart.map_err(rejected)?).await?;
    let doc_id = form.doc_id.unwrap_or_else(|| state.doc_id.clone());
    state.pipeline.process_upload(&form.file, &doc_id).await
}

// ---------------------------------------------------------------------------
// HTML handlers
// ---------------------------------------------------------------------------

/// GET / — the page.
async fn index_handler(State(state): State<AppState>) -> Response {
    page(&state, PageView::default())
}

/// POST /upload — ingest from the page form.
async fn upload_page_handler(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response {
    match ingest(&state, multipart).await {
        Ok(report) => {
            tracing::info!(
                "Uploaded '{}' as '{}' ({} chunks)",
                report.file_name,
                report.doc_id,
                report.chunks
            );
            page(&state, PageView::notice(views::UPLOAD_SUCCESS))
        }
        Err(err) => page_error(&state, err),
    }
}

#[derive(Debug, Default, Deserialize)]
struct AskForm {
    #[serde(default)]
    question: String,
}

/// POST /ask — answer from the page form.
async fn ask_page_handler(
    State(state): State<AppState>,
    form: std::result::Result<Form<AskForm>, FormRejection>,
) -> Response {
    let Form(form) = match form {
        Ok(form) => form,
        Err(rejection) => return page_error(&state, rejected(rejection)),
    };
    match state.answer(&form.question).await {
        Ok(answer) => page(&state, PageView::answered(form.question.trim(), answer)),
        Err(err) => page_error(&state, err),
    }
}

// ---------------------------------------------------------------------------
// JSON handlers
// ---------------------------------------------------------------------------

/// POST /api/documents — ingest and report.
async fn upload_api_handler(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<Json<IngestReport>, (StatusCode, Json<Value>)> {
    ingest(&state, multipart).await.map(Json).map_err(json_error)
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub history: ChatHistory,
}

/// POST /api/ask — answer and return the updated history.
async fn ask_api_handler(
    State(state): State<AppState>,
    request: std::result::Result<Json<AskRequest>, JsonRejection>,
) -> std::result::Result<Json<AskResponse>, (StatusCode, Json<Value>)> {
    let Json(request) = request.map_err(|rejection| json_error(rejected(rejection)))?;
    let answer = state.answer(&request.question).await.map_err(json_error)?;
    let history = state.history.read().clone();
    Ok(Json(AskResponse { answer, history }))
}

/// GET /api/history
async fn history_handler(State(state): State<AppState>) -> Json<ChatHistory> {
    Json(state.history.read().clone())
}

/// DELETE /api/history
async fn clear_history_handler(State(state): State<AppState>) -> StatusCode {
    state.history.write().clear();
    tracing::info!("Chat history cleared");
    StatusCode::NO_CONTENT
}

/// GET /health — liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
        "service": "docqa",
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::test_support::ScriptedModel;
    use crate::agent::AgentSettings;
    use crate::chunking::TextChunker;
    use crate::vector_db::test_support::LetterEmbedder;
    use crate::vector_db::{DocumentIndex, InMemoryStore};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    const BOUNDARY: &str = "docqa-test-boundary";

    fn test_state(responses: &[&str]) -> (AppState, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new(26));
        let index = DocumentIndex::new(Arc::new(LetterEmbedder), store.clone());
        let pipeline = IngestPipeline::new(TextChunker::default(), index.clone());
        let model = Arc::new(ScriptedModel::new(responses.iter().copied()));
        let responder = ResponseGenerator::new(model, index, 4, AgentSettings::default());
        (AppState::new(pipeline, responder).unwrap(), store)
    }

    fn multipart_body(file_name: &str, content: &str, doc_id: Option<&str>) -> String {
        let mut body = String::new();
        if let Some(doc_id) = doc_id {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"doc_id\"\r\n\r\n{doc_id}\r\n"
            ));
        }
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n{content}\r\n--{BOUNDARY}--\r\n"
        ));
        body
    }

    fn upload_request(uri: &str, body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (state, _) = test_state(&[]);
        let app = app_router(state);

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], crate::VERSION);
        assert_eq!(json["service"], "docqa");
    }

    #[tokio::test]
    async fn test_index_page() {
        let (state, _) = test_state(&[]);
        let response = app_router(state)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_string(response).await;
        assert!(html.contains(&views::PAGE_TITLE.replace('&', "&amp;")));
    }

    #[tokio::test]
    async fn test_api_upload_reports_chunks() {
        let (state, store) = test_state(&[]);
        let body = multipart_body("notes.txt", "Scaled dot-product attention.", Some("paper"));
        let response = app_router(state)
            .oneshot(upload_request("/api/documents", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["doc_id"], "paper");
        assert_eq!(json["kind"], "text");
        assert_eq!(json["chunks"], 1);
        assert_eq!(store.ids(), vec!["paper0".to_string()]);
    }

    #[tokio::test]
    async fn test_api_upload_unsupported_type() {
        let (state, _) = test_state(&[]);
        let body = multipart_body("image.png", "not text", None);
        let response = app_router(state)
            .oneshot(upload_request("/api/documents", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert!(json["error"].as_str().unwrap().contains("image.png"));
    }

    #[tokio::test]
    async fn test_page_upload_shows_success() {
        let (state, store) = test_state(&[]);
        let body = multipart_body("notes.txt", "Multi-head attention.", None);
        let response = app_router(state)
            .oneshot(upload_request("/upload", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains(views::UPLOAD_SUCCESS));
        assert_eq!(store.ids(), vec!["attention0".to_string()]);
    }

    #[tokio::test]
    async fn test_api_ask_updates_history() {
        let (state, _) = test_state(&["Thought: Do I need to use a tool? No\nAI: Hello there."]);
        let app = app_router(state.clone());

        let request = Request::builder()
            .method("POST")
            .uri("/api/ask")
            .header("Content-Type", "application/json")
            .body(Body::from(r#"{"question":"hi"}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["answer"], "Hello there.");
        assert_eq!(json["history"][0]["role"], "User");
        assert_eq!(json["history"][1]["message"], "Hello there.");
        assert_eq!(state.history.read().len(), 2);
    }

    #[tokio::test]
    async fn test_api_ask_blank_question() {
        let (state, _) = test_state(&[]);
        let request = Request::builder()
            .method("POST")
            .uri("/api/ask")
            .header("Content-Type", "application/json")
            .body(Body::from(r#"{"question":"   "}"#))
            .unwrap();
        let response = app_router(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.history.read().is_empty());
    }

    async fn assert_json_bad_request(response: Response) {
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
        assert!(content_type.starts_with("application/json"));
        let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert!(json["error"].as_str().is_some_and(|e| !e.is_empty()));
    }

    #[tokio::test]
    async fn test_api_ask_malformed_body_is_json_error() {
        for body in [r#"{not json"#, r#"{"question":5}"#, r#"{}"#] {
            let (state, _) = test_state(&[]);
            let request = Request::builder()
                .method("POST")
                .uri("/api/ask")
                .header("Content-Type", "application/json")
                .body(Body::from(body))
                .unwrap();
            let response = app_router(state.clone()).oneshot(request).await.unwrap();
            assert_json_bad_request(response).await;
            assert!(state.history.read().is_empty());
        }
    }

    #[tokio::test]
    async fn test_api_ask_missing_content_type_is_json_error() {
        let (state, _) = test_state(&[]);
        let request = Request::builder()
            .method("POST")
            .uri("/api/ask")
            .body(Body::from(r#"{"question":"hi"}"#))
            .unwrap();
        let response = app_router(state).oneshot(request).await.unwrap();
        assert_json_bad_request(response).await;
    }

    #[tokio::test]
    async fn test_api_upload_without_multipart_is_json_error() {
        let (state, store) = test_state(&[]);
        let request = Request::builder()
            .method("POST")
            .uri("/api/documents")
            .header("Content-Type", "text/plain")
            .body(Body::from("just text"))
            .unwrap();
        let response = app_router(state).oneshot(request).await.unwrap();
        assert_json_bad_request(response).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_page_upload_without_multipart_renders_error() {
        let (state, _) = test_state(&[]);
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header("Content-Type", "text/plain")
            .body(Body::from("just text"))
            .unwrap();
        let response = app_router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let html = body_string(response).await;
        assert!(html.contains("class=\"error\""));
    }

    #[tokio::test]
    async fn test_page_ask_without_form_renders_error() {
        let (state, _) = test_state(&[]);
        let request = Request::builder()
            .method("POST")
            .uri("/ask")
            .header("Content-Type", "application/json")
            .body(Body::from(r#"{"question":"hi"}"#))
            .unwrap();
        let response = app_router(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let html = body_string(response).await;
        assert!(html.contains("class=\"error\""));
        assert!(state.history.read().is_empty());
    }

    #[tokio::test]
    async fn test_api_ask_llm_failure_is_bad_gateway() {
        // An empty script makes the model fail like an unreachable upstream.
        let (state, _) = test_state(&[]);
        let request = Request::builder()
            .method("POST")
            .uri("/api/ask")
            .header("Content-Type", "application/json")
            .body(Body::from(r#"{"question":"anything"}"#))
            .unwrap();
        let response = app_router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_page_ask_renders_answer_and_history() {
        let (state, _) = test_state(&["AI: Six layers."]);
        let request = Request::builder()
            .method("POST")
            .uri("/ask")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(Body::from("question=How+many+layers%3F"))
            .unwrap();
        let response = app_router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_string(response).await;
        assert!(html.contains("🤖 Answer:"));
        assert!(html.contains("<strong>User:</strong> How many layers?"));
        assert!(html.contains("<strong>Agent:</strong> Six layers."));
    }

    #[tokio::test]
    async fn test_clear_history() {
        let (state, _) = test_state(&[]);
        state.history.write().record_exchange("q", "a");

        let request = Request::builder()
            .method("DELETE")
            .uri("/api/history")
            .body(Body::empty())
            .unwrap();
        let response = app_router(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(state.history.read().is_empty());

        let request = Request::builder()
            .uri("/api/history")
            .body(Body::empty())
            .unwrap();
        let response = app_router(state).oneshot(request).await.unwrap();
        assert_eq!(body_string(response).await, "[]");
    }
}
