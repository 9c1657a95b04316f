//! HTTP API server implementation

use axum::{
    body::Bytes,
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::chat::{AskOptions, Assistant, ChatTurn, PromptStyle};
use crate::core::config::AppConfig;
use crate::core::errors::DocChatError;
use crate::core::models::{CostBreakdown, TranslationResult, UploadFile, UsageRecord, SUPPORTED_LANGUAGES};

/// Application state
#[derive(Clone)]
pub struct AppState {
    assistant: Arc<Assistant>,
}

impl AppState {
    pub fn new(assistant: Assistant) -> Self {
        Self {
            assistant: Arc::new(assistant),
        }
    }
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    service: String,
    version: String,
}

#[derive(Serialize)]
struct LanguageInfo {
    code: String,
    name: String,
}

#[derive(Serialize)]
struct FilesResponse {
    container: String,
    files: Vec<String>,
}

#[derive(Serialize)]
struct UploadResponse {
    name: String,
    container: String,
}

#[derive(Serialize)]
struct DocumentResponse {
    name: String,
    content: String,
}

/// Question for the assistant
#[derive(Deserialize)]
pub struct ChatRequest {
    pub input: String,
    pub deployment: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Answer-only-from-the-documents preamble
    #[serde(default)]
    pub instructed: bool,
    /// Custom preamble, implies `instructed`
    pub preamble: Option<String>,
    pub target_language: Option<String>,
}

/// Text to translate
#[derive(Deserialize)]
pub struct TranslateRequest {
    pub text: String,
    pub target_lang: String,
}

/// Usage counters to price
#[derive(Deserialize)]
pub struct CostRequest {
    pub deployment: Option<String>,
    pub usage: Option<UsageRecord>,
}

#[derive(Serialize)]
struct CostResponse {
    deployment: String,
    cost: CostBreakdown,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Map an error onto a status code and JSON body
fn error_response(err: DocChatError) -> ApiError {
    let (status, code) = match &err {
        DocChatError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        DocChatError::InvalidInput { .. } => (StatusCode::BAD_REQUEST, "invalid_request"),
        DocChatError::CostDataMissing => (StatusCode::BAD_REQUEST, "cost_data_missing"),
        DocChatError::DecodeError { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "decode_error"),
        e if e.is_upstream() => (StatusCode::BAD_GATEWAY, "upstream_error"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };

    if status.is_server_error() {
        warn!("Request failed: {}", err);
    }

    (
        status,
        Json(ErrorResponse {
            error: ErrorDetail {
                message: err.to_string(),
                code: code.to_string(),
            },
        }),
    )
}

/// Health check handler
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "docchat".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn get_languages() -> Json<Vec<LanguageInfo>> {
    Json(
        SUPPORTED_LANGUAGES
            .iter()
            .map(|(code, name)| LanguageInfo {
                code: code.to_string(),
                name: name.to_string(),
            })
            .collect(),
    )
}

async fn list_files(State(state): State<AppState>) -> ApiResult<FilesResponse> {
    let files = state.assistant.list_documents().await.map_err(error_response)?;
    Ok(Json(FilesResponse {
        container: state.assistant.storage().container().to_string(),
        files,
    }))
}

async fn upload_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<UploadResponse> {
    let name = state
        .assistant
        .upload(UploadFile::new(name, body))
        .await
        .map_err(error_response)?;
    Ok(Json(UploadResponse {
        name,
        container: state.assistant.storage().container().to_string(),
    }))
}

async fn read_file(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<DocumentResponse> {
    let content = state.assistant.read_document(&name).await.map_err(error_response)?;
    Ok(Json(DocumentResponse { name, content }))
}

async fn chat(State(state): State<AppState>, Json(payload): Json<ChatRequest>) -> ApiResult<ChatTurn> {
    if payload.input.trim().is_empty() {
        return Err(error_response(DocChatError::invalid_input("input must not be empty")));
    }

    let defaults = AskOptions::default();
    let style = match (payload.preamble, payload.instructed) {
        (Some(preamble), _) => PromptStyle::Instructed(Some(preamble)),
        (None, true) => PromptStyle::Instructed(None),
        (None, false) => PromptStyle::Chat,
    };
    let options = AskOptions {
        deployment: payload.deployment,
        temperature: payload.temperature.unwrap_or(defaults.temperature),
        max_tokens: payload.max_tokens.unwrap_or(defaults.max_tokens),
        style,
    };

    let turn = match payload.target_language.as_deref() {
        Some(lang) => state.assistant.ask_and_translate(&payload.input, &options, lang).await,
        None => state.assistant.ask(&payload.input, &options).await,
    }
    .map_err(error_response)?;

    Ok(Json(turn))
}

async fn translate(
    State(state): State<AppState>,
    Json(payload): Json<TranslateRequest>,
) -> ApiResult<TranslationResult> {
    let result = state
        .assistant
        .translate_reply(&payload.text, &payload.target_lang)
        .await
        .map_err(error_response)?;
    Ok(Json(result))
}

async fn cost(State(state): State<AppState>, Json(payload): Json<CostRequest>) -> ApiResult<CostResponse> {
    let deployment = payload
        .deployment
        .unwrap_or_else(|| state.assistant.completion().default_deployment().to_string());
    let cost = state
        .assistant
        .pricing()
        .compute(&deployment, payload.usage.as_ref())
        .map_err(error_response)?;
    Ok(Json(CostResponse { deployment, cost }))
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/v1/languages", get(get_languages))
        .route("/v1/files", get(list_files))
        .route("/v1/files/:name", get(read_file).put(upload_file))
        .route("/v1/chat", post(chat))
        .route("/v1/translate", post(translate))
        .route("/v1/cost", post(cost))
        .with_state(state)
}

/// Run the HTTP server
pub async fn run_server(config: AppConfig, host: String, port: u16) -> anyhow::Result<()> {
    let assistant = Assistant::new(&config)?;
    let app = router(AppState::new(assistant));

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
