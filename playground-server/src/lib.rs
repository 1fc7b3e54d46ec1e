use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use playground_exec::{CodeExecutionService, ExecutionRequest, ExecutionResult, Language};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{collections::BTreeMap, net::SocketAddr, sync::Arc};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

pub mod snippets;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Execution(#[from] playground_exec::Error),
    #[error("Server error: {0}")]
    Server(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            ServerError::Execution(e) if e.is_service_fault() => {
                (StatusCode::SERVICE_UNAVAILABLE, e.kind().as_str())
            }
            ServerError::Execution(e) => (StatusCode::BAD_REQUEST, e.kind().as_str()),
            ServerError::Server(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        let body = json!({
            "error": {
                "kind": kind,
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ExecuteRequest {
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub input: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub status: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub truncated: bool,
    pub duration_ms: u64,
}

impl From<ExecutionResult> for ExecuteResponse {
    fn from(result: ExecutionResult) -> Self {
        Self {
            status: result.status.to_string(),
            stdout: result.stdout_lossy(),
            stderr: result.stderr_lossy(),
            exit_code: result.status.exit_code(),
            truncated: result.truncated,
            duration_ms: result.duration.as_millis() as u64,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    service: Arc<CodeExecutionService>,
}

pub fn create_app(service: CodeExecutionService) -> Router {
    let state = AppState {
        service: Arc::new(service),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_check))
        .route("/playground", get(welcome))
        .route("/playground/default", get(default_code))
        .route("/playground/execute", post(execute))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn run_server(app: Router, addr: SocketAddr) -> Result<(), ServerError> {
    info!("Starting playground server on {}", addr);
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Server(e.to_string()))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| ServerError::Server(e.to_string()))?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn welcome() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Welcome to the code playground API. Send a POST request to /playground/execute"
    }))
}

async fn default_code(State(state): State<AppState>) -> Json<BTreeMap<&'static str, &'static str>> {
    Json(snippets::catalogue(state.service.registry()))
}

async fn execute(
    State(state): State<AppState>,
    Json(payload): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, ServerError> {
    let language: Language = payload
        .language
        .parse()
        .map_err(playground_exec::Error::from)?;

    let mut request = ExecutionRequest::new(language, payload.code);
    if let Some(input) = payload.input {
        request = request.with_input(input);
    }

    let result = state.service.execute(request).await?;
    Ok(Json(result.into()))
}
