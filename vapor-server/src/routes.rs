use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use vapor_core::{
    codec::png_base64, GenerateError, GenerationParams, GenerationService, DEFAULT_DIM,
    DEFAULT_STEPS,
};

const UI_HTML: &str = include_str!("ui.html");

// Application state containing the preloaded model and device settings.
pub struct AppState {
    pub service: GenerationService,
    pub model_id: String,
    pub device: &'static str,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/v1/text2image", post(text2image))
        .route("/ui", get(ui))
        .with_state(state)
}

// Define the request/response types.
#[derive(Debug, Deserialize)]
pub struct Text2ImageRequest {
    /// Missing and empty prompts are both rejected by validation.
    #[serde(default)]
    pub prompt: String,
    pub width: Option<usize>,
    pub height: Option<usize>,
    pub num_inference_steps: Option<usize>,
    pub seed: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub image_base64: String,
    pub seed: u64,
    pub width: usize,
    pub height: usize,
    pub prompt: String,
    /// Seconds spent inside the sampler, excluding parsing and encoding.
    pub generation_time: f64,
}

#[derive(Serialize)]
struct ServiceInfo {
    message: &'static str,
    status: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model: String,
    device: &'static str,
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

/// Caller-visible failure: a client error for out-of-bounds parameters, a
/// server error for anything raised downstream. Either way the body is a
/// single diagnostic `detail` string.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl From<GenerateError> for ApiError {
    fn from(err: GenerateError) -> Self {
        match err {
            GenerateError::InvalidParameter(msg) => Self::BadRequest(msg),
            err @ GenerateError::Sampler(_) => Self::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            Self::Internal(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail),
        };
        (status, Json(ErrorBody { detail })).into_response()
    }
}

async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "Vapor text2image server",
        status: "running",
    })
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        model: state.model_id.clone(),
        device: state.device,
    })
}

async fn ui() -> Html<&'static str> {
    Html(UI_HTML)
}

pub async fn text2image(
    State(state): State<Arc<AppState>>,
    Json(request): Json<Text2ImageRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    // Validation happens before any model work; out-of-range input never
    // reaches the service.
    let params = GenerationParams::new(
        request.prompt,
        request.width.unwrap_or(DEFAULT_DIM),
        request.height.unwrap_or(DEFAULT_DIM),
        request.num_inference_steps.unwrap_or(DEFAULT_STEPS),
        request.seed,
    )?;
    let steps = params.steps;

    // Sampling is compute-bound for seconds; run it on a blocking worker so
    // the event loop keeps serving health probes and concurrent requests.
    let service = state.service.clone();
    let generation = match tokio::task::spawn_blocking(move || service.generate(&params)).await {
        Ok(Ok(generation)) => generation,
        Ok(Err(err)) => {
            if let GenerateError::Sampler(ref source) = err {
                error!(error = ?source, "generation failed");
            }
            return Err(err.into());
        }
        Err(join_err) => {
            error!(error = %join_err, "generation task panicked");
            return Err(ApiError::Internal(format!(
                "generation task failed: {join_err}"
            )));
        }
    };

    let image_base64 = png_base64(&generation.image)
        .map_err(|e| ApiError::Internal(format!("failed to encode image: {e}")))?;

    info!(
        elapsed = format_args!("{:.2}s", generation.elapsed.as_secs_f64()),
        width = generation.width,
        height = generation.height,
        steps,
        seed = generation.seed,
        "text2image complete"
    );

    Ok(Json(GenerateResponse {
        image_base64,
        seed: generation.seed,
        width: generation.width,
        height: generation.height,
        prompt: generation.prompt,
        generation_time: generation.elapsed.as_secs_f64(),
    }))
}
