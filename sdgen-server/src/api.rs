use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use base64::{prelude::BASE64_STANDARD, Engine};
use image::DynamicImage;
use sdgen_core::{
    GenerateError, Generation, GenerationRequest, Generator, Loader, Mode, OutputFiles,
    ProgressCallback, ProgressSnapshot, ProgressTracker,
};
use serde::{Deserialize, Serialize};
use std::{
    io::Cursor,
    sync::{Arc, Mutex},
};

/// Object-safe view of a [`Generator`] so the router does not carry the loader type.
pub trait Generate: Send {
    fn generate(
        &mut self,
        request: &GenerationRequest,
        mode: &str,
        seed_image: Option<DynamicImage>,
        progress: &mut dyn ProgressCallback,
    ) -> sdgen_core::Result<Generation>;
}

impl<L> Generate for Generator<L>
where
    L: Loader + Send,
{
    fn generate(
        &mut self,
        request: &GenerationRequest,
        mode: &str,
        seed_image: Option<DynamicImage>,
        progress: &mut dyn ProgressCallback,
    ) -> sdgen_core::Result<Generation> {
        Generator::generate(self, request, mode, seed_image, progress)
    }
}

#[derive(Deserialize)]
pub struct ImageRequest {
    pub mode: String,
    #[serde(flatten)]
    pub request: GenerationRequest,
    /// Base64-encoded seed image for img2img.
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Serialize)]
pub struct ImageResponse {
    pub image: String,
    pub files: OutputFiles,
}

// Application state shared by every handler. Generations are serialised on the mutex.
#[derive(Clone)]
pub struct AppState {
    generator: Arc<Mutex<dyn Generate>>,
    progress: ProgressTracker,
}

impl AppState {
    pub fn new(generator: impl Generate + 'static) -> Self {
        Self {
            generator: Arc::new(Mutex::new(generator)),
            progress: ProgressTracker::new(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/images/generations", post(generate_image_handler))
        .route("/v1/progress", get(progress_handler))
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl From<GenerateError> for ApiError {
    fn from(e: GenerateError) -> Self {
        if e.is_invalid_request() {
            ApiError::BadRequest(e.to_string())
        } else {
            ApiError::Internal(format!("{e:#}"))
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => {
                log::warn!("Rejected request: {message}");
                (StatusCode::BAD_REQUEST, message)
            }
            ApiError::Internal(message) => {
                log::error!("Error generating image: {message}");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };
        (status, format!("Error: {message}")).into_response()
    }
}

fn image_to_base64_png(img: &DynamicImage) -> Result<String, ApiError> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(BASE64_STANDARD.encode(&bytes))
}

fn decode_seed_image(encoded: &str) -> Result<DynamicImage, ApiError> {
    let bytes = BASE64_STANDARD
        .decode(encoded)
        .map_err(|e| ApiError::BadRequest(format!("seed image is not valid base64: {e}")))?;
    image::load_from_memory(&bytes)
        .map_err(|e| ApiError::BadRequest(format!("seed image could not be decoded: {e}")))
}

pub async fn generate_image_handler(
    State(state): State<AppState>,
    Json(req): Json<ImageRequest>,
) -> Result<Json<ImageResponse>, ApiError> {
    // Only img2img reads the seed image, so other modes never fail on it.
    let seed_image = match Mode::from_name(&req.mode) {
        Some(mode) if mode.needs_seed_image() => {
            req.image.as_deref().map(decode_seed_image).transpose()?
        }
        _ => None,
    };

    let AppState {
        generator,
        progress,
    } = state;
    let generation = tokio::task::spawn_blocking(move || {
        let mut generator = generator
            .lock()
            .map_err(|_| ApiError::Internal("generator lock poisoned".to_string()))?;
        progress.reset(req.request.steps);
        let mut callback = progress.callback();
        generator
            .generate(&req.request, &req.mode, seed_image, &mut callback)
            .map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("generation task failed: {e}")))??;

    Ok(Json(ImageResponse {
        image: image_to_base64_png(&generation.image)?,
        files: generation.files,
    }))
}

pub async fn progress_handler(State(state): State<AppState>) -> Json<ProgressSnapshot> {
    Json(state.progress.snapshot())
}
