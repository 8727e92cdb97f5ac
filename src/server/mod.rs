mod page;

pub use page::{DEFAULT_DESCRIPTION, DEFAULT_TITLE, Theme, UiConfig, render_page};

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        DefaultBodyLimit, Multipart, Path, State,
        multipart::MultipartError,
    },
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{CaptionError, CaptionModel, CaptionOutcome, CaptionResponse, EngineError, input};

/// Text shown to users when a caption could not be generated.
pub const FALLBACK_MESSAGE: &str = "Sorry, an error occurred during caption generation.";

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Body of a successful `POST /caption`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptionReply {
    pub id: u64,
    pub caption: String,
    pub status: String,
    pub duration_ms: u128,
}

impl From<CaptionResponse> for CaptionReply {
    fn from(response: CaptionResponse) -> Self {
        let status = match &response.outcome {
            CaptionOutcome::Caption(_) => "success",
            CaptionOutcome::Failed(_) => "failed",
        };
        Self {
            id: response.id,
            caption: response.outcome.text_or(FALLBACK_MESSAGE).to_string(),
            status: status.to_string(),
            duration_ms: response.duration.as_millis(),
        }
    }
}

struct AppState<M: CaptionModel + Send + 'static> {
    engine: Arc<crate::CaptionEngine<M>>,
    ui: Arc<UiConfig>,
}

impl<M: CaptionModel + Send + 'static> Clone for AppState<M> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            ui: self.ui.clone(),
        }
    }
}

enum ApiError {
    BadRequest(String),
    Multipart(MultipartError),
    NotFound(String),
    Unavailable(String),
}

impl From<CaptionError> for ApiError {
    fn from(e: CaptionError) -> Self {
        match e {
            CaptionError::InvalidInputKind(_) => ApiError::BadRequest(e.to_string()),
            e => ApiError::Unavailable(e.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::Multipart(e)
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Unavailable(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(e) => (StatusCode::BAD_REQUEST, e),
            // oversized uploads map to 413, malformed bodies to 400
            ApiError::Multipart(e) => (e.status(), e.body_text()),
            ApiError::NotFound(e) => (StatusCode::NOT_FOUND, e),
            ApiError::Unavailable(e) => {
                log::error!("Caption request failed: {e}");
                (StatusCode::SERVICE_UNAVAILABLE, e)
            }
        };
        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// Build the router serving the captioning page and its API.
///
/// Routes:
/// * `GET /` - the upload page
/// * `POST /caption` - caption the multipart field `image`
/// * `GET /examples/{index}` - an example image
/// * `POST /examples/{index}/caption` - caption an example image
/// * `GET /status` - engine state
pub fn router<M: CaptionModel + Send + 'static>(
    engine: Arc<crate::CaptionEngine<M>>,
    ui: UiConfig,
) -> Router {
    let state = AppState {
        engine,
        ui: Arc::new(ui),
    };

    Router::new()
        .route("/", get(index::<M>))
        .route("/caption", post(post_caption::<M>))
        .route("/examples/{index}", get(get_example::<M>))
        .route("/examples/{index}/caption", post(post_example_caption::<M>))
        .route("/status", get(get_status::<M>))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

async fn index<M: CaptionModel + Send + 'static>(
    State(state): State<AppState<M>>,
) -> Html<String> {
    Html(render_page(&state.ui))
}

async fn post_caption<M: CaptionModel + Send + 'static>(
    State(state): State<AppState<M>>,
    mut multipart: Multipart,
) -> Result<Json<CaptionReply>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            continue;
        }
        let bytes = field.bytes().await?;
        return caption_bytes(state.engine.clone(), bytes).await;
    }

    Err(ApiError::BadRequest("missing multipart field `image`".to_string()))
}

async fn get_example<M: CaptionModel + Send + 'static>(
    State(state): State<AppState<M>>,
    Path(index): Path<usize>,
) -> Result<Response, ApiError> {
    let path = example_path(&state.ui, index)?;
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    let mime = image::ImageFormat::from_path(path)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream");

    Ok(([(header::CONTENT_TYPE, mime)], bytes).into_response())
}

async fn post_example_caption<M: CaptionModel + Send + 'static>(
    State(state): State<AppState<M>>,
    Path(index): Path<usize>,
) -> Result<Json<CaptionReply>, ApiError> {
    let path = example_path(&state.ui, index)?;
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    caption_bytes(state.engine.clone(), Bytes::from(bytes)).await
}

async fn get_status<M: CaptionModel + Send + 'static>(
    State(state): State<AppState<M>>,
) -> impl IntoResponse {
    Json(json!({
        "state": state.engine.state().as_str(),
        "pending": state.engine.pending(),
        "model": state.engine.model_name(),
    }))
}

fn example_path(ui: &UiConfig, index: usize) -> Result<&std::path::Path, ApiError> {
    ui.examples()
        .get(index)
        .map(|p| p.as_path())
        .ok_or_else(|| ApiError::NotFound(format!("no example with index {index}")))
}

// decoding and inference both block, keep them off the async workers
async fn caption_bytes<M: CaptionModel + Send + 'static>(
    engine: Arc<crate::CaptionEngine<M>>,
    bytes: Bytes,
) -> Result<Json<CaptionReply>, ApiError> {
    let response = tokio::task::spawn_blocking(move || -> Result<CaptionResponse, ApiError> {
        let image = input::decode_image(&bytes)?;
        let ticket = engine.schedule(image)?;
        log::info!("Scheduled caption #{}", ticket.id());
        Ok(ticket.wait()?)
    })
    .await
    .map_err(|e| ApiError::Unavailable(e.to_string()))??;

    log::info!(
        "Caption #{} finished in {:?}",
        response.id,
        response.duration
    );

    Ok(Json(response.into()))
}
