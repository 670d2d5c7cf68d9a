use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use car_serve::{ClassifyError, ImageClassifier, Prediction};
use log::{info, warn};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};

use crate::line::{LineBot, LineError, Message, WebhookPayload};

/// Reply sent to the chat user when an uploaded photo cannot be
/// classified.
const CLASSIFY_FAILED_REPLY: &str = "画像を判定できませんでした";

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub struct AppState {
    pub classifier: Arc<ImageClassifier>,
    pub line: Option<LineBot>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing multipart field 'file'")]
    MissingFile,

    #[error("invalid multipart request: {0}")]
    Multipart(#[from] MultipartError),

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error("invalid webhook signature")]
    BadSignature,

    #[error("invalid webhook payload: {0}")]
    BadPayload(#[from] serde_json::Error),

    #[error("webhook is not configured")]
    WebhookDisabled,

    #[error(transparent)]
    Line(#[from] LineError),

    #[error("classification task failed")]
    TaskFailed,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFile
            | ApiError::Multipart(_)
            | ApiError::BadSignature
            | ApiError::BadPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::Classify(ClassifyError::Decode(_)) => StatusCode::BAD_REQUEST,
            ApiError::Classify(_) | ApiError::TaskFailed => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::WebhookDisabled => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Line(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/predict", post(predict))
        .route("/callback", post(callback))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

/// `POST /predict`: multipart form with an image under the `file`
/// field. Returns `{"class_name": ...}` or an error body with a 4xx
/// status for client mistakes.
async fn predict(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Prediction>, ApiError> {
    let mut data: Option<Bytes> = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            data = Some(field.bytes().await?);
            break;
        }
    }
    let data = data.ok_or(ApiError::MissingFile)?;

    let prediction = classify_on_pool(Arc::clone(&state.classifier), data).await?;
    Ok(Json(prediction))
}

/// `POST /callback`: LINE webhook. Image messages get classified and
/// answered with the label; text messages are echoed back.
async fn callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    let bot = state.line.as_ref().ok_or(ApiError::WebhookDisabled)?;

    let signature = headers
        .get("x-line-signature")
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::BadSignature)?;
    if !bot.verify_signature(&body, signature) {
        return Err(ApiError::BadSignature);
    }

    let payload: WebhookPayload = serde_json::from_slice(&body)?;

    for event in payload.events {
        let reply_token = match event.reply_token {
            Some(token) => token,
            None => continue,
        };

        match event.message {
            Some(Message::Text { text, .. }) => {
                bot.reply_text(&reply_token, &text).await?;
            }
            Some(Message::Image { id }) => {
                let content = bot.message_content(&id).await?;
                let reply =
                    match classify_on_pool(Arc::clone(&state.classifier), content).await {
                        Ok(prediction) => prediction.class_name,
                        Err(err) => {
                            warn!("webhook classification failed: {}", err);
                            CLASSIFY_FAILED_REPLY.to_owned()
                        }
                    };
                bot.reply_text(&reply_token, &reply).await?;
            }
            _ => {
                info!("ignoring webhook event of type '{}'", event.kind);
            }
        }
    }

    Ok("OK")
}

/// Inference is synchronous and CPU-bound; run it off the async
/// runtime on the blocking pool.
async fn classify_on_pool(
    classifier: Arc<ImageClassifier>,
    data: Bytes,
) -> Result<Prediction, ApiError> {
    tokio::task::spawn_blocking(move || classifier.classify_bytes(&data))
        .await
        .map_err(|_| ApiError::TaskFailed)?
        .map_err(ApiError::from)
}
