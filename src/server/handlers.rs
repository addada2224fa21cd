use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE, LOCATION},
        StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::cache::tile_file_name;
use crate::error::SliceMapError;
use crate::fingerprint::Fingerprint;
use crate::jobs::JobStatus;
use crate::server::api::*;
use crate::server::state::AppState;
use crate::service::MapParameters;

pub async fn service_status() -> Json<ServiceStatus> {
    Json(ServiceStatus {
        status: "running".to_string(),
    })
}

pub async fn get_server_info(State(state): State<Arc<AppState>>) -> Json<ApiResponse<ServerInfo>> {
    let info = ServerInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        cache_directory: state.cache_dir.clone(),
        active_jobs: state.registry().len(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    };

    Json(ApiResponse::success(info))
}

fn queue_location(fingerprint: &Fingerprint) -> String {
    format!("/queue/{}", fingerprint)
}

fn map_location(fingerprint: &Fingerprint) -> String {
    format!("/maps/{}", fingerprint)
}

fn parse_key(map_id: &str) -> Result<Fingerprint, AppError> {
    Fingerprint::parse(map_id).ok_or(AppError::NotFound)
}

/// Tile indices that are not a non-negative integer name no tile
fn parse_subset_index(subset_index: &str) -> Result<u32, AppError> {
    subset_index.parse().map_err(|_| AppError::NotFound)
}

pub async fn create_map(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateMapRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;

    tracing::debug!(
        "🗺️  Map requested for {}/{} (origin {:?}, dimensions {:?}, {} subset(s) at {}px)",
        request.user,
        request.dataset,
        request.origin,
        request.dimensions,
        request.subsets,
        request.size
    );

    let handle = state
        .service
        .request_map(MapParameters {
            token: request.token,
            user: request.user,
            dataset: request.dataset,
            origin: request.origin,
            dimensions: request.dimensions,
            subset_count: request.subsets,
            output_size: request.size,
        })
        .await?;

    let body = CreateMapResponse {
        id: handle.fingerprint.to_string(),
        started: handle.started,
    };

    Ok((
        StatusCode::ACCEPTED,
        [(LOCATION, queue_location(&handle.fingerprint))],
        Json(body),
    )
        .into_response())
}

pub async fn check_queue(
    State(state): State<Arc<AppState>>,
    Path(map_id): Path<String>,
) -> Result<Response, AppError> {
    let fingerprint = parse_key(&map_id)?;
    let status = state.service.check_status(&fingerprint);

    let response = match status {
        JobStatus::Done => (
            [(LOCATION, map_location(&fingerprint))],
            Json(QueueStatusResponse::from(status)),
        )
            .into_response(),
        other => Json(QueueStatusResponse::from(other)).into_response(),
    };

    Ok(response)
}

pub async fn get_tile(
    State(state): State<Arc<AppState>>,
    Path((map_id, subset_index)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let fingerprint = parse_key(&map_id)?;
    let subset_index = parse_subset_index(&subset_index)?;
    let bytes = state.service.fetch_tile(&fingerprint, subset_index).await?;

    let mime_type = mime_guess::from_path(tile_file_name(subset_index)).first_or_octet_stream();

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, mime_type.to_string()),
            (CACHE_CONTROL, "public, max-age=86400".to_string()),
        ],
        bytes,
    ))
}

// Error handling
#[derive(Debug)]
pub enum AppError {
    NotFound,
    BadRequest(String),
    Upstream { status: u16, message: Option<String> },
    BadGateway(String),
    InternalError(String),
}

impl From<SliceMapError> for AppError {
    fn from(err: SliceMapError) -> Self {
        match err {
            SliceMapError::Validation(msg) => AppError::BadRequest(msg),
            SliceMapError::UpstreamAuth { status, message } => AppError::Upstream { status, message },
            SliceMapError::NotFound => AppError::NotFound,
            SliceMapError::Http(e) => AppError::BadGateway(e.to_string()),
            other => AppError::InternalError(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::NotFound => {
                tracing::warn!("🔍 Resource not found");
                (StatusCode::NOT_FOUND, "Resource not found".to_string())
            }
            AppError::BadRequest(msg) => {
                tracing::warn!("❌ Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, msg)
            }
            AppError::Upstream { status, message } => {
                let code = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
                tracing::warn!("🔒 Metadata service rejected request: {}", code);
                let msg = message.unwrap_or_else(|| {
                    code.canonical_reason()
                        .unwrap_or("Upstream request failed")
                        .to_string()
                });
                (code, msg)
            }
            AppError::BadGateway(msg) => {
                tracing::error!("🌐 Metadata service unreachable: {}", msg);
                (StatusCode::BAD_GATEWAY, msg)
            }
            AppError::InternalError(msg) => {
                tracing::error!("⚠️  Internal server error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(ApiResponse::<()>::error(error_message))).into_response()
    }
}
