use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::app_state::AppState;
use crate::db::queries;
use crate::models::scan::{ErrorResponse, ScanRequest, ScanResponse, ScanRow};
use crate::services::ingest::IngestError;
use crate::services::pipeline::ScanError;

/// POST /api/v1/scan — Run the scan pipeline over an uploaded label image
/// and persist the result. Aborted scans persist nothing and return one
/// generic message per cause.
pub async fn submit_scan(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> Result<Json<ScanResponse>, (StatusCode, Json<ErrorResponse>)> {
    if request.validate().is_err() {
        return Err(error_response(StatusCode::BAD_REQUEST, "No image data"));
    }

    metrics::counter!("scan_requests_total").increment(1);
    let start = std::time::Instant::now();

    let cancel = CancellationToken::new();
    let outcome = state
        .pipeline
        .run(&request.image, &cancel)
        .await
        .map_err(|e| {
            metrics::counter!("scan_failures_total").increment(1);
            tracing::warn!(error = %e, "scan aborted");
            abort_response(&e)
        })?;

    let user_id = request.user_id.unwrap_or(0);
    let scan_id = queries::insert_scan(&state.db, user_id, &outcome.image_url, &outcome.record)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to persist scan");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save scan")
        })?;

    metrics::histogram!("scan_duration_seconds").record(start.elapsed().as_secs_f64());
    tracing::info!(scan_id, user_id, "scan persisted");

    let levels = outcome.record.nutrition.levels();
    Ok(Json(ScanResponse {
        scan_id,
        image_url: outcome.image_url,
        record: outcome.record,
        levels,
    }))
}

/// GET /api/v1/scans/{id} — Fetch one stored scan.
pub async fn get_scan(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ScanRow>, (StatusCode, Json<ErrorResponse>)> {
    let scan = queries::get_scan(&state.db, id).await.map_err(|e| {
        tracing::error!(error = %e, scan_id = id, "failed to load scan");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load scan")
    })?;

    scan.map(Json)
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Scan not found"))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub user_id: i64,
    pub limit: Option<i64>,
}

/// GET /api/v1/scans?user_id=&limit= — Recent scan history for a user.
pub async fn list_scans(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ScanRow>>, (StatusCode, Json<ErrorResponse>)> {
    let limit = query.limit.unwrap_or(20).clamp(1, 50);
    let scans = queries::recent_scans(&state.db, query.user_id, limit)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, user_id = query.user_id, "failed to list scans");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load scans")
        })?;
    Ok(Json(scans))
}

fn abort_response(err: &ScanError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, message) = match err {
        ScanError::Ingest(IngestError::InvalidFormat) => {
            (StatusCode::UNSUPPORTED_MEDIA_TYPE, "Invalid image format")
        }
        ScanError::Ingest(IngestError::TooLarge { .. }) => {
            (StatusCode::PAYLOAD_TOO_LARGE, "Image exceeds 5 MB limit")
        }
        ScanError::Ingest(IngestError::Decode) => (StatusCode::BAD_REQUEST, "Base64 decode failed"),
        ScanError::Ingest(IngestError::Upload(_)) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Image upload failed")
        }
        ScanError::Ocr(_) => (StatusCode::BAD_GATEWAY, "OCR failed"),
    };
    error_response(status, message)
}

fn error_response(status: StatusCode, message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}
