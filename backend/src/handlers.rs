// HTTP handlers for track file ingestion and route helpers
// Errors leave as IngestError, rendered as `{ "message": ... }`

use axum::{
    extract::{multipart::Field, Multipart, Path, State},
    http::HeaderMap,
    Json,
};
use shared::{Coordinate, DaySplitRequest, IngestResponse, SimplifyRequest, SplitSuggestion};

use crate::auth::bearer_token;
use crate::database::TrackFileRecord;
use crate::day_split::suggest_day_splits;
use crate::error::IngestError;
use crate::ingest::Upload;
use crate::simplify::simplify_route;
use crate::AppState;

/// POST /api/track-files - Upload a GPX file for a route-owning entity
///
/// Multipart fields: `owner_id`, `file` and optionally `target_days`.
pub async fn upload_track_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<IngestResponse>, IngestError> {
    let credential = bearer_token(&headers)?.to_string();
    let max_bytes = state.ingest.settings().max_upload_bytes;

    let mut owner_id = None;
    let mut file = None;
    let mut target_days = None;

    while let Some(field) = multipart.next_field().await.map_err(invalid_multipart)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("owner_id") => {
                owner_id = Some(field.text().await.map_err(invalid_multipart)?);
            }
            Some("target_days") => {
                let raw = field.text().await.map_err(invalid_multipart)?;
                let days = raw.trim().parse::<usize>().map_err(|_| {
                    IngestError::InvalidRequest(format!("target_days must be a whole number, got {raw:?}"))
                })?;
                target_days = Some(days);
            }
            Some("file") => {
                let filename = field.file_name().unwrap_or("track.gpx").to_string();
                let content = read_capped(field, max_bytes).await?;
                file = Some((filename, content));
            }
            other => {
                tracing::debug!("ignoring multipart field {:?}", other);
            }
        }
    }

    let owner_id =
        owner_id.ok_or_else(|| IngestError::InvalidRequest("missing owner_id field".to_string()))?;
    let (filename, content) =
        file.ok_or_else(|| IngestError::InvalidRequest("missing file field".to_string()))?;

    let response = state
        .ingest
        .ingest(
            &credential,
            Upload {
                owner_id,
                filename,
                content,
                target_days,
            },
        )
        .await?;

    Ok(Json(response))
}

/// GET /api/track-files/:owner_id - Latest stored upload for an owner
pub async fn get_track_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(owner_id): Path<String>,
) -> Result<Json<TrackFileRecord>, IngestError> {
    let credential = bearer_token(&headers)?;
    state.ingest.record(credential, &owner_id).await.map(Json)
}

/// POST /api/day-splits - Suggest where to break a track into days
pub async fn day_splits(Json(req): Json<DaySplitRequest>) -> Json<Vec<SplitSuggestion>> {
    Json(suggest_day_splits(&req.points, req.target_days))
}

/// POST /api/simplify - Douglas-Peucker simplification
pub async fn simplify(
    State(state): State<AppState>,
    Json(req): Json<SimplifyRequest>,
) -> Result<Json<Vec<Coordinate>>, IngestError> {
    let tolerance = req
        .tolerance
        .unwrap_or(state.ingest.settings().simplify_tolerance);
    if !tolerance.is_finite() || tolerance < 0.0 {
        return Err(IngestError::InvalidRequest(format!(
            "tolerance must be a non-negative number, got {tolerance}"
        )));
    }
    Ok(Json(simplify_route(&req.points, tolerance)))
}

async fn read_capped(mut field: Field<'_>, max_bytes: usize) -> Result<Vec<u8>, IngestError> {
    let mut content = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(invalid_multipart)? {
        let size = content.len() + chunk.len();
        if size > max_bytes {
            return Err(IngestError::TooLarge {
                size,
                max: max_bytes,
            });
        }
        content.extend_from_slice(&chunk);
    }
    Ok(content)
}

fn invalid_multipart(err: axum::extract::multipart::MultipartError) -> IngestError {
    IngestError::InvalidRequest(format!("malformed multipart body: {err}"))
}
