//! Chunked upload endpoints: probe, chunk, abandon, merge

use super::error::AppError;
use super::types::{ChunkResponse, MergeBody, NodeSummary, ProbeQuery, ProbeResponse};
use crate::api::AppState;
use crate::storage::MergeRequest;
use crate::validation::parse_parent_id;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};

pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/files/upload/check", get(check_upload))
        .route("/files/upload/merge", post(merge_upload))
        .route("/files/upload/:hash", delete(abandon_upload))
        .route("/files/upload/:hash/:index", put(upload_chunk))
}

async fn check_upload(
    State(state): State<AppState>,
    Query(query): Query<ProbeQuery>,
) -> Result<Json<ProbeResponse>, AppError> {
    let parent_id = parse_parent_id(query.parent_id.as_deref())?;
    let result = state.service.probe_upload(&query.hash, parent_id).await?;
    Ok(Json(result.into()))
}

/// Raw chunk bytes in the body; retries of a received chunk are harmless
async fn upload_chunk(
    State(state): State<AppState>,
    Path((hash, index)): Path<(String, i64)>,
    body: Bytes,
) -> Result<Json<ChunkResponse>, AppError> {
    let status = state.service.upload_chunk(&hash, index, &body).await?;
    Ok(Json(ChunkResponse { status }))
}

async fn abandon_upload(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<StatusCode, AppError> {
    state.service.abandon_upload(&hash).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn merge_upload(
    State(state): State<AppState>,
    Json(body): Json<MergeBody>,
) -> Result<Json<NodeSummary>, AppError> {
    let request = MergeRequest {
        content_hash: body.hash,
        file_name: body.file_name,
        parent_id: parse_parent_id(body.parent_id.as_deref())?,
        total_chunks: body.total_chunks,
        size_bytes: body.size_bytes,
    };
    let node = state.service.complete_upload(request).await?;
    Ok(Json(node.into()))
}
