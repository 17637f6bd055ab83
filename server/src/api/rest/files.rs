//! Folder and file tree endpoints

use super::error::AppError;
use super::types::{
    CreateFolderBody, DeleteResponse, ListQueryParams, MoveBody, MoveResponse, NodePage, NodeSummary, RenameBody,
};
use crate::api::AppState;
use crate::tree::{ListQuery, MoveOutcome};
use crate::validation::{parse_node_id, parse_parent_id};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

pub fn file_routes() -> Router<AppState> {
    Router::new()
        .route("/files", get(list_nodes))
        .route("/files/folders", post(create_folder))
        .route("/files/:id", get(get_node).patch(rename_node).delete(delete_node))
        .route("/files/:id/move", post(move_node))
}

/// Children of a folder, or a global name search when `search` is set
async fn list_nodes(
    State(state): State<AppState>,
    Query(params): Query<ListQueryParams>,
) -> Result<Json<NodePage>, AppError> {
    let query = ListQuery {
        parent_id: parse_parent_id(params.parent_id.as_deref())?,
        keyword: params.search,
        is_folder: params.is_folder,
        limit: params.limit,
        offset: params.offset,
    };
    let page = state.service.list(query).await?;
    Ok(Json(page.into()))
}

async fn create_folder(
    State(state): State<AppState>,
    Json(body): Json<CreateFolderBody>,
) -> Result<(StatusCode, Json<NodeSummary>), AppError> {
    let parent_id = parse_parent_id(body.parent_id.as_deref())?;
    let node = state
        .service
        .create_folder(parent_id, &body.name, body.sort_order)
        .await?;
    Ok((StatusCode::CREATED, Json(node.into())))
}

async fn get_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<NodeSummary>, AppError> {
    let node = state.service.get(parse_node_id(&id)?).await?;
    Ok(Json(node.into()))
}

async fn rename_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RenameBody>,
) -> Result<Json<NodeSummary>, AppError> {
    let node = state.service.rename(parse_node_id(&id)?, &body.name).await?;
    Ok(Json(node.into()))
}

async fn move_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<MoveBody>,
) -> Result<Json<MoveResponse>, AppError> {
    let id = parse_node_id(&id)?;
    let parent_id = parse_parent_id(body.parent_id.as_deref())?;

    let response = match state.service.move_node(id, parent_id).await? {
        MoveOutcome::Moved(node) => MoveResponse {
            moved: true,
            node: node.into(),
        },
        MoveOutcome::AlreadyInPlace(node) => MoveResponse {
            moved: false,
            node: node.into(),
        },
    };
    Ok(Json(response))
}

async fn delete_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let report = state.service.delete(parse_node_id(&id)?).await?;
    Ok(Json(report.into()))
}
