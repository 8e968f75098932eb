use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::error::{ApiError, parse_path_id};
use crate::state::{
    AppState, Scope, WorkInput, WorkView, create_work, delete_work, get_work_view, list_works,
    update_work,
};

use super::ListQuery;

pub async fn work_list(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<WorkView>>, ApiError> {
    let gr = query.gr_id()?;
    Ok(Json(list_works(&state, scope, gr.as_ref()).await?))
}

pub async fn work_get(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Path(id): Path<String>,
) -> Result<Json<WorkView>, ApiError> {
    let id = parse_path_id(&id)?;
    let view = get_work_view(&state, scope, &id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("work {id} not found")))?;
    Ok(Json(view))
}

pub async fn work_create(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Json(input): Json<WorkInput>,
) -> Result<(StatusCode, Json<WorkView>), ApiError> {
    let view = create_work(&state, scope, input).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn work_update(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Path(id): Path<String>,
    Json(input): Json<WorkInput>,
) -> Result<Json<WorkView>, ApiError> {
    let id = parse_path_id(&id)?;
    Ok(Json(update_work(&state, scope, &id, input).await?))
}

pub async fn work_delete(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_path_id(&id)?;
    delete_work(&state, scope, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
