use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::error::{ApiError, parse_path_id};
use crate::state::{
    AppState, Scope, SpillInput, SpillView, create_spill, delete_spill, get_spill, list_spills,
    update_spill,
};

use super::ListQuery;

pub async fn spill_list(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<SpillView>>, ApiError> {
    let work = query.work_id()?;
    Ok(Json(list_spills(&state, scope, work.as_ref()).await?))
}

pub async fn spill_get(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Path(id): Path<String>,
) -> Result<Json<SpillView>, ApiError> {
    let id = parse_path_id(&id)?;
    let view = get_spill(&state, scope, &id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("spill {id} not found")))?;
    Ok(Json(view))
}

pub async fn spill_create(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Json(input): Json<SpillInput>,
) -> Result<(StatusCode, Json<SpillView>), ApiError> {
    let view = create_spill(&state, scope, input).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn spill_update(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Path(id): Path<String>,
    Json(input): Json<SpillInput>,
) -> Result<Json<SpillView>, ApiError> {
    let id = parse_path_id(&id)?;
    Ok(Json(update_spill(&state, scope, &id, input).await?))
}

pub async fn spill_delete(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_path_id(&id)?;
    delete_spill(&state, scope, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
