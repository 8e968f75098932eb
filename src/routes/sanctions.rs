use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::error::{ApiError, parse_path_id};
use crate::state::{
    AppState, SanctionInput, SanctionView, Scope, create_sanction, delete_sanction,
    get_sanction_view, list_sanctions, update_sanction,
};

use super::ListQuery;

pub async fn sanction_list(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<SanctionView>>, ApiError> {
    let gr = query.gr_id()?;
    let work = query.work_id()?;
    Ok(Json(
        list_sanctions(&state, scope, gr.as_ref(), work.as_ref()).await?,
    ))
}

pub async fn sanction_get(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Path(id): Path<String>,
) -> Result<Json<SanctionView>, ApiError> {
    let id = parse_path_id(&id)?;
    let view = get_sanction_view(&state, scope, &id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("technical sanction {id} not found")))?;
    Ok(Json(view))
}

pub async fn sanction_create(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Json(input): Json<SanctionInput>,
) -> Result<(StatusCode, Json<SanctionView>), ApiError> {
    let view = create_sanction(&state, scope, input).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn sanction_update(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Path(id): Path<String>,
    Json(input): Json<SanctionInput>,
) -> Result<Json<SanctionView>, ApiError> {
    let id = parse_path_id(&id)?;
    Ok(Json(update_sanction(&state, scope, &id, input).await?))
}

pub async fn sanction_delete(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_path_id(&id)?;
    delete_sanction(&state, scope, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
