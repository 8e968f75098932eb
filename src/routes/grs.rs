use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Request, State},
    http::StatusCode,
};

use crate::error::{ApiError, parse_path_id};
use crate::state::{
    AppState, GrInput, GrView, Scope, create_gr, delete_gr, get_gr, list_grs, update_gr,
};
use crate::uploads::store_document;

use super::{Body, FormBody, parse_body};

fn input_from_form(form: &FormBody) -> Result<GrInput, ApiError> {
    Ok(GrInput {
        gr_number: form.required("gr_number")?.to_string(),
        date: form.date_required("date")?,
    })
}

fn document_from_form(form: &FormBody, input: &GrInput) -> Result<Option<String>, ApiError> {
    match form.file("document") {
        Some((filename, bytes)) => {
            store_document("grs", input.date, filename, bytes).map(Some)
        }
        None => Ok(None),
    }
}

pub async fn gr_list(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
) -> Result<Json<Vec<GrView>>, ApiError> {
    let grs = list_grs(&state, scope).await?;
    Ok(Json(grs.iter().map(GrView::of).collect()))
}

pub async fn gr_get(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Path(id): Path<String>,
) -> Result<Json<GrView>, ApiError> {
    let id = parse_path_id(&id)?;
    let gr = get_gr(&state, scope, &id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("GR {id} not found")))?;
    Ok(Json(GrView::of(&gr)))
}

pub async fn gr_create(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    request: Request,
) -> Result<(StatusCode, Json<GrView>), ApiError> {
    let (input, document) = match parse_body::<GrInput>(request).await? {
        Body::Json(input) => (input, None),
        Body::Form(form) => {
            let input = input_from_form(&form)?;
            let document = document_from_form(&form, &input)?;
            (input, document)
        }
    };
    let gr = create_gr(&state, scope, input, document).await?;
    Ok((StatusCode::CREATED, Json(GrView::of(&gr))))
}

pub async fn gr_update(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Path(id): Path<String>,
    request: Request,
) -> Result<Json<GrView>, ApiError> {
    let id = parse_path_id(&id)?;
    let (input, document) = match parse_body::<GrInput>(request).await? {
        Body::Json(input) => (input, None),
        Body::Form(form) => {
            let input = input_from_form(&form)?;
            let document = document_from_form(&form, &input)?;
            (input, document)
        }
    };
    let gr = update_gr(&state, scope, &id, input, document).await?;
    Ok(Json(GrView::of(&gr)))
}

pub async fn gr_delete(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_path_id(&id)?;
    delete_gr(&state, scope, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
