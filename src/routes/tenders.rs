use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, Request, State},
    http::StatusCode,
};
use chrono::Utc;

use crate::error::{ApiError, parse_path_id};
use crate::state::{
    AppState, Scope, TenderInput, TenderView, create_tender, delete_tender, get_tender_view,
    list_tenders, update_tender,
};
use crate::uploads::store_document;

use super::{Body, FormBody, ListQuery, parse_body};

fn input_from_form(form: &FormBody) -> Result<TenderInput, ApiError> {
    Ok(TenderInput {
        work_id: form.required("work_id")?.to_string(),
        technical_sanction_id: form.optional("technical_sanction_id"),
        tender_number: form.required("tender_number")?.to_string(),
        agency_name: form.required("agency_name")?.to_string(),
        date: form.date_optional("date")?,
        online: form.bool_optional("online")?,
        online_date: form.date_optional("online_date")?,
        offline: form.bool_optional("offline")?,
        offline_date: form.date_optional("offline_date")?,
        technical_verification: form.bool_optional("technical_verification")?,
        technical_verification_date: form.date_optional("technical_verification_date")?,
        financial_verification: form.bool_optional("financial_verification")?,
        financial_verification_date: form.date_optional("financial_verification_date")?,
        loa: form.bool_optional("loa")?,
        loa_date: form.date_optional("loa_date")?,
        work_order_tick: form.bool_optional("work_order_tick")?,
        work_order_tick_date: form.date_optional("work_order_tick_date")?,
        emd_supporting: form.bool_optional("emd_supporting")?,
        supporting_date: form.date_optional("supporting_date")?,
        emd_awarded: form.bool_optional("emd_awarded")?,
        awarded_date: form.date_optional("awarded_date")?,
    })
}

fn work_order_from_form(form: &FormBody, input: &TenderInput) -> Result<Option<String>, ApiError> {
    match form.file("work_order") {
        Some((filename, bytes)) => {
            let date = input.date.unwrap_or_else(|| Utc::now().date_naive());
            store_document("tenders", date, filename, bytes).map(Some)
        }
        None => Ok(None),
    }
}

pub async fn tender_list(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<TenderView>>, ApiError> {
    let gr = query.gr_id()?;
    let work = query.work_id()?;
    let sanction = query.sanction_id()?;
    Ok(Json(
        list_tenders(&state, scope, gr.as_ref(), work.as_ref(), sanction.as_ref()).await?,
    ))
}

pub async fn tender_get(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Path(id): Path<String>,
) -> Result<Json<TenderView>, ApiError> {
    let id = parse_path_id(&id)?;
    let view = get_tender_view(&state, scope, &id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("tender {id} not found")))?;
    Ok(Json(view))
}

pub async fn tender_create(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    request: Request,
) -> Result<(StatusCode, Json<TenderView>), ApiError> {
    let (input, work_order) = match parse_body::<TenderInput>(request).await? {
        Body::Json(input) => (input, None),
        Body::Form(form) => {
            let input = input_from_form(&form)?;
            let work_order = work_order_from_form(&form, &input)?;
            (input, work_order)
        }
    };
    let view = create_tender(&state, scope, input, work_order).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn tender_update(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Path(id): Path<String>,
    request: Request,
) -> Result<Json<TenderView>, ApiError> {
    let id = parse_path_id(&id)?;
    let (input, work_order) = match parse_body::<TenderInput>(request).await? {
        Body::Json(input) => (input, None),
        Body::Form(form) => {
            let input = input_from_form(&form)?;
            let work_order = work_order_from_form(&form, &input)?;
            (input, work_order)
        }
    };
    Ok(Json(
        update_tender(&state, scope, &id, input, work_order).await?,
    ))
}

pub async fn tender_delete(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_path_id(&id)?;
    delete_tender(&state, scope, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
