use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, Request, State},
    http::StatusCode,
};
use chrono::Utc;

use crate::error::{ApiError, parse_path_id};
use crate::state::{
    AppState, BillInput, BillView, Scope, create_bill, delete_bill, get_bill_view, list_bills,
    update_bill,
};
use crate::uploads::store_document;

use super::{Body, FormBody, ListQuery, parse_body};

fn input_from_form(form: &FormBody) -> Result<BillInput, ApiError> {
    Ok(BillInput {
        tender_id: form.required("tender_id")?.to_string(),
        bill_number: form.required("bill_number")?.to_string(),
        date: form.date_optional("date")?,
        work_portion: form.f64_required("work_portion")?,
        royalty_and_testing: form.f64_or_zero("royalty_and_testing")?,
        reimbursement_of_insurance: form.f64_or_zero("reimbursement_of_insurance")?,
        security_deposit: form.f64_or_zero("security_deposit")?,
        insurance: form.f64_or_zero("insurance")?,
        royalty: form.f64_or_zero("royalty")?,
        gst_percentage: form.f64_optional("gst_percentage")?,
        tds_percentage: form.f64_optional("tds_percentage")?,
        gst_on_workportion_percentage: form.f64_optional("gst_on_workportion_percentage")?,
        lwc_percentage: form.f64_optional("lwc_percentage")?,
        payment_done_from_gr: form.optional("payment_done_from_gr"),
        gst: form.f64_optional("gst")?,
        bill_total: form.f64_optional("bill_total")?,
        tds: form.f64_optional("tds")?,
        gst_on_workportion: form.f64_optional("gst_on_workportion")?,
        lwc: form.f64_optional("lwc")?,
        net_amount: form.f64_optional("net_amount")?,
    })
}

fn document_from_form(form: &FormBody, input: &BillInput) -> Result<Option<String>, ApiError> {
    match form.file("document") {
        Some((filename, bytes)) => {
            let date = input.date.unwrap_or_else(|| Utc::now().date_naive());
            store_document("bills", date, filename, bytes).map(Some)
        }
        None => Ok(None),
    }
}

pub async fn bill_list(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<BillView>>, ApiError> {
    let gr = query.gr_id()?;
    let work = query.work_id()?;
    let tender = query.tender_id()?;
    Ok(Json(
        list_bills(&state, scope, gr.as_ref(), work.as_ref(), tender.as_ref()).await?,
    ))
}

pub async fn bill_get(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Path(id): Path<String>,
) -> Result<Json<BillView>, ApiError> {
    let id = parse_path_id(&id)?;
    let view = get_bill_view(&state, scope, &id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("bill {id} not found")))?;
    Ok(Json(view))
}

pub async fn bill_create(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    request: Request,
) -> Result<(StatusCode, Json<BillView>), ApiError> {
    let (input, document) = match parse_body::<BillInput>(request).await? {
        Body::Json(input) => (input, None),
        Body::Form(form) => {
            let input = input_from_form(&form)?;
            let document = document_from_form(&form, &input)?;
            (input, document)
        }
    };
    let view = create_bill(&state, scope, input, document).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn bill_update(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Path(id): Path<String>,
    request: Request,
) -> Result<Json<BillView>, ApiError> {
    let id = parse_path_id(&id)?;
    let (input, document) = match parse_body::<BillInput>(request).await? {
        Body::Json(input) => (input, None),
        Body::Form(form) => {
            let input = input_from_form(&form)?;
            let document = document_from_form(&form, &input)?;
            (input, document)
        }
    };
    Ok(Json(update_bill(&state, scope, &id, input, document).await?))
}

pub async fn bill_delete(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_path_id(&id)?;
    delete_bill(&state, scope, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
