use bson::{DateTime, doc, oid::ObjectId};
use chrono::{NaiveDate, Utc};
use futures::stream::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::calc::{
    DEFAULT_CONTINGENCY_PCT, DEFAULT_GST_PCT, DEFAULT_LABOUR_INSURANCE_PCT, Derived,
    SanctionAmounts, SanctionInputs, effective_pct, recompute_sanction, sync_flag_date,
};
use crate::error::{ApiError, parse_body_id};
use crate::models::{CancelReason, TechnicalSanction, Work};

use super::{AppState, Scope, works::fmt_ts, works::get_work};

#[derive(Debug, Deserialize)]
pub struct SanctionInput {
    pub work_id: String,
    #[serde(default)]
    pub sub_name: Option<String>,
    pub work_portion: f64,
    pub royalty: f64,
    pub testing: f64,
    pub consultancy: f64,
    #[serde(default)]
    pub gst_percentage: Option<f64>,
    #[serde(default)]
    pub contingency_percentage: Option<f64>,
    #[serde(default)]
    pub labour_insurance_percentage: Option<f64>,
    #[serde(default)]
    pub noting: Option<bool>,
    #[serde(default)]
    pub noting_date: Option<NaiveDate>,
    #[serde(default)]
    pub order: Option<bool>,
    #[serde(default)]
    pub order_date: Option<NaiveDate>,
    // Manual overrides for derived amounts. Supplying one pins it;
    // omitting it on update reverts the field to auto-calculation.
    #[serde(default)]
    pub work_portion_total: Option<f64>,
    #[serde(default)]
    pub gst: Option<f64>,
    #[serde(default)]
    pub grand_total: Option<f64>,
    #[serde(default)]
    pub contingency: Option<f64>,
    #[serde(default)]
    pub labour_insurance: Option<f64>,
    #[serde(default)]
    pub final_total: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct SanctionView {
    pub id: String,
    pub work_id: String,
    pub work_name: String,
    pub gr_id: String,
    pub gr_number: String,
    pub aa: f64,
    pub work_is_cancelled: bool,
    pub work_cancel_reason: Option<CancelReason>,
    pub work_cancel_details: Option<String>,
    pub sub_name: Option<String>,
    pub work_portion: f64,
    pub royalty: f64,
    pub testing: f64,
    pub consultancy: f64,
    pub gst_percentage: f64,
    pub contingency_percentage: f64,
    pub labour_insurance_percentage: f64,
    pub work_portion_total: Derived,
    pub gst: Derived,
    pub grand_total: Derived,
    pub contingency: Derived,
    pub labour_insurance: Derived,
    pub final_total: Derived,
    pub noting: bool,
    pub noting_date: Option<NaiveDate>,
    pub order: bool,
    pub order_date: Option<NaiveDate>,
    pub is_demo: bool,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

async fn build_sanction_view(
    state: &AppState,
    ts: &TechnicalSanction,
) -> Result<SanctionView, ApiError> {
    let work: Option<Work> = state.works.find_one(doc! { "_id": &ts.work_id }).await?;
    let gr = match &work {
        Some(w) => state.grs.find_one(doc! { "_id": &w.gr_id }).await?,
        None => None,
    };

    Ok(SanctionView {
        id: ts.id.map(|id| id.to_hex()).unwrap_or_default(),
        work_id: ts.work_id.to_hex(),
        work_name: work.as_ref().map(|w| w.name_of_work.clone()).unwrap_or_default(),
        gr_id: gr
            .as_ref()
            .and_then(|g| g.id)
            .map(|id| id.to_hex())
            .unwrap_or_default(),
        gr_number: gr.as_ref().map(|g| g.gr_number.clone()).unwrap_or_default(),
        aa: work.as_ref().map(|w| w.aa).unwrap_or(0.0),
        work_is_cancelled: work.as_ref().map(|w| w.is_cancelled).unwrap_or(false),
        work_cancel_reason: work.as_ref().and_then(|w| w.cancel_reason),
        work_cancel_details: work.as_ref().and_then(|w| w.cancel_details.clone()),
        sub_name: ts.sub_name.clone(),
        work_portion: ts.work_portion,
        royalty: ts.royalty,
        testing: ts.testing,
        consultancy: ts.consultancy,
        gst_percentage: ts.gst_percentage,
        contingency_percentage: ts.contingency_percentage,
        labour_insurance_percentage: ts.labour_insurance_percentage,
        work_portion_total: ts.amounts.work_portion_total,
        gst: ts.amounts.gst,
        grand_total: ts.amounts.grand_total,
        contingency: ts.amounts.contingency,
        labour_insurance: ts.amounts.labour_insurance,
        final_total: ts.amounts.final_total,
        noting: ts.noting,
        noting_date: ts.noting_date,
        order: ts.order,
        order_date: ts.order_date,
        is_demo: ts.is_demo,
        created_at: fmt_ts(ts.created_at),
        updated_at: fmt_ts(ts.updated_at),
    })
}

/// Work ids under a GR within a partition, for gr-scoped child listings.
pub(super) async fn work_ids_of_gr(
    state: &AppState,
    scope: Scope,
    gr_id: &ObjectId,
) -> Result<Vec<ObjectId>, ApiError> {
    let mut cursor = state
        .works
        .find(doc! { "gr_id": gr_id, "is_demo": scope.is_demo() })
        .await?;
    let mut ids = Vec::new();
    while let Some(work) = cursor.try_next().await? {
        if let Some(id) = work.id {
            ids.push(id);
        }
    }
    Ok(ids)
}

pub async fn list_sanctions(
    state: &AppState,
    scope: Scope,
    gr: Option<&ObjectId>,
    work: Option<&ObjectId>,
) -> Result<Vec<SanctionView>, ApiError> {
    let mut filter = doc! { "is_demo": scope.is_demo() };
    if let Some(work_id) = work {
        filter.insert("work_id", work_id);
    } else if let Some(gr_id) = gr {
        let ids = work_ids_of_gr(state, scope, gr_id).await?;
        filter.insert("work_id", doc! { "$in": ids });
    }
    let mut cursor = state
        .sanctions
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .await?;
    let mut views = Vec::new();
    while let Some(ts) = cursor.try_next().await? {
        views.push(build_sanction_view(state, &ts).await?);
    }
    Ok(views)
}

pub async fn get_sanction(
    state: &AppState,
    scope: Scope,
    id: &ObjectId,
) -> Result<Option<TechnicalSanction>, ApiError> {
    state
        .sanctions
        .find_one(doc! { "_id": id, "is_demo": scope.is_demo() })
        .await
        .map_err(Into::into)
}

pub async fn get_sanction_view(
    state: &AppState,
    scope: Scope,
    id: &ObjectId,
) -> Result<Option<SanctionView>, ApiError> {
    match get_sanction(state, scope, id).await? {
        Some(ts) => build_sanction_view(state, &ts).await.map(Some),
        None => Ok(None),
    }
}

fn sanction_inputs(ts: &TechnicalSanction) -> SanctionInputs {
    SanctionInputs {
        work_portion: ts.work_portion,
        royalty: ts.royalty,
        testing: ts.testing,
        consultancy: ts.consultancy,
        gst_pct: ts.gst_percentage,
        contingency_pct: ts.contingency_percentage,
        labour_insurance_pct: ts.labour_insurance_percentage,
    }
}

async fn require_work(
    state: &AppState,
    scope: Scope,
    raw_id: &str,
) -> Result<ObjectId, ApiError> {
    let work_id = parse_body_id(raw_id, "work_id")?;
    if get_work(state, scope, &work_id).await?.is_none() {
        return Err(ApiError::validation(
            "work_id",
            format!("work {raw_id} does not exist in this partition"),
        ));
    }
    Ok(work_id)
}

pub async fn create_sanction(
    state: &AppState,
    scope: Scope,
    input: SanctionInput,
) -> Result<SanctionView, ApiError> {
    let work_id = require_work(state, scope, &input.work_id).await?;
    let today = Utc::now().date_naive();

    let mut amounts = SanctionAmounts::default();
    // On create, a supplied derived value is pinned from the start.
    amounts.work_portion_total.apply_override(input.work_portion_total);
    amounts.gst.apply_override(input.gst);
    amounts.grand_total.apply_override(input.grand_total);
    amounts.contingency.apply_override(input.contingency);
    amounts.labour_insurance.apply_override(input.labour_insurance);
    amounts.final_total.apply_override(input.final_total);

    let mut ts = TechnicalSanction {
        id: None,
        work_id,
        sub_name: input.sub_name,
        work_portion: input.work_portion,
        royalty: input.royalty,
        testing: input.testing,
        consultancy: input.consultancy,
        gst_percentage: effective_pct(input.gst_percentage, DEFAULT_GST_PCT),
        contingency_percentage: effective_pct(input.contingency_percentage, DEFAULT_CONTINGENCY_PCT),
        labour_insurance_percentage: effective_pct(
            input.labour_insurance_percentage,
            DEFAULT_LABOUR_INSURANCE_PCT,
        ),
        amounts,
        noting: input.noting.unwrap_or(false),
        noting_date: input.noting_date,
        order: input.order.unwrap_or(false),
        order_date: input.order_date,
        is_demo: scope.is_demo(),
        created_at: Some(DateTime::from_system_time(SystemTime::now())),
        updated_at: None,
    };
    recompute_sanction(&sanction_inputs(&ts), &mut ts.amounts);
    sync_flag_date(ts.noting, &mut ts.noting_date, today);
    sync_flag_date(ts.order, &mut ts.order_date, today);

    let res = state.sanctions.insert_one(&ts).await?;
    ts.id = res.inserted_id.as_object_id();
    build_sanction_view(state, &ts).await
}

pub async fn update_sanction(
    state: &AppState,
    scope: Scope,
    id: &ObjectId,
    input: SanctionInput,
) -> Result<SanctionView, ApiError> {
    let mut ts = get_sanction(state, scope, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("technical sanction {id} not found")))?;
    let work_id = require_work(state, scope, &input.work_id).await?;
    let today = Utc::now().date_naive();

    ts.work_id = work_id;
    ts.sub_name = input.sub_name;
    ts.work_portion = input.work_portion;
    ts.royalty = input.royalty;
    ts.testing = input.testing;
    ts.consultancy = input.consultancy;
    ts.gst_percentage = effective_pct(input.gst_percentage, DEFAULT_GST_PCT);
    ts.contingency_percentage =
        effective_pct(input.contingency_percentage, DEFAULT_CONTINGENCY_PCT);
    ts.labour_insurance_percentage = effective_pct(
        input.labour_insurance_percentage,
        DEFAULT_LABOUR_INSURANCE_PCT,
    );

    // On update an omitted override reverts the field to auto-calculation.
    ts.amounts.work_portion_total.apply_override(input.work_portion_total);
    ts.amounts.gst.apply_override(input.gst);
    ts.amounts.grand_total.apply_override(input.grand_total);
    ts.amounts.contingency.apply_override(input.contingency);
    ts.amounts.labour_insurance.apply_override(input.labour_insurance);
    ts.amounts.final_total.apply_override(input.final_total);
    recompute_sanction(&sanction_inputs(&ts), &mut ts.amounts);

    ts.noting = input.noting.unwrap_or(ts.noting);
    if let Some(date) = input.noting_date {
        ts.noting_date = Some(date);
    }
    ts.order = input.order.unwrap_or(ts.order);
    if let Some(date) = input.order_date {
        ts.order_date = Some(date);
    }
    sync_flag_date(ts.noting, &mut ts.noting_date, today);
    sync_flag_date(ts.order, &mut ts.order_date, today);

    ts.updated_at = Some(DateTime::from_system_time(SystemTime::now()));
    state.sanctions.replace_one(doc! { "_id": id }, &ts).await?;
    build_sanction_view(state, &ts).await
}

/// Delete a sanction; tenders that referenced it keep running with the
/// reference nulled out.
pub async fn delete_sanction(
    state: &AppState,
    scope: Scope,
    id: &ObjectId,
) -> Result<(), ApiError> {
    let deleted = state
        .sanctions
        .delete_one(doc! { "_id": id, "is_demo": scope.is_demo() })
        .await?;
    if deleted.deleted_count == 0 {
        return Err(ApiError::not_found(format!(
            "technical sanction {id} not found"
        )));
    }
    state
        .tenders
        .update_many(
            doc! { "technical_sanction_id": id },
            doc! { "$set": { "technical_sanction_id": null } },
        )
        .await?;
    Ok(())
}
