use bson::{DateTime, doc, oid::ObjectId};
use chrono::{NaiveDate, Utc};
use futures::stream::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::error::{ApiError, parse_body_id};
use crate::models::{CancelReason, Spill, Work};

use super::{AppState, Scope, grs::get_gr};

#[derive(Debug, Deserialize)]
pub struct WorkInput {
    pub gr_id: String,
    pub name_of_work: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    pub aa: f64,
    #[serde(default)]
    pub ra: Option<f64>,
    #[serde(default)]
    pub is_cancelled: Option<bool>,
    #[serde(default)]
    pub cancel_reason: Option<CancelReason>,
    #[serde(default)]
    pub cancel_details: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SpillInput {
    pub work_id: String,
    pub ara: f64,
}

#[derive(Debug, Serialize)]
pub struct SpillView {
    pub id: String,
    pub work_id: String,
    pub ara: f64,
    pub is_demo: bool,
    pub created_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WorkView {
    pub id: String,
    pub gr_id: String,
    pub gr_number: String,
    pub name_of_work: String,
    pub date: NaiveDate,
    pub aa: f64,
    pub ra: f64,
    pub total_ara: f64,
    pub is_cancelled: bool,
    pub cancel_reason: Option<CancelReason>,
    pub cancel_details: Option<String>,
    pub spills: Vec<SpillView>,
    pub is_demo: bool,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

pub(super) fn fmt_ts(ts: Option<DateTime>) -> Option<String> {
    ts.and_then(|t| t.try_to_rfc3339_string().ok())
}

fn spill_view(spill: &Spill) -> SpillView {
    SpillView {
        id: spill.id.map(|id| id.to_hex()).unwrap_or_default(),
        work_id: spill.work_id.to_hex(),
        ara: spill.ara,
        is_demo: spill.is_demo,
        created_at: fmt_ts(spill.created_at),
    }
}

pub async fn get_work(
    state: &AppState,
    scope: Scope,
    id: &ObjectId,
) -> Result<Option<Work>, ApiError> {
    state
        .works
        .find_one(doc! { "_id": id, "is_demo": scope.is_demo() })
        .await
        .map_err(Into::into)
}

/// Sum of spill ARA attached to a work, optionally excluding the spill
/// being edited.
pub async fn total_ara(
    state: &AppState,
    work_id: &ObjectId,
    exclude: Option<&ObjectId>,
) -> Result<f64, ApiError> {
    let mut filter = doc! { "work_id": work_id };
    if let Some(id) = exclude {
        filter.insert("_id", doc! { "$ne": id });
    }
    let mut cursor = state.spills.find(filter).await?;
    let mut total = 0.0;
    while let Some(spill) = cursor.try_next().await? {
        total += spill.ara;
    }
    Ok(total)
}

async fn build_work_view(state: &AppState, work: &Work) -> Result<WorkView, ApiError> {
    let gr_number = state
        .grs
        .find_one(doc! { "_id": &work.gr_id })
        .await?
        .map(|gr| gr.gr_number)
        .unwrap_or_default();

    let mut spills = Vec::new();
    if let Some(work_id) = &work.id {
        let mut cursor = state.spills.find(doc! { "work_id": work_id }).await?;
        while let Some(spill) = cursor.try_next().await? {
            spills.push(spill_view(&spill));
        }
    }
    let total_ara = spills.iter().map(|s| s.ara).sum();

    Ok(WorkView {
        id: work.id.map(|id| id.to_hex()).unwrap_or_default(),
        gr_id: work.gr_id.to_hex(),
        gr_number,
        name_of_work: work.name_of_work.clone(),
        date: work.date,
        aa: work.aa,
        ra: work.ra,
        total_ara,
        is_cancelled: work.is_cancelled,
        cancel_reason: work.cancel_reason,
        cancel_details: work.cancel_details.clone(),
        spills,
        is_demo: work.is_demo,
        created_at: fmt_ts(work.created_at),
        updated_at: fmt_ts(work.updated_at),
    })
}

pub async fn list_works(
    state: &AppState,
    scope: Scope,
    gr: Option<&ObjectId>,
) -> Result<Vec<WorkView>, ApiError> {
    let mut filter = doc! { "is_demo": scope.is_demo() };
    if let Some(gr_id) = gr {
        filter.insert("gr_id", gr_id);
    }
    let mut cursor = state.works.find(filter).sort(doc! { "created_at": -1 }).await?;
    let mut views = Vec::new();
    while let Some(work) = cursor.try_next().await? {
        views.push(build_work_view(state, &work).await?);
    }
    Ok(views)
}

pub async fn get_work_view(
    state: &AppState,
    scope: Scope,
    id: &ObjectId,
) -> Result<Option<WorkView>, ApiError> {
    match get_work(state, scope, id).await? {
        Some(work) => build_work_view(state, &work).await.map(Some),
        None => Ok(None),
    }
}

fn check_ra_within_aa(ra: f64, aa: f64, existing_ara: f64) -> Result<(), ApiError> {
    if ra > aa {
        return Err(ApiError::validation(
            "ra",
            format!("RA ({ra}) cannot be greater than AA ({aa})"),
        ));
    }
    if ra + existing_ara > aa {
        return Err(ApiError::validation(
            "ra",
            format!(
                "RA ({ra}) + total ARA ({existing_ara}) = {} would exceed AA ({aa})",
                ra + existing_ara
            ),
        ));
    }
    Ok(())
}

pub async fn create_work(
    state: &AppState,
    scope: Scope,
    input: WorkInput,
) -> Result<WorkView, ApiError> {
    let gr_id = parse_body_id(&input.gr_id, "gr_id")?;
    if get_gr(state, scope, &gr_id).await?.is_none() {
        return Err(ApiError::validation(
            "gr_id",
            format!("GR {} does not exist in this partition", input.gr_id),
        ));
    }

    let ra = input.ra.unwrap_or(0.0);
    check_ra_within_aa(ra, input.aa, 0.0)?;

    let mut work = Work {
        id: None,
        gr_id,
        name_of_work: input.name_of_work,
        date: input.date.unwrap_or_else(|| Utc::now().date_naive()),
        aa: input.aa,
        ra,
        is_cancelled: input.is_cancelled.unwrap_or(false),
        cancel_reason: input.cancel_reason,
        cancel_details: input.cancel_details,
        is_demo: scope.is_demo(),
        created_at: Some(DateTime::from_system_time(SystemTime::now())),
        updated_at: None,
    };
    let res = state.works.insert_one(&work).await?;
    work.id = res.inserted_id.as_object_id();
    build_work_view(state, &work).await
}

pub async fn update_work(
    state: &AppState,
    scope: Scope,
    id: &ObjectId,
    input: WorkInput,
) -> Result<WorkView, ApiError> {
    let mut work = get_work(state, scope, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("work {id} not found")))?;

    let gr_id = parse_body_id(&input.gr_id, "gr_id")?;
    if get_gr(state, scope, &gr_id).await?.is_none() {
        return Err(ApiError::validation(
            "gr_id",
            format!("GR {} does not exist in this partition", input.gr_id),
        ));
    }

    let ra = input.ra.unwrap_or(work.ra);
    let existing_ara = total_ara(state, id, None).await?;
    check_ra_within_aa(ra, input.aa, existing_ara)?;

    work.gr_id = gr_id;
    work.name_of_work = input.name_of_work;
    if let Some(date) = input.date {
        work.date = date;
    }
    work.aa = input.aa;
    work.ra = ra;
    // Same rule as flag/date pairs: dropping the flag clears its details.
    work.is_cancelled = input.is_cancelled.unwrap_or(false);
    if work.is_cancelled {
        work.cancel_reason = input.cancel_reason;
        work.cancel_details = input.cancel_details;
    } else {
        work.cancel_reason = None;
        work.cancel_details = None;
    }
    work.updated_at = Some(DateTime::from_system_time(SystemTime::now()));

    state.works.replace_one(doc! { "_id": id }, &work).await?;
    build_work_view(state, &work).await
}

/// Remove a work and everything hanging off it: spills, sanctions,
/// tenders, and the bills of those tenders.
pub(super) async fn delete_work_subtree(
    state: &AppState,
    work_id: &ObjectId,
) -> Result<(), ApiError> {
    let mut tender_ids = Vec::new();
    let mut cursor = state.tenders.find(doc! { "work_id": work_id }).await?;
    while let Some(tender) = cursor.try_next().await? {
        if let Some(id) = tender.id {
            tender_ids.push(id);
        }
    }
    if !tender_ids.is_empty() {
        state
            .bills
            .delete_many(doc! { "tender_id": { "$in": &tender_ids } })
            .await?;
        state
            .tenders
            .delete_many(doc! { "_id": { "$in": &tender_ids } })
            .await?;
    }
    state
        .sanctions
        .delete_many(doc! { "work_id": work_id })
        .await?;
    state.spills.delete_many(doc! { "work_id": work_id }).await?;
    state.works.delete_one(doc! { "_id": work_id }).await?;
    Ok(())
}

pub async fn delete_work(state: &AppState, scope: Scope, id: &ObjectId) -> Result<(), ApiError> {
    if get_work(state, scope, id).await?.is_none() {
        return Err(ApiError::not_found(format!("work {id} not found")));
    }
    delete_work_subtree(state, id).await
}

/// Admission control for spills: RA plus all ARA, including the incoming
/// one, must stay within AA.
async fn check_spill_ceiling(
    state: &AppState,
    work: &Work,
    new_ara: f64,
    exclude: Option<&ObjectId>,
) -> Result<(), ApiError> {
    let work_id = work.id.ok_or_else(|| ApiError::not_found("work has no id"))?;
    let existing = total_ara(state, &work_id, exclude).await?;
    let total = work.ra + existing + new_ara;
    if total > work.aa {
        return Err(ApiError::validation(
            "ara",
            format!(
                "cannot add spill: RA ({}) + total ARA ({existing}) + new ARA ({new_ara}) = {total} would exceed AA ({})",
                work.ra, work.aa
            ),
        ));
    }
    Ok(())
}

pub async fn list_spills(
    state: &AppState,
    scope: Scope,
    work: Option<&ObjectId>,
) -> Result<Vec<SpillView>, ApiError> {
    let mut filter = doc! { "is_demo": scope.is_demo() };
    if let Some(work_id) = work {
        filter.insert("work_id", work_id);
    }
    let mut cursor = state
        .spills
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .await?;
    let mut views = Vec::new();
    while let Some(spill) = cursor.try_next().await? {
        views.push(spill_view(&spill));
    }
    Ok(views)
}

pub async fn get_spill(
    state: &AppState,
    scope: Scope,
    id: &ObjectId,
) -> Result<Option<SpillView>, ApiError> {
    Ok(state
        .spills
        .find_one(doc! { "_id": id, "is_demo": scope.is_demo() })
        .await?
        .map(|spill| spill_view(&spill)))
}

pub async fn create_spill(
    state: &AppState,
    scope: Scope,
    input: SpillInput,
) -> Result<SpillView, ApiError> {
    let work_id = parse_body_id(&input.work_id, "work_id")?;
    let work = get_work(state, scope, &work_id).await?.ok_or_else(|| {
        ApiError::validation(
            "work_id",
            format!("work {} does not exist in this partition", input.work_id),
        )
    })?;
    check_spill_ceiling(state, &work, input.ara, None).await?;

    let mut spill = Spill {
        id: None,
        work_id,
        ara: input.ara,
        is_demo: scope.is_demo(),
        created_at: Some(DateTime::from_system_time(SystemTime::now())),
    };
    let res = state.spills.insert_one(&spill).await?;
    spill.id = res.inserted_id.as_object_id();
    Ok(spill_view(&spill))
}

pub async fn update_spill(
    state: &AppState,
    scope: Scope,
    id: &ObjectId,
    input: SpillInput,
) -> Result<SpillView, ApiError> {
    let mut spill = state
        .spills
        .find_one(doc! { "_id": id, "is_demo": scope.is_demo() })
        .await?
        .ok_or_else(|| ApiError::not_found(format!("spill {id} not found")))?;

    let work_id = parse_body_id(&input.work_id, "work_id")?;
    let work = get_work(state, scope, &work_id).await?.ok_or_else(|| {
        ApiError::validation(
            "work_id",
            format!("work {} does not exist in this partition", input.work_id),
        )
    })?;
    check_spill_ceiling(state, &work, input.ara, Some(id)).await?;

    spill.work_id = work_id;
    spill.ara = input.ara;
    state.spills.replace_one(doc! { "_id": id }, &spill).await?;
    Ok(spill_view(&spill))
}

pub async fn delete_spill(state: &AppState, scope: Scope, id: &ObjectId) -> Result<(), ApiError> {
    let deleted = state
        .spills
        .delete_one(doc! { "_id": id, "is_demo": scope.is_demo() })
        .await?;
    if deleted.deleted_count == 0 {
        return Err(ApiError::not_found(format!("spill {id} not found")));
    }
    Ok(())
}
