use bson::{DateTime, doc, oid::ObjectId};
use chrono::{NaiveDate, Utc};
use futures::stream::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::calc::sync_flag_date;
use crate::error::{ApiError, parse_body_id};
use crate::models::{Tender, Work};

use super::{AppState, Scope, sanctions::work_ids_of_gr, works::fmt_ts, works::get_work};

#[derive(Debug, Default, Deserialize)]
pub struct TenderInput {
    pub work_id: String,
    #[serde(default)]
    pub technical_sanction_id: Option<String>,
    pub tender_number: String,
    pub agency_name: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub online: Option<bool>,
    #[serde(default)]
    pub online_date: Option<NaiveDate>,
    #[serde(default)]
    pub offline: Option<bool>,
    #[serde(default)]
    pub offline_date: Option<NaiveDate>,
    #[serde(default)]
    pub technical_verification: Option<bool>,
    #[serde(default)]
    pub technical_verification_date: Option<NaiveDate>,
    #[serde(default)]
    pub financial_verification: Option<bool>,
    #[serde(default)]
    pub financial_verification_date: Option<NaiveDate>,
    #[serde(default)]
    pub loa: Option<bool>,
    #[serde(default)]
    pub loa_date: Option<NaiveDate>,
    #[serde(default)]
    pub work_order_tick: Option<bool>,
    #[serde(default)]
    pub work_order_tick_date: Option<NaiveDate>,
    #[serde(default)]
    pub emd_supporting: Option<bool>,
    #[serde(default)]
    pub supporting_date: Option<NaiveDate>,
    #[serde(default)]
    pub emd_awarded: Option<bool>,
    #[serde(default)]
    pub awarded_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct TenderView {
    pub id: String,
    pub work_id: String,
    pub work_name: String,
    pub gr_id: String,
    pub gr_number: String,
    pub technical_sanction_id: Option<String>,
    pub sanction_sub_name: Option<String>,
    pub tender_number: String,
    pub agency_name: String,
    pub date: NaiveDate,
    pub work_order: Option<String>,
    pub online: bool,
    pub online_date: Option<NaiveDate>,
    pub offline: bool,
    pub offline_date: Option<NaiveDate>,
    pub technical_verification: bool,
    pub technical_verification_date: Option<NaiveDate>,
    pub financial_verification: bool,
    pub financial_verification_date: Option<NaiveDate>,
    pub loa: bool,
    pub loa_date: Option<NaiveDate>,
    pub work_order_tick: bool,
    pub work_order_tick_date: Option<NaiveDate>,
    pub emd_supporting: bool,
    pub supporting_date: Option<NaiveDate>,
    pub emd_awarded: bool,
    pub awarded_date: Option<NaiveDate>,
    pub is_demo: bool,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

async fn build_tender_view(state: &AppState, tender: &Tender) -> Result<TenderView, ApiError> {
    let work: Option<Work> = state.works.find_one(doc! { "_id": &tender.work_id }).await?;
    let gr = match &work {
        Some(w) => state.grs.find_one(doc! { "_id": &w.gr_id }).await?,
        None => None,
    };
    let sanction = match &tender.technical_sanction_id {
        Some(ts_id) => state.sanctions.find_one(doc! { "_id": ts_id }).await?,
        None => None,
    };

    Ok(TenderView {
        id: tender.id.map(|id| id.to_hex()).unwrap_or_default(),
        work_id: tender.work_id.to_hex(),
        work_name: work.as_ref().map(|w| w.name_of_work.clone()).unwrap_or_default(),
        gr_id: gr
            .as_ref()
            .and_then(|g| g.id)
            .map(|id| id.to_hex())
            .unwrap_or_default(),
        gr_number: gr.as_ref().map(|g| g.gr_number.clone()).unwrap_or_default(),
        technical_sanction_id: tender.technical_sanction_id.map(|id| id.to_hex()),
        sanction_sub_name: sanction.and_then(|ts| ts.sub_name),
        tender_number: tender.tender_number.clone(),
        agency_name: tender.agency_name.clone(),
        date: tender.date,
        work_order: tender.work_order.clone(),
        online: tender.online,
        online_date: tender.online_date,
        offline: tender.offline,
        offline_date: tender.offline_date,
        technical_verification: tender.technical_verification,
        technical_verification_date: tender.technical_verification_date,
        financial_verification: tender.financial_verification,
        financial_verification_date: tender.financial_verification_date,
        loa: tender.loa,
        loa_date: tender.loa_date,
        work_order_tick: tender.work_order_tick,
        work_order_tick_date: tender.work_order_tick_date,
        emd_supporting: tender.emd_supporting,
        supporting_date: tender.supporting_date,
        emd_awarded: tender.emd_awarded,
        awarded_date: tender.awarded_date,
        is_demo: tender.is_demo,
        created_at: fmt_ts(tender.created_at),
        updated_at: fmt_ts(tender.updated_at),
    })
}

pub async fn list_tenders(
    state: &AppState,
    scope: Scope,
    gr: Option<&ObjectId>,
    work: Option<&ObjectId>,
    sanction: Option<&ObjectId>,
) -> Result<Vec<TenderView>, ApiError> {
    let mut filter = doc! { "is_demo": scope.is_demo() };
    if let Some(ts_id) = sanction {
        filter.insert("technical_sanction_id", ts_id);
    }
    if let Some(work_id) = work {
        filter.insert("work_id", work_id);
    } else if let Some(gr_id) = gr {
        let ids = work_ids_of_gr(state, scope, gr_id).await?;
        filter.insert("work_id", doc! { "$in": ids });
    }
    let mut cursor = state
        .tenders
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .await?;
    let mut views = Vec::new();
    while let Some(tender) = cursor.try_next().await? {
        views.push(build_tender_view(state, &tender).await?);
    }
    Ok(views)
}

pub async fn get_tender(
    state: &AppState,
    scope: Scope,
    id: &ObjectId,
) -> Result<Option<Tender>, ApiError> {
    state
        .tenders
        .find_one(doc! { "_id": id, "is_demo": scope.is_demo() })
        .await
        .map_err(Into::into)
}

pub async fn get_tender_view(
    state: &AppState,
    scope: Scope,
    id: &ObjectId,
) -> Result<Option<TenderView>, ApiError> {
    match get_tender(state, scope, id).await? {
        Some(tender) => build_tender_view(state, &tender).await.map(Some),
        None => Ok(None),
    }
}

async fn check_tender_number_free(
    state: &AppState,
    scope: Scope,
    tender_number: &str,
    exclude: Option<&ObjectId>,
) -> Result<(), ApiError> {
    let mut filter = doc! { "tender_number": tender_number, "is_demo": scope.is_demo() };
    if let Some(id) = exclude {
        filter.insert("_id", doc! { "$ne": id });
    }
    if state.tenders.find_one(filter).await?.is_some() {
        return Err(ApiError::conflict(format!(
            "tender number {tender_number} already exists"
        )));
    }
    Ok(())
}

async fn resolve_refs(
    state: &AppState,
    scope: Scope,
    input: &TenderInput,
) -> Result<(ObjectId, Option<ObjectId>), ApiError> {
    let work_id = parse_body_id(&input.work_id, "work_id")?;
    if get_work(state, scope, &work_id).await?.is_none() {
        return Err(ApiError::validation(
            "work_id",
            format!("work {} does not exist in this partition", input.work_id),
        ));
    }
    let sanction_id = match &input.technical_sanction_id {
        Some(raw) if !raw.is_empty() => {
            let ts_id = parse_body_id(raw, "technical_sanction_id")?;
            let ts = state
                .sanctions
                .find_one(doc! { "_id": &ts_id, "is_demo": scope.is_demo() })
                .await?
                .ok_or_else(|| {
                    ApiError::validation(
                        "technical_sanction_id",
                        format!("technical sanction {raw} does not exist in this partition"),
                    )
                })?;
            if ts.work_id != work_id {
                return Err(ApiError::validation(
                    "technical_sanction_id",
                    "technical sanction belongs to a different work",
                ));
            }
            Some(ts_id)
        }
        _ => None,
    };
    Ok((work_id, sanction_id))
}

fn sync_milestones(tender: &mut Tender, today: NaiveDate) {
    sync_flag_date(tender.online, &mut tender.online_date, today);
    sync_flag_date(tender.offline, &mut tender.offline_date, today);
    sync_flag_date(
        tender.technical_verification,
        &mut tender.technical_verification_date,
        today,
    );
    sync_flag_date(
        tender.financial_verification,
        &mut tender.financial_verification_date,
        today,
    );
    sync_flag_date(tender.loa, &mut tender.loa_date, today);
    sync_flag_date(
        tender.work_order_tick,
        &mut tender.work_order_tick_date,
        today,
    );
    sync_flag_date(tender.emd_supporting, &mut tender.supporting_date, today);
    sync_flag_date(tender.emd_awarded, &mut tender.awarded_date, today);
}

pub async fn create_tender(
    state: &AppState,
    scope: Scope,
    input: TenderInput,
    work_order: Option<String>,
) -> Result<TenderView, ApiError> {
    let (work_id, sanction_id) = resolve_refs(state, scope, &input).await?;
    check_tender_number_free(state, scope, &input.tender_number, None).await?;
    let today = Utc::now().date_naive();

    let mut tender = Tender {
        id: None,
        work_id,
        technical_sanction_id: sanction_id,
        tender_number: input.tender_number,
        agency_name: input.agency_name,
        date: input.date.unwrap_or(today),
        work_order,
        online: input.online.unwrap_or(false),
        online_date: input.online_date,
        offline: input.offline.unwrap_or(false),
        offline_date: input.offline_date,
        technical_verification: input.technical_verification.unwrap_or(false),
        technical_verification_date: input.technical_verification_date,
        financial_verification: input.financial_verification.unwrap_or(false),
        financial_verification_date: input.financial_verification_date,
        loa: input.loa.unwrap_or(false),
        loa_date: input.loa_date,
        work_order_tick: input.work_order_tick.unwrap_or(false),
        work_order_tick_date: input.work_order_tick_date,
        emd_supporting: input.emd_supporting.unwrap_or(false),
        supporting_date: input.supporting_date,
        emd_awarded: input.emd_awarded.unwrap_or(false),
        awarded_date: input.awarded_date,
        is_demo: scope.is_demo(),
        created_at: Some(DateTime::from_system_time(SystemTime::now())),
        updated_at: None,
    };
    sync_milestones(&mut tender, today);

    let res = state.tenders.insert_one(&tender).await?;
    tender.id = res.inserted_id.as_object_id();
    build_tender_view(state, &tender).await
}

pub async fn update_tender(
    state: &AppState,
    scope: Scope,
    id: &ObjectId,
    input: TenderInput,
    work_order: Option<String>,
) -> Result<TenderView, ApiError> {
    let mut tender = get_tender(state, scope, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("tender {id} not found")))?;
    let (work_id, sanction_id) = resolve_refs(state, scope, &input).await?;
    check_tender_number_free(state, scope, &input.tender_number, Some(id)).await?;
    let today = Utc::now().date_naive();

    tender.work_id = work_id;
    tender.technical_sanction_id = sanction_id;
    tender.tender_number = input.tender_number;
    tender.agency_name = input.agency_name;
    if let Some(date) = input.date {
        tender.date = date;
    }
    if work_order.is_some() {
        tender.work_order = work_order;
    }

    tender.online = input.online.unwrap_or(tender.online);
    tender.offline = input.offline.unwrap_or(tender.offline);
    tender.technical_verification = input
        .technical_verification
        .unwrap_or(tender.technical_verification);
    tender.financial_verification = input
        .financial_verification
        .unwrap_or(tender.financial_verification);
    tender.loa = input.loa.unwrap_or(tender.loa);
    tender.work_order_tick = input.work_order_tick.unwrap_or(tender.work_order_tick);
    tender.emd_supporting = input.emd_supporting.unwrap_or(tender.emd_supporting);
    tender.emd_awarded = input.emd_awarded.unwrap_or(tender.emd_awarded);
    if let Some(date) = input.online_date {
        tender.online_date = Some(date);
    }
    if let Some(date) = input.offline_date {
        tender.offline_date = Some(date);
    }
    if let Some(date) = input.technical_verification_date {
        tender.technical_verification_date = Some(date);
    }
    if let Some(date) = input.financial_verification_date {
        tender.financial_verification_date = Some(date);
    }
    if let Some(date) = input.loa_date {
        tender.loa_date = Some(date);
    }
    if let Some(date) = input.work_order_tick_date {
        tender.work_order_tick_date = Some(date);
    }
    if let Some(date) = input.supporting_date {
        tender.supporting_date = Some(date);
    }
    if let Some(date) = input.awarded_date {
        tender.awarded_date = Some(date);
    }
    sync_milestones(&mut tender, today);

    tender.updated_at = Some(DateTime::from_system_time(SystemTime::now()));
    state.tenders.replace_one(doc! { "_id": id }, &tender).await?;
    build_tender_view(state, &tender).await
}

/// Delete a tender along with every bill raised against it.
pub async fn delete_tender(state: &AppState, scope: Scope, id: &ObjectId) -> Result<(), ApiError> {
    let deleted = state
        .tenders
        .delete_one(doc! { "_id": id, "is_demo": scope.is_demo() })
        .await?;
    if deleted.deleted_count == 0 {
        return Err(ApiError::not_found(format!("tender {id} not found")));
    }
    state.bills.delete_many(doc! { "tender_id": id }).await?;
    Ok(())
}
