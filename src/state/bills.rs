use bson::{DateTime, doc, oid::ObjectId};
use chrono::{NaiveDate, Utc};
use futures::stream::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::calc::{
    BillAmounts, BillInputs, DEFAULT_GST_ON_WORKPORTION_PCT, DEFAULT_GST_PCT, DEFAULT_LWC_PCT,
    DEFAULT_TDS_PCT, Derived, effective_pct, recompute_bill,
};
use crate::error::{ApiError, parse_body_id};
use crate::models::{Bill, Tender, Work};

use super::{AppState, Scope, sanctions::work_ids_of_gr, works::fmt_ts};

#[derive(Debug, Default, Deserialize)]
pub struct BillInput {
    pub tender_id: String,
    pub bill_number: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    pub work_portion: f64,
    #[serde(default)]
    pub royalty_and_testing: f64,
    #[serde(default)]
    pub reimbursement_of_insurance: f64,
    #[serde(default)]
    pub security_deposit: f64,
    #[serde(default)]
    pub insurance: f64,
    #[serde(default)]
    pub royalty: f64,
    #[serde(default)]
    pub gst_percentage: Option<f64>,
    #[serde(default)]
    pub tds_percentage: Option<f64>,
    #[serde(default)]
    pub gst_on_workportion_percentage: Option<f64>,
    #[serde(default)]
    pub lwc_percentage: Option<f64>,
    #[serde(default)]
    pub payment_done_from_gr: Option<String>,
    // Manual overrides, same contract as the sanction amounts.
    #[serde(default)]
    pub gst: Option<f64>,
    #[serde(default)]
    pub bill_total: Option<f64>,
    #[serde(default)]
    pub tds: Option<f64>,
    #[serde(default)]
    pub gst_on_workportion: Option<f64>,
    #[serde(default)]
    pub lwc: Option<f64>,
    #[serde(default)]
    pub net_amount: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct BillView {
    pub id: String,
    pub tender_id: String,
    pub tender_number: String,
    pub agency_name: String,
    pub work_id: String,
    pub work_name: String,
    pub gr_id: String,
    pub gr_number: String,
    pub bill_number: String,
    pub date: NaiveDate,
    pub work_portion: f64,
    pub royalty_and_testing: f64,
    pub reimbursement_of_insurance: f64,
    pub security_deposit: f64,
    pub insurance: f64,
    pub royalty: f64,
    pub gst_percentage: f64,
    pub tds_percentage: f64,
    pub gst_on_workportion_percentage: f64,
    pub lwc_percentage: f64,
    pub gst: Derived,
    pub bill_total: Derived,
    pub tds: Derived,
    pub gst_on_workportion: Derived,
    pub lwc: Derived,
    pub net_amount: Derived,
    pub payment_done_from_gr: Option<String>,
    pub payment_gr_number: Option<String>,
    pub document: Option<String>,
    pub is_demo: bool,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

async fn build_bill_view(state: &AppState, bill: &Bill) -> Result<BillView, ApiError> {
    let tender: Option<Tender> = state.tenders.find_one(doc! { "_id": &bill.tender_id }).await?;
    let work: Option<Work> = match &tender {
        Some(t) => state.works.find_one(doc! { "_id": &t.work_id }).await?,
        None => None,
    };
    let gr = match &work {
        Some(w) => state.grs.find_one(doc! { "_id": &w.gr_id }).await?,
        None => None,
    };
    let payment_gr = match &bill.payment_done_from_gr {
        Some(gr_id) => state.grs.find_one(doc! { "_id": gr_id }).await?,
        None => None,
    };

    Ok(BillView {
        id: bill.id.map(|id| id.to_hex()).unwrap_or_default(),
        tender_id: bill.tender_id.to_hex(),
        tender_number: tender
            .as_ref()
            .map(|t| t.tender_number.clone())
            .unwrap_or_default(),
        agency_name: tender
            .as_ref()
            .map(|t| t.agency_name.clone())
            .unwrap_or_default(),
        work_id: work
            .as_ref()
            .and_then(|w| w.id)
            .map(|id| id.to_hex())
            .unwrap_or_default(),
        work_name: work.as_ref().map(|w| w.name_of_work.clone()).unwrap_or_default(),
        gr_id: gr
            .as_ref()
            .and_then(|g| g.id)
            .map(|id| id.to_hex())
            .unwrap_or_default(),
        gr_number: gr.as_ref().map(|g| g.gr_number.clone()).unwrap_or_default(),
        bill_number: bill.bill_number.clone(),
        date: bill.date,
        work_portion: bill.work_portion,
        royalty_and_testing: bill.royalty_and_testing,
        reimbursement_of_insurance: bill.reimbursement_of_insurance,
        security_deposit: bill.security_deposit,
        insurance: bill.insurance,
        royalty: bill.royalty,
        gst_percentage: bill.gst_percentage,
        tds_percentage: bill.tds_percentage,
        gst_on_workportion_percentage: bill.gst_on_workportion_percentage,
        lwc_percentage: bill.lwc_percentage,
        gst: bill.amounts.gst,
        bill_total: bill.amounts.bill_total,
        tds: bill.amounts.tds,
        gst_on_workportion: bill.amounts.gst_on_workportion,
        lwc: bill.amounts.lwc,
        net_amount: bill.amounts.net_amount,
        payment_done_from_gr: bill.payment_done_from_gr.map(|id| id.to_hex()),
        payment_gr_number: payment_gr.map(|g| g.gr_number),
        document: bill.document.clone(),
        is_demo: bill.is_demo,
        created_at: fmt_ts(bill.created_at),
        updated_at: fmt_ts(bill.updated_at),
    })
}

/// Tender ids visible under a gr/work filter, for bill listings.
async fn tender_ids_for(
    state: &AppState,
    scope: Scope,
    gr: Option<&ObjectId>,
    work: Option<&ObjectId>,
) -> Result<Option<Vec<ObjectId>>, ApiError> {
    let mut filter = doc! { "is_demo": scope.is_demo() };
    if let Some(work_id) = work {
        filter.insert("work_id", work_id);
    } else if let Some(gr_id) = gr {
        let ids = work_ids_of_gr(state, scope, gr_id).await?;
        filter.insert("work_id", doc! { "$in": ids });
    } else {
        return Ok(None);
    }
    let mut cursor = state.tenders.find(filter).await?;
    let mut ids = Vec::new();
    while let Some(tender) = cursor.try_next().await? {
        if let Some(id) = tender.id {
            ids.push(id);
        }
    }
    Ok(Some(ids))
}

pub async fn list_bills(
    state: &AppState,
    scope: Scope,
    gr: Option<&ObjectId>,
    work: Option<&ObjectId>,
    tender: Option<&ObjectId>,
) -> Result<Vec<BillView>, ApiError> {
    let mut filter = doc! { "is_demo": scope.is_demo() };
    if let Some(tender_id) = tender {
        filter.insert("tender_id", tender_id);
    } else if let Some(ids) = tender_ids_for(state, scope, gr, work).await? {
        filter.insert("tender_id", doc! { "$in": ids });
    }
    let mut cursor = state
        .bills
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .await?;
    let mut views = Vec::new();
    while let Some(bill) = cursor.try_next().await? {
        views.push(build_bill_view(state, &bill).await?);
    }
    Ok(views)
}

pub async fn get_bill(
    state: &AppState,
    scope: Scope,
    id: &ObjectId,
) -> Result<Option<Bill>, ApiError> {
    state
        .bills
        .find_one(doc! { "_id": id, "is_demo": scope.is_demo() })
        .await
        .map_err(Into::into)
}

pub async fn get_bill_view(
    state: &AppState,
    scope: Scope,
    id: &ObjectId,
) -> Result<Option<BillView>, ApiError> {
    match get_bill(state, scope, id).await? {
        Some(bill) => build_bill_view(state, &bill).await.map(Some),
        None => Ok(None),
    }
}

fn bill_inputs(bill: &Bill) -> BillInputs {
    BillInputs {
        work_portion: bill.work_portion,
        royalty_and_testing: bill.royalty_and_testing,
        reimbursement_of_insurance: bill.reimbursement_of_insurance,
        security_deposit: bill.security_deposit,
        insurance: bill.insurance,
        royalty: bill.royalty,
        gst_pct: bill.gst_percentage,
        tds_pct: bill.tds_percentage,
        gst_on_workportion_pct: bill.gst_on_workportion_percentage,
        lwc_pct: bill.lwc_percentage,
    }
}

async fn resolve_refs(
    state: &AppState,
    scope: Scope,
    input: &BillInput,
) -> Result<(ObjectId, Option<ObjectId>), ApiError> {
    let tender_id = parse_body_id(&input.tender_id, "tender_id")?;
    if state
        .tenders
        .find_one(doc! { "_id": &tender_id, "is_demo": scope.is_demo() })
        .await?
        .is_none()
    {
        return Err(ApiError::validation(
            "tender_id",
            format!("tender {} does not exist in this partition", input.tender_id),
        ));
    }
    let payment_gr = match &input.payment_done_from_gr {
        Some(raw) if !raw.is_empty() => {
            let gr_id = parse_body_id(raw, "payment_done_from_gr")?;
            if state
                .grs
                .find_one(doc! { "_id": &gr_id, "is_demo": scope.is_demo() })
                .await?
                .is_none()
            {
                return Err(ApiError::validation(
                    "payment_done_from_gr",
                    format!("GR {raw} does not exist in this partition"),
                ));
            }
            Some(gr_id)
        }
        _ => None,
    };
    Ok((tender_id, payment_gr))
}

fn apply_overrides(amounts: &mut BillAmounts, input: &BillInput) {
    amounts.gst.apply_override(input.gst);
    amounts.bill_total.apply_override(input.bill_total);
    amounts.tds.apply_override(input.tds);
    amounts.gst_on_workportion.apply_override(input.gst_on_workportion);
    amounts.lwc.apply_override(input.lwc);
    amounts.net_amount.apply_override(input.net_amount);
}

pub async fn create_bill(
    state: &AppState,
    scope: Scope,
    input: BillInput,
    document: Option<String>,
) -> Result<BillView, ApiError> {
    let (tender_id, payment_gr) = resolve_refs(state, scope, &input).await?;

    let mut amounts = BillAmounts::default();
    apply_overrides(&mut amounts, &input);

    let mut bill = Bill {
        id: None,
        tender_id,
        bill_number: input.bill_number,
        date: input.date.unwrap_or_else(|| Utc::now().date_naive()),
        work_portion: input.work_portion,
        royalty_and_testing: input.royalty_and_testing,
        reimbursement_of_insurance: input.reimbursement_of_insurance,
        security_deposit: input.security_deposit,
        insurance: input.insurance,
        royalty: input.royalty,
        gst_percentage: effective_pct(input.gst_percentage, DEFAULT_GST_PCT),
        tds_percentage: effective_pct(input.tds_percentage, DEFAULT_TDS_PCT),
        gst_on_workportion_percentage: effective_pct(
            input.gst_on_workportion_percentage,
            DEFAULT_GST_ON_WORKPORTION_PCT,
        ),
        lwc_percentage: effective_pct(input.lwc_percentage, DEFAULT_LWC_PCT),
        amounts,
        payment_done_from_gr: payment_gr,
        document,
        is_demo: scope.is_demo(),
        created_at: Some(DateTime::from_system_time(SystemTime::now())),
        updated_at: None,
    };
    recompute_bill(&bill_inputs(&bill), &mut bill.amounts);

    let res = state.bills.insert_one(&bill).await?;
    bill.id = res.inserted_id.as_object_id();
    build_bill_view(state, &bill).await
}

pub async fn update_bill(
    state: &AppState,
    scope: Scope,
    id: &ObjectId,
    input: BillInput,
    document: Option<String>,
) -> Result<BillView, ApiError> {
    let mut bill = get_bill(state, scope, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("bill {id} not found")))?;
    let (tender_id, payment_gr) = resolve_refs(state, scope, &input).await?;

    bill.tender_id = tender_id;
    bill.bill_number = input.bill_number.clone();
    if let Some(date) = input.date {
        bill.date = date;
    }
    bill.work_portion = input.work_portion;
    bill.royalty_and_testing = input.royalty_and_testing;
    bill.reimbursement_of_insurance = input.reimbursement_of_insurance;
    bill.security_deposit = input.security_deposit;
    bill.insurance = input.insurance;
    bill.royalty = input.royalty;
    bill.gst_percentage = effective_pct(input.gst_percentage, DEFAULT_GST_PCT);
    bill.tds_percentage = effective_pct(input.tds_percentage, DEFAULT_TDS_PCT);
    bill.gst_on_workportion_percentage = effective_pct(
        input.gst_on_workportion_percentage,
        DEFAULT_GST_ON_WORKPORTION_PCT,
    );
    bill.lwc_percentage = effective_pct(input.lwc_percentage, DEFAULT_LWC_PCT);
    // Marking or clearing the paying GR is how a bill moves between
    // pending and completed.
    bill.payment_done_from_gr = payment_gr;
    if document.is_some() {
        bill.document = document;
    }

    apply_overrides(&mut bill.amounts, &input);
    recompute_bill(&bill_inputs(&bill), &mut bill.amounts);

    bill.updated_at = Some(DateTime::from_system_time(SystemTime::now()));
    state.bills.replace_one(doc! { "_id": id }, &bill).await?;
    build_bill_view(state, &bill).await
}

pub async fn delete_bill(state: &AppState, scope: Scope, id: &ObjectId) -> Result<(), ApiError> {
    let deleted = state
        .bills
        .delete_one(doc! { "_id": id, "is_demo": scope.is_demo() })
        .await?;
    if deleted.deleted_count == 0 {
        return Err(ApiError::not_found(format!("bill {id} not found")));
    }
    Ok(())
}
