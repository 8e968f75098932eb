//! Stage aggregation across the GR -> Work -> Sanction -> Tender -> Bill
//! chain. Everything is bucketed in memory from partition-consistent
//! snapshots so a dangling reference can never inflate a count.

use bson::{doc, oid::ObjectId};
use futures::stream::TryStreamExt;
use serde::Serialize;
use std::collections::HashSet;

use crate::error::ApiError;
use crate::models::{Bill, Spill, TechnicalSanction, Tender, Work};

use super::{AppState, Scope};

/// Which page of the tracker asked for the report. Each page only needs
/// its own buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPage {
    Works,
    Sanctions,
    All,
}

impl StatusPage {
    pub fn parse(raw: Option<&str>) -> Result<Self, ApiError> {
        match raw {
            None => Ok(StatusPage::All),
            Some("works") => Ok(StatusPage::Works),
            Some("ts") => Ok(StatusPage::Sanctions),
            Some(other) => Err(ApiError::validation(
                "page",
                format!("unknown page {other:?}, expected \"works\" or \"ts\""),
            )),
        }
    }
}

/// Lifecycle stage of a tender. Buckets are mutually exclusive; the
/// furthest milestone reached wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenderStage {
    OnlinePending,
    TechnicalVerification,
    FinancialVerification,
    LoaIssued,
    WorkOrderIssued,
}

impl TenderStage {
    pub fn of(tender: &Tender) -> Self {
        if tender.work_order_tick {
            TenderStage::WorkOrderIssued
        } else if tender.loa {
            TenderStage::LoaIssued
        } else if tender.financial_verification {
            TenderStage::FinancialVerification
        } else if tender.technical_verification {
            TenderStage::TechnicalVerification
        } else {
            TenderStage::OnlinePending
        }
    }
}

/// Lifecycle stage of a work, derived from its whole subtree. Like the
/// tender stages the buckets are mutually exclusive, so the counts sum
/// to the number of works in scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStage {
    NoTsYet,
    TsCreated,
    TendersOpen,
    TendersAwarded,
    BillsPending,
    BillsCompleted,
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct WorksStatus {
    pub no_ts_yet: u64,
    pub ts_created: u64,
    pub tenders_open: u64,
    pub tenders_awarded: u64,
    pub bills_pending: u64,
    pub completed: u64,
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct SanctionsStatus {
    pub noting_stage: u64,
    pub ordering_stage: u64,
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct TendersStatus {
    pub online_pending: u64,
    pub technical_verification: u64,
    pub financial_verification: u64,
    pub loa_issued: u64,
    pub work_order_issued: u64,
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct BillsStatus {
    pub pending_payment: u64,
    pub payment_completed: u64,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gr_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub works_status: Option<WorksStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts_status: Option<SanctionsStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenders_status: Option<TendersStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bills_status: Option<BillsStatus>,
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub total_grs: u64,
    pub total_works: u64,
    pub total_tenders: u64,
    pub total_bills: u64,
    pub total_aa: f64,
    pub total_ra: f64,
    pub total_expenditure: f64,
}

/// Partition snapshot with the cross-references already verified. A child
/// whose parent fell outside the partition or the requested filter is
/// dropped rather than counted.
struct Snapshot {
    works: Vec<Work>,
    sanctions: Vec<TechnicalSanction>,
    tenders: Vec<Tender>,
    bills: Vec<Bill>,
}

async fn load_snapshot(
    state: &AppState,
    scope: Scope,
    gr: Option<&ObjectId>,
    work: Option<&ObjectId>,
) -> Result<Snapshot, ApiError> {
    let mut work_filter = doc! { "is_demo": scope.is_demo(), "is_cancelled": false };
    if let Some(work_id) = work {
        work_filter.insert("_id", work_id);
    }
    if let Some(gr_id) = gr {
        work_filter.insert("gr_id", gr_id);
    }
    let works: Vec<Work> = state.works.find(work_filter).await?.try_collect().await?;
    let work_ids: HashSet<ObjectId> = works.iter().filter_map(|w| w.id).collect();

    let sanctions: Vec<TechnicalSanction> = state
        .sanctions
        .find(doc! { "is_demo": scope.is_demo() })
        .await?
        .try_collect::<Vec<_>>()
        .await?
        .into_iter()
        .filter(|ts| work_ids.contains(&ts.work_id))
        .collect();
    let sanction_ids: HashSet<ObjectId> = sanctions.iter().filter_map(|ts| ts.id).collect();

    // A tender only enters the report once its sanction link resolves
    // within the partition.
    let tenders: Vec<Tender> = state
        .tenders
        .find(doc! { "is_demo": scope.is_demo() })
        .await?
        .try_collect::<Vec<_>>()
        .await?
        .into_iter()
        .filter(|t| {
            work_ids.contains(&t.work_id)
                && t.technical_sanction_id
                    .map(|ts_id| sanction_ids.contains(&ts_id))
                    .unwrap_or(false)
        })
        .collect();
    let tender_ids: HashSet<ObjectId> = tenders.iter().filter_map(|t| t.id).collect();

    let bills: Vec<Bill> = state
        .bills
        .find(doc! { "is_demo": scope.is_demo() })
        .await?
        .try_collect::<Vec<_>>()
        .await?
        .into_iter()
        .filter(|b| tender_ids.contains(&b.tender_id))
        .collect();

    Ok(Snapshot {
        works,
        sanctions,
        tenders,
        bills,
    })
}

impl WorkStage {
    /// Furthest milestone reached anywhere under the work wins.
    fn of(work_id: &ObjectId, snapshot: &Snapshot) -> Self {
        let tenders: Vec<&Tender> = snapshot
            .tenders
            .iter()
            .filter(|t| t.work_id == *work_id)
            .collect();
        let tender_ids: HashSet<ObjectId> =
            tenders.iter().filter_map(|t| t.id).collect();
        let bills: Vec<&Bill> = snapshot
            .bills
            .iter()
            .filter(|b| tender_ids.contains(&b.tender_id))
            .collect();

        if bills.iter().any(|b| b.payment_done_from_gr.is_some()) {
            WorkStage::BillsCompleted
        } else if !bills.is_empty() {
            WorkStage::BillsPending
        } else if tenders.iter().any(|t| t.work_order_tick) {
            WorkStage::TendersAwarded
        } else if !tenders.is_empty() {
            WorkStage::TendersOpen
        } else if snapshot.sanctions.iter().any(|ts| ts.work_id == *work_id) {
            WorkStage::TsCreated
        } else {
            WorkStage::NoTsYet
        }
    }
}

fn works_status(snapshot: &Snapshot) -> WorksStatus {
    let mut status = WorksStatus::default();
    for work in &snapshot.works {
        let Some(id) = work.id else { continue };
        match WorkStage::of(&id, snapshot) {
            WorkStage::NoTsYet => status.no_ts_yet += 1,
            WorkStage::TsCreated => status.ts_created += 1,
            WorkStage::TendersOpen => status.tenders_open += 1,
            WorkStage::TendersAwarded => status.tenders_awarded += 1,
            WorkStage::BillsPending => status.bills_pending += 1,
            WorkStage::BillsCompleted => status.completed += 1,
        }
    }
    status
}

fn ts_status(snapshot: &Snapshot) -> SanctionsStatus {
    let mut status = SanctionsStatus::default();
    for ts in &snapshot.sanctions {
        if ts.order {
            status.ordering_stage += 1;
        } else if ts.noting {
            status.noting_stage += 1;
        }
    }
    status
}

fn tenders_status(snapshot: &Snapshot) -> TendersStatus {
    let mut status = TendersStatus::default();
    for tender in &snapshot.tenders {
        match TenderStage::of(tender) {
            TenderStage::OnlinePending => status.online_pending += 1,
            TenderStage::TechnicalVerification => status.technical_verification += 1,
            TenderStage::FinancialVerification => status.financial_verification += 1,
            TenderStage::LoaIssued => status.loa_issued += 1,
            TenderStage::WorkOrderIssued => status.work_order_issued += 1,
        }
    }
    status
}

fn bills_status(snapshot: &Snapshot) -> BillsStatus {
    let mut status = BillsStatus::default();
    for bill in &snapshot.bills {
        if bill.payment_done_from_gr.is_some() {
            status.payment_completed += 1;
        } else {
            status.pending_payment += 1;
        }
    }
    status
}

pub async fn status_report(
    state: &AppState,
    scope: Scope,
    page: StatusPage,
    gr: Option<&ObjectId>,
    work: Option<&ObjectId>,
) -> Result<StatusReport, ApiError> {
    if let Some(gr_id) = gr {
        if state
            .grs
            .find_one(doc! { "_id": gr_id, "is_demo": scope.is_demo() })
            .await?
            .is_none()
        {
            return Err(ApiError::not_found(format!("GR {gr_id} not found")));
        }
    }
    if let Some(work_id) = work {
        let found = state
            .works
            .find_one(doc! { "_id": work_id, "is_demo": scope.is_demo() })
            .await?
            .ok_or_else(|| ApiError::not_found(format!("work {work_id} not found")))?;
        if let Some(gr_id) = gr {
            if found.gr_id != *gr_id {
                return Err(ApiError::validation(
                    "work",
                    format!("work {work_id} does not belong to GR {gr_id}"),
                ));
            }
        }
    }

    let snapshot = load_snapshot(state, scope, gr, work).await?;
    let mut report = StatusReport {
        gr_filter: gr.map(|id| id.to_hex()),
        work_filter: work.map(|id| id.to_hex()),
        works_status: None,
        ts_status: None,
        tenders_status: None,
        bills_status: None,
    };
    match page {
        StatusPage::Works => {
            report.works_status = Some(works_status(&snapshot));
        }
        StatusPage::Sanctions => {
            report.ts_status = Some(ts_status(&snapshot));
        }
        StatusPage::All => {
            report.works_status = Some(works_status(&snapshot));
            report.ts_status = Some(ts_status(&snapshot));
            report.tenders_status = Some(tenders_status(&snapshot));
            report.bills_status = Some(bills_status(&snapshot));
        }
    }
    Ok(report)
}

pub async fn dashboard(state: &AppState, scope: Scope) -> Result<Dashboard, ApiError> {
    let total_grs = state
        .grs
        .count_documents(doc! { "is_demo": scope.is_demo() })
        .await?;

    let works: Vec<Work> = state
        .works
        .find(doc! { "is_demo": scope.is_demo(), "is_cancelled": false })
        .await?
        .try_collect()
        .await?;
    let total_aa: f64 = works.iter().map(|w| w.aa).sum();
    let mut total_ra: f64 = works.iter().map(|w| w.ra).sum();

    let work_ids: HashSet<ObjectId> = works.iter().filter_map(|w| w.id).collect();
    let spills: Vec<Spill> = state
        .spills
        .find(doc! { "is_demo": scope.is_demo() })
        .await?
        .try_collect()
        .await?;
    total_ra += spills
        .iter()
        .filter(|s| work_ids.contains(&s.work_id))
        .map(|s| s.ara)
        .sum::<f64>();

    let tenders: Vec<Tender> = state
        .tenders
        .find(doc! { "is_demo": scope.is_demo() })
        .await?
        .try_collect::<Vec<_>>()
        .await?
        .into_iter()
        .filter(|t| work_ids.contains(&t.work_id))
        .collect();
    let tender_ids: HashSet<ObjectId> = tenders.iter().filter_map(|t| t.id).collect();

    let bills: Vec<Bill> = state
        .bills
        .find(doc! { "is_demo": scope.is_demo() })
        .await?
        .try_collect::<Vec<_>>()
        .await?
        .into_iter()
        .filter(|b| tender_ids.contains(&b.tender_id))
        .collect();
    let total_expenditure: f64 = bills.iter().map(|b| b.amounts.bill_total.value).sum();

    Ok(Dashboard {
        total_grs,
        total_works: works.len() as u64,
        total_tenders: tenders.len() as u64,
        total_bills: bills.len() as u64,
        total_aa,
        total_ra,
        total_expenditure,
    })
}
