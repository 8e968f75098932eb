// Stage-aggregation and dashboard tests over a hand-built production
// chain with one work in every lifecycle stage.

#[path = "common/mod.rs"]
mod common;

use chrono::NaiveDate;

use nirman::error::ApiError;
use nirman::models::CancelReason;
use nirman::state::{
    AppState, BillInput, BillsStatus, GrInput, SanctionInput, SanctionsStatus, Scope, SpillInput,
    StatusPage, TenderInput, WorkInput, WorksStatus, create_bill, create_gr, create_sanction,
    create_spill, create_tender, create_work, dashboard, status_report,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// Clients key off these names, so renames here are breaking changes.
#[test]
fn report_sections_serialize_the_published_keys() {
    let works = serde_json::to_value(WorksStatus::default()).unwrap();
    for key in [
        "no_ts_yet",
        "ts_created",
        "tenders_open",
        "tenders_awarded",
        "bills_pending",
        "completed",
    ] {
        assert!(works.get(key).is_some(), "works section misses {key}");
    }

    let ts = serde_json::to_value(SanctionsStatus::default()).unwrap();
    assert!(ts.get("noting_stage").is_some());
    assert!(ts.get("ordering_stage").is_some());

    let bills = serde_json::to_value(BillsStatus::default()).unwrap();
    assert!(bills.get("pending_payment").is_some());
    assert!(bills.get("payment_completed").is_some());
}

fn work_input(gr_id: &str, name: &str, aa: f64, ra: f64) -> WorkInput {
    WorkInput {
        gr_id: gr_id.to_string(),
        name_of_work: name.to_string(),
        date: Some(date(2025, 1, 15)),
        aa,
        ra: Some(ra),
        is_cancelled: None,
        cancel_reason: None,
        cancel_details: None,
    }
}

fn sanction_input(work_id: &str, noting: bool, order: bool) -> SanctionInput {
    SanctionInput {
        work_id: work_id.to_string(),
        sub_name: None,
        work_portion: 100_000.0,
        royalty: 0.0,
        testing: 0.0,
        consultancy: 0.0,
        gst_percentage: None,
        contingency_percentage: None,
        labour_insurance_percentage: None,
        noting: Some(noting),
        noting_date: None,
        order: Some(order),
        order_date: None,
        work_portion_total: None,
        gst: None,
        grand_total: None,
        contingency: None,
        labour_insurance: None,
        final_total: None,
    }
}

fn bill_input(tender_id: &str, number: &str, paid_from: Option<&str>) -> BillInput {
    BillInput {
        tender_id: tender_id.to_string(),
        bill_number: number.to_string(),
        date: Some(date(2025, 3, 1)),
        work_portion: 50_000.0,
        royalty_and_testing: 3_000.0,
        payment_done_from_gr: paid_from.map(str::to_string),
        ..BillInput::default()
    }
}

struct Chain {
    gr_id: String,
    work_b: String,
}

async fn build_chain(state: &AppState) -> Chain {
    let scope = Scope::Production;
    let gr = create_gr(
        state,
        scope,
        GrInput {
            gr_number: "GR/2025/001".to_string(),
            date: date(2025, 1, 1),
        },
        None,
    )
    .await
    .unwrap();
    let gr_id = gr.id.unwrap().to_hex();

    // A: no sanction at all.
    let work_a = create_work(state, scope, work_input(&gr_id, "Road A", 1_000_000.0, 700_000.0))
        .await
        .unwrap();
    create_spill(
        state,
        scope,
        SpillInput {
            work_id: work_a.id.clone(),
            ara: 200_000.0,
        },
    )
    .await
    .unwrap();

    // B: sanction at noting stage, tender past financial verification.
    let work_b = create_work(state, scope, work_input(&gr_id, "Bridge B", 500_000.0, 300_000.0))
        .await
        .unwrap();
    let ts_b = create_sanction(state, scope, sanction_input(&work_b.id, true, false))
        .await
        .unwrap();
    let mut tnd_b = TenderInput {
        work_id: work_b.id.clone(),
        technical_sanction_id: Some(ts_b.id.clone()),
        tender_number: "TND/B".to_string(),
        agency_name: "Agency B".to_string(),
        date: Some(date(2025, 2, 1)),
        ..TenderInput::default()
    };
    tnd_b.technical_verification = Some(true);
    tnd_b.financial_verification = Some(true);
    let tnd_b = create_tender(state, scope, tnd_b, None).await.unwrap();
    create_bill(state, scope, bill_input(&tnd_b.id, "BILL/B", None), None)
        .await
        .unwrap();

    // C: order issued, work order awarded, bill paid.
    let work_c = create_work(state, scope, work_input(&gr_id, "Pipeline C", 800_000.0, 600_000.0))
        .await
        .unwrap();
    let ts_c = create_sanction(state, scope, sanction_input(&work_c.id, true, true))
        .await
        .unwrap();
    let mut tnd_c = TenderInput {
        work_id: work_c.id.clone(),
        technical_sanction_id: Some(ts_c.id.clone()),
        tender_number: "TND/C".to_string(),
        agency_name: "Agency C".to_string(),
        date: Some(date(2025, 2, 1)),
        ..TenderInput::default()
    };
    tnd_c.work_order_tick = Some(true);
    let tnd_c = create_tender(state, scope, tnd_c, None).await.unwrap();
    create_bill(
        state,
        scope,
        bill_input(&tnd_c.id, "BILL/C", Some(&gr_id)),
        None,
    )
    .await
    .unwrap();

    // D: cancelled, must disappear from every bucket and total.
    let mut cancelled = work_input(&gr_id, "Dead End D", 100_000.0, 50_000.0);
    cancelled.is_cancelled = Some(true);
    cancelled.cancel_reason = Some(CancelReason::ShiftedToOtherWork);
    let work_d = create_work(state, scope, cancelled).await.unwrap();
    create_sanction(state, scope, sanction_input(&work_d.id, true, false))
        .await
        .unwrap();

    // E: sanction only, no tender yet.
    let work_e = create_work(state, scope, work_input(&gr_id, "Culvert E", 400_000.0, 200_000.0))
        .await
        .unwrap();
    create_sanction(state, scope, sanction_input(&work_e.id, false, false))
        .await
        .unwrap();

    // F: tender published but nothing verified yet.
    let work_f = create_work(state, scope, work_input(&gr_id, "Footpath F", 300_000.0, 100_000.0))
        .await
        .unwrap();
    let ts_f = create_sanction(state, scope, sanction_input(&work_f.id, true, false))
        .await
        .unwrap();
    create_tender(
        state,
        scope,
        TenderInput {
            work_id: work_f.id.clone(),
            technical_sanction_id: Some(ts_f.id.clone()),
            tender_number: "TND/F".to_string(),
            agency_name: "Agency F".to_string(),
            date: Some(date(2025, 2, 10)),
            ..TenderInput::default()
        },
        None,
    )
    .await
    .unwrap();

    Chain {
        gr_id,
        work_b: work_b.id,
    }
}

#[tokio::test]
async fn full_report_buckets_every_stage_once() {
    let Some(ctx) = common::setup_state().await else {
        return;
    };
    let state = &ctx.state;
    build_chain(state).await;

    let report = status_report(state, Scope::Production, StatusPage::All, None, None)
        .await
        .unwrap();

    // Each work lands in exactly one bucket.
    let works = report.works_status.unwrap();
    assert_eq!(works.no_ts_yet, 1);
    assert_eq!(works.ts_created, 1);
    assert_eq!(works.tenders_open, 1);
    assert_eq!(works.tenders_awarded, 0);
    assert_eq!(works.bills_pending, 1);
    assert_eq!(works.completed, 1);

    let ts = report.ts_status.unwrap();
    assert_eq!(ts.noting_stage, 2);
    assert_eq!(ts.ordering_stage, 1);

    let tenders = report.tenders_status.unwrap();
    assert_eq!(tenders.online_pending, 1);
    assert_eq!(tenders.technical_verification, 0);
    assert_eq!(tenders.financial_verification, 1);
    assert_eq!(tenders.loa_issued, 0);
    assert_eq!(tenders.work_order_issued, 1);

    let bills = report.bills_status.unwrap();
    assert_eq!(bills.pending_payment, 1);
    assert_eq!(bills.payment_completed, 1);

    common::teardown(Some(ctx)).await;
}

#[tokio::test]
async fn page_parameter_gates_the_sections() {
    let Some(ctx) = common::setup_state().await else {
        return;
    };
    let state = &ctx.state;
    build_chain(state).await;

    let works_page = status_report(state, Scope::Production, StatusPage::Works, None, None)
        .await
        .unwrap();
    assert!(works_page.works_status.is_some());
    assert!(works_page.ts_status.is_none());
    assert!(works_page.tenders_status.is_none());
    assert!(works_page.bills_status.is_none());

    let ts_page = status_report(state, Scope::Production, StatusPage::Sanctions, None, None)
        .await
        .unwrap();
    assert!(ts_page.works_status.is_none());
    assert!(ts_page.ts_status.is_some());

    assert!(matches!(
        StatusPage::parse(Some("bogus")),
        Err(ApiError::Validation { .. })
    ));

    common::teardown(Some(ctx)).await;
}

#[tokio::test]
async fn filters_scope_the_report_and_echo_back() {
    let Some(ctx) = common::setup_state().await else {
        return;
    };
    let state = &ctx.state;
    let chain = build_chain(state).await;

    let work_oid = bson::oid::ObjectId::parse_str(&chain.work_b).unwrap();
    let report = status_report(
        state,
        Scope::Production,
        StatusPage::All,
        None,
        Some(&work_oid),
    )
    .await
    .unwrap();
    assert_eq!(report.work_filter.as_deref(), Some(chain.work_b.as_str()));

    let works = report.works_status.unwrap();
    assert_eq!(works.no_ts_yet, 0);
    assert_eq!(works.ts_created, 0);
    assert_eq!(works.bills_pending, 1);
    assert_eq!(works.completed, 0);

    let gr_oid = bson::oid::ObjectId::parse_str(&chain.gr_id).unwrap();
    let report = status_report(
        state,
        Scope::Production,
        StatusPage::All,
        Some(&gr_oid),
        None,
    )
    .await
    .unwrap();
    assert_eq!(report.gr_filter.as_deref(), Some(chain.gr_id.as_str()));

    // A filter id that names no record in the partition is a 404.
    let missing = bson::oid::ObjectId::new();
    let err = status_report(
        state,
        Scope::Production,
        StatusPage::All,
        Some(&missing),
        None,
    )
    .await;
    assert!(matches!(err, Err(ApiError::NotFound(_))));

    common::teardown(Some(ctx)).await;
}

#[tokio::test]
async fn dashboard_totals_sum_the_live_partition() {
    let Some(ctx) = common::setup_state().await else {
        return;
    };
    let state = &ctx.state;
    build_chain(state).await;

    let totals = dashboard(state, Scope::Production).await.unwrap();
    assert_eq!(totals.total_grs, 1);
    // The cancelled work is excluded everywhere.
    assert_eq!(totals.total_works, 5);
    assert_eq!(totals.total_tenders, 3);
    assert_eq!(totals.total_bills, 2);
    assert_eq!(totals.total_aa, 3_000_000.0);
    // RA plus admitted spill-over ARA.
    assert_eq!(totals.total_ra, 2_100_000.0);
    // Two bills of bill_total 62000 each (50000 + 3000 + 18% GST on wp).
    assert_eq!(totals.total_expenditure, 124_000.0);

    common::teardown(Some(ctx)).await;
}
