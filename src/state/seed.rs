// Demo sandbox seeding. Runs once at startup when the demo partition is
// empty, producing a small chain of records that exercises every stage
// bucket the status report knows about.

use anyhow::Result;
use bson::doc;
use chrono::{Days, Utc};
use mongodb::Database;

use super::{
    AppState, Scope,
    bills::{BillInput, create_bill},
    grs::{GrInput, create_gr},
    sanctions::{SanctionInput, create_sanction},
    tenders::{TenderInput, create_tender},
    works::{SpillInput, WorkInput, create_spill, create_work},
};

const COLLECTIONS: &[&str] = &[
    "users",
    "tokens",
    "grs",
    "works",
    "spills",
    "technical_sanctions",
    "tenders",
    "bills",
];

pub async fn ensure_collections(db: &Database) -> Result<()> {
    let existing = db.list_collection_names().await?;
    for name in COLLECTIONS {
        if !existing.iter().any(|n| n == name) {
            db.create_collection(*name).await?;
        }
    }
    Ok(())
}

pub async fn is_demo_partition_empty(state: &AppState) -> Result<bool> {
    let count = state.grs.count_documents(doc! { "is_demo": true }).await?;
    Ok(count == 0)
}

fn work_input(gr_id: &str, name: &str, days_ago: u64, aa: f64, ra: f64) -> WorkInput {
    WorkInput {
        gr_id: gr_id.to_string(),
        name_of_work: name.to_string(),
        date: Utc::now().date_naive().checked_sub_days(Days::new(days_ago)),
        aa,
        ra: Some(ra),
        is_cancelled: None,
        cancel_reason: None,
        cancel_details: None,
    }
}

fn sanction_input(work_id: &str, sub_name: &str, wp: f64, noting: bool, order: bool) -> SanctionInput {
    SanctionInput {
        work_id: work_id.to_string(),
        sub_name: Some(sub_name.to_string()),
        work_portion: wp,
        royalty: wp * 0.05,
        testing: wp * 0.02,
        consultancy: wp * 0.01,
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

fn tender_input(work_id: &str, ts_id: &str, number: &str, agency: &str) -> TenderInput {
    TenderInput {
        work_id: work_id.to_string(),
        technical_sanction_id: Some(ts_id.to_string()),
        tender_number: number.to_string(),
        agency_name: agency.to_string(),
        ..TenderInput::default()
    }
}

fn bill_input(tender_id: &str, number: &str, wp: f64, paid_from: Option<&str>) -> BillInput {
    BillInput {
        tender_id: tender_id.to_string(),
        bill_number: number.to_string(),
        work_portion: wp,
        royalty_and_testing: wp * 0.07,
        reimbursement_of_insurance: wp * 0.01,
        security_deposit: wp * 0.03,
        insurance: wp * 0.01,
        royalty: wp * 0.02,
        payment_done_from_gr: paid_from.map(str::to_string),
        ..BillInput::default()
    }
}

pub async fn seed_demo_data(state: &AppState) -> Result<()> {
    let today = Utc::now().date_naive();
    let scope = Scope::Demo;

    let gr1 = create_gr(
        state,
        scope,
        GrInput {
            gr_number: "GR/DEMO/2025/001".to_string(),
            date: today.checked_sub_days(Days::new(120)).unwrap_or(today),
        },
        None,
    )
    .await?;
    let gr2 = create_gr(
        state,
        scope,
        GrInput {
            gr_number: "GR/DEMO/2025/002".to_string(),
            date: today.checked_sub_days(Days::new(60)).unwrap_or(today),
        },
        None,
    )
    .await?;
    let gr1_id = gr1.id.map(|id| id.to_hex()).unwrap_or_default();
    let gr2_id = gr2.id.map(|id| id.to_hex()).unwrap_or_default();

    let road = create_work(
        state,
        scope,
        work_input(&gr1_id, "Road Construction and Widening", 110, 20_000_000.0, 14_000_000.0),
    )
    .await?;
    let bridge = create_work(
        state,
        scope,
        work_input(&gr1_id, "Bridge Construction", 100, 35_000_000.0, 28_000_000.0),
    )
    .await?;
    let pipeline = create_work(
        state,
        scope,
        work_input(&gr2_id, "Water Supply Pipeline", 50, 12_000_000.0, 9_000_000.0),
    )
    .await?;
    // A work with no sanction yet, so the works page shows both buckets.
    let _drainage = create_work(
        state,
        scope,
        work_input(&gr2_id, "Drainage System", 40, 8_000_000.0, 6_000_000.0),
    )
    .await?;

    create_spill(
        state,
        scope,
        SpillInput {
            work_id: road.id.clone(),
            ara: 2_500_000.0,
        },
    )
    .await?;
    create_spill(
        state,
        scope,
        SpillInput {
            work_id: pipeline.id.clone(),
            ara: 1_000_000.0,
        },
    )
    .await?;

    let ts_road = create_sanction(
        state,
        scope,
        sanction_input(&road.id, "Main Work", 12_000_000.0, true, true),
    )
    .await?;
    let ts_bridge = create_sanction(
        state,
        scope,
        sanction_input(&bridge.id, "Main Work", 22_000_000.0, true, false),
    )
    .await?;
    let _ts_pipeline = create_sanction(
        state,
        scope,
        sanction_input(&pipeline.id, "Phase 1", 7_000_000.0, false, false),
    )
    .await?;

    let mut tnd_road = tender_input(
        &road.id,
        &ts_road.id,
        "TND/DEMO/001/1",
        "ABC Construction Pvt Ltd",
    );
    tnd_road.online = Some(true);
    tnd_road.technical_verification = Some(true);
    tnd_road.financial_verification = Some(true);
    tnd_road.loa = Some(true);
    tnd_road.work_order_tick = Some(true);
    let tnd_road = create_tender(state, scope, tnd_road, None).await?;

    let mut tnd_bridge = tender_input(
        &bridge.id,
        &ts_bridge.id,
        "TND/DEMO/001/2",
        "Prime Builders & Contractors",
    );
    tnd_bridge.online = Some(true);
    tnd_bridge.technical_verification = Some(true);
    let tnd_bridge = create_tender(state, scope, tnd_bridge, None).await?;

    create_bill(
        state,
        scope,
        bill_input(&tnd_road.id, "BILL/DEMO/1/1", 4_000_000.0, Some(&gr1_id)),
        None,
    )
    .await?;
    create_bill(
        state,
        scope,
        bill_input(&tnd_road.id, "BILL/DEMO/1/2", 3_000_000.0, None),
        None,
    )
    .await?;
    create_bill(
        state,
        scope,
        bill_input(&tnd_bridge.id, "BILL/DEMO/2/1", 5_000_000.0, None),
        None,
    )
    .await?;

    tracing::info!("seeded demo partition");
    Ok(())
}
