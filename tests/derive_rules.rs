// Pure derivation rules: sanction and bill amount engines, the override
// contract, and the checkbox-to-date rule. No database needed.

use chrono::NaiveDate;

use nirman::calc::{
    BillAmounts, BillInputs, DEFAULT_CONTINGENCY_PCT, DEFAULT_GST_PCT,
    DEFAULT_LABOUR_INSURANCE_PCT, Derived, SanctionAmounts, SanctionInputs, effective_pct,
    recompute_bill, recompute_sanction, sync_flag_date,
};
use nirman::models::Tender;
use nirman::state::TenderStage;

fn sample_sanction_inputs() -> SanctionInputs {
    SanctionInputs {
        work_portion: 100_000.0,
        royalty: 5_000.0,
        testing: 2_000.0,
        consultancy: 3_000.0,
        gst_pct: 18.0,
        contingency_pct: 4.0,
        labour_insurance_pct: 1.0,
    }
}

#[test]
fn sanction_amounts_follow_the_binding_formulas() {
    let inputs = sample_sanction_inputs();
    let mut amounts = SanctionAmounts::default();
    recompute_sanction(&inputs, &mut amounts);

    assert_eq!(amounts.work_portion_total.value, 107_000.0);
    assert_eq!(amounts.gst.value, 18_000.0);
    assert_eq!(amounts.grand_total.value, 125_000.0);
    assert_eq!(amounts.contingency.value, 4_000.0);
    assert_eq!(amounts.labour_insurance.value, 1_000.0);
    // 107000 + 18000 + 3000 + 4000 + 1000
    assert_eq!(amounts.final_total.value, 133_000.0);
    assert!(!amounts.final_total.manual);
}

#[test]
fn recomputation_is_idempotent() {
    let inputs = sample_sanction_inputs();
    let mut amounts = SanctionAmounts::default();
    recompute_sanction(&inputs, &mut amounts);
    let first = amounts;
    recompute_sanction(&inputs, &mut amounts);
    assert_eq!(amounts, first);
}

#[test]
fn pinned_gst_feeds_downstream_totals_verbatim() {
    let inputs = sample_sanction_inputs();
    let mut amounts = SanctionAmounts::default();
    amounts.gst.apply_override(Some(20_000.0));
    recompute_sanction(&inputs, &mut amounts);

    assert!(amounts.gst.manual);
    assert_eq!(amounts.gst.value, 20_000.0);
    assert_eq!(amounts.grand_total.value, 127_000.0);
    assert_eq!(amounts.final_total.value, 135_000.0);
}

#[test]
fn omitting_an_override_reverts_to_auto_calculation() {
    let inputs = sample_sanction_inputs();
    let mut amounts = SanctionAmounts::default();
    amounts.gst.apply_override(Some(20_000.0));
    recompute_sanction(&inputs, &mut amounts);

    // The next save without the field supplied clears the pin.
    amounts.gst.apply_override(None);
    recompute_sanction(&inputs, &mut amounts);
    assert!(!amounts.gst.manual);
    assert_eq!(amounts.gst.value, 18_000.0);
    assert_eq!(amounts.grand_total.value, 125_000.0);
}

#[test]
fn pinned_value_survives_input_changes() {
    let mut inputs = sample_sanction_inputs();
    let mut amounts = SanctionAmounts::default();
    amounts.gst.apply_override(Some(20_000.0));
    recompute_sanction(&inputs, &mut amounts);

    inputs.work_portion = 200_000.0;
    recompute_sanction(&inputs, &mut amounts);
    assert_eq!(amounts.gst.value, 20_000.0);
    // Non-pinned fields track the new inputs.
    assert_eq!(amounts.contingency.value, 8_000.0);
}

#[test]
fn bill_amounts_follow_the_binding_formulas() {
    let inputs = BillInputs {
        work_portion: 100_000.0,
        royalty_and_testing: 7_000.0,
        reimbursement_of_insurance: 1_000.0,
        security_deposit: 3_000.0,
        insurance: 1_000.0,
        royalty: 2_000.0,
        gst_pct: 18.0,
        tds_pct: 2.0,
        gst_on_workportion_pct: 2.0,
        lwc_pct: 1.0,
    };
    let mut amounts = BillAmounts::default();
    recompute_bill(&inputs, &mut amounts);

    assert_eq!(amounts.gst.value, 18_000.0);
    assert_eq!(amounts.bill_total.value, 126_000.0);
    assert_eq!(amounts.tds.value, 2_000.0);
    assert_eq!(amounts.gst_on_workportion.value, 2_000.0);
    assert_eq!(amounts.lwc.value, 1_070.0);
    // 126000 - 2000 - 2000 - 3000 - 1070 - 1000 - 2000
    assert_eq!(amounts.net_amount.value, 114_930.0);
}

#[test]
fn bill_deductions_apply_even_when_supplied_negative() {
    let inputs = BillInputs {
        work_portion: 100_000.0,
        royalty_and_testing: 0.0,
        reimbursement_of_insurance: 0.0,
        security_deposit: -3_000.0,
        insurance: 0.0,
        royalty: 0.0,
        gst_pct: 18.0,
        tds_pct: 2.0,
        gst_on_workportion_pct: 2.0,
        lwc_pct: 1.0,
    };
    let mut amounts = BillAmounts::default();
    recompute_bill(&inputs, &mut amounts);

    // security_deposit deducts by magnitude, never adds.
    let with_positive = {
        let mut inputs = inputs;
        inputs.security_deposit = 3_000.0;
        let mut amounts = BillAmounts::default();
        recompute_bill(&inputs, &mut amounts);
        amounts.net_amount.value
    };
    assert_eq!(amounts.net_amount.value, with_positive);
}

#[test]
fn zero_or_absent_percentages_fall_back_to_defaults() {
    assert_eq!(effective_pct(None, DEFAULT_GST_PCT), 18.0);
    assert_eq!(effective_pct(Some(0.0), DEFAULT_GST_PCT), 18.0);
    assert_eq!(effective_pct(Some(12.0), DEFAULT_GST_PCT), 12.0);
    assert_eq!(effective_pct(Some(-1.0), DEFAULT_CONTINGENCY_PCT), 4.0);
    assert_eq!(effective_pct(None, DEFAULT_LABOUR_INSURANCE_PCT), 1.0);
}

#[test]
fn flag_fills_empty_date_and_clearing_wipes_it() {
    let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
    let earlier = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();

    let mut date = None;
    sync_flag_date(true, &mut date, today);
    assert_eq!(date, Some(today));

    // An explicit date wins over the auto-fill.
    let mut date = Some(earlier);
    sync_flag_date(true, &mut date, today);
    assert_eq!(date, Some(earlier));

    // A false flag clears the date even if it was just set.
    let mut date = Some(earlier);
    sync_flag_date(false, &mut date, today);
    assert_eq!(date, None);
}

fn bare_tender() -> Tender {
    Tender {
        id: None,
        work_id: bson::oid::ObjectId::new(),
        technical_sanction_id: None,
        tender_number: "TND/1".to_string(),
        agency_name: "Agency".to_string(),
        date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        work_order: None,
        online: false,
        online_date: None,
        offline: false,
        offline_date: None,
        technical_verification: false,
        technical_verification_date: None,
        financial_verification: false,
        financial_verification_date: None,
        loa: false,
        loa_date: None,
        work_order_tick: false,
        work_order_tick_date: None,
        emd_supporting: false,
        supporting_date: None,
        emd_awarded: false,
        awarded_date: None,
        is_demo: false,
        created_at: None,
        updated_at: None,
    }
}

#[test]
fn tender_stage_buckets_are_mutually_exclusive() {
    let mut tender = bare_tender();
    assert_eq!(TenderStage::of(&tender), TenderStage::OnlinePending);

    tender.technical_verification = true;
    assert_eq!(TenderStage::of(&tender), TenderStage::TechnicalVerification);

    tender.financial_verification = true;
    assert_eq!(TenderStage::of(&tender), TenderStage::FinancialVerification);

    tender.loa = true;
    assert_eq!(TenderStage::of(&tender), TenderStage::LoaIssued);

    // The furthest milestone wins regardless of earlier flags.
    tender.work_order_tick = true;
    assert_eq!(TenderStage::of(&tender), TenderStage::WorkOrderIssued);

    let mut skipped = bare_tender();
    skipped.work_order_tick = true;
    assert_eq!(TenderStage::of(&skipped), TenderStage::WorkOrderIssued);
}
