// calc.rs
// Derived-amount engine for technical sanctions and bills, plus the
// checkbox-to-date rule shared by sanction and tender milestones.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Statutory percentage defaults applied when a rate is absent or zero at
/// save time. The effective rate is stored back on the record.
pub const DEFAULT_GST_PCT: f64 = 18.0;
pub const DEFAULT_CONTINGENCY_PCT: f64 = 4.0;
pub const DEFAULT_LABOUR_INSURANCE_PCT: f64 = 1.0;
pub const DEFAULT_TDS_PCT: f64 = 2.0;
pub const DEFAULT_GST_ON_WORKPORTION_PCT: f64 = 2.0;
pub const DEFAULT_LWC_PCT: f64 = 1.0;

pub fn effective_pct(pct: Option<f64>, default: f64) -> f64 {
    match pct {
        Some(v) if v > 0.0 => v,
        _ => default,
    }
}

/// A derived amount: either recomputed from inputs on every save, or
/// pinned to a user-supplied value. Keeping the value and the manual mark
/// in one place avoids the flag/value drift a parallel boolean column
/// would allow.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Derived {
    pub value: f64,
    pub manual: bool,
}

impl Derived {
    pub fn computed(value: f64) -> Self {
        Derived {
            value,
            manual: false,
        }
    }

    pub fn manual(value: f64) -> Self {
        Derived {
            value,
            manual: true,
        }
    }

    /// Update the stored value unless it is pinned.
    pub fn recompute(&mut self, value: f64) {
        if !self.manual {
            self.value = value;
        }
    }

    /// Apply the write-API override contract: a supplied value pins the
    /// field, an omitted one reverts it to auto-calculation.
    pub fn apply_override(&mut self, supplied: Option<f64>) {
        match supplied {
            Some(v) => *self = Derived::manual(v),
            None => self.manual = false,
        }
    }
}

impl Default for Derived {
    fn default() -> Self {
        Derived::computed(0.0)
    }
}

/// Raw inputs of a technical sanction after percentage defaulting.
#[derive(Debug, Clone, Copy)]
pub struct SanctionInputs {
    pub work_portion: f64,
    pub royalty: f64,
    pub testing: f64,
    pub consultancy: f64,
    pub gst_pct: f64,
    pub contingency_pct: f64,
    pub labour_insurance_pct: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SanctionAmounts {
    pub work_portion_total: Derived,
    pub gst: Derived,
    pub grand_total: Derived,
    pub contingency: Derived,
    pub labour_insurance: Derived,
    pub final_total: Derived,
}

/// Recompute every non-pinned sanction amount. Pinned values feed the
/// downstream totals verbatim.
pub fn recompute_sanction(inputs: &SanctionInputs, amounts: &mut SanctionAmounts) {
    let base = inputs.work_portion + inputs.royalty + inputs.testing;
    amounts.work_portion_total.recompute(base);
    amounts
        .gst
        .recompute(inputs.work_portion * inputs.gst_pct / 100.0);
    amounts.grand_total.recompute(base + amounts.gst.value);
    amounts
        .contingency
        .recompute(inputs.work_portion * inputs.contingency_pct / 100.0);
    amounts
        .labour_insurance
        .recompute(inputs.work_portion * inputs.labour_insurance_pct / 100.0);
    amounts.final_total.recompute(
        base + amounts.gst.value
            + inputs.consultancy
            + amounts.contingency.value
            + amounts.labour_insurance.value,
    );
}

/// Raw inputs of a bill after percentage defaulting.
#[derive(Debug, Clone, Copy)]
pub struct BillInputs {
    pub work_portion: f64,
    pub royalty_and_testing: f64,
    pub reimbursement_of_insurance: f64,
    pub security_deposit: f64,
    pub insurance: f64,
    pub royalty: f64,
    pub gst_pct: f64,
    pub tds_pct: f64,
    pub gst_on_workportion_pct: f64,
    pub lwc_pct: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BillAmounts {
    pub gst: Derived,
    pub bill_total: Derived,
    pub tds: Derived,
    pub gst_on_workportion: Derived,
    pub lwc: Derived,
    pub net_amount: Derived,
}

/// Recompute every non-pinned bill amount.
///
/// Net amount follows the deduction model: every statutory charge reduces
/// the bill total. Deduction terms go through `abs` so a negative value
/// supplied via the override path still deducts.
pub fn recompute_bill(inputs: &BillInputs, amounts: &mut BillAmounts) {
    amounts
        .gst
        .recompute(inputs.work_portion * inputs.gst_pct / 100.0);
    amounts.bill_total.recompute(
        inputs.work_portion
            + inputs.royalty_and_testing
            + amounts.gst.value
            + inputs.reimbursement_of_insurance,
    );
    amounts
        .tds
        .recompute(inputs.work_portion * inputs.tds_pct / 100.0);
    amounts
        .gst_on_workportion
        .recompute(inputs.work_portion * inputs.gst_on_workportion_pct / 100.0);
    amounts.lwc.recompute(
        (inputs.work_portion + inputs.royalty_and_testing) * inputs.lwc_pct / 100.0,
    );
    amounts.net_amount.recompute(
        amounts.bill_total.value
            - amounts.tds.value.abs()
            - amounts.gst_on_workportion.value.abs()
            - inputs.security_deposit.abs()
            - amounts.lwc.value.abs()
            - inputs.insurance.abs()
            - inputs.royalty.abs(),
    );
}

/// Checkbox-to-date rule: a flag turning true fills its empty date with
/// today; a false flag clears the date unconditionally, even if the same
/// save just set it.
pub fn sync_flag_date(flag: bool, date: &mut Option<NaiveDate>, today: NaiveDate) {
    if flag {
        if date.is_none() {
            *date = Some(today);
        }
    } else {
        *date = None;
    }
}
