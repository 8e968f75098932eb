// models.rs
// Document structs for the lifecycle chain (GR -> Work -> TechnicalSanction
// -> Tender -> Bill, plus Spill increments on Work) and for authentication.

use bson::{DateTime, oid::ObjectId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calc::{BillAmounts, SanctionAmounts};

/// Government Resolution: the funding document rooting every Work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gr {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub gr_number: String,
    pub date: NaiveDate,
    /// Relative path of the uploaded resolution document, if any.
    pub document: Option<String>,
    pub is_demo: bool,
    pub created_at: Option<DateTime>,
    pub updated_at: Option<DateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelReason {
    ShiftedToOtherWork,
    MovedToOtherDepartment,
}

/// A funded project under a GR. `aa` is the approved ceiling; `ra` plus
/// the ARA of its spills must never exceed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Work {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub gr_id: ObjectId,
    pub name_of_work: String,
    pub date: NaiveDate,
    pub aa: f64,
    pub ra: f64,
    pub is_cancelled: bool,
    pub cancel_reason: Option<CancelReason>,
    pub cancel_details: Option<String>,
    pub is_demo: bool,
    pub created_at: Option<DateTime>,
    pub updated_at: Option<DateTime>,
}

/// Additional Revised Approval increment on a Work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spill {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub work_id: ObjectId,
    pub ara: f64,
    pub is_demo: bool,
    pub created_at: Option<DateTime>,
}

/// Budget sanction for a Work. Derived amounts live in `amounts`; the
/// stored percentage rates are the effective (defaulted) ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalSanction {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub work_id: ObjectId,
    pub sub_name: Option<String>,
    pub work_portion: f64,
    pub royalty: f64,
    pub testing: f64,
    pub consultancy: f64,
    pub gst_percentage: f64,
    pub contingency_percentage: f64,
    pub labour_insurance_percentage: f64,
    #[serde(flatten)]
    pub amounts: SanctionAmounts,
    pub noting: bool,
    pub noting_date: Option<NaiveDate>,
    pub order: bool,
    pub order_date: Option<NaiveDate>,
    pub is_demo: bool,
    pub created_at: Option<DateTime>,
    pub updated_at: Option<DateTime>,
}

/// Awarded contract against a Work, tracked through milestone flags whose
/// dates fill and clear with the flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tender {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub work_id: ObjectId,
    pub technical_sanction_id: Option<ObjectId>,
    pub tender_number: String,
    pub agency_name: String,
    pub date: NaiveDate,
    /// Relative path of the uploaded work-order document, if any.
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
    pub created_at: Option<DateTime>,
    pub updated_at: Option<DateTime>,
}

/// Payment claim against a Tender. `payment_done_from_gr` names the GR the
/// payment was drawn from; while it is empty the bill is pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bill {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub tender_id: ObjectId,
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
    #[serde(flatten)]
    pub amounts: BillAmounts,
    pub payment_done_from_gr: Option<ObjectId>,
    pub document: Option<String>,
    pub is_demo: bool,
    pub created_at: Option<DateTime>,
    pub updated_at: Option<DateTime>,
}

/// Registered operator. New accounts stay locked until an admin follows
/// the approval link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub is_approved: bool,
    pub approval_token: Option<String>,
    pub approval_expires_at: Option<DateTime>,
    pub created_at: Option<DateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// Bearer token document. Deleting a token is the blacklist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub token: String,
    pub user_id: ObjectId,
    pub kind: TokenKind,
    pub expires_at: DateTime,
}
