//! Record types for the dashboard's source tables and derived outputs.
//!
//! Every reconciled record carries an `Option<PromoterCode>`: rows whose
//! promoter name failed reconciliation keep `None` and are reported, never
//! silently dropped or silently assigned a code. Contract ids are normalized
//! to `String` at ingestion on both the loan and deposit side, so matching is
//! always string equality.

use crate::directory::PromoterCode;
use crate::reconcile::UnmatchedReport;
use crate::week::WeekBucket;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One weekly collection target. The sheet name identifies the promoter, so
/// the code needs no reconciliation. First value wins per promoter-week.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetRecord {
    pub promoter_code: PromoterCode,
    pub week: WeekBucket,
    pub target_amount: f64,
}

/// One daily collection deposit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRecord {
    pub promoter_code: Option<PromoterCode>,
    pub raw_promoter_name: String,
    pub contract_id: Option<String>,
    pub transaction_date: NaiveDate,
    pub amount: f64,
    pub state: Option<String>,
    pub municipality: Option<String>,
    /// Saturday → 1 … Friday → 7.
    pub day_index: u8,
}

impl DepositRecord {
    pub fn week(&self) -> WeekBucket {
        WeekBucket::containing(self.transaction_date)
    }
}

/// One loan placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisbursementRecord {
    pub promoter_code: Option<PromoterCode>,
    pub raw_promoter_name: String,
    pub contract_id: Option<String>,
    pub client_name: String,
    pub disbursement_date: Option<NaiveDate>,
    pub amount: f64,
    pub installment_size: f64,
    pub first_payment_date: Option<NaiveDate>,
}

/// One renewal discount. Only strictly positive amounts are loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountRecord {
    pub promoter_code: Option<PromoterCode>,
    pub raw_promoter_name: String,
    pub week: WeekBucket,
    pub discount_amount: f64,
}

/// One row of the expected-payments sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectedBalanceRecord {
    pub promoter_code: Option<PromoterCode>,
    pub raw_promoter_name: String,
    pub outstanding_balance: f64,
    pub installment_size: f64,
    pub overdue_amount: f64,
    pub due_date: Option<NaiveDate>,
}

/// Lifecycle of one loan as of a reference date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    OnTime,
    Late,
    Overdue,
    PaidOff,
    Unknown,
}

/// Installment accounting for one loan. Derived on demand, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanStatus {
    pub contract_id: String,
    pub client_name: String,
    pub payments_due: u32,
    pub payments_completed: u32,
    /// At most one partial installment is tracked, not a count of all
    /// partial weeks.
    pub payments_incomplete: u8,
    pub overdue_amount: f64,
    pub payments_ahead: u32,
    pub lifecycle_state: LifecycleState,
}

/// Row-level issues accumulated while loading one source. These never abort
/// a load; fatal problems (missing columns, missing sheet) are errors
/// instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub rows_read: usize,
    /// Rows dropped because a numeric or date field failed to parse.
    pub rows_dropped: usize,
    pub unmatched: UnmatchedReport,
}

/// A loaded source table together with its diagnostics.
#[derive(Debug, Clone, Default)]
pub struct Loaded<T> {
    pub rows: Vec<T>,
    pub diagnostics: Diagnostics,
}

impl<T> Loaded<T> {
    /// The degraded value for an optional source that was not provided.
    pub fn empty() -> Self {
        Loaded {
            rows: Vec::new(),
            diagnostics: Diagnostics::default(),
        }
    }
}
