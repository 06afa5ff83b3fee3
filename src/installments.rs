//! Installment accounting for individual loans.
//!
//! Each loan is a fixed-term weekly credit: [`MAX_INSTALLMENTS`] payments of
//! `installment_size`, the first one due on `first_payment_date`. Deposits
//! are matched to the loan by exact contract-id string equality; both sides
//! are normalized to `String` at ingestion, because an int/string mismatch
//! here once produced silently empty results.
//!
//! The reference date is supplied by the caller rather than read from the
//! wall clock, which keeps every computation here deterministic.

use crate::schema::{DepositRecord, DisbursementRecord, LifecycleState, LoanStatus};
use chrono::{Days, NaiveDate};
use log::debug;
use std::collections::HashMap;

/// Fixed loan term in weekly installments. A product constant of the current
/// portfolio, not a fact about all loan products.
pub const MAX_INSTALLMENTS: u32 = 14;

/// Computes the installment status of one loan as of `today`, given the
/// total deposited against its contract.
///
/// Returns `None` when the loan is missing its contract id or first-payment
/// date; such loans are skipped entirely rather than reported with a
/// spurious overdue state.
pub fn loan_status(
    loan: &DisbursementRecord,
    total_deposited: f64,
    today: NaiveDate,
) -> Option<LoanStatus> {
    let contract_id = loan.contract_id.as_ref()?;
    let first_payment = loan.first_payment_date?;

    let weeks_elapsed = (today - first_payment).num_days().max(0) / 7;
    let payments_due = MAX_INSTALLMENTS.min(weeks_elapsed as u32 + 1);

    let installment = loan.installment_size;
    let (payments_completed, remainder) = if installment > 0.0 {
        let completed = ((total_deposited / installment).floor() as u32).min(MAX_INSTALLMENTS);
        (completed, total_deposited % installment)
    } else {
        (0, 0.0)
    };

    let payments_incomplete = u8::from(remainder > 0.0 && remainder < installment);
    let overdue_amount = (f64::from(payments_due) * installment - total_deposited).max(0.0);
    let payments_ahead = payments_completed.saturating_sub(payments_due);

    let term_end = first_payment + Days::new(7 * 13);
    let lifecycle_state = if installment <= 0.0 {
        LifecycleState::Unknown
    } else if payments_completed >= MAX_INSTALLMENTS {
        LifecycleState::PaidOff
    } else if payments_completed >= payments_due {
        LifecycleState::OnTime
    } else if today < term_end {
        LifecycleState::Late
    } else {
        LifecycleState::Overdue
    };

    Some(LoanStatus {
        contract_id: contract_id.clone(),
        client_name: loan.client_name.clone(),
        payments_due,
        payments_completed,
        payments_incomplete,
        overdue_amount,
        payments_ahead,
        lifecycle_state,
    })
}

/// Statuses for a batch of loans, matching deposits by contract id. Returns
/// the computed statuses and the number of loans skipped for missing key
/// fields.
pub fn loan_statuses(
    loans: &[DisbursementRecord],
    deposits: &[DepositRecord],
    today: NaiveDate,
) -> (Vec<LoanStatus>, usize) {
    let mut deposited_by_contract: HashMap<&str, f64> = HashMap::new();
    for deposit in deposits {
        if let Some(contract_id) = &deposit.contract_id {
            *deposited_by_contract.entry(contract_id).or_insert(0.0) += deposit.amount;
        }
    }

    let mut statuses = Vec::new();
    let mut skipped = 0;
    for loan in loans {
        let total = loan
            .contract_id
            .as_deref()
            .and_then(|id| deposited_by_contract.get(id))
            .copied()
            .unwrap_or(0.0);
        match loan_status(loan, total, today) {
            Some(status) => statuses.push(status),
            None => {
                debug!(
                    "skipping loan for '{}' (missing contract id or first-payment date)",
                    loan.client_name
                );
                skipped += 1;
            }
        }
    }
    (statuses, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::week::day_index;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn loan(contract: Option<&str>, first_payment: Option<NaiveDate>, installment: f64) -> DisbursementRecord {
        DisbursementRecord {
            promoter_code: None,
            raw_promoter_name: String::new(),
            contract_id: contract.map(|s| s.to_string()),
            client_name: "Cliente".to_string(),
            disbursement_date: None,
            amount: 0.0,
            installment_size: installment,
            first_payment_date: first_payment,
        }
    }

    fn deposit(contract: &str, date: NaiveDate, amount: f64) -> DepositRecord {
        DepositRecord {
            promoter_code: None,
            raw_promoter_name: String::new(),
            contract_id: Some(contract.to_string()),
            transaction_date: date,
            amount,
            state: None,
            municipality: None,
            day_index: day_index(date),
        }
    }

    #[test]
    fn test_on_schedule_loan() {
        // First payment Fri 2023-01-06, three weeks elapsed by 2023-01-27,
        // so four payments are due and three are covered.
        let loan = loan(Some("C1"), Some(d(2023, 1, 6)), 100.0);
        let status = loan_status(&loan, 300.0, d(2023, 1, 27)).unwrap();

        assert_eq!(status.payments_due, 4);
        assert_eq!(status.payments_completed, 3);
        assert_eq!(status.payments_incomplete, 0);
        assert_eq!(status.overdue_amount, 100.0);
        assert_eq!(status.payments_ahead, 0);
        assert_eq!(status.lifecycle_state, LifecycleState::Late);
    }

    #[test]
    fn test_exactly_on_time() {
        let loan = loan(Some("C1"), Some(d(2023, 1, 6)), 100.0);
        let status = loan_status(&loan, 400.0, d(2023, 1, 27)).unwrap();
        assert_eq!(status.payments_completed, 4);
        assert_eq!(status.overdue_amount, 0.0);
        assert_eq!(status.lifecycle_state, LifecycleState::OnTime);
    }

    #[test]
    fn test_paid_off_regardless_of_due() {
        let loan = loan(Some("C1"), Some(d(2023, 1, 6)), 100.0);
        let status = loan_status(&loan, 1400.0, d(2023, 1, 13)).unwrap();
        assert_eq!(status.payments_completed, 14);
        assert_eq!(status.lifecycle_state, LifecycleState::PaidOff);
        assert!(status.payments_ahead > 0);
    }

    #[test]
    fn test_partial_installment_tracked_once() {
        let loan = loan(Some("C1"), Some(d(2023, 1, 6)), 100.0);
        let status = loan_status(&loan, 250.0, d(2023, 1, 27)).unwrap();
        assert_eq!(status.payments_completed, 2);
        assert_eq!(status.payments_incomplete, 1);
        assert_eq!(status.overdue_amount, 150.0);
    }

    #[test]
    fn test_overdue_after_term_end() {
        let loan = loan(Some("C1"), Some(d(2023, 1, 6)), 100.0);
        // Term ends 13 weeks after the first payment: 2023-04-07.
        let status = loan_status(&loan, 500.0, d(2023, 4, 7)).unwrap();
        assert_eq!(status.lifecycle_state, LifecycleState::Overdue);

        let still_late = loan_status(&loan, 500.0, d(2023, 4, 6)).unwrap();
        assert_eq!(still_late.lifecycle_state, LifecycleState::Late);
    }

    #[test]
    fn test_future_first_payment_clamps_to_one_due() {
        let loan = loan(Some("C1"), Some(d(2023, 3, 1)), 100.0);
        let status = loan_status(&loan, 0.0, d(2023, 1, 1)).unwrap();
        assert_eq!(status.payments_due, 1);
        assert_eq!(status.lifecycle_state, LifecycleState::Late);
    }

    #[test]
    fn test_zero_installment_is_unknown() {
        let loan = loan(Some("C1"), Some(d(2023, 1, 6)), 0.0);
        let status = loan_status(&loan, 500.0, d(2023, 2, 1)).unwrap();
        assert_eq!(status.payments_completed, 0);
        assert_eq!(status.payments_incomplete, 0);
        assert_eq!(status.lifecycle_state, LifecycleState::Unknown);
    }

    #[test]
    fn test_missing_key_fields_are_skipped() {
        let loans = vec![
            loan(None, Some(d(2023, 1, 6)), 100.0),
            loan(Some("C2"), None, 100.0),
            loan(Some("C3"), Some(d(2023, 1, 6)), 100.0),
        ];
        let (statuses, skipped) = loan_statuses(&loans, &[], d(2023, 2, 1));

        assert_eq!(skipped, 2);
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].contract_id, "C3");
        // The skipped loans never surface as overdue.
        assert!(statuses.iter().all(|s| s.contract_id == "C3"));
    }

    #[test]
    fn test_deposit_matching_by_contract_string() {
        let loans = vec![loan(Some("1001"), Some(d(2023, 1, 6)), 100.0)];
        let deposits = vec![
            deposit("1001", d(2023, 1, 7), 100.0),
            deposit("1001", d(2023, 1, 14), 100.0),
            deposit("2002", d(2023, 1, 14), 500.0),
        ];
        let (statuses, skipped) = loan_statuses(&loans, &deposits, d(2023, 1, 20));
        assert_eq!(skipped, 0);
        assert_eq!(statuses[0].payments_completed, 2);
    }
}
