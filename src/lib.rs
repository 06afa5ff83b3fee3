//! # Promoter Analytics
//!
//! A library for turning a microfinance operation's weekly spreadsheets into
//! reconciled, queryable portfolio tables.
//!
//! ## Core Concepts
//!
//! - **Promoter**: a field agent identified by a code (`P1`, `P2`, ...) in
//!   the roster; every other source refers to them by free-typed name.
//! - **Reconciliation**: mapping those raw names back to codes through
//!   exact, accent-normalized and fuzzy tiers; unmatched rows are reported,
//!   never invented.
//! - **Week bucket**: the Saturday-to-Friday operational week all targets
//!   and collections are bucketed into.
//! - **Installment accounting**: each loan is 14 weekly payments; deposits
//!   matched by contract id drive a per-loan lifecycle state.
//!
//! ## Example
//!
//! ```rust,ignore
//! use promoter_analytics::*;
//! use chrono::NaiveDate;
//!
//! let roster = ingestion::load_roster(&roster_bytes)?;
//! let collections = ingestion::load_collections(&cob_bytes, &roster.directory)?;
//! let disbursements = ingestion::load_disbursements(&col_bytes, &roster.directory)?;
//!
//! let dashboard = Dashboard::new(
//!     roster,
//!     collections,
//!     disbursements,
//!     Loaded::empty(),
//!     Loaded::empty(),
//! );
//!
//! let today = NaiveDate::from_ymd_opt(2023, 6, 2).unwrap();
//! for row in dashboard.ranking_latest() {
//!     println!("{} {} {:.1}%", row.code, row.name, row.compliance_pct);
//! }
//! ```

pub mod aggregate;
pub mod cache;
pub mod directory;
pub mod error;
pub mod ingestion;
pub mod installments;
pub mod normalize;
pub mod numeric;
pub mod reconcile;
pub mod schema;
pub mod views;
pub mod week;

pub use aggregate::{weekly_count, weekly_reduce, weekly_sum, WeeklyAggregate};
pub use cache::{content_hash, SourceCache};
pub use directory::{PromoterCode, PromoterDirectory, PromoterRecord, RosterRow};
pub use error::{DashboardError, Result};
pub use ingestion::{
    load_collections, load_disbursements, load_discounts, load_expected_balances, load_roster,
    read_source, RosterData,
};
pub use installments::{loan_status, loan_statuses, MAX_INSTALLMENTS};
pub use normalize::normalize_name;
pub use numeric::{format_money, parse_amount};
pub use reconcile::{MatchTier, Reconciler, Resolution, UnmatchedReport, SIMILARITY_CUTOFF};
pub use schema::*;
pub use views::*;
pub use week::{day_index, WeekBucket};

use log::info;
use serde::Serialize;
use std::collections::BTreeSet;

/// Serializes any reporting table to pretty JSON, for export or archival.
pub fn to_json_pretty<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// All loaded sources plus the weekly aggregates derived from them; the
/// entry point for every reporting table.
///
/// Aggregation happens once at construction. The view methods after that
/// are cheap enough to call per render.
#[derive(Debug, Clone)]
pub struct Dashboard {
    pub directory: PromoterDirectory,
    pub targets: Vec<TargetRecord>,
    pub deposits: Vec<DepositRecord>,
    pub disbursements: Vec<DisbursementRecord>,
    pub discounts: Vec<DiscountRecord>,
    pub expected_balances: Vec<ExpectedBalanceRecord>,
    pub target_totals_by_week: WeeklyAggregate,
    pub deposit_totals_by_week: WeeklyAggregate,
}

impl Dashboard {
    pub fn new(
        roster: RosterData,
        collections: Loaded<DepositRecord>,
        disbursements: Loaded<DisbursementRecord>,
        discounts: Loaded<DiscountRecord>,
        expected_balances: Loaded<ExpectedBalanceRecord>,
    ) -> Self {
        let target_totals_by_week = weekly_sum(
            roster.targets.iter(),
            |t| (Some(t.promoter_code.clone()), t.week),
            |t| t.target_amount,
        );
        let deposit_totals_by_week = weekly_sum(
            collections.rows.iter(),
            |d| (d.promoter_code.clone(), d.week()),
            |d| d.amount,
        );

        info!(
            "dashboard ready: {} promoters, {} target weeks, {} deposits",
            roster.directory.len(),
            target_totals_by_week.all_weeks().len(),
            collections.rows.len()
        );

        Dashboard {
            directory: roster.directory,
            targets: roster.targets,
            deposits: collections.rows,
            disbursements: disbursements.rows,
            discounts: discounts.rows,
            expected_balances: expected_balances.rows,
            target_totals_by_week,
            deposit_totals_by_week,
        }
    }

    /// Every week with a target or a deposit, chronological.
    pub fn available_weeks(&self) -> Vec<WeekBucket> {
        let mut weeks: BTreeSet<WeekBucket> = self.target_totals_by_week.all_weeks();
        weeks.extend(self.deposit_totals_by_week.all_weeks());
        weeks.into_iter().collect()
    }

    pub fn promoter_summary(&self) -> Vec<PromoterSummaryRow> {
        views::promoter_summary(
            &self.directory,
            &self.target_totals_by_week,
            &self.deposit_totals_by_week,
        )
    }

    pub fn ranking(&self, through: WeekBucket) -> Vec<RankingRow> {
        views::ranking(
            &self.directory,
            &self.target_totals_by_week,
            &self.deposit_totals_by_week,
            through,
        )
    }

    /// Ranking through the most recent week with any data.
    pub fn ranking_latest(&self) -> Vec<RankingRow> {
        match self.available_weeks().last() {
            Some(week) => self.ranking(*week),
            None => Vec::new(),
        }
    }

    pub fn weekly_delinquency(&self, week: WeekBucket) -> WeeklyDelinquency {
        views::weekly_delinquency(
            &self.directory,
            &self.target_totals_by_week,
            &self.deposit_totals_by_week,
            week,
        )
    }

    pub fn payment_patterns(&self) -> Vec<PaymentPattern> {
        views::payment_patterns(&self.directory, &self.deposits)
    }

    pub fn risk_report(&self, today: chrono::NaiveDate) -> RiskReport {
        let patterns = self.payment_patterns();
        views::risk_report(
            &patterns,
            &self.target_totals_by_week,
            &self.deposit_totals_by_week,
            today,
        )
    }

    pub fn global_totals(&self) -> GlobalTotals {
        views::global_totals(
            &self.target_totals_by_week,
            &self.deposit_totals_by_week,
            &self.disbursements,
            &self.discounts,
            &self.expected_balances,
        )
    }

    pub fn week_snapshot(&self, week: WeekBucket) -> WeekSnapshot {
        views::week_snapshot(
            week,
            &self.target_totals_by_week,
            &self.deposit_totals_by_week,
            &self.disbursements,
            &self.discounts,
        )
    }

    pub fn target_totals(&self) -> TargetTotals {
        views::target_totals(
            &self.directory,
            &self.target_totals_by_week,
            &self.deposit_totals_by_week,
        )
    }

    pub fn promoter_weekly_series(&self, code: &PromoterCode) -> Vec<WeeklySeriesRow> {
        views::promoter_weekly_series(
            &self.target_totals_by_week,
            &self.deposit_totals_by_week,
            code,
        )
    }

    pub fn loan_detail(&self, code: &PromoterCode, today: chrono::NaiveDate) -> LoanDetail {
        views::loan_detail(
            &self.directory,
            &self.disbursements,
            &self.deposits,
            code,
            today,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn roster() -> RosterData {
        let directory = PromoterDirectory::from_roster(vec![RosterRow {
            code: "P1".to_string(),
            name: "María López".to_string(),
            tenure_months: Some(8.0),
        }]);
        let week = WeekBucket::containing(d(2023, 1, 2));
        RosterData {
            directory,
            targets: vec![
                TargetRecord {
                    promoter_code: PromoterCode::new("P1"),
                    week,
                    target_amount: 1000.0,
                },
                TargetRecord {
                    promoter_code: PromoterCode::new("P1"),
                    week: week.next(),
                    target_amount: 1000.0,
                },
            ],
            diagnostics: Diagnostics::default(),
        }
    }

    fn deposits() -> Loaded<DepositRecord> {
        let date = d(2023, 1, 3);
        Loaded {
            rows: vec![DepositRecord {
                promoter_code: Some(PromoterCode::new("P1")),
                raw_promoter_name: "MARIA LOPEZ".to_string(),
                contract_id: Some("1001".to_string()),
                transaction_date: date,
                amount: 750.0,
                state: None,
                municipality: None,
                day_index: day_index(date),
            }],
            diagnostics: Diagnostics::default(),
        }
    }

    #[test]
    fn test_dashboard_end_to_end() {
        let dashboard = Dashboard::new(
            roster(),
            deposits(),
            Loaded::empty(),
            Loaded::empty(),
            Loaded::empty(),
        );

        let weeks = dashboard.available_weeks();
        assert_eq!(weeks.len(), 2);

        let summary = dashboard.promoter_summary();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].total_target, 2000.0);
        assert_eq!(summary[0].total_collected, 750.0);

        // Latest target week excluded: 750 collected against 1000.
        let ranking = dashboard.ranking_latest();
        assert_eq!(ranking.len(), 1);
        assert_eq!(ranking[0].cumulative_target, 1000.0);
        assert!((ranking[0].compliance_pct - 75.0).abs() < 1e-9);

        let totals = dashboard.global_totals();
        assert_eq!(totals.collected_total, 750.0);
        assert_eq!(totals.target_total, 2000.0);
    }

    #[test]
    fn test_dashboard_empty_optional_sources() {
        let dashboard = Dashboard::new(
            roster(),
            Loaded::empty(),
            Loaded::empty(),
            Loaded::empty(),
            Loaded::empty(),
        );

        assert!(dashboard.payment_patterns().is_empty());
        let totals = dashboard.global_totals();
        assert_eq!(totals.sales, 0.0);
        assert_eq!(totals.credits.placed, 0);
    }

    #[test]
    fn test_tables_serialize_to_json() {
        let dashboard = Dashboard::new(
            roster(),
            deposits(),
            Loaded::empty(),
            Loaded::empty(),
            Loaded::empty(),
        );

        let json = to_json_pretty(&dashboard.promoter_summary()).unwrap();
        assert!(json.contains("\"total_collected\": 750.0"));
        assert!(json.contains("María López"));
    }
}
