//! Reporting tables derived from the reconciled sources.
//!
//! Everything here is a plain in-memory table; rendering and interactivity
//! belong to the caller. Monetary fields stay `f64` so callers can format or
//! chart them; [`crate::numeric::format_money`] is the display companion.
//!
//! Business rules worth knowing before editing:
//! - the ranking excludes each promoter's latest target week, because that
//!   week's target is set mid-week and would punish everyone's compliance;
//! - flow is 90% of sales, and final flow subtracts renewal discounts;
//! - a promoter is delinquent in a week only if they missed that week's
//!   target AND are still behind cumulatively (early overpayment counts).

use crate::aggregate::WeeklyAggregate;
use crate::directory::{PromoterCode, PromoterDirectory};
use crate::installments::loan_statuses;
use crate::schema::{
    DepositRecord, DisbursementRecord, DiscountRecord, ExpectedBalanceRecord, LoanStatus,
};
use crate::week::WeekBucket;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Share of sales that becomes flow after operating costs.
const FLOW_FACTOR: f64 = 0.9;

/// Compliance below this over the last four weeks moves a promoter to the
/// default list.
const DEFAULT_COMPLIANCE_CUTOFF: f64 = 7.0;

fn compliance_pct(collected: f64, target: f64) -> f64 {
    if target > 0.0 {
        collected / target * 100.0
    } else {
        0.0
    }
}

fn name_of(directory: &PromoterDirectory, code: &PromoterCode) -> String {
    directory.display_name(code).unwrap_or_default().to_string()
}

// ---------------------------------------------------------------------------
// Promoter summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PromoterSummaryRow {
    pub code: PromoterCode,
    pub name: String,
    pub tenure_months: Option<f64>,
    pub total_target: f64,
    pub total_collected: f64,
    /// Collected minus target; negative means behind.
    pub difference: f64,
}

/// Lifetime totals per promoter, in natural code order. Promoters with no
/// target and no collection data are omitted.
pub fn promoter_summary(
    directory: &PromoterDirectory,
    targets: &WeeklyAggregate,
    deposits: &WeeklyAggregate,
) -> Vec<PromoterSummaryRow> {
    let mut rows = Vec::new();
    for code in directory.codes_sorted() {
        let total_target = targets.total_for(&code);
        let total_collected = deposits.total_for(&code);
        if total_target == 0.0 && total_collected == 0.0 {
            continue;
        }
        rows.push(PromoterSummaryRow {
            name: name_of(directory, &code),
            tenure_months: directory.get(&code).and_then(|r| r.tenure_months),
            total_target,
            total_collected,
            difference: total_collected - total_target,
            code,
        });
    }
    rows
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RankingRow {
    pub code: PromoterCode,
    pub name: String,
    pub cumulative_target: f64,
    pub cumulative_collected: f64,
    pub compliance_pct: f64,
}

/// Cumulative compliance ranking through `through`, best first. The target
/// side excludes each promoter's latest target week; collections do not.
pub fn ranking(
    directory: &PromoterDirectory,
    targets: &WeeklyAggregate,
    deposits: &WeeklyAggregate,
    through: WeekBucket,
) -> Vec<RankingRow> {
    let mut rows = Vec::new();
    for code in directory.codes_sorted() {
        let cumulative_target = targets.cumulative_excluding_latest(&code, through);
        let cumulative_collected = deposits.cumulative_through(&code, through);
        if cumulative_target == 0.0 && cumulative_collected == 0.0 {
            continue;
        }
        rows.push(RankingRow {
            name: name_of(directory, &code),
            compliance_pct: compliance_pct(cumulative_collected, cumulative_target),
            cumulative_target,
            cumulative_collected,
            code,
        });
    }
    rows.sort_by(|a, b| {
        b.compliance_pct
            .total_cmp(&a.compliance_pct)
            .then_with(|| a.code.cmp(&b.code))
    });
    rows
}

// ---------------------------------------------------------------------------
// Weekly delinquency
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct DelinquencyRow {
    pub code: PromoterCode,
    pub name: String,
    pub weekly_target: f64,
    pub weekly_collected: f64,
    pub cumulative_target: f64,
    pub cumulative_collected: f64,
}

impl DelinquencyRow {
    pub fn weekly_gap(&self) -> f64 {
        self.weekly_collected - self.weekly_target
    }

    pub fn cumulative_gap(&self) -> f64 {
        self.cumulative_collected - self.cumulative_target
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyDelinquency {
    pub week: WeekBucket,
    /// Missed this week's target and still behind cumulatively.
    pub delinquent: Vec<DelinquencyRow>,
    /// Deposited despite having no target this week.
    pub zero_target_with_deposit: Vec<DelinquencyRow>,
    pub total_target: f64,
    pub total_collected: f64,
    pub compliance_pct: f64,
}

/// Evaluates one week. A promoter who missed the weekly target but is ahead
/// cumulatively is not delinquent; prior overpayment carries forward.
pub fn weekly_delinquency(
    directory: &PromoterDirectory,
    targets: &WeeklyAggregate,
    deposits: &WeeklyAggregate,
    week: WeekBucket,
) -> WeeklyDelinquency {
    let mut delinquent = Vec::new();
    let mut zero_target = Vec::new();

    for code in directory.codes_sorted() {
        let row = DelinquencyRow {
            name: name_of(directory, &code),
            weekly_target: targets.week_total(&code, week),
            weekly_collected: deposits.week_total(&code, week),
            cumulative_target: targets.cumulative_through(&code, week),
            cumulative_collected: deposits.cumulative_through(&code, week),
            code,
        };
        if row.weekly_target > 0.0
            && row.weekly_collected < row.weekly_target
            && row.cumulative_collected < row.cumulative_target
        {
            delinquent.push(row);
        } else if row.weekly_target == 0.0 && row.weekly_collected > 0.0 {
            zero_target.push(row);
        }
    }

    let total_target = targets.week_total_all(week);
    let total_collected = deposits.week_total_all(week);
    WeeklyDelinquency {
        week,
        delinquent,
        zero_target_with_deposit: zero_target,
        compliance_pct: compliance_pct(total_collected, total_target),
        total_target,
        total_collected,
    }
}

// ---------------------------------------------------------------------------
// Payment pattern and risk
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PaymentPattern {
    pub code: PromoterCode,
    pub name: String,
    /// Deposit-weighted mean day-of-week (Sat=1 .. Fri=7) per week,
    /// chronological.
    pub weekly_mean_day: Vec<(WeekBucket, f64)>,
    pub early_mean: f64,
    pub late_mean: f64,
    /// Positive drift means payments are arriving later in the week.
    pub drift: f64,
}

/// Per-promoter shift in the day of week deposits arrive. Promoters with
/// fewer than two weeks of deposits are skipped.
pub fn payment_patterns(
    directory: &PromoterDirectory,
    deposits: &[DepositRecord],
) -> Vec<PaymentPattern> {
    let mut by_code: BTreeMap<PromoterCode, BTreeMap<WeekBucket, (f64, f64)>> = BTreeMap::new();
    for deposit in deposits {
        let Some(code) = &deposit.promoter_code else {
            continue;
        };
        let entry = by_code
            .entry(code.clone())
            .or_default()
            .entry(deposit.week())
            .or_insert((0.0, 0.0));
        entry.0 += f64::from(deposit.day_index) * deposit.amount;
        entry.1 += deposit.amount;
    }

    let mut patterns = Vec::new();
    for code in directory.codes_sorted() {
        let Some(weeks) = by_code.get(&code) else {
            continue;
        };
        let weekly: Vec<(WeekBucket, f64)> = weeks
            .iter()
            .filter(|(_, (_, amount))| *amount > 0.0)
            .map(|(week, (weighted, amount))| (*week, weighted / amount))
            .collect();
        if weekly.len() < 2 {
            continue;
        }

        // With six or more weeks compare the first and last three of the
        // most recent six; otherwise compare the two halves.
        let (early, late): (&[(WeekBucket, f64)], &[(WeekBucket, f64)]) = if weekly.len() >= 6 {
            let recent = &weekly[weekly.len() - 6..];
            (&recent[..3], &recent[3..])
        } else {
            let half = weekly.len() / 2;
            (&weekly[..half], &weekly[weekly.len() - half..])
        };
        let mean = |slice: &[(WeekBucket, f64)]| {
            slice.iter().map(|(_, d)| d).sum::<f64>() / slice.len() as f64
        };
        let early_mean = mean(early);
        let late_mean = mean(late);

        patterns.push(PaymentPattern {
            name: name_of(directory, &code),
            weekly_mean_day: weekly,
            early_mean,
            late_mean,
            drift: late_mean - early_mean,
            code,
        });
    }
    patterns
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskBand {
    Low,
    Elevated,
    High,
}

impl RiskBand {
    fn from_score(score: f64) -> Self {
        if score < 11.0 {
            RiskBand::Low
        } else if score < 35.0 {
            RiskBand::Elevated
        } else {
            RiskBand::High
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskRow {
    pub code: PromoterCode,
    pub name: String,
    pub early_mean: f64,
    pub late_mean: f64,
    pub drift: f64,
    /// Mean weekly compliance % over the last four closed weeks.
    pub four_week_compliance: f64,
    /// 0 (no risk signal) to 100.
    pub score: f64,
    pub band: RiskBand,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskReport {
    /// Promoters at or above the default cutoff, worst score first.
    pub main: Vec<RiskRow>,
    /// Under four-week compliance of 7%; effectively in default.
    pub defaulted: Vec<RiskRow>,
}

fn compliance_component(compliance: f64) -> f64 {
    if compliance >= 95.0 {
        0.0
    } else if compliance >= 80.0 {
        (95.0 - compliance) / 15.0
    } else {
        1.0
    }
}

fn delay_component(drift: f64) -> f64 {
    if drift <= 0.0 {
        0.0
    } else {
        drift.min(3.0) / 3.0
    }
}

/// Mean of per-week compliance over the promoter's last `n` closed weeks.
/// Weeks are the union of target and deposit weeks, missing sides as zero.
fn recent_weeks_compliance(
    code: &PromoterCode,
    targets: &WeeklyAggregate,
    deposits: &WeeklyAggregate,
    today: NaiveDate,
    n: usize,
) -> f64 {
    let mut weeks: BTreeSet<WeekBucket> = BTreeSet::new();
    weeks.extend(targets.weeks_for(code).into_iter().map(|(w, _)| w));
    weeks.extend(deposits.weeks_for(code).into_iter().map(|(w, _)| w));

    let recent: Vec<WeekBucket> = weeks
        .into_iter()
        .filter(|w| w.is_closed_as_of(today))
        .rev()
        .take(n)
        .collect();
    if recent.is_empty() {
        return 0.0;
    }

    let sum: f64 = recent
        .iter()
        .map(|w| compliance_pct(deposits.week_total(code, *w), targets.week_total(code, *w)))
        .sum();
    sum / recent.len() as f64
}

/// Scores every promoter with a payment pattern: 70% weight on four-week
/// compliance, 30% on pay-day drift. Promoters under 7% compliance are
/// separated into the default list; both lists sort worst first.
pub fn risk_report(
    patterns: &[PaymentPattern],
    targets: &WeeklyAggregate,
    deposits: &WeeklyAggregate,
    today: NaiveDate,
) -> RiskReport {
    let mut main = Vec::new();
    let mut defaulted = Vec::new();

    for pattern in patterns {
        let four_week_compliance =
            recent_weeks_compliance(&pattern.code, targets, deposits, today, 4);
        let score = (0.7 * compliance_component(four_week_compliance)
            + 0.3 * delay_component(pattern.drift))
            * 100.0;
        let row = RiskRow {
            code: pattern.code.clone(),
            name: pattern.name.clone(),
            early_mean: pattern.early_mean,
            late_mean: pattern.late_mean,
            drift: pattern.drift,
            four_week_compliance,
            band: RiskBand::from_score(score),
            score,
        };
        if four_week_compliance < DEFAULT_COMPLIANCE_CUTOFF {
            defaulted.push(row);
        } else {
            main.push(row);
        }
    }

    let worst_first = |a: &RiskRow, b: &RiskRow| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.code.cmp(&b.code))
    };
    main.sort_by(worst_first);
    defaulted.sort_by(worst_first);
    RiskReport { main, defaulted }
}

// ---------------------------------------------------------------------------
// Global totals and week snapshots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CreditCounts {
    pub placed: usize,
    /// Distinct promoter-weeks with a positive renewal discount.
    pub renewed: usize,
    pub new: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct GlobalTotals {
    pub target_total: f64,
    pub collected_total: f64,
    pub efficiency_pct: f64,
    /// Sum of outstanding balances across the expected-payments sheet.
    pub portfolio_balance: f64,
    pub sales: f64,
    pub flow: f64,
    pub discounts: f64,
    pub final_flow: f64,
    pub credits: CreditCounts,
}

fn credit_counts(disbursements: &[DisbursementRecord], discounts: &[DiscountRecord]) -> CreditCounts {
    let placed = disbursements.len();
    let renewed: HashSet<(&PromoterCode, WeekBucket)> = discounts
        .iter()
        .filter_map(|d| d.promoter_code.as_ref().map(|c| (c, d.week)))
        .collect();
    let renewed = renewed.len();
    CreditCounts {
        placed,
        renewed,
        new: placed.saturating_sub(renewed),
    }
}

/// Company-wide lifetime totals across every source.
pub fn global_totals(
    targets: &WeeklyAggregate,
    deposits: &WeeklyAggregate,
    disbursements: &[DisbursementRecord],
    discounts: &[DiscountRecord],
    expected: &[ExpectedBalanceRecord],
) -> GlobalTotals {
    let target_total = targets.attributed_total() + targets.unattributed_total();
    let collected_total = deposits.attributed_total() + deposits.unattributed_total();
    let sales: f64 = disbursements.iter().map(|d| d.amount).sum();
    let discount_total: f64 = discounts.iter().map(|d| d.discount_amount).sum();
    let flow = sales * FLOW_FACTOR;

    GlobalTotals {
        efficiency_pct: compliance_pct(collected_total, target_total),
        target_total,
        collected_total,
        portfolio_balance: expected.iter().map(|e| e.outstanding_balance).sum(),
        sales,
        flow,
        discounts: discount_total,
        final_flow: flow - discount_total,
        credits: credit_counts(disbursements, discounts),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WeekSnapshot {
    pub week: WeekBucket,
    pub target_total: f64,
    pub collected_total: f64,
    pub compliance_pct: f64,
    pub sales: f64,
    pub flow: f64,
    pub discounts: f64,
    pub final_flow: f64,
    pub credits_placed: usize,
    pub credits_renewed: usize,
}

/// One week's totals, for side-by-side week comparisons.
pub fn week_snapshot(
    week: WeekBucket,
    targets: &WeeklyAggregate,
    deposits: &WeeklyAggregate,
    disbursements: &[DisbursementRecord],
    discounts: &[DiscountRecord],
) -> WeekSnapshot {
    let in_week = |date: Option<NaiveDate>| date.is_some_and(|d| week.contains(d));
    let sales: f64 = disbursements
        .iter()
        .filter(|d| in_week(d.disbursement_date))
        .map(|d| d.amount)
        .sum();
    let credits_placed = disbursements
        .iter()
        .filter(|d| in_week(d.disbursement_date))
        .count();
    let renewed: HashSet<&PromoterCode> = discounts
        .iter()
        .filter(|d| d.week == week)
        .filter_map(|d| d.promoter_code.as_ref())
        .collect();
    let discount_total: f64 = discounts
        .iter()
        .filter(|d| d.week == week)
        .map(|d| d.discount_amount)
        .sum();
    let flow = sales * FLOW_FACTOR;
    let target_total = targets.week_total_all(week);
    let collected_total = deposits.week_total_all(week);

    WeekSnapshot {
        week,
        compliance_pct: compliance_pct(collected_total, target_total),
        target_total,
        collected_total,
        sales,
        flow,
        discounts: discount_total,
        final_flow: flow - discount_total,
        credits_placed,
        credits_renewed: renewed.len(),
    }
}

// ---------------------------------------------------------------------------
// Target totals (penultimate / latest week table)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct TargetTotalsRow {
    pub code: PromoterCode,
    pub name: String,
    pub penultimate_target: f64,
    pub latest_target: f64,
    pub total_target: f64,
    /// All collections through the Friday closing the latest target week.
    pub collected_through_latest: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetTotals {
    pub penultimate_week: Option<WeekBucket>,
    pub latest_week: Option<WeekBucket>,
    pub rows: Vec<TargetTotalsRow>,
}

/// Per-promoter targets for the two most recent target weeks plus lifetime
/// totals. Promoters without any target are omitted.
pub fn target_totals(
    directory: &PromoterDirectory,
    targets: &WeeklyAggregate,
    deposits: &WeeklyAggregate,
) -> TargetTotals {
    let weeks: Vec<WeekBucket> = targets.all_weeks().into_iter().collect();
    let latest_week = weeks.last().copied();
    let penultimate_week = weeks.len().checked_sub(2).map(|i| weeks[i]);

    let mut rows = Vec::new();
    for code in directory.codes_sorted() {
        let total_target = targets.total_for(&code);
        if total_target == 0.0 {
            continue;
        }
        rows.push(TargetTotalsRow {
            name: name_of(directory, &code),
            penultimate_target: penultimate_week
                .map_or(0.0, |w| targets.week_total(&code, w)),
            latest_target: latest_week.map_or(0.0, |w| targets.week_total(&code, w)),
            total_target,
            collected_through_latest: latest_week
                .map_or(0.0, |w| deposits.cumulative_through(&code, w)),
            code,
        });
    }

    TargetTotals {
        penultimate_week,
        latest_week,
        rows,
    }
}

// ---------------------------------------------------------------------------
// Promoter weekly series
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct WeeklySeriesRow {
    pub week: WeekBucket,
    pub target: f64,
    pub collected: f64,
    pub compliance_pct: f64,
}

/// Week-by-week target vs collection for one promoter, covering every week
/// from their first to their last with data; gap weeks appear as zeros.
pub fn promoter_weekly_series(
    targets: &WeeklyAggregate,
    deposits: &WeeklyAggregate,
    code: &PromoterCode,
) -> Vec<WeeklySeriesRow> {
    let mut weeks: BTreeSet<WeekBucket> = BTreeSet::new();
    weeks.extend(targets.weeks_for(code).into_iter().map(|(w, _)| w));
    weeks.extend(deposits.weeks_for(code).into_iter().map(|(w, _)| w));
    let (Some(first), Some(last)) = (weeks.first(), weeks.last()) else {
        return Vec::new();
    };

    WeekBucket::range_inclusive(*first, *last)
        .into_iter()
        .map(|week| {
            let target = targets.week_total(code, week);
            let collected = deposits.week_total(code, week);
            WeeklySeriesRow {
                week,
                compliance_pct: compliance_pct(collected, target),
                target,
                collected,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Loan detail
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct LoanDetail {
    pub code: PromoterCode,
    pub name: String,
    pub loans: Vec<LoanStatus>,
    /// Loans omitted for missing contract id or first-payment date.
    pub skipped: usize,
}

/// Per-loan installment status for one promoter's portfolio.
pub fn loan_detail(
    directory: &PromoterDirectory,
    disbursements: &[DisbursementRecord],
    deposits: &[DepositRecord],
    code: &PromoterCode,
    today: NaiveDate,
) -> LoanDetail {
    let own_loans: Vec<DisbursementRecord> = disbursements
        .iter()
        .filter(|d| d.promoter_code.as_ref() == Some(code))
        .cloned()
        .collect();
    let own_deposits: Vec<DepositRecord> = deposits
        .iter()
        .filter(|d| d.promoter_code.as_ref() == Some(code))
        .cloned()
        .collect();
    let (loans, skipped) = loan_statuses(&own_loans, &own_deposits, today);

    LoanDetail {
        code: code.clone(),
        name: name_of(directory, code),
        loans,
        skipped,
    }
}
