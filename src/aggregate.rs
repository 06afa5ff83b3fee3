//! Generic weekly aggregation over `(promoter, week, amount)`-shaped rows.
//!
//! Targets, deposits, disbursement sales and discounts all reduce through
//! the same accumulator; callers pick sum or count semantics through the
//! contribution closure. Rows without a reconciled promoter code land in an
//! `unattributed` bucket so grand totals still reconcile.

use crate::directory::PromoterCode;
use crate::week::WeekBucket;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
pub struct WeeklyAggregate {
    by_promoter: BTreeMap<PromoterCode, BTreeMap<WeekBucket, f64>>,
    unattributed: BTreeMap<WeekBucket, f64>,
}

/// Reduces any row iterator into a [`WeeklyAggregate`]. `key` yields the
/// (possibly unresolved) promoter and the week bucket; `contribution` yields
/// the value added for the row.
pub fn weekly_reduce<R>(
    rows: impl IntoIterator<Item = R>,
    key: impl Fn(&R) -> (Option<PromoterCode>, WeekBucket),
    contribution: impl Fn(&R) -> f64,
) -> WeeklyAggregate {
    let mut aggregate = WeeklyAggregate::default();
    for row in rows {
        let (code, week) = key(&row);
        let value = contribution(&row);
        match code {
            Some(code) => {
                *aggregate
                    .by_promoter
                    .entry(code)
                    .or_default()
                    .entry(week)
                    .or_insert(0.0) += value;
            }
            None => {
                *aggregate.unattributed.entry(week).or_insert(0.0) += value;
            }
        }
    }
    aggregate
}

/// Sum of amounts per promoter-week.
pub fn weekly_sum<R>(
    rows: impl IntoIterator<Item = R>,
    key: impl Fn(&R) -> (Option<PromoterCode>, WeekBucket),
    amount: impl Fn(&R) -> f64,
) -> WeeklyAggregate {
    weekly_reduce(rows, key, amount)
}

/// Row count per promoter-week (disbursement counts and the like).
pub fn weekly_count<R>(
    rows: impl IntoIterator<Item = R>,
    key: impl Fn(&R) -> (Option<PromoterCode>, WeekBucket),
) -> WeeklyAggregate {
    weekly_reduce(rows, key, |_| 1.0)
}

impl WeeklyAggregate {
    pub fn week_total(&self, code: &PromoterCode, week: WeekBucket) -> f64 {
        self.by_promoter
            .get(code)
            .and_then(|weeks| weeks.get(&week))
            .copied()
            .unwrap_or(0.0)
    }

    /// Sum of every week for the promoter.
    pub fn total_for(&self, code: &PromoterCode) -> f64 {
        self.by_promoter
            .get(code)
            .map(|weeks| weeks.values().sum())
            .unwrap_or(0.0)
    }

    /// Running sum of all weeks at or before `cutoff` for the promoter.
    pub fn cumulative_through(&self, code: &PromoterCode, cutoff: WeekBucket) -> f64 {
        self.by_promoter
            .get(code)
            .map(|weeks| weeks.range(..=cutoff).map(|(_, v)| v).sum())
            .unwrap_or(0.0)
    }

    /// Ranking variant of [`cumulative_through`](Self::cumulative_through):
    /// the promoter's most recent week within the window is excluded. The
    /// latest week's target is usually still in progress and would unfairly
    /// depress compliance; this is a business rule of the ranking view only.
    pub fn cumulative_excluding_latest(&self, code: &PromoterCode, cutoff: WeekBucket) -> f64 {
        let Some(weeks) = self.by_promoter.get(code) else {
            return 0.0;
        };
        let latest = weeks.range(..=cutoff).next_back().map(|(w, _)| *w);
        weeks
            .range(..=cutoff)
            .filter(|(w, _)| Some(**w) != latest)
            .map(|(_, v)| v)
            .sum()
    }

    /// Most recent week at or before `cutoff` with data for the promoter.
    pub fn latest_week_for(&self, code: &PromoterCode, cutoff: WeekBucket) -> Option<WeekBucket> {
        self.by_promoter
            .get(code)?
            .range(..=cutoff)
            .next_back()
            .map(|(w, _)| *w)
    }

    /// Per-week values for one promoter, chronological.
    pub fn weeks_for(&self, code: &PromoterCode) -> Vec<(WeekBucket, f64)> {
        self.by_promoter
            .get(code)
            .map(|weeks| weeks.iter().map(|(w, v)| (*w, *v)).collect())
            .unwrap_or_default()
    }

    /// Every week bucket seen across all promoters (not the unattributed
    /// bucket).
    pub fn all_weeks(&self) -> BTreeSet<WeekBucket> {
        self.by_promoter
            .values()
            .flat_map(|weeks| weeks.keys().copied())
            .collect()
    }

    pub fn promoters(&self) -> impl Iterator<Item = &PromoterCode> {
        self.by_promoter.keys()
    }

    /// Total attributed to reconciled promoters.
    pub fn attributed_total(&self) -> f64 {
        self.by_promoter
            .values()
            .flat_map(|weeks| weeks.values())
            .sum()
    }

    /// Total of rows without a promoter code; `attributed_total +
    /// unattributed_total` reconciles with the source.
    pub fn unattributed_total(&self) -> f64 {
        self.unattributed.values().sum()
    }

    /// Total for one week across every promoter, unattributed rows included.
    pub fn week_total_all(&self, week: WeekBucket) -> f64 {
        let attributed: f64 = self
            .by_promoter
            .values()
            .filter_map(|weeks| weeks.get(&week))
            .sum();
        attributed + self.unattributed.get(&week).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn week(y: i32, m: u32, d: u32) -> WeekBucket {
        WeekBucket::containing(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn code(s: &str) -> PromoterCode {
        PromoterCode::new(s)
    }

    // (code or None, week, amount)
    type Row = (Option<PromoterCode>, WeekBucket, f64);

    fn sum(rows: Vec<Row>) -> WeeklyAggregate {
        weekly_sum(rows, |r| (r.0.clone(), r.1), |r| r.2)
    }

    #[test]
    fn test_sum_groups_by_promoter_and_week() {
        let w1 = week(2023, 1, 2);
        let agg = sum(vec![
            (Some(code("P1")), w1, 100.0),
            (Some(code("P1")), w1, 50.0),
            (Some(code("P2")), w1, 30.0),
        ]);
        assert_eq!(agg.week_total(&code("P1"), w1), 150.0);
        assert_eq!(agg.week_total(&code("P2"), w1), 30.0);
    }

    #[test]
    fn test_count_semantics() {
        let w1 = week(2023, 1, 2);
        let rows: Vec<Row> = vec![
            (Some(code("P1")), w1, 999.0),
            (Some(code("P1")), w1, 1.0),
        ];
        let agg = weekly_count(rows, |r| (r.0.clone(), r.1));
        assert_eq!(agg.week_total(&code("P1"), w1), 2.0);
    }

    #[test]
    fn test_unattributed_bucket_reconciles_totals() {
        let w1 = week(2023, 1, 2);
        let agg = sum(vec![
            (Some(code("P1")), w1, 100.0),
            (None, w1, 40.0),
        ]);
        assert_eq!(agg.attributed_total(), 100.0);
        assert_eq!(agg.unattributed_total(), 40.0);
        // No promoter key was invented for the unmatched row.
        assert_eq!(agg.promoters().count(), 1);
    }

    #[test]
    fn test_cumulative_through_cutoff() {
        let w1 = week(2023, 1, 2);
        let w2 = week(2023, 1, 9);
        let w3 = week(2023, 1, 16);
        let agg = sum(vec![
            (Some(code("P1")), w1, 100.0),
            (Some(code("P1")), w2, 200.0),
            (Some(code("P1")), w3, 400.0),
        ]);
        assert_eq!(agg.cumulative_through(&code("P1"), w2), 300.0);
        assert_eq!(agg.cumulative_through(&code("P1"), w3), 700.0);
    }

    #[test]
    fn test_ranking_excludes_latest_week_only() {
        let weeks: Vec<WeekBucket> =
            (0..4).map(|i| week(2023, 1, 2 + 7 * i)).collect();
        let rows: Vec<Row> = weeks
            .iter()
            .enumerate()
            .map(|(i, w)| (Some(code("P1")), *w, 100.0 * (i + 1) as f64))
            .collect();
        let agg = sum(rows);

        // W1..W4 hold 100, 200, 300, 400.
        assert_eq!(
            agg.cumulative_excluding_latest(&code("P1"), weeks[3]),
            600.0
        );
        assert_eq!(agg.cumulative_through(&code("P1"), weeks[3]), 1000.0);
    }
}
