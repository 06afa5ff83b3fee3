//! Saturday-to-Friday week buckets.
//!
//! Every time-series aggregation in the dashboard keys on these buckets
//! rather than raw dates, so disjoint date ranges collapse to commensurable
//! calendar weeks. The anchoring (Friday is always the last day) mirrors how
//! collections close out their week.

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// One calendar week running Saturday through Friday. Identified by its
/// start date; ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WeekBucket {
    start: NaiveDate,
}

impl WeekBucket {
    /// The bucket containing `date`. Buckets are contiguous and
    /// non-overlapping, so every date belongs to exactly one.
    pub fn containing(date: NaiveDate) -> Self {
        let days_to_friday = (4 + 7 - date.weekday().num_days_from_monday()) % 7;
        let end = date + Days::new(u64::from(days_to_friday));
        WeekBucket {
            start: end - Days::new(6),
        }
    }

    /// Saturday.
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Friday.
    pub fn end(&self) -> NaiveDate {
        self.start + Days::new(6)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start() && date <= self.end()
    }

    pub fn next(&self) -> Self {
        WeekBucket {
            start: self.start + Days::new(7),
        }
    }

    /// A week is closed once its Friday has fully elapsed relative to the
    /// reference date.
    pub fn is_closed_as_of(&self, today: NaiveDate) -> bool {
        self.end() < today
    }

    /// All buckets from `from` through `to` inclusive. Empty when
    /// `from > to`.
    pub fn range_inclusive(from: WeekBucket, to: WeekBucket) -> Vec<WeekBucket> {
        let mut weeks = Vec::new();
        let mut current = from;
        while current <= to {
            weeks.push(current);
            current = current.next();
        }
        weeks
    }

    /// Display label like `29 Jul → 04 Aug`.
    pub fn label(&self) -> String {
        format!(
            "{} → {}",
            self.start().format("%d %b"),
            self.end().format("%d %b")
        )
    }
}

/// Day-of-week index within a collection week: Saturday → 1 … Friday → 7.
pub fn day_index(date: NaiveDate) -> u8 {
    ((date.weekday().num_days_from_monday() + 2) % 7 + 1) as u8
}
