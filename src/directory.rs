//! Canonical promoter registry built once per session from the roster source.

use crate::normalize::normalize_name;
use log::warn;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Typed promoter identifier. The numeric ordinal (`P12` → 12) is extracted
/// once at construction so display sorts never re-parse the string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PromoterCode {
    code: String,
    ordinal: Option<u32>,
}

impl PromoterCode {
    pub fn new(raw: &str) -> Self {
        let code = raw.trim().to_uppercase();
        let digits: String = code.chars().filter(|c| c.is_ascii_digit()).collect();
        let ordinal = digits.parse::<u32>().ok();
        PromoterCode { code, ordinal }
    }

    pub fn as_str(&self) -> &str {
        &self.code
    }

    pub fn ordinal(&self) -> Option<u32> {
        self.ordinal
    }
}

impl Ord for PromoterCode {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.ordinal, other.ordinal) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.code.cmp(&other.code)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.code.cmp(&other.code),
        }
    }
}

impl PartialOrd for PromoterCode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for PromoterCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.code)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoterRecord {
    pub code: PromoterCode,
    pub display_name: String,
    /// Always `normalize_name(display_name)`.
    pub normalized_name: String,
    pub tenure_months: Option<f64>,
}

/// One row of the roster's "Control" sheet, before directory construction.
#[derive(Debug, Clone)]
pub struct RosterRow {
    pub code: String,
    pub name: String,
    pub tenure_months: Option<f64>,
}

/// Immutable promoter table with lookup maps for the reconciliation tiers.
/// Records keep roster order, which is also the fuzzy-match tie-break order.
#[derive(Debug, Clone, Default)]
pub struct PromoterDirectory {
    records: Vec<PromoterRecord>,
    by_upper: HashMap<String, PromoterCode>,
    by_normalized: HashMap<String, PromoterCode>,
}

impl PromoterDirectory {
    pub fn from_roster(rows: impl IntoIterator<Item = RosterRow>) -> Self {
        let mut records: Vec<PromoterRecord> = Vec::new();

        for row in rows {
            let code = PromoterCode::new(&row.code);
            let display_name = row.name.trim().to_string();
            let record = PromoterRecord {
                normalized_name: normalize_name(&display_name),
                code: code.clone(),
                display_name,
                tenure_months: row.tenure_months,
            };

            if let Some(existing) = records.iter_mut().find(|r| r.code == code) {
                warn!(
                    "duplicate promoter code {} in roster, keeping last occurrence",
                    code
                );
                *existing = record;
            } else {
                records.push(record);
            }
        }

        let mut by_upper = HashMap::new();
        let mut by_normalized = HashMap::new();
        for record in &records {
            by_upper.insert(record.display_name.to_uppercase(), record.code.clone());
            by_normalized.insert(record.normalized_name.clone(), record.code.clone());
        }

        PromoterDirectory {
            records,
            by_upper,
            by_normalized,
        }
    }

    /// Exact lookup by case-folded (not accent-folded) display name.
    pub fn code_by_upper(&self, upper_name: &str) -> Option<&PromoterCode> {
        self.by_upper.get(upper_name)
    }

    pub fn code_by_normalized(&self, normalized: &str) -> Option<&PromoterCode> {
        self.by_normalized.get(normalized)
    }

    /// Records in roster order.
    pub fn records(&self) -> &[PromoterRecord] {
        &self.records
    }

    pub fn get(&self, code: &PromoterCode) -> Option<&PromoterRecord> {
        self.records.iter().find(|r| &r.code == code)
    }

    pub fn display_name(&self, code: &PromoterCode) -> Option<&str> {
        self.get(code).map(|r| r.display_name.as_str())
    }

    /// All codes sorted by their numeric ordinal.
    pub fn codes_sorted(&self) -> Vec<PromoterCode> {
        let mut codes: Vec<PromoterCode> = self.records.iter().map(|r| r.code.clone()).collect();
        codes.sort();
        codes
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(code: &str, name: &str) -> RosterRow {
        RosterRow {
            code: code.to_string(),
            name: name.to_string(),
            tenure_months: None,
        }
    }

    #[test]
    fn test_code_ordinal_extraction() {
        assert_eq!(PromoterCode::new(" p12 ").as_str(), "P12");
        assert_eq!(PromoterCode::new("P12").ordinal(), Some(12));
        assert_eq!(PromoterCode::new("XX").ordinal(), None);
    }

    #[test]
    fn test_natural_sort_by_ordinal() {
        let mut codes = vec![
            PromoterCode::new("P10"),
            PromoterCode::new("P2"),
            PromoterCode::new("P1"),
        ];
        codes.sort();
        let order: Vec<&str> = codes.iter().map(|c| c.as_str()).collect();
        assert_eq!(order, vec!["P1", "P2", "P10"]);
    }

    #[test]
    fn test_normalized_name_derived_from_display() {
        let dir = PromoterDirectory::from_roster(vec![row("P1", "  María López ")]);
        let record = &dir.records()[0];
        assert_eq!(record.display_name, "María López");
        assert_eq!(record.normalized_name, "MARIA LOPEZ");
    }

    #[test]
    fn test_lookup_tiers_differ_on_accents() {
        let dir = PromoterDirectory::from_roster(vec![row("P1", "María López")]);
        // Exact tier is case-normalized only; the accented form is required.
        assert!(dir.code_by_upper("MARÍA LÓPEZ").is_some());
        assert!(dir.code_by_upper("MARIA LOPEZ").is_none());
        assert!(dir.code_by_normalized("MARIA LOPEZ").is_some());
    }

    #[test]
    fn test_duplicate_code_last_one_wins() {
        let dir = PromoterDirectory::from_roster(vec![row("P1", "First Name"), row("P1", "Second Name")]);
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.records()[0].display_name, "Second Name");
    }
}
