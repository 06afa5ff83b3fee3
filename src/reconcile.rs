//! Three-tier resolution of free-text promoter names to canonical codes.
//!
//! Independently maintained spreadsheets spell the same promoter in several
//! ways ("María López", "MARIA LOPEZ", "Maria Lopz"). Each tier is only
//! applied to rows the previous tier left unresolved:
//!
//! 1. exact match on the case-folded display name,
//! 2. match on the diacritic-stripped normalized name,
//! 3. fuzzy match over all normalized directory names, accepted only at or
//!    above [`SIMILARITY_CUTOFF`].
//!
//! Names that fail all three tiers stay unresolved and are surfaced in an
//! [`UnmatchedReport`]; the reconciler never guesses past the cutoff and
//! never invents a promoter.

use crate::directory::{PromoterCode, PromoterDirectory};
use crate::normalize::normalize_name;
use log::debug;
use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;

/// Minimum similarity ratio for the fuzzy tier. A candidate at exactly the
/// cutoff is accepted.
pub const SIMILARITY_CUTOFF: f64 = 0.8;

/// Which tier resolved a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchTier {
    Exact,
    Normalized,
    Fuzzy,
}

/// Outcome of resolving one raw name. `code` is `None` when all tiers
/// failed; the row is retained, never dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub raw_name: String,
    pub code: Option<PromoterCode>,
    pub tier: Option<MatchTier>,
    /// Similarity ratio of the accepted fuzzy candidate, when `tier` is
    /// [`MatchTier::Fuzzy`].
    pub similarity: Option<f64>,
}

impl Resolution {
    fn unmatched(raw_name: &str) -> Self {
        Resolution {
            raw_name: raw_name.to_string(),
            code: None,
            tier: None,
            similarity: None,
        }
    }
}

/// Names that failed every tier, for a human to fix in the source sheet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnmatchedReport {
    pub total_rows: usize,
    pub unmatched_rows: usize,
    /// Distinct raw names in first-seen order.
    pub distinct_names: Vec<String>,
}

impl UnmatchedReport {
    pub fn is_clean(&self) -> bool {
        self.unmatched_rows == 0
    }
}

pub struct Reconciler<'a> {
    directory: &'a PromoterDirectory,
}

impl<'a> Reconciler<'a> {
    pub fn new(directory: &'a PromoterDirectory) -> Self {
        Reconciler { directory }
    }

    /// Resolves one raw name through the tiers.
    pub fn resolve(&self, raw_name: &str) -> Resolution {
        let upper = raw_name.trim().to_uppercase();
        if let Some(code) = self.directory.code_by_upper(&upper) {
            return Resolution {
                raw_name: raw_name.to_string(),
                code: Some(code.clone()),
                tier: Some(MatchTier::Exact),
                similarity: None,
            };
        }

        let normalized = normalize_name(raw_name);
        if let Some(code) = self.directory.code_by_normalized(&normalized) {
            return Resolution {
                raw_name: raw_name.to_string(),
                code: Some(code.clone()),
                tier: Some(MatchTier::Normalized),
                similarity: None,
            };
        }

        if let Some((code, similarity)) = self.fuzzy_candidate(&normalized) {
            debug!(
                "fuzzy-matched '{}' to {} (similarity {:.3})",
                raw_name, code, similarity
            );
            return Resolution {
                raw_name: raw_name.to_string(),
                code: Some(code),
                tier: Some(MatchTier::Fuzzy),
                similarity: Some(similarity),
            };
        }

        Resolution::unmatched(raw_name)
    }

    /// Resolves a column of raw names and reports the ones no tier matched.
    pub fn resolve_all<S: AsRef<str>>(&self, names: &[S]) -> (Vec<Resolution>, UnmatchedReport) {
        let mut resolutions = Vec::with_capacity(names.len());
        let mut report = UnmatchedReport {
            total_rows: names.len(),
            ..UnmatchedReport::default()
        };

        for name in names {
            let resolution = self.resolve(name.as_ref());
            if resolution.code.is_none() {
                report.unmatched_rows += 1;
                let raw = resolution.raw_name.clone();
                if !report.distinct_names.contains(&raw) {
                    report.distinct_names.push(raw);
                }
            }
            resolutions.push(resolution);
        }

        (resolutions, report)
    }

    /// Best candidate at or above the cutoff. Candidates are scanned in
    /// roster order and replaced only on strictly greater similarity, so the
    /// first roster entry wins ties.
    fn fuzzy_candidate(&self, normalized: &str) -> Option<(PromoterCode, f64)> {
        let mut best: Option<(PromoterCode, f64)> = None;
        for record in self.directory.records() {
            let similarity = normalized_levenshtein(normalized, &record.normalized_name);
            match &best {
                Some((_, current)) if similarity <= *current => {}
                _ => best = Some((record.code.clone(), similarity)),
            }
        }
        best.filter(|(_, similarity)| *similarity >= SIMILARITY_CUTOFF)
    }
}
