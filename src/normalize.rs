//! Canonical form for free-text promoter names.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Uppercases, strips diacritics (NFKD decomposition, combining marks
/// removed) and collapses internal whitespace. Total: every input, including
/// the empty string, produces a value, and the function is idempotent.
pub fn normalize_name(raw: &str) -> String {
    let stripped: String = raw
        .trim()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect();

    stripped
        .to_uppercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_diacritics() {
        assert_eq!(normalize_name("José Pérez"), "JOSE PEREZ");
        assert_eq!(normalize_name("María López"), "MARIA LOPEZ");
        assert_eq!(normalize_name("João Silva"), "JOAO SILVA");
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(normalize_name("  María  López  "), "MARIA LOPEZ");
        assert_eq!(normalize_name("a\t b\n c"), "A B C");
    }

    #[test]
    fn test_total_on_empty() {
        assert_eq!(normalize_name(""), "");
        assert_eq!(normalize_name("   "), "");
    }

    #[test]
    fn test_idempotent() {
        for s in ["José Pérez", "  María  López  ", "", "P1", "ÄÖÜ ß"] {
            let once = normalize_name(s);
            assert_eq!(normalize_name(&once), once);
        }
    }
}
