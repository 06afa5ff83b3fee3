//! Parsing of locale-ambiguous amount strings and money formatting.
//!
//! Source spreadsheets mix US (`1,234.56`) and European (`1.234,56`) number
//! layouts, sometimes within the same column. When both separators appear,
//! whichever occurs last is the decimal point and the other is stripped as a
//! thousands separator. A lone comma followed by one or two digits is a
//! decimal comma (`"99,99"`); any other comma-only string has its commas
//! stripped, so a bare `"1,234"` parses as `1234`; tested behavior, not a
//! guarantee for every locale.

/// Parses an amount string to a float, or `None` if the remainder is not
/// numeric. `None` is the null-marker callers filter on; this never panics.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    let cleaned = match (s.rfind(','), s.rfind('.')) {
        (Some(comma), Some(point)) if comma > point => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (Some(comma), None) if is_decimal_comma(s, comma) => s.replacen(',', ".", 1),
        _ => s.replace(',', ""),
    };

    cleaned.parse::<f64>().ok()
}

// A single comma with one or two trailing digits reads as a decimal comma;
// three trailing digits is indistinguishable from a thousands group and
// falls through to the strip-commas branch.
fn is_decimal_comma(s: &str, comma: usize) -> bool {
    let trailing = s.len() - comma - 1;
    s.matches(',').count() == 1 && (1..=2).contains(&trailing)
}

/// `$1,234.56`-style money formatting, matching the dashboard's display
/// convention. Negative amounts render as `-$1,234.56`.
pub fn format_money(amount: f64) -> String {
    let negative = amount < 0.0;
    let abs = amount.abs();
    let whole = abs.trunc() as u64;
    let cents = ((abs - abs.trunc()) * 100.0).round() as u64;

    // Carry from rounding, e.g. 1.999 -> 2.00.
    let (whole, cents) = if cents >= 100 {
        (whole + 1, 0)
    } else {
        (whole, cents)
    };

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    if negative {
        format!("-${}.{:02}", grouped, cents)
    } else {
        format!("${}.{:02}", grouped, cents)
    }
}
