//! Pure, stateless decimal helpers shared by every mutation path.
//! Generalizes `LedgerEntry::round_to_precision`/`validate_precision` from the
//! teacher's fixed per-asset table to an explicit `precision` parameter and a
//! configurable rounding mode (spec section 4.1).

use rust_decimal::Decimal;

use crate::config::RoundingMode;

/// Clamp a requested currency precision into the supported range.
pub fn clamp_precision(precision: i16) -> i16 {
    precision.clamp(0, 8)
}

/// Scale `value` to exactly `precision` fractional digits using `mode`.
pub fn scale(value: Decimal, precision: i16, mode: RoundingMode) -> Decimal {
    value.round_dp_with_strategy(precision as u32, mode.as_strategy())
}

/// Thousands-separated decimal string, e.g. `1234.50` -> `1,234.50`.
pub fn format(value: Decimal, precision: i16) -> String {
    let scaled = value.round_dp(precision as u32);
    let negative = scaled.is_sign_negative();
    let abs = scaled.abs();
    let s = format!("{:.*}", precision.max(0) as usize, abs);
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (s.as_str(), None),
    };

    let mut grouped = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let grouped: String = grouped.chars().rev().collect();

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(f) = frac_part {
        out.push('.');
        out.push_str(f);
    }
    out
}

/// `format` prefixed with a currency symbol.
pub fn format_with_symbol(value: Decimal, precision: i16, symbol: &str) -> String {
    format!("{}{}", symbol, format(value, precision))
}

pub fn is_positive(value: Decimal) -> bool {
    value > Decimal::ZERO
}

pub fn is_non_negative(value: Decimal) -> bool {
    value >= Decimal::ZERO
}

/// Parse a user-supplied amount string. Returns `None` on anything unparseable,
/// matching spec's "failure marker" wording for `parseAmount`.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    text.trim().parse::<Decimal>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn scale_truncates_toward_zero_by_default() {
        assert_eq!(scale(dec!(1.999), 2, RoundingMode::Down), dec!(1.99));
        assert_eq!(scale(dec!(-1.999), 2, RoundingMode::Down), dec!(-1.99));
    }

    #[test]
    fn scale_half_up_rounds_away_from_zero_at_midpoint() {
        assert_eq!(scale(dec!(1.005), 2, RoundingMode::HalfUp), dec!(1.01));
    }

    #[test]
    fn format_inserts_thousands_separators() {
        assert_eq!(format(dec!(1234567.5), 2), "1,234,567.50");
        assert_eq!(format(dec!(-1234.5), 1), "-1,234.5");
        assert_eq!(format(dec!(7), 0), "7");
    }

    #[test]
    fn format_with_symbol_prepends_symbol() {
        assert_eq!(format_with_symbol(dec!(100), 2, "¤"), "¤100.00");
    }

    #[test]
    fn is_positive_and_non_negative() {
        assert!(is_positive(dec!(0.01)));
        assert!(!is_positive(dec!(0)));
        assert!(is_non_negative(dec!(0)));
        assert!(!is_non_negative(dec!(-0.01)));
    }

    #[test]
    fn parse_amount_rejects_garbage() {
        assert_eq!(parse_amount("12.34"), Some(dec!(12.34)));
        assert_eq!(parse_amount("not a number"), None);
    }

    #[test]
    fn clamp_precision_bounds_to_zero_eight() {
        assert_eq!(clamp_precision(-3), 0);
        assert_eq!(clamp_precision(20), 8);
        assert_eq!(clamp_precision(4), 4);
    }
}
