use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;
use tally_core::Money;

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

// One to three leading digits, optional space- or dot-grouped thousands, a
// comma or dot decimal separator with optional spaces around it, two digits.
re!(re_price, r"\d{1,3}(?:[ .]\d{3})*\s*[.,]\s*\d{2}");
// OCR frequently drops the separator: "1 17" for 1.17.
re!(re_split_cents, r"(\d+)\s+(\d{2})");

/// Locale-tolerant recognition of monetary tokens on receipt lines.
pub struct AmountParser;

impl AmountParser {
    /// All price-shaped tokens in `text`, left to right.
    pub fn find_tokens(text: &str) -> impl Iterator<Item = &str> {
        re_price().find_iter(text).map(|m| m.as_str())
    }

    pub fn first_token(text: &str) -> Option<&str> {
        re_price().find(text).map(|m| m.as_str())
    }

    pub fn last_token(text: &str) -> Option<&str> {
        Self::find_tokens(text).last()
    }

    /// Normalize a matched token into an amount.
    ///
    /// Whitespace is removed. When a comma is present it is the decimal point
    /// and dots are thousands separators; otherwise the token is read as-is.
    /// Anything that does not end up with exactly two fractional digits is
    /// rejected.
    pub fn normalize(token: &str) -> Option<Money> {
        let compact: String = token.chars().filter(|c| !c.is_whitespace()).collect();
        let canonical = if compact.contains(',') {
            compact.replace('.', "").replace(',', ".")
        } else {
            compact
        };
        let value = Decimal::from_str(&canonical).ok()?;
        (value.scale() == 2).then(|| Money::from_decimal(value))
    }

    pub fn parse_first(text: &str) -> Option<Money> {
        Self::first_token(text).and_then(Self::normalize)
    }

    pub fn parse_last(text: &str) -> Option<Money> {
        Self::last_token(text).and_then(Self::normalize)
    }

    /// Read two adjacent digit groups as units and cents.
    pub fn split_cents(text: &str) -> Option<Money> {
        let c = re_split_cents().captures(text)?;
        let units = c.get(1)?.as_str();
        let cents = c.get(2)?.as_str();
        let value = Decimal::from_str(&format!("{units}.{cents}")).ok()?;
        Some(Money::from_decimal(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separators_normalize_to_same_value() {
        let expected = Some(Money::from_cents(123456));
        assert_eq!(AmountParser::normalize("1.234,56"), expected);
        assert_eq!(AmountParser::normalize("1234.56"), expected);
        assert_eq!(AmountParser::normalize("1 234,56"), expected);
        assert_eq!(AmountParser::normalize("1 234 . 56"), expected);
    }

    #[test]
    fn normalize_requires_two_fraction_digits() {
        assert_eq!(AmountParser::normalize("12,5"), None);
        assert_eq!(AmountParser::normalize("12"), None);
        assert_eq!(AmountParser::normalize("1,234"), None);
        assert_eq!(AmountParser::normalize("1.234.56"), None);
        assert_eq!(AmountParser::normalize(""), None);
    }

    #[test]
    fn find_tokens_in_order() {
        let tokens: Vec<&str> = AmountParser::find_tokens("MwSt 19% 3,50 Netto 18,40").collect();
        assert_eq!(tokens, vec!["3,50", "18,40"]);
    }

    #[test]
    fn percent_rate_is_not_a_token() {
        assert_eq!(AmountParser::first_token("19% ust"), None);
        assert_eq!(AmountParser::parse_first("mwst 19% 3,50"), Some(Money::from_cents(350)));
    }

    #[test]
    fn thousands_grouping_is_matched_whole() {
        assert_eq!(AmountParser::first_token("summe 1.234,56 eur"), Some("1.234,56"));
        assert_eq!(AmountParser::first_token("summe 12 345,00"), Some("12 345,00"));
        assert_eq!(AmountParser::parse_first("summe 12 345,00"), Some(Money::from_cents(1234500)));
    }

    #[test]
    fn spaced_separator_is_matched() {
        assert_eq!(AmountParser::parse_first("total 22 , 90"), Some(Money::from_cents(2290)));
    }

    #[test]
    fn last_token_picks_trailing_amount() {
        assert_eq!(AmountParser::parse_last("total 7,00 mwst 22,90"), Some(Money::from_cents(2290)));
        assert_eq!(AmountParser::parse_last("total"), None);
    }

    #[test]
    fn split_cents_reads_dropped_separator() {
        assert_eq!(AmountParser::split_cents("trinkgeld 1 17"), Some(Money::from_cents(117)));
        assert_eq!(AmountParser::split_cents("trinkgeld"), None);
    }

    #[test]
    fn no_panic_on_garbage_input() {
        let _ = AmountParser::parse_last("!@#$%^&*()\n\0\x01\x02");
        let _ = AmountParser::split_cents("\u{feff}9 99");
    }
}
