use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A monetary amount held as integer cents.
///
/// Every value that enters the ledger is rounded to two decimal places
/// (half away from zero) exactly once, at construction. Sums of `Money` are
/// integer additions, so repeated deposits never drift.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("amount is empty")]
    Empty,
    #[error("amount `{0}` is not a number")]
    NotANumber(String),
    #[error("amount `{0}` is out of range")]
    OutOfRange(String),
}

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Round to cents, half away from zero.
    pub fn from_decimal(value: Decimal) -> Option<Self> {
        let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        rounded.checked_mul(Decimal::ONE_HUNDRED)?.to_i64().map(Money)
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    /// Parse a user-facing amount such as `100`, `"12.345"` or `"$4.50"`.
    pub fn parse(raw: &str) -> Result<Self, MoneyError> {
        let trimmed = raw.trim();
        let trimmed = trimmed.strip_prefix('$').unwrap_or(trimmed).trim();
        if trimmed.is_empty() {
            return Err(MoneyError::Empty);
        }

        let value = Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map_err(|_| MoneyError::NotANumber(raw.to_string()))?;

        Money::from_decimal(value).ok_or_else(|| MoneyError::OutOfRange(raw.to_string()))
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Multiply by a rate and round back to cents.
    pub fn scale(self, rate: Decimal) -> Option<Money> {
        self.to_decimal()
            .checked_mul(rate)
            .and_then(Money::from_decimal)
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::parse(s)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MoneyRepr {
    Text(String),
    Number(serde_json::Number),
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = match MoneyRepr::deserialize(deserializer)? {
            MoneyRepr::Text(s) => s,
            MoneyRepr::Number(n) => n.to_string(),
        };
        Money::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn parses_plain_and_dollar_amounts() {
        assert_eq!(Money::parse("100").unwrap(), Money::from_cents(10_000));
        assert_eq!(Money::parse("$4.50").unwrap(), Money::from_cents(450));
        assert_eq!(Money::parse(" 0.1 ").unwrap(), Money::from_cents(10));
        assert_eq!(Money::parse("1e2").unwrap(), Money::from_cents(10_000));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(Money::parse("  "), Err(MoneyError::Empty));
        assert_eq!(Money::parse("$"), Err(MoneyError::Empty));
        assert!(matches!(Money::parse("abc"), Err(MoneyError::NotANumber(_))));
        assert!(matches!(Money::parse("NaN"), Err(MoneyError::NotANumber(_))));
    }

    #[test]
    fn huge_amounts_are_out_of_range() {
        // Fits in a Decimal, but not once scaled to cents.
        assert!(matches!(Money::parse("1e27"), Err(MoneyError::OutOfRange(_))));
        assert!(matches!(Money::parse("79228162514264337593543950335"), Err(MoneyError::OutOfRange(_))));
        // Fits in cents as a Decimal, but not in an i64.
        assert!(matches!(Money::parse("1e18"), Err(MoneyError::OutOfRange(_))));
        assert_eq!(Money::from_decimal(Decimal::MAX), None);
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(Money::from_decimal(dec("2.345")), Some(Money::from_cents(235)));
        assert_eq!(Money::from_decimal(dec("2.344")), Some(Money::from_cents(234)));
        assert_eq!(Money::from_decimal(dec("-2.345")), Some(Money::from_cents(-235)));
        assert_eq!(Money::from_decimal(dec("0.005")), Some(Money::from_cents(1)));
    }

    #[test]
    fn repeated_cent_additions_do_not_drift() {
        // 0.1 + 0.2 style drift is the classic failure of float ledgers.
        let mut total = Money::ZERO;
        for _ in 0..1_000 {
            total = total.checked_add(Money::parse("0.10").unwrap()).unwrap();
        }
        assert_eq!(total, Money::parse("100.00").unwrap());

        let sum = Money::parse("0.1").unwrap().checked_add(Money::parse("0.2").unwrap());
        assert_eq!(sum, Some(Money::parse("0.3").unwrap()));
    }

    #[test]
    fn scales_by_rate_with_rounding() {
        let paid = Money::parse("100.00").unwrap();
        assert_eq!(paid.scale(dec("0.08")), Some(Money::from_cents(800)));
        assert_eq!(paid.scale(dec("0.06")), Some(Money::from_cents(600)));

        // 12.35 * 0.06 = 0.741
        let odd = Money::parse("12.35").unwrap();
        assert_eq!(odd.scale(dec("0.06")), Some(Money::from_cents(74)));
        // 0.25 * 0.1 = 0.025 -> 0.03
        assert_eq!(Money::from_cents(25).scale(dec("0.1")), Some(Money::from_cents(3)));
    }

    #[test]
    fn displays_two_decimals() {
        assert_eq!(Money::from_cents(123_450).to_string(), "1234.50");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-5).to_string(), "-0.05");
        assert_eq!(Money::ZERO.to_string(), "0.00");
    }

    #[test]
    fn serde_accepts_numbers_and_strings() {
        let from_number: Money = serde_json::from_str("30.8").unwrap();
        let from_string: Money = serde_json::from_str("\"$30.80\"").unwrap();
        assert_eq!(from_number, Money::from_cents(3080));
        assert_eq!(from_string, Money::from_cents(3080));
        assert_eq!(serde_json::to_string(&from_number).unwrap(), "\"30.80\"");
    }
}
