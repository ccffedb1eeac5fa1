use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Fiat amount in minor units (cents). All accounting is done in integer
/// cents; decimal strings only exist at the API boundary.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Money(i64);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyParseError {
    #[error("not a decimal amount: {0}")]
    Malformed(String),
    #[error("more than 2 decimal places: {0}")]
    TooPrecise(String),
    #[error("amount out of range: {0}")]
    OutOfRange(String),
}

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Whole currency units, e.g. `Money::from_major(10_000)` is $10,000.00.
    pub fn from_major(major: i64) -> Self {
        Money(major * 100)
    }

    pub fn minor(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Multiply by a rate, rounding half-up at minor-unit precision.
    pub fn mul_rate_half_up(self, rate: Rate) -> Money {
        let numer = self.0 as i128 * rate.basis_points() as i128;
        Money(div_half_up(numer, 10_000) as i64)
    }

    /// Multiply by a rate, rounding down. Used for settlement shares where
    /// the residual cent is assigned elsewhere.
    pub fn mul_rate_floor(self, rate: Rate) -> Money {
        let numer = self.0 as i128 * rate.basis_points() as i128;
        Money((numer / 10_000) as i64)
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }
}

/// Round-half-up division for non-negative numerators.
fn div_half_up(numer: i128, denom: i128) -> i128 {
    (numer * 2 + denom) / (denom * 2)
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, (self.0 % 100).abs())
    }
}

impl FromStr for Money {
    type Err = MoneyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (whole, frac) = match trimmed.split_once('.') {
            Some((w, f)) => (w, f),
            None => (trimmed, ""),
        };
        if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
            return Err(MoneyParseError::Malformed(s.to_string()));
        }
        if frac.len() > 2 || !frac.chars().all(|c| c.is_ascii_digit()) {
            if frac.len() > 2 && frac.chars().all(|c| c.is_ascii_digit()) {
                return Err(MoneyParseError::TooPrecise(s.to_string()));
            }
            return Err(MoneyParseError::Malformed(s.to_string()));
        }
        let major: i64 = whole
            .parse()
            .map_err(|_| MoneyParseError::OutOfRange(s.to_string()))?;
        let cents: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().unwrap_or(0) * 10,
            _ => frac.parse::<i64>().unwrap_or(0),
        };
        major
            .checked_mul(100)
            .and_then(|m| m.checked_add(cents))
            .map(Money)
            .ok_or_else(|| MoneyParseError::OutOfRange(s.to_string()))
    }
}

/// Percentage expressed in basis points (1% = 100 bps). Rates are exact
/// integers so fee math never accumulates float error.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Rate(u32);

impl Rate {
    pub const fn from_basis_points(bps: u32) -> Self {
        Rate(bps)
    }

    /// Construct from a percent value, e.g. `from_percent(80.0)` for 80%.
    /// Resolution is 0.01% (one basis point); finer fractions are rejected.
    pub fn from_percent(pct: f64) -> Option<Self> {
        if !pct.is_finite() || pct < 0.0 || pct > 10_000.0 {
            return None;
        }
        let scaled = pct * 100.0;
        let bps = scaled.round();
        if (scaled - bps).abs() > 1e-6 {
            return None;
        }
        Some(Rate(bps as u32))
    }

    pub fn basis_points(self) -> u32 {
        self.0
    }

    pub fn as_percent(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % 100 == 0 {
            write!(f, "{}%", self.0 / 100)
        } else {
            write!(f, "{:.2}%", self.as_percent())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_strings() {
        assert_eq!("10000.00".parse::<Money>(), Ok(Money::from_minor(1_000_000)));
        assert_eq!("0.5".parse::<Money>(), Ok(Money::from_minor(50)));
        assert_eq!("7".parse::<Money>(), Ok(Money::from_minor(700)));
    }

    #[test]
    fn rejects_bad_decimal_strings() {
        assert_eq!(
            "1.005".parse::<Money>(),
            Err(MoneyParseError::TooPrecise("1.005".to_string()))
        );
        assert!(matches!(
            "abc".parse::<Money>(),
            Err(MoneyParseError::Malformed(_))
        ));
        assert!(matches!(
            "-5".parse::<Money>(),
            Err(MoneyParseError::Malformed(_))
        ));
    }

    #[test]
    fn displays_with_two_decimals() {
        assert_eq!(Money::from_minor(1_000_000).to_string(), "10000.00");
        assert_eq!(Money::from_minor(205).to_string(), "2.05");
    }

    #[test]
    fn rate_multiplication_rounds_half_up() {
        // 0.125 * 50% = 0.0625 -> rounds up to 0.07
        let m = Money::from_minor(13).mul_rate_half_up(Rate::from_basis_points(5_000));
        assert_eq!(m, Money::from_minor(7)); // 6.5 -> 7

        let m = Money::from_major(10_000).mul_rate_half_up(Rate::from_basis_points(8_000));
        assert_eq!(m, Money::from_major(8_000));
    }

    #[test]
    fn rate_from_percent_validates_resolution() {
        assert_eq!(Rate::from_percent(80.0), Some(Rate::from_basis_points(8_000)));
        assert_eq!(Rate::from_percent(3.25), Some(Rate::from_basis_points(325)));
        assert_eq!(Rate::from_percent(0.001), None);
        assert_eq!(Rate::from_percent(-1.0), None);
        assert_eq!(Rate::from_percent(f64::NAN), None);
    }
}
