//! Integer money in minor currency units.
//!
//! All balances, bids and prices are whole cents. Conversions from floating
//! point (discounted bids, scaled spends) go through [`Cents::from_f64_rounded`]
//! so there is a single rounding rule in the crate: nearest, half away from
//! zero.

use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Cents(pub i64);

impl Cents {
    pub const ZERO: Cents = Cents(0);

    pub const fn new(cents: i64) -> Self {
        Cents(cents)
    }

    /// Whole currency units, e.g. `Cents::dollars(5) == Cents(500)`.
    pub const fn dollars(units: i64) -> Self {
        Cents(units * 100)
    }

    pub const fn get(self) -> i64 {
        self.0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, rhs: Cents) -> Option<Cents> {
        self.0.checked_add(rhs.0).map(Cents)
    }

    pub fn checked_sub(self, rhs: Cents) -> Option<Cents> {
        self.0.checked_sub(rhs.0).map(Cents)
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64
    }

    /// Round a cent amount computed in floating point. Saturates at the i64
    /// bounds; NaN maps to zero.
    pub fn from_f64_rounded(value: f64) -> Self {
        // `as` saturates and maps NaN to 0.
        Cents(value.round() as i64)
    }
}

impl Add for Cents {
    type Output = Cents;
    fn add(self, rhs: Cents) -> Cents {
        Cents(self.0 + rhs.0)
    }
}

impl AddAssign for Cents {
    fn add_assign(&mut self, rhs: Cents) {
        self.0 += rhs.0;
    }
}

impl Sub for Cents {
    type Output = Cents;
    fn sub(self, rhs: Cents) -> Cents {
        Cents(self.0 - rhs.0)
    }
}

impl SubAssign for Cents {
    fn sub_assign(&mut self, rhs: Cents) {
        self.0 -= rhs.0;
    }
}

impl Neg for Cents {
    type Output = Cents;
    fn neg(self) -> Cents {
        Cents(-self.0)
    }
}

impl From<i64> for Cents {
    fn from(value: i64) -> Self {
        Cents(value)
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = group_thousands(abs / 100);
        match abs % 100 {
            0 => write!(f, "{sign}${whole}"),
            frac => write!(f, "{sign}${whole}.{frac:02}"),
        }
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseCentsError {
    #[error("empty amount")]
    Empty,
    #[error("invalid amount `{0}`")]
    Invalid(String),
    #[error("amount `{0}` has more than two decimal places")]
    TooPrecise(String),
    #[error("amount `{0}` is out of range")]
    Overflow(String),
}

impl FromStr for Cents {
    type Err = ParseCentsError;

    /// Accepts `12`, `12.5`, `12.34`, `$3`, `-$0.05`, `1,234.56`. Parsing is
    /// exact decimal arithmetic; no floats are involved.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ParseCentsError::Empty);
        }
        let invalid = || ParseCentsError::Invalid(trimmed.to_string());

        let (negative, rest) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let rest = rest.strip_prefix('$').unwrap_or(rest);

        let (whole, frac) = match rest.split_once('.') {
            Some((whole, frac)) => (whole, Some(frac)),
            None => (rest, None),
        };
        let whole: String = whole.chars().filter(|c| *c != ',').collect();
        if whole.is_empty() && frac.is_none_or(str::is_empty) {
            return Err(invalid());
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let units: i64 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| ParseCentsError::Overflow(trimmed.to_string()))?
        };

        let cents: i64 = match frac {
            None | Some("") => 0,
            Some(frac) if !frac.chars().all(|c| c.is_ascii_digit()) => return Err(invalid()),
            Some(frac) if frac.len() > 2 => {
                return Err(ParseCentsError::TooPrecise(trimmed.to_string()));
            }
            Some(frac) if frac.len() == 1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
            Some(frac) => frac.parse::<i64>().map_err(|_| invalid())?,
        };

        let total = units
            .checked_mul(100)
            .and_then(|v| v.checked_add(cents))
            .ok_or_else(|| ParseCentsError::Overflow(trimmed.to_string()))?;
        Ok(Cents(if negative { -total } else { total }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_whole_and_fractional() {
        assert_eq!(Cents(500).to_string(), "$5");
        assert_eq!(Cents(123_456).to_string(), "$1,234.56");
        assert_eq!(Cents(-5).to_string(), "-$0.05");
        assert_eq!(Cents(0).to_string(), "$0");
        assert_eq!(Cents(100_000_000).to_string(), "$1,000,000");
    }

    #[test]
    fn parse_accepts_common_forms() {
        assert_eq!("12".parse::<Cents>().unwrap(), Cents(1200));
        assert_eq!("12.5".parse::<Cents>().unwrap(), Cents(1250));
        assert_eq!("12.34".parse::<Cents>().unwrap(), Cents(1234));
        assert_eq!("$3".parse::<Cents>().unwrap(), Cents(300));
        assert_eq!("-$0.05".parse::<Cents>().unwrap(), Cents(-5));
        assert_eq!("1,234.56".parse::<Cents>().unwrap(), Cents(123_456));
        assert_eq!(".5".parse::<Cents>().unwrap(), Cents(50));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!("".parse::<Cents>(), Err(ParseCentsError::Empty));
        assert!(matches!(
            "abc".parse::<Cents>(),
            Err(ParseCentsError::Invalid(_))
        ));
        assert!(matches!(
            "1.234".parse::<Cents>(),
            Err(ParseCentsError::TooPrecise(_))
        ));
        assert!(matches!("$".parse::<Cents>(), Err(ParseCentsError::Invalid(_))));
        assert!(matches!(
            "99999999999999999999".parse::<Cents>(),
            Err(ParseCentsError::Overflow(_))
        ));
    }

    #[test]
    fn display_round_trips_through_parse() {
        for value in [0, 1, 99, 100, 123_456, -250] {
            let cents = Cents(value);
            assert_eq!(cents.to_string().parse::<Cents>().unwrap(), cents);
        }
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(Cents::from_f64_rounded(100.5), Cents(101));
        assert_eq!(Cents::from_f64_rounded(-100.5), Cents(-101));
        assert_eq!(Cents::from_f64_rounded(100.49), Cents(100));
        assert_eq!(Cents::from_f64_rounded(f64::NAN), Cents(0));
    }
}
