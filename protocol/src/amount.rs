//! Monetary amounts in zatoshis.
//!
//! Everything consensus-related is an integer count of the smallest unit.
//! Decimal strings (`"6.25"`) exist only at the edges: RPC parameters and
//! inspection views. No floating point is used for arithmetic; the only
//! `f64` produced here is for JSON rendering.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::{COIN, COIN_DECIMALS, MAX_MONEY};

/// Errors produced when parsing or range-checking an [`Amount`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("invalid amount: {input:?}")]
    Malformed { input: String },

    #[error("amount {input:?} has more than {COIN_DECIMALS} decimal places")]
    TooPrecise { input: String },

    #[error("amount out of range")]
    OutOfRange,

    #[error("amount must not be negative")]
    Negative,
}

/// A non-negative number of zatoshis (`1 coin = 100_000_000 zatoshis`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Wraps a raw zatoshi count without a money-range check.
    ///
    /// Values decoded from the wire are range-checked by the structural
    /// transaction rules, not here.
    pub const fn from_zat(value: u64) -> Self {
        Amount(value)
    }

    /// Wraps a raw zatoshi count, rejecting anything above `MAX_MONEY`.
    pub fn checked_from_zat(value: u64) -> Result<Self, AmountError> {
        if value > MAX_MONEY {
            return Err(AmountError::OutOfRange);
        }
        Ok(Amount(value))
    }

    /// Whole coins to zatoshis.
    pub const fn from_coins(coins: u64) -> Self {
        Amount(coins * COIN)
    }

    /// The raw zatoshi count.
    pub const fn zat(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `true` if the value lies within `0..=MAX_MONEY`.
    pub const fn is_money_range(self) -> bool {
        self.0 <= MAX_MONEY
    }

    /// Addition that fails outside the money range.
    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0
            .checked_add(rhs.0)
            .filter(|v| *v <= MAX_MONEY)
            .map(Amount)
    }

    /// Subtraction that fails below zero.
    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    /// Right shift of the raw value, used by the halving schedule.
    pub fn halved(self, times: u64) -> Amount {
        if times >= 64 {
            Amount::ZERO
        } else {
            Amount(self.0 >> times)
        }
    }

    /// Checked sum of an iterator of amounts; `None` on leaving the money range.
    pub fn sum<I: IntoIterator<Item = Amount>>(iter: I) -> Option<Amount> {
        iter.into_iter()
            .try_fold(Amount::ZERO, |acc, value| acc.checked_add(value))
    }

    /// Value in coins as a float, for JSON views only.
    pub fn to_coins_f64(self) -> f64 {
        self.0 as f64 / COIN as f64
    }

    /// Parse a JSON number or numeric string as a coin amount.
    ///
    /// Goes through the number's decimal text so `1.11` becomes exactly
    /// `111_000_000` zatoshis and `1e-8` becomes one zatoshi.
    pub fn from_json(value: &serde_json::Value) -> Result<Amount, AmountError> {
        match value {
            serde_json::Value::Number(n) => n.to_string().parse(),
            serde_json::Value::String(s) => s.parse(),
            other => Err(AmountError::Malformed {
                input: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Amount {
    /// Fixed eight-decimal rendering, e.g. `6.25000000`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / COIN;
        let frac = self.0 % COIN;
        write!(
            f,
            "{}.{:0>width$}",
            whole,
            frac,
            width = COIN_DECIMALS as usize
        )
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let s = input.trim();
        if s.starts_with('-') {
            return Err(AmountError::Negative);
        }
        let malformed = || AmountError::Malformed {
            input: input.to_string(),
        };

        // JSON serializers emit small and large numbers as `1e-8`.
        let (mantissa, exponent) = match s.split_once(|c: char| c == 'e' || c == 'E') {
            Some((m, e)) => (m, e.parse::<i32>().map_err(|_| malformed())?),
            None => (s, 0),
        };
        let (whole, frac) = match mantissa.split_once('.') {
            Some((w, f)) => (w, f),
            None => (mantissa, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(malformed());
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(malformed());
        }
        if whole.chars().chain(frac.chars()).all(|c| c == '0') {
            return Ok(Amount::ZERO);
        }
        if exponent > MAX_EXPONENT {
            return Err(AmountError::OutOfRange);
        }
        if exponent < -MAX_EXPONENT {
            return Err(AmountError::TooPrecise {
                input: input.to_string(),
            });
        }
        let (whole, frac) = shift_point(whole, frac, exponent);

        let frac = frac.trim_end_matches('0');
        if frac.len() > COIN_DECIMALS as usize {
            return Err(AmountError::TooPrecise {
                input: input.to_string(),
            });
        }

        let whole_value: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| AmountError::OutOfRange)?
        };
        let frac_value: u64 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{:0<width$}", frac, width = COIN_DECIMALS as usize);
            padded.parse().map_err(|_| malformed())?
        };

        let zat = whole_value
            .checked_mul(COIN)
            .and_then(|v| v.checked_add(frac_value))
            .ok_or(AmountError::OutOfRange)?;
        Amount::checked_from_zat(zat)
    }
}

/// Larger exponents are rejected without expanding the digits.
const MAX_EXPONENT: i32 = 32;

/// Move the decimal point of `whole.frac` by `exponent` places.
fn shift_point(whole: &str, frac: &str, exponent: i32) -> (String, String) {
    if exponent == 0 {
        return (whole.to_string(), frac.to_string());
    }
    let digits = format!("{whole}{frac}");
    let point = whole.len() as i64 + i64::from(exponent);
    if point <= 0 {
        let zeros = "0".repeat(point.unsigned_abs() as usize);
        (String::new(), format!("{zeros}{digits}"))
    } else if point as usize >= digits.len() {
        let zeros = "0".repeat(point as usize - digits.len());
        (format!("{digits}{zeros}"), String::new())
    } else {
        let (w, f) = digits.split_at(point as usize);
        (w.to_string(), f.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_strings() {
        assert_eq!("6.25".parse::<Amount>().unwrap().zat(), 625_000_000);
        assert_eq!("1.11".parse::<Amount>().unwrap().zat(), 111_000_000);
        assert_eq!("0.0001".parse::<Amount>().unwrap().zat(), 10_000);
        assert_eq!("3".parse::<Amount>().unwrap(), Amount::from_coins(3));
        assert_eq!(".5".parse::<Amount>().unwrap().zat(), 50_000_000);
        assert_eq!("1.50000000000".parse::<Amount>().unwrap().zat(), 150_000_000);
    }

    #[test]
    fn rejects_bad_strings() {
        assert_eq!("-1".parse::<Amount>(), Err(AmountError::Negative));
        assert!(matches!(
            "1.000000001".parse::<Amount>(),
            Err(AmountError::TooPrecise { .. })
        ));
        assert!(matches!(
            "1,5".parse::<Amount>(),
            Err(AmountError::Malformed { .. })
        ));
        assert!(matches!(".".parse::<Amount>(), Err(AmountError::Malformed { .. })));
        assert_eq!("21000001".parse::<Amount>(), Err(AmountError::OutOfRange));
    }

    #[test]
    fn display_uses_eight_decimals() {
        assert_eq!(Amount::from_zat(625_000_000).to_string(), "6.25000000");
        assert_eq!(Amount::from_zat(1).to_string(), "0.00000001");
    }

    #[test]
    fn json_numbers_parse_exactly() {
        let v: serde_json::Value = serde_json::from_str("1.23").unwrap();
        assert_eq!(Amount::from_json(&v).unwrap().zat(), 123_000_000);
        let s = serde_json::json!("1.11");
        assert_eq!(Amount::from_json(&s).unwrap().zat(), 111_000_000);
        assert!(Amount::from_json(&serde_json::json!(null)).is_err());
    }

    #[test]
    fn json_numbers_in_exponent_form() {
        // serde_json renders these as `1e-8` and `1e-6`.
        assert_eq!(Amount::from_json(&serde_json::json!(0.00000001)).unwrap().zat(), 1);
        assert_eq!(Amount::from_json(&serde_json::json!(0.000001)).unwrap().zat(), 100);
        assert_eq!(Amount::from_json(&serde_json::json!(1e21)), Err(AmountError::OutOfRange));
        assert!(matches!(
            Amount::from_json(&serde_json::json!(1e-9)),
            Err(AmountError::TooPrecise { .. })
        ));

        assert_eq!("1.5e-7".parse::<Amount>().unwrap().zat(), 15);
        assert_eq!("2.5E+1".parse::<Amount>().unwrap(), Amount::from_coins(25));
        assert_eq!("0e400".parse::<Amount>().unwrap(), Amount::ZERO);
        assert_eq!("1e99".parse::<Amount>(), Err(AmountError::OutOfRange));
        assert!(matches!("1e".parse::<Amount>(), Err(AmountError::Malformed { .. })));
        assert!(matches!("e5".parse::<Amount>(), Err(AmountError::Malformed { .. })));
    }

    #[test]
    fn checked_arithmetic_respects_money_range() {
        let max = Amount::from_zat(MAX_MONEY);
        assert!(max.checked_add(Amount::from_zat(1)).is_none());
        assert!(Amount::ZERO.checked_sub(Amount::from_zat(1)).is_none());
        assert_eq!(
            Amount::sum([Amount::from_zat(2), Amount::from_zat(3)]),
            Some(Amount::from_zat(5))
        );
        assert_eq!(Amount::sum([max, Amount::from_zat(1)]), None);
    }

    #[test]
    fn halving_saturates_to_zero() {
        let reward = Amount::from_zat(625_000_000);
        assert_eq!(reward.halved(1).zat(), 312_500_000);
        assert_eq!(reward.halved(64), Amount::ZERO);
    }
}
