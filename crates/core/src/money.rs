//! Integer-cent money and bounded percentages.
//!
//! All arithmetic that can produce fractions of a cent goes through
//! [`round_div`], which rounds half away from zero. Amounts never pass
//! through floating point.

use core::iter::Sum;
use core::ops::{Add, AddAssign, Sub};

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Divide `numerator / denominator`, rounding half away from zero.
///
/// Panics if `denominator` is zero; callers guard against empty totals.
pub fn round_div(numerator: i128, denominator: i128) -> i128 {
    assert!(denominator != 0, "round_div by zero");
    let negative = (numerator < 0) != (denominator < 0);
    let (n, d) = (numerator.abs(), denominator.abs());
    let q = (2 * n + d) / (2 * d);
    if negative { -q } else { q }
}

/// An amount of currency in its smallest unit (cents).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Whole currency units (e.g. `Money::from_units(100)` is 100.00).
    pub const fn from_units(units: i64) -> Self {
        Self(units * 100)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Split into `parts` equal shares, rounding the share to the nearest cent.
    pub fn div_round(self, parts: u32) -> Money {
        Money(round_div(self.0 as i128, parts.max(1) as i128) as i64)
    }

    /// `self * numerator / denominator`, rounded to the nearest cent.
    pub fn mul_ratio(self, numerator: i64, denominator: i64) -> Money {
        Money(round_div(self.0 as i128 * numerator as i128, denominator as i128) as i64)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.copied().sum()
    }
}

/// A whole-number percentage in `0..=100`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Percentage(u8);

impl Percentage {
    pub const ZERO: Percentage = Percentage(0);
    pub const FULL: Percentage = Percentage(100);

    pub fn new(value: u8) -> DomainResult<Self> {
        if value > 100 {
            return Err(DomainError::validation(format!(
                "percentage must be between 0 and 100 (got {value})"
            )));
        }
        Ok(Self(value))
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    pub fn is_full(self) -> bool {
        self.0 == 100
    }

    /// `round(amount * pct / 100)` in cents.
    pub fn of(self, amount: Money) -> Money {
        amount.mul_ratio(self.0 as i64, 100)
    }
}

impl TryFrom<u8> for Percentage {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Percentage::new(value)
    }
}

impl From<Percentage> for u8 {
    fn from(value: Percentage) -> Self {
        value.0
    }
}

impl core::fmt::Display for Percentage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}%", self.0)
    }
}
