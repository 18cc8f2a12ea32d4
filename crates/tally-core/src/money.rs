//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  A seller owes 0.1 + 0.2 for two items:                                 │
//! │    0.30000000000000004 in f64  ❌                                       │
//! │                                                                         │
//! │  Greedy allocation then leaves "debts" of 0.00000000000004 that never   │
//! │  close, and every comparison needs a fudge factor.                      │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    10 + 20 = 30 cents, exactly. The 1-cent tolerance survives only at   │
//! │    the documented bound checks (paid <= total + 0.01, etc.)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::money::Money;
//!
//! let price = Money::from_cents(1250); // 12.50
//! let line = price * 3;                // 37.50
//! assert_eq!(line.cents(), 3750);
//!
//! let parsed: Money = "37.5".parse().unwrap();
//! assert_eq!(parsed, line);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;

use crate::error::ValidationError;
use crate::types::CommissionRate;
use crate::MONEY_TOLERANCE;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: commission payouts may be negative (seller owes the business)
/// - **Single field tuple struct**: zero-cost abstraction over i64
///
/// ## Where Money Flows
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  OrderItem.unit_price × quantity ──► Order.total                        │
/// │                                         │                               │
/// │  Payment.amount ──(approved)──► Order.paid ──► remaining debt           │
/// │                                                   │                     │
/// │  Allocator / Amortizer / Commission ◄─────────────┘                     │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// For negative amounts only the major unit carries the sign:
    /// `from_major_minor(-5, 50)` is -5.50.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion (truncated toward zero).
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Returns the smaller of two amounts.
    #[inline]
    pub fn min(self, other: Money) -> Money {
        Money(self.0.min(other.0))
    }

    /// Returns the larger of two amounts.
    #[inline]
    pub fn max(self, other: Money) -> Money {
        Money(self.0.max(other.0))
    }

    /// True when this amount is above `limit` by more than the 1-cent tolerance.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// let debt = Money::from_cents(10000);
    /// assert!(!Money::from_cents(10001).exceeds(debt));
    /// assert!(Money::from_cents(10002).exceeds(debt));
    /// ```
    #[inline]
    pub fn exceeds(self, limit: Money) -> bool {
        self > limit + MONEY_TOLERANCE
    }

    /// True when this amount is larger than the tolerance (a "real" debt).
    #[inline]
    pub fn above_tolerance(self) -> bool {
        self > MONEY_TOLERANCE
    }

    /// Multiplies money by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Applies a commission rate, rounding half away from zero at the cent.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    /// use tally_core::types::CommissionRate;
    ///
    /// let received = Money::from_cents(100_000); // 1000.00
    /// let rate = CommissionRate::from_percent(20);
    /// assert_eq!(received.apply_rate(rate).cents(), 20_000); // 200.00
    /// ```
    pub fn apply_rate(&self, rate: CommissionRate) -> Money {
        // i128 keeps large balances from overflowing; 10000 bps = 100%
        let scaled = self.0 as i128 * rate.bps() as i128;
        let half = if scaled < 0 { -5000 } else { 5000 };
        Money::from_cents(((scaled + half) / 10000) as i64)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Plain decimal rendering (`-5.50`). Currency symbols are a presentation concern.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor())
    }
}

/// Parses user-entered decimal amounts such as `12`, `12.5`, `12.50`, `-3.25`.
///
/// Accepts `,` as the decimal separator too. More than two fractional digits
/// is rejected rather than rounded.
impl FromStr for Money {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: reason.to_string(),
        };

        let s = s.trim().replace(',', ".");
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "amount".to_string(),
            });
        }

        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.as_str()),
        };

        let (major_str, minor_str) = match digits.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (digits, ""),
        };

        if minor_str.len() > 2 {
            return Err(invalid("at most two decimal places"));
        }
        if major_str.is_empty() && minor_str.is_empty() {
            return Err(invalid("no digits"));
        }
        if !major_str.chars().all(|c| c.is_ascii_digit())
            || !minor_str.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid("must be a decimal number"));
        }

        let major: i64 = if major_str.is_empty() {
            0
        } else {
            major_str.parse().map_err(|_| invalid("out of range"))?
        };
        let minor: i64 = match minor_str.len() {
            0 => 0,
            1 => minor_str.parse::<i64>().map_err(|_| invalid("out of range"))? * 10,
            _ => minor_str.parse().map_err(|_| invalid("out of range"))?,
        };

        let cents = major
            .checked_mul(100)
            .and_then(|c| c.checked_add(minor))
            .ok_or_else(|| invalid("out of range"))?;

        Ok(Money(if negative { -cents } else { cents }))
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

/// Multiplication by quantity.
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.major(), 10);
        assert_eq!(money.minor(), 99);
    }

    #[test]
    fn test_from_major_minor() {
        assert_eq!(Money::from_major_minor(10, 99).cents(), 1099);
        assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "10.99");
        assert_eq!(Money::from_cents(500).to_string(), "5.00");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::from_cents(-5).to_string(), "-0.05");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_parse() {
        assert_eq!("12".parse::<Money>().unwrap().cents(), 1200);
        assert_eq!("12.5".parse::<Money>().unwrap().cents(), 1250);
        assert_eq!("12,05".parse::<Money>().unwrap().cents(), 1205);
        assert_eq!("-3.25".parse::<Money>().unwrap().cents(), -325);
        assert_eq!(".5".parse::<Money>().unwrap().cents(), 50);

        assert!("".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
        assert!("1.234".parse::<Money>().is_err());
        assert!("1.2.3".parse::<Money>().is_err());
        assert!(".".parse::<Money>().is_err());
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);
        assert_eq!((-a).cents(), -1000);
        assert_eq!(a.min(b), b);
        assert_eq!(a.max(b), a);
    }

    #[test]
    fn test_sum() {
        let amounts = vec![Money::from_cents(30), Money::from_cents(50), Money::from_cents(20)];
        let by_ref: Money = amounts.iter().sum();
        let by_value: Money = amounts.into_iter().sum();
        assert_eq!(by_ref.cents(), 100);
        assert_eq!(by_value.cents(), 100);
    }

    #[test]
    fn test_tolerance_checks() {
        let limit = Money::from_cents(10000);
        assert!(!limit.exceeds(limit));
        assert!(!Money::from_cents(10001).exceeds(limit));
        assert!(Money::from_cents(10002).exceeds(limit));

        assert!(!Money::from_cents(1).above_tolerance());
        assert!(Money::from_cents(2).above_tolerance());
    }

    #[test]
    fn test_apply_rate_rounding() {
        let rate = CommissionRate::from_percent(20);
        assert_eq!(Money::from_cents(100_000).apply_rate(rate).cents(), 20_000);

        // 0.03 * 20% = 0.006 -> 0.01
        assert_eq!(Money::from_cents(3).apply_rate(rate).cents(), 1);
        // 0.02 * 20% = 0.004 -> 0.00
        assert_eq!(Money::from_cents(2).apply_rate(rate).cents(), 0);
        // negative amounts round symmetrically
        assert_eq!(Money::from_cents(-3).apply_rate(rate).cents(), -1);
    }

    #[test]
    fn test_zero_and_checks() {
        let zero = Money::zero();
        assert!(zero.is_zero());
        assert!(!zero.is_positive());
        assert!(!zero.is_negative());

        let negative = Money::from_cents(-100);
        assert!(negative.is_negative());
        assert_eq!(negative.abs().cents(), 100);
    }
}
