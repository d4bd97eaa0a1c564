//! Money represented in integer cents.

use serde::{Deserialize, Serialize};

/// A monetary amount in minor units (cents).
///
/// Integer arithmetic keeps order totals exact; display formatting is the
/// only place a decimal point appears.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates an amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Returns zero.
    pub fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies by an item quantity.
    pub fn times(&self, quantity: u32) -> Money {
        Money(self.0 * i64::from(quantity))
    }

    /// Returns the given fraction of this amount in basis points,
    /// rounded down. Used for percentage fees.
    pub fn scale_bp(&self, basis_points: u32) -> Money {
        Money(self.0 * i64::from(basis_points) / 10_000)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}
