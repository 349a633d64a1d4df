use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::errors::ValidationError;

// ============================================================================
// Money & Quantity Primitives
// ============================================================================
//
// All arithmetic is exact decimal. Rounding to a currency's minor unit
// happens once, on the figures that end up in `Totals`.
//
// ============================================================================

/// Upper bound for any single price or transaction amount.
pub const MAX_AMOUNT: i64 = 1_000_000_000;

/// Upper bound for a line item quantity.
pub const MAX_QUANTITY: u32 = 1_000_000;

/// Exact monetary amount. Currency is carried by the owning order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Price validation: zero is allowed, negatives and absurd values are not.
    pub fn non_negative(amount: Decimal, field: &'static str) -> Result<Self, ValidationError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(ValidationError::NegativeAmount { field, amount });
        }
        if amount > Decimal::from(MAX_AMOUNT) {
            return Err(ValidationError::AmountOutOfRange { field, amount });
        }
        Ok(Self(amount))
    }

    /// Transaction validation: strictly positive.
    pub fn positive(amount: Decimal, field: &'static str) -> Result<Self, ValidationError> {
        if amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount { field, amount });
        }
        Self::non_negative(amount, field)
    }

    pub fn times(&self, quantity: Quantity) -> Money {
        // Bounded by MAX_AMOUNT * MAX_QUANTITY, far inside Decimal's range.
        Money(self.0 * Decimal::from(quantity.get()))
    }

    pub fn min(self, other: Money) -> Money {
        if self <= other { self } else { other }
    }

    /// Floor at zero.
    pub fn clamp_non_negative(self) -> Money {
        if self.is_negative() { Money::ZERO } else { self }
    }

    pub fn round_to(&self, currency: &Currency) -> Money {
        Money(
            self.0
                .round_dp_with_strategy(currency.minor_units(), RoundingStrategy::MidpointAwayFromZero),
        )
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
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
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Positive whole-unit quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(raw: i64) -> Result<Self, ValidationError> {
        if raw <= 0 {
            return Err(ValidationError::NonPositiveQuantity(raw));
        }
        if raw > i64::from(MAX_QUANTITY) {
            return Err(ValidationError::QuantityOutOfRange(raw));
        }
        Ok(Self(raw as u32))
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl TryFrom<i64> for Quantity {
    type Error = ValidationError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Quantity::new(raw)
    }
}

impl From<Quantity> for i64 {
    fn from(q: Quantity) -> i64 {
        i64::from(q.0)
    }
}

/// ISO-4217 style currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn parse(code: &str) -> Result<Self, ValidationError> {
        let code = code.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::InvalidCurrency(code.to_string()));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn code(&self) -> &str {
        &self.0
    }

    /// Digits after the decimal point for displayed amounts.
    pub fn minor_units(&self) -> u32 {
        match self.0.as_str() {
            "JPY" | "KRW" | "VND" | "CLP" | "ISK" => 0,
            "BHD" | "KWD" | "OMR" | "JOD" | "TND" => 3,
            _ => 2,
        }
    }
}

impl TryFrom<String> for Currency {
    type Error = ValidationError;

    fn try_from(code: String) -> Result<Self, Self::Error> {
        Currency::parse(&code)
    }
}

impl From<Currency> for String {
    fn from(c: Currency) -> String {
        c.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
