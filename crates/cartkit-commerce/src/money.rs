//! Money type for representing monetary values.
//!
//! Amounts are integer minor units. The platform reports every price and
//! discount in minor units already, so nothing here ever touches floating
//! point except the display helpers.

use crate::error::CommerceError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// ISO 4217 currencies carts can be priced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Currency {
    #[default]
    USD,
    EUR,
    GBP,
    JPY,
    CAD,
    AUD,
    CHF,
}

struct CurrencyInfo {
    currency: Currency,
    code: &'static str,
    symbol: &'static str,
    decimal_places: u32,
}

const CURRENCIES: &[CurrencyInfo] = &[
    CurrencyInfo { currency: Currency::USD, code: "USD", symbol: "$", decimal_places: 2 },
    CurrencyInfo { currency: Currency::EUR, code: "EUR", symbol: "\u{20ac}", decimal_places: 2 },
    CurrencyInfo { currency: Currency::GBP, code: "GBP", symbol: "\u{00a3}", decimal_places: 2 },
    CurrencyInfo { currency: Currency::JPY, code: "JPY", symbol: "\u{00a5}", decimal_places: 0 },
    CurrencyInfo { currency: Currency::CAD, code: "CAD", symbol: "CA$", decimal_places: 2 },
    CurrencyInfo { currency: Currency::AUD, code: "AUD", symbol: "A$", decimal_places: 2 },
    CurrencyInfo { currency: Currency::CHF, code: "CHF", symbol: "CHF ", decimal_places: 2 },
];

impl Currency {
    fn info(&self) -> &'static CurrencyInfo {
        // Every variant has exactly one row.
        CURRENCIES
            .iter()
            .find(|info| info.currency == *self)
            .unwrap_or(&CURRENCIES[0])
    }

    /// ISO code, as the platform reports it.
    pub fn code(&self) -> &'static str {
        self.info().code
    }

    pub fn symbol(&self) -> &'static str {
        self.info().symbol
    }

    /// Number of minor-unit decimal places.
    pub fn decimal_places(&self) -> u32 {
        self.info().decimal_places
    }

    /// Case-insensitive lookup by ISO code.
    pub fn from_code(code: &str) -> Option<Self> {
        CURRENCIES
            .iter()
            .find(|info| info.code.eq_ignore_ascii_case(code))
            .map(|info| info.currency)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A monetary value with currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Money {
    /// Amount in the smallest currency unit (e.g., cents).
    pub amount_minor: i64,
    /// The currency.
    pub currency: Currency,
}

impl Money {
    /// Create a new Money value from minor units.
    pub fn new(amount_minor: i64, currency: Currency) -> Self {
        Self {
            amount_minor,
            currency,
        }
    }

    /// Create a zero amount in the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self::new(0, currency)
    }

    /// Check if this is zero.
    pub fn is_zero(&self) -> bool {
        self.amount_minor == 0
    }

    /// Check if this is positive.
    pub fn is_positive(&self) -> bool {
        self.amount_minor > 0
    }

    /// Fail with `CurrencyMismatch` unless this value is in `expected`.
    pub fn ensure_currency(&self, expected: Currency) -> Result<(), CommerceError> {
        if self.currency != expected {
            return Err(CommerceError::CurrencyMismatch {
                expected: expected.code().to_string(),
                got: self.currency.code().to_string(),
            });
        }
        Ok(())
    }

    /// Add another Money value of the same currency.
    pub fn checked_add(&self, other: &Money) -> Result<Money, CommerceError> {
        other.ensure_currency(self.currency)?;
        let amount = self
            .amount_minor
            .checked_add(other.amount_minor)
            .ok_or(CommerceError::Overflow)?;
        Ok(Money::new(amount, self.currency))
    }

    /// Subtract another Money value of the same currency.
    pub fn checked_sub(&self, other: &Money) -> Result<Money, CommerceError> {
        other.ensure_currency(self.currency)?;
        let amount = self
            .amount_minor
            .checked_sub(other.amount_minor)
            .ok_or(CommerceError::Overflow)?;
        Ok(Money::new(amount, self.currency))
    }

    /// Multiply by a unit count.
    pub fn checked_mul(&self, factor: u32) -> Result<Money, CommerceError> {
        let amount = self
            .amount_minor
            .checked_mul(i64::from(factor))
            .ok_or(CommerceError::Overflow)?;
        Ok(Money::new(amount, self.currency))
    }

    /// Sum values that must all be in `currency`.
    ///
    /// An empty iterator sums to zero in `currency`.
    pub fn try_sum<'a>(
        iter: impl IntoIterator<Item = &'a Money>,
        currency: Currency,
    ) -> Result<Money, CommerceError> {
        iter.into_iter()
            .try_fold(Money::zero(currency), |acc, m| acc.checked_add(m))
    }

    /// Symbol-prefixed amount, e.g. `$49.99` or `-\u{00a5}100`.
    ///
    /// Formatted from the integer amount; no floating point involved.
    pub fn display(&self) -> String {
        let places = self.currency.decimal_places();
        let sign = if self.amount_minor < 0 { "-" } else { "" };
        let abs = self.amount_minor.unsigned_abs();
        let symbol = self.currency.symbol();
        if places == 0 {
            return format!("{}{}{}", sign, symbol, abs);
        }
        let divisor = 10u64.pow(places);
        format!(
            "{}{}{}.{:0width$}",
            sign,
            symbol,
            abs / divisor,
            abs % divisor,
            width = places as usize
        )
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}
