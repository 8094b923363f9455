//! Currency-safe money arithmetic in integer minor units.
//!
//! All amounts are stored as minor units (pence, cents) in an `i64`; no
//! operation ever touches floating point. `rust_decimal` is used only to
//! render display strings.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors from combining incompatible [`Money`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    /// Two amounts in different currencies were combined.
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch {
        left: CurrencyCode,
        right: CurrencyCode,
    },
}

/// A monetary amount in a single currency.
///
/// Immutable value object; equality is value-based. Arithmetic returns new
/// values and never mutates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in the smallest currency unit (e.g., pence for GBP).
    amount: i64,
    /// ISO 4217 currency code.
    currency: CurrencyCode,
}

impl Money {
    /// Create a new amount from minor units.
    #[must_use]
    pub const fn new(amount: i64, currency: CurrencyCode) -> Self {
        Self { amount, currency }
    }

    /// The zero amount in the given currency.
    #[must_use]
    pub const fn zero(currency: CurrencyCode) -> Self {
        Self::new(0, currency)
    }

    /// Amount in minor units.
    #[must_use]
    pub const fn amount(&self) -> i64 {
        self.amount
    }

    /// Currency of this amount.
    #[must_use]
    pub const fn currency(&self) -> CurrencyCode {
        self.currency
    }

    /// Add another amount in the same currency.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::CurrencyMismatch` if the currencies differ.
    pub fn add(self, other: Self) -> Result<Self, MoneyError> {
        self.check_currency(other)?;
        Ok(Self::new(self.amount + other.amount, self.currency))
    }

    /// Subtract another amount in the same currency.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::CurrencyMismatch` if the currencies differ.
    pub fn subtract(self, other: Self) -> Result<Self, MoneyError> {
        self.check_currency(other)?;
        Ok(Self::new(self.amount - other.amount, self.currency))
    }

    /// Multiply by an integer quantity.
    #[must_use]
    pub const fn multiply(self, quantity: u32) -> Self {
        Self::new(self.amount * quantity as i64, self.currency)
    }

    /// Locale-formatted display string, e.g. minor-unit 1000 GBP -> "£10.00".
    ///
    /// Negative amounts render with a leading "-": "-£0.50".
    #[must_use]
    pub fn format(&self) -> String {
        let units = Decimal::new(self.amount.abs(), 2);
        let sign = if self.amount < 0 { "-" } else { "" };
        format!("{sign}{}{units:.2}", self.currency.symbol())
    }

    const fn check_currency(self, other: Self) -> Result<(), MoneyError> {
        if matches!(
            (self.currency, other.currency),
            (CurrencyCode::GBP, CurrencyCode::GBP)
                | (CurrencyCode::USD, CurrencyCode::USD)
                | (CurrencyCode::EUR, CurrencyCode::EUR)
        ) {
            Ok(())
        } else {
            Err(MoneyError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            })
        }
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.format())
    }
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    GBP,
    USD,
    EUR,
}

impl CurrencyCode {
    /// Currency symbol for display formatting.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::GBP => "£",
            Self::USD => "$",
            Self::EUR => "€",
        }
    }

    /// ISO 4217 code, lowercase form used by payment providers.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::GBP => "gbp",
            Self::USD => "usd",
            Self::EUR => "eur",
        }
    }
}

impl std::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GBP => write!(f, "GBP"),
            Self::USD => write!(f, "USD"),
            Self::EUR => write!(f, "EUR"),
        }
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GBP" => Ok(Self::GBP),
            "USD" => Ok(Self::USD),
            "EUR" => Ok(Self::EUR),
            _ => Err(format!("unknown currency code: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_whole_pounds() {
        let money = Money::new(1000, CurrencyCode::GBP);
        assert_eq!(money.format(), "£10.00");
    }

    #[test]
    fn test_format_zero() {
        assert_eq!(Money::zero(CurrencyCode::GBP).format(), "£0.00");
    }

    #[test]
    fn test_format_sub_unit() {
        assert_eq!(Money::new(5, CurrencyCode::GBP).format(), "£0.05");
        assert_eq!(Money::new(1234, CurrencyCode::USD).format(), "$12.34");
    }

    #[test]
    fn test_format_negative_has_leading_sign() {
        assert_eq!(Money::new(-50, CurrencyCode::GBP).format(), "-£0.50");
        assert_eq!(Money::new(-1000, CurrencyCode::GBP).format(), "-£10.00");
    }

    #[test]
    fn test_add_same_currency() {
        let a = Money::new(250, CurrencyCode::GBP);
        let b = Money::new(750, CurrencyCode::GBP);
        assert_eq!(a.add(b).expect("same currency").amount(), 1000);
    }

    #[test]
    fn test_subtract_can_go_negative() {
        let a = Money::new(100, CurrencyCode::GBP);
        let b = Money::new(150, CurrencyCode::GBP);
        assert_eq!(a.subtract(b).expect("same currency").amount(), -50);
    }

    #[test]
    fn test_add_rejects_currency_mismatch() {
        let a = Money::new(100, CurrencyCode::GBP);
        let b = Money::new(100, CurrencyCode::USD);
        assert!(matches!(
            a.add(b),
            Err(MoneyError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn test_multiply_by_quantity() {
        let price = Money::new(500, CurrencyCode::GBP);
        assert_eq!(price.multiply(2).amount(), 1000);
        assert_eq!(price.multiply(0).amount(), 0);
    }

    #[test]
    fn test_equality_is_value_based() {
        assert_eq!(
            Money::new(100, CurrencyCode::GBP),
            Money::new(100, CurrencyCode::GBP)
        );
        assert_ne!(
            Money::new(100, CurrencyCode::GBP),
            Money::new(100, CurrencyCode::USD)
        );
    }
}
