//! Type-safe price representation using decimal arithmetic.
//!
//! Prices are denominated in Vietnamese đồng. VND has no minor unit, so
//! amounts on the wire are plain integers; `Decimal` is used internally so
//! that line subtotals and cart totals never go through floating point.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (whole đồng for VND).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Create a VND price from a whole-đồng amount.
    #[must_use]
    pub fn from_vnd(amount: i64) -> Self {
        Self {
            amount: Decimal::from(amount),
            currency_code: CurrencyCode::VND,
        }
    }

    /// Line subtotal for a given quantity.
    #[must_use]
    pub fn times(&self, quantity: u32) -> Decimal {
        self.amount * Decimal::from(quantity)
    }

    /// Format for display with Vietnamese thousands grouping (e.g. "120.000 ₫").
    #[must_use]
    pub fn display(&self) -> String {
        let raw = self.amount.normalize().to_string();
        let (sign, digits) = raw
            .strip_prefix('-')
            .map_or(("", raw.as_str()), |rest| ("-", rest));
        // Group the integral part only; VND amounts have no fraction in practice
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));

        let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
        let chars: Vec<char> = int_part.chars().collect();
        for (i, c) in chars.iter().enumerate() {
            if i > 0 && (chars.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(*c);
        }

        if frac_part.is_empty() {
            format!("{sign}{grouped} {}", self.currency_code.symbol())
        } else {
            format!("{sign}{grouped},{frac_part} {}", self.currency_code.symbol())
        }
    }
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    VND,
    USD,
}

impl CurrencyCode {
    /// Currency symbol for display.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::VND => "₫",
            Self::USD => "$",
        }
    }

    /// ISO 4217 code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::VND => "VND",
            Self::USD => "USD",
        }
    }
}
