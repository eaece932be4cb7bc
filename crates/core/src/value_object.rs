//! Value objects: equality by value, not identity.
//!
//! Value objects are domain objects that have **no identity** - they are defined entirely
//! by their attribute values. Two value objects with the same values are considered equal.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Financial-year label used to scope documents and counters (e.g. `2025` or `2025-26`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FinancialYear(String);

impl FinancialYear {
    const MAX_LEN: usize = 16;

    pub fn parse(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("financial year cannot be empty"));
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(DomainError::validation(format!(
                "financial year must be at most {} characters",
                Self::MAX_LEN
            )));
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '/')
        {
            return Err(DomainError::validation(
                "financial year may only contain letters, digits, '-' or '/'",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for FinancialYear {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for FinancialYear {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<FinancialYear> for String {
    fn from(value: FinancialYear) -> Self {
        value.0
    }
}

/// A two-dimensional stock quantity: whole boxes plus (fractional) meters.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Quantity {
    pub boxes: i64,
    pub meters: Decimal,
}

impl Quantity {
    pub const ZERO: Quantity = Quantity {
        boxes: 0,
        meters: Decimal::ZERO,
    };

    pub fn new(boxes: i64, meters: Decimal) -> Self {
        Self { boxes, meters }
    }

    /// Both dimensions are zero.
    pub fn is_zero(&self) -> bool {
        self.boxes == 0 && self.meters.is_zero()
    }

    /// Either dimension is negative.
    pub fn is_negative(&self) -> bool {
        self.boxes < 0 || (self.meters.is_sign_negative() && !self.meters.is_zero())
    }

    /// Both dimensions are non-negative and at least one is positive.
    pub fn ensure_positive(&self, what: &str) -> DomainResult<()> {
        if self.is_negative() {
            return Err(DomainError::validation(format!(
                "{what} cannot be negative"
            )));
        }
        if self.is_zero() {
            return Err(DomainError::validation(format!(
                "{what} must request a positive number of boxes or meters"
            )));
        }
        Ok(())
    }

    pub fn checked_add(self, other: Quantity) -> DomainResult<Quantity> {
        let boxes = self
            .boxes
            .checked_add(other.boxes)
            .ok_or_else(|| DomainError::invariant("box quantity overflow"))?;
        let meters = self
            .meters
            .checked_add(other.meters)
            .ok_or_else(|| DomainError::invariant("meter quantity overflow"))?;
        Ok(Quantity { boxes, meters })
    }

    pub fn checked_sub(self, other: Quantity) -> DomainResult<Quantity> {
        let boxes = self
            .boxes
            .checked_sub(other.boxes)
            .ok_or_else(|| DomainError::invariant("box quantity overflow"))?;
        let meters = self
            .meters
            .checked_sub(other.meters)
            .ok_or_else(|| DomainError::invariant("meter quantity overflow"))?;
        Ok(Quantity { boxes, meters })
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} boxes / {} meters", self.boxes, self.meters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn financial_year_is_trimmed_and_validated() {
        assert_eq!(FinancialYear::parse(" 2025-26 ").unwrap().as_str(), "2025-26");
        assert!(FinancialYear::parse("").is_err());
        assert!(FinancialYear::parse("2025 26").is_err());
        assert!(FinancialYear::parse("x".repeat(17)).is_err());
    }

    #[test]
    fn financial_year_deserializes_through_validation() {
        let ok: FinancialYear = serde_json::from_str("\"2025\"").unwrap();
        assert_eq!(ok.as_str(), "2025");
        assert!(serde_json::from_str::<FinancialYear>("\"\"").is_err());
    }

    #[test]
    fn quantity_positive_check_rejects_zero_and_negative() {
        assert!(Quantity::new(0, dec!(0)).ensure_positive("recipient").is_err());
        assert!(Quantity::new(-1, dec!(5)).ensure_positive("recipient").is_err());
        assert!(Quantity::new(1, dec!(-0.5)).ensure_positive("recipient").is_err());
        assert!(Quantity::new(0, dec!(2.5)).ensure_positive("recipient").is_ok());
    }

    #[test]
    fn negative_zero_meters_is_not_negative() {
        let q = Quantity::new(1, -Decimal::ZERO);
        assert!(!q.is_negative());
    }

    #[test]
    fn checked_arithmetic_is_symmetric() {
        let a = Quantity::new(10, dec!(12.5));
        let b = Quantity::new(4, dec!(2.25));
        let sum = a.checked_add(b).unwrap();
        assert_eq!(sum, Quantity::new(14, dec!(14.75)));
        assert_eq!(sum.checked_sub(b).unwrap(), a);
    }
}
