//! Bill fees
//!
//! A fee is either ad-hoc (free-form name) or typed (references a
//! configured fee type such as parking or internet). Fee order never
//! affects the total.

use serde::{Deserialize, Serialize};

use core_kernel::{Currency, FeeId, FeeTypeId, Money};

use crate::error::BillingError;

/// A charge attached to exactly one bill
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fee {
    AdHoc {
        id: FeeId,
        name: String,
        amount: Money,
    },
    Typed {
        id: FeeId,
        name: String,
        amount: Money,
        fee_type_id: FeeTypeId,
    },
}

impl Fee {
    pub fn ad_hoc(name: impl Into<String>, amount: Money) -> Self {
        Fee::AdHoc {
            id: FeeId::new_v7(),
            name: name.into(),
            amount,
        }
    }

    pub fn typed(name: impl Into<String>, amount: Money, fee_type_id: FeeTypeId) -> Self {
        Fee::Typed {
            id: FeeId::new_v7(),
            name: name.into(),
            amount,
            fee_type_id,
        }
    }

    pub fn id(&self) -> FeeId {
        match self {
            Fee::AdHoc { id, .. } | Fee::Typed { id, .. } => *id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Fee::AdHoc { name, .. } | Fee::Typed { name, .. } => name,
        }
    }

    pub fn amount(&self) -> Money {
        match self {
            Fee::AdHoc { amount, .. } | Fee::Typed { amount, .. } => *amount,
        }
    }

    pub fn fee_type_id(&self) -> Option<FeeTypeId> {
        match self {
            Fee::AdHoc { .. } => None,
            Fee::Typed { fee_type_id, .. } => Some(*fee_type_id),
        }
    }

    /// Rejects negative amounts and amounts in another currency
    pub fn validate(&self, currency: Currency) -> Result<(), BillingError> {
        let amount = self.amount();
        if amount.is_negative() || amount.currency() != currency {
            return Err(BillingError::InvalidFeeAmount {
                name: self.name().to_string(),
                amount: amount.amount(),
            });
        }
        Ok(())
    }
}

/// Sums fees; an empty list totals zero
pub fn fees_total(fees: &[Fee], currency: Currency) -> Result<Money, BillingError> {
    let mut total = Money::zero(currency);
    for fee in fees {
        fee.validate(currency)?;
        total = total.checked_add(&fee.amount())?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn vnd(amount: i64) -> Money {
        Money::new(Decimal::from(amount), Currency::VND)
    }

    #[test]
    fn test_empty_is_zero() {
        assert!(fees_total(&[], Currency::VND).unwrap().is_zero());
    }

    #[test]
    fn test_sum_is_order_independent() {
        let a = Fee::ad_hoc("Trash", vnd(20_000));
        let b = Fee::typed("Parking", vnd(100_000), FeeTypeId::new());
        let forward = fees_total(&[a.clone(), b.clone()], Currency::VND).unwrap();
        let backward = fees_total(&[b, a], Currency::VND).unwrap();
        assert_eq!(forward, vnd(120_000));
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_negative_fee_rejected() {
        let fee = Fee::ad_hoc("Refund", vnd(-5_000));
        let err = fees_total(&[fee], Currency::VND).unwrap_err();
        assert!(matches!(err, BillingError::InvalidFeeAmount { ref name, .. } if name == "Refund"));
    }

    #[test]
    fn test_zero_fee_allowed() {
        assert!(fees_total(&[Fee::ad_hoc("Waived", vnd(0))], Currency::VND).is_ok());
    }

    #[test]
    fn test_foreign_currency_fee_rejected() {
        let fee = Fee::ad_hoc("Wifi", Money::new(Decimal::from(5), Currency::USD));
        assert!(fees_total(&[fee], Currency::VND).is_err());
    }

    #[test]
    fn test_fee_serialization_is_tagged() {
        let typed_id = FeeTypeId::new();
        let json = serde_json::to_value(Fee::typed("Parking", vnd(1), typed_id)).unwrap();
        assert_eq!(json["kind"], "typed");
        assert_eq!(json["fee_type_id"], serde_json::to_value(typed_id).unwrap());
    }
}
