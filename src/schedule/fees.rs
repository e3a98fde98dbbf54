use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::schedule::PaymentRecord;
use crate::types::PaymentStatus;

/// the three fees this product charges
///
/// Brokerage is folded into the financed principal once at origination.
/// Origination is a penalty charged per failed payment during modification,
/// never up front. Deferral is charged on the single payment that gets moved
/// to the end of the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FeeSet {
    pub brokerage_fee: Money,
    pub origination_fee: Money,
    pub deferral_fee: Money,
}

/// fees owed on failed past payments, with a per-row breakdown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedPaymentFees {
    pub total: Money,
    /// (sequence number, unpaid amount + origination fee) per failed row
    pub per_payment: Vec<(u32, Money)>,
}

impl FailedPaymentFees {
    pub fn none() -> Self {
        Self {
            total: Money::ZERO,
            per_payment: Vec::new(),
        }
    }
}

/// folds fee policy into financed amounts and modification balances
pub struct FeeIntegrator;

impl FeeIntegrator {
    /// total financed at origination; origination fee deliberately excluded
    pub fn financed_amount(loan_amount: Money, brokerage_fee: Money) -> Money {
        loan_amount + brokerage_fee
    }

    /// one origination fee plus the unpaid amount, per failed payment already past due
    pub fn failed_payment_fees(
        payments: &[PaymentRecord],
        origination_fee: Money,
        today: NaiveDate,
    ) -> FailedPaymentFees {
        let mut per_payment = Vec::new();
        let mut total = Money::ZERO;

        for row in payments {
            if row.status == PaymentStatus::Failed && row.due_date < today {
                let owed = row.amount + origination_fee;
                total += owed;
                per_payment.push((row.sequence_number, owed));
            }
        }

        FailedPaymentFees { total, per_payment }
    }

    /// outstanding balance to re-amortize when a loan is modified mid-term
    ///
    /// Brokerage is not re-added: the current remaining balance already
    /// carries it from origination.
    pub fn modification_balance(
        current_remaining_balance: Money,
        failed_fees: &FailedPaymentFees,
    ) -> Money {
        current_remaining_balance + failed_fees.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(seq: u32, due: NaiveDate, amount: Money, status: PaymentStatus) -> PaymentRecord {
        PaymentRecord {
            id: Uuid::new_v4(),
            loan_id: Uuid::new_v4(),
            sequence_number: seq,
            due_date: due,
            amount,
            principal_portion: amount,
            interest_portion: Money::ZERO,
            remaining_balance: Money::ZERO,
            status,
        }
    }

    #[test]
    fn test_financed_amount_adds_brokerage_only() {
        let financed =
            FeeIntegrator::financed_amount(Money::from_major(500), Money::from_major(50));
        assert_eq!(financed, Money::from_str_exact("550.00").unwrap());
    }

    #[test]
    fn test_failed_past_payment_charges_fee_plus_amount() {
        let today = date(2025, 6, 15);
        let payments = vec![
            row(1, date(2025, 6, 1), Money::from_major(100), PaymentStatus::Failed),
            row(2, date(2025, 7, 1), Money::from_major(100), PaymentStatus::Pending),
        ];
        let fees =
            FeeIntegrator::failed_payment_fees(&payments, Money::from_major(55), today);
        assert_eq!(fees.total, Money::from_major(155));
        assert_eq!(fees.per_payment, vec![(1, Money::from_major(155))]);
    }

    #[test]
    fn test_future_failed_payment_not_charged() {
        let today = date(2025, 6, 15);
        let payments = vec![row(
            3,
            date(2025, 6, 20),
            Money::from_major(100),
            PaymentStatus::Failed,
        )];
        let fees =
            FeeIntegrator::failed_payment_fees(&payments, Money::from_major(55), today);
        assert_eq!(fees.total, Money::ZERO);
        assert!(fees.per_payment.is_empty());
    }

    #[test]
    fn test_fee_charged_once_per_failed_payment() {
        let today = date(2025, 8, 1);
        let payments = vec![
            row(1, date(2025, 6, 1), Money::from_major(100), PaymentStatus::Failed),
            row(2, date(2025, 7, 1), Money::from_major(100), PaymentStatus::Failed),
        ];
        let fees =
            FeeIntegrator::failed_payment_fees(&payments, Money::from_major(55), today);
        assert_eq!(fees.total, Money::from_major(310));
        assert_eq!(fees.per_payment.len(), 2);
    }

    #[test]
    fn test_modification_balance() {
        let fees = FailedPaymentFees {
            total: Money::from_major(155),
            per_payment: vec![(1, Money::from_major(155))],
        };
        let balance =
            FeeIntegrator::modification_balance(Money::from_str_exact("412.34").unwrap(), &fees);
        assert_eq!(balance, Money::from_str_exact("567.34").unwrap());
    }
}
