use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;

/// unique identifier for a loan
pub type LoanId = Uuid;

/// unique identifier for a scheduled payment row
pub type PaymentId = Uuid;

/// how often a loan is repaid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentFrequency {
    /// every 7 days
    Weekly,
    /// every 14 days
    BiWeekly,
    /// twice a month, on the 15th and last day
    SemiMonthly,
    /// same day each month, clamped to month length
    Monthly,
}

impl PaymentFrequency {
    /// payment periods per year, used to derive the periodic rate
    pub fn periods_per_year(&self) -> u32 {
        match self {
            PaymentFrequency::Weekly => 52,
            PaymentFrequency::BiWeekly => 26,
            PaymentFrequency::SemiMonthly => 24,
            PaymentFrequency::Monthly => 12,
        }
    }
}

/// loan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanStatus {
    /// approved, awaiting funds; schedule may be generated or regenerated
    PendingDisbursement,
    /// funds disbursed, payments collecting
    Active,
    /// fully repaid
    Completed,
    /// written off after sustained non-payment
    Defaulted,
    /// withdrawn before disbursement
    Cancelled,
}

/// scheduled payment status
///
/// The engine only ever creates rows as `Pending` and only rewrites rows
/// still in `Pending`/`Scheduled`. Every other status is owned by the
/// external settlement collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Scheduled,
    Authorized,
    Collected,
    Missed,
    Failed,
    Deferred,
    Cancelled,
    Confirmed,
    Paid,
    Manual,
    Rebate,
}

impl PaymentStatus {
    /// statuses reflecting a real-world settled outcome; immutable to the engine
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Confirmed
                | PaymentStatus::Paid
                | PaymentStatus::Manual
                | PaymentStatus::Rebate
        )
    }

    /// statuses the engine is allowed to rewrite during reconciliation
    pub fn is_engine_mutable(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Scheduled)
    }
}

/// contract signing state, checked before a full schedule regeneration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractStatus {
    Draft,
    Sent,
    Signed,
}

/// how a deferral charges its fee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeferralFeeOption {
    /// move the payment with no extra charge
    NoFee,
    /// charge the deferral fee from the engine configuration
    ConfiguredFee,
    /// add an explicit fee to the payment appended at the end of the schedule
    AddToMovedPayment(Money),
}

impl DeferralFeeOption {
    /// fee to add to the moved payment, given the configured deferral fee
    pub fn amount(&self, configured_fee: Money) -> Money {
        match self {
            DeferralFeeOption::NoFee => Money::ZERO,
            DeferralFeeOption::ConfiguredFee => configured_fee,
            DeferralFeeOption::AddToMovedPayment(fee) => *fee,
        }
    }
}
