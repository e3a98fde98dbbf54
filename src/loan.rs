use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::types::{LoanId, LoanStatus, PaymentFrequency};

/// loan state as the engine sees it
///
/// `remaining_balance` is mutated only by the engine's lifecycle operations
/// and by external settlement events. It stays within
/// `0 ..= principal_amount` except transiently while a deferral fee has been
/// added to the balance but not yet reflected in the principal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    /// financed total, including the brokerage fee folded in at origination
    pub principal_amount: Money,
    pub annual_rate: Rate,
    pub frequency: PaymentFrequency,
    pub num_payments: u32,
    pub remaining_balance: Money,
    pub status: LoanStatus,
    /// bumped on every full schedule generation/regeneration
    pub schedule_version: u32,
}

impl Loan {
    pub fn new(
        id: LoanId,
        principal_amount: Money,
        annual_rate: Rate,
        frequency: PaymentFrequency,
        num_payments: u32,
    ) -> Self {
        Self {
            id,
            principal_amount,
            annual_rate,
            frequency,
            num_payments,
            remaining_balance: Money::ZERO,
            status: LoanStatus::PendingDisbursement,
            schedule_version: 0,
        }
    }

    /// check if any lifecycle operation is still allowed
    pub fn is_open(&self) -> bool {
        !matches!(self.status, LoanStatus::Completed | LoanStatus::Cancelled)
    }

    /// check if a first schedule may be generated
    pub fn can_generate(&self) -> bool {
        matches!(self.status, LoanStatus::PendingDisbursement) && self.schedule_version == 0
    }
}

/// partial update handed to the persistence store after a lifecycle operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoanUpdate {
    pub principal_amount: Option<Money>,
    pub remaining_balance: Option<Money>,
    pub status: Option<LoanStatus>,
    pub schedule_version: Option<u32>,
}
