pub mod amortization;
pub mod calendar;
pub mod fees;
pub mod reconcile;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::types::{LoanId, PaymentFrequency, PaymentId, PaymentStatus};

pub use amortization::{AmortizationCalculator, ScheduleParams};
pub use calendar::CalendarResolver;
pub use fees::{FailedPaymentFees, FeeIntegrator, FeeSet};
pub use reconcile::{reconcile, ReconcilePlan, ReconcilePreview};

/// one line of a computed amortization schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleLine {
    /// 1-based position within this computation (not yet a persisted sequence number)
    pub period: u32,
    pub due_date: NaiveDate,
    pub amount: Money,
    pub principal_portion: Money,
    pub interest_portion: Money,
    /// balance after this payment is applied
    pub remaining_balance: Money,
}

/// a persisted scheduled-payment row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub loan_id: LoanId,
    /// 1-based, contiguous, unique per loan
    pub sequence_number: u32,
    pub due_date: NaiveDate,
    pub amount: Money,
    pub principal_portion: Money,
    pub interest_portion: Money,
    pub remaining_balance: Money,
    pub status: PaymentStatus,
}

impl PaymentRecord {
    /// materialize a computed line as a fresh pending row
    pub fn from_line(loan_id: LoanId, sequence_number: u32, line: &ScheduleLine) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_id,
            sequence_number,
            due_date: line.due_date,
            amount: line.amount,
            principal_portion: line.principal_portion,
            interest_portion: line.interest_portion,
            remaining_balance: line.remaining_balance,
            status: PaymentStatus::Pending,
        }
    }
}

/// a full generated schedule, as handed to contract rendering and UIs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanSchedule {
    pub loan_id: LoanId,
    pub version: u32,
    pub financed_amount: Money,
    pub annual_rate: Rate,
    pub frequency: PaymentFrequency,
    pub lines: Vec<ScheduleLine>,
}

impl LoanSchedule {
    /// total of all payment amounts
    pub fn total_payment(&self) -> Money {
        self.lines.iter().map(|l| l.amount).sum()
    }

    /// total interest over the life of the schedule
    pub fn total_interest(&self) -> Money {
        self.lines.iter().map(|l| l.interest_portion).sum()
    }

    /// serialize to pretty JSON for document rendering
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// deserialize from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
