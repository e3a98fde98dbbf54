use chrono::NaiveDate;
use thiserror::Error;

use crate::types::{LoanId, LoanStatus};

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("invalid schedule parameters: {field}: {message}")]
    InvalidScheduleParameters {
        field: &'static str,
        message: String,
    },

    #[error("invalid start date: {start_date} must be strictly after {today}")]
    InvalidStartDate {
        start_date: NaiveDate,
        today: NaiveDate,
    },

    #[error("contract already finalized for loan {loan_id}")]
    ContractAlreadyFinalized {
        loan_id: LoanId,
    },

    #[error("loan {loan_id} already settled: status is {status:?}")]
    LoanAlreadySettled {
        loan_id: LoanId,
        status: LoanStatus,
    },

    #[error("reconciliation conflict: {message}")]
    ReconciliationConflict {
        message: String,
    },

    #[error("loan not found: {loan_id}")]
    LoanNotFound {
        loan_id: LoanId,
    },

    #[error("payment {sequence_number} not found for loan {loan_id}")]
    PaymentNotFound {
        loan_id: LoanId,
        sequence_number: u32,
    },

    #[error("store failure: {message}")]
    Store {
        message: String,
    },
}

impl ScheduleError {
    /// shorthand for parameter validation failures
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        ScheduleError::InvalidScheduleParameters {
            field,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
