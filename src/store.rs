use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::errors::{Result, ScheduleError};
use crate::loan::{Loan, LoanUpdate};
use crate::schedule::{PaymentRecord, ReconcilePlan};
use crate::types::{ContractStatus, LoanId};

/// persistence seam for loans and their payment rows
///
/// `bulk_replace_payments` and `bulk_upsert_payments` are the atomic commit
/// boundary: an implementation must apply each call all-or-nothing, because a
/// half-applied replace leaves the loan without a valid schedule. The engine
/// never retries a failed bulk write.
pub trait LoanStore {
    fn get_loan(&self, id: LoanId) -> Result<Loan>;
    fn update_loan(&self, id: LoanId, update: LoanUpdate) -> Result<()>;
    fn list_payments(&self, loan_id: LoanId) -> Result<Vec<PaymentRecord>>;
    fn bulk_replace_payments(&self, loan_id: LoanId, rows: Vec<PaymentRecord>) -> Result<()>;
    fn bulk_upsert_payments(&self, loan_id: LoanId, plan: &ReconcilePlan) -> Result<()>;
}

/// contract state, checked before a full schedule regeneration
pub trait ContractStore {
    fn contract_status(&self, loan_id: LoanId) -> Result<ContractStatus>;
}

impl<T: LoanStore + ?Sized> LoanStore for Arc<T> {
    fn get_loan(&self, id: LoanId) -> Result<Loan> {
        (**self).get_loan(id)
    }

    fn update_loan(&self, id: LoanId, update: LoanUpdate) -> Result<()> {
        (**self).update_loan(id, update)
    }

    fn list_payments(&self, loan_id: LoanId) -> Result<Vec<PaymentRecord>> {
        (**self).list_payments(loan_id)
    }

    fn bulk_replace_payments(&self, loan_id: LoanId, rows: Vec<PaymentRecord>) -> Result<()> {
        (**self).bulk_replace_payments(loan_id, rows)
    }

    fn bulk_upsert_payments(&self, loan_id: LoanId, plan: &ReconcilePlan) -> Result<()> {
        (**self).bulk_upsert_payments(loan_id, plan)
    }
}

impl<T: ContractStore + ?Sized> ContractStore for Arc<T> {
    fn contract_status(&self, loan_id: LoanId) -> Result<ContractStatus> {
        (**self).contract_status(loan_id)
    }
}

/// in-memory reference implementation of both stores
///
/// Each method holds the inner lock for its whole span, so the bulk calls
/// are atomic the way the traits require.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    loans: HashMap<LoanId, Loan>,
    payments: HashMap<LoanId, Vec<PaymentRecord>>,
    contracts: HashMap<LoanId, ContractStatus>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_loan(&self, loan: Loan) {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.contracts.entry(loan.id).or_insert(ContractStatus::Draft);
        inner.loans.insert(loan.id, loan);
    }

    pub fn set_contract_status(&self, loan_id: LoanId, status: ContractStatus) {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.contracts.insert(loan_id, status);
    }

    /// settlement collaborator's write path: status changes on existing rows only
    pub fn set_payment_status(
        &self,
        loan_id: LoanId,
        sequence_number: u32,
        status: crate::types::PaymentStatus,
    ) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let rows = inner
            .payments
            .get_mut(&loan_id)
            .ok_or(ScheduleError::LoanNotFound { loan_id })?;
        let row = rows
            .iter_mut()
            .find(|r| r.sequence_number == sequence_number)
            .ok_or(ScheduleError::PaymentNotFound {
                loan_id,
                sequence_number,
            })?;
        row.status = status;
        Ok(())
    }
}

impl LoanStore for MemoryStore {
    fn get_loan(&self, id: LoanId) -> Result<Loan> {
        let inner = self.inner.lock().expect("store lock poisoned");
        inner
            .loans
            .get(&id)
            .cloned()
            .ok_or(ScheduleError::LoanNotFound { loan_id: id })
    }

    fn update_loan(&self, id: LoanId, update: LoanUpdate) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let loan = inner
            .loans
            .get_mut(&id)
            .ok_or(ScheduleError::LoanNotFound { loan_id: id })?;
        if let Some(principal_amount) = update.principal_amount {
            loan.principal_amount = principal_amount;
        }
        if let Some(remaining_balance) = update.remaining_balance {
            loan.remaining_balance = remaining_balance;
        }
        if let Some(status) = update.status {
            loan.status = status;
        }
        if let Some(schedule_version) = update.schedule_version {
            loan.schedule_version = schedule_version;
        }
        Ok(())
    }

    fn list_payments(&self, loan_id: LoanId) -> Result<Vec<PaymentRecord>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.payments.get(&loan_id).cloned().unwrap_or_default())
    }

    fn bulk_replace_payments(&self, loan_id: LoanId, rows: Vec<PaymentRecord>) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.payments.insert(loan_id, rows);
        Ok(())
    }

    fn bulk_upsert_payments(&self, loan_id: LoanId, plan: &ReconcilePlan) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let rows = inner.payments.entry(loan_id).or_default();

        rows.retain(|r| !plan.to_delete.contains(&r.id));
        for updated in &plan.to_update {
            match rows.iter_mut().find(|r| r.id == updated.id) {
                Some(row) => *row = updated.clone(),
                None => {
                    return Err(ScheduleError::PaymentNotFound {
                        loan_id,
                        sequence_number: updated.sequence_number,
                    })
                }
            }
        }
        rows.extend(plan.to_create.iter().cloned());
        rows.sort_by_key(|r| r.sequence_number);
        Ok(())
    }
}

impl ContractStore for MemoryStore {
    fn contract_status(&self, loan_id: LoanId) -> Result<ContractStatus> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner
            .contracts
            .get(&loan_id)
            .copied()
            .unwrap_or(ContractStatus::Draft))
    }
}
