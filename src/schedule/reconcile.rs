use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::decimal::Money;
use crate::errors::{Result, ScheduleError};
use crate::schedule::{PaymentRecord, ScheduleLine};
use crate::types::{LoanId, PaymentId, PaymentStatus};

/// create/update/delete sets produced by one reconciliation
///
/// The plan is a pure computation; applying it is the store's single atomic
/// `bulk_upsert_payments` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub to_update: Vec<PaymentRecord>,
    pub to_create: Vec<PaymentRecord>,
    pub to_delete: Vec<PaymentId>,
    pub new_remaining_balance: Money,
}

impl ReconcilePlan {
    /// counts and resulting balance for confirmation UIs
    pub fn preview(&self) -> ReconcilePreview {
        ReconcilePreview {
            to_create_count: self.to_create.len(),
            to_update_count: self.to_update.len(),
            to_delete_count: self.to_delete.len(),
            new_remaining_balance: self.new_remaining_balance,
        }
    }
}

/// what a caller shows before committing a modification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilePreview {
    pub to_create_count: usize,
    pub to_update_count: usize,
    pub to_delete_count: usize,
    pub new_remaining_balance: Money,
}

/// a row the reconciler may rewrite: still pending/scheduled, or a failure
/// reported ahead of a due date that has not arrived yet
fn is_open(row: &PaymentRecord, today: NaiveDate) -> bool {
    row.status.is_engine_mutable()
        || (row.status == PaymentStatus::Failed && row.due_date >= today)
}

/// diff a freshly computed schedule against persisted rows
///
/// Rows fall into three classes. Settled rows (confirmed/paid/manual/rebate)
/// are immutable history. Open rows (pending/scheduled, or a failure whose
/// due date has not arrived) may be rewritten or deleted. Everything else
/// (past failures, missed, collected, authorized, deferred, cancelled) is
/// frozen: kept in place, never touched.
///
/// New sequence numbers resume after the last immutable (settled or frozen)
/// row. Sequence numbers up to that anchor must all be occupied by immutable
/// rows; a gap, or an open row sitting below the anchor, means the persisted
/// numbering no longer matches the settled-history assumptions and is
/// surfaced as a conflict rather than guessed around.
///
/// `outstanding_balance` is the amount the new lines re-amortize; it becomes
/// the loan's remaining balance once the plan is applied.
pub fn reconcile(
    loan_id: LoanId,
    new_lines: &[ScheduleLine],
    existing: &[PaymentRecord],
    outstanding_balance: Money,
    today: NaiveDate,
) -> Result<ReconcilePlan> {
    let mut seen = BTreeSet::new();
    for row in existing {
        if !seen.insert(row.sequence_number) {
            return Err(ScheduleError::ReconciliationConflict {
                message: format!(
                    "duplicate sequence number {} among existing payments",
                    row.sequence_number
                ),
            });
        }
    }

    let immutable_seqs: BTreeSet<u32> = existing
        .iter()
        .filter(|r| !is_open(r, today))
        .map(|r| r.sequence_number)
        .collect();
    let anchor = immutable_seqs.iter().next_back().copied().unwrap_or(0);

    for seq in 1..=anchor {
        if !immutable_seqs.contains(&seq) {
            return Err(ScheduleError::ReconciliationConflict {
                message: format!(
                    "sequence number {} below the settled anchor {} is not immutable history",
                    seq, anchor
                ),
            });
        }
    }

    let open_by_seq: BTreeMap<u32, &PaymentRecord> = existing
        .iter()
        .filter(|r| is_open(r, today))
        .map(|r| (r.sequence_number, r))
        .collect();

    let covered_last = anchor + new_lines.len() as u32;
    let mut to_update = Vec::new();
    let mut to_create = Vec::new();

    for (index, line) in new_lines.iter().enumerate() {
        let sequence_number = anchor + index as u32 + 1;
        match open_by_seq.get(&sequence_number) {
            Some(open) => {
                let mut updated = (*open).clone();
                updated.due_date = line.due_date;
                updated.amount = line.amount;
                updated.principal_portion = line.principal_portion;
                updated.interest_portion = line.interest_portion;
                updated.remaining_balance = line.remaining_balance;
                // a rewritten row represents a fresh obligation
                updated.status = PaymentStatus::Pending;
                to_update.push(updated);
            }
            None => {
                to_create.push(PaymentRecord::from_line(loan_id, sequence_number, line));
            }
        }
    }

    let to_delete: Vec<PaymentId> = open_by_seq
        .iter()
        .filter(|(&seq, _)| seq > covered_last)
        .map(|(_, row)| row.id)
        .collect();

    Ok(ReconcilePlan {
        to_update,
        to_create,
        to_delete,
        new_remaining_balance: outstanding_balance,
    })
}
