use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{LoanId, LoanStatus};

/// all events emitted by the engine's lifecycle operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    ScheduleGenerated {
        loan_id: LoanId,
        version: u32,
        payment_count: usize,
        financed_amount: Money,
        timestamp: DateTime<Utc>,
    },
    ScheduleRegenerated {
        loan_id: LoanId,
        version: u32,
        payment_count: usize,
        timestamp: DateTime<Utc>,
    },
    LoanModified {
        loan_id: LoanId,
        outstanding_balance: Money,
        created: usize,
        updated: usize,
        deleted: usize,
        timestamp: DateTime<Utc>,
    },
    PaymentDeferred {
        loan_id: LoanId,
        sequence_number: u32,
        moved_to_sequence: u32,
        fee: Money,
        timestamp: DateTime<Utc>,
    },
    RemainingPaymentsStopped {
        loan_id: LoanId,
        cancelled_count: usize,
        timestamp: DateTime<Utc>,
    },
    LoanStatusChanged {
        loan_id: LoanId,
        old_status: LoanStatus,
        new_status: LoanStatus,
        timestamp: DateTime<Utc>,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
