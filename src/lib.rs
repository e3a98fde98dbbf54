pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod lifecycle;
pub mod loan;
pub mod schedule;
pub mod store;
pub mod types;

// re-export key types
pub use config::EngineConfig;
pub use decimal::{Money, Rate};
pub use errors::{Result, ScheduleError};
pub use events::{Event, EventStore};
pub use lifecycle::{GenerateRequest, LifecycleManager, ModificationRequest, ModifyOutcome};
pub use loan::{Loan, LoanUpdate};
pub use schedule::{
    AmortizationCalculator, CalendarResolver, FeeIntegrator, FeeSet, LoanSchedule,
    PaymentRecord, ReconcilePlan, ReconcilePreview, ScheduleLine, ScheduleParams,
};
pub use store::{ContractStore, LoanStore, MemoryStore};
pub use types::{
    ContractStatus, DeferralFeeOption, LoanId, LoanStatus, PaymentFrequency, PaymentId,
    PaymentStatus,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
