use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;

use crate::config::EngineConfig;
use crate::decimal::{Money, Rate};
use crate::errors::{Result, ScheduleError};
use crate::events::{Event, EventStore};
use crate::loan::LoanUpdate;
use crate::schedule::{
    reconcile, AmortizationCalculator, CalendarResolver, FeeIntegrator, LoanSchedule,
    PaymentRecord, ReconcilePlan, ReconcilePreview, ScheduleLine, ScheduleParams,
};
use crate::store::{ContractStore, LoanStore};
use crate::types::{
    ContractStatus, DeferralFeeOption, LoanId, LoanStatus, PaymentFrequency, PaymentStatus,
};

/// request to generate (or regenerate) a loan's schedule from scratch
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub loan_id: LoanId,
    /// amount advanced to the borrower, before the brokerage fee is folded in
    pub loan_amount: Money,
    /// first due date; must be strictly after today
    pub start_date: NaiveDate,
    /// falls back to the configured default when unset
    pub annual_rate: Option<Rate>,
    pub frequency: Option<PaymentFrequency>,
    pub num_payments: Option<u32>,
    /// payroll dates to align due dates to, when the borrower supplies them
    pub preferred_pay_dates: Option<Vec<NaiveDate>>,
}

/// request to modify a loan mid-term, preserving settled history
#[derive(Debug, Clone)]
pub struct ModificationRequest {
    pub loan_id: LoanId,
    pub frequency: PaymentFrequency,
    pub num_payments: u32,
    /// first due date of the replacement schedule; must be strictly after today
    pub start_date: NaiveDate,
    /// explicit per-period amounts overriding the level payment
    pub override_amounts: Option<Vec<Money>>,
}

/// result of a committed modification
#[derive(Debug, Clone)]
pub struct ModifyOutcome {
    pub schedule: LoanSchedule,
    pub preview: ReconcilePreview,
}

/// orchestrates the engine's lifecycle operations against the stores
///
/// Each operation locks its loan for the whole read-compute-write span, so
/// two concurrent modifications of the same loan cannot interleave and lose
/// updates. The computation itself is pure; the only side effects are the
/// single bulk write and the loan update at the end of each operation.
pub struct LifecycleManager<S: LoanStore, C: ContractStore> {
    loans: S,
    contracts: C,
    config: EngineConfig,
    locks: Mutex<HashMap<LoanId, Arc<Mutex<()>>>>,
    events: Mutex<EventStore>,
}

impl<S: LoanStore, C: ContractStore> LifecycleManager<S, C> {
    pub fn new(loans: S, contracts: C, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            loans,
            contracts,
            config,
            locks: Mutex::new(HashMap::new()),
            events: Mutex::new(EventStore::new()),
        })
    }

    /// drain events emitted since the last call
    pub fn take_events(&self) -> Vec<Event> {
        self.events.lock().expect("event lock poisoned").take_events()
    }

    fn emit(&self, event: Event) {
        self.events.lock().expect("event lock poisoned").emit(event);
    }

    fn loan_lock(&self, loan_id: LoanId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock table poisoned");
        locks.entry(loan_id).or_default().clone()
    }

    fn resolver(&self, preferred: Option<Vec<NaiveDate>>) -> CalendarResolver {
        let resolver = CalendarResolver::new(self.config.holidays.iter().copied());
        match preferred {
            Some(dates) => resolver.with_preferred_pay_dates(dates),
            None => resolver,
        }
    }

    fn check_start_date(start_date: NaiveDate, today: NaiveDate) -> Result<()> {
        if start_date <= today {
            return Err(ScheduleError::InvalidStartDate { start_date, today });
        }
        Ok(())
    }

    /// compute a fresh full schedule for a generate/regenerate request
    fn build_full_schedule(
        &self,
        req: &GenerateRequest,
        version: u32,
    ) -> Result<(LoanSchedule, Vec<PaymentRecord>, Money)> {
        let annual_rate = req.annual_rate.unwrap_or(self.config.default_annual_rate);
        let frequency = req.frequency.unwrap_or(self.config.default_frequency);
        let num_payments = req.num_payments.unwrap_or(self.config.default_num_payments);

        let financed_amount =
            FeeIntegrator::financed_amount(req.loan_amount, self.config.fees.brokerage_fee);
        let params = ScheduleParams {
            principal: financed_amount,
            annual_rate,
            frequency,
            num_payments,
        };
        params.validate()?;

        let resolver = self.resolver(req.preferred_pay_dates.clone());
        let due_dates = resolver.resolve_due_dates(frequency, req.start_date, num_payments)?;
        let lines = AmortizationCalculator::breakdown(&params, &due_dates, None)?;

        let rows: Vec<PaymentRecord> = lines
            .iter()
            .enumerate()
            .map(|(i, line)| PaymentRecord::from_line(req.loan_id, i as u32 + 1, line))
            .collect();

        let schedule = LoanSchedule {
            loan_id: req.loan_id,
            version,
            financed_amount,
            annual_rate,
            frequency,
            lines,
        };

        Ok((schedule, rows, financed_amount))
    }

    /// generate the first schedule for a pre-approved loan
    pub fn generate(
        &self,
        req: GenerateRequest,
        time: &SafeTimeProvider,
    ) -> Result<LoanSchedule> {
        let lock = self.loan_lock(req.loan_id);
        let _guard = lock.lock().expect("loan lock poisoned");

        let today = time.now().date_naive();
        let loan = self.loans.get_loan(req.loan_id)?;
        if !loan.is_open() {
            return Err(ScheduleError::LoanAlreadySettled {
                loan_id: loan.id,
                status: loan.status,
            });
        }
        if !loan.can_generate() {
            return Err(ScheduleError::invalid(
                "schedule",
                "a schedule already exists for this loan; use regenerate",
            ));
        }
        Self::check_start_date(req.start_date, today)?;

        let (schedule, rows, financed_amount) = self.build_full_schedule(&req, 1)?;

        self.loans.bulk_replace_payments(req.loan_id, rows)?;
        self.loans.update_loan(
            req.loan_id,
            LoanUpdate {
                principal_amount: Some(financed_amount),
                remaining_balance: Some(financed_amount),
                schedule_version: Some(1),
                ..LoanUpdate::default()
            },
        )?;

        self.emit(Event::ScheduleGenerated {
            loan_id: req.loan_id,
            version: 1,
            payment_count: schedule.lines.len(),
            financed_amount,
            timestamp: time.now(),
        });

        Ok(schedule)
    }

    /// rebuild the schedule from scratch, allowed only before signing
    pub fn regenerate(
        &self,
        req: GenerateRequest,
        time: &SafeTimeProvider,
    ) -> Result<LoanSchedule> {
        let lock = self.loan_lock(req.loan_id);
        let _guard = lock.lock().expect("loan lock poisoned");

        let today = time.now().date_naive();
        let loan = self.loans.get_loan(req.loan_id)?;
        if !loan.is_open() {
            return Err(ScheduleError::LoanAlreadySettled {
                loan_id: loan.id,
                status: loan.status,
            });
        }
        if self.contracts.contract_status(req.loan_id)? == ContractStatus::Signed {
            return Err(ScheduleError::ContractAlreadyFinalized { loan_id: loan.id });
        }
        if loan.schedule_version == 0 {
            return Err(ScheduleError::invalid(
                "schedule",
                "no schedule exists for this loan yet; use generate",
            ));
        }
        if loan.status != LoanStatus::PendingDisbursement {
            return Err(ScheduleError::invalid(
                "status",
                format!(
                    "a full regeneration is only allowed before disbursement, loan is {:?}",
                    loan.status
                ),
            ));
        }
        Self::check_start_date(req.start_date, today)?;

        let version = loan.schedule_version + 1;
        let (schedule, rows, financed_amount) = self.build_full_schedule(&req, version)?;

        self.loans.bulk_replace_payments(req.loan_id, rows)?;
        self.loans.update_loan(
            req.loan_id,
            LoanUpdate {
                principal_amount: Some(financed_amount),
                remaining_balance: Some(financed_amount),
                schedule_version: Some(version),
                ..LoanUpdate::default()
            },
        )?;

        self.emit(Event::ScheduleRegenerated {
            loan_id: req.loan_id,
            version,
            payment_count: schedule.lines.len(),
            timestamp: time.now(),
        });

        Ok(schedule)
    }

    /// compute a modification without committing it
    fn compute_modification(
        &self,
        req: &ModificationRequest,
        today: NaiveDate,
    ) -> Result<(ReconcilePlan, Vec<ScheduleLine>, Money)> {
        let loan = self.loans.get_loan(req.loan_id)?;
        if !loan.is_open() {
            return Err(ScheduleError::LoanAlreadySettled {
                loan_id: loan.id,
                status: loan.status,
            });
        }
        Self::check_start_date(req.start_date, today)?;

        let payments = self.loans.list_payments(req.loan_id)?;
        let failed_fees = FeeIntegrator::failed_payment_fees(
            &payments,
            self.config.fees.origination_fee,
            today,
        );
        let outstanding =
            FeeIntegrator::modification_balance(loan.remaining_balance, &failed_fees);

        let num_payments = req
            .override_amounts
            .as_ref()
            .map(|a| a.len() as u32)
            .unwrap_or(req.num_payments);
        let params = ScheduleParams {
            principal: outstanding,
            annual_rate: loan.annual_rate,
            frequency: req.frequency,
            num_payments,
        };
        params.validate()?;

        let due_dates =
            self.resolver(None)
                .resolve_due_dates(req.frequency, req.start_date, num_payments)?;
        let lines = AmortizationCalculator::breakdown(
            &params,
            &due_dates,
            req.override_amounts.as_deref(),
        )?;

        let plan = reconcile(req.loan_id, &lines, &payments, outstanding, today)?;
        Ok((plan, lines, outstanding))
    }

    /// counts and resulting balance for a confirmation UI; no side effects
    pub fn preview_modification(
        &self,
        req: &ModificationRequest,
        time: &SafeTimeProvider,
    ) -> Result<ReconcilePreview> {
        let lock = self.loan_lock(req.loan_id);
        let _guard = lock.lock().expect("loan lock poisoned");

        let today = time.now().date_naive();
        let (plan, _, _) = self.compute_modification(req, today)?;
        Ok(plan.preview())
    }

    /// modify a loan mid-term, preserving settled payment history
    pub fn modify(
        &self,
        req: ModificationRequest,
        time: &SafeTimeProvider,
    ) -> Result<ModifyOutcome> {
        let lock = self.loan_lock(req.loan_id);
        let _guard = lock.lock().expect("loan lock poisoned");

        let today = time.now().date_naive();
        let (plan, lines, outstanding) = self.compute_modification(&req, today)?;
        let preview = plan.preview();
        let loan = self.loans.get_loan(req.loan_id)?;

        self.loans.bulk_upsert_payments(req.loan_id, &plan)?;
        self.loans.update_loan(
            req.loan_id,
            LoanUpdate {
                remaining_balance: Some(plan.new_remaining_balance),
                ..LoanUpdate::default()
            },
        )?;

        self.emit(Event::LoanModified {
            loan_id: req.loan_id,
            outstanding_balance: outstanding,
            created: preview.to_create_count,
            updated: preview.to_update_count,
            deleted: preview.to_delete_count,
            timestamp: time.now(),
        });

        Ok(ModifyOutcome {
            schedule: LoanSchedule {
                loan_id: req.loan_id,
                version: loan.schedule_version,
                financed_amount: outstanding,
                annual_rate: loan.annual_rate,
                frequency: req.frequency,
                lines,
            },
            preview,
        })
    }

    /// push one pending payment to the end of the schedule
    pub fn defer_payment(
        &self,
        loan_id: LoanId,
        sequence_number: u32,
        fee: DeferralFeeOption,
        time: &SafeTimeProvider,
    ) -> Result<PaymentRecord> {
        let lock = self.loan_lock(loan_id);
        let _guard = lock.lock().expect("loan lock poisoned");

        let loan = self.loans.get_loan(loan_id)?;
        if !loan.is_open() {
            return Err(ScheduleError::LoanAlreadySettled {
                loan_id,
                status: loan.status,
            });
        }

        let payments = self.loans.list_payments(loan_id)?;
        let target = payments
            .iter()
            .find(|r| r.sequence_number == sequence_number)
            .ok_or(ScheduleError::PaymentNotFound {
                loan_id,
                sequence_number,
            })?;
        if target.status != PaymentStatus::Pending {
            return Err(ScheduleError::invalid(
                "sequence_number",
                format!(
                    "only pending payments can be deferred, payment {} is {:?}",
                    sequence_number, target.status
                ),
            ));
        }

        let mut deferred = target.clone();
        deferred.amount = Money::ZERO;
        deferred.principal_portion = Money::ZERO;
        deferred.interest_portion = Money::ZERO;
        deferred.status = PaymentStatus::Deferred;

        let fee_amount = fee.amount(self.config.fees.deferral_fee);
        let last_due = payments
            .iter()
            .map(|r| r.due_date)
            .max()
            .unwrap_or(target.due_date);
        let next_seq = payments
            .iter()
            .map(|r| r.sequence_number)
            .max()
            .unwrap_or(sequence_number)
            + 1;
        // one frequency step past the current final due date
        let moved_due = self
            .resolver(None)
            .resolve_due_dates(loan.frequency, last_due, 2)?[1];

        let moved = PaymentRecord {
            id: uuid::Uuid::new_v4(),
            loan_id,
            sequence_number: next_seq,
            due_date: moved_due,
            amount: target.amount + fee_amount,
            principal_portion: target.principal_portion + fee_amount,
            interest_portion: target.interest_portion,
            remaining_balance: target.remaining_balance,
            status: PaymentStatus::Pending,
        };
        let outcome = moved.clone();

        let new_remaining_balance = loan.remaining_balance + fee_amount;
        let plan = ReconcilePlan {
            to_update: vec![deferred],
            to_create: vec![moved],
            to_delete: Vec::new(),
            new_remaining_balance,
        };

        self.loans.bulk_upsert_payments(loan_id, &plan)?;
        if !fee_amount.is_zero() {
            self.loans.update_loan(
                loan_id,
                LoanUpdate {
                    remaining_balance: Some(new_remaining_balance),
                    ..LoanUpdate::default()
                },
            )?;
        }

        self.emit(Event::PaymentDeferred {
            loan_id,
            sequence_number,
            moved_to_sequence: next_seq,
            fee: fee_amount,
            timestamp: time.now(),
        });

        Ok(outcome)
    }

    /// cancel every remaining future payment; past and settled rows untouched
    pub fn stop_remaining(&self, loan_id: LoanId, time: &SafeTimeProvider) -> Result<usize> {
        let lock = self.loan_lock(loan_id);
        let _guard = lock.lock().expect("loan lock poisoned");

        let today = time.now().date_naive();
        let loan = self.loans.get_loan(loan_id)?;
        if !loan.is_open() {
            return Err(ScheduleError::LoanAlreadySettled {
                loan_id,
                status: loan.status,
            });
        }

        let payments = self.loans.list_payments(loan_id)?;
        let to_update: Vec<PaymentRecord> = payments
            .iter()
            .filter(|r| {
                r.due_date >= today
                    && matches!(
                        r.status,
                        PaymentStatus::Pending | PaymentStatus::Scheduled | PaymentStatus::Failed
                    )
            })
            .map(|r| {
                let mut cancelled = r.clone();
                cancelled.status = PaymentStatus::Cancelled;
                cancelled
            })
            .collect();
        let cancelled_count = to_update.len();

        let plan = ReconcilePlan {
            to_update,
            to_create: Vec::new(),
            to_delete: Vec::new(),
            new_remaining_balance: loan.remaining_balance,
        };
        self.loans.bulk_upsert_payments(loan_id, &plan)?;

        self.emit(Event::RemainingPaymentsStopped {
            loan_id,
            cancelled_count,
            timestamp: time.now(),
        });

        Ok(cancelled_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loan::Loan;
    use crate::schedule::FeeSet;
    use crate::store::MemoryStore;
    use crate::types::LoanStatus;
    use chrono::{TimeZone, Utc};
    use hourglass_rs::TimeSource;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn test_time() -> SafeTimeProvider {
        // "today" is 2025-06-02
        SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap(),
        ))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn test_config() -> EngineConfig {
        EngineConfig::new(FeeSet {
            brokerage_fee: Money::from_major(50),
            origination_fee: Money::from_major(55),
            deferral_fee: Money::from_major(50),
        })
        .with_defaults(Rate::from_percent(dec!(29)), 3, PaymentFrequency::Monthly)
    }

    fn manager() -> (
        LifecycleManager<Arc<MemoryStore>, Arc<MemoryStore>>,
        Arc<MemoryStore>,
        LoanId,
    ) {
        let store = Arc::new(MemoryStore::new());
        let loan = Loan::new(
            Uuid::new_v4(),
            Money::from_major(500),
            Rate::from_percent(dec!(29)),
            PaymentFrequency::Monthly,
            6,
        );
        let loan_id = loan.id;
        store.insert_loan(loan);
        let manager =
            LifecycleManager::new(store.clone(), store.clone(), test_config()).unwrap();
        (manager, store, loan_id)
    }

    fn generate_request(loan_id: LoanId) -> GenerateRequest {
        GenerateRequest {
            loan_id,
            loan_amount: Money::from_major(500),
            start_date: date(2025, 7, 15),
            annual_rate: None,
            frequency: None,
            num_payments: Some(6),
            preferred_pay_dates: None,
        }
    }

    #[test]
    fn test_generate_creates_pending_schedule() {
        let (manager, store, loan_id) = manager();
        let time = test_time();

        let schedule = manager.generate(generate_request(loan_id), &time).unwrap();
        // brokerage fee folded into the financed amount
        assert_eq!(schedule.financed_amount, Money::from_major(550));
        assert_eq!(schedule.lines.len(), 6);
        assert_eq!(schedule.version, 1);

        let rows = store.list_payments(loan_id).unwrap();
        assert_eq!(rows.len(), 6);
        assert!(rows.iter().all(|r| r.status == PaymentStatus::Pending));
        assert_eq!(rows[0].sequence_number, 1);
        assert_eq!(rows[5].remaining_balance, Money::ZERO);

        let loan = store.get_loan(loan_id).unwrap();
        assert_eq!(loan.principal_amount, Money::from_major(550));
        assert_eq!(loan.remaining_balance, Money::from_major(550));
        assert_eq!(loan.schedule_version, 1);

        let events = manager.take_events();
        assert!(matches!(events[0], Event::ScheduleGenerated { .. }));
    }

    #[test]
    fn test_generate_rejects_past_start_date() {
        let (manager, _, loan_id) = manager();
        let time = test_time();
        let mut req = generate_request(loan_id);
        req.start_date = date(2025, 6, 2); // today, not strictly after

        let err = manager.generate(req, &time).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidStartDate { .. }));
    }

    #[test]
    fn test_generate_twice_is_rejected() {
        let (manager, _, loan_id) = manager();
        let time = test_time();
        manager.generate(generate_request(loan_id), &time).unwrap();

        let err = manager
            .generate(generate_request(loan_id), &time)
            .unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::InvalidScheduleParameters { field: "schedule", .. }
        ));
    }

    #[test]
    fn test_invalid_parameters_leave_no_partial_writes() {
        let (manager, store, loan_id) = manager();
        let time = test_time();
        let mut req = generate_request(loan_id);
        req.num_payments = Some(0);

        assert!(manager.generate(req, &time).is_err());
        assert!(store.list_payments(loan_id).unwrap().is_empty());
        assert_eq!(store.get_loan(loan_id).unwrap().schedule_version, 0);
    }

    #[test]
    fn test_regenerate_bumps_version_and_is_idempotent() {
        let (manager, store, loan_id) = manager();
        let time = test_time();
        manager.generate(generate_request(loan_id), &time).unwrap();

        let first = manager
            .regenerate(generate_request(loan_id), &time)
            .unwrap();
        let second = manager
            .regenerate(generate_request(loan_id), &time)
            .unwrap();

        assert_eq!(first.version, 2);
        assert_eq!(second.version, 3);
        assert_eq!(first.lines, second.lines);
        assert_eq!(store.get_loan(loan_id).unwrap().schedule_version, 3);
    }

    #[test]
    fn test_regenerate_refused_on_signed_contract() {
        let (manager, store, loan_id) = manager();
        let time = test_time();
        manager.generate(generate_request(loan_id), &time).unwrap();
        store.set_contract_status(loan_id, ContractStatus::Signed);

        let err = manager
            .regenerate(generate_request(loan_id), &time)
            .unwrap_err();
        assert!(matches!(err, ScheduleError::ContractAlreadyFinalized { .. }));
    }

    #[test]
    fn test_regenerate_refused_after_disbursement() {
        let (manager, store, loan_id) = manager();
        let time = test_time();
        manager.generate(generate_request(loan_id), &time).unwrap();
        store
            .update_loan(
                loan_id,
                LoanUpdate {
                    status: Some(LoanStatus::Active),
                    ..LoanUpdate::default()
                },
            )
            .unwrap();

        let err = manager
            .regenerate(generate_request(loan_id), &time)
            .unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::InvalidScheduleParameters { field: "status", .. }
        ));
    }

    #[test]
    fn test_completed_loan_rejects_all_operations() {
        let (manager, store, loan_id) = manager();
        let time = test_time();
        manager.generate(generate_request(loan_id), &time).unwrap();
        store
            .update_loan(
                loan_id,
                LoanUpdate {
                    status: Some(LoanStatus::Completed),
                    ..LoanUpdate::default()
                },
            )
            .unwrap();

        let modify_req = ModificationRequest {
            loan_id,
            frequency: PaymentFrequency::Monthly,
            num_payments: 3,
            start_date: date(2025, 8, 1),
            override_amounts: None,
        };
        assert!(matches!(
            manager.modify(modify_req, &time).unwrap_err(),
            ScheduleError::LoanAlreadySettled { .. }
        ));
        assert!(matches!(
            manager
                .defer_payment(loan_id, 1, DeferralFeeOption::NoFee, &time)
                .unwrap_err(),
            ScheduleError::LoanAlreadySettled { .. }
        ));
        assert!(matches!(
            manager.stop_remaining(loan_id, &time).unwrap_err(),
            ScheduleError::LoanAlreadySettled { .. }
        ));
    }

    #[test]
    fn test_modify_preserves_settled_rows() {
        let (manager, store, loan_id) = manager();
        let time = test_time();
        manager.generate(generate_request(loan_id), &time).unwrap();

        // first two payments settle in the real world
        store
            .set_payment_status(loan_id, 1, PaymentStatus::Paid)
            .unwrap();
        store
            .set_payment_status(loan_id, 2, PaymentStatus::Confirmed)
            .unwrap();
        let settled_before: Vec<PaymentRecord> = store
            .list_payments(loan_id)
            .unwrap()
            .into_iter()
            .filter(|r| r.status.is_settled())
            .collect();

        let outcome = manager
            .modify(
                ModificationRequest {
                    loan_id,
                    frequency: PaymentFrequency::BiWeekly,
                    num_payments: 4,
                    start_date: date(2025, 8, 1),
                    override_amounts: None,
                },
                &time,
            )
            .unwrap();

        assert_eq!(outcome.preview.to_update_count, 4);
        assert_eq!(outcome.preview.to_delete_count, 0);

        let rows = store.list_payments(loan_id).unwrap();
        for settled in &settled_before {
            let row = rows.iter().find(|r| r.id == settled.id).unwrap();
            assert_eq!(row, settled);
        }
        // updated rows resume after the settled anchor
        assert!(rows
            .iter()
            .filter(|r| r.status == PaymentStatus::Pending)
            .all(|r| r.sequence_number >= 3));
    }

    #[test]
    fn test_modify_folds_failed_payment_fees() {
        let (manager, store, loan_id) = manager();
        let time = test_time();
        manager.generate(generate_request(loan_id), &time).unwrap();

        // make payment 1 a past failure of known size
        let mut rows = store.list_payments(loan_id).unwrap();
        rows[0].due_date = date(2025, 5, 15);
        rows[0].amount = Money::from_major(100);
        rows[0].status = PaymentStatus::Failed;
        store.bulk_replace_payments(loan_id, rows).unwrap();

        let outcome = manager
            .modify(
                ModificationRequest {
                    loan_id,
                    frequency: PaymentFrequency::Monthly,
                    num_payments: 4,
                    start_date: date(2025, 7, 15),
                    override_amounts: None,
                },
                &time,
            )
            .unwrap();

        // 550 remaining + 100 unpaid + 55 origination fee
        assert_eq!(outcome.schedule.financed_amount, Money::from_major(705));
        let principal_total: Money = outcome
            .schedule
            .lines
            .iter()
            .map(|l| l.principal_portion)
            .sum();
        assert_eq!(principal_total, Money::from_major(705));
        assert_eq!(
            store.get_loan(loan_id).unwrap().remaining_balance,
            Money::from_major(705)
        );
    }

    #[test]
    fn test_modify_sets_balance_to_outstanding() {
        let (manager, store, loan_id) = manager();
        let time = test_time();
        manager.generate(generate_request(loan_id), &time).unwrap();

        let modify_req = ModificationRequest {
            loan_id,
            frequency: PaymentFrequency::Monthly,
            num_payments: 4,
            start_date: date(2025, 7, 15),
            override_amounts: None,
        };
        manager.modify(modify_req.clone(), &time).unwrap();

        // the full re-amortized amount is still owed after the modification
        let loan = store.get_loan(loan_id).unwrap();
        assert_eq!(loan.remaining_balance, Money::from_major(550));

        // and a follow-up modification re-amortizes from that balance
        let outcome = manager.modify(modify_req, &time).unwrap();
        assert_eq!(outcome.schedule.financed_amount, Money::from_major(550));
        assert_eq!(
            store.get_loan(loan_id).unwrap().remaining_balance,
            Money::from_major(550)
        );
    }

    #[test]
    fn test_preview_has_no_side_effects() {
        let (manager, store, loan_id) = manager();
        let time = test_time();
        manager.generate(generate_request(loan_id), &time).unwrap();
        let before = store.list_payments(loan_id).unwrap();

        let preview = manager
            .preview_modification(
                &ModificationRequest {
                    loan_id,
                    frequency: PaymentFrequency::Monthly,
                    num_payments: 3,
                    start_date: date(2025, 8, 1),
                    override_amounts: None,
                },
                &time,
            )
            .unwrap();

        assert_eq!(preview.to_update_count, 3);
        assert_eq!(preview.to_delete_count, 3);
        assert_eq!(store.list_payments(loan_id).unwrap(), before);
    }

    #[test]
    fn test_defer_payment_moves_amount_to_end() {
        let (manager, store, loan_id) = manager();
        let time = test_time();
        manager.generate(generate_request(loan_id), &time).unwrap();

        let original = store.list_payments(loan_id).unwrap()[1].clone();
        let moved = manager
            .defer_payment(
                loan_id,
                2,
                DeferralFeeOption::AddToMovedPayment(Money::from_major(50)),
                &time,
            )
            .unwrap();

        assert_eq!(moved.sequence_number, 7);
        assert_eq!(moved.amount, original.amount + Money::from_major(50));
        assert_eq!(moved.status, PaymentStatus::Pending);

        let rows = store.list_payments(loan_id).unwrap();
        let deferred = rows.iter().find(|r| r.sequence_number == 2).unwrap();
        assert_eq!(deferred.status, PaymentStatus::Deferred);
        assert_eq!(deferred.amount, Money::ZERO);
        assert!(moved.due_date > rows[5].due_date || rows.len() == 7);

        // deferral fee momentarily carried on the balance
        let loan = store.get_loan(loan_id).unwrap();
        assert_eq!(
            loan.remaining_balance,
            Money::from_major(550) + Money::from_major(50)
        );
    }

    #[test]
    fn test_defer_configured_fee_comes_from_config() {
        let (manager, store, loan_id) = manager();
        let time = test_time();
        manager.generate(generate_request(loan_id), &time).unwrap();

        let original = store.list_payments(loan_id).unwrap()[0].clone();
        let moved = manager
            .defer_payment(loan_id, 1, DeferralFeeOption::ConfiguredFee, &time)
            .unwrap();

        // config's deferral fee is $50
        assert_eq!(moved.amount, original.amount + Money::from_major(50));
        assert_eq!(
            store.get_loan(loan_id).unwrap().remaining_balance,
            Money::from_major(600)
        );
    }

    #[test]
    fn test_defer_rejects_non_pending_rows() {
        let (manager, store, loan_id) = manager();
        let time = test_time();
        manager.generate(generate_request(loan_id), &time).unwrap();
        store
            .set_payment_status(loan_id, 2, PaymentStatus::Confirmed)
            .unwrap();

        let err = manager
            .defer_payment(loan_id, 2, DeferralFeeOption::NoFee, &time)
            .unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::InvalidScheduleParameters { field: "sequence_number", .. }
        ));
    }

    #[test]
    fn test_stop_remaining_cancels_only_future_rows() {
        let (manager, store, loan_id) = manager();
        let time = test_time();
        manager.generate(generate_request(loan_id), &time).unwrap();

        // settle one, fail one in the past
        store
            .set_payment_status(loan_id, 1, PaymentStatus::Paid)
            .unwrap();
        let mut rows = store.list_payments(loan_id).unwrap();
        rows[1].due_date = date(2025, 5, 1);
        rows[1].status = PaymentStatus::Failed;
        store.bulk_replace_payments(loan_id, rows).unwrap();

        let cancelled = manager.stop_remaining(loan_id, &time).unwrap();
        assert_eq!(cancelled, 4);

        let rows = store.list_payments(loan_id).unwrap();
        assert_eq!(rows[0].status, PaymentStatus::Paid);
        assert_eq!(rows[1].status, PaymentStatus::Failed); // past failure untouched
        assert!(rows[2..]
            .iter()
            .all(|r| r.status == PaymentStatus::Cancelled));
    }
}
