use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::Rate;
use crate::errors::{Result, ScheduleError};
use crate::schedule::FeeSet;
use crate::types::PaymentFrequency;

/// engine configuration
///
/// Default policy (rate, term, frequency) lives here rather than as
/// constants inside the engine; a request that leaves a parameter unset
/// falls back to these values explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub fees: FeeSet,
    pub default_annual_rate: Rate,
    pub default_num_payments: u32,
    pub default_frequency: PaymentFrequency,
    /// non-business days beyond weekends
    pub holidays: Vec<NaiveDate>,
}

impl EngineConfig {
    pub fn new(fees: FeeSet) -> Self {
        Self {
            fees,
            default_annual_rate: Rate::ZERO,
            default_num_payments: 1,
            default_frequency: PaymentFrequency::Monthly,
            holidays: Vec::new(),
        }
    }

    pub fn with_defaults(
        mut self,
        annual_rate: Rate,
        num_payments: u32,
        frequency: PaymentFrequency,
    ) -> Self {
        self.default_annual_rate = annual_rate;
        self.default_num_payments = num_payments;
        self.default_frequency = frequency;
        self
    }

    pub fn with_holidays(mut self, holidays: Vec<NaiveDate>) -> Self {
        self.holidays = holidays;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_num_payments == 0 {
            return Err(ScheduleError::invalid(
                "default_num_payments",
                "must be positive",
            ));
        }
        if self.default_annual_rate.is_negative() {
            return Err(ScheduleError::invalid(
                "default_annual_rate",
                "must not be negative",
            ));
        }
        if self.fees.brokerage_fee.is_negative()
            || self.fees.origination_fee.is_negative()
            || self.fees.deferral_fee.is_negative()
        {
            return Err(ScheduleError::invalid("fees", "fees must not be negative"));
        }
        Ok(())
    }
}
