use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::decimal::{Money, Rate};
use crate::errors::{Result, ScheduleError};
use crate::schedule::ScheduleLine;
use crate::types::PaymentFrequency;

/// inputs to one schedule computation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleParams {
    /// total financed amount (loan amount plus brokerage fee)
    pub principal: Money,
    pub annual_rate: Rate,
    pub frequency: PaymentFrequency,
    pub num_payments: u32,
}

impl ScheduleParams {
    /// reject invalid numeric inputs before any computation happens
    pub fn validate(&self) -> Result<()> {
        if !self.principal.is_positive() {
            return Err(ScheduleError::invalid(
                "principal",
                format!("must be positive, got {}", self.principal),
            ));
        }
        if self.annual_rate.is_negative() {
            return Err(ScheduleError::invalid(
                "annual_rate",
                format!("must not be negative, got {}", self.annual_rate),
            ));
        }
        if self.num_payments == 0 {
            return Err(ScheduleError::invalid(
                "num_payments",
                "must be positive",
            ));
        }
        Ok(())
    }

    fn periodic_rate(&self) -> Decimal {
        self.annual_rate.periodic(self.frequency.periods_per_year())
    }
}

/// level-payment amortization over a fixed number of periods
pub struct AmortizationCalculator;

impl AmortizationCalculator {
    /// level periodic payment: `P * r / (1 - (1+r)^-n)`, or `P / n` at zero rate
    pub fn payment_amount(params: &ScheduleParams) -> Result<Money> {
        params.validate()?;

        let r = params.periodic_rate();
        let n = params.num_payments;

        if r.is_zero() {
            return Ok(params.principal / Decimal::from(n));
        }

        // (1+r)^n by iterated multiplication keeps everything in Decimal
        let mut compound = Decimal::ONE;
        let base = Decimal::ONE + r;
        for _ in 0..n {
            compound *= base;
        }

        let numerator = params.principal.as_decimal() * r * compound;
        let denominator = compound - Decimal::ONE;

        Ok(Money::from_decimal(numerator / denominator))
    }

    /// full interest/principal/balance breakdown, one line per due date
    ///
    /// `override_amounts`, when supplied, replaces the level payment with an
    /// explicit per-period amount (used by modifications that carry a custom
    /// schedule); interest is still charged on the running balance.
    ///
    /// The final line absorbs the rounding residual: its principal is forced
    /// to the remaining balance and its balance to exactly zero, so the
    /// principal portions always sum to the financed amount.
    pub fn breakdown(
        params: &ScheduleParams,
        due_dates: &[NaiveDate],
        override_amounts: Option<&[Money]>,
    ) -> Result<Vec<ScheduleLine>> {
        params.validate()?;

        if due_dates.len() != params.num_payments as usize {
            return Err(ScheduleError::invalid(
                "due_dates",
                format!(
                    "expected {} due dates, got {}",
                    params.num_payments,
                    due_dates.len()
                ),
            ));
        }
        if let Some(amounts) = override_amounts {
            if amounts.len() != params.num_payments as usize {
                return Err(ScheduleError::invalid(
                    "override_amounts",
                    format!(
                        "expected {} amounts, got {}",
                        params.num_payments,
                        amounts.len()
                    ),
                ));
            }
        }

        let r = params.periodic_rate();
        let level_payment = Self::payment_amount(params)?;

        let mut lines = Vec::with_capacity(due_dates.len());
        let mut balance = params.principal;

        for (i, &due_date) in due_dates.iter().enumerate() {
            let period = i as u32 + 1;
            let is_last = period == params.num_payments;

            let interest_portion = Money::from_decimal(balance.as_decimal() * r);
            let amount = override_amounts
                .map(|a| a[i])
                .unwrap_or(level_payment);

            let (amount, principal_portion, ending_balance) = if is_last {
                // absorb the rounding residual into the final line
                let principal_portion = balance;
                (principal_portion + interest_portion, principal_portion, Money::ZERO)
            } else {
                let principal_portion = amount - interest_portion;
                (amount, principal_portion, balance - principal_portion)
            };

            lines.push(ScheduleLine {
                period,
                due_date,
                amount,
                principal_portion,
                interest_portion,
                remaining_balance: ending_balance,
            });

            balance = ending_balance;
        }

        Ok(lines)
    }
}
