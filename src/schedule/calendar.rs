use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::BTreeSet;

use crate::errors::{Result, ScheduleError};
use crate::types::PaymentFrequency;

/// resolves the ordered sequence of due dates for a schedule
///
/// Dates are produced on a naive frequency grid anchored at the start date,
/// then shifted off weekends and holidays. The shift rule: move forward one
/// day at a time; if moving forward would reach the next grid date, move
/// backward from the grid date instead. The rule is a pure function of the
/// grid, so resolving twice with the same inputs yields the same dates.
#[derive(Debug, Clone, Default)]
pub struct CalendarResolver {
    holidays: BTreeSet<NaiveDate>,
    preferred_pay_dates: Vec<NaiveDate>,
}

impl CalendarResolver {
    pub fn new(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
            preferred_pay_dates: Vec::new(),
        }
    }

    /// align due dates to the borrower's payroll dates instead of the raw grid
    pub fn with_preferred_pay_dates(mut self, mut dates: Vec<NaiveDate>) -> Self {
        dates.sort_unstable();
        dates.dedup();
        self.preferred_pay_dates = dates;
        self
    }

    /// produce `count` ordered due dates starting from `start_date`
    pub fn resolve_due_dates(
        &self,
        frequency: PaymentFrequency,
        start_date: NaiveDate,
        count: u32,
    ) -> Result<Vec<NaiveDate>> {
        if count == 0 {
            return Err(ScheduleError::invalid(
                "num_payments",
                "payment count must be positive",
            ));
        }

        let grid = naive_grid(frequency, start_date, count);

        let mut resolved = Vec::with_capacity(grid.len());
        for (i, &date) in grid.iter().enumerate() {
            let next_grid = grid.get(i + 1).copied();
            let due = if self.preferred_pay_dates.is_empty() {
                self.shift_to_business_day(date, next_grid)
            } else {
                self.align_to_preferred(date, resolved.last().copied(), next_grid)
            };
            resolved.push(due);
        }

        Ok(resolved)
    }

    fn is_business_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    /// shift a grid date off weekends/holidays per the documented rule
    fn shift_to_business_day(&self, date: NaiveDate, next_grid: Option<NaiveDate>) -> NaiveDate {
        if self.is_business_day(date) {
            return date;
        }

        let mut forward = date;
        loop {
            forward += Duration::days(1);
            if self.is_business_day(forward) {
                break;
            }
        }

        let collides = next_grid.map(|next| forward >= next).unwrap_or(false);
        if !collides {
            return forward;
        }

        let mut backward = date;
        loop {
            backward -= Duration::days(1);
            if self.is_business_day(backward) {
                break;
            }
        }
        backward
    }

    /// snap a grid date to the nearest preferred pay date on/after it
    fn align_to_preferred(
        &self,
        date: NaiveDate,
        previous: Option<NaiveDate>,
        next_grid: Option<NaiveDate>,
    ) -> NaiveDate {
        let floor = previous
            .map(|p| p + Duration::days(1))
            .unwrap_or(date)
            .max(date);

        match self
            .preferred_pay_dates
            .iter()
            .copied()
            .find(|&p| p >= floor)
        {
            Some(preferred) => preferred,
            // preferred list exhausted: fall back to the shifted grid date
            None => {
                let shifted = self.shift_to_business_day(date, next_grid);
                previous
                    .map(|p| shifted.max(p + Duration::days(1)))
                    .unwrap_or(shifted)
            }
        }
    }
}

/// naive (unshifted) due-date grid for a frequency
fn naive_grid(frequency: PaymentFrequency, start_date: NaiveDate, count: u32) -> Vec<NaiveDate> {
    match frequency {
        PaymentFrequency::Weekly => interval_grid(start_date, count, 7),
        PaymentFrequency::BiWeekly => interval_grid(start_date, count, 14),
        PaymentFrequency::SemiMonthly => semi_monthly_grid(start_date, count),
        PaymentFrequency::Monthly => monthly_grid(start_date, count),
    }
}

fn interval_grid(start_date: NaiveDate, count: u32, days: i64) -> Vec<NaiveDate> {
    (0..count)
        .map(|i| start_date + Duration::days(days * i as i64))
        .collect()
}

/// same day-of-month as the start, clamped to the target month's length
fn monthly_grid(start_date: NaiveDate, count: u32) -> Vec<NaiveDate> {
    let anchor_day = start_date.day();
    (0..count)
        .map(|i| {
            let months = start_date.month0() + i;
            let year = start_date.year() + (months / 12) as i32;
            let month = months % 12 + 1;
            let day = anchor_day.min(days_in_month(year, month));
            NaiveDate::from_ymd_opt(year, month, day).expect("clamped day is always valid")
        })
        .collect()
}

/// 15th and last-day-of-month marks, starting at the first mark on/after start
fn semi_monthly_grid(start_date: NaiveDate, count: u32) -> Vec<NaiveDate> {
    let mut marks = Vec::with_capacity(count as usize);
    let mut year = start_date.year();
    let mut month = start_date.month();

    while marks.len() < count as usize {
        let mid = NaiveDate::from_ymd_opt(year, month, 15).expect("day 15 is always valid");
        let last = NaiveDate::from_ymd_opt(year, month, days_in_month(year, month))
            .expect("last day is always valid");
        for mark in [mid, last] {
            if mark >= start_date && marks.len() < count as usize {
                marks.push(mark);
            }
        }
        if month == 12 {
            month = 1;
            year += 1;
        } else {
            month += 1;
        }
    }

    marks
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 30,
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}
