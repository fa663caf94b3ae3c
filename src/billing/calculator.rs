use chrono::{DateTime, Utc};

use crate::config::BillingPolicy;
use crate::errors::{BillingError, Result};
use crate::rates::ResolvedRate;
use crate::state::Rental;
use crate::types::{InsuranceModel, Violation};

use super::{Bill, DurationCalculator, ViolationAggregator};

/// everything one bill computation depends on
#[derive(Debug, Clone, Copy)]
pub struct BillingInput<'a> {
    pub rental: &'a Rental,
    pub rate: ResolvedRate,
    pub violations: &'a [Violation],
    pub basis_return_time: DateTime<Utc>,
    /// stamped on the bill and used as the violation cutoff
    pub computed_at: DateTime<Utc>,
}

/// pure bill computation; never reads a clock
#[derive(Debug, Clone, Copy)]
pub struct BillingCalculator {
    durations: DurationCalculator,
}

impl BillingCalculator {
    pub fn new(policy: BillingPolicy) -> Result<Self> {
        Ok(Self {
            durations: DurationCalculator::new(policy)?,
        })
    }

    pub fn calculate(&self, input: &BillingInput<'_>) -> Result<Bill> {
        let rate = &input.rate;
        if !rate.rate_per_hour.is_positive() {
            return Err(BillingError::InvalidRate {
                rate: rate.rate_per_hour,
            });
        }
        if rate.insurance.insurance_rate.is_negative() || rate.late_multiplier.is_negative() {
            return Err(BillingError::InvalidConfiguration {
                message: format!(
                    "insurance rate {} and late multiplier {} must not be negative",
                    rate.insurance.insurance_rate, rate.late_multiplier
                ),
            });
        }

        let rental = input.rental;
        let duration = self.durations.calculate(
            rental.start_time,
            rental.scheduled_end_time,
            input.basis_return_time,
        )?;

        // late hours are already in the base charge; the surcharge only adds on top
        let base_cost = rate.rate_per_hour.times(duration.billable_units);
        let late_surcharge = rate.rate_per_hour.times(duration.late_units) * rate.late_multiplier;
        let rental_cost = base_cost + late_surcharge;

        let insurance_cost = match rate.insurance.insurance_model {
            InsuranceModel::Flat => rate.insurance.insurance_rate,
            InsuranceModel::PerHour => rate.insurance.insurance_rate.times(duration.billable_units),
        };

        let violations = ViolationAggregator::summarize(rental.id, input.violations, input.computed_at)?;
        let violation_cost = violations.total;

        Ok(Bill {
            rental_id: rental.id,
            basis_return_time: input.basis_return_time,
            classification: duration.classification,
            billable_duration_minutes: duration.billable_minutes,
            billable_units: duration.billable_units,
            late_units: duration.late_units,
            rate_per_hour: rate.rate_per_hour,
            late_surcharge,
            rental_cost,
            insurance_cost,
            violation_cost,
            total_bill: rental_cost + insurance_cost + violation_cost,
            computed_at: input.computed_at,
        })
    }
}

impl Default for BillingCalculator {
    fn default() -> Self {
        Self {
            durations: DurationCalculator::default(),
        }
    }
}
