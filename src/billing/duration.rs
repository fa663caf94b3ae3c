use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::BillingPolicy;
use crate::errors::{BillingError, Result};
use crate::types::TimingClassification;

/// billable time for one rental
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillableDuration {
    /// raw time from start to return, in seconds
    pub elapsed_seconds: i64,
    /// rounded units, floor charge applied
    pub billable_units: u32,
    pub billable_minutes: i64,
    /// rounded units past the scheduled end, no floor
    pub late_units: u32,
    pub classification: TimingClassification,
}

/// converts rental times into billing units
#[derive(Debug, Clone, Copy)]
pub struct DurationCalculator {
    policy: BillingPolicy,
}

impl DurationCalculator {
    /// rejects policies whose rounding is undefined, such as a zero-length unit
    pub fn new(policy: BillingPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self { policy })
    }

    pub fn calculate(
        &self,
        start_time: DateTime<Utc>,
        scheduled_end_time: DateTime<Utc>,
        actual_return_time: DateTime<Utc>,
    ) -> Result<BillableDuration> {
        if actual_return_time < start_time {
            return Err(BillingError::InvalidTimeRange {
                start_time,
                return_time: actual_return_time,
            });
        }

        let elapsed = actual_return_time - start_time;
        let billable_units = self
            .round_to_units(elapsed)
            .max(self.policy.minimum_billable_units);

        let classification = Self::classify(scheduled_end_time, actual_return_time);
        let late_units = match classification {
            TimingClassification::Late => self.round_to_units(actual_return_time - scheduled_end_time),
            _ => 0,
        };

        Ok(BillableDuration {
            elapsed_seconds: elapsed.num_seconds(),
            billable_units,
            billable_minutes: i64::from(billable_units) * i64::from(self.policy.billing_unit_minutes),
            late_units,
            classification,
        })
    }

    pub fn classify(
        scheduled_end_time: DateTime<Utc>,
        actual_return_time: DateTime<Utc>,
    ) -> TimingClassification {
        match actual_return_time.cmp(&scheduled_end_time) {
            std::cmp::Ordering::Less => TimingClassification::Early,
            std::cmp::Ordering::Equal => TimingClassification::OnTime,
            std::cmp::Ordering::Greater => TimingClassification::Late,
        }
    }

    /// whole units, plus one more once the remainder passes the grace window
    pub fn round_to_units(&self, span: Duration) -> u32 {
        let seconds = span.num_seconds().max(0);
        let unit_seconds = i64::from(self.policy.billing_unit_minutes) * 60;
        let grace_seconds = i64::from(self.policy.grace_period_minutes) * 60;

        let mut units = seconds / unit_seconds;
        if seconds % unit_seconds > grace_seconds {
            units += 1;
        }

        u32::try_from(units).unwrap_or(u32::MAX)
    }
}

impl Default for DurationCalculator {
    fn default() -> Self {
        Self {
            policy: BillingPolicy::default(),
        }
    }
}
