pub mod calculator;
pub mod duration;
pub mod violations;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{RentalId, TimingClassification};

pub use calculator::{BillingCalculator, BillingInput};
pub use duration::{BillableDuration, DurationCalculator};
pub use violations::{ViolationAggregator, ViolationSummary};

/// result of one bill computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    pub rental_id: RentalId,
    /// return time this computation was based on
    pub basis_return_time: DateTime<Utc>,
    pub classification: TimingClassification,
    pub billable_duration_minutes: i64,
    pub billable_units: u32,
    pub late_units: u32,
    pub rate_per_hour: Money,
    /// already included in rental_cost
    pub late_surcharge: Money,
    pub rental_cost: Money,
    pub insurance_cost: Money,
    pub violation_cost: Money,
    pub total_bill: Money,
    pub computed_at: DateTime<Utc>,
}

impl Bill {
    /// total equals the sum of its components and nothing is negative
    pub fn is_consistent(&self) -> bool {
        let parts = [
            self.rental_cost,
            self.insurance_cost,
            self.violation_cost,
            self.total_bill,
        ];
        parts.iter().all(|m| !m.is_negative())
            && self.total_bill == self.rental_cost + self.insurance_cost + self.violation_cost
    }

    /// same charges, ignoring when the bill was computed
    pub fn same_charges(&self, other: &Bill) -> bool {
        Bill {
            computed_at: other.computed_at,
            ..self.clone()
        } == *other
    }
}
