use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::types::{RentalId, Violation};

/// fines counted toward a bill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationSummary {
    pub total: Money,
    pub counted: usize,
    /// recorded after the cutoff, left for a later bill or adjustment
    pub deferred: usize,
}

pub struct ViolationAggregator;

impl ViolationAggregator {
    /// sum fines recorded at or before `cutoff`
    pub fn summarize(
        rental_id: RentalId,
        violations: &[Violation],
        cutoff: DateTime<Utc>,
    ) -> Result<ViolationSummary> {
        let mut summary = ViolationSummary {
            total: Money::ZERO,
            counted: 0,
            deferred: 0,
        };

        for violation in violations {
            if violation.rental_id != rental_id {
                return Err(BillingError::RentalMismatch {
                    expected: rental_id,
                    found: violation.rental_id,
                });
            }

            if violation.created_at <= cutoff {
                summary.total += violation.fine_amount;
                summary.counted += 1;
            } else {
                summary.deferred += 1;
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_empty_is_zero() {
        let summary = ViolationAggregator::summarize(Uuid::new_v4(), &[], at(12, 0)).unwrap();
        assert_eq!(summary.total, Money::ZERO);
        assert_eq!(summary.counted, 0);
    }

    #[test]
    fn test_cutoff_defers_late_entries() {
        let rental_id = Uuid::new_v4();
        let violations = vec![
            Violation::new(rental_id, "red light", Money::from_major(200_000), at(10, 0)).unwrap(),
            Violation::new(rental_id, "dirty interior", Money::from_major(50_000), at(12, 0)).unwrap(),
            Violation::new(rental_id, "scratch", Money::from_major(300_000), at(12, 1)).unwrap(),
        ];

        let summary = ViolationAggregator::summarize(rental_id, &violations, at(12, 0)).unwrap();
        assert_eq!(summary.total, Money::from_major(250_000));
        assert_eq!(summary.counted, 2);
        assert_eq!(summary.deferred, 1);

        let everything = ViolationAggregator::summarize(rental_id, &violations, at(23, 59)).unwrap();
        assert_eq!(everything.total, Money::from_major(550_000));
        assert_eq!(everything.deferred, 0);
    }

    #[test]
    fn test_foreign_violation_rejected() {
        let rental_id = Uuid::new_v4();
        let other = Violation::new(Uuid::new_v4(), "speeding", Money::from_major(1), at(10, 0)).unwrap();

        let result = ViolationAggregator::summarize(rental_id, &[other], at(12, 0));
        assert!(matches!(result, Err(BillingError::RentalMismatch { .. })));
    }
}
