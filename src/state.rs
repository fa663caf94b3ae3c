use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::billing::Bill;
use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::settlement::SettlementOutcome;
use crate::types::{RentalId, RentalStatus, RenterId, VehicleId};

/// rental contract state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rental {
    pub id: RentalId,
    pub vehicle_id: VehicleId,
    pub renter_id: RenterId,
    pub rate_per_hour: Money,
    pub start_time: DateTime<Utc>,
    pub scheduled_end_time: DateTime<Utc>,
    pub actual_return_time: Option<DateTime<Utc>>,
    pub status: RentalStatus,
}

impl Rental {
    pub fn builder() -> RentalBuilder {
        RentalBuilder::new()
    }

    /// check the vehicle in
    pub fn mark_returned(&mut self, actual_return_time: DateTime<Utc>) -> Result<()> {
        if actual_return_time < self.start_time {
            return Err(BillingError::InvalidTimeRange {
                start_time: self.start_time,
                return_time: actual_return_time,
            });
        }

        self.transition_to(RentalStatus::Returned)?;
        self.actual_return_time = Some(actual_return_time);
        Ok(())
    }

    pub fn transition_to(&mut self, next: RentalStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(BillingError::InvalidStateTransition {
                from: format!("{:?}", self.status),
                to: format!("{:?}", next),
            });
        }

        self.status = next;
        Ok(())
    }

    pub fn is_settled(&self) -> bool {
        self.status == RentalStatus::Settled
    }
}

/// builder for rental records
#[derive(Debug, Default)]
pub struct RentalBuilder {
    id: Option<RentalId>,
    vehicle_id: Option<VehicleId>,
    renter_id: Option<RenterId>,
    rate_per_hour: Option<Money>,
    start_time: Option<DateTime<Utc>>,
    scheduled_end_time: Option<DateTime<Utc>>,
}

impl RentalBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: RentalId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn vehicle_id(mut self, vehicle_id: impl Into<VehicleId>) -> Self {
        self.vehicle_id = Some(vehicle_id.into());
        self
    }

    pub fn renter_id(mut self, renter_id: impl Into<RenterId>) -> Self {
        self.renter_id = Some(renter_id.into());
        self
    }

    pub fn rate_per_hour(mut self, rate: Money) -> Self {
        self.rate_per_hour = Some(rate);
        self
    }

    pub fn start_time(mut self, start: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self
    }

    pub fn scheduled_end_time(mut self, end: DateTime<Utc>) -> Self {
        self.scheduled_end_time = Some(end);
        self
    }

    /// build an ACTIVE rental
    pub fn build(self) -> Result<Rental> {
        let vehicle_id = self.vehicle_id.ok_or(BillingError::InvalidConfiguration {
            message: "vehicle id required".to_string(),
        })?;

        let rate_per_hour = self.rate_per_hour.ok_or(BillingError::InvalidConfiguration {
            message: "rate per hour required".to_string(),
        })?;
        if !rate_per_hour.is_positive() {
            return Err(BillingError::InvalidRate { rate: rate_per_hour });
        }

        let start_time = self.start_time.ok_or(BillingError::InvalidConfiguration {
            message: "start time required".to_string(),
        })?;

        let scheduled_end_time = self.scheduled_end_time.ok_or(BillingError::InvalidConfiguration {
            message: "scheduled end time required".to_string(),
        })?;
        if scheduled_end_time < start_time {
            return Err(BillingError::InvalidTimeRange {
                start_time,
                return_time: scheduled_end_time,
            });
        }

        let renter_id = self.renter_id.unwrap_or_else(|| {
            format!("RENTER-{}", Uuid::new_v4().to_string()[..8].to_uppercase())
        });

        Ok(Rental {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            vehicle_id,
            renter_id,
            rate_per_hour,
            start_time,
            scheduled_end_time,
            actual_return_time: None,
            status: RentalStatus::Active,
        })
    }
}

/// permanent invoice written when a billing session is finalized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub bill: Bill,
    pub settlement: SettlementOutcome,
    pub finalized_at: DateTime<Utc>,
}

impl Invoice {
    pub fn issue(bill: Bill, settlement: SettlementOutcome, finalized_at: DateTime<Utc>) -> Self {
        Self {
            invoice_id: Uuid::new_v4(),
            bill,
            settlement,
            finalized_at,
        }
    }

    pub fn rental_id(&self) -> RentalId {
        self.bill.rental_id
    }
}
