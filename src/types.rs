use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{BillingError, Result};

/// unique identifier for a rental contract
pub type RentalId = Uuid;

/// unique identifier for a recorded violation
pub type ViolationId = Uuid;

/// vehicle identifier as issued by the fleet catalog
pub type VehicleId = String;

/// renter identifier as issued by the account service
pub type RenterId = String;

/// rental status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RentalStatus {
    /// vehicle checked out
    Active,
    /// vehicle checked in, bill not yet settled
    Returned,
    /// invoice committed, rental immutable
    Settled,
}

impl RentalStatus {
    pub fn can_transition_to(&self, next: RentalStatus) -> bool {
        matches!(
            (self, next),
            (RentalStatus::Active, RentalStatus::Returned)
                | (RentalStatus::Returned, RentalStatus::Settled)
        )
    }
}

/// deposit status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepositStatus {
    /// pre-authorized hold taken at rental start
    Held,
    /// full deposit given back, any remainder refunded
    Returned,
    /// deposit consumed to cover the bill
    Applied,
}

impl DepositStatus {
    /// only HELD may move, and only once
    pub fn can_transition_to(&self, next: DepositStatus) -> bool {
        matches!(
            (self, next),
            (DepositStatus::Held, DepositStatus::Returned) | (DepositStatus::Held, DepositStatus::Applied)
        )
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, DepositStatus::Held)
    }
}

/// how the actual return compares to the scheduled end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimingClassification {
    Early,
    OnTime,
    Late,
}

/// insurance pricing model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InsuranceModel {
    /// one fee per rental
    Flat,
    /// fee per billable hour
    PerHour,
}

/// a fine attached to a rental
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub id: ViolationId,
    pub rental_id: RentalId,
    pub description: String,
    pub fine_amount: Money,
    pub created_at: DateTime<Utc>,
}

impl Violation {
    pub fn new(
        rental_id: RentalId,
        description: impl Into<String>,
        fine_amount: Money,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        if fine_amount.is_negative() {
            return Err(BillingError::InvalidAmount { amount: fine_amount });
        }

        Ok(Self {
            id: Uuid::new_v4(),
            rental_id,
            description: description.into(),
            fine_amount,
            created_at,
        })
    }
}

/// deposit held against a rental
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deposit {
    pub rental_id: RentalId,
    pub amount: Money,
    pub status: DepositStatus,
}

impl Deposit {
    /// take a hold at rental start
    pub fn hold(rental_id: RentalId, amount: Money) -> Result<Self> {
        if amount.is_negative() {
            return Err(BillingError::InvalidAmount { amount });
        }

        Ok(Self {
            rental_id,
            amount,
            status: DepositStatus::Held,
        })
    }

    pub fn transition_to(&mut self, next: DepositStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(BillingError::DepositAlreadySettled {
                rental_id: self.rental_id,
                status: self.status,
            });
        }

        self.status = next;
        Ok(())
    }
}
