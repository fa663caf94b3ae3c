use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::decimal::Money;
use crate::types::{DepositStatus, RentalId, RentalStatus, VehicleId};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BillingError {
    #[error("invalid time range: return {return_time} precedes start {start_time}")]
    InvalidTimeRange {
        start_time: DateTime<Utc>,
        return_time: DateTime<Utc>,
    },

    #[error("invalid rate: {rate} per hour")]
    InvalidRate {
        rate: Money,
    },

    #[error("billing session for rental {rental_id} is already finalized")]
    SessionFinalized {
        rental_id: RentalId,
    },

    #[error("no bill has been computed for rental {rental_id}")]
    NoDraftBill {
        rental_id: RentalId,
    },

    #[error("deposit for rental {rental_id} already settled: status is {status:?}")]
    DepositAlreadySettled {
        rental_id: RentalId,
        status: DepositStatus,
    },

    #[error("concurrent settlement on rental {rental_id}: rental {rental_status:?}, deposit {deposit_status:?}")]
    ConcurrentSettlement {
        rental_id: RentalId,
        rental_status: RentalStatus,
        deposit_status: DepositStatus,
    },

    #[error("violations on rental {rental_id} changed before settlement: billed {billed}, recorded {recorded}")]
    ViolationsChanged {
        rental_id: RentalId,
        billed: usize,
        recorded: usize,
    },

    #[error("rental {rental_id} not returned: current status is {status:?}")]
    RentalNotReturned {
        rental_id: RentalId,
        status: RentalStatus,
    },

    #[error("rental not found: {rental_id}")]
    RentalNotFound {
        rental_id: RentalId,
    },

    #[error("no deposit held for rental {rental_id}")]
    DepositNotFound {
        rental_id: RentalId,
    },

    #[error("no rate card for vehicle {vehicle_id}")]
    RateNotFound {
        vehicle_id: VehicleId,
    },

    #[error("record belongs to rental {found}, expected {expected}")]
    RentalMismatch {
        expected: RentalId,
        found: RentalId,
    },

    #[error("invalid amount: {amount}")]
    InvalidAmount {
        amount: Money,
    },

    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: String,
        to: String,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },

    #[error("store error: {message}")]
    Store {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, BillingError>;
