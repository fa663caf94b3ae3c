use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{BillingConfig, InsurancePolicy, RateCard};
use crate::decimal::{Money, Multiplier};
use crate::errors::{BillingError, Result};
use crate::state::Rental;
use crate::types::VehicleId;

/// source of vehicle pricing
#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn get_rate(&self, vehicle_id: &VehicleId) -> Result<RateCard>;
}

/// pricing in effect for one rental's bill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRate {
    pub rate_per_hour: Money,
    pub insurance: InsurancePolicy,
    pub late_multiplier: Multiplier,
}

impl ResolvedRate {
    /// the contracted hourly price on the rental wins over the catalog price;
    /// insurance and late surcharge come from the card
    pub fn resolve(rental: &Rental, card: &RateCard) -> Self {
        Self {
            rate_per_hour: rental.rate_per_hour,
            insurance: card.insurance,
            late_multiplier: card.late_multiplier,
        }
    }
}

/// static price list keyed by vehicle, with a fallback card
#[derive(Debug, Clone)]
pub struct RateTable {
    default_rate: Option<RateCard>,
    vehicle_rates: HashMap<VehicleId, RateCard>,
}

impl RateTable {
    pub fn new(default_rate: Option<RateCard>) -> Self {
        Self {
            default_rate,
            vehicle_rates: HashMap::new(),
        }
    }

    pub fn from_config(config: &BillingConfig) -> Self {
        Self {
            default_rate: Some(config.default_rate),
            vehicle_rates: config.vehicle_rates.clone(),
        }
    }

    pub fn insert(&mut self, vehicle_id: impl Into<VehicleId>, card: RateCard) {
        self.vehicle_rates.insert(vehicle_id.into(), card);
    }

    pub fn lookup(&self, vehicle_id: &VehicleId) -> Result<RateCard> {
        self.vehicle_rates
            .get(vehicle_id)
            .or(self.default_rate.as_ref())
            .copied()
            .ok_or_else(|| BillingError::RateNotFound {
                vehicle_id: vehicle_id.clone(),
            })
    }
}

#[async_trait]
impl RateProvider for RateTable {
    async fn get_rate(&self, vehicle_id: &VehicleId) -> Result<RateCard> {
        self.lookup(vehicle_id)
    }
}
