use std::sync::Arc;

use hourglass_rs::SafeTimeProvider;
use tracing::info;

use crate::billing::BillingCalculator;
use crate::config::{BillingConfig, BillingPolicy};
use crate::errors::{BillingError, Result};
use crate::rates::{RateProvider, RateTable, ResolvedRate};
use crate::session::BillingSession;
use crate::store::RentalStore;
use crate::types::{RentalId, RentalStatus};

/// entry point for the payment flow: loads records and hands out sessions
pub struct BillingService {
    store: Arc<dyn RentalStore>,
    rates: Arc<dyn RateProvider>,
    calculator: BillingCalculator,
}

impl BillingService {
    pub fn new(
        store: Arc<dyn RentalStore>,
        rates: Arc<dyn RateProvider>,
        policy: BillingPolicy,
    ) -> Result<Self> {
        Ok(Self {
            store,
            rates,
            calculator: BillingCalculator::new(policy)?,
        })
    }

    /// service priced from the config's rate table
    pub fn from_config(store: Arc<dyn RentalStore>, config: &BillingConfig) -> Result<Self> {
        config.validate()?;
        Self::new(store, Arc::new(RateTable::from_config(config)), config.policy)
    }

    /// load the rental, its deposit, violations and rate, and open a draft session;
    /// any load failure aborts without a session
    pub async fn open_billing_session(
        &self,
        rental_id: &RentalId,
        time_provider: &SafeTimeProvider,
    ) -> Result<BillingSession> {
        let rental = self.store.get_rental(rental_id).await?;
        if rental.status != RentalStatus::Returned {
            return Err(BillingError::RentalNotReturned {
                rental_id: rental.id,
                status: rental.status,
            });
        }

        let deposit = self.store.get_deposit(rental_id).await?;
        let violations = self.store.list_violations(rental_id).await?;
        let card = self.rates.get_rate(&rental.vehicle_id).await?;
        let rate = ResolvedRate::resolve(&rental, &card);

        info!(
            "Loaded rental {} on vehicle {} with {} violation(s)",
            rental.id,
            rental.vehicle_id,
            violations.len()
        );

        BillingSession::open(
            rental,
            deposit,
            violations,
            rate,
            self.calculator,
            Arc::clone(&self.store),
            time_provider,
        )
    }
}
