use std::collections::HashMap;
use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Multiplier};
use crate::errors::{BillingError, Result};
use crate::types::{InsuranceModel, VehicleId};

const ENV_PREFIX: &str = "RENTAL_BILLING_";

/// time rounding policy shared by every bill computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPolicy {
    /// minutes past a unit boundary absorbed before rounding up
    pub grace_period_minutes: u32,
    pub billing_unit_minutes: u32,
    /// floor charge, in billing units
    pub minimum_billable_units: u32,
}

impl Default for BillingPolicy {
    fn default() -> Self {
        Self {
            grace_period_minutes: 5,
            billing_unit_minutes: 60,
            minimum_billable_units: 1,
        }
    }
}

impl BillingPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.billing_unit_minutes == 0 {
            return Err(BillingError::InvalidConfiguration {
                message: "billing unit must be at least one minute".to_string(),
            });
        }
        if self.grace_period_minutes >= self.billing_unit_minutes {
            return Err(BillingError::InvalidConfiguration {
                message: format!(
                    "grace period {}m must be shorter than billing unit {}m",
                    self.grace_period_minutes, self.billing_unit_minutes
                ),
            });
        }
        Ok(())
    }
}

/// insurance pricing attached to a rate card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsurancePolicy {
    pub insurance_model: InsuranceModel,
    pub insurance_rate: Money,
}

impl InsurancePolicy {
    pub fn flat(fee: Money) -> Self {
        Self {
            insurance_model: InsuranceModel::Flat,
            insurance_rate: fee,
        }
    }

    pub fn per_hour(rate: Money) -> Self {
        Self {
            insurance_model: InsuranceModel::PerHour,
            insurance_rate: rate,
        }
    }

    /// no insurance charged
    pub fn none() -> Self {
        Self::flat(Money::ZERO)
    }
}

/// price list entry for a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCard {
    pub rate_per_hour: Money,
    pub insurance: InsurancePolicy,
    /// surcharge factor on hours past the scheduled end
    pub late_multiplier: Multiplier,
}

impl RateCard {
    pub fn validate(&self) -> Result<()> {
        if !self.rate_per_hour.is_positive() {
            return Err(BillingError::InvalidRate {
                rate: self.rate_per_hour,
            });
        }
        if self.insurance.insurance_rate.is_negative() {
            return Err(BillingError::InvalidConfiguration {
                message: format!("insurance rate {} is negative", self.insurance.insurance_rate),
            });
        }
        if self.late_multiplier.is_negative() {
            return Err(BillingError::InvalidConfiguration {
                message: format!("late multiplier {} is negative", self.late_multiplier),
            });
        }
        Ok(())
    }
}

/// engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingConfig {
    pub policy: BillingPolicy,
    pub default_rate: RateCard,
    #[serde(default)]
    pub vehicle_rates: HashMap<VehicleId, RateCard>,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl BillingConfig {
    /// standard city-rental pricing: 50,000/h, flat 30,000 insurance, 50% late surcharge
    pub fn standard() -> Self {
        Self {
            policy: BillingPolicy::default(),
            default_rate: RateCard {
                rate_per_hour: Money::from_major(50_000),
                insurance: InsurancePolicy::flat(Money::from_major(30_000)),
                late_multiplier: Multiplier::from_decimal(dec!(0.5)),
            },
            vehicle_rates: HashMap::new(),
        }
    }

    /// premium pricing with hourly insurance and a full-rate late surcharge
    pub fn premium() -> Self {
        Self {
            policy: BillingPolicy::default(),
            default_rate: RateCard {
                rate_per_hour: Money::from_major(120_000),
                insurance: InsurancePolicy::per_hour(Money::from_major(10_000)),
                late_multiplier: Multiplier::ONE,
            },
            vehicle_rates: HashMap::new(),
        }
    }

    pub fn with_vehicle_rate(mut self, vehicle_id: impl Into<VehicleId>, card: RateCard) -> Self {
        self.vehicle_rates.insert(vehicle_id.into(), card);
        self
    }

    /// load defaults, then the toml file if given, then RENTAL_BILLING_* env vars
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(BillingConfig::standard()));
        if let Some(p) = path {
            figment = figment.merge(Toml::file(p));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: BillingConfig = figment.extract().map_err(|e| BillingError::InvalidConfiguration {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.policy.validate()?;
        self.default_rate.validate()?;
        for card in self.vehicle_rates.values() {
            card.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        assert!(BillingConfig::standard().validate().is_ok());
        assert!(BillingConfig::premium().validate().is_ok());
    }

    #[test]
    fn test_policy_rejects_grace_longer_than_unit() {
        let policy = BillingPolicy {
            grace_period_minutes: 60,
            billing_unit_minutes: 60,
            minimum_billable_units: 1,
        };
        assert!(matches!(
            policy.validate(),
            Err(BillingError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_rate_card_rejects_non_positive_rate() {
        let mut card = BillingConfig::standard().default_rate;
        card.rate_per_hour = Money::ZERO;
        assert!(matches!(card.validate(), Err(BillingError::InvalidRate { .. })));
    }

    #[test]
    fn test_load_layers_file_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "billing.toml",
                r#"
                [policy]
                grace_period_minutes = 10
                billing_unit_minutes = 60
                minimum_billable_units = 2

                [vehicle_rates.VF9-LUX]
                rate_per_hour = "90000"
                late_multiplier = "1"

                [vehicle_rates.VF9-LUX.insurance]
                insuranceModel = "perHour"
                insuranceRate = "5000"
                "#,
            )?;
            jail.set_env("RENTAL_BILLING_DEFAULT_RATE__RATE_PER_HOUR", "60000");

            let config = BillingConfig::load(Some(Path::new("billing.toml")))
                .map_err(|e| e.to_string())?;

            assert_eq!(config.policy.grace_period_minutes, 10);
            assert_eq!(config.policy.minimum_billable_units, 2);
            assert_eq!(config.default_rate.rate_per_hour, Money::from_major(60_000));

            let lux = config.vehicle_rates.get("VF9-LUX").expect("vehicle override");
            assert_eq!(lux.insurance.insurance_model, InsuranceModel::PerHour);
            assert_eq!(lux.insurance.insurance_rate, Money::from_major(5_000));
            Ok(())
        });
    }
}
