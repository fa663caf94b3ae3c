pub mod billing;
pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod rates;
pub mod serialization;
pub mod service;
pub mod session;
pub mod settlement;
pub mod state;
pub mod store;
pub mod types;

// re-export key types
pub use billing::{Bill, BillingCalculator, BillingInput, DurationCalculator, ViolationAggregator};
pub use config::{BillingConfig, BillingPolicy, InsurancePolicy, RateCard};
pub use decimal::{Money, Multiplier};
pub use errors::{BillingError, Result};
pub use events::{BillingEvent, EventStore};
pub use rates::{RateProvider, RateTable, ResolvedRate};
pub use service::BillingService;
pub use session::{BillingSession, SessionState, SettlementReceipt};
pub use settlement::{DepositSettlement, SettlementOutcome};
pub use state::{Invoice, Rental, RentalBuilder};
pub use store::{InMemoryStore, RentalStore, SettlementCommit};
pub use types::{
    Deposit, DepositStatus, InsuranceModel, RentalId, RentalStatus, RenterId, TimingClassification,
    VehicleId, Violation, ViolationId,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
