use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::{DepositStatus, RentalId, TimingClassification};

/// audit events emitted by a billing session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BillingEvent {
    SessionOpened {
        rental_id: RentalId,
        deposit_amount: Money,
        timestamp: DateTime<Utc>,
    },
    BillRecomputed {
        rental_id: RentalId,
        basis_return_time: DateTime<Utc>,
        classification: TimingClassification,
        total_bill: Money,
        timestamp: DateTime<Utc>,
    },
    ViolationsRefreshed {
        rental_id: RentalId,
        violation_count: usize,
        timestamp: DateTime<Utc>,
    },
    InvoiceFinalized {
        rental_id: RentalId,
        invoice_id: Uuid,
        total_bill: Money,
        timestamp: DateTime<Utc>,
    },
    DepositSettled {
        rental_id: RentalId,
        status: DepositStatus,
        refund_due: Money,
        outstanding_due: Money,
        timestamp: DateTime<Utc>,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<BillingEvent>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: BillingEvent) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<BillingEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[BillingEvent] {
        &self.events
    }
}
