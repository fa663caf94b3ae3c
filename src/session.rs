use std::sync::Arc;

use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::billing::{Bill, BillingCalculator, BillingInput};
use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::events::{BillingEvent, EventStore};
use crate::rates::ResolvedRate;
use crate::settlement::DepositSettlement;
use crate::state::{Invoice, Rental};
use crate::store::{RentalStore, SettlementCommit};
use crate::types::{Deposit, DepositStatus, RentalId, RentalStatus, Violation, ViolationId};

/// lifecycle of a billing session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// open for corrections; holds at most one draft bill
    Draft { bill: Option<Bill> },
    /// invoice committed, nothing may change
    Finalized { invoice: Invoice },
}

/// what finalization hands back to the staff UI and accounting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub invoice_id: Uuid,
    pub bill: Bill,
    pub refund_due: Money,
    pub outstanding_due: Money,
    pub deposit_status: DepositStatus,
}

/// staff-facing billing process for one returned rental
pub struct BillingSession {
    rental: Rental,
    deposit: Deposit,
    violations: Vec<Violation>,
    rate: ResolvedRate,
    calculator: BillingCalculator,
    store: Arc<dyn RentalStore>,
    state: SessionState,
    events: EventStore,
}

impl BillingSession {
    /// open a session on a returned rental, drafting a bill from the recorded return time
    pub fn open(
        rental: Rental,
        deposit: Deposit,
        violations: Vec<Violation>,
        rate: ResolvedRate,
        calculator: BillingCalculator,
        store: Arc<dyn RentalStore>,
        time_provider: &SafeTimeProvider,
    ) -> Result<Self> {
        if rental.status != RentalStatus::Returned {
            return Err(BillingError::RentalNotReturned {
                rental_id: rental.id,
                status: rental.status,
            });
        }
        if deposit.rental_id != rental.id {
            return Err(BillingError::RentalMismatch {
                expected: rental.id,
                found: deposit.rental_id,
            });
        }

        let mut session = Self {
            rental,
            deposit,
            violations,
            rate,
            calculator,
            store,
            state: SessionState::Draft { bill: None },
            events: EventStore::new(),
        };

        session.events.emit(BillingEvent::SessionOpened {
            rental_id: session.rental.id,
            deposit_amount: session.deposit.amount,
            timestamp: time_provider.now(),
        });

        if let Some(returned_at) = session.rental.actual_return_time {
            session.recompute(returned_at, time_provider)?;
        }

        info!(
            "Opened billing session for rental {} (deposit {})",
            session.rental.id, session.deposit.amount
        );
        Ok(session)
    }

    /// replace the draft with a fresh bill based on `return_time`;
    /// a failed computation leaves the previous draft in place
    pub fn recompute(
        &mut self,
        return_time: DateTime<Utc>,
        time_provider: &SafeTimeProvider,
    ) -> Result<Bill> {
        self.ensure_draft()?;

        let now = time_provider.now();
        let bill = self.calculator.calculate(&BillingInput {
            rental: &self.rental,
            rate: self.rate,
            violations: &self.violations,
            basis_return_time: return_time,
            computed_at: now,
        })?;

        debug!(
            "Recomputed bill for rental {}: basis {}, total {}",
            self.rental.id, return_time, bill.total_bill
        );
        self.events.emit(BillingEvent::BillRecomputed {
            rental_id: self.rental.id,
            basis_return_time: return_time,
            classification: bill.classification,
            total_bill: bill.total_bill,
            timestamp: now,
        });

        self.state = SessionState::Draft {
            bill: Some(bill.clone()),
        };
        Ok(bill)
    }

    /// reload violations and recompute the draft against its current basis
    pub async fn refresh_violations(&mut self, time_provider: &SafeTimeProvider) -> Result<Option<Bill>> {
        self.ensure_draft()?;

        let violations = self.store.list_violations(&self.rental.id).await?;
        self.events.emit(BillingEvent::ViolationsRefreshed {
            rental_id: self.rental.id,
            violation_count: violations.len(),
            timestamp: time_provider.now(),
        });
        self.violations = violations;

        match self.draft().map(|b| b.basis_return_time) {
            Some(basis) => self.recompute(basis, time_provider).map(Some),
            None => Ok(None),
        }
    }

    /// settle the deposit and commit the draft as the rental's invoice; runs at most once.
    /// violations are reloaded first so every fine recorded before settlement is billed
    pub async fn finalize(&mut self, time_provider: &SafeTimeProvider) -> Result<SettlementReceipt> {
        self.ensure_draft()?;
        let draft = self
            .draft()
            .cloned()
            .ok_or(BillingError::NoDraftBill {
                rental_id: self.rental.id,
            })?;

        let violations = self.store.list_violations(&self.rental.id).await?;
        let billed_violations: Vec<ViolationId> = violations.iter().map(|v| v.id).collect();
        self.violations = violations;

        let bill = self.recompute(draft.basis_return_time, time_provider)?;
        if !bill.same_charges(&draft) {
            info!(
                "Bill for rental {} changed at finalization: {} -> {}",
                self.rental.id, draft.total_bill, bill.total_bill
            );
        }

        let outcome = DepositSettlement::settle(&bill, &self.deposit).map_err(|e| {
            warn!("Refusing to settle rental {}: {}", self.rental.id, e);
            e
        })?;

        // the violation cutoff and the invoice date are the same instant
        let now = bill.computed_at;
        let invoice = Invoice::issue(bill.clone(), outcome, now);

        if let Err(e) = self
            .store
            .commit_settlement(SettlementCommit::new(invoice.clone(), billed_violations))
            .await
        {
            warn!("Settlement commit failed for rental {}: {}", self.rental.id, e);
            return Err(e);
        }

        // persisted; mirror the committed state locally
        DepositSettlement::apply(&bill, &mut self.deposit)?;
        self.rental.transition_to(RentalStatus::Settled)?;
        self.rental.actual_return_time = Some(bill.basis_return_time);

        self.events.emit(BillingEvent::InvoiceFinalized {
            rental_id: self.rental.id,
            invoice_id: invoice.invoice_id,
            total_bill: bill.total_bill,
            timestamp: now,
        });
        self.events.emit(BillingEvent::DepositSettled {
            rental_id: self.rental.id,
            status: outcome.deposit_status,
            refund_due: outcome.refund_due,
            outstanding_due: outcome.outstanding_due,
            timestamp: now,
        });

        info!(
            "Finalized rental {}: total {}, refund {}, outstanding {}, deposit {:?}",
            self.rental.id, bill.total_bill, outcome.refund_due, outcome.outstanding_due, outcome.deposit_status
        );

        let receipt = SettlementReceipt {
            invoice_id: invoice.invoice_id,
            bill,
            refund_due: outcome.refund_due,
            outstanding_due: outcome.outstanding_due,
            deposit_status: outcome.deposit_status,
        };
        self.state = SessionState::Finalized { invoice };
        Ok(receipt)
    }

    fn ensure_draft(&self) -> Result<()> {
        match self.state {
            SessionState::Draft { .. } => Ok(()),
            SessionState::Finalized { .. } => Err(BillingError::SessionFinalized {
                rental_id: self.rental.id,
            }),
        }
    }

    pub fn rental_id(&self) -> RentalId {
        self.rental.id
    }

    pub fn rental(&self) -> &Rental {
        &self.rental
    }

    pub fn deposit(&self) -> &Deposit {
        &self.deposit
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self.state, SessionState::Finalized { .. })
    }

    /// current draft, if the session is still open and one was computed
    pub fn draft(&self) -> Option<&Bill> {
        match &self.state {
            SessionState::Draft { bill } => bill.as_ref(),
            SessionState::Finalized { .. } => None,
        }
    }

    pub fn invoice(&self) -> Option<&Invoice> {
        match &self.state {
            SessionState::Finalized { invoice } => Some(invoice),
            SessionState::Draft { .. } => None,
        }
    }

    pub fn events(&self) -> &[BillingEvent] {
        self.events.events()
    }

    pub fn take_events(&mut self) -> Vec<BillingEvent> {
        self.events.take_events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InsurancePolicy;
    use crate::decimal::Multiplier;
    use crate::store::InMemoryStore;
    use chrono::{Duration, TimeZone};
    use hourglass_rs::TimeSource;
    use rust_decimal_macros::dec;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
    }

    fn rate() -> ResolvedRate {
        ResolvedRate {
            rate_per_hour: Money::from_major(50_000),
            insurance: InsurancePolicy::none(),
            late_multiplier: Multiplier::from_decimal(dec!(0.5)),
        }
    }

    async fn returned_rental(store: &InMemoryStore, deposit: i64, returned_at: DateTime<Utc>) -> (Rental, Deposit) {
        let rental = Rental::builder()
            .vehicle_id("VF8-001")
            .rate_per_hour(Money::from_major(50_000))
            .start_time(at(9, 0))
            .scheduled_end_time(at(11, 0))
            .build()
            .unwrap();
        let deposit = Deposit::hold(rental.id, Money::from_major(deposit)).unwrap();
        store.insert_rental(rental.clone()).await;
        store.hold_deposit(deposit.clone()).await.unwrap();
        store.mark_returned(&rental.id, returned_at).await.unwrap();

        let rental = store.get_rental(&rental.id).await.unwrap();
        (rental, deposit)
    }

    fn open(store: &InMemoryStore, rental: Rental, deposit: Deposit, time: &SafeTimeProvider) -> Result<BillingSession> {
        BillingSession::open(
            rental,
            deposit,
            Vec::new(),
            rate(),
            BillingCalculator::default(),
            Arc::new(store.clone()),
            time,
        )
    }

    #[tokio::test]
    async fn test_open_drafts_from_recorded_return() {
        let time = SafeTimeProvider::new(TimeSource::Test(at(12, 0)));
        let store = InMemoryStore::new();
        let (rental, deposit) = returned_rental(&store, 200_000, at(11, 4)).await;

        let session = open(&store, rental, deposit, &time).unwrap();
        let draft = session.draft().unwrap();
        assert_eq!(draft.rental_cost, Money::from_major(100_000));
        assert_eq!(session.events().len(), 2);
    }

    #[tokio::test]
    async fn test_open_requires_returned_rental() {
        let time = SafeTimeProvider::new(TimeSource::Test(at(12, 0)));
        let store = InMemoryStore::new();
        let rental = Rental::builder()
            .vehicle_id("VF8-001")
            .rate_per_hour(Money::from_major(50_000))
            .start_time(at(9, 0))
            .scheduled_end_time(at(11, 0))
            .build()
            .unwrap();
        let deposit = Deposit::hold(rental.id, Money::from_major(1)).unwrap();

        let result = open(&store, rental, deposit, &time);
        assert!(matches!(
            result,
            Err(BillingError::RentalNotReturned { status: RentalStatus::Active, .. })
        ));
    }

    #[tokio::test]
    async fn test_recompute_replaces_draft() {
        let time = SafeTimeProvider::new(TimeSource::Test(at(12, 0)));
        let store = InMemoryStore::new();
        let (rental, deposit) = returned_rental(&store, 200_000, at(11, 40)).await;
        let mut session = open(&store, rental, deposit, &time).unwrap();
        assert_eq!(session.draft().unwrap().rental_cost, Money::from_major(175_000));

        // staff corrects the return time
        let first = session.recompute(at(11, 4), &time).unwrap();
        let second = session.recompute(at(11, 4), &time).unwrap();
        assert_eq!(first, second);
        assert_eq!(session.draft(), Some(&second));
        assert_eq!(second.rental_cost, Money::from_major(100_000));
    }

    #[tokio::test]
    async fn test_failed_recompute_keeps_previous_draft() {
        let time = SafeTimeProvider::new(TimeSource::Test(at(12, 0)));
        let store = InMemoryStore::new();
        let (rental, deposit) = returned_rental(&store, 200_000, at(11, 0)).await;
        let mut session = open(&store, rental, deposit, &time).unwrap();
        let before = session.draft().cloned();

        let result = session.recompute(at(8, 0), &time);
        assert!(matches!(result, Err(BillingError::InvalidTimeRange { .. })));
        assert_eq!(session.draft().cloned(), before);
    }

    #[tokio::test]
    async fn test_finalize_twice_fails() {
        let time = SafeTimeProvider::new(TimeSource::Test(at(12, 0)));
        let store = InMemoryStore::new();
        let (rental, deposit) = returned_rental(&store, 200_000, at(11, 0)).await;
        let mut session = open(&store, rental, deposit, &time).unwrap();

        let receipt = session.finalize(&time).await.unwrap();
        assert_eq!(receipt.refund_due, Money::from_major(100_000));
        assert_eq!(receipt.deposit_status, DepositStatus::Returned);
        assert!(session.is_finalized());

        let again = session.finalize(&time).await;
        assert!(matches!(again, Err(BillingError::SessionFinalized { .. })));

        let refresh = session.refresh_violations(&time).await;
        assert!(matches!(refresh, Err(BillingError::SessionFinalized { .. })));
        assert_eq!(session.deposit().status, DepositStatus::Returned);
        assert_eq!(session.rental().status, RentalStatus::Settled);

        let recompute = session.recompute(at(11, 30), &time);
        assert!(matches!(recompute, Err(BillingError::SessionFinalized { .. })));
        assert_eq!(store.invoice_count().await, 1);
    }

    #[tokio::test]
    async fn test_refresh_picks_up_new_violation() {
        let time = SafeTimeProvider::new(TimeSource::Test(at(12, 0)));
        let control = time.test_control().unwrap();
        let store = InMemoryStore::new();
        let (rental, deposit) = returned_rental(&store, 200_000, at(11, 0)).await;
        let rental_id = rental.id;
        let mut session = open(&store, rental, deposit, &time).unwrap();

        control.advance(Duration::minutes(5));
        let fine = Violation::new(rental_id, "damaged mirror", Money::from_major(80_000), time.now()).unwrap();
        store.record_violation(fine).await.unwrap();

        let refreshed = session.refresh_violations(&time).await.unwrap().unwrap();
        assert_eq!(refreshed.violation_cost, Money::from_major(80_000));
        assert_eq!(refreshed.total_bill, Money::from_major(180_000));
    }

    #[tokio::test]
    async fn test_finalize_bills_violation_recorded_after_open() {
        let time = SafeTimeProvider::new(TimeSource::Test(at(12, 0)));
        let control = time.test_control().unwrap();
        let store = InMemoryStore::new();
        let (rental, deposit) = returned_rental(&store, 500_000, at(11, 0)).await;
        let rental_id = rental.id;
        let mut session = open(&store, rental, deposit, &time).unwrap();
        assert_eq!(session.draft().unwrap().violation_cost, Money::ZERO);

        control.advance(Duration::minutes(5));
        let fine = Violation::new(rental_id, "speeding", Money::from_major(300_000), time.now()).unwrap();
        store.record_violation(fine).await.unwrap();

        control.advance(Duration::minutes(5));
        let receipt = session.finalize(&time).await.unwrap();
        assert_eq!(receipt.bill.violation_cost, Money::from_major(300_000));
        assert_eq!(receipt.bill.total_bill, Money::from_major(400_000));
        assert_eq!(receipt.refund_due, Money::from_major(100_000));
        assert_eq!(receipt.bill.computed_at, at(12, 10));

        let invoice = store.invoice(&rental_id).await.unwrap();
        assert_eq!(invoice.bill.violation_cost, Money::from_major(300_000));
        assert_eq!(invoice.finalized_at, at(12, 10));
    }
}
