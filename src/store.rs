use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::errors::{BillingError, Result};
use crate::state::{Invoice, Rental};
use crate::types::{Deposit, DepositStatus, RentalId, RentalStatus, Violation, ViolationId};

/// writes applied together when a session is finalized
#[derive(Debug, Clone)]
pub struct SettlementCommit {
    pub invoice: Invoice,
    pub expected_rental_status: RentalStatus,
    pub expected_deposit_status: DepositStatus,
    /// every violation on record when the invoice was computed
    pub billed_violations: Vec<ViolationId>,
}

impl SettlementCommit {
    pub fn new(invoice: Invoice, billed_violations: Vec<ViolationId>) -> Self {
        Self {
            invoice,
            expected_rental_status: RentalStatus::Returned,
            expected_deposit_status: DepositStatus::Held,
            billed_violations,
        }
    }

    pub fn rental_id(&self) -> RentalId {
        self.invoice.rental_id()
    }
}

/// persisted rental, violation and deposit records
#[async_trait]
pub trait RentalStore: Send + Sync {
    async fn get_rental(&self, rental_id: &RentalId) -> Result<Rental>;
    async fn list_violations(&self, rental_id: &RentalId) -> Result<Vec<Violation>>;
    async fn get_deposit(&self, rental_id: &RentalId) -> Result<Deposit>;

    /// atomically re-check the expected statuses and write invoice, rental and deposit;
    /// fails with `ConcurrentSettlement` and writes nothing if either status moved,
    /// or with `ViolationsChanged` if a violation was recorded after the invoice was computed
    async fn commit_settlement(&self, commit: SettlementCommit) -> Result<()>;
}

#[derive(Debug, Default)]
struct StoreInner {
    rentals: HashMap<RentalId, Rental>,
    violations: HashMap<RentalId, Vec<Violation>>,
    deposits: HashMap<RentalId, Deposit>,
    invoices: HashMap<RentalId, Invoice>,
}

/// in-process store for embedding and tests
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_rental(&self, rental: Rental) {
        let mut inner = self.inner.write().await;
        inner.rentals.insert(rental.id, rental);
    }

    pub async fn hold_deposit(&self, deposit: Deposit) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.rentals.contains_key(&deposit.rental_id) {
            return Err(BillingError::RentalNotFound {
                rental_id: deposit.rental_id,
            });
        }
        inner.deposits.insert(deposit.rental_id, deposit);
        Ok(())
    }

    /// violations on settled rentals are kept for audit but never rebilled
    pub async fn record_violation(&self, violation: Violation) -> Result<()> {
        let mut inner = self.inner.write().await;
        let settled = inner
            .rentals
            .get(&violation.rental_id)
            .ok_or(BillingError::RentalNotFound {
                rental_id: violation.rental_id,
            })?
            .is_settled();

        if settled {
            warn!(
                "Violation {} recorded on settled rental {}; invoice unchanged",
                violation.id, violation.rental_id
            );
        }

        inner
            .violations
            .entry(violation.rental_id)
            .or_default()
            .push(violation);
        Ok(())
    }

    pub async fn mark_returned(&self, rental_id: &RentalId, actual_return_time: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write().await;
        let rental = inner
            .rentals
            .get_mut(rental_id)
            .ok_or(BillingError::RentalNotFound { rental_id: *rental_id })?;
        rental.mark_returned(actual_return_time)
    }

    pub async fn invoice(&self, rental_id: &RentalId) -> Option<Invoice> {
        let inner = self.inner.read().await;
        inner.invoices.get(rental_id).cloned()
    }

    pub async fn invoice_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.invoices.len()
    }
}

#[async_trait]
impl RentalStore for InMemoryStore {
    async fn get_rental(&self, rental_id: &RentalId) -> Result<Rental> {
        let inner = self.inner.read().await;
        inner
            .rentals
            .get(rental_id)
            .cloned()
            .ok_or(BillingError::RentalNotFound { rental_id: *rental_id })
    }

    async fn list_violations(&self, rental_id: &RentalId) -> Result<Vec<Violation>> {
        let inner = self.inner.read().await;
        if !inner.rentals.contains_key(rental_id) {
            return Err(BillingError::RentalNotFound { rental_id: *rental_id });
        }
        Ok(inner.violations.get(rental_id).cloned().unwrap_or_default())
    }

    async fn get_deposit(&self, rental_id: &RentalId) -> Result<Deposit> {
        let inner = self.inner.read().await;
        inner
            .deposits
            .get(rental_id)
            .cloned()
            .ok_or(BillingError::DepositNotFound { rental_id: *rental_id })
    }

    async fn commit_settlement(&self, commit: SettlementCommit) -> Result<()> {
        let rental_id = commit.rental_id();
        let mut inner = self.inner.write().await;

        let rental_status = inner
            .rentals
            .get(&rental_id)
            .map(|r| r.status)
            .ok_or(BillingError::RentalNotFound { rental_id })?;
        let deposit_status = inner
            .deposits
            .get(&rental_id)
            .map(|d| d.status)
            .ok_or(BillingError::DepositNotFound { rental_id })?;

        if rental_status != commit.expected_rental_status
            || deposit_status != commit.expected_deposit_status
            || inner.invoices.contains_key(&rental_id)
        {
            return Err(BillingError::ConcurrentSettlement {
                rental_id,
                rental_status,
                deposit_status,
            });
        }

        let mut recorded: Vec<ViolationId> = inner
            .violations
            .get(&rental_id)
            .map(|vs| vs.iter().map(|v| v.id).collect())
            .unwrap_or_default();
        let mut billed = commit.billed_violations.clone();
        recorded.sort();
        billed.sort();
        if recorded != billed {
            return Err(BillingError::ViolationsChanged {
                rental_id,
                billed: billed.len(),
                recorded: recorded.len(),
            });
        }

        // validate every write before applying any of them
        let mut rental = inner.rentals[&rental_id].clone();
        rental.transition_to(RentalStatus::Settled)?;
        rental.actual_return_time = Some(commit.invoice.bill.basis_return_time);

        let mut deposit = inner.deposits[&rental_id].clone();
        deposit.transition_to(commit.invoice.settlement.deposit_status)?;

        inner.rentals.insert(rental_id, rental);
        inner.deposits.insert(rental_id, deposit);
        inner.invoices.insert(rental_id, commit.invoice);

        debug!("Committed settlement for rental {}", rental_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::Bill;
    use crate::decimal::Money;
    use crate::settlement::DepositSettlement;
    use crate::types::TimingClassification;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
    }

    async fn seeded() -> (InMemoryStore, Rental, Deposit) {
        let store = InMemoryStore::new();
        let rental = Rental::builder()
            .vehicle_id("VF8-001")
            .rate_per_hour(Money::from_major(50_000))
            .start_time(at(9, 0))
            .scheduled_end_time(at(11, 0))
            .build()
            .unwrap();
        let deposit = Deposit::hold(rental.id, Money::from_major(200_000)).unwrap();

        store.insert_rental(rental.clone()).await;
        store.hold_deposit(deposit.clone()).await.unwrap();
        store.mark_returned(&rental.id, at(11, 0)).await.unwrap();
        (store, rental, deposit)
    }

    fn invoice_for(rental: &Rental, deposit: &Deposit) -> Invoice {
        let bill = Bill {
            rental_id: rental.id,
            basis_return_time: at(10, 50),
            classification: TimingClassification::Early,
            billable_duration_minutes: 120,
            billable_units: 2,
            late_units: 0,
            rate_per_hour: rental.rate_per_hour,
            late_surcharge: Money::ZERO,
            rental_cost: Money::from_major(100_000),
            insurance_cost: Money::ZERO,
            violation_cost: Money::ZERO,
            total_bill: Money::from_major(100_000),
            computed_at: at(12, 0),
        };
        let outcome = DepositSettlement::settle(&bill, deposit).unwrap();
        Invoice::issue(bill, outcome, at(12, 0))
    }

    #[tokio::test]
    async fn test_commit_applies_all_writes() {
        let (store, rental, deposit) = seeded().await;

        store
            .commit_settlement(SettlementCommit::new(invoice_for(&rental, &deposit), Vec::new()))
            .await
            .unwrap();

        let stored = store.get_rental(&rental.id).await.unwrap();
        assert_eq!(stored.status, RentalStatus::Settled);
        assert_eq!(stored.actual_return_time, Some(at(10, 50)));
        assert_eq!(
            store.get_deposit(&rental.id).await.unwrap().status,
            DepositStatus::Returned
        );
        assert!(store.invoice(&rental.id).await.is_some());
    }

    #[tokio::test]
    async fn test_second_commit_rejected_without_writes() {
        let (store, rental, deposit) = seeded().await;
        let first = invoice_for(&rental, &deposit);
        store.commit_settlement(SettlementCommit::new(first.clone(), Vec::new())).await.unwrap();

        let second = invoice_for(&rental, &deposit);
        let result = store.commit_settlement(SettlementCommit::new(second, Vec::new())).await;

        assert!(matches!(result, Err(BillingError::ConcurrentSettlement { .. })));
        assert_eq!(store.invoice_count().await, 1);
        assert_eq!(
            store.invoice(&rental.id).await.unwrap().invoice_id,
            first.invoice_id
        );
    }

    #[tokio::test]
    async fn test_commit_requires_returned_rental() {
        let store = InMemoryStore::new();
        let rental = Rental::builder()
            .vehicle_id("VF8-001")
            .rate_per_hour(Money::from_major(50_000))
            .start_time(at(9, 0))
            .scheduled_end_time(at(11, 0))
            .build()
            .unwrap();
        let deposit = Deposit::hold(rental.id, Money::from_major(200_000)).unwrap();
        store.insert_rental(rental.clone()).await;
        store.hold_deposit(deposit.clone()).await.unwrap();

        let result = store
            .commit_settlement(SettlementCommit::new(invoice_for(&rental, &deposit), Vec::new()))
            .await;
        assert!(matches!(
            result,
            Err(BillingError::ConcurrentSettlement { rental_status: RentalStatus::Active, .. })
        ));
        assert_eq!(
            store.get_deposit(&rental.id).await.unwrap().status,
            DepositStatus::Held
        );
    }

    #[tokio::test]
    async fn test_unknown_records() {
        let store = InMemoryStore::new();
        let id = uuid::Uuid::new_v4();

        assert!(matches!(
            store.get_rental(&id).await,
            Err(BillingError::RentalNotFound { .. })
        ));
        assert!(matches!(
            store.list_violations(&id).await,
            Err(BillingError::RentalNotFound { .. })
        ));
        assert!(matches!(
            store.get_deposit(&id).await,
            Err(BillingError::DepositNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_violation_after_settlement_is_retained() {
        let (store, rental, deposit) = seeded().await;
        store
            .commit_settlement(SettlementCommit::new(invoice_for(&rental, &deposit), Vec::new()))
            .await
            .unwrap();

        let late = Violation::new(rental.id, "toll", Money::from_major(40_000), at(15, 0)).unwrap();
        store.record_violation(late).await.unwrap();

        assert_eq!(store.list_violations(&rental.id).await.unwrap().len(), 1);
        let invoice = store.invoice(&rental.id).await.unwrap();
        assert_eq!(invoice.bill.violation_cost, Money::ZERO);
    }

    #[tokio::test]
    async fn test_commit_rejects_unbilled_violation() {
        let (store, rental, deposit) = seeded().await;
        let invoice = invoice_for(&rental, &deposit);

        let fine = Violation::new(rental.id, "speeding", Money::from_major(300_000), at(11, 30)).unwrap();
        store.record_violation(fine).await.unwrap();

        let result = store.commit_settlement(SettlementCommit::new(invoice, Vec::new())).await;
        assert!(matches!(
            result,
            Err(BillingError::ViolationsChanged { billed: 0, recorded: 1, .. })
        ));
        assert_eq!(store.invoice_count().await, 0);
        assert_eq!(
            store.get_rental(&rental.id).await.unwrap().status,
            RentalStatus::Returned
        );
        assert_eq!(
            store.get_deposit(&rental.id).await.unwrap().status,
            DepositStatus::Held
        );
    }
}
