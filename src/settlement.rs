use serde::{Deserialize, Serialize};

use crate::billing::Bill;
use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::types::{Deposit, DepositStatus, RentalId};

/// how a held deposit resolves against a final bill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementOutcome {
    pub rental_id: RentalId,
    pub deposit_amount: Money,
    pub total_bill: Money,
    /// owed back to the renter
    pub refund_due: Money,
    /// still to be collected from the renter
    pub outstanding_due: Money,
    pub deposit_status: DepositStatus,
}

pub struct DepositSettlement;

impl DepositSettlement {
    /// work out the settlement without touching the deposit
    pub fn settle(bill: &Bill, deposit: &Deposit) -> Result<SettlementOutcome> {
        if deposit.rental_id != bill.rental_id {
            return Err(BillingError::RentalMismatch {
                expected: bill.rental_id,
                found: deposit.rental_id,
            });
        }
        if deposit.status.is_settled() {
            return Err(BillingError::DepositAlreadySettled {
                rental_id: deposit.rental_id,
                status: deposit.status,
            });
        }

        let covered = bill.total_bill.min(deposit.amount);
        let deposit_status = if covered == bill.total_bill {
            DepositStatus::Returned
        } else {
            DepositStatus::Applied
        };
        let outcome = SettlementOutcome {
            rental_id: bill.rental_id,
            deposit_amount: deposit.amount,
            total_bill: bill.total_bill,
            refund_due: deposit.amount - covered,
            outstanding_due: bill.total_bill.saturating_sub(deposit.amount),
            deposit_status,
        };

        Ok(outcome)
    }

    /// settle and move the deposit out of HELD
    pub fn apply(bill: &Bill, deposit: &mut Deposit) -> Result<SettlementOutcome> {
        let outcome = Self::settle(bill, deposit)?;
        deposit.transition_to(outcome.deposit_status)?;
        Ok(outcome)
    }
}
