/// serialization support for invoices handed to accounting
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::state::Invoice;
use crate::types::{DepositStatus, RentalId, TimingClassification};

/// serializable view of a finalized invoice
#[derive(Debug, Serialize, Deserialize)]
pub struct InvoiceView {
    pub invoice_id: Uuid,
    pub rental_id: RentalId,
    pub finalized_at: DateTime<Utc>,
    pub timing: TimingView,
    pub charges: ChargesView,
    pub deposit: DepositView,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TimingView {
    pub basis_return_time: DateTime<Utc>,
    pub classification: TimingClassification,
    pub billable_duration_minutes: i64,
    pub late_units: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChargesView {
    pub rate_per_hour: Money,
    pub rental_cost: Money,
    pub late_surcharge: Money,
    pub insurance_cost: Money,
    pub violation_cost: Money,
    pub total_bill: Money,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DepositView {
    pub amount: Money,
    pub status: DepositStatus,
    pub refund_due: Money,
    pub outstanding_due: Money,
}

impl InvoiceView {
    pub fn from_invoice(invoice: &Invoice) -> Self {
        let bill = &invoice.bill;
        InvoiceView {
            invoice_id: invoice.invoice_id,
            rental_id: bill.rental_id,
            finalized_at: invoice.finalized_at,
            timing: TimingView {
                basis_return_time: bill.basis_return_time,
                classification: bill.classification,
                billable_duration_minutes: bill.billable_duration_minutes,
                late_units: bill.late_units,
            },
            charges: ChargesView {
                rate_per_hour: bill.rate_per_hour,
                rental_cost: bill.rental_cost,
                late_surcharge: bill.late_surcharge,
                insurance_cost: bill.insurance_cost,
                violation_cost: bill.violation_cost,
                total_bill: bill.total_bill,
            },
            deposit: DepositView {
                amount: invoice.settlement.deposit_amount,
                status: invoice.settlement.deposit_status,
                refund_due: invoice.settlement.refund_due,
                outstanding_due: invoice.settlement.outstanding_due,
            },
        }
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Invoice {
    pub fn json(&self) -> String {
        InvoiceView::from_invoice(self)
            .to_json_pretty()
            .unwrap_or_else(|e| format!("JSON error: {}", e))
    }
}
