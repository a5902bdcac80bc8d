//! Historical invoice documents.
//!
//! Older revisions stored invoices as flat camelCase documents with a
//! separate `consultationFee` field, free-form status strings and no
//! version. They are converted as-is; drift in the amounts is left for the
//! reconciler to repair at read time.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::models::{
    ConsultationType, Invoice, InvoiceKind, InvoiceStatus, InvoiceTotals, LineItem, PatientBehavior, Payment,
    PaymentMethod, Refund,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyServiceCharge {
    pub name: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyPayment {
    pub amount: Decimal,
    #[serde(default = "default_method")]
    pub method: PaymentMethod,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub appointment_time: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyRefund {
    pub amount: Decimal,
    #[serde(default = "default_method")]
    pub method: PaymentMethod,
    #[serde(default)]
    pub reason: String,
    #[serde(default = "default_behavior")]
    pub patient_behavior: PatientBehavior,
    #[serde(default)]
    pub notes: Option<String>,
    pub timestamp: DateTime<Utc>,
}

fn default_method() -> PaymentMethod {
    PaymentMethod::Cash
}

fn default_behavior() -> PatientBehavior {
    PatientBehavior::Okay
}

/// Invoice document as written by earlier schema revisions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyInvoiceRecord {
    #[serde(alias = "_id")]
    pub id: Uuid,
    pub patient_id: Uuid,
    pub consultation_type: String,
    pub consultation_fee: Decimal,
    #[serde(default)]
    pub service_charges: Vec<LegacyServiceCharge>,
    #[serde(default)]
    pub tax_percentage: Decimal,
    #[serde(default)]
    pub discount_percentage: Decimal,
    #[serde(default)]
    pub tax_amount: Decimal,
    #[serde(default)]
    pub discount_amount: Decimal,
    #[serde(default)]
    pub subtotal: Option<Decimal>,
    pub total_amount: Decimal,
    #[serde(default)]
    pub paid_amount: Decimal,
    #[serde(default)]
    pub due_amount: Option<Decimal>,
    pub status: String,
    #[serde(default = "default_true")]
    pub is_reassignment_invoice: bool,
    #[serde(default, alias = "isEligibleForFreeReassignment")]
    pub fee_waived: bool,
    #[serde(default)]
    pub payment_history: Vec<LegacyPayment>,
    #[serde(default)]
    pub refunds: Vec<LegacyRefund>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    #[serde(default)]
    pub refunded_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

/// Map a stored status string onto the current lifecycle
pub fn parse_legacy_status(raw: &str) -> BillingResult<InvoiceStatus> {
    let normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
    match normalized.as_str() {
        "invoiced" | "pending" | "unpaid" => Ok(InvoiceStatus::Invoiced),
        "paid" | "completed" => Ok(InvoiceStatus::Paid),
        "cancelled" | "canceled" => Ok(InvoiceStatus::Cancelled),
        "partially_refunded" => Ok(InvoiceStatus::PartiallyRefunded),
        "refunded" => Ok(InvoiceStatus::Refunded),
        _ => Err(BillingError::Validation(format!("unknown legacy invoice status '{}'", raw))),
    }
}

impl TryFrom<LegacyInvoiceRecord> for Invoice {
    type Error = BillingError;

    /// Converts without repairing; the resulting invoice may violate the
    /// aggregate invariants and is only fit for reconciliation or display.
    fn try_from(record: LegacyInvoiceRecord) -> BillingResult<Self> {
        let consultation_type: ConsultationType = record.consultation_type.parse()?;
        let status = parse_legacy_status(&record.status)?;

        let mut line_items = Vec::with_capacity(record.service_charges.len() + 1);
        line_items.push(LineItem::consultation_fee(record.consultation_fee));
        line_items.extend(
            record
                .service_charges
                .into_iter()
                .map(|charge| LineItem::service_charge(charge.name, charge.amount)),
        );

        let subtotal = record
            .subtotal
            .unwrap_or_else(|| line_items.iter().map(|item| item.amount).sum());
        let due = record
            .due_amount
            .unwrap_or(record.total_amount - record.paid_amount);

        let payment_history = record
            .payment_history
            .into_iter()
            .map(|payment| Payment {
                id: Uuid::new_v4(),
                amount: payment.amount,
                method: payment.method,
                reference: payment.reference,
                appointment_time: payment.appointment_time.unwrap_or(payment.timestamp),
                timestamp: payment.timestamp,
            })
            .collect();

        let refunds = record
            .refunds
            .into_iter()
            .map(|refund| Refund {
                id: Uuid::new_v4(),
                amount: refund.amount,
                method: refund.method,
                reason: refund.reason,
                patient_behavior: refund.patient_behavior,
                notes: refund.notes,
                penalty_withheld: Decimal::ZERO,
                timestamp: refund.timestamp,
            })
            .collect();

        Ok(Invoice {
            id: record.id,
            patient_id: record.patient_id,
            kind: if record.is_reassignment_invoice {
                InvoiceKind::Reassignment
            } else {
                InvoiceKind::Original
            },
            consultation_type,
            fee_waived: record.fee_waived,
            line_items,
            tax_percentage: record.tax_percentage,
            discount_percentage: record.discount_percentage,
            totals: InvoiceTotals {
                subtotal,
                tax_amount: record.tax_amount,
                discount_amount: record.discount_amount,
                total: record.total_amount,
                paid: record.paid_amount,
                due,
            },
            status,
            payment_history,
            refunds,
            created_at: record.created_at,
            cancelled_at: record.cancelled_at,
            cancellation_reason: record.cancellation_reason,
            refunded_at: record.refunded_at,
            version: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{DisplayStatus, Reconciler};
    use serde_json::json;

    fn record(status: &str) -> serde_json::Value {
        json!({
            "_id": "7b0f3a52-9c1e-4d7a-8f3b-2f4d8c6e1a90",
            "patientId": "0c9d8e7f-6a5b-4c3d-9e2f-1a0b9c8d7e6f",
            "consultationType": "OP",
            "consultationFee": "1000",
            "serviceCharges": [],
            "totalAmount": "1000",
            "paidAmount": "1000",
            "status": status,
            "createdAt": "2024-05-01T09:30:00Z",
            "paymentHistory": [
                { "amount": "1000", "method": "upi", "timestamp": "2024-05-01T09:45:00Z" }
            ]
        })
    }

    #[test]
    fn test_converts_without_repair() {
        let legacy: LegacyInvoiceRecord = serde_json::from_value(record("completed")).unwrap();
        let invoice = Invoice::try_from(legacy).unwrap();

        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert_eq!(invoice.consultation_type, ConsultationType::Op);
        assert_eq!(invoice.consultation_fee(), Decimal::from(1000));
        assert_eq!(invoice.service_charges().count(), 0);
        assert_eq!(invoice.totals.due, Decimal::ZERO);
        assert_eq!(invoice.payment_history[0].method, PaymentMethod::Upi);
        assert!(invoice.is_reassignment());
        assert_eq!(invoice.version, 0);
    }

    #[test]
    fn test_legacy_record_reconciles() {
        let legacy: LegacyInvoiceRecord = serde_json::from_value(record("paid")).unwrap();
        let invoice = Invoice::try_from(legacy).unwrap();
        let reconciled = Reconciler::default().reconcile(&invoice);

        assert_eq!(reconciled.line_items.len(), 2);
        assert_eq!(reconciled.line_items[0].amount, Decimal::from(850));
        assert_eq!(reconciled.line_items[1].name, LineItem::STANDARD_SERVICE_CHARGE);
        assert_eq!(reconciled.line_items[1].amount, Decimal::from(150));
        assert_eq!(reconciled.status, DisplayStatus::FullyPaid);
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(parse_legacy_status("Partially-Refunded").unwrap(), InvoiceStatus::PartiallyRefunded);
        assert_eq!(parse_legacy_status("canceled").unwrap(), InvoiceStatus::Cancelled);
        assert_eq!(parse_legacy_status("pending").unwrap(), InvoiceStatus::Invoiced);
        assert!(matches!(parse_legacy_status("archived"), Err(BillingError::Validation(_))));
    }

    #[test]
    fn test_unknown_consultation_type_rejected() {
        let mut value = record("paid");
        value["consultationType"] = json!("dental");
        let legacy: LegacyInvoiceRecord = serde_json::from_value(value).unwrap();
        assert!(matches!(
            Invoice::try_from(legacy),
            Err(BillingError::UnknownConsultationType(_))
        ));
    }
}
