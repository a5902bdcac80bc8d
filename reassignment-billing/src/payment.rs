use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::models::{Invoice, InvoiceStatus, Payment, PaymentMethod};

/// A staff-confirmed settlement together with the next consultation slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentCommand {
    pub amount: Decimal,
    pub method: PaymentMethod,
    #[serde(default)]
    pub reference: Option<String>,
    pub appointment_time: Option<DateTime<Utc>>,
}

/// Records a full settlement against an invoice
#[derive(Debug, Clone, Copy, Default)]
pub struct PaymentApplier;

impl PaymentApplier {
    pub fn new() -> Self {
        Self
    }

    /// Validate the command and return the settled invoice.
    ///
    /// The input invoice is never modified; a rejected payment leaves the
    /// caller's copy exactly as it was.
    pub fn apply(&self, invoice: &Invoice, command: &PaymentCommand, now: DateTime<Utc>) -> BillingResult<Invoice> {
        if invoice.status != InvoiceStatus::Invoiced {
            return Err(BillingError::InvoiceNotPayable {
                invoice_id: invoice.id,
                status: invoice.status,
            });
        }

        if command.amount < Decimal::ZERO {
            return Err(BillingError::NegativeAmount {
                field: "amount",
                value: command.amount,
            });
        }

        // Full settlement only
        if command.amount != invoice.totals.due {
            return Err(BillingError::AmountMismatch {
                expected: invoice.totals.due,
                actual: command.amount,
            });
        }

        let appointment_time = match command.appointment_time {
            Some(at) if at > now => at,
            Some(at) => {
                return Err(BillingError::InvalidSchedule(format!(
                    "appointment at {} is not in the future",
                    at.to_rfc3339()
                )))
            }
            None => {
                return Err(BillingError::InvalidSchedule(
                    "a future appointment is required to record a payment".to_string(),
                ))
            }
        };

        let mut settled = invoice.clone();
        settled.payment_history.push(Payment {
            id: Uuid::new_v4(),
            amount: command.amount,
            method: command.method,
            reference: command.reference.clone(),
            appointment_time,
            timestamp: now,
        });
        settled.totals.paid = settled.totals.total;
        settled.totals.due = Decimal::ZERO;
        settled.status = InvoiceStatus::Paid;
        settled.check_invariants()?;

        Ok(settled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{InvoiceBuilder, InvoiceRequest};
    use crate::models::ConsultationType;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap()
    }

    fn op_invoice() -> Invoice {
        InvoiceBuilder::default()
            .build(Uuid::new_v4(), InvoiceRequest::new(ConsultationType::Op), false, now())
            .unwrap()
    }

    fn command(amount: i64, appointment_time: Option<DateTime<Utc>>) -> PaymentCommand {
        PaymentCommand {
            amount: Decimal::from(amount),
            method: PaymentMethod::Cash,
            reference: None,
            appointment_time,
        }
    }

    #[test]
    fn test_full_settlement() {
        let invoice = op_invoice();
        let paid = PaymentApplier::new()
            .apply(&invoice, &command(1000, Some(now() + Duration::days(1))), now())
            .unwrap();

        assert_eq!(paid.status, InvoiceStatus::Paid);
        assert_eq!(paid.totals.paid, Decimal::from(1000));
        assert_eq!(paid.totals.due, Decimal::ZERO);
        assert_eq!(paid.payment_history.len(), 1);
        assert_eq!(paid.payment_history[0].appointment_time, now() + Duration::days(1));
    }

    #[test]
    fn test_partial_payment_rejected() {
        let invoice = op_invoice();
        let result = PaymentApplier::new().apply(&invoice, &command(500, Some(now() + Duration::hours(2))), now());

        assert_eq!(
            result,
            Err(BillingError::AmountMismatch {
                expected: Decimal::from(1000),
                actual: Decimal::from(500)
            })
        );
        assert_eq!(invoice.totals.paid, Decimal::ZERO);
    }

    #[test]
    fn test_overpayment_rejected() {
        let invoice = op_invoice();
        let result = PaymentApplier::new().apply(&invoice, &command(1200, Some(now() + Duration::hours(2))), now());
        assert!(matches!(result, Err(BillingError::AmountMismatch { .. })));
    }

    #[test]
    fn test_same_day_future_appointment_allowed() {
        let invoice = op_invoice();
        let result = PaymentApplier::new().apply(&invoice, &command(1000, Some(now() + Duration::minutes(30))), now());
        assert!(result.is_ok());
    }

    #[test]
    fn test_past_or_missing_appointment_rejected() {
        let invoice = op_invoice();
        let applier = PaymentApplier::new();

        let past = applier.apply(&invoice, &command(1000, Some(now() - Duration::minutes(1))), now());
        assert!(matches!(past, Err(BillingError::InvalidSchedule(_))));

        let exactly_now = applier.apply(&invoice, &command(1000, Some(now())), now());
        assert!(matches!(exactly_now, Err(BillingError::InvalidSchedule(_))));

        let missing = applier.apply(&invoice, &command(1000, None), now());
        assert!(matches!(missing, Err(BillingError::InvalidSchedule(_))));
    }

    #[test]
    fn test_paid_or_cancelled_invoice_not_payable() {
        let applier = PaymentApplier::new();
        let paid = applier
            .apply(&op_invoice(), &command(1000, Some(now() + Duration::days(1))), now())
            .unwrap();

        let again = applier.apply(&paid, &command(0, Some(now() + Duration::days(1))), now());
        assert!(matches!(again, Err(BillingError::InvoiceNotPayable { status: InvoiceStatus::Paid, .. })));

        let mut cancelled = op_invoice();
        cancelled.status = InvoiceStatus::Cancelled;
        let result = applier.apply(&cancelled, &command(1000, Some(now() + Duration::days(1))), now());
        assert!(matches!(result, Err(BillingError::InvoiceNotPayable { .. })));
    }

    #[test]
    fn test_zero_due_settles_with_zero() {
        let invoice = InvoiceBuilder::default()
            .build(Uuid::new_v4(), InvoiceRequest::new(ConsultationType::Followup), true, now())
            .unwrap();
        let paid = PaymentApplier::new()
            .apply(&invoice, &command(0, Some(now() + Duration::days(2))), now())
            .unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);
    }
}
