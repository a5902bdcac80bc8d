use chrono::{DateTime, Utc};

use crate::error::{BillingError, BillingResult};
use crate::models::{Invoice, InvoiceStatus};

/// Marks an invoice non-billable while keeping its money trail
#[derive(Debug, Clone, Copy, Default)]
pub struct CancellationHandler;

impl CancellationHandler {
    pub fn new() -> Self {
        Self
    }

    pub fn cancel(&self, invoice: &Invoice, reason: &str, now: DateTime<Utc>) -> BillingResult<Invoice> {
        // A refund after cancelling moves the status on, but the cancellation stands
        if invoice.is_cancelled() || invoice.status == InvoiceStatus::Refunded {
            return Err(BillingError::AlreadyTerminal {
                invoice_id: invoice.id,
                status: invoice.status,
            });
        }

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(BillingError::Validation("a cancellation reason is required".to_string()));
        }

        // paid, due and line items stay untouched so a later refund sees the original payment
        let mut cancelled = invoice.clone();
        cancelled.status = InvoiceStatus::Cancelled;
        cancelled.cancelled_at = Some(now);
        cancelled.cancellation_reason = Some(reason.to_string());
        cancelled.check_invariants()?;

        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{InvoiceBuilder, InvoiceRequest};
    use crate::models::ConsultationType;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn invoice() -> Invoice {
        InvoiceBuilder::default()
            .build(Uuid::new_v4(), InvoiceRequest::new(ConsultationType::Op), false, Utc::now())
            .unwrap()
    }

    #[test]
    fn test_cancel_preserves_amounts() {
        let mut paid = invoice();
        paid.totals.paid = paid.totals.total;
        paid.totals.due = Decimal::ZERO;
        paid.status = InvoiceStatus::Paid;

        let now = Utc::now();
        let cancelled = CancellationHandler::new().cancel(&paid, "patient left", now).unwrap();

        assert_eq!(cancelled.status, InvoiceStatus::Cancelled);
        assert_eq!(cancelled.cancelled_at, Some(now));
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("patient left"));
        assert_eq!(cancelled.totals, paid.totals);
        assert_eq!(cancelled.line_items, paid.line_items);
    }

    #[test]
    fn test_partially_refunded_can_be_cancelled() {
        let mut partial = invoice();
        partial.status = InvoiceStatus::PartiallyRefunded;
        assert!(CancellationHandler::new().cancel(&partial, "duplicate", Utc::now()).is_ok());
    }

    #[test]
    fn test_cancelled_then_refunded_stays_cancelled() {
        let mut paid = invoice();
        paid.totals.paid = paid.totals.total;
        paid.totals.due = Decimal::ZERO;
        paid.status = InvoiceStatus::Paid;

        let handler = CancellationHandler::new();
        let first_at = Utc::now();
        let mut refunded = handler.cancel(&paid, "first reason", first_at).unwrap();
        refunded.status = InvoiceStatus::PartiallyRefunded;

        let result = handler.cancel(&refunded, "second reason", first_at + chrono::Duration::days(3));
        assert_eq!(
            result,
            Err(BillingError::AlreadyTerminal {
                invoice_id: refunded.id,
                status: InvoiceStatus::PartiallyRefunded
            })
        );
        assert_eq!(refunded.cancelled_at, Some(first_at));
        assert_eq!(refunded.cancellation_reason.as_deref(), Some("first reason"));
    }

    #[test]
    fn test_terminal_statuses_rejected() {
        let handler = CancellationHandler::new();
        for status in [InvoiceStatus::Cancelled, InvoiceStatus::Refunded] {
            let mut terminal = invoice();
            terminal.status = status;
            assert!(matches!(
                handler.cancel(&terminal, "again", Utc::now()),
                Err(BillingError::AlreadyTerminal { .. })
            ));
        }
    }

    #[test]
    fn test_reason_required() {
        assert!(matches!(
            CancellationHandler::new().cancel(&invoice(), "   ", Utc::now()),
            Err(BillingError::Validation(_))
        ));
    }
}
