use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::PolicyConfig;
use crate::error::{BillingError, BillingResult};
use crate::models::{Invoice, InvoiceStatus, PatientBehavior, PaymentMethod, Refund, RefundType};

/// A refund request as entered by staff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundCommand {
    /// `None` refunds everything currently refundable
    #[serde(default)]
    pub amount: Option<Decimal>,
    pub refund_type: RefundType,
    pub patient_behavior: PatientBehavior,
    pub method: PaymentMethod,
    pub reason: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// What may be refunded right now, and why
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundQuote {
    pub paid: Decimal,
    pub already_refunded: Decimal,
    /// `paid - already_refunded`
    pub available_base: Decimal,
    /// Portion of `available_base` held back for the registration fee
    pub penalty: Decimal,
    pub max_refundable: Decimal,
}

/// Computes refundable amounts under the behavior-dependent penalty policy
#[derive(Debug, Clone)]
pub struct RefundCalculator {
    registration_penalty: Decimal,
}

impl Default for RefundCalculator {
    fn default() -> Self {
        Self::new(&PolicyConfig::default())
    }
}

impl RefundCalculator {
    pub fn new(policy: &PolicyConfig) -> Self {
        Self {
            registration_penalty: policy.registration_penalty,
        }
    }

    /// The penalty reserved for this refund. Once any refund on the invoice
    /// has withheld it, it stays withheld whatever the later behavior.
    fn penalty_for(&self, invoice: &Invoice, behavior: PatientBehavior) -> Decimal {
        if matches!(behavior, PatientBehavior::Okay) || penalty_applied(invoice) {
            self.registration_penalty
        } else {
            Decimal::ZERO
        }
    }

    /// The penalty is a reserve, not a per-refund deduction: it is held back
    /// once from whatever has not yet been refunded.
    pub fn quote(&self, invoice: &Invoice, behavior: PatientBehavior) -> RefundQuote {
        let paid = invoice.totals.paid;
        let already_refunded = invoice.refunded_total();
        let available_base = (paid - already_refunded).max(Decimal::ZERO);
        let penalty = self.penalty_for(invoice, behavior).min(available_base);

        RefundQuote {
            paid,
            already_refunded,
            available_base,
            penalty,
            max_refundable: available_base - penalty,
        }
    }

    pub fn apply(&self, invoice: &Invoice, command: &RefundCommand, now: DateTime<Utc>) -> BillingResult<Invoice> {
        if command.reason.trim().is_empty() {
            return Err(BillingError::Validation("a refund reason is required".to_string()));
        }

        let quote = self.quote(invoice, command.patient_behavior);
        let requested = command.amount.unwrap_or(quote.max_refundable);

        if requested < Decimal::ZERO {
            return Err(BillingError::NegativeAmount {
                field: "amount",
                value: requested,
            });
        }
        if requested <= Decimal::ZERO || requested > quote.max_refundable {
            return Err(BillingError::RefundExceedsAvailable {
                requested,
                max_refundable: quote.max_refundable,
            });
        }
        if command.refund_type == RefundType::Full && requested != quote.max_refundable {
            return Err(BillingError::AmountMismatch {
                expected: quote.max_refundable,
                actual: requested,
            });
        }

        let total_refunded = quote.already_refunded + requested;
        let retained = quote.paid - total_refunded;

        let mut refunded = invoice.clone();
        refunded.refunds.push(Refund {
            id: Uuid::new_v4(),
            amount: requested,
            method: command.method,
            reason: command.reason.trim().to_string(),
            patient_behavior: command.patient_behavior,
            notes: command.notes.clone(),
            penalty_withheld: quote.penalty,
            timestamp: now,
        });

        // Only the non-refundable penalty, if this invoice ever withheld it, is left
        let retained_penalty = if penalty_applied(&refunded) {
            self.registration_penalty
        } else {
            Decimal::ZERO
        };
        if retained <= retained_penalty {
            refunded.status = InvoiceStatus::Refunded;
            refunded.refunded_at = Some(now);
        } else {
            refunded.status = InvoiceStatus::PartiallyRefunded;
        }
        refunded.check_invariants()?;

        Ok(refunded)
    }
}

fn penalty_applied(invoice: &Invoice) -> bool {
    invoice
        .refunds
        .iter()
        .any(|refund| refund.penalty_withheld > Decimal::ZERO)
}
