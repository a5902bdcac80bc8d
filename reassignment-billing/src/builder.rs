use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::FeeSchedule;
use crate::error::{BillingError, BillingResult};
use crate::models::{
    round_money, ConsultationType, Invoice, InvoiceKind, InvoiceStatus, InvoiceTotals, LineItem,
};

/// Operator-supplied service charge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceChargeInput {
    pub name: String,
    pub amount: Decimal,
}

/// Everything needed to price a new invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub consultation_type: ConsultationType,
    #[serde(default)]
    pub tax_percentage: Decimal,
    #[serde(default)]
    pub discount_percentage: Decimal,
    /// Replaces the fee-table amount when present
    #[serde(default)]
    pub consultation_fee_override: Option<Decimal>,
    /// Replaces the default service charges when present, even if empty
    #[serde(default)]
    pub service_charges: Option<Vec<ServiceChargeInput>>,
    #[serde(default = "default_kind")]
    pub kind: InvoiceKind,
}

fn default_kind() -> InvoiceKind {
    InvoiceKind::Reassignment
}

impl InvoiceRequest {
    pub fn new(consultation_type: ConsultationType) -> Self {
        Self {
            consultation_type,
            tax_percentage: Decimal::ZERO,
            discount_percentage: Decimal::ZERO,
            consultation_fee_override: None,
            service_charges: None,
            kind: InvoiceKind::Reassignment,
        }
    }

    pub fn with_tax(mut self, tax_percentage: Decimal) -> Self {
        self.tax_percentage = tax_percentage;
        self
    }

    pub fn with_discount(mut self, discount_percentage: Decimal) -> Self {
        self.discount_percentage = discount_percentage;
        self
    }

    pub fn with_consultation_fee(mut self, fee: Decimal) -> Self {
        self.consultation_fee_override = Some(fee);
        self
    }

    pub fn with_service_charges(mut self, charges: Vec<ServiceChargeInput>) -> Self {
        self.service_charges = Some(charges);
        self
    }

    pub fn with_kind(mut self, kind: InvoiceKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Derive the stored aggregates of a fresh, unpaid invoice
pub fn compute_totals(
    line_items: &[LineItem],
    tax_percentage: Decimal,
    discount_percentage: Decimal,
) -> InvoiceTotals {
    let hundred = Decimal::ONE_HUNDRED;
    let subtotal: Decimal = line_items.iter().map(|item| item.amount).sum();
    let tax_amount = round_money(subtotal * tax_percentage / hundred);
    let discount_amount = round_money(subtotal * discount_percentage / hundred);
    let total = subtotal + tax_amount - discount_amount;

    InvoiceTotals {
        subtotal,
        tax_amount,
        discount_amount,
        total,
        paid: Decimal::ZERO,
        due: total,
    }
}

fn non_negative(field: &'static str, value: Decimal) -> BillingResult<()> {
    if value < Decimal::ZERO {
        return Err(BillingError::NegativeAmount { field, value });
    }
    Ok(())
}

/// Constructs new invoices from the fee table and eligibility
#[derive(Debug, Clone, Default)]
pub struct InvoiceBuilder {
    fees: FeeSchedule,
}

impl InvoiceBuilder {
    pub fn new(fees: FeeSchedule) -> Self {
        Self { fees }
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Default consultation type when the operator does not choose one
    pub fn default_consultation_type(&self, eligible: bool) -> ConsultationType {
        if eligible {
            ConsultationType::Followup
        } else {
            ConsultationType::Op
        }
    }

    fn default_service_charges(&self, consultation_type: ConsultationType, eligible: bool) -> Vec<LineItem> {
        if consultation_type == ConsultationType::Followup || eligible {
            Vec::new()
        } else {
            vec![LineItem::service_charge(
                LineItem::STANDARD_SERVICE_CHARGE,
                self.fees.standard_service_charge,
            )]
        }
    }

    pub fn build(
        &self,
        patient_id: Uuid,
        request: InvoiceRequest,
        eligible: bool,
        now: DateTime<Utc>,
    ) -> BillingResult<Invoice> {
        non_negative("tax_percentage", request.tax_percentage)?;
        non_negative("discount_percentage", request.discount_percentage)?;
        if let Some(fee) = request.consultation_fee_override {
            non_negative("consultation_fee", fee)?;
        }

        let consultation_fee = request
            .consultation_fee_override
            .unwrap_or_else(|| self.fees.fee_for(request.consultation_type));

        let service_charges = match request.service_charges {
            Some(overrides) => {
                let mut items = Vec::with_capacity(overrides.len());
                for charge in overrides {
                    non_negative("service_charge", charge.amount)?;
                    if charge.name.trim().is_empty() {
                        return Err(BillingError::Validation("service charge name is required".to_string()));
                    }
                    items.push(LineItem::service_charge(charge.name, charge.amount));
                }
                items
            }
            None => self.default_service_charges(request.consultation_type, eligible),
        };

        let mut line_items = Vec::with_capacity(service_charges.len() + 1);
        line_items.push(LineItem::consultation_fee(consultation_fee));
        line_items.extend(service_charges);

        let totals = compute_totals(&line_items, request.tax_percentage, request.discount_percentage);
        if totals.total < Decimal::ZERO {
            return Err(BillingError::Validation(format!(
                "discount of {}% leaves a negative total",
                request.discount_percentage
            )));
        }

        let invoice = Invoice {
            id: Uuid::new_v4(),
            patient_id,
            kind: request.kind,
            consultation_type: request.consultation_type,
            fee_waived: eligible,
            line_items,
            tax_percentage: request.tax_percentage,
            discount_percentage: request.discount_percentage,
            totals,
            status: InvoiceStatus::Invoiced,
            payment_history: Vec::new(),
            refunds: Vec::new(),
            created_at: now,
            cancelled_at: None,
            cancellation_reason: None,
            refunded_at: None,
            version: 0,
        };
        invoice.check_invariants()?;
        Ok(invoice)
    }
}
