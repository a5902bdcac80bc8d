use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;
use std::str::FromStr;

use crate::error::{BillingError, BillingResult};

/// Round a currency amount to two decimal places, halves away from zero
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Kind of consultation a reassignment invoice bills for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsultationType {
    #[serde(rename = "OP")]
    Op,
    #[serde(rename = "IP")]
    Ip,
    #[serde(rename = "followup")]
    Followup,
}

impl ConsultationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsultationType::Op => "OP",
            ConsultationType::Ip => "IP",
            ConsultationType::Followup => "followup",
        }
    }
}

impl fmt::Display for ConsultationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsultationType {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "op" | "outpatient" => Ok(ConsultationType::Op),
            "ip" | "inpatient" => Ok(ConsultationType::Ip),
            "followup" | "follow-up" | "follow_up" => Ok(ConsultationType::Followup),
            _ => Err(BillingError::UnknownConsultationType(s.to_string())),
        }
    }
}

/// Line item kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineItemKind {
    ConsultationFee,
    ServiceCharge,
}

/// A named, priced component of an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub kind: LineItemKind,
    pub name: String,
    pub amount: Decimal,
}

impl LineItem {
    pub const CONSULTATION_FEE: &'static str = "Consultation Fee";
    pub const STANDARD_SERVICE_CHARGE: &'static str = "Standard Service Charge";
    pub const ADDITIONAL_SERVICES: &'static str = "Additional Services";

    pub fn consultation_fee(amount: Decimal) -> Self {
        Self {
            kind: LineItemKind::ConsultationFee,
            name: Self::CONSULTATION_FEE.to_string(),
            amount,
        }
    }

    pub fn service_charge(name: impl Into<String>, amount: Decimal) -> Self {
        Self {
            kind: LineItemKind::ServiceCharge,
            name: name.into(),
            amount,
        }
    }
}

/// Aggregates stored alongside the line items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub total: Decimal,
    pub paid: Decimal,
    pub due: Decimal,
}

/// Stored lifecycle status of an invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Invoiced,
    Paid,
    Cancelled,
    PartiallyRefunded,
    Refunded,
}

impl InvoiceStatus {
    /// Statuses from which the invoice is still the patient's working bill
    pub fn is_open(&self) -> bool {
        matches!(self, InvoiceStatus::Invoiced | InvoiceStatus::Paid)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Invoiced => "invoiced",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Cancelled => "cancelled",
            InvoiceStatus::PartiallyRefunded => "partially_refunded",
            InvoiceStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the invoice was raised at registration or by a reassignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceKind {
    Original,
    Reassignment,
}

/// Payment or refund mode recorded by staff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    CreditCard,
    DebitCard,
    Upi,
    BankTransfer,
    Check,
    Insurance,
}

/// Payment record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    /// The consultation scheduled together with this settlement
    pub appointment_time: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

/// Staff assessment that decides whether the registration penalty applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatientBehavior {
    Okay,
    Rude,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundType {
    Full,
    Partial,
}

/// Refund record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub reason: String,
    pub patient_behavior: PatientBehavior,
    pub notes: Option<String>,
    /// Portion of the paid amount held back by this refund
    #[serde(default)]
    pub penalty_withheld: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// One billable record with its payment and refund ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub kind: InvoiceKind,
    pub consultation_type: ConsultationType,
    /// Built under a free reassignment
    #[serde(default)]
    pub fee_waived: bool,
    pub line_items: Vec<LineItem>,
    pub tax_percentage: Decimal,
    pub discount_percentage: Decimal,
    pub totals: InvoiceTotals,
    pub status: InvoiceStatus,
    pub payment_history: Vec<Payment>,
    pub refunds: Vec<Refund>,
    pub created_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub refunded_at: Option<DateTime<Utc>>,
    /// Bumped by the repository on every committed write
    #[serde(default)]
    pub version: u64,
}

impl Invoice {
    pub fn line_item_sum(&self) -> Decimal {
        self.line_items.iter().map(|item| item.amount).sum()
    }

    pub fn refunded_total(&self) -> Decimal {
        self.refunds.iter().map(|refund| refund.amount).sum()
    }

    pub fn consultation_fee(&self) -> Decimal {
        self.line_items
            .iter()
            .filter(|item| item.kind == LineItemKind::ConsultationFee)
            .map(|item| item.amount)
            .sum()
    }

    pub fn service_charges(&self) -> impl Iterator<Item = &LineItem> {
        self.line_items
            .iter()
            .filter(|item| item.kind == LineItemKind::ServiceCharge)
    }

    pub fn is_reassignment(&self) -> bool {
        self.kind == InvoiceKind::Reassignment
    }

    /// A consultation the patient actually paid for
    pub fn is_paid_consultation(&self) -> bool {
        self.totals.paid > Decimal::ZERO || self.status == InvoiceStatus::Paid
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == InvoiceStatus::Cancelled || self.cancelled_at.is_some()
    }

    pub fn latest_payment(&self) -> Option<&Payment> {
        self.payment_history.last()
    }

    /// Check the stored aggregates against the line items and ledgers.
    ///
    /// Every mutation runs this before it is committed.
    pub fn check_invariants(&self) -> BillingResult<()> {
        let totals = &self.totals;
        let fail = |what: &str| Err(BillingError::Validation(format!("invoice {} violates {}", self.id, what)));

        if self.line_items.iter().any(|item| item.amount < Decimal::ZERO) {
            return fail("non-negative line items");
        }
        if totals.subtotal != self.line_item_sum() {
            return fail("subtotal = sum of line items");
        }
        if totals.total != totals.subtotal + totals.tax_amount - totals.discount_amount {
            return fail("total = subtotal + tax - discount");
        }
        if totals.total < Decimal::ZERO {
            return fail("non-negative total");
        }
        if totals.paid < Decimal::ZERO || totals.paid > totals.total {
            return fail("0 <= paid <= total");
        }
        if totals.due != totals.total - totals.paid {
            return fail("due = total - paid");
        }
        let refunded = self.refunded_total();
        if refunded < Decimal::ZERO || refunded > totals.paid {
            return fail("0 <= refunded <= paid");
        }
        Ok(())
    }
}

/// A change of treating doctor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReassignmentEvent {
    pub from_doctor_id: Uuid,
    pub to_doctor_id: Uuid,
    pub reason: String,
    pub notes: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Set by an explicit "mark as viewed"; gates the next reassignment
    pub consultation_viewed: bool,
}

/// Patient identity and doctor assignment as seen by the billing engine.
///
/// The billing history lives in the invoice repository and is passed
/// alongside the patient where it is needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub assigned_doctor_id: Uuid,
    pub current_doctor_id: Uuid,
    #[serde(default)]
    pub reassignment_history: Vec<ReassignmentEvent>,
}

impl Patient {
    pub fn new(name: impl Into<String>, doctor_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            assigned_doctor_id: doctor_id,
            current_doctor_id: doctor_id,
            reassignment_history: Vec::new(),
        }
    }

    pub fn latest_reassignment(&self) -> Option<&ReassignmentEvent> {
        self.reassignment_history.last()
    }
}
