//! Read-time repair of stored invoices for display.
//!
//! Invoices written under earlier schema revisions may carry a consultation
//! fee that silently absorbed its service charge, or aggregates that drifted
//! away from their line items. Nothing here writes back: the reconciler
//! derives a display model whose line items always add up to the stored
//! total, and a single status badge.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::{FeeSchedule, HistoricSplit, ReconciliationConfig};
use crate::models::{
    round_money, ConsultationType, Invoice, InvoiceStatus, InvoiceTotals, LineItem, LineItemKind,
};

/// Badge shown for an invoice in lists and previews
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    Cancelled,
    Refunded,
    PartiallyRefunded,
    PendingPayment,
    PartialPayment,
    FullyPaid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundState {
    None,
    Partial,
    Full,
}

/// The handful of facts the badge depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFacts {
    pub cancelled: bool,
    pub refund_state: RefundState,
    pub paid: Decimal,
    pub total: Decimal,
}

impl StatusFacts {
    pub fn from_invoice(invoice: &Invoice) -> Self {
        let refund_state = if invoice.status == InvoiceStatus::Refunded || invoice.refunded_at.is_some() {
            RefundState::Full
        } else if invoice.status == InvoiceStatus::PartiallyRefunded || invoice.refunded_total() > Decimal::ZERO {
            RefundState::Partial
        } else {
            RefundState::None
        };

        Self {
            cancelled: invoice.is_cancelled(),
            refund_state,
            paid: invoice.totals.paid,
            total: invoice.totals.total,
        }
    }
}

/// `Cancelled > Refunded > PartiallyRefunded > payment progress`
pub fn derive_display_status(facts: &StatusFacts) -> DisplayStatus {
    if facts.cancelled {
        return DisplayStatus::Cancelled;
    }
    match facts.refund_state {
        RefundState::Full => DisplayStatus::Refunded,
        RefundState::Partial => DisplayStatus::PartiallyRefunded,
        RefundState::None if facts.paid <= Decimal::ZERO => DisplayStatus::PendingPayment,
        RefundState::None if facts.paid < facts.total => DisplayStatus::PartialPayment,
        RefundState::None => DisplayStatus::FullyPaid,
    }
}

/// A repair applied while reconciling, reported for auditing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "repair", rename_all = "snake_case")]
pub enum Repair {
    /// Consultation fee reduced to its canonical amount
    ConsultationFeeNormalized { stored: Decimal, canonical: Decimal },
    StandardServiceChargeSynthesized { amount: Decimal },
    AdditionalServicesSynthesized { amount: Decimal },
    /// Stored lines exceeded the total and were trimmed from the end
    LineItemsTrimmed { amount: Decimal },
    /// Stored tax or discount could not be reconciled with the total and was dropped
    AdjustmentsDropped { tax_amount: Decimal, discount_amount: Decimal },
}

/// A line item with its share of the money trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayLineItem {
    pub kind: LineItemKind,
    pub name: String,
    pub amount: Decimal,
    pub paid_share: Decimal,
    pub refunded_share: Decimal,
    /// Not present in the stored record
    pub synthesized: bool,
}

/// Everything a list or preview renders for one invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledInvoice {
    pub invoice_id: Uuid,
    pub status: DisplayStatus,
    pub line_items: Vec<DisplayLineItem>,
    pub totals: InvoiceTotals,
    pub refunded: Decimal,
    pub repairs: Vec<Repair>,
}

impl ReconciledInvoice {
    pub fn line_item_sum(&self) -> Decimal {
        self.line_items.iter().map(|item| item.amount).sum()
    }
}

/// Canonical fee per consultation type, plus the historic splits that
/// override it for specific stored fees
#[derive(Debug, Clone)]
pub struct CanonicalFeeTable {
    fees: FeeSchedule,
    historic_splits: Vec<HistoricSplit>,
}

impl Default for CanonicalFeeTable {
    fn default() -> Self {
        Self::new(FeeSchedule::default(), &ReconciliationConfig::default())
    }
}

impl CanonicalFeeTable {
    pub fn new(fees: FeeSchedule, reconciliation: &ReconciliationConfig) -> Self {
        Self {
            fees,
            historic_splits: reconciliation.historic_splits.clone(),
        }
    }

    pub fn standard_service_charge(&self) -> Decimal {
        self.fees.standard_service_charge
    }

    /// Canonical display fee for a stored consultation fee.
    ///
    /// Historic splits are skipped for fee-waived invoices, whose bare fee
    /// was never meant to carry a service charge.
    pub fn canonical_fee(&self, consultation_type: ConsultationType, stored_fee: Decimal, fee_waived: bool) -> Decimal {
        if !fee_waived {
            if let Some(split) = self
                .historic_splits
                .iter()
                .find(|split| split.consultation_type == consultation_type && split.stored_fee == stored_fee)
            {
                return split.consultation_fee;
            }
        }
        self.fees.fee_for(consultation_type)
    }
}

/// Spread `amount` over `weights` proportionally; the last weighted line
/// absorbs rounding so the shares always add up to `amount` exactly.
pub fn allocate_proportionally(amount: Decimal, weights: &[Decimal]) -> Vec<Decimal> {
    let mut shares = vec![Decimal::ZERO; weights.len()];
    if amount == Decimal::ZERO || weights.is_empty() {
        return shares;
    }

    let weight_total: Decimal = weights.iter().copied().filter(|w| *w > Decimal::ZERO).sum();
    let last_weighted = weights.iter().rposition(|w| *w > Decimal::ZERO);

    let (Some(last), true) = (last_weighted, weight_total > Decimal::ZERO) else {
        if let Some(first) = shares.first_mut() {
            *first = amount;
        }
        return shares;
    };

    let mut allocated = Decimal::ZERO;
    for (index, (share, weight)) in shares.iter_mut().zip(weights).enumerate() {
        if *weight <= Decimal::ZERO {
            continue;
        }
        if index == last {
            *share = amount - allocated;
        } else {
            *share = round_money(amount * *weight / weight_total);
            allocated += *share;
        }
    }
    shares
}

struct WorkingLine {
    item: LineItem,
    synthesized: bool,
}

/// Derives display status and consistent line items from stored invoices
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    table: CanonicalFeeTable,
}

impl Reconciler {
    pub fn new(table: CanonicalFeeTable) -> Self {
        Self { table }
    }

    pub fn display_status(&self, invoice: &Invoice) -> DisplayStatus {
        derive_display_status(&StatusFacts::from_invoice(invoice))
    }

    pub fn reconcile(&self, invoice: &Invoice) -> ReconciledInvoice {
        let mut repairs = Vec::new();

        let total = invoice.totals.total.max(Decimal::ZERO);
        let mut tax_amount = invoice.totals.tax_amount;
        let mut discount_amount = invoice.totals.discount_amount;
        let mut target = total - tax_amount + discount_amount;
        if tax_amount < Decimal::ZERO || discount_amount < Decimal::ZERO || target < Decimal::ZERO {
            repairs.push(Repair::AdjustmentsDropped { tax_amount, discount_amount });
            tax_amount = Decimal::ZERO;
            discount_amount = Decimal::ZERO;
            target = total;
        }

        let stored_fee = invoice.consultation_fee().max(Decimal::ZERO);
        let mut lines: Vec<WorkingLine> = invoice
            .service_charges()
            .map(|item| WorkingLine {
                item: LineItem { amount: item.amount.max(Decimal::ZERO), ..item.clone() },
                synthesized: false,
            })
            .collect();

        let canonical = self
            .table
            .canonical_fee(invoice.consultation_type, stored_fee, invoice.fee_waived);
        let mut fee = stored_fee;

        // A fee above canonical with no service charge beside it absorbed one
        if stored_fee > canonical && lines.is_empty() {
            let excess = stored_fee - canonical;
            fee = canonical;
            repairs.push(Repair::ConsultationFeeNormalized { stored: stored_fee, canonical });

            let standard = self.table.standard_service_charge();
            if standard > Decimal::ZERO && excess >= standard {
                lines.push(WorkingLine {
                    item: LineItem::service_charge(LineItem::STANDARD_SERVICE_CHARGE, standard),
                    synthesized: true,
                });
                repairs.push(Repair::StandardServiceChargeSynthesized { amount: standard });
            }
        }

        lines.insert(
            0,
            WorkingLine {
                item: LineItem::consultation_fee(fee),
                synthesized: false,
            },
        );

        let sum: Decimal = lines.iter().map(|line| line.item.amount).sum();
        if sum < target {
            let remainder = target - sum;
            lines.push(WorkingLine {
                item: LineItem::service_charge(LineItem::ADDITIONAL_SERVICES, remainder),
                synthesized: true,
            });
            repairs.push(Repair::AdditionalServicesSynthesized { amount: remainder });
        } else if sum > target {
            let overflow = sum - target;
            Self::trim_from_end(&mut lines, overflow);
            repairs.push(Repair::LineItemsTrimmed { amount: overflow });
        }

        // Drop synthesized lines emptied by trimming; the fee line always stays
        lines.retain(|line| !line.synthesized || line.item.amount > Decimal::ZERO);

        let paid = invoice.totals.paid.max(Decimal::ZERO).min(total);
        let refunded = invoice.refunded_total().max(Decimal::ZERO).min(paid);

        let weights: Vec<Decimal> = lines.iter().map(|line| line.item.amount).collect();
        let paid_shares = allocate_proportionally(paid, &weights);
        let refunded_shares = allocate_proportionally(refunded, &weights);

        let line_items: Vec<DisplayLineItem> = lines
            .into_iter()
            .zip(paid_shares.into_iter().zip(refunded_shares))
            .map(|(line, (paid_share, refunded_share))| DisplayLineItem {
                kind: line.item.kind,
                name: line.item.name,
                amount: line.item.amount,
                paid_share,
                refunded_share,
                synthesized: line.synthesized,
            })
            .collect();

        let reconciled = ReconciledInvoice {
            invoice_id: invoice.id,
            status: self.display_status(invoice),
            totals: InvoiceTotals {
                subtotal: target,
                tax_amount,
                discount_amount,
                total,
                paid,
                due: total - paid,
            },
            refunded,
            line_items,
            repairs,
        };

        if !reconciled.repairs.is_empty() {
            debug!(
                invoice_id = %invoice.id,
                repairs = reconciled.repairs.len(),
                "Reconciled drifted invoice for display"
            );
        }

        reconciled
    }

    fn trim_from_end(lines: &mut [WorkingLine], mut overflow: Decimal) {
        for line in lines.iter_mut().rev() {
            if overflow <= Decimal::ZERO {
                break;
            }
            let cut = line.item.amount.min(overflow);
            line.item.amount -= cut;
            overflow -= cut;
        }
    }
}
