//! Reassignment billing for patient doctor-reassignment workflows
//!
//! Provides:
//! - Free-reassignment eligibility within the window after the first paid consultation
//! - Invoice construction from a configurable fee table
//! - Full-settlement payments tied to a future appointment
//! - Cancellation and behavior-dependent refunds with a registration penalty
//! - Read-time reconciliation of drifted historical invoices for display
//!
//! Components are pure functions over an [`Invoice`]; [`BillingService`]
//! wires them to storage with optimistic versioning and idempotent replays.
//!
//! ```
//! use reassignment_billing::{InvoiceBuilder, InvoiceRequest, ConsultationType, Reconciler};
//! use chrono::Utc;
//! use uuid::Uuid;
//!
//! let invoice = InvoiceBuilder::default()
//!     .build(Uuid::new_v4(), InvoiceRequest::new(ConsultationType::Op), false, Utc::now())
//!     .unwrap();
//! let display = Reconciler::default().reconcile(&invoice);
//! assert_eq!(display.line_item_sum(), invoice.totals.subtotal);
//! ```

pub mod builder;
pub mod cancellation;
pub mod clock;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod idempotency;
pub mod legacy;
pub mod models;
pub mod payment;
pub mod reconcile;
pub mod refund;
pub mod repository;
pub mod routes;
pub mod service;

pub use builder::{compute_totals, InvoiceBuilder, InvoiceRequest, ServiceChargeInput};
pub use cancellation::CancellationHandler;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{BillingConfig, FeeSchedule, HistoricSplit, PolicyConfig, ReconciliationConfig, RetryConfig};
pub use eligibility::{EligibilityEvaluator, EligibilityOutcome};
pub use error::{BillingError, BillingResult};
pub use idempotency::{IdempotencyKey, Operation};
pub use legacy::LegacyInvoiceRecord;
pub use models::*;
pub use payment::{PaymentApplier, PaymentCommand};
pub use reconcile::{
    derive_display_status, DisplayLineItem, DisplayStatus, ReconciledInvoice, Reconciler, Repair, StatusFacts,
};
pub use refund::{RefundCalculator, RefundCommand, RefundQuote};
pub use repository::{InMemoryInvoiceRepository, InMemoryPatientRepository, InvoiceRepository, PatientRepository};
pub use routes::billing_routes;
pub use service::{BillingService, MutationOptions, ReassignmentOutcome, ReassignmentRequest};
