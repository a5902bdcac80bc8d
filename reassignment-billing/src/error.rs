use error_common::{codes, ErrorCategory, RustCareError};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::models::InvoiceStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BillingError {
    #[error("Payment amount {actual} does not settle the amount due {expected}")]
    AmountMismatch { expected: Decimal, actual: Decimal },

    #[error("Invalid appointment schedule: {0}")]
    InvalidSchedule(String),

    #[error("Refund of {requested} exceeds the refundable amount {max_refundable}")]
    RefundExceedsAvailable { requested: Decimal, max_refundable: Decimal },

    #[error("Unknown consultation type: {0}")]
    UnknownConsultationType(String),

    #[error("{field} must not be negative (got {value})")]
    NegativeAmount { field: &'static str, value: Decimal },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invoice {invoice_id} is not payable in status {status}")]
    InvoiceNotPayable { invoice_id: Uuid, status: InvoiceStatus },

    #[error("Invoice {invoice_id} is already {status}")]
    AlreadyTerminal { invoice_id: Uuid, status: InvoiceStatus },

    #[error("Invoice {invoice_id} was modified concurrently (expected version {expected}, found {found})")]
    Conflict { invoice_id: Uuid, expected: u64, found: u64 },

    #[error("Invoice not found: {0}")]
    InvoiceNotFound(Uuid),

    #[error("Patient not found: {0}")]
    PatientNotFound(Uuid),

    #[error("Reassignment blocked: {0}")]
    ReassignmentBlocked(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BillingError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            BillingError::AmountMismatch { .. }
            | BillingError::InvalidSchedule(_)
            | BillingError::RefundExceedsAvailable { .. }
            | BillingError::UnknownConsultationType(_)
            | BillingError::NegativeAmount { .. }
            | BillingError::Validation(_) => ErrorCategory::Validation,
            BillingError::InvoiceNotPayable { .. }
            | BillingError::AlreadyTerminal { .. }
            | BillingError::Conflict { .. }
            | BillingError::InvoiceNotFound(_)
            | BillingError::PatientNotFound(_)
            | BillingError::ReassignmentBlocked(_) => ErrorCategory::State,
            BillingError::Persistence(_) | BillingError::Config(_) => ErrorCategory::Infrastructure,
        }
    }

    /// Stable code reported to API callers
    pub fn code(&self) -> &'static str {
        match self {
            BillingError::AmountMismatch { .. } => codes::billing::AMOUNT_MISMATCH,
            BillingError::InvalidSchedule(_) => codes::billing::INVALID_SCHEDULE,
            BillingError::RefundExceedsAvailable { .. } => codes::billing::REFUND_EXCEEDS_AVAILABLE,
            BillingError::UnknownConsultationType(_) => codes::validation::UNKNOWN_CONSULTATION_TYPE,
            BillingError::NegativeAmount { .. } => codes::validation::NEGATIVE_AMOUNT,
            BillingError::Validation(_) => codes::validation::INVALID_INPUT,
            BillingError::InvoiceNotPayable { .. } => codes::billing::INVOICE_NOT_PAYABLE,
            BillingError::AlreadyTerminal { .. } => codes::billing::ALREADY_TERMINAL,
            BillingError::Conflict { .. } => codes::concurrency::VERSION_CONFLICT,
            BillingError::InvoiceNotFound(_) => codes::billing::INVOICE_NOT_FOUND,
            BillingError::PatientNotFound(_) => codes::billing::PATIENT_NOT_FOUND,
            BillingError::ReassignmentBlocked(_) => codes::billing::REASSIGNMENT_BLOCKED,
            BillingError::Persistence(_) => codes::database::QUERY_FAILED,
            BillingError::Config(_) => codes::configuration::INVALID_CONFIG,
        }
    }

    /// Only persistence failures are retried; everything else is reported as is
    pub fn is_retryable(&self) -> bool {
        matches!(self, BillingError::Persistence(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BillingError::InvoiceNotFound(_) | BillingError::PatientNotFound(_))
    }
}

impl From<BillingError> for RustCareError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::Conflict { .. } => RustCareError::ConflictError(err.to_string()),
            BillingError::InvoiceNotFound(_) | BillingError::PatientNotFound(_) => {
                RustCareError::NotFound(err.to_string())
            }
            BillingError::Persistence(msg) => RustCareError::DatabaseError(msg),
            BillingError::Config(msg) => RustCareError::ConfigError(msg),
            other => match other.category() {
                ErrorCategory::Validation => RustCareError::ValidationError(other.to_string()),
                _ => RustCareError::BusinessError(other.to_string()),
            },
        }
    }
}

impl From<config::ConfigError> for BillingError {
    fn from(err: config::ConfigError) -> Self {
        BillingError::Config(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
