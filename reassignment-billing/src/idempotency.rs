//! Keys for replay-safe invoice mutations.
//!
//! A key is recorded by [`crate::repository::InvoiceRepository::update_invoice`]
//! in the same write that commits the mutation, so a key is never seen
//! without its invoice change and the other way round.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Payment,
    Cancellation,
    Refund,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Payment => "payment",
            Operation::Cancellation => "cancellation",
            Operation::Refund => "refund",
        }
    }
}

/// Identifies one logical mutation across network retries
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey {
    pub invoice_id: Uuid,
    pub operation: Operation,
    pub nonce: String,
}

impl IdempotencyKey {
    pub fn new(invoice_id: Uuid, operation: Operation, nonce: impl Into<String>) -> Self {
        Self {
            invoice_id,
            operation,
            nonce: nonce.into(),
        }
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.invoice_id, self.operation.as_str(), self.nonce)
    }
}
