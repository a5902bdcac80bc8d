//! Common error handling utilities for the reassignment billing engine
//! 
//! This crate provides the error taxonomy, error codes and error context
//! shared by every crate in the workspace. Domain crates keep their own
//! `thiserror` enums and convert into [`RustCareError`] at their boundary.
//! 
//! # Error Categories
//! 
//! - **Validation**: operator mistakes, rejected synchronously and never retried
//! - **State**: the resource is not in a state compatible with the request,
//!   or a concurrent writer won the race; callers re-fetch and may retry
//! - **Infrastructure**: persistence or network failures, retried with an
//!   idempotency key
//! 
//! # Example
//! 
//! ```rust
//! use error_common::{RustCareError, ErrorCategory};
//! 
//! fn check_amount(amount: i64) -> Result<i64, RustCareError> {
//!     if amount < 0 {
//!         return Err(RustCareError::ValidationError("amount must not be negative".into()));
//!     }
//!     Ok(amount)
//! }
//! 
//! let err = check_amount(-1).unwrap_err();
//! assert_eq!(err.category(), ErrorCategory::Validation);
//! ```

pub mod types;
pub mod context;
pub mod codes;

pub use types::*;
pub use context::*;
pub use codes::*;
