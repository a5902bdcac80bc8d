//! Logging with automatic PII redaction for the reassignment billing engine
//! 
//! Staff type free text into payment references and refund notes. Those
//! strings routinely contain card numbers, UPI handles, phone numbers and
//! e-mail addresses, so they pass through [`PiiRedactor`] before they are
//! attached to a log event.
//! 
//! # Detected Data Types
//! 
//! - **Email Addresses**: user@example.com → u***@e***
//! - **Phone Numbers**: (555) 123-4567 → (***) ***-****
//! - **Credit Cards**: 4111-1111-1111-1111 → ****-****-****-1111
//! - **UPI Handles**: name@okbank → UPI[***]
//! - **Bank Accounts**: 9-18 digit runs → ACCT[****1234]
//! - **Custom Patterns**: configurable organization-specific patterns
//! 
//! # Example
//! 
//! ```rust
//! use logger_redacted::{PiiRedactor, RedactionConfig};
//! 
//! let redactor = PiiRedactor::new(RedactionConfig::default());
//! let safe = redactor.redact("paid by card 4111 1111 1111 1111");
//! assert!(!safe.contains("4111 1111 1111 1111"));
//! ```

pub mod redactor;
pub mod config;
pub mod init;

pub use redactor::*;
pub use config::*;
pub use init::*;
