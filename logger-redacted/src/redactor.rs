use regex::Regex;
use lazy_static::lazy_static;
use sha2::{Sha256, Digest};
use base64::{Engine as _, engine::general_purpose};

use crate::config::LoggerConfig;

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap();
    static ref UPI_REGEX: Regex = Regex::new(r"\b[A-Za-z0-9._-]{2,}@[A-Za-z]{2,}\b").unwrap();
    static ref PHONE_REGEX: Regex = Regex::new(r"\b(?:\+\d{1,3}[-.\s]?)?\(?([0-9]{3})\)?[-.\s]?([0-9]{3})[-.\s]?([0-9]{4})\b").unwrap();
    static ref CREDIT_CARD_REGEX: Regex = Regex::new(r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?(\d{4})\b").unwrap();
    static ref ACCOUNT_REGEX: Regex = Regex::new(r"\b\d{5,14}(\d{4})\b").unwrap();
}

/// PII redaction configuration
#[derive(Debug, Clone)]
pub struct RedactionConfig {
    pub redact_emails: bool,
    pub redact_phones: bool,
    pub redact_credit_cards: bool,
    pub redact_upi_handles: bool,
    pub redact_account_numbers: bool,
    pub hash_for_correlation: bool,
    pub custom_patterns: Vec<(Regex, String)>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            redact_emails: true,
            redact_phones: true,
            redact_credit_cards: true,
            redact_upi_handles: true,
            redact_account_numbers: true,
            hash_for_correlation: false,
            custom_patterns: Vec::new(),
        }
    }
}

impl RedactionConfig {
    /// Redaction settings derived from the logger configuration.
    ///
    /// With redaction disabled every detector is switched off and the
    /// redactor passes text through unchanged.
    pub fn from_logger_config(config: &LoggerConfig) -> Self {
        let enabled = config.redaction_enabled;
        Self {
            redact_emails: enabled,
            redact_phones: enabled,
            redact_credit_cards: enabled,
            redact_upi_handles: enabled,
            redact_account_numbers: enabled,
            hash_for_correlation: config.hash_for_correlation,
            custom_patterns: Vec::new(),
        }
    }

    pub fn with_custom_pattern(mut self, pattern: Regex, replacement: impl Into<String>) -> Self {
        self.custom_patterns.push((pattern, replacement.into()));
        self
    }
}

/// PII redactor for log messages
#[derive(Debug, Clone)]
pub struct PiiRedactor {
    config: RedactionConfig,
}

impl Default for PiiRedactor {
    fn default() -> Self {
        Self::new(RedactionConfig::default())
    }
}

impl PiiRedactor {
    pub fn new(config: RedactionConfig) -> Self {
        Self { config }
    }

    pub fn redact(&self, text: &str) -> String {
        let mut result = text.to_string();

        // Cards before phones and accounts: a card number contains both shapes.
        if self.config.redact_credit_cards {
            result = self.redact_credit_cards(&result);
        }

        if self.config.redact_emails {
            result = self.redact_emails(&result);
        }

        if self.config.redact_upi_handles {
            result = self.redact_upi_handles(&result);
        }

        if self.config.redact_phones {
            result = self.redact_phones(&result);
        }

        if self.config.redact_account_numbers {
            result = self.redact_account_numbers(&result);
        }

        for (pattern, replacement) in &self.config.custom_patterns {
            result = pattern.replace_all(&result, replacement.as_str()).to_string();
        }

        result
    }

    /// Redact an optional value, keeping `None` as is
    pub fn redact_opt(&self, text: Option<&str>) -> Option<String> {
        text.map(|t| self.redact(t))
    }

    fn redact_emails(&self, text: &str) -> String {
        EMAIL_REGEX.replace_all(text, |caps: &regex::Captures| {
            let email = &caps[0];
            if self.config.hash_for_correlation {
                format!("EMAIL[{}]", self.hash_value(email))
            } else {
                match email.split_once('@') {
                    Some((local, domain)) => format!(
                        "{}***@{}***",
                        local.chars().next().unwrap_or('*'),
                        domain.chars().next().unwrap_or('*')
                    ),
                    None => "***@***".to_string(),
                }
            }
        }).to_string()
    }

    fn redact_upi_handles(&self, text: &str) -> String {
        UPI_REGEX.replace_all(text, |caps: &regex::Captures| {
            if self.config.hash_for_correlation {
                format!("UPI[{}]", self.hash_value(&caps[0]))
            } else {
                "UPI[***]".to_string()
            }
        }).to_string()
    }

    fn redact_phones(&self, text: &str) -> String {
        PHONE_REGEX.replace_all(text, |caps: &regex::Captures| {
            if self.config.hash_for_correlation {
                format!("PHONE[{}]", self.hash_value(&caps[0]))
            } else {
                "(***) ***-****".to_string()
            }
        }).to_string()
    }

    fn redact_credit_cards(&self, text: &str) -> String {
        CREDIT_CARD_REGEX.replace_all(text, |caps: &regex::Captures| {
            if self.config.hash_for_correlation {
                format!("CC[{}]", self.hash_value(&caps[0]))
            } else {
                format!("****-****-****-{}", &caps[1])
            }
        }).to_string()
    }

    fn redact_account_numbers(&self, text: &str) -> String {
        ACCOUNT_REGEX.replace_all(text, |caps: &regex::Captures| {
            if self.config.hash_for_correlation {
                format!("ACCT[{}]", self.hash_value(&caps[0]))
            } else {
                format!("ACCT[****{}]", &caps[1])
            }
        }).to_string()
    }

    fn hash_value(&self, value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(value.as_bytes());
        let result = hasher.finalize();
        general_purpose::STANDARD.encode(&result[..8]) // Use first 8 bytes for shorter hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_redaction() {
        let redactor = PiiRedactor::default();

        let text = "Receipt sent to john.doe@example.com";
        let redacted = redactor.redact(text);
        assert!(redacted.contains("j***@e***"));
        assert!(!redacted.contains("john.doe"));
    }

    #[test]
    fn test_phone_redaction() {
        let redactor = PiiRedactor::default();

        let text = "Call me at (555) 123-4567";
        let redacted = redactor.redact(text);
        assert!(redacted.contains("(***) ***-****"));
    }

    #[test]
    fn test_card_keeps_last_four() {
        let redactor = PiiRedactor::default();

        let redacted = redactor.redact("card 4111 1111 1111 1234 swiped");
        assert_eq!(redacted, "card ****-****-****-1234 swiped");
    }

    #[test]
    fn test_upi_handle_redaction() {
        let redactor = PiiRedactor::default();

        let redacted = redactor.redact("UPI ref from ravi.k@okaxis");
        assert_eq!(redacted, "UPI ref from UPI[***]");
    }

    #[test]
    fn test_account_number_keeps_last_four() {
        let redactor = PiiRedactor::default();

        let redacted = redactor.redact("NEFT from a/c 001234567890");
        assert_eq!(redacted, "NEFT from a/c ACCT[****7890]");
    }

    #[test]
    fn test_short_receipt_numbers_survive() {
        let redactor = PiiRedactor::default();

        assert_eq!(redactor.redact("receipt R-20931"), "receipt R-20931");
    }

    #[test]
    fn test_hashing_is_stable() {
        let redactor = PiiRedactor::new(RedactionConfig {
            hash_for_correlation: true,
            ..Default::default()
        });

        let first = redactor.redact("ravi.k@okaxis");
        let second = redactor.redact("ravi.k@okaxis");
        assert_eq!(first, second);
        assert!(first.starts_with("UPI["));
    }

    #[test]
    fn test_disabled_redaction_passes_through() {
        let config = LoggerConfig {
            redaction_enabled: false,
            ..Default::default()
        };
        let redactor = PiiRedactor::new(RedactionConfig::from_logger_config(&config));

        assert_eq!(redactor.redact("4111 1111 1111 1234"), "4111 1111 1111 1234");
    }

    #[test]
    fn test_custom_pattern() {
        let redactor = PiiRedactor::new(
            RedactionConfig::default()
                .with_custom_pattern(Regex::new(r"\bMRN\d+").unwrap(), "MRN[REDACTED]"),
        );

        assert_eq!(redactor.redact("patient MRN123456"), "patient MRN[REDACTED]");
    }
}
