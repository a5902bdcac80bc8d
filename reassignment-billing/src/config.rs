use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use logger_redacted::LoggerConfig;

use crate::error::{BillingError, BillingResult};
use crate::models::ConsultationType;

/// Environment variable prefix, e.g. `REASSIGN_BILLING__POLICY__REGISTRATION_PENALTY=200`
pub const ENV_PREFIX: &str = "REASSIGN_BILLING";

/// Default config file stem, resolved as `.yaml`, `.toml` or `.json`
pub const DEFAULT_CONFIG_NAME: &str = "reassignment-billing";

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    pub fees: FeeSchedule,
    pub policy: PolicyConfig,
    pub reconciliation: ReconciliationConfig,
    pub retry: RetryConfig,
    pub logging: LoggerConfig,
}

/// Fixed consultation fees and the default service charge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    pub op: Decimal,
    pub ip: Decimal,
    pub followup: Decimal,
    pub standard_service_charge: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            op: Decimal::from(850),
            ip: Decimal::from(1050),
            followup: Decimal::ZERO,
            standard_service_charge: Decimal::from(150),
        }
    }
}

impl FeeSchedule {
    pub fn fee_for(&self, consultation_type: ConsultationType) -> Decimal {
        match consultation_type {
            ConsultationType::Op => self.op,
            ConsultationType::Ip => self.ip,
            ConsultationType::Followup => self.followup,
        }
    }
}

/// Free-reassignment window and refund penalty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub free_reassignment_window_days: i64,
    /// Non-refundable registration fee withheld from refunds to well-behaved patients
    pub registration_penalty: Decimal,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            free_reassignment_window_days: 7,
            registration_penalty: Decimal::from(150),
        }
    }
}

/// A historic way a consultation fee absorbed its service charge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricSplit {
    pub consultation_type: ConsultationType,
    pub stored_fee: Decimal,
    pub consultation_fee: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    pub historic_splits: Vec<HistoricSplit>,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            historic_splits: vec![HistoricSplit {
                consultation_type: ConsultationType::Ip,
                stored_fee: Decimal::from(1050),
                consultation_fee: Decimal::from(850),
            }],
        }
    }
}

/// Retry budget for persistence failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 50,
        }
    }
}

impl RetryConfig {
    /// Linear backoff before the given (1-based) retry
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

impl BillingConfig {
    /// Load defaults, then the config file, then `REASSIGN_BILLING__*` variables.
    ///
    /// Without an explicit path the default file is optional.
    pub fn load(path: Option<&Path>) -> BillingResult<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&BillingConfig::default())?);

        builder = match path {
            Some(path) => builder.add_source(config::File::from(path).required(true)),
            None => builder.add_source(config::File::with_name(DEFAULT_CONFIG_NAME).required(false)),
        };

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: BillingConfig = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> BillingResult<()> {
        let fees = &self.fees;
        for (name, value) in [
            ("fees.op", fees.op),
            ("fees.ip", fees.ip),
            ("fees.followup", fees.followup),
            ("fees.standard_service_charge", fees.standard_service_charge),
            ("policy.registration_penalty", self.policy.registration_penalty),
        ] {
            if value < Decimal::ZERO {
                return Err(BillingError::Config(format!("{} must not be negative", name)));
            }
        }
        if self.policy.free_reassignment_window_days < 0 {
            return Err(BillingError::Config(
                "policy.free_reassignment_window_days must not be negative".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(BillingError::Config("retry.max_attempts must be at least 1".to_string()));
        }
        for split in &self.reconciliation.historic_splits {
            if split.consultation_fee < Decimal::ZERO || split.consultation_fee > split.stored_fee {
                return Err(BillingError::Config(format!(
                    "historic split for {} must satisfy 0 <= consultation_fee <= stored_fee",
                    split.consultation_type
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_fee_table() {
        let config = BillingConfig::default();
        assert_eq!(config.fees.fee_for(ConsultationType::Op), Decimal::from(850));
        assert_eq!(config.fees.fee_for(ConsultationType::Ip), Decimal::from(1050));
        assert_eq!(config.fees.fee_for(ConsultationType::Followup), Decimal::ZERO);
        assert_eq!(config.policy.registration_penalty, Decimal::from(150));
        assert_eq!(config.policy.free_reassignment_window_days, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_negative_penalty_rejected() {
        let mut config = BillingConfig::default();
        config.policy.registration_penalty = Decimal::from(-1);
        assert!(matches!(config.validate(), Err(BillingError::Config(_))));
    }

    #[test]
    fn test_zero_retry_budget_rejected() {
        let mut config = BillingConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_linear_backoff() {
        let retry = RetryConfig { max_attempts: 3, backoff_ms: 20 };
        assert_eq!(retry.backoff(1), Duration::from_millis(20));
        assert_eq!(retry.backoff(3), Duration::from_millis(60));
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = std::env::temp_dir().join(format!("billing-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("billing.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[policy]\nfree_reassignment_window_days = 10\n\n[retry]\nmax_attempts = 5").unwrap();

        let config = BillingConfig::load(Some(&path)).unwrap();
        assert_eq!(config.policy.free_reassignment_window_days, 10);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.fees.op, Decimal::from(850));

        std::fs::remove_dir_all(&dir).ok();
    }
}
