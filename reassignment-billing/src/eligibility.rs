use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PolicyConfig;
use crate::models::{Invoice, Patient};

const SECONDS_PER_DAY: i64 = 86_400;

/// Why a patient does or does not qualify for a free reassignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum EligibilityOutcome {
    /// The one free reassignment has already been used
    PriorReassignment,
    /// No paid, non-reassignment consultation on record
    NoPaidConsultation,
    WindowElapsed { days_since: i64 },
    WithinWindow { days_since: i64 },
}

impl EligibilityOutcome {
    pub fn is_eligible(&self) -> bool {
        matches!(self, EligibilityOutcome::WithinWindow { .. })
    }
}

/// Decides whether a reassignment qualifies for a fee-free invoice
#[derive(Debug, Clone)]
pub struct EligibilityEvaluator {
    window_days: i64,
}

impl EligibilityEvaluator {
    pub fn new(policy: &PolicyConfig) -> Self {
        Self {
            window_days: policy.free_reassignment_window_days,
        }
    }

    /// Earliest paid consultation that was not itself raised by a reassignment
    pub fn first_paid_consultation<'a>(&self, billing_history: &'a [Invoice]) -> Option<&'a Invoice> {
        billing_history
            .iter()
            .filter(|invoice| invoice.is_paid_consultation() && !invoice.is_reassignment())
            .min_by_key(|invoice| invoice.created_at)
    }

    pub fn assess(
        &self,
        patient: &Patient,
        billing_history: &[Invoice],
        now: DateTime<Utc>,
    ) -> EligibilityOutcome {
        if !patient.reassignment_history.is_empty() {
            return EligibilityOutcome::PriorReassignment;
        }

        let Some(first_paid) = self.first_paid_consultation(billing_history) else {
            return EligibilityOutcome::NoPaidConsultation;
        };

        let days_since = (now - first_paid.created_at)
            .num_seconds()
            .div_euclid(SECONDS_PER_DAY);

        debug!(
            patient_id = %patient.id,
            invoice_id = %first_paid.id,
            days_since,
            window_days = self.window_days,
            "Evaluated free reassignment window"
        );

        if days_since <= self.window_days {
            EligibilityOutcome::WithinWindow { days_since }
        } else {
            EligibilityOutcome::WindowElapsed { days_since }
        }
    }

    pub fn evaluate(&self, patient: &Patient, billing_history: &[Invoice], now: DateTime<Utc>) -> bool {
        self.assess(patient, billing_history, now).is_eligible()
    }
}

impl Default for EligibilityEvaluator {
    fn default() -> Self {
        Self::new(&PolicyConfig::default())
    }
}
