use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use error_common::{log_error, ErrorContext, RustCareError};
use logger_redacted::{PiiRedactor, RedactionConfig};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::builder::{InvoiceBuilder, InvoiceRequest, ServiceChargeInput};
use crate::cancellation::CancellationHandler;
use crate::clock::{Clock, SystemClock};
use crate::config::{BillingConfig, RetryConfig};
use crate::eligibility::{EligibilityEvaluator, EligibilityOutcome};
use crate::error::{BillingError, BillingResult};
use crate::idempotency::{IdempotencyKey, Operation};
use crate::legacy::LegacyInvoiceRecord;
use crate::models::{ConsultationType, Invoice, InvoiceKind, Patient, PatientBehavior, ReassignmentEvent};
use crate::payment::{PaymentApplier, PaymentCommand};
use crate::reconcile::{CanonicalFeeTable, ReconciledInvoice, Reconciler};
use crate::refund::{RefundCalculator, RefundCommand, RefundQuote};
use crate::repository::{
    InMemoryInvoiceRepository, InMemoryPatientRepository, InvoiceRepository, PatientRepository,
};

/// Concurrency and replay controls for a mutating call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationOptions {
    /// Version the caller last read; a mismatch fails with `Conflict`
    #[serde(default)]
    pub expected_version: Option<u64>,
    /// Caller nonce; replays with the same nonce return the first result
    #[serde(default)]
    pub nonce: Option<String>,
}

impl MutationOptions {
    pub fn expecting(version: u64) -> Self {
        Self {
            expected_version: Some(version),
            nonce: None,
        }
    }

    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }
}

/// A change of treating doctor together with how it is billed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReassignmentRequest {
    pub to_doctor_id: Uuid,
    pub reason: String,
    #[serde(default)]
    pub notes: Option<String>,
    /// Defaults from eligibility when absent
    #[serde(default)]
    pub consultation_type: Option<ConsultationType>,
    #[serde(default)]
    pub tax_percentage: Decimal,
    #[serde(default)]
    pub discount_percentage: Decimal,
    #[serde(default)]
    pub service_charges: Option<Vec<ServiceChargeInput>>,
}

impl ReassignmentRequest {
    pub fn new(to_doctor_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            to_doctor_id,
            reason: reason.into(),
            notes: None,
            consultation_type: None,
            tax_percentage: Decimal::ZERO,
            discount_percentage: Decimal::ZERO,
            service_charges: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReassignmentOutcome {
    pub patient: Patient,
    pub invoice: Invoice,
    pub eligibility: EligibilityOutcome,
}

/// Reassignment billing engine.
///
/// Invoice mutations follow one path: load, apply a pure component, then
/// commit with a compare-and-swap on the version that was loaded. Patient
/// mutations are serialized per patient.
pub struct BillingService {
    invoices: Arc<dyn InvoiceRepository>,
    patients: Arc<dyn PatientRepository>,
    clock: Arc<dyn Clock>,

    evaluator: EligibilityEvaluator,
    builder: InvoiceBuilder,
    payments: PaymentApplier,
    cancellations: CancellationHandler,
    refunds: RefundCalculator,
    reconciler: Reconciler,

    redactor: PiiRedactor,
    retry: RetryConfig,
    /// Only patients with a reassignment or view in flight have an entry
    patient_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl BillingService {
    pub fn new(
        config: &BillingConfig,
        invoices: Arc<dyn InvoiceRepository>,
        patients: Arc<dyn PatientRepository>,
    ) -> Self {
        Self {
            invoices,
            patients,
            clock: Arc::new(SystemClock),
            evaluator: EligibilityEvaluator::new(&config.policy),
            builder: InvoiceBuilder::new(config.fees.clone()),
            payments: PaymentApplier::new(),
            cancellations: CancellationHandler::new(),
            refunds: RefundCalculator::new(&config.policy),
            reconciler: Reconciler::new(CanonicalFeeTable::new(config.fees.clone(), &config.reconciliation)),
            redactor: PiiRedactor::new(RedactionConfig::from_logger_config(&config.logging)),
            retry: config.retry.clone(),
            patient_locks: DashMap::new(),
        }
    }

    /// Engine over fresh in-memory repositories
    pub fn in_memory(config: &BillingConfig) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryInvoiceRepository::new()),
            Arc::new(InMemoryPatientRepository::new()),
        )
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    // =============================================================================
    // Patients and eligibility
    // =============================================================================

    pub async fn register_patient(&self, patient: Patient) -> BillingResult<Patient> {
        let saved = self.retrying("save_patient", || self.patients.save_patient(patient.clone())).await?;
        info!(patient_id = %saved.id, "Registered patient");
        Ok(saved)
    }

    pub async fn get_patient(&self, patient_id: Uuid) -> BillingResult<Patient> {
        self.retrying("get_patient", || self.patients.get_patient(patient_id)).await
    }

    /// All invoices of a patient, oldest first
    pub async fn billing_history(&self, patient_id: Uuid) -> BillingResult<Vec<Invoice>> {
        self.retrying("list_invoices", || self.invoices.list_for_patient(patient_id)).await
    }

    #[instrument(skip(self))]
    pub async fn assess_eligibility(&self, patient_id: Uuid) -> BillingResult<EligibilityOutcome> {
        let patient = self.get_patient(patient_id).await?;
        let history = self.billing_history(patient_id).await?;
        Ok(self.evaluator.assess(&patient, &history, self.clock.now()))
    }

    pub async fn evaluate_eligibility(&self, patient_id: Uuid) -> BillingResult<bool> {
        Ok(self.assess_eligibility(patient_id).await?.is_eligible())
    }

    /// The most recent open invoice, else the most recent one
    pub async fn current_invoice(&self, patient_id: Uuid) -> BillingResult<Option<Invoice>> {
        let history = self.billing_history(patient_id).await?;
        Ok(select_current_invoice(history))
    }

    // =============================================================================
    // Invoices
    // =============================================================================

    pub async fn get_invoice(&self, invoice_id: Uuid) -> BillingResult<Invoice> {
        self.retrying("get_invoice", || self.invoices.get_invoice(invoice_id)).await
    }

    /// Price and store a new invoice. Reassignment invoices are fee-free
    /// when the patient is eligible.
    #[instrument(skip(self, request), fields(consultation_type = %request.consultation_type))]
    pub async fn build_invoice(&self, patient_id: Uuid, request: InvoiceRequest) -> BillingResult<Invoice> {
        let patient = self.get_patient(patient_id).await?;
        let eligible = match request.kind {
            InvoiceKind::Reassignment => {
                let history = self.billing_history(patient_id).await?;
                self.evaluator.evaluate(&patient, &history, self.clock.now())
            }
            InvoiceKind::Original => false,
        };

        let invoice = self.builder.build(patient_id, request, eligible, self.clock.now())?;
        let stored = self.store_new_invoice(invoice).await?;

        info!(
            invoice_id = %stored.id,
            patient_id = %patient_id,
            total = %stored.totals.total,
            fee_waived = stored.fee_waived,
            "Built invoice"
        );
        Ok(stored)
    }

    /// Store an invoice from a historical document as-is
    pub async fn import_legacy(&self, record: LegacyInvoiceRecord) -> BillingResult<Invoice> {
        let invoice = Invoice::try_from(record)?;
        let stored = self.store_new_invoice(invoice).await?;
        info!(invoice_id = %stored.id, status = %stored.status, "Imported legacy invoice");
        Ok(stored)
    }

    #[instrument(skip(self, command, options), fields(amount = %command.amount))]
    pub async fn apply_payment(
        &self,
        invoice_id: Uuid,
        command: PaymentCommand,
        options: MutationOptions,
    ) -> BillingResult<Invoice> {
        debug!(
            reference = ?self.redactor.redact_opt(command.reference.as_deref()),
            "Applying payment"
        );
        self.mutate(invoice_id, Operation::Payment, &options, |invoice, now| {
            self.payments.apply(invoice, &command, now)
        })
        .await
    }

    #[instrument(skip(self, reason, options))]
    pub async fn cancel_invoice(
        &self,
        invoice_id: Uuid,
        reason: &str,
        options: MutationOptions,
    ) -> BillingResult<Invoice> {
        self.mutate(invoice_id, Operation::Cancellation, &options, |invoice, now| {
            self.cancellations.cancel(invoice, reason, now)
        })
        .await
    }

    #[instrument(skip(self, command, options), fields(refund_type = ?command.refund_type, behavior = ?command.patient_behavior))]
    pub async fn process_refund(
        &self,
        invoice_id: Uuid,
        command: RefundCommand,
        options: MutationOptions,
    ) -> BillingResult<Invoice> {
        debug!(
            notes = ?self.redactor.redact_opt(command.notes.as_deref()),
            "Processing refund"
        );
        self.mutate(invoice_id, Operation::Refund, &options, |invoice, now| {
            self.refunds.apply(invoice, &command, now)
        })
        .await
    }

    pub async fn quote_refund(&self, invoice_id: Uuid, behavior: PatientBehavior) -> BillingResult<RefundQuote> {
        let invoice = self.get_invoice(invoice_id).await?;
        Ok(self.refunds.quote(&invoice, behavior))
    }

    /// Pure: derives the display model without touching storage
    pub fn reconcile_for_display(&self, invoice: &Invoice) -> ReconciledInvoice {
        self.reconciler.reconcile(invoice)
    }

    pub async fn reconciled_invoice(&self, invoice_id: Uuid) -> BillingResult<ReconciledInvoice> {
        let invoice = self.get_invoice(invoice_id).await?;
        Ok(self.reconcile_for_display(&invoice))
    }

    // =============================================================================
    // Reassignment
    // =============================================================================

    /// Move a patient to another doctor and raise the reassignment invoice.
    ///
    /// Eligibility is evaluated before the event is recorded, so the event
    /// itself never disqualifies the reassignment it belongs to.
    #[instrument(skip(self, request), fields(to_doctor_id = %request.to_doctor_id))]
    pub async fn reassign_patient(
        &self,
        patient_id: Uuid,
        request: ReassignmentRequest,
    ) -> BillingResult<ReassignmentOutcome> {
        self.with_patient_lock(patient_id, || self.reassign_locked(patient_id, request))
            .await
    }

    async fn reassign_locked(
        &self,
        patient_id: Uuid,
        request: ReassignmentRequest,
    ) -> BillingResult<ReassignmentOutcome> {
        let mut patient = self.get_patient(patient_id).await?;

        if let Some(latest) = patient.latest_reassignment() {
            if !latest.consultation_viewed {
                return Err(BillingError::ReassignmentBlocked(
                    "the consultation from the previous reassignment has not been viewed".to_string(),
                ));
            }
        }
        if request.to_doctor_id == patient.current_doctor_id {
            return Err(BillingError::ReassignmentBlocked(
                "patient is already assigned to this doctor".to_string(),
            ));
        }
        if request.reason.trim().is_empty() {
            return Err(BillingError::Validation("a reassignment reason is required".to_string()));
        }

        let now = self.clock.now();
        let history = self.billing_history(patient_id).await?;
        let eligibility = self.evaluator.assess(&patient, &history, now);
        let eligible = eligibility.is_eligible();

        let consultation_type = request
            .consultation_type
            .unwrap_or_else(|| self.builder.default_consultation_type(eligible));
        let mut invoice_request = InvoiceRequest::new(consultation_type)
            .with_tax(request.tax_percentage)
            .with_discount(request.discount_percentage)
            .with_kind(InvoiceKind::Reassignment);
        if let Some(charges) = request.service_charges {
            invoice_request = invoice_request.with_service_charges(charges);
        }

        let invoice = self.builder.build(patient_id, invoice_request, eligible, now)?;
        let invoice = self.store_new_invoice(invoice).await?;

        patient.reassignment_history.push(ReassignmentEvent {
            from_doctor_id: patient.current_doctor_id,
            to_doctor_id: request.to_doctor_id,
            reason: request.reason.trim().to_string(),
            notes: request.notes.clone(),
            timestamp: now,
            consultation_viewed: false,
        });
        patient.current_doctor_id = request.to_doctor_id;

        let patient = match self.retrying("save_patient", || self.patients.save_patient(patient.clone())).await {
            Ok(saved) => saved,
            Err(err) => {
                // Leave no billable invoice behind for a reassignment that was not recorded
                warn!(invoice_id = %invoice.id, error = %err, "Reassignment not recorded, cancelling its invoice");
                if let Ok(cancelled) = self.cancellations.cancel(&invoice, "reassignment not recorded", now) {
                    let version = invoice.version;
                    if let Err(cancel_err) = self
                        .retrying("update_invoice", || self.invoices.update_invoice(cancelled.clone(), version, None))
                        .await
                    {
                        warn!(invoice_id = %invoice.id, error = %cancel_err, "Failed to cancel orphaned invoice");
                    }
                }
                return Err(err);
            }
        };

        info!(
            patient_id = %patient_id,
            invoice_id = %invoice.id,
            eligible,
            consultation_type = %consultation_type,
            notes = ?self.redactor.redact_opt(request.notes.as_deref()),
            "Reassigned patient"
        );

        Ok(ReassignmentOutcome {
            patient,
            invoice,
            eligibility,
        })
    }

    /// Unblocks the next reassignment. Viewing twice is harmless.
    #[instrument(skip(self))]
    pub async fn mark_consultation_viewed(&self, patient_id: Uuid) -> BillingResult<Patient> {
        self.with_patient_lock(patient_id, || self.mark_viewed_locked(patient_id))
            .await
    }

    async fn mark_viewed_locked(&self, patient_id: Uuid) -> BillingResult<Patient> {
        let mut patient = self.get_patient(patient_id).await?;
        let Some(latest) = patient.reassignment_history.last_mut() else {
            return Err(BillingError::ReassignmentBlocked(
                "patient has no reassignment to mark as viewed".to_string(),
            ));
        };
        if latest.consultation_viewed {
            return Ok(patient);
        }
        latest.consultation_viewed = true;

        let saved = self.retrying("save_patient", || self.patients.save_patient(patient.clone())).await?;
        info!(patient_id = %patient_id, "Marked reassignment consultation as viewed");
        Ok(saved)
    }

    // =============================================================================
    // Internals
    // =============================================================================

    /// Runs `op` while holding the patient's lock. The entry is evicted
    /// once nobody holds or waits for it.
    async fn with_patient_lock<T, F, Fut>(&self, patient_id: Uuid, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = self.patient_locks.entry(patient_id).or_default().clone();
        let result = {
            let _guard = lock.lock().await;
            op().await
        };
        drop(lock);

        // Clones are only taken under the shard lock, so a count of one is final
        self.patient_locks
            .remove_if(&patient_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn store_new_invoice(&self, invoice: Invoice) -> BillingResult<Invoice> {
        self.retrying("insert_invoice", || self.invoices.insert_invoice(invoice.clone()))
            .await
    }

    async fn mutate<F>(
        &self,
        invoice_id: Uuid,
        operation: Operation,
        options: &MutationOptions,
        apply: F,
    ) -> BillingResult<Invoice>
    where
        F: FnOnce(&Invoice, DateTime<Utc>) -> BillingResult<Invoice> + Send,
    {
        let key = options
            .nonce
            .as_ref()
            .map(|nonce| IdempotencyKey::new(invoice_id, operation, nonce.clone()));

        if let Some(previous) = self.recorded_result(key.as_ref()).await? {
            return Ok(previous);
        }

        let current = self.get_invoice(invoice_id).await?;
        if let Some(expected) = options.expected_version {
            if current.version != expected {
                // A same-key write may have landed between the lookup and the load
                if let Some(previous) = self.recorded_result(key.as_ref()).await? {
                    return Ok(previous);
                }
                return Err(BillingError::Conflict {
                    invoice_id,
                    expected,
                    found: current.version,
                });
            }
        }

        let updated = match apply(&current, self.clock.now()) {
            Ok(updated) => updated,
            Err(err) => {
                warn!(
                    invoice_id = %invoice_id,
                    operation = operation.as_str(),
                    code = err.code(),
                    error = %err,
                    "Rejected invoice mutation"
                );
                return Err(err);
            }
        };

        // The key is recorded in the same write, so a retried commit whose
        // first attempt landed returns that result instead of applying twice
        let committed = match self
            .retrying("update_invoice", || {
                self.invoices
                    .update_invoice(updated.clone(), current.version, key.clone())
            })
            .await
        {
            Ok(committed) => committed,
            Err(err) => {
                let mut context = ErrorContext::new()
                    .with_invoice_id(invoice_id.to_string())
                    .add_context("operation", operation.as_str());
                if let Some(key) = &key {
                    context = context.with_idempotency_key(key.to_string());
                }
                warn!(error_id = %context.error_id, code = err.code(), error = %err, "Commit failed");
                if err.is_retryable() {
                    log_error("invoice_commit", &context, &RustCareError::from(err.clone())).await;
                }
                return Err(err);
            }
        };

        info!(
            invoice_id = %invoice_id,
            operation = operation.as_str(),
            status = %committed.status,
            paid = %committed.totals.paid,
            refunded = %committed.refunded_total(),
            version = committed.version,
            "Committed invoice mutation"
        );
        Ok(committed)
    }

    async fn recorded_result(&self, key: Option<&IdempotencyKey>) -> BillingResult<Option<Invoice>> {
        let Some(key) = key else {
            return Ok(None);
        };
        let previous = self
            .retrying("idempotency_lookup", || self.invoices.recorded_result(key))
            .await?;
        if previous.is_some() {
            debug!(key = %key, "Replaying recorded result");
        }
        Ok(previous)
    }

    /// Retry infrastructure failures with linear backoff; anything else is
    /// returned on the first attempt
    async fn retrying<T, F, Fut>(&self, what: &'static str, mut op: F) -> BillingResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BillingResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    warn!(operation = what, attempt, error = %err, "Retrying after persistence failure");
                    tokio::time::sleep(self.retry.backoff(attempt)).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// Open invoices win over terminal ones; among equals the newest wins
pub fn select_current_invoice(history: Vec<Invoice>) -> Option<Invoice> {
    let newest_open = history
        .iter()
        .filter(|invoice| invoice.status.is_open())
        .max_by_key(|invoice| invoice.created_at)
        .cloned();

    newest_open.or_else(|| history.into_iter().max_by_key(|invoice| invoice.created_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::{InvoiceStatus, PaymentMethod};
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap()
    }

    async fn service_with_patient() -> (BillingService, FixedClock, Patient) {
        let clock = FixedClock::new(start());
        let service = BillingService::in_memory(&BillingConfig::default()).with_clock(Arc::new(clock.clone()));
        let patient = service
            .register_patient(Patient::new("Ravi Kumar", Uuid::new_v4()))
            .await
            .unwrap();
        (service, clock, patient)
    }

    fn payment(amount: i64) -> PaymentCommand {
        PaymentCommand {
            amount: Decimal::from(amount),
            method: PaymentMethod::Cash,
            reference: Some("receipt 42".to_string()),
            appointment_time: Some(start() + Duration::days(1)),
        }
    }

    #[tokio::test]
    async fn test_payment_bumps_version() {
        let (service, _clock, patient) = service_with_patient().await;
        let invoice = service
            .build_invoice(patient.id, InvoiceRequest::new(ConsultationType::Op))
            .await
            .unwrap();
        assert_eq!(invoice.version, 1);

        let paid = service
            .apply_payment(invoice.id, payment(1000), MutationOptions::default())
            .await
            .unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);
        assert_eq!(paid.version, 2);
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let (service, _clock, patient) = service_with_patient().await;
        let invoice = service
            .build_invoice(patient.id, InvoiceRequest::new(ConsultationType::Op))
            .await
            .unwrap();

        service
            .cancel_invoice(invoice.id, "duplicate", MutationOptions::expecting(invoice.version))
            .await
            .unwrap();
        let result = service
            .apply_payment(invoice.id, payment(1000), MutationOptions::expecting(invoice.version))
            .await;

        assert!(matches!(result, Err(BillingError::Conflict { expected: 1, found: 2, .. })));
        assert_eq!(service.get_invoice(invoice.id).await.unwrap().status, InvoiceStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_rejected_mutation_leaves_invoice_unchanged() {
        let (service, _clock, patient) = service_with_patient().await;
        let invoice = service
            .build_invoice(patient.id, InvoiceRequest::new(ConsultationType::Op))
            .await
            .unwrap();

        let result = service
            .apply_payment(invoice.id, payment(999), MutationOptions::default())
            .await;
        assert!(matches!(result, Err(BillingError::AmountMismatch { .. })));
        assert_eq!(service.get_invoice(invoice.id).await.unwrap(), invoice);
    }

    #[tokio::test]
    async fn test_nonce_replays_result() {
        let (service, _clock, patient) = service_with_patient().await;
        let invoice = service
            .build_invoice(patient.id, InvoiceRequest::new(ConsultationType::Op))
            .await
            .unwrap();

        let options = MutationOptions::default().with_nonce("pay-1");
        let first = service.apply_payment(invoice.id, payment(1000), options.clone()).await.unwrap();
        let replay = service.apply_payment(invoice.id, payment(1000), options).await.unwrap();

        assert_eq!(first, replay);
        assert_eq!(replay.payment_history.len(), 1);
    }

    #[tokio::test]
    async fn test_current_invoice_prefers_open() {
        let (service, clock, patient) = service_with_patient().await;
        let open = service
            .build_invoice(patient.id, InvoiceRequest::new(ConsultationType::Op))
            .await
            .unwrap();
        clock.advance(Duration::hours(1));
        let newer = service
            .build_invoice(patient.id, InvoiceRequest::new(ConsultationType::Op))
            .await
            .unwrap();
        service
            .cancel_invoice(newer.id, "entered twice", MutationOptions::default())
            .await
            .unwrap();

        let current = service.current_invoice(patient.id).await.unwrap().unwrap();
        assert_eq!(current.id, open.id);

        service
            .cancel_invoice(open.id, "patient left", MutationOptions::default())
            .await
            .unwrap();
        let current = service.current_invoice(patient.id).await.unwrap().unwrap();
        assert_eq!(current.id, newer.id);

        assert_eq!(service.current_invoice(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_patient_locks_are_released() {
        let (service, _clock, patient) = service_with_patient().await;

        service
            .reassign_patient(patient.id, ReassignmentRequest::new(Uuid::new_v4(), "second opinion"))
            .await
            .unwrap();
        assert!(service.patient_locks.is_empty());

        service.mark_consultation_viewed(patient.id).await.unwrap();
        assert!(service.patient_locks.is_empty());

        let missing = service
            .reassign_patient(Uuid::new_v4(), ReassignmentRequest::new(Uuid::new_v4(), "second opinion"))
            .await;
        assert!(matches!(missing, Err(BillingError::PatientNotFound(_))));
        assert!(service.patient_locks.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_patient() {
        let service = BillingService::in_memory(&BillingConfig::default());
        let result = service
            .build_invoice(Uuid::new_v4(), InvoiceRequest::new(ConsultationType::Op))
            .await;
        assert!(matches!(result, Err(BillingError::PatientNotFound(_))));
    }
}
