use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::idempotency::IdempotencyKey;
use crate::models::{Invoice, Patient};

/// Storage for invoices.
///
/// Writers never overwrite blindly: every update names the version it was
/// derived from and loses with `Conflict` if someone else committed first.
#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    async fn get_invoice(&self, id: Uuid) -> BillingResult<Invoice>;

    /// Store a new invoice at version 1
    async fn insert_invoice(&self, invoice: Invoice) -> BillingResult<Invoice>;

    /// Compare-and-swap against `expected_version`; returns the invoice as
    /// committed, with its version bumped.
    ///
    /// A keyed update records the committed invoice under `key` in the same
    /// write. If `key` is already recorded nothing is written and the
    /// recorded invoice is returned, whatever `expected_version` says.
    async fn update_invoice(
        &self,
        invoice: Invoice,
        expected_version: u64,
        key: Option<IdempotencyKey>,
    ) -> BillingResult<Invoice>;

    /// The invoice committed under `key`, if any
    async fn recorded_result(&self, key: &IdempotencyKey) -> BillingResult<Option<Invoice>>;

    /// All invoices of a patient, oldest first
    async fn list_for_patient(&self, patient_id: Uuid) -> BillingResult<Vec<Invoice>>;
}

/// Storage for the patient identity and doctor-assignment fields
#[async_trait]
pub trait PatientRepository: Send + Sync {
    async fn get_patient(&self, id: Uuid) -> BillingResult<Patient>;

    /// Insert or replace
    async fn save_patient(&self, patient: Patient) -> BillingResult<Patient>;
}

/// An invoice together with the keyed results committed against it
#[derive(Debug, Clone)]
struct StoredInvoice {
    invoice: Invoice,
    results: HashMap<IdempotencyKey, Invoice>,
}

/// In-memory invoice repository for testing and development
pub struct InMemoryInvoiceRepository {
    invoices: Arc<DashMap<Uuid, StoredInvoice>>,
}

impl InMemoryInvoiceRepository {
    pub fn new() -> Self {
        Self {
            invoices: Arc::new(DashMap::new()),
        }
    }
}

impl Default for InMemoryInvoiceRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryInvoiceRepository {
    async fn get_invoice(&self, id: Uuid) -> BillingResult<Invoice> {
        self.invoices
            .get(&id)
            .map(|entry| entry.value().invoice.clone())
            .ok_or(BillingError::InvoiceNotFound(id))
    }

    async fn insert_invoice(&self, mut invoice: Invoice) -> BillingResult<Invoice> {
        match self.invoices.entry(invoice.id) {
            Entry::Occupied(_) => Err(BillingError::Validation(format!(
                "invoice {} already exists",
                invoice.id
            ))),
            Entry::Vacant(slot) => {
                invoice.version = 1;
                slot.insert(StoredInvoice {
                    invoice: invoice.clone(),
                    results: HashMap::new(),
                });
                Ok(invoice)
            }
        }
    }

    async fn update_invoice(
        &self,
        mut invoice: Invoice,
        expected_version: u64,
        key: Option<IdempotencyKey>,
    ) -> BillingResult<Invoice> {
        // The shard lock is held for the whole compare-and-swap
        let mut stored = self
            .invoices
            .get_mut(&invoice.id)
            .ok_or(BillingError::InvoiceNotFound(invoice.id))?;

        if let Some(previous) = key.as_ref().and_then(|key| stored.results.get(key)) {
            return Ok(previous.clone());
        }

        if stored.invoice.version != expected_version {
            return Err(BillingError::Conflict {
                invoice_id: invoice.id,
                expected: expected_version,
                found: stored.invoice.version,
            });
        }

        invoice.version = expected_version + 1;
        stored.invoice = invoice.clone();
        if let Some(key) = key {
            stored.results.insert(key, invoice.clone());
        }
        Ok(invoice)
    }

    async fn recorded_result(&self, key: &IdempotencyKey) -> BillingResult<Option<Invoice>> {
        Ok(self
            .invoices
            .get(&key.invoice_id)
            .and_then(|entry| entry.value().results.get(key).cloned()))
    }

    async fn list_for_patient(&self, patient_id: Uuid) -> BillingResult<Vec<Invoice>> {
        let mut invoices: Vec<Invoice> = self
            .invoices
            .iter()
            .filter(|entry| entry.value().invoice.patient_id == patient_id)
            .map(|entry| entry.value().invoice.clone())
            .collect();
        invoices.sort_by_key(|invoice| invoice.created_at);
        Ok(invoices)
    }
}

/// In-memory patient repository for testing and development
pub struct InMemoryPatientRepository {
    patients: Arc<DashMap<Uuid, Patient>>,
}

impl InMemoryPatientRepository {
    pub fn new() -> Self {
        Self {
            patients: Arc::new(DashMap::new()),
        }
    }
}

impl Default for InMemoryPatientRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PatientRepository for InMemoryPatientRepository {
    async fn get_patient(&self, id: Uuid) -> BillingResult<Patient> {
        self.patients
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(BillingError::PatientNotFound(id))
    }

    async fn save_patient(&self, patient: Patient) -> BillingResult<Patient> {
        self.patients.insert(patient.id, patient.clone());
        Ok(patient)
    }
}
