//! JSON endpoints over the billing engine.
//!
//! Optimistic concurrency and replay protection ride on headers:
//! `If-Match` carries the invoice version the caller last read and
//! `Idempotency-Key` the caller nonce.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use error_common::ErrorCategory;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::builder::InvoiceRequest;
use crate::eligibility::EligibilityOutcome;
use crate::error::BillingError;
use crate::legacy::LegacyInvoiceRecord;
use crate::models::{Invoice, Patient, PatientBehavior};
use crate::payment::PaymentCommand;
use crate::reconcile::ReconciledInvoice;
use crate::refund::{RefundCommand, RefundQuote};
use crate::service::{BillingService, MutationOptions, ReassignmentOutcome, ReassignmentRequest};

pub mod paths {
    pub const BASE: &str = "/api/v1/billing";

    pub const PATIENTS: &str = "/patients";
    pub const PATIENT_BY_ID: &str = "/patients/:patient_id";
    pub const ELIGIBILITY: &str = "/patients/:patient_id/eligibility";
    pub const PATIENT_INVOICES: &str = "/patients/:patient_id/invoices";
    pub const CURRENT_INVOICE: &str = "/patients/:patient_id/invoices/current";
    pub const REASSIGNMENTS: &str = "/patients/:patient_id/reassignments";
    pub const REASSIGNMENT_VIEWED: &str = "/patients/:patient_id/reassignments/viewed";

    pub const INVOICE_BY_ID: &str = "/invoices/:invoice_id";
    pub const INVOICE_DISPLAY: &str = "/invoices/:invoice_id/display";
    pub const PAYMENTS: &str = "/invoices/:invoice_id/payments";
    pub const CANCELLATION: &str = "/invoices/:invoice_id/cancellation";
    pub const REFUNDS: &str = "/invoices/:invoice_id/refunds";
    pub const REFUND_QUOTE: &str = "/invoices/:invoice_id/refund-quote";
    pub const LEGACY_IMPORT: &str = "/invoices/legacy";
}

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Success envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

fn api_success<T>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { success: true, data })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub category: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub success: bool,
    pub error: ApiErrorBody,
}

/// Engine error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub BillingError);

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        if self.0.is_not_found() {
            return StatusCode::NOT_FOUND;
        }
        match self.0.category() {
            ErrorCategory::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCategory::State => StatusCode::CONFLICT,
            ErrorCategory::Infrastructure => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        if status_code.is_server_error() {
            error!(code = self.0.code(), error = %self.0, "Billing request failed");
        }

        let body = ApiErrorResponse {
            success: false,
            error: ApiErrorBody {
                code: self.0.code().to_string(),
                category: self.0.category().to_string(),
                message: self.0.to_string(),
            },
        };
        (status_code, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn mutation_options(headers: &HeaderMap) -> Result<MutationOptions, ApiError> {
    let expected_version = match headers.get(axum::http::header::IF_MATCH) {
        Some(value) => {
            let raw = value
                .to_str()
                .map_err(|_| BillingError::Validation("If-Match must be a version number".to_string()))?;
            let version = raw
                .trim()
                .trim_matches('"')
                .parse::<u64>()
                .map_err(|_| BillingError::Validation(format!("If-Match '{}' is not a version number", raw)))?;
            Some(version)
        }
        None => None,
    };

    let nonce = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    Ok(MutationOptions { expected_version, nonce })
}

/// Mounts every billing endpoint under `/api/v1/billing`
pub fn billing_routes(service: Arc<BillingService>) -> Router {
    let routes = Router::new()
        .route(paths::PATIENTS, post(register_patient))
        .route(paths::PATIENT_BY_ID, get(get_patient))
        .route(paths::ELIGIBILITY, get(eligibility))
        .route(paths::PATIENT_INVOICES, get(billing_history).post(build_invoice))
        .route(paths::CURRENT_INVOICE, get(current_invoice))
        .route(paths::REASSIGNMENTS, post(reassign_patient))
        .route(paths::REASSIGNMENT_VIEWED, post(mark_consultation_viewed))
        .route(paths::LEGACY_IMPORT, post(import_legacy))
        .route(paths::INVOICE_BY_ID, get(get_invoice))
        .route(paths::INVOICE_DISPLAY, get(reconciled_invoice))
        .route(paths::PAYMENTS, post(apply_payment))
        .route(paths::CANCELLATION, post(cancel_invoice))
        .route(paths::REFUNDS, post(process_refund))
        .route(paths::REFUND_QUOTE, get(refund_quote));

    Router::new().nest(paths::BASE, routes).with_state(service)
}

// ============================================================================
// HANDLERS
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterPatientRequest {
    pub name: String,
    pub doctor_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EligibilityResponse {
    pub eligible: bool,
    pub outcome: EligibilityOutcome,
}

#[derive(Debug, Deserialize)]
pub struct CancelInvoiceRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct RefundQuoteParams {
    pub behavior: PatientBehavior,
}

async fn register_patient(
    State(service): State<Arc<BillingService>>,
    Json(request): Json<RegisterPatientRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Patient>>), ApiError> {
    if request.name.trim().is_empty() {
        return Err(BillingError::Validation("patient name is required".to_string()).into());
    }
    let patient = service
        .register_patient(Patient::new(request.name.trim(), request.doctor_id))
        .await?;
    Ok((StatusCode::CREATED, api_success(patient)))
}

async fn get_patient(State(service): State<Arc<BillingService>>, Path(patient_id): Path<Uuid>) -> ApiResult<Patient> {
    Ok(api_success(service.get_patient(patient_id).await?))
}

async fn eligibility(
    State(service): State<Arc<BillingService>>,
    Path(patient_id): Path<Uuid>,
) -> ApiResult<EligibilityResponse> {
    let outcome = service.assess_eligibility(patient_id).await?;
    Ok(api_success(EligibilityResponse {
        eligible: outcome.is_eligible(),
        outcome,
    }))
}

async fn billing_history(
    State(service): State<Arc<BillingService>>,
    Path(patient_id): Path<Uuid>,
) -> ApiResult<Vec<Invoice>> {
    Ok(api_success(service.billing_history(patient_id).await?))
}

async fn current_invoice(
    State(service): State<Arc<BillingService>>,
    Path(patient_id): Path<Uuid>,
) -> ApiResult<Option<Invoice>> {
    Ok(api_success(service.current_invoice(patient_id).await?))
}

async fn build_invoice(
    State(service): State<Arc<BillingService>>,
    Path(patient_id): Path<Uuid>,
    Json(request): Json<InvoiceRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Invoice>>), ApiError> {
    let invoice = service.build_invoice(patient_id, request).await?;
    Ok((StatusCode::CREATED, api_success(invoice)))
}

async fn reassign_patient(
    State(service): State<Arc<BillingService>>,
    Path(patient_id): Path<Uuid>,
    Json(request): Json<ReassignmentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ReassignmentOutcome>>), ApiError> {
    let outcome = service.reassign_patient(patient_id, request).await?;
    Ok((StatusCode::CREATED, api_success(outcome)))
}

async fn mark_consultation_viewed(
    State(service): State<Arc<BillingService>>,
    Path(patient_id): Path<Uuid>,
) -> ApiResult<Patient> {
    Ok(api_success(service.mark_consultation_viewed(patient_id).await?))
}

async fn import_legacy(
    State(service): State<Arc<BillingService>>,
    Json(record): Json<LegacyInvoiceRecord>,
) -> Result<(StatusCode, Json<ApiResponse<Invoice>>), ApiError> {
    let invoice = service.import_legacy(record).await?;
    Ok((StatusCode::CREATED, api_success(invoice)))
}

async fn get_invoice(State(service): State<Arc<BillingService>>, Path(invoice_id): Path<Uuid>) -> ApiResult<Invoice> {
    Ok(api_success(service.get_invoice(invoice_id).await?))
}

async fn reconciled_invoice(
    State(service): State<Arc<BillingService>>,
    Path(invoice_id): Path<Uuid>,
) -> ApiResult<ReconciledInvoice> {
    Ok(api_success(service.reconciled_invoice(invoice_id).await?))
}

async fn apply_payment(
    State(service): State<Arc<BillingService>>,
    Path(invoice_id): Path<Uuid>,
    headers: HeaderMap,
    Json(command): Json<PaymentCommand>,
) -> ApiResult<Invoice> {
    let options = mutation_options(&headers)?;
    Ok(api_success(service.apply_payment(invoice_id, command, options).await?))
}

async fn cancel_invoice(
    State(service): State<Arc<BillingService>>,
    Path(invoice_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<CancelInvoiceRequest>,
) -> ApiResult<Invoice> {
    let options = mutation_options(&headers)?;
    Ok(api_success(
        service.cancel_invoice(invoice_id, &request.reason, options).await?,
    ))
}

async fn process_refund(
    State(service): State<Arc<BillingService>>,
    Path(invoice_id): Path<Uuid>,
    headers: HeaderMap,
    Json(command): Json<RefundCommand>,
) -> ApiResult<Invoice> {
    let options = mutation_options(&headers)?;
    Ok(api_success(service.process_refund(invoice_id, command, options).await?))
}

async fn refund_quote(
    State(service): State<Arc<BillingService>>,
    Path(invoice_id): Path<Uuid>,
    Query(params): Query<RefundQuoteParams>,
) -> ApiResult<RefundQuote> {
    Ok(api_success(service.quote_refund(invoice_id, params.behavior).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::BillingConfig;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::{TimeZone, Utc};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap());
        let service = BillingService::in_memory(&BillingConfig::default()).with_clock(Arc::new(clock));
        billing_routes(Arc::new(service))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>, headers: &[(&str, &str)]) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    async fn patient_with_invoice(app: &Router) -> (String, String) {
        let (status, patient) = send(
            app,
            "POST",
            "/api/v1/billing/patients",
            Some(json!({ "name": "Meera", "doctor_id": Uuid::new_v4() })),
            &[],
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let patient_id = patient["data"]["id"].as_str().unwrap().to_string();

        let (status, invoice) = send(
            app,
            "POST",
            &format!("/api/v1/billing/patients/{}/invoices", patient_id),
            Some(json!({ "consultation_type": "OP" })),
            &[],
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let invoice_id = invoice["data"]["id"].as_str().unwrap().to_string();
        (patient_id, invoice_id)
    }

    #[tokio::test]
    async fn test_payment_flow() {
        let app = app();
        let (_, invoice_id) = patient_with_invoice(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/v1/billing/invoices/{}/payments", invoice_id),
            Some(json!({
                "amount": "1000",
                "method": "cash",
                "appointment_time": "2024-06-04T10:00:00Z"
            })),
            &[("if-match", "1"), (IDEMPOTENCY_KEY_HEADER, "pay-1")],
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "paid");
        assert_eq!(body["data"]["version"], 2);
    }

    #[tokio::test]
    async fn test_amount_mismatch_is_unprocessable() {
        let app = app();
        let (_, invoice_id) = patient_with_invoice(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/v1/billing/invoices/{}/payments", invoice_id),
            Some(json!({
                "amount": "500",
                "method": "upi",
                "appointment_time": "2024-06-04T10:00:00Z"
            })),
            &[],
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], error_common::codes::billing::AMOUNT_MISMATCH);
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let app = app();
        let (_, invoice_id) = patient_with_invoice(&app).await;

        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/v1/billing/invoices/{}/cancellation", invoice_id),
            Some(json!({ "reason": "duplicate entry" })),
            &[("if-match", "1")],
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/v1/billing/invoices/{}/cancellation", invoice_id),
            Some(json!({ "reason": "duplicate entry" })),
            &[("if-match", "1")],
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], error_common::codes::concurrency::VERSION_CONFLICT);
    }

    #[tokio::test]
    async fn test_unknown_invoice_is_not_found() {
        let app = app();
        let (status, body) = send(
            &app,
            "GET",
            &format!("/api/v1/billing/invoices/{}", Uuid::new_v4()),
            None,
            &[],
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], error_common::codes::billing::INVOICE_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_display_and_quote() {
        let app = app();
        let (_, invoice_id) = patient_with_invoice(&app).await;

        let (status, body) = send(
            &app,
            "GET",
            &format!("/api/v1/billing/invoices/{}/display", invoice_id),
            None,
            &[],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "pending_payment");
        assert_eq!(body["data"]["line_items"].as_array().unwrap().len(), 2);

        let (status, body) = send(
            &app,
            "GET",
            &format!("/api/v1/billing/invoices/{}/refund-quote?behavior=okay", invoice_id),
            None,
            &[],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["max_refundable"], "0");
    }

    #[tokio::test]
    async fn test_bad_if_match_rejected() {
        let app = app();
        let (_, invoice_id) = patient_with_invoice(&app).await;

        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/v1/billing/invoices/{}/cancellation", invoice_id),
            Some(json!({ "reason": "duplicate entry" })),
            &[("if-match", "latest")],
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
