use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use ledger::LedgerError;
use registry::{AuditEvent, NewInvoice, Registry, RegistryError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use yharvest_core::models::{Invoice, InvoiceStatus};
use yharvest_core::money::Money;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub mirror: Option<mirror::MirrorClient>,
    pub topic_id: Option<String>,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/invoices", post(create_invoice).get(list_invoices))
        .route("/api/invoices/:id", get(get_invoice))
        .route("/api/invoices/:id/fund", post(fund_invoice))
        .route("/api/invoices/:id/pay", post(pay_invoice))
        .route("/api/invoices/:id/refund", post(refund_invoice))
        .route("/api/invoices/:id/audit", get(get_audit_trail))
        .with_state(state)
}

// ===== Route Handlers =====

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Create an invoice, anchor its document hash, and list it for funding.
async fn create_invoice(
    State(state): State<AppState>,
    Json(body): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<Invoice>), ApiError> {
    let face_value = parse_amount(&body.face_value)?;
    let invoice = state
        .registry
        .create_invoice(NewInvoice {
            currency: body.currency,
            face_value,
            due_date: body.due_date,
            description: body.description,
            supplier: body.supplier,
            buyer: body.buyer,
            document: body.document.map(String::into_bytes),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

async fn list_invoices(State(state): State<AppState>) -> Result<Json<InvoicesResponse>, ApiError> {
    let invoices = state.registry.list_invoices()?;
    Ok(Json(InvoicesResponse {
        count: invoices.len(),
        invoices,
    }))
}

async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Invoice>, ApiError> {
    Ok(Json(state.registry.invoice(&id)?))
}

async fn fund_invoice(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<FundRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let amount = parse_amount(&body.amount)?;
    let outcome = state.registry.fund(&id, &body.investor, amount).await?;
    invalidate_topic_cache(&state).await;
    Ok(Json(json!({
        "escrow": outcome.escrow,
        "terms": outcome.terms,
    })))
}

/// Record the buyer's payment and release the escrow in one call. A retried
/// call after a transient release failure finds the payment already
/// recorded and re-drives only the settlement.
async fn pay_invoice(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PayRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.registry.invoice(&id)?.status != InvoiceStatus::Paid {
        state.registry.mark_paid(&id, body.payment_ref).await?;
    }
    let settlement = state.registry.settle(&id).await?;
    invalidate_topic_cache(&state).await;
    Ok(Json(json!({
        "split": settlement.split,
        "transaction_ref": settlement.transaction_ref,
    })))
}

async fn refund_invoice(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let settlement = state.registry.refund(&id).await?;
    invalidate_topic_cache(&state).await;
    Ok(Json(json!({
        "refunded": settlement.split.investor_share,
        "transaction_ref": settlement.transaction_ref,
    })))
}

async fn get_audit_trail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AuditResponse>, ApiError> {
    let events = state.registry.audit_trail(&id)?;
    Ok(Json(AuditResponse {
        count: events.len(),
        events,
    }))
}

/// On-ledger state just changed; the next read should not serve a cached
/// pre-transition view.
async fn invalidate_topic_cache(state: &AppState) {
    if let (Some(mirror), Some(topic_id)) = (&state.mirror, &state.topic_id) {
        mirror.invalidate_topic(topic_id).await;
    }
}

fn parse_amount(raw: &str) -> Result<Money, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid amount '{raw}': {e}")))
}

// ===== Request/Response Types =====

#[derive(Deserialize)]
struct CreateInvoiceRequest {
    currency: String,
    /// Decimal string, e.g. "10000.00".
    face_value: String,
    due_date: NaiveDate,
    description: String,
    supplier: String,
    buyer: Option<String>,
    document: Option<String>,
}

#[derive(Deserialize)]
struct FundRequest {
    investor: String,
    amount: String,
}

#[derive(Deserialize, Default)]
struct PayRequest {
    payment_ref: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct InvoicesResponse {
    count: usize,
    invoices: Vec<Invoice>,
}

#[derive(Serialize)]
struct AuditResponse {
    count: usize,
    events: Vec<AuditEvent>,
}

// ===== Error Handling =====

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Validation(Vec<String>),
    Conflict(String),
    PaymentRequired(String),
    Upstream(String),
    Internal(String),
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => ApiError::NotFound(format!("Invoice {id} not found")),
            RegistryError::Validation(errs) => ApiError::Validation(errs),
            RegistryError::Funding(e) => ApiError::Validation(vec![e.to_string()]),
            RegistryError::Terms(e) => ApiError::Validation(vec![e.to_string()]),
            RegistryError::Transition(e) => ApiError::Conflict(e.to_string()),
            RegistryError::MissingEscrow(id) => {
                ApiError::Conflict(format!("No escrow exists for invoice {id}"))
            }
            RegistryError::NotYetDue(id) => {
                ApiError::Conflict(format!("Invoice {id} is not past its due date"))
            }
            RegistryError::Ledger(e) => match e {
                LedgerError::InsufficientBalance => ApiError::PaymentRequired(e.to_string()),
                LedgerError::Unavailable(_) | LedgerError::Timeout(_) => {
                    ApiError::Upstream(e.to_string())
                }
                other => ApiError::Conflict(other.to_string()),
            },
            RegistryError::Storage(e) => ApiError::Internal(e.to_string()),
            RegistryError::Encoding(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            ApiError::Validation(errs) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": "validation failed", "details": errs }),
            ),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            ApiError::PaymentRequired(msg) => {
                (StatusCode::PAYMENT_REQUIRED, json!({ "error": msg }))
            }
            ApiError::Upstream(msg) => {
                tracing::warn!(error = %msg, "ledger unavailable, surfacing 503");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({ "error": msg, "retriable": true }),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
