// =============================================================================
// HANDLERS MODULE
// =============================================================================
// HTTP request handlers. Each one extracts its input, delegates to one engine
// component and records the request in Prometheus.
//
// CLIENT IDENTITY:
// Bookings are attributed to the opaque id in the X-Client-Id header. The
// service does not authenticate it; that happens upstream.
// =============================================================================

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::*;
use crate::validator::ScanResult;
use crate::AppState;

pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Record the request once the handler body has produced its result.
fn observe<T>(method: &str, endpoint: &str, start: Instant, result: &AppResult<T>) {
    let status = match result {
        Ok(_) => StatusCode::OK,
        Err(e) => e.status(),
    };
    metrics::record_http_request(
        method,
        endpoint,
        status.as_u16(),
        start.elapsed().as_secs_f64(),
    );
}

fn client_id(headers: &HeaderMap) -> AppResult<String> {
    headers
        .get(CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::BadRequest("missing X-Client-Id header".to_string()))
}

// =============================================================================
// HEALTH CHECK ENDPOINTS
// =============================================================================

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "cinema-booking-service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness probe: store reachable, and the cache too when one is configured.
///
/// GET /ready
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> Response {
    let store_healthy = state.store.health_check().await;

    let cache_healthy = match state.catalog.cache() {
        Some(cache) => Some(
            redis::cmd("PING")
                .query_async::<_, String>(&mut cache.clone())
                .await
                .is_ok(),
        ),
        None => None,
    };

    let all_healthy = store_healthy && cache_healthy.unwrap_or(true);
    let response = ReadinessResponse {
        status: if all_healthy { "ready" } else { "not_ready" }.to_string(),
        checks: ReadinessChecks {
            store: store_healthy,
            cache: cache_healthy,
        },
    };

    if all_healthy {
        (StatusCode::OK, Json(response)).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response)).into_response()
    }
}

// =============================================================================
// METRICS ENDPOINT
// =============================================================================
/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state
        .metrics_handle
        .as_ref()
        .map(|h| h.render())
        .unwrap_or_default()
}

// =============================================================================
// BOOKING API ENDPOINTS
// =============================================================================

// -----------------------------------------------------------------------------
// CREATE BOOKING
// -----------------------------------------------------------------------------
/// Reserve seats for a showtime.
///
/// POST /api/v1/bookings
///
/// # Response
/// - 201 Created: booking Pending, tickets Reserved, scan codes issued
/// - 409 Conflict: `SEAT_UNAVAILABLE` with the taken seat labels
/// - 400 / 404 / 422: validation, unknown showtime, showtime ended
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateBookingRequest>,
) -> AppResult<(StatusCode, Json<BookingReceipt>)> {
    let start = Instant::now();

    let result = match client_id(&headers) {
        Ok(client_id) => {
            state
                .coordinator
                .create_booking(
                    &client_id,
                    request.show_time_id,
                    &request.seat_ids,
                    request.payment_method,
                )
                .await
        }
        Err(e) => Err(e),
    };

    observe("POST", "/api/v1/bookings", start, &result);
    result.map(|receipt| (StatusCode::CREATED, Json(receipt)))
}

// -----------------------------------------------------------------------------
// GET BOOKING
// -----------------------------------------------------------------------------
/// GET /api/v1/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BookingReceipt>> {
    let start = Instant::now();

    let result = state
        .store
        .booking(id)
        .await
        .and_then(|b| b.ok_or(AppError::BookingNotFound(id)));

    observe("GET", "/api/v1/bookings/:id", start, &result);
    result.map(Json)
}

// -----------------------------------------------------------------------------
// CONFIRM PAYMENT
// -----------------------------------------------------------------------------
/// Callback from the payment collaborator. Safe to deliver more than once.
///
/// POST /api/v1/bookings/:id/payment
///
/// # Request Body
/// ```json
/// { "outcome": "succeeded", "transaction_id": "tx-81", "amount_cents": 2500 }
/// { "outcome": "failed", "reason": "card declined" }
/// { "outcome": "timed_out" }
/// ```
pub async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(outcome): Json<PaymentOutcome>,
) -> AppResult<Json<ConfirmationResult>> {
    let start = Instant::now();

    let result = state.payments.confirm_payment(id, outcome).await;

    observe("POST", "/api/v1/bookings/:id/payment", start, &result);
    result.map(Json)
}

// -----------------------------------------------------------------------------
// AVAILABILITY
// -----------------------------------------------------------------------------
/// GET /api/v1/showtimes/:id/availability
pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<SeatAvailability>>> {
    let start = Instant::now();

    let result = state.availability.get_availability(id).await;

    observe("GET", "/api/v1/showtimes/:id/availability", start, &result);
    result.map(Json)
}

// -----------------------------------------------------------------------------
// CLIENT HISTORY
// -----------------------------------------------------------------------------
/// GET /api/v1/clients/:client_id/bookings
pub async fn client_bookings(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
) -> AppResult<Json<Vec<BookingReceipt>>> {
    let start = Instant::now();

    let result = state.store.bookings_for_client(&client_id).await;

    observe("GET", "/api/v1/clients/:client_id/bookings", start, &result);
    result.map(Json)
}

/// GET /api/v1/clients/:client_id/tickets
pub async fn client_tickets(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
) -> AppResult<Json<Vec<TicketDetail>>> {
    let start = Instant::now();

    let result = state.store.tickets_for_client(&client_id).await;

    observe("GET", "/api/v1/clients/:client_id/tickets", start, &result);
    result.map(Json)
}

// -----------------------------------------------------------------------------
// SCAN TICKET
// -----------------------------------------------------------------------------
/// Door scan. Refusals are a 200 with `valid: false` and a reason code.
///
/// POST /api/v1/tickets/:id/scan
pub async fn scan_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ScanResult>> {
    let start = Instant::now();

    let result = state.validator.scan(id).await;

    observe("POST", "/api/v1/tickets/:id/scan", start, &result);
    result.map(Json)
}

// -----------------------------------------------------------------------------
// RELEASE EXPIRED HOLDS
// -----------------------------------------------------------------------------
/// Run one hold sweep now. The background sweeper calls the same operation.
///
/// POST /api/v1/holds/release-expired
pub async fn release_expired_holds(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ReleaseSummary>> {
    let start = Instant::now();

    let result = state.payments.release_expired_holds().await;

    observe("POST", "/api/v1/holds/release-expired", start, &result);
    result.map(Json)
}
