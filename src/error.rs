// =============================================================================
// ERROR MODULE
// =============================================================================
// Every failure kind the engine can report, and its HTTP mapping.
//
// ERROR TAXONOMY:
// - validation: malformed input, rejected before touching the store
// - conflict:   expected under concurrent load (SeatUnavailable,
//               TicketAlreadyUsed); definitive business outcomes
// - state:      caller logic errors (BookingNotPaid, TicketNotPaid,
//               TicketExpired, ShowTimeEnded)
// - not found:  unknown showtime / booking / ticket
// - infra:      database, cache, internal
//
// SerializationConflict is the one transient kind: the coordinator retries it
// a bounded number of times and it never reaches a caller unchanged.
// =============================================================================

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use uuid::Uuid;

use crate::models::ErrorResponse;

#[derive(Debug, Error)]
pub enum AppError {
    // -------------------------------------------------------------------------
    // VALIDATION ERRORS
    // -------------------------------------------------------------------------
    #[error("At least one seat must be selected")]
    EmptySeatSelection,

    #[error("Too many seats requested: {requested} (limit {limit})")]
    TooManySeats { requested: usize, limit: usize },

    #[error("Seats do not belong to the showtime's hall: {seat_ids:?}")]
    InvalidSeatForHall { seat_ids: Vec<Uuid> },

    #[error("Invalid request: {0}")]
    BadRequest(String),

    // -------------------------------------------------------------------------
    // NOT FOUND ERRORS
    // -------------------------------------------------------------------------
    #[error("Showtime not found: {0}")]
    ShowTimeNotFound(Uuid),

    #[error("Booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("Ticket not found: {0}")]
    TicketNotFound(Uuid),

    // -------------------------------------------------------------------------
    // CONFLICT ERRORS
    // -------------------------------------------------------------------------
    /// One or more requested seats already hold an active ticket
    #[error("Seats unavailable: {}", labels.join(", "))]
    SeatUnavailable { seat_ids: Vec<Uuid>, labels: Vec<String> },

    #[error("Ticket already used: {0}")]
    TicketAlreadyUsed(Uuid),

    /// Concurrent writer won a race inside the store. Retried internally.
    #[error("Concurrent reservation conflict")]
    SerializationConflict,

    // -------------------------------------------------------------------------
    // STATE ERRORS
    // -------------------------------------------------------------------------
    #[error("Showtime has already ended: {0}")]
    ShowTimeEnded(Uuid),

    #[error("Booking is not paid: {0}")]
    BookingNotPaid(Uuid),

    #[error("Ticket is not paid: {0}")]
    TicketNotPaid(Uuid),

    #[error("Ticket has expired: {0}")]
    TicketExpired(Uuid),

    #[error("Payment amount {reported} does not match booking total {expected}")]
    PaymentAmountMismatch { expected: i64, reported: i64 },

    // -------------------------------------------------------------------------
    // INFRASTRUCTURE ERRORS
    // -------------------------------------------------------------------------
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Cache error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code, also used as a metrics label.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::EmptySeatSelection => "EMPTY_SEAT_SELECTION",
            AppError::TooManySeats { .. } => "TOO_MANY_SEATS",
            AppError::InvalidSeatForHall { .. } => "INVALID_SEAT_FOR_HALL",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::ShowTimeNotFound(_) => "SHOW_TIME_NOT_FOUND",
            AppError::BookingNotFound(_) => "BOOKING_NOT_FOUND",
            AppError::TicketNotFound(_) => "TICKET_NOT_FOUND",
            AppError::SeatUnavailable { .. } => "SEAT_UNAVAILABLE",
            AppError::TicketAlreadyUsed(_) => "TICKET_ALREADY_USED",
            AppError::SerializationConflict => "SERIALIZATION_CONFLICT",
            AppError::ShowTimeEnded(_) => "SHOW_TIME_ENDED",
            AppError::BookingNotPaid(_) => "BOOKING_NOT_PAID",
            AppError::TicketNotPaid(_) => "TICKET_NOT_PAID",
            AppError::TicketExpired(_) => "TICKET_EXPIRED",
            AppError::PaymentAmountMismatch { .. } => "PAYMENT_AMOUNT_MISMATCH",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Redis(_) => "CACHE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Only serialization conflicts are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::SerializationConflict)
    }

    /// HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::EmptySeatSelection
            | AppError::TooManySeats { .. }
            | AppError::InvalidSeatForHall { .. }
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,

            AppError::ShowTimeNotFound(_)
            | AppError::BookingNotFound(_)
            | AppError::TicketNotFound(_) => StatusCode::NOT_FOUND,

            AppError::SeatUnavailable { .. }
            | AppError::TicketAlreadyUsed(_)
            | AppError::SerializationConflict => StatusCode::CONFLICT,

            AppError::ShowTimeEnded(_)
            | AppError::BookingNotPaid(_)
            | AppError::TicketNotPaid(_)
            | AppError::TicketExpired(_)
            | AppError::PaymentAmountMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,

            AppError::Database(_) | AppError::Redis(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

// =============================================================================
// SQLX CONVERSION
// =============================================================================
// Postgres reports lost races with SQLSTATE codes. Those become
// SerializationConflict so the coordinator can retry; everything else stays a
// plain database error.
//
//   40001 serialization_failure
//   40P01 deadlock_detected
//   23505 unique_violation (active-ticket index)
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if let Some(code) = db_err.code() {
                if matches!(code.as_ref(), "40001" | "40P01" | "23505") {
                    return AppError::SerializationConflict;
                }
            }
        }
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

// =============================================================================
// HTTP RESPONSE CONVERSION
// =============================================================================
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        // Internal details never leave the service
        let body = match &self {
            AppError::Database(_) => ErrorResponse::new(code, "A database error occurred"),
            AppError::Redis(_) => ErrorResponse::new(code, "A cache error occurred"),
            AppError::SeatUnavailable { seat_ids, labels } => ErrorResponse::with_details(
                code,
                self.to_string(),
                serde_json::json!({ "seat_ids": seat_ids, "labels": labels }),
            ),
            AppError::InvalidSeatForHall { seat_ids } => ErrorResponse::with_details(
                code,
                self.to_string(),
                serde_json::json!({ "seat_ids": seat_ids }),
            ),
            _ => ErrorResponse::new(code, self.to_string()),
        };

        if status.is_server_error() {
            tracing::error!(error_code = code, error = %self, "Request failed");
        } else {
            tracing::debug!(error_code = code, error = %self, "Request rejected");
        }

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
