// =============================================================================
// MODELS MODULE
// =============================================================================
// Data structures for the booking engine: reference data (theatre, movie,
// hall, seat, showtime), the booking aggregate (booking + tickets), payment
// records, and the request/response shapes exposed to collaborators.
//
// Money is always integer cents. Statuses map to Postgres enum types.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Opaque, already-authenticated client identifier supplied by the gateway.
pub type ClientId = String;

// =============================================================================
// REFERENCE DATA
// =============================================================================
// Read-only from the engine's point of view. Provisioned once (seed data or
// an external admin service) and never edited here.

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Theatre {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Movie {
    pub id: Uuid,
    pub title: String,
    pub duration_minutes: i32,
}

/// A screening room with a fixed row/column seat grid.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Hall {
    pub id: Uuid,
    pub theatre_id: Uuid,
    pub name: String,
    pub row_count: i32,
    pub column_count: i32,
}

/// A physical seat. Unique per (hall_id, row_number, column_number).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Seat {
    pub id: Uuid,
    pub hall_id: Uuid,
    pub row_number: i32,
    pub column_number: i32,
    /// Human label, e.g. "A1" (row letter + column number)
    pub label: String,
}

impl Seat {
    /// Build the conventional label for a grid position: row 1 -> "A".
    pub fn label_for(row_number: i32, column_number: i32) -> String {
        let mut row = String::new();
        let mut n = row_number;
        while n > 0 {
            let rem = ((n - 1) % 26) as u8;
            row.insert(0, (b'A' + rem) as char);
            n = (n - 1) / 26;
        }
        format!("{row}{column_number}")
    }
}

/// A scheduled screening. Defines the reservation universe: availability is
/// always scoped to one showtime.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ShowTime {
    pub id: Uuid,
    pub movie_id: Uuid,
    pub hall_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub base_price_cents: i64,
}

impl ShowTime {
    /// A showtime accepts bookings until it ends.
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }
}

// =============================================================================
// STATUSES
// =============================================================================

/// Booking aggregate status. Moves Pending -> Paid or Pending -> Cancelled,
/// never backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "booking_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Paid,
    Cancelled,
}

impl BookingStatus {
    pub fn is_settled(self) -> bool {
        !matches!(self, BookingStatus::Pending)
    }
}

/// Ticket status. Reserved -> Paid -> Used (terminal), or Reserved -> Released
/// when the owning booking is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Reserved,
    Paid,
    Used,
    Released,
}

impl TicketStatus {
    /// Reserved and Paid tickets occupy their seat for the showtime.
    pub fn holds_seat(self) -> bool {
        matches!(self, TicketStatus::Reserved | TicketStatus::Paid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    Wallet,
    Cash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Completed,
    Failed,
}

// =============================================================================
// BOOKING AGGREGATE
// =============================================================================

/// One client's purchase of one or more seats for one showtime.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub client_id: ClientId,
    pub show_time_id: Uuid,
    pub booking_time: DateTime<Utc>,
    /// Pending bookings past this instant are released by the hold sweeper
    pub hold_expires_at: DateTime<Utc>,
    /// Sum of the booking's ticket prices
    pub total_price_cents: i64,
    pub payment_method: PaymentMethod,
    pub status: BookingStatus,
}

/// The right to occupy one seat for one showtime.
///
/// `show_time_id` is denormalized from the booking so the store can enforce
/// "one active ticket per (show_time_id, seat_id)" with a single index.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub show_time_id: Uuid,
    pub seat_id: Uuid,
    pub price_cents: i64,
    /// Scan token checked at the door. Bearer secret.
    pub qr_code: String,
    pub status: TicketStatus,
}

/// Payment record written when a confirmation is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub payment_time: DateTime<Utc>,
    pub transaction_id: Option<String>,
}

/// A booking and its tickets, built by the issuer and inserted atomically.
#[derive(Debug, Clone)]
pub struct ReservationDraft {
    pub booking: Booking,
    pub tickets: Vec<Ticket>,
}

// =============================================================================
// RESPONSES EXPOSED TO COLLABORATORS
// =============================================================================

/// Ticket line inside a booking receipt.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketReceipt {
    pub ticket_id: Uuid,
    pub booking_id: Uuid,
    pub seat_id: Uuid,
    pub label: String,
    pub price_cents: i64,
    pub qr_code: String,
    pub status: TicketStatus,
}

/// Booking with its tickets, as returned by CreateBooking / GetBookingsForClient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingReceipt {
    #[serde(flatten)]
    pub booking: Booking,
    pub tickets: Vec<TicketReceipt>,
}

/// Per-seat availability for one showtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatAvailability {
    pub seat_id: Uuid,
    pub row_number: i32,
    pub column_number: i32,
    pub label: String,
    pub is_taken: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_status: Option<TicketStatus>,
}

/// Denormalized ticket view for client receipts.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketDetail {
    pub ticket_id: Uuid,
    pub booking_id: Uuid,
    pub qr_code: String,
    pub status: TicketStatus,
    pub price_cents: i64,
    pub seat_label: String,
    pub row_number: i32,
    pub column_number: i32,
    pub movie_title: String,
    pub hall_name: String,
    pub theatre_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

// =============================================================================
// API REQUEST STRUCTURES
// =============================================================================

/// Request body for CreateBooking. The client id arrives in a header.
///
/// # Example JSON
/// ```json
/// {
///   "show_time_id": "7d1c…",
///   "seat_ids": ["a3f0…", "b771…"],
///   "payment_method": "credit_card"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookingRequest {
    pub show_time_id: Uuid,
    pub seat_ids: Vec<Uuid>,
    pub payment_method: PaymentMethod,
}

/// What the payment collaborator reports for a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Succeeded {
        transaction_id: String,
        amount_cents: i64,
    },
    Failed {
        #[serde(default)]
        reason: Option<String>,
    },
    TimedOut,
}

impl PaymentOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            PaymentOutcome::Succeeded { .. } => "succeeded",
            PaymentOutcome::Failed { .. } => "failed",
            PaymentOutcome::TimedOut => "timed_out",
        }
    }
}

/// Result of ConfirmPayment. `applied == false` means the booking was already
/// settled and the call was an idempotent no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationResult {
    pub booking_id: Uuid,
    pub status: BookingStatus,
    pub applied: bool,
}

/// Result of ReleaseExpiredHolds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseSummary {
    pub released: Vec<Uuid>,
}

// =============================================================================
// HEALTH CHECK RESPONSES
// =============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Debug, Serialize)]
pub struct ReadinessChecks {
    pub store: bool,
    /// None when no cache is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<bool>,
}

// =============================================================================
// ERROR RESPONSES
// =============================================================================

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type/code
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (e.g. the conflicting seat labels)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: Some(details),
        }
    }
}
