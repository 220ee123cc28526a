// =============================================================================
// STORE MODULE
// =============================================================================
// The transactional data-store seam. Every mutation of bookings and tickets
// goes through one of the `BookingStore` methods below, and each of those
// methods is atomic with respect to every other call touching the same rows.
//
// The engine modules (coordinator, payment, validator) own the decisions; the
// store owns the atomicity. Where a decision has to be made while rows are
// locked, the store calls back into the pure decision functions
// (`payment::plan_settlement`, `validator::check_scan`) under its lock.
//
// IMPLEMENTATIONS:
// - postgres::PgBookingStore  row locks + partial unique index
// - memory::InMemoryBookingStore  one async mutex per showtime
// =============================================================================

pub mod memory;
pub mod postgres;
pub mod seed;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    BookingReceipt, ConfirmationResult, PaymentOutcome, ReservationDraft, Seat, ShowTime,
    Ticket, TicketDetail,
};

pub use memory::InMemoryBookingStore;
pub use postgres::PgBookingStore;

/// Result of an atomic reservation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// Booking and all tickets were written
    Reserved,
    /// Nothing was written; these seats already hold an active ticket
    Conflict(Vec<Uuid>),
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Is the backing store reachable?
    async fn health_check(&self) -> bool;

    async fn show_time(&self, id: Uuid) -> AppResult<Option<ShowTime>>;

    /// All seats of a hall, ordered by row then column.
    async fn hall_seats(&self, hall_id: Uuid) -> AppResult<Vec<Seat>>;

    /// Point-in-time snapshot of Reserved/Paid tickets for a showtime.
    async fn active_tickets(&self, show_time_id: Uuid) -> AppResult<Vec<Ticket>>;

    /// Atomically re-check the draft's seats and, if all are free, insert the
    /// booking and every ticket. All-or-nothing.
    ///
    /// # Errors
    /// `SerializationConflict` when a concurrent writer won the race in a way
    /// only detectable at commit; callers may retry.
    async fn reserve(&self, draft: &ReservationDraft) -> AppResult<ReserveOutcome>;

    async fn booking(&self, id: Uuid) -> AppResult<Option<BookingReceipt>>;

    async fn bookings_for_client(&self, client_id: &str) -> AppResult<Vec<BookingReceipt>>;

    async fn tickets_for_client(&self, client_id: &str) -> AppResult<Vec<TicketDetail>>;

    /// Apply a payment outcome to a booking and all its tickets in one step.
    async fn settle(
        &self,
        booking_id: Uuid,
        outcome: &PaymentOutcome,
        now: DateTime<Utc>,
    ) -> AppResult<ConfirmationResult>;

    /// Ids of Pending bookings whose hold expired at or before `now`.
    async fn expired_holds(&self, now: DateTime<Utc>) -> AppResult<Vec<Uuid>>;

    /// Validate and mark a ticket Used, exactly once.
    async fn consume_ticket(&self, ticket_id: Uuid, now: DateTime<Utc>) -> AppResult<Ticket>;
}
