// =============================================================================
// RESERVATION COORDINATOR MODULE
// =============================================================================
// CreateBooking: atomically claim a set of seats for one booking.
//
// FLOW:
//   1. validate input (non-empty, deduplicated, bounded) before any I/O
//   2. load the showtime; reject unknown or ended showtimes
//   3. resolve the seats against the showtime's hall
//   4. issue a draft (booking + one ticket per seat, fresh scan tokens)
//   5. store.reserve(draft): re-check + insert atomically, all-or-nothing
//   6. on SerializationConflict retry 4-5, bounded; surface SeatUnavailable
//
// The hold timer is the booking's hold_expires_at; the sweeper in the payment
// module releases it.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::SeatCatalog;
use crate::clock::Clock;
use crate::config::BookingSettings;
use crate::error::{AppError, AppResult};
use crate::issuer::TicketIssuer;
use crate::metrics;
use crate::models::{Booking, BookingReceipt, PaymentMethod, Seat, Ticket, TicketReceipt};
use crate::store::{BookingStore, ReserveOutcome};

pub struct ReservationCoordinator {
    store: Arc<dyn BookingStore>,
    catalog: Arc<SeatCatalog>,
    issuer: TicketIssuer,
    clock: Arc<dyn Clock>,
    settings: BookingSettings,
}

impl ReservationCoordinator {
    pub fn new(
        store: Arc<dyn BookingStore>,
        catalog: Arc<SeatCatalog>,
        issuer: TicketIssuer,
        clock: Arc<dyn Clock>,
        settings: BookingSettings,
    ) -> Self {
        Self {
            store,
            catalog,
            issuer,
            clock,
            settings,
        }
    }

    /// Reserve `seat_ids` for `client_id` on a showtime.
    ///
    /// # Errors
    /// - `EmptySeatSelection`, `TooManySeats`, `InvalidSeatForHall`
    /// - `ShowTimeNotFound`, `ShowTimeEnded`
    /// - `SeatUnavailable` naming every requested seat already held
    pub async fn create_booking(
        &self,
        client_id: &str,
        show_time_id: Uuid,
        seat_ids: &[Uuid],
        payment_method: PaymentMethod,
    ) -> AppResult<BookingReceipt> {
        let start = Instant::now();
        let result = self
            .try_create_booking(client_id, show_time_id, seat_ids, payment_method)
            .await;

        let outcome = match &result {
            Ok(_) => "reserved",
            Err(e) => e.code(),
        };
        metrics::record_booking_attempt(outcome, start.elapsed().as_secs_f64());

        result
    }

    async fn try_create_booking(
        &self,
        client_id: &str,
        show_time_id: Uuid,
        seat_ids: &[Uuid],
        payment_method: PaymentMethod,
    ) -> AppResult<BookingReceipt> {
        let seat_ids = self.normalize_selection(seat_ids)?;

        let show_time = self
            .store
            .show_time(show_time_id)
            .await?
            .ok_or(AppError::ShowTimeNotFound(show_time_id))?;

        if show_time.has_ended(self.clock.now()) {
            return Err(AppError::ShowTimeEnded(show_time_id));
        }

        let seats = self.catalog.resolve(show_time.hall_id, &seat_ids).await?;

        let mut attempt = 1;
        loop {
            let draft = self.issuer.draft(
                client_id,
                &show_time,
                &seats,
                payment_method,
                self.clock.now(),
            );

            match self.store.reserve(&draft).await {
                Ok(ReserveOutcome::Reserved) => {
                    info!(
                        booking_id = %draft.booking.id,
                        client_id = %client_id,
                        show_time_id = %show_time_id,
                        seats = seats.len(),
                        total_price_cents = draft.booking.total_price_cents,
                        attempt,
                        "Seats reserved"
                    );
                    return Ok(receipt(draft.booking, draft.tickets, &seats));
                }
                Ok(ReserveOutcome::Conflict(taken)) => {
                    let labels = labels_for(&taken, &seats);
                    info!(
                        client_id = %client_id,
                        show_time_id = %show_time_id,
                        taken = ?labels,
                        "Requested seats unavailable"
                    );
                    return Err(AppError::SeatUnavailable {
                        seat_ids: taken,
                        labels,
                    });
                }
                Err(e) if e.is_retryable() && attempt < self.settings.max_attempts => {
                    metrics::record_conflict_retry();
                    warn!(
                        show_time_id = %show_time_id,
                        attempt,
                        "Reservation lost a concurrent race; retrying"
                    );
                    tokio::time::sleep(self.settings.retry_backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) if e.is_retryable() => {
                    // Out of attempts: report the seats now held by others
                    return Err(self.unavailable_after_retries(show_time_id, &seats).await);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Deduplicate and bound the requested seat ids; sorted (canonical order).
    fn normalize_selection(&self, seat_ids: &[Uuid]) -> AppResult<Vec<Uuid>> {
        let mut ids = seat_ids.to_vec();
        ids.sort();
        ids.dedup();

        if ids.is_empty() {
            return Err(AppError::EmptySeatSelection);
        }
        if ids.len() > self.settings.max_seats_per_booking {
            return Err(AppError::TooManySeats {
                requested: ids.len(),
                limit: self.settings.max_seats_per_booking,
            });
        }
        Ok(ids)
    }

    async fn unavailable_after_retries(&self, show_time_id: Uuid, seats: &[Seat]) -> AppError {
        let held: Vec<Uuid> = match self.store.active_tickets(show_time_id).await {
            Ok(tickets) => {
                let requested: Vec<Uuid> = seats.iter().map(|s| s.id).collect();
                tickets
                    .into_iter()
                    .map(|t| t.seat_id)
                    .filter(|id| requested.contains(id))
                    .collect()
            }
            Err(e) => return e,
        };
        let seat_ids = if held.is_empty() {
            seats.iter().map(|s| s.id).collect()
        } else {
            held
        };
        let labels = labels_for(&seat_ids, seats);
        AppError::SeatUnavailable { seat_ids, labels }
    }
}

fn labels_for(seat_ids: &[Uuid], seats: &[Seat]) -> Vec<String> {
    let by_id: HashMap<Uuid, &str> = seats.iter().map(|s| (s.id, s.label.as_str())).collect();
    seat_ids
        .iter()
        .map(|id| {
            by_id
                .get(id)
                .map(|l| l.to_string())
                .unwrap_or_else(|| id.to_string())
        })
        .collect()
}

fn receipt(booking: Booking, tickets: Vec<Ticket>, seats: &[Seat]) -> BookingReceipt {
    let by_id: HashMap<Uuid, &Seat> = seats.iter().map(|s| (s.id, s)).collect();
    let mut lines: Vec<TicketReceipt> = tickets
        .into_iter()
        .map(|t| TicketReceipt {
            ticket_id: t.id,
            booking_id: t.booking_id,
            seat_id: t.seat_id,
            label: by_id
                .get(&t.seat_id)
                .map(|s| s.label.clone())
                .unwrap_or_default(),
            price_cents: t.price_cents,
            qr_code: t.qr_code,
            status: t.status,
        })
        .collect();
    lines.sort_by_key(|l| {
        by_id
            .get(&l.seat_id)
            .map(|s| (s.row_number, s.column_number))
            .unwrap_or_default()
    });
    BookingReceipt {
        booking,
        tickets: lines,
    }
}
