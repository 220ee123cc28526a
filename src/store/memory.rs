// =============================================================================
// IN-MEMORY STORE
// =============================================================================
// Single-process BookingStore. Tables live behind one RwLock; atomicity of
// every check-then-write comes from a sharded lock with one async mutex per
// showtime, held for the whole operation.
//
// The `active` map plays the role of the Postgres partial unique index: one
// entry per (show_time_id, seat_id) whose ticket is Reserved or Paid.
//
// Correct for one instance only. Multi-instance deployments use the postgres
// store.
// =============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use uuid::Uuid;

use super::seed::{sample_cinema, seat_grid, SampleCinema};
use super::{BookingStore, ReserveOutcome};
use crate::error::{AppError, AppResult};
use crate::models::{
    Booking, BookingReceipt, ConfirmationResult, Hall, Movie, Payment, PaymentOutcome,
    ReservationDraft, Seat, ShowTime, Theatre, Ticket, TicketDetail, TicketReceipt, TicketStatus,
};
use crate::payment::{plan_settlement, Settlement};
use crate::validator::check_scan;

#[derive(Default)]
struct Tables {
    theatres: HashMap<Uuid, Theatre>,
    movies: HashMap<Uuid, Movie>,
    halls: HashMap<Uuid, Hall>,
    seats: HashMap<Uuid, Seat>,
    show_times: HashMap<Uuid, ShowTime>,
    bookings: HashMap<Uuid, Booking>,
    tickets: HashMap<Uuid, Ticket>,
    payments: Vec<Payment>,
    /// (show_time_id, seat_id) -> ticket id of the Reserved/Paid ticket
    active: HashMap<(Uuid, Uuid), Uuid>,
}

impl Tables {
    fn receipt(&self, booking: &Booking) -> BookingReceipt {
        let mut lines: Vec<(&Seat, &Ticket)> = self
            .tickets
            .values()
            .filter(|t| t.booking_id == booking.id)
            .filter_map(|t| self.seats.get(&t.seat_id).map(|s| (s, t)))
            .collect();
        lines.sort_by_key(|(s, _)| (s.row_number, s.column_number));

        BookingReceipt {
            booking: booking.clone(),
            tickets: lines
                .into_iter()
                .map(|(seat, ticket)| TicketReceipt {
                    ticket_id: ticket.id,
                    booking_id: ticket.booking_id,
                    seat_id: seat.id,
                    label: seat.label.clone(),
                    price_cents: ticket.price_cents,
                    qr_code: ticket.qr_code.clone(),
                    status: ticket.status,
                })
                .collect(),
        }
    }

    fn set_ticket_status(&mut self, ticket_id: Uuid, status: TicketStatus) {
        if let Some(ticket) = self.tickets.get_mut(&ticket_id) {
            ticket.status = status;
            let key = (ticket.show_time_id, ticket.seat_id);
            if status.holds_seat() {
                self.active.insert(key, ticket.id);
            } else if self.active.get(&key) == Some(&ticket.id) {
                self.active.remove(&key);
            }
        }
    }
}

#[derive(Default)]
pub struct InMemoryBookingStore {
    tables: RwLock<Tables>,
    shards: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock serializing every write on one showtime.
    fn shard(&self, show_time_id: Uuid) -> Arc<AsyncMutex<()>> {
        let mut shards = self.shards.lock().unwrap_or_else(|e| e.into_inner());
        shards.entry(show_time_id).or_default().clone()
    }

    /// Drop the locks of ended showtimes that nobody is holding.
    ///
    /// A lock still cloned by an in-flight operation has a strong count above
    /// one and is kept; `shard()` takes the same map lock, so no clone can
    /// appear while the count is being read.
    fn prune_shards(&self, ended: &[Uuid]) {
        let mut shards = self.shards.lock().unwrap_or_else(|e| e.into_inner());
        for show_time_id in ended {
            if shards
                .get(show_time_id)
                .is_some_and(|lock| Arc::strong_count(lock) == 1)
            {
                shards.remove(show_time_id);
            }
        }
    }

    #[cfg(test)]
    fn shard_count(&self) -> usize {
        self.shards.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    // -------------------------------------------------------------------------
    // REFERENCE DATA PROVISIONING
    // -------------------------------------------------------------------------

    pub async fn add_theatre(&self, theatre: Theatre) {
        self.tables.write().await.theatres.insert(theatre.id, theatre);
    }

    pub async fn add_movie(&self, movie: Movie) {
        self.tables.write().await.movies.insert(movie.id, movie);
    }

    /// Add a hall together with its full seat grid; returns the seats.
    pub async fn add_hall(&self, hall: Hall) -> Vec<Seat> {
        let seats = seat_grid(&hall);
        let mut tables = self.tables.write().await;
        for seat in &seats {
            tables.seats.insert(seat.id, seat.clone());
        }
        tables.halls.insert(hall.id, hall);
        seats
    }

    /// # Errors
    /// `BadRequest` when the showtime does not end after it starts or its
    /// hall is unknown.
    pub async fn add_show_time(&self, show_time: ShowTime) -> AppResult<()> {
        if show_time.end_time <= show_time.start_time {
            return Err(AppError::BadRequest(
                "showtime must end after it starts".to_string(),
            ));
        }
        let mut tables = self.tables.write().await;
        if !tables.halls.contains_key(&show_time.hall_id) {
            return Err(AppError::BadRequest(format!(
                "unknown hall {}",
                show_time.hall_id
            )));
        }
        tables.show_times.insert(show_time.id, show_time);
        Ok(())
    }

    /// Load the sample cinema fixture.
    pub async fn seed_sample_data(&self, from: DateTime<Utc>) -> AppResult<SampleCinema> {
        let cinema = sample_cinema(from);
        {
            let mut tables = self.tables.write().await;
            tables.theatres.insert(cinema.theatre.id, cinema.theatre.clone());
            tables.movies.insert(cinema.movie.id, cinema.movie.clone());
            tables.halls.insert(cinema.hall.id, cinema.hall.clone());
            for seat in &cinema.seats {
                tables.seats.insert(seat.id, seat.clone());
            }
        }
        for show_time in &cinema.show_times {
            self.add_show_time(show_time.clone()).await?;
        }
        Ok(cinema)
    }

    /// Payment records written for a booking.
    pub async fn payments_for_booking(&self, booking_id: Uuid) -> Vec<Payment> {
        self.tables
            .read()
            .await
            .payments
            .iter()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect()
    }

    /// Every ticket ever written for a showtime, in any status.
    pub async fn tickets_for_show_time(&self, show_time_id: Uuid) -> Vec<Ticket> {
        self.tables
            .read()
            .await
            .tickets
            .values()
            .filter(|t| t.show_time_id == show_time_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn health_check(&self) -> bool {
        true
    }

    async fn show_time(&self, id: Uuid) -> AppResult<Option<ShowTime>> {
        Ok(self.tables.read().await.show_times.get(&id).cloned())
    }

    async fn hall_seats(&self, hall_id: Uuid) -> AppResult<Vec<Seat>> {
        let tables = self.tables.read().await;
        let mut seats: Vec<Seat> = tables
            .seats
            .values()
            .filter(|s| s.hall_id == hall_id)
            .cloned()
            .collect();
        seats.sort_by_key(|s| (s.row_number, s.column_number));
        Ok(seats)
    }

    async fn active_tickets(&self, show_time_id: Uuid) -> AppResult<Vec<Ticket>> {
        let tables = self.tables.read().await;
        Ok(tables
            .active
            .iter()
            .filter(|((show, _), _)| *show == show_time_id)
            .filter_map(|(_, ticket_id)| tables.tickets.get(ticket_id).cloned())
            .collect())
    }

    async fn reserve(&self, draft: &ReservationDraft) -> AppResult<ReserveOutcome> {
        let show_time_id = draft.booking.show_time_id;
        let shard = self.shard(show_time_id);
        let _guard = shard.lock().await;

        // The shard guard serializes every writer of this showtime's seats,
        // so the check and the insert below cannot interleave with another.
        let mut tables = self.tables.write().await;
        let taken: Vec<Uuid> = draft
            .tickets
            .iter()
            .map(|t| t.seat_id)
            .filter(|seat_id| tables.active.contains_key(&(show_time_id, *seat_id)))
            .collect();
        if !taken.is_empty() {
            return Ok(ReserveOutcome::Conflict(taken));
        }

        tables
            .bookings
            .insert(draft.booking.id, draft.booking.clone());
        for ticket in &draft.tickets {
            tables
                .active
                .insert((show_time_id, ticket.seat_id), ticket.id);
            tables.tickets.insert(ticket.id, ticket.clone());
        }
        Ok(ReserveOutcome::Reserved)
    }

    async fn booking(&self, id: Uuid) -> AppResult<Option<BookingReceipt>> {
        let tables = self.tables.read().await;
        Ok(tables.bookings.get(&id).map(|b| tables.receipt(b)))
    }

    async fn bookings_for_client(&self, client_id: &str) -> AppResult<Vec<BookingReceipt>> {
        let tables = self.tables.read().await;
        let mut bookings: Vec<&Booking> = tables
            .bookings
            .values()
            .filter(|b| b.client_id == client_id)
            .collect();
        bookings.sort_by_key(|b| std::cmp::Reverse(b.booking_time));
        Ok(bookings.into_iter().map(|b| tables.receipt(b)).collect())
    }

    async fn tickets_for_client(&self, client_id: &str) -> AppResult<Vec<TicketDetail>> {
        let tables = self.tables.read().await;
        let mut details = Vec::new();

        for booking in tables.bookings.values().filter(|b| b.client_id == client_id) {
            let Some(show_time) = tables.show_times.get(&booking.show_time_id) else {
                continue;
            };
            let Some(hall) = tables.halls.get(&show_time.hall_id) else {
                continue;
            };
            let movie_title = tables
                .movies
                .get(&show_time.movie_id)
                .map(|m| m.title.clone())
                .unwrap_or_default();
            let theatre_name = tables
                .theatres
                .get(&hall.theatre_id)
                .map(|t| t.name.clone())
                .unwrap_or_default();

            for ticket in tables.tickets.values().filter(|t| t.booking_id == booking.id) {
                let Some(seat) = tables.seats.get(&ticket.seat_id) else {
                    continue;
                };
                details.push(TicketDetail {
                    ticket_id: ticket.id,
                    booking_id: booking.id,
                    qr_code: ticket.qr_code.clone(),
                    status: ticket.status,
                    price_cents: ticket.price_cents,
                    seat_label: seat.label.clone(),
                    row_number: seat.row_number,
                    column_number: seat.column_number,
                    movie_title: movie_title.clone(),
                    hall_name: hall.name.clone(),
                    theatre_name: theatre_name.clone(),
                    start_time: show_time.start_time,
                    end_time: show_time.end_time,
                });
            }
        }

        details.sort_by(|a, b| {
            (a.start_time, a.row_number, a.column_number).cmp(&(
                b.start_time,
                b.row_number,
                b.column_number,
            ))
        });
        Ok(details)
    }

    async fn settle(
        &self,
        booking_id: Uuid,
        outcome: &PaymentOutcome,
        now: DateTime<Utc>,
    ) -> AppResult<ConfirmationResult> {
        let show_time_id = self
            .tables
            .read()
            .await
            .bookings
            .get(&booking_id)
            .map(|b| b.show_time_id)
            .ok_or(AppError::BookingNotFound(booking_id))?;

        let shard = self.shard(show_time_id);
        let _guard = shard.lock().await;

        let mut tables = self.tables.write().await;
        let booking = tables
            .bookings
            .get(&booking_id)
            .cloned()
            .ok_or(AppError::BookingNotFound(booking_id))?;

        match plan_settlement(&booking, outcome, now)? {
            Settlement::AlreadySettled(status) => Ok(ConfirmationResult {
                booking_id,
                status,
                applied: false,
            }),
            Settlement::Apply {
                booking_status,
                tickets_from,
                tickets_to,
                payment,
            } => {
                let ticket_ids: Vec<Uuid> = tables
                    .tickets
                    .values()
                    .filter(|t| t.booking_id == booking_id && t.status == tickets_from)
                    .map(|t| t.id)
                    .collect();
                for ticket_id in ticket_ids {
                    tables.set_ticket_status(ticket_id, tickets_to);
                }
                if let Some(b) = tables.bookings.get_mut(&booking_id) {
                    b.status = booking_status;
                }
                if let Some(payment) = payment {
                    tables.payments.push(payment);
                }
                Ok(ConfirmationResult {
                    booking_id,
                    status: booking_status,
                    applied: true,
                })
            }
        }
    }

    async fn expired_holds(&self, now: DateTime<Utc>) -> AppResult<Vec<Uuid>> {
        let tables = self.tables.read().await;

        // Runs on every sweep, so it doubles as shard housekeeping
        let ended: Vec<Uuid> = tables
            .show_times
            .values()
            .filter(|s| s.has_ended(now))
            .map(|s| s.id)
            .collect();
        self.prune_shards(&ended);

        Ok(tables
            .bookings
            .values()
            .filter(|b| !b.status.is_settled() && b.hold_expires_at <= now)
            .map(|b| b.id)
            .collect())
    }

    async fn consume_ticket(&self, ticket_id: Uuid, now: DateTime<Utc>) -> AppResult<Ticket> {
        let show_time_id = self
            .tables
            .read()
            .await
            .tickets
            .get(&ticket_id)
            .map(|t| t.show_time_id)
            .ok_or(AppError::TicketNotFound(ticket_id))?;

        let shard = self.shard(show_time_id);
        let _guard = shard.lock().await;

        let mut tables = self.tables.write().await;
        let ticket = tables
            .tickets
            .get(&ticket_id)
            .cloned()
            .ok_or(AppError::TicketNotFound(ticket_id))?;
        let booking = tables
            .bookings
            .get(&ticket.booking_id)
            .ok_or(AppError::BookingNotFound(ticket.booking_id))?;
        let show_time = tables
            .show_times
            .get(&ticket.show_time_id)
            .ok_or(AppError::ShowTimeNotFound(ticket.show_time_id))?;

        check_scan(&ticket, booking, show_time, now)?;

        tables.set_ticket_status(ticket_id, TicketStatus::Used);
        Ok(Ticket {
            status: TicketStatus::Used,
            ..ticket
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookingStatus, PaymentMethod};
    use chrono::Duration;

    fn draft_for(show_time: &ShowTime, seat: &Seat, now: DateTime<Utc>) -> ReservationDraft {
        let booking_id = Uuid::new_v4();
        ReservationDraft {
            booking: Booking {
                id: booking_id,
                client_id: "client-1".into(),
                show_time_id: show_time.id,
                booking_time: now,
                hold_expires_at: now + Duration::minutes(10),
                total_price_cents: show_time.base_price_cents,
                payment_method: PaymentMethod::Cash,
                status: BookingStatus::Pending,
            },
            tickets: vec![Ticket {
                id: Uuid::new_v4(),
                booking_id,
                show_time_id: show_time.id,
                seat_id: seat.id,
                price_cents: show_time.base_price_cents,
                qr_code: format!("code-{booking_id}"),
                status: TicketStatus::Reserved,
            }],
        }
    }

    #[tokio::test]
    async fn second_reservation_of_a_seat_conflicts() {
        let now = Utc::now();
        let store = InMemoryBookingStore::new();
        let cinema = store.seed_sample_data(now).await.unwrap();
        let show_time = &cinema.show_times[0];

        let first = draft_for(show_time, &cinema.seats[0], now);
        let second = draft_for(show_time, &cinema.seats[0], now);

        assert_eq!(store.reserve(&first).await.unwrap(), ReserveOutcome::Reserved);
        assert_eq!(
            store.reserve(&second).await.unwrap(),
            ReserveOutcome::Conflict(vec![cinema.seats[0].id])
        );
        assert!(store.booking(second.booking.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sweep_drops_locks_of_ended_showtimes() {
        let now = Utc::now();
        let store = InMemoryBookingStore::new();
        let cinema = store.seed_sample_data(now).await.unwrap();

        for show_time in &cinema.show_times {
            let draft = draft_for(show_time, &cinema.seats[0], now);
            store.reserve(&draft).await.unwrap();
        }
        assert_eq!(store.shard_count(), 3);

        // Only the first showtime has ended
        let after_first = cinema.show_times[0].end_time + Duration::seconds(1);
        store.expired_holds(after_first).await.unwrap();
        assert_eq!(store.shard_count(), 2);

        // A held lock survives pruning
        let held = store.shard(cinema.show_times[1].id);
        let _guard = held.lock().await;
        let after_all = cinema.show_times[2].end_time + Duration::seconds(1);
        store.expired_holds(after_all).await.unwrap();
        assert_eq!(store.shard_count(), 1);
    }
}
