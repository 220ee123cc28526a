// =============================================================================
// AVAILABILITY MODULE
// =============================================================================
// Seat availability for a showtime.
//
// A seat is taken when it has a Reserved or Paid ticket for this showtime.
// The answer is a point-in-time snapshot taken without locks; bookings
// re-check inside the store.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::catalog::SeatCatalog;
use crate::error::{AppError, AppResult};
use crate::models::SeatAvailability;
use crate::store::BookingStore;

pub struct AvailabilityResolver {
    store: Arc<dyn BookingStore>,
    catalog: Arc<SeatCatalog>,
}

impl AvailabilityResolver {
    pub fn new(store: Arc<dyn BookingStore>, catalog: Arc<SeatCatalog>) -> Self {
        Self { store, catalog }
    }

    /// Every seat of the showtime's hall with its current state, in grid order.
    pub async fn get_availability(&self, show_time_id: Uuid) -> AppResult<Vec<SeatAvailability>> {
        let show_time = self
            .store
            .show_time(show_time_id)
            .await?
            .ok_or(AppError::ShowTimeNotFound(show_time_id))?;

        let seats = self.catalog.seats_for_hall(show_time.hall_id).await?;
        let held: HashMap<Uuid, _> = self
            .store
            .active_tickets(show_time_id)
            .await?
            .into_iter()
            .filter(|t| t.status.holds_seat())
            .map(|t| (t.seat_id, t))
            .collect();

        Ok(seats
            .into_iter()
            .map(|seat| {
                let ticket = held.get(&seat.id);
                SeatAvailability {
                    seat_id: seat.id,
                    row_number: seat.row_number,
                    column_number: seat.column_number,
                    label: seat.label,
                    is_taken: ticket.is_some(),
                    ticket_id: ticket.map(|t| t.id),
                    ticket_status: ticket.map(|t| t.status),
                }
            })
            .collect())
    }
}
