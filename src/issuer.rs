// =============================================================================
// TICKET ISSUER MODULE
// =============================================================================
// Scan-token generation and per-seat pricing.
//
// Turns a validated seat selection into a ReservationDraft: one Pending
// booking plus one Reserved ticket per seat, each with a fresh scan token.
// =============================================================================

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use uuid::Uuid;

use crate::models::{
    Booking, BookingStatus, PaymentMethod, ReservationDraft, Seat, ShowTime, Ticket, TicketStatus,
};

/// Price of one seat for one showtime, in cents.
///
/// The reservation algorithm only ever asks for a price per seat, so seat
/// categories can be introduced behind this trait.
pub trait PricingPolicy: Send + Sync {
    fn price_for(&self, show_time: &ShowTime, seat: &Seat) -> i64;
}

/// Every seat costs the showtime's base price.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatPricing;

impl PricingPolicy for FlatPricing {
    fn price_for(&self, show_time: &ShowTime, _seat: &Seat) -> i64 {
        show_time.base_price_cents
    }
}

/// Generate a scan token: 256 random bits, base64url (43 characters).
///
/// The token is the sole credential checked at the door.
pub fn generate_scan_code() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

pub struct TicketIssuer {
    pricing: Box<dyn PricingPolicy>,
    hold_duration: Duration,
}

impl TicketIssuer {
    pub fn new(pricing: Box<dyn PricingPolicy>, hold_duration: std::time::Duration) -> Self {
        Self {
            pricing,
            hold_duration: Duration::from_std(hold_duration).unwrap_or(Duration::minutes(10)),
        }
    }

    /// Build the booking and its tickets. Nothing is persisted here.
    pub fn draft(
        &self,
        client_id: &str,
        show_time: &ShowTime,
        seats: &[Seat],
        payment_method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> ReservationDraft {
        let booking_id = Uuid::new_v4();

        let tickets: Vec<Ticket> = seats
            .iter()
            .map(|seat| Ticket {
                id: Uuid::new_v4(),
                booking_id,
                show_time_id: show_time.id,
                seat_id: seat.id,
                price_cents: self.pricing.price_for(show_time, seat),
                qr_code: generate_scan_code(),
                status: TicketStatus::Reserved,
            })
            .collect();

        let booking = Booking {
            id: booking_id,
            client_id: client_id.to_string(),
            show_time_id: show_time.id,
            booking_time: now,
            hold_expires_at: now + self.hold_duration,
            total_price_cents: tickets.iter().map(|t| t.price_cents).sum(),
            payment_method,
            status: BookingStatus::Pending,
        };

        ReservationDraft { booking, tickets }
    }
}
