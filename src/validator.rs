// =============================================================================
// TICKET VALIDATOR MODULE
// =============================================================================
// Door-scan state machine. The only transition is Paid -> Used, and it happens
// at most once per ticket.
//
// CHECK ORDER:
//   1. ticket exists                  else TicketNotFound
//   2. booking is Paid                else BookingNotPaid
//   3. ticket is Paid                 else TicketNotPaid / TicketAlreadyUsed
//   4. now <= showtime end            else TicketExpired
//   5. mark Used (under the store's lock, so one of two racing scans wins)
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{Booking, BookingStatus, ShowTime, Ticket, TicketStatus};
use crate::store::BookingStore;

/// Checks 2-4 of the scan. Called by the stores with the ticket row locked.
pub fn check_scan(
    ticket: &Ticket,
    booking: &Booking,
    show_time: &ShowTime,
    now: DateTime<Utc>,
) -> AppResult<()> {
    if booking.status != BookingStatus::Paid {
        return Err(AppError::BookingNotPaid(booking.id));
    }

    match ticket.status {
        TicketStatus::Paid => {}
        TicketStatus::Used => return Err(AppError::TicketAlreadyUsed(ticket.id)),
        TicketStatus::Reserved | TicketStatus::Released => {
            return Err(AppError::TicketNotPaid(ticket.id))
        }
    }

    // Hard deadline, never relaxed
    if now > show_time.end_time {
        return Err(AppError::TicketExpired(ticket.id));
    }

    Ok(())
}

/// Why a scan was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanRejection {
    TicketNotFound,
    BookingNotPaid,
    TicketNotPaid,
    TicketAlreadyUsed,
    TicketExpired,
}

impl ScanRejection {
    fn from_error(err: &AppError) -> Option<Self> {
        match err {
            AppError::TicketNotFound(_) => Some(ScanRejection::TicketNotFound),
            AppError::BookingNotPaid(_) => Some(ScanRejection::BookingNotPaid),
            AppError::TicketNotPaid(_) => Some(ScanRejection::TicketNotPaid),
            AppError::TicketAlreadyUsed(_) => Some(ScanRejection::TicketAlreadyUsed),
            AppError::TicketExpired(_) => Some(ScanRejection::TicketExpired),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ScanRejection::TicketNotFound => "ticket_not_found",
            ScanRejection::BookingNotPaid => "booking_not_paid",
            ScanRejection::TicketNotPaid => "ticket_not_paid",
            ScanRejection::TicketAlreadyUsed => "ticket_already_used",
            ScanRejection::TicketExpired => "ticket_expired",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub ticket_id: Uuid,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ScanRejection>,
}

pub struct TicketValidator {
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
}

impl TicketValidator {
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Scan a ticket at the door.
    ///
    /// Business refusals come back as `valid: false` with a reason; only
    /// infrastructure failures are errors.
    pub async fn scan(&self, ticket_id: Uuid) -> AppResult<ScanResult> {
        match self.store.consume_ticket(ticket_id, self.clock.now()).await {
            Ok(_) => {
                metrics::record_scan("accepted");
                info!(ticket_id = %ticket_id, "Ticket scanned");
                Ok(ScanResult {
                    ticket_id,
                    valid: true,
                    reason: None,
                })
            }
            Err(err) => match ScanRejection::from_error(&err) {
                Some(reason) => {
                    metrics::record_scan(reason.label());
                    warn!(ticket_id = %ticket_id, reason = reason.label(), "Ticket refused");
                    Ok(ScanResult {
                        ticket_id,
                        valid: false,
                        reason: Some(reason),
                    })
                }
                None => Err(err),
            },
        }
    }
}
