// =============================================================================
// PAYMENT CONFIRMATION MODULE
// =============================================================================
// Boundary to the external payment collaborator.
//
// A Pending booking moves exactly once:
//   success          -> booking Paid,      tickets Reserved -> Paid
//   failure/timeout  -> booking Cancelled, tickets Reserved -> Released
//
// Settled bookings are immutable. Confirmation callbacks may be delivered more
// than once, so a call against a settled booking is an idempotent no-op
// reported with `applied: false`, never an error.
// =============================================================================

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{
    Booking, BookingStatus, ConfirmationResult, Payment, PaymentOutcome, PaymentStatus,
    ReleaseSummary, TicketStatus,
};
use crate::store::BookingStore;

// -----------------------------------------------------------------------------
// SETTLEMENT PLAN
// -----------------------------------------------------------------------------

/// What applying an outcome to a booking should do.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// Booking already Paid or Cancelled; nothing changes
    AlreadySettled(BookingStatus),
    /// Move the booking and every ticket currently in `tickets_from`
    Apply {
        booking_status: BookingStatus,
        tickets_from: TicketStatus,
        tickets_to: TicketStatus,
        payment: Option<Payment>,
    },
}

/// Decide the transition for `booking` given `outcome`.
///
/// Called by the stores while the booking row is locked.
///
/// # Errors
/// `PaymentAmountMismatch` when a success reports a different amount than the
/// booking total; the booking is left untouched.
pub fn plan_settlement(
    booking: &Booking,
    outcome: &PaymentOutcome,
    now: DateTime<Utc>,
) -> AppResult<Settlement> {
    if booking.status.is_settled() {
        return Ok(Settlement::AlreadySettled(booking.status));
    }

    let settlement = match outcome {
        PaymentOutcome::Succeeded {
            transaction_id,
            amount_cents,
        } => {
            if *amount_cents != booking.total_price_cents {
                return Err(AppError::PaymentAmountMismatch {
                    expected: booking.total_price_cents,
                    reported: *amount_cents,
                });
            }
            Settlement::Apply {
                booking_status: BookingStatus::Paid,
                tickets_from: TicketStatus::Reserved,
                tickets_to: TicketStatus::Paid,
                payment: Some(Payment {
                    id: Uuid::new_v4(),
                    booking_id: booking.id,
                    amount_cents: *amount_cents,
                    method: booking.payment_method,
                    status: PaymentStatus::Completed,
                    payment_time: now,
                    transaction_id: Some(transaction_id.clone()),
                }),
            }
        }
        PaymentOutcome::Failed { .. } => Settlement::Apply {
            booking_status: BookingStatus::Cancelled,
            tickets_from: TicketStatus::Reserved,
            tickets_to: TicketStatus::Released,
            payment: Some(Payment {
                id: Uuid::new_v4(),
                booking_id: booking.id,
                amount_cents: booking.total_price_cents,
                method: booking.payment_method,
                status: PaymentStatus::Failed,
                payment_time: now,
                transaction_id: None,
            }),
        },
        // Hold expiry: no payment attempt to record
        PaymentOutcome::TimedOut => Settlement::Apply {
            booking_status: BookingStatus::Cancelled,
            tickets_from: TicketStatus::Reserved,
            tickets_to: TicketStatus::Released,
            payment: None,
        },
    };

    Ok(settlement)
}

// -----------------------------------------------------------------------------
// HANDLER
// -----------------------------------------------------------------------------

pub struct PaymentConfirmationHandler {
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
}

impl PaymentConfirmationHandler {
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Apply a payment outcome reported by the payment collaborator.
    pub async fn confirm_payment(
        &self,
        booking_id: Uuid,
        outcome: PaymentOutcome,
    ) -> AppResult<ConfirmationResult> {
        let result = self
            .store
            .settle(booking_id, &outcome, self.clock.now())
            .await?;

        metrics::record_payment_confirmation(outcome.label(), result.applied);

        if result.applied {
            info!(
                booking_id = %booking_id,
                outcome = outcome.label(),
                status = ?result.status,
                "Payment outcome applied"
            );
        } else if matches!(outcome, PaymentOutcome::Succeeded { .. })
            && result.status == BookingStatus::Cancelled
        {
            warn!(
                booking_id = %booking_id,
                "Payment succeeded for a cancelled booking; refund required"
            );
        } else {
            info!(
                booking_id = %booking_id,
                outcome = outcome.label(),
                status = ?result.status,
                "Booking already settled; confirmation ignored"
            );
        }

        Ok(result)
    }

    /// Cancel every Pending booking whose hold has expired and free its seats.
    ///
    /// A booking that gets paid between listing and release is left alone:
    /// the settlement sees it already settled. A booking that fails to settle
    /// is logged and skipped; it is retried on the next sweep.
    ///
    /// # Errors
    /// Only when the expired holds cannot be listed.
    pub async fn release_expired_holds(&self) -> AppResult<ReleaseSummary> {
        let now = self.clock.now();
        let expired = self.store.expired_holds(now).await?;

        let mut released = Vec::with_capacity(expired.len());
        let mut failed = 0_u64;
        for booking_id in expired {
            match self
                .store
                .settle(booking_id, &PaymentOutcome::TimedOut, now)
                .await
            {
                Ok(result) if result.applied => {
                    info!(booking_id = %booking_id, "Reservation hold expired; seats released");
                    released.push(booking_id);
                }
                Ok(_) => {}
                // Skipped; the next sweep lists it again
                Err(e) => {
                    failed += 1;
                    warn!(booking_id = %booking_id, error = %e, "Failed to release expired hold");
                }
            }
        }

        metrics::record_holds_released(released.len() as u64);
        if failed > 0 {
            metrics::record_hold_release_failures(failed);
        }
        Ok(ReleaseSummary { released })
    }
}

/// Run `release_expired_holds` on a fixed interval until the task is aborted.
pub fn spawn_hold_sweeper(
    handler: Arc<PaymentConfirmationHandler>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = handler.release_expired_holds().await {
                warn!(error = %e, "Hold sweep failed");
            }
        }
    })
}
