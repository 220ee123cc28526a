//! End-to-end behaviour of the booking engine over the in-memory store.
//!
//! Time is driven by a ManualClock so hold expiry and show end are exact.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use cinema_booking::catalog::SeatCatalog;
use cinema_booking::clock::ManualClock;
use cinema_booking::config::BookingSettings;
use cinema_booking::error::AppError;
use cinema_booking::models::{
    BookingReceipt, BookingStatus, PaymentMethod, PaymentOutcome, PaymentStatus, TicketStatus,
};
use cinema_booking::store::seed::SampleCinema;
use cinema_booking::store::InMemoryBookingStore;
use cinema_booking::validator::ScanRejection;
use cinema_booking::AppState;
use uuid::Uuid;

struct Harness {
    store: Arc<InMemoryBookingStore>,
    clock: Arc<ManualClock>,
    state: Arc<AppState>,
    cinema: SampleCinema,
}

impl Harness {
    async fn new() -> Self {
        let now = Utc::now();
        let store = Arc::new(InMemoryBookingStore::new());
        let clock = Arc::new(ManualClock::new(now));
        let cinema = store.seed_sample_data(now).await.unwrap();

        let state = AppState::new(
            store.clone(),
            SeatCatalog::new(store.clone()),
            clock.clone(),
            BookingSettings::default(),
        );

        Self {
            store,
            clock,
            state: Arc::new(state),
            cinema,
        }
    }

    fn show_time_id(&self) -> Uuid {
        self.cinema.show_times[0].id
    }

    fn seat(&self, label: &str) -> Uuid {
        self.cinema
            .seats
            .iter()
            .find(|s| s.label == label)
            .map(|s| s.id)
            .unwrap()
    }

    fn seats(&self, labels: &[&str]) -> Vec<Uuid> {
        labels.iter().map(|l| self.seat(l)).collect()
    }

    async fn book(&self, client: &str, labels: &[&str]) -> Result<BookingReceipt, AppError> {
        self.state
            .coordinator
            .create_booking(
                client,
                self.show_time_id(),
                &self.seats(labels),
                PaymentMethod::CreditCard,
            )
            .await
    }

    async fn pay(&self, receipt: &BookingReceipt) {
        let result = self
            .state
            .payments
            .confirm_payment(
                receipt.booking.id,
                PaymentOutcome::Succeeded {
                    transaction_id: format!("tx-{}", receipt.booking.id),
                    amount_cents: receipt.booking.total_price_cents,
                },
            )
            .await
            .unwrap();
        assert!(result.applied);
    }

    async fn taken_labels(&self) -> Vec<String> {
        self.state
            .availability
            .get_availability(self.show_time_id())
            .await
            .unwrap()
            .into_iter()
            .filter(|s| s.is_taken)
            .map(|s| s.label)
            .collect()
    }
}

// =============================================================================
// RESERVATION
// =============================================================================

#[tokio::test]
async fn second_client_is_refused_the_overlapping_seat() {
    let h = Harness::new().await;

    let first = h.book("client-1", &["A1", "A2"]).await.unwrap();
    assert_eq!(first.booking.status, BookingStatus::Pending);
    assert_eq!(first.booking.total_price_cents, 2500);
    assert_eq!(first.tickets.len(), 2);
    assert!(first
        .tickets
        .iter()
        .all(|t| t.status == TicketStatus::Reserved && t.qr_code.len() == 43));

    match h.book("client-2", &["A2", "A3"]).await {
        Err(AppError::SeatUnavailable { seat_ids, labels }) => {
            assert_eq!(labels, vec!["A2".to_string()]);
            assert_eq!(seat_ids, vec![h.seat("A2")]);
        }
        other => panic!("expected SeatUnavailable, got {other:?}"),
    }

    assert_eq!(h.taken_labels().await, ["A1", "A2"]);
}

#[tokio::test]
async fn refused_client_can_retry_with_the_free_seat() {
    let h = Harness::new().await;
    h.book("client-x", &["A1"]).await.unwrap();

    match h.book("client-y", &["A1", "A2"]).await {
        Err(AppError::SeatUnavailable { labels, .. }) => assert_eq!(labels, ["A1"]),
        other => panic!("expected SeatUnavailable, got {other:?}"),
    }
    assert_eq!(h.taken_labels().await, ["A1"]);

    let retry = h.book("client-y", &["A2"]).await.unwrap();
    assert_eq!(retry.tickets[0].label, "A2");
}

#[tokio::test]
async fn failed_booking_writes_nothing() {
    let h = Harness::new().await;
    h.book("client-1", &["A3"]).await.unwrap();

    let err = h.book("client-2", &["A1", "A2", "A3"]).await.unwrap_err();
    assert!(matches!(err, AppError::SeatUnavailable { .. }));

    assert_eq!(h.taken_labels().await, ["A3"]);
    assert!(h
        .state
        .store
        .bookings_for_client("client-2")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn invalid_selections_are_rejected_before_reserving() {
    let h = Harness::new().await;

    assert!(matches!(
        h.book("c", &[]).await,
        Err(AppError::EmptySeatSelection)
    ));

    let eleven: Vec<&str> = vec!["A1", "A2", "A3", "A4", "A5", "A6", "A7", "A8", "B1", "B2", "B3"];
    assert!(matches!(
        h.book("c", &eleven).await,
        Err(AppError::TooManySeats {
            requested: 11,
            limit: 10
        })
    ));

    let stranger = Uuid::new_v4();
    match h
        .state
        .coordinator
        .create_booking("c", h.show_time_id(), &[h.seat("A1"), stranger], PaymentMethod::Cash)
        .await
    {
        Err(AppError::InvalidSeatForHall { seat_ids }) => assert_eq!(seat_ids, vec![stranger]),
        other => panic!("expected InvalidSeatForHall, got {other:?}"),
    }

    let unknown = Uuid::new_v4();
    assert!(matches!(
        h.state
            .coordinator
            .create_booking("c", unknown, &[h.seat("A1")], PaymentMethod::Cash)
            .await,
        Err(AppError::ShowTimeNotFound(id)) if id == unknown
    ));

    assert!(h.taken_labels().await.is_empty());
}

#[tokio::test]
async fn duplicate_seat_ids_collapse_to_one_ticket() {
    let h = Harness::new().await;
    let receipt = h.book("c", &["C4", "C4"]).await.unwrap();
    assert_eq!(receipt.tickets.len(), 1);
    assert_eq!(receipt.booking.total_price_cents, 1250);
}

#[tokio::test]
async fn ended_showtime_cannot_be_booked() {
    let h = Harness::new().await;
    h.clock.set(h.cinema.show_times[0].end_time);

    assert!(matches!(
        h.book("c", &["A1"]).await,
        Err(AppError::ShowTimeEnded(_))
    ));
}

#[tokio::test]
async fn same_seat_on_another_showtime_is_independent() {
    let h = Harness::new().await;
    h.book("c1", &["A1"]).await.unwrap();

    let later = h.cinema.show_times[1].id;
    let receipt = h
        .state
        .coordinator
        .create_booking("c2", later, &[h.seat("A1")], PaymentMethod::Wallet)
        .await
        .unwrap();
    assert_eq!(receipt.booking.show_time_id, later);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_overlapping_bookings_never_double_book() {
    let h = Arc::new(Harness::new().await);

    // Every task wants two adjacent seats in row A; neighbours overlap.
    let mut tasks = Vec::new();
    for round in 0..3 {
        for col in 1..8 {
            let h = h.clone();
            tasks.push(tokio::spawn(async move {
                let a = format!("A{col}");
                let b = format!("A{}", col + 1);
                h.book(&format!("client-{round}-{col}"), &[a.as_str(), b.as_str()])
                    .await
            }));
        }
    }

    let mut claimed: HashMap<Uuid, Uuid> = HashMap::new();
    let mut refused: Vec<Uuid> = Vec::new();
    let mut successes = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(receipt) => {
                successes += 1;
                assert_eq!(receipt.tickets.len(), 2);
                for ticket in &receipt.tickets {
                    let previous = claimed.insert(ticket.seat_id, receipt.booking.id);
                    assert!(previous.is_none(), "seat {} sold twice", ticket.label);
                }
            }
            Err(AppError::SeatUnavailable { seat_ids, .. }) => {
                assert!(!seat_ids.is_empty());
                refused.extend(seat_ids);
            }
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }

    assert!(successes >= 1);
    // Every refusal names a seat some winner actually holds
    assert!(refused.iter().all(|seat| claimed.contains_key(seat)));
    let active: Vec<_> = h
        .store
        .tickets_for_show_time(h.show_time_id())
        .await
        .into_iter()
        .filter(|t| t.status.holds_seat())
        .collect();
    assert_eq!(active.len(), successes * 2);

    let distinct: HashSet<Uuid> = active.iter().map(|t| t.seat_id).collect();
    assert_eq!(distinct.len(), active.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn last_seat_goes_to_exactly_one_of_many() {
    let h = Arc::new(Harness::new().await);

    let tasks: Vec<_> = (0..50)
        .map(|i| {
            let h = h.clone();
            tokio::spawn(async move { h.book(&format!("client-{i}"), &["E8"]).await })
        })
        .collect();

    let mut winners = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

// =============================================================================
// PAYMENT CONFIRMATION
// =============================================================================

#[tokio::test]
async fn successful_payment_marks_booking_and_tickets_paid_once() {
    let h = Harness::new().await;
    let receipt = h.book("client-1", &["B1", "B2"]).await.unwrap();
    h.pay(&receipt).await;

    let stored = h.store_booking(receipt.booking.id).await;
    assert_eq!(stored.booking.status, BookingStatus::Paid);
    assert!(stored.tickets.iter().all(|t| t.status == TicketStatus::Paid));

    let payments = h.store.payments_for_booking(receipt.booking.id).await;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Completed);
    assert_eq!(payments[0].amount_cents, 2500);

    // Redelivered callbacks are no-ops, whatever they say
    let again = h
        .state
        .payments
        .confirm_payment(receipt.booking.id, PaymentOutcome::Failed { reason: None })
        .await
        .unwrap();
    assert!(!again.applied);
    assert_eq!(again.status, BookingStatus::Paid);
    assert_eq!(h.store.payments_for_booking(receipt.booking.id).await.len(), 1);
    assert_eq!(h.taken_labels().await, ["B1", "B2"]);
}

#[tokio::test]
async fn repeated_outcome_is_applied_only_once() {
    let h = Harness::new().await;
    let cases = [
        (
            "E1",
            PaymentOutcome::Succeeded {
                transaction_id: "tx-e1".into(),
                amount_cents: 1250,
            },
            BookingStatus::Paid,
            1,
        ),
        (
            "E2",
            PaymentOutcome::Failed {
                reason: Some("insufficient funds".into()),
            },
            BookingStatus::Cancelled,
            1,
        ),
        ("E3", PaymentOutcome::TimedOut, BookingStatus::Cancelled, 0),
    ];

    for (label, outcome, expected, payment_rows) in cases {
        let receipt = h.book("client-1", &[label]).await.unwrap();
        let id = receipt.booking.id;

        let first = h
            .state
            .payments
            .confirm_payment(id, outcome.clone())
            .await
            .unwrap();
        assert!(first.applied, "{}", outcome.label());
        assert_eq!(first.status, expected);
        let after_first = h.store_booking(id).await;
        let payments_after_first = h.store.payments_for_booking(id).await;

        let second = h
            .state
            .payments
            .confirm_payment(id, outcome.clone())
            .await
            .unwrap();
        assert!(!second.applied, "{}", outcome.label());
        assert_eq!(second.status, expected);

        let after_second = h.store_booking(id).await;
        assert_eq!(after_second.booking.status, after_first.booking.status);
        let statuses =
            |r: &BookingReceipt| r.tickets.iter().map(|t| t.status).collect::<Vec<_>>();
        assert_eq!(statuses(&after_second), statuses(&after_first));

        let payments = h.store.payments_for_booking(id).await;
        assert_eq!(payments.len(), payment_rows, "{}", outcome.label());
        assert_eq!(payments, payments_after_first);
    }

    assert_eq!(h.taken_labels().await, ["E1"]);
}

#[tokio::test]
async fn failed_payment_cancels_and_frees_the_seats() {
    let h = Harness::new().await;
    let receipt = h.book("client-1", &["A1", "A2"]).await.unwrap();

    let result = h
        .state
        .payments
        .confirm_payment(
            receipt.booking.id,
            PaymentOutcome::Failed {
                reason: Some("card declined".into()),
            },
        )
        .await
        .unwrap();
    assert!(result.applied);
    assert_eq!(result.status, BookingStatus::Cancelled);

    let stored = h.store_booking(receipt.booking.id).await;
    assert!(stored
        .tickets
        .iter()
        .all(|t| t.status == TicketStatus::Released));
    assert_eq!(
        h.store.payments_for_booking(receipt.booking.id).await[0].status,
        PaymentStatus::Failed
    );

    assert!(h.taken_labels().await.is_empty());
    h.book("client-2", &["A2", "A3"]).await.unwrap();
}

#[tokio::test]
async fn mismatched_amount_leaves_booking_pending() {
    let h = Harness::new().await;
    let receipt = h.book("client-1", &["D5"]).await.unwrap();

    let err = h
        .state
        .payments
        .confirm_payment(
            receipt.booking.id,
            PaymentOutcome::Succeeded {
                transaction_id: "tx-short".into(),
                amount_cents: 1,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::PaymentAmountMismatch {
            expected: 1250,
            reported: 1
        }
    ));
    assert_eq!(
        h.store_booking(receipt.booking.id).await.booking.status,
        BookingStatus::Pending
    );
}

#[tokio::test]
async fn confirming_an_unknown_booking_is_not_found() {
    let h = Harness::new().await;
    let id = Uuid::new_v4();
    assert!(matches!(
        h.state
            .payments
            .confirm_payment(id, PaymentOutcome::TimedOut)
            .await,
        Err(AppError::BookingNotFound(found)) if found == id
    ));
}

// =============================================================================
// HOLD EXPIRY
// =============================================================================

#[tokio::test]
async fn expired_hold_releases_seats_and_ignores_late_success() {
    let h = Harness::new().await;
    let receipt = h.book("client-1", &["A1", "A2"]).await.unwrap();
    let paid = h.book("client-2", &["C1"]).await.unwrap();
    h.pay(&paid).await;

    // Not yet
    h.clock.advance(Duration::seconds(599));
    let summary = h.state.payments.release_expired_holds().await.unwrap();
    assert!(summary.released.is_empty());

    h.clock.advance(Duration::seconds(2));
    let summary = h.state.payments.release_expired_holds().await.unwrap();
    assert_eq!(summary.released, vec![receipt.booking.id]);
    assert_eq!(h.taken_labels().await, ["C1"]);

    let released = h.store_booking(receipt.booking.id).await;
    assert_eq!(released.booking.status, BookingStatus::Cancelled);
    assert!(released
        .tickets
        .iter()
        .all(|t| t.status == TicketStatus::Released));

    let late = h
        .state
        .payments
        .confirm_payment(
            receipt.booking.id,
            PaymentOutcome::Succeeded {
                transaction_id: "tx-late".into(),
                amount_cents: receipt.booking.total_price_cents,
            },
        )
        .await
        .unwrap();
    assert!(!late.applied);
    assert_eq!(late.status, BookingStatus::Cancelled);

    // Timeouts record no payment attempt
    assert!(h
        .store
        .payments_for_booking(receipt.booking.id)
        .await
        .is_empty());

    // A second sweep has nothing left to do
    let summary = h.state.payments.release_expired_holds().await.unwrap();
    assert!(summary.released.is_empty());
}

// =============================================================================
// DOOR SCAN
// =============================================================================

#[tokio::test]
async fn paid_ticket_scans_once() {
    let h = Harness::new().await;
    let receipt = h.book("client-1", &["A1"]).await.unwrap();
    h.pay(&receipt).await;
    let ticket_id = receipt.tickets[0].ticket_id;

    let first = h.state.validator.scan(ticket_id).await.unwrap();
    assert!(first.valid);
    assert_eq!(first.reason, None);

    let second = h.state.validator.scan(ticket_id).await.unwrap();
    assert!(!second.valid);
    assert_eq!(second.reason, Some(ScanRejection::TicketAlreadyUsed));
}

#[tokio::test]
async fn unpaid_and_unknown_tickets_are_refused() {
    let h = Harness::new().await;
    let receipt = h.book("client-1", &["A1"]).await.unwrap();

    let pending = h
        .state
        .validator
        .scan(receipt.tickets[0].ticket_id)
        .await
        .unwrap();
    assert_eq!(pending.reason, Some(ScanRejection::BookingNotPaid));

    let unknown = h.state.validator.scan(Uuid::new_v4()).await.unwrap();
    assert_eq!(unknown.reason, Some(ScanRejection::TicketNotFound));
}

#[tokio::test]
async fn scans_are_accepted_until_the_show_ends() {
    let h = Harness::new().await;
    let end = h.cinema.show_times[0].end_time;
    let receipt = h.book("client-1", &["A1", "A2"]).await.unwrap();
    h.pay(&receipt).await;

    h.clock.set(end);
    let at_end = h
        .state
        .validator
        .scan(receipt.tickets[0].ticket_id)
        .await
        .unwrap();
    assert!(at_end.valid);

    h.clock.set(end + Duration::seconds(1));
    let after = h
        .state
        .validator
        .scan(receipt.tickets[1].ticket_id)
        .await
        .unwrap();
    assert_eq!(after.reason, Some(ScanRejection::TicketExpired));

    let stored = h.store_booking(receipt.booking.id).await;
    let statuses: Vec<TicketStatus> = stored.tickets.iter().map(|t| t.status).collect();
    assert_eq!(statuses, [TicketStatus::Used, TicketStatus::Paid]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_scans_admit_exactly_one() {
    let h = Arc::new(Harness::new().await);
    let receipt = h.book("client-1", &["B4"]).await.unwrap();
    h.pay(&receipt).await;
    let ticket_id = receipt.tickets[0].ticket_id;

    let scans: Vec<_> = (0..10)
        .map(|_| {
            let h = h.clone();
            tokio::spawn(async move { h.state.validator.scan(ticket_id).await })
        })
        .collect();

    let mut accepted = 0;
    for scan in scans {
        let result = scan.await.unwrap().unwrap();
        if result.valid {
            accepted += 1;
        } else {
            assert_eq!(result.reason, Some(ScanRejection::TicketAlreadyUsed));
        }
    }
    assert_eq!(accepted, 1);
}

#[tokio::test]
async fn used_ticket_no_longer_counts_as_taken() {
    let h = Harness::new().await;
    let receipt = h.book("client-1", &["A1"]).await.unwrap();
    h.pay(&receipt).await;
    h.state
        .validator
        .scan(receipt.tickets[0].ticket_id)
        .await
        .unwrap();

    assert!(h.taken_labels().await.is_empty());
}

// =============================================================================
// CLIENT HISTORY
// =============================================================================

#[tokio::test]
async fn client_tickets_carry_show_details() {
    let h = Harness::new().await;
    let receipt = h.book("client-1", &["B2", "A1"]).await.unwrap();
    h.book("client-2", &["C3"]).await.unwrap();

    let tickets = h.state.store.tickets_for_client("client-1").await.unwrap();
    let labels: Vec<&str> = tickets.iter().map(|t| t.seat_label.as_str()).collect();
    assert_eq!(labels, ["A1", "B2"]);
    assert!(tickets.iter().all(|t| {
        t.booking_id == receipt.booking.id
            && t.movie_title == h.cinema.movie.title
            && t.hall_name == h.cinema.hall.name
            && t.theatre_name == h.cinema.theatre.name
    }));

    let bookings = h.state.store.bookings_for_client("client-1").await.unwrap();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].booking.id, receipt.booking.id);
}

// -----------------------------------------------------------------------------
// helpers over the store trait
// -----------------------------------------------------------------------------

impl Harness {
    async fn store_booking(&self, id: Uuid) -> BookingReceipt {
        self.state.store.booking(id).await.unwrap().unwrap()
    }
}
