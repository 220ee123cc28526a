// =============================================================================
// CINEMA BOOKING SERVICE - Library Root
// =============================================================================
// Seat reservation, payment confirmation and door-scan validation for cinema
// showtimes. The binary in main.rs only wires configuration and I/O around
// the pieces exported here.
//
// COMPONENTS:
// - coordinator:  CreateBooking (atomic multi-seat reservation)
// - availability: GetAvailability (point-in-time seat map)
// - payment:      ConfirmPayment, ReleaseExpiredHolds, hold sweeper
// - validator:    ScanTicket
// - store:        transactional BookingStore seam (postgres / in-memory)
// - catalog:      hall seat lists, optionally cached in Redis
// =============================================================================

pub mod availability;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod issuer;
pub mod metrics;
pub mod models;
pub mod payment;
pub mod store;
pub mod validator;

use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::availability::AvailabilityResolver;
use crate::catalog::SeatCatalog;
use crate::clock::Clock;
use crate::config::BookingSettings;
use crate::coordinator::ReservationCoordinator;
use crate::issuer::{FlatPricing, TicketIssuer};
use crate::payment::PaymentConfirmationHandler;
use crate::store::BookingStore;
use crate::validator::TicketValidator;

// -----------------------------------------------------------------------------
// APPLICATION STATE
// -----------------------------------------------------------------------------
// Shared by every request handler through State<Arc<AppState>>. All engine
// components point at the same store and the same clock.
pub struct AppState {
    pub store: Arc<dyn BookingStore>,
    pub catalog: Arc<SeatCatalog>,
    pub availability: AvailabilityResolver,
    pub coordinator: ReservationCoordinator,
    pub payments: Arc<PaymentConfirmationHandler>,
    pub validator: TicketValidator,

    /// None when no recorder is installed (tests)
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn BookingStore>,
        catalog: SeatCatalog,
        clock: Arc<dyn Clock>,
        settings: BookingSettings,
    ) -> Self {
        let catalog = Arc::new(catalog);
        let issuer = TicketIssuer::new(Box::new(FlatPricing), settings.hold_duration);

        Self {
            availability: AvailabilityResolver::new(store.clone(), catalog.clone()),
            coordinator: ReservationCoordinator::new(
                store.clone(),
                catalog.clone(),
                issuer,
                clock.clone(),
                settings,
            ),
            payments: Arc::new(PaymentConfirmationHandler::new(store.clone(), clock.clone())),
            validator: TicketValidator::new(store.clone(), clock),
            catalog,
            store,
            metrics_handle: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}

// -----------------------------------------------------------------------------
// ROUTES
// -----------------------------------------------------------------------------
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // ----- Health & Readiness -----
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        // ----- Bookings -----
        .route("/api/v1/bookings", post(handlers::create_booking))
        .route("/api/v1/bookings/:id", get(handlers::get_booking))
        .route("/api/v1/bookings/:id/payment", post(handlers::confirm_payment))
        .route(
            "/api/v1/showtimes/:id/availability",
            get(handlers::get_availability),
        )
        .route(
            "/api/v1/clients/:client_id/bookings",
            get(handlers::client_bookings),
        )
        .route(
            "/api/v1/clients/:client_id/tickets",
            get(handlers::client_tickets),
        )
        // ----- Door & Maintenance -----
        .route("/api/v1/tickets/:id/scan", post(handlers::scan_ticket))
        .route(
            "/api/v1/holds/release-expired",
            post(handlers::release_expired_holds),
        )
        // ----- Middleware -----
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
