//! HTTP surface: status codes and JSON bodies through the full router.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use cinema_booking::catalog::SeatCatalog;
use cinema_booking::clock::SystemClock;
use cinema_booking::config::BookingSettings;
use cinema_booking::store::seed::SampleCinema;
use cinema_booking::store::InMemoryBookingStore;
use cinema_booking::{router, AppState};

async fn app() -> (Router, SampleCinema) {
    let store = Arc::new(InMemoryBookingStore::new());
    let cinema = store.seed_sample_data(Utc::now()).await.unwrap();
    let state = AppState::new(
        store.clone(),
        SeatCatalog::new(store),
        Arc::new(SystemClock),
        BookingSettings::default(),
    );
    (router(Arc::new(state)), cinema)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, client: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::post(uri).header("content-type", "application/json");
    if let Some(client) = client {
        builder = builder.header("x-client-id", client);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn booking_body(cinema: &SampleCinema, labels: &[&str]) -> Value {
    let seat_ids: Vec<_> = labels
        .iter()
        .map(|l| cinema.seats.iter().find(|s| s.label == *l).unwrap().id)
        .collect();
    json!({
        "show_time_id": cinema.show_times[0].id,
        "seat_ids": seat_ids,
        "payment_method": "credit_card"
    })
}

#[tokio::test]
async fn health_reports_service_name() {
    let (app, _) = app().await;
    let (status, body) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "cinema-booking-service");

    let (status, body) = send(&app, Request::get("/ready").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["store"], true);
}

#[tokio::test]
async fn booking_requires_a_client_id() {
    let (app, cinema) = app().await;
    let (status, body) = send(
        &app,
        post_json("/api/v1/bookings", None, booking_body(&cinema, &["A1"])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_REQUEST");
}

#[tokio::test]
async fn booking_flow_over_http() {
    let (app, cinema) = app().await;

    let (status, booking) = send(
        &app,
        post_json(
            "/api/v1/bookings",
            Some("client-1"),
            booking_body(&cinema, &["A1", "A2"]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking["status"], "pending");
    assert_eq!(booking["tickets"].as_array().unwrap().len(), 2);

    // Overlap is a 409 naming the seat
    let (status, conflict) = send(
        &app,
        post_json(
            "/api/v1/bookings",
            Some("client-2"),
            booking_body(&cinema, &["A2", "A3"]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["error"], "SEAT_UNAVAILABLE");
    assert_eq!(conflict["details"]["labels"], json!(["A2"]));

    // Pay
    let booking_id = booking["id"].as_str().unwrap();
    let (status, confirmation) = send(
        &app,
        post_json(
            &format!("/api/v1/bookings/{booking_id}/payment"),
            None,
            json!({
                "outcome": "succeeded",
                "transaction_id": "tx-1",
                "amount_cents": booking["total_price_cents"]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmation["status"], "paid");
    assert_eq!(confirmation["applied"], true);

    // Scan twice
    let ticket_id = booking["tickets"][0]["ticket_id"].as_str().unwrap();
    let scan_uri = format!("/api/v1/tickets/{ticket_id}/scan");
    let (_, first) = send(&app, post_json(&scan_uri, None, json!({}))).await;
    assert_eq!(first["valid"], true);
    let (status, second) = send(&app, post_json(&scan_uri, None, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["valid"], false);
    assert_eq!(second["reason"], "TICKET_ALREADY_USED");

    // History
    let (status, tickets) = send(
        &app,
        Request::get("/api/v1/clients/client-1/tickets")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tickets.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn availability_lists_the_whole_hall() {
    let (app, cinema) = app().await;
    let uri = format!("/api/v1/showtimes/{}/availability", cinema.show_times[0].id);
    let (status, seats) = send(&app, Request::get(&uri).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(seats.as_array().unwrap().len(), 40);
    assert_eq!(seats[0]["label"], "A1");
    assert_eq!(seats[0]["is_taken"], false);

    let missing = format!("/api/v1/showtimes/{}/availability", uuid::Uuid::new_v4());
    let (status, body) = send(&app, Request::get(&missing).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "SHOW_TIME_NOT_FOUND");
}
