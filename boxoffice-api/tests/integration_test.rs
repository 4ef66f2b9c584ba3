use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use boxoffice_api::{app, AppState};
use boxoffice_core::MemoryStore;
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_app() -> Router {
    app(AppState::new(Arc::new(MemoryStore::new())))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn register(app: &Router, name: &str) -> Value {
    let (status, user) = send(
        app,
        "POST",
        "/register",
        Some(json!({ "username": name, "email": format!("{}@example.com", name) })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    user
}

/// Concert with `seats` seats and one ticket per seat.
async fn concert_with_tickets(app: &Router, seats: u32) -> (String, Vec<Value>) {
    let (status, created) = send(
        app,
        "POST",
        "/concerts",
        Some(json!({
            "name": "Live Concert",
            "event_date": "2026-12-24T19:00:00Z",
            "total_seats": seats,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let concert_id = created["concert"]["id"].as_str().unwrap().to_string();

    let (status, listed) = send(app, "GET", &format!("/concerts/{}/seats", concert_id), None).await;
    assert_eq!(status, StatusCode::OK);

    let mut tickets = Vec::new();
    for seat in listed.as_array().unwrap() {
        let (status, ticket) = send(
            app,
            "POST",
            &format!("/concerts/{}/tickets", concert_id),
            Some(json!({ "seat_id": seat["id"], "price_cents": 15_000 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        tickets.push(ticket);
    }
    (concert_id, tickets)
}

#[tokio::test]
async fn test_health() {
    let response = test_app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn test_create_concert_reports_seats() {
    let app = test_app();
    let (status, created) = send(
        &app,
        "POST",
        "/concerts",
        Some(json!({
            "name": "Orchestra Night",
            "event_date": "2026-11-01T20:00:00Z",
            "total_seats": 100,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["seats_created"], 100);
    let concert_id = created["concert"]["id"].as_str().unwrap();
    assert_eq!(
        created["summary"],
        format!("100 seats created for concert {}", concert_id)
    );

    let (_, seats) = send(&app, "GET", &format!("/concerts/{}/seats", concert_id), None).await;
    let seats = seats.as_array().unwrap();
    assert_eq!(seats.len(), 100);
    assert_eq!(seats[0]["seat_number"], "1");
    assert_eq!(seats[0]["section"], "A");
}

#[tokio::test]
async fn test_reserve_confirm_flow() {
    let app = test_app();
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;
    let (_, tickets) = concert_with_tickets(&app, 1).await;
    let ticket_id = tickets[0]["id"].as_str().unwrap();
    assert_eq!(tickets[0]["status"], "available");

    let (status, reservation) = send(
        &app,
        "POST",
        "/reserve",
        Some(json!({ "user_id": alice["id"], "ticket_id": ticket_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reservation["status"], "pending");
    let reservation_id = reservation["id"].as_str().unwrap();

    // Second buyer is turned away while the hold is live
    let (status, body) = send(
        &app,
        "POST",
        "/reserve",
        Some(json!({ "user_id": bob["id"], "ticket_id": ticket_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("not available"));

    let (_, ticket) = send(&app, "GET", &format!("/tickets/{}", ticket_id), None).await;
    assert_eq!(ticket["status"], "reserved");

    let (status, confirmed) = send(
        &app,
        "POST",
        &format!("/reservations/{}/confirm", reservation_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmed["status"], "confirmed");

    let (_, ticket) = send(&app, "GET", &format!("/tickets/{}", ticket_id), None).await;
    assert_eq!(ticket["status"], "sold");

    // Settled reservations stay settled
    let (status, _) = send(
        &app,
        "POST",
        &format!("/reservations/{}/cancel", reservation_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, fetched) = send(
        &app,
        "GET",
        &format!("/reservations/{}", reservation_id),
        None,
    )
    .await;
    assert_eq!(fetched["status"], "confirmed");
}

#[tokio::test]
async fn test_cancel_returns_ticket_to_sale() {
    let app = test_app();
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;
    let (_, tickets) = concert_with_tickets(&app, 1).await;
    let ticket_id = tickets[0]["id"].as_str().unwrap();

    let (_, reservation) = send(
        &app,
        "POST",
        "/reserve",
        Some(json!({ "user_id": alice["id"], "ticket_id": ticket_id })),
    )
    .await;
    let (status, canceled) = send(
        &app,
        "POST",
        &format!("/reservations/{}/cancel", reservation["id"].as_str().unwrap()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(canceled["status"], "canceled");

    let (status, second) = send(
        &app,
        "POST",
        "/reserve",
        Some(json!({ "user_id": bob["id"], "ticket_id": ticket_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(second["user_id"], bob["id"]);
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let app = test_app();
    let missing = uuid::Uuid::new_v4();

    for uri in [
        format!("/users/{}", missing),
        format!("/tickets/{}", missing),
        format!("/reservations/{}", missing),
        format!("/concerts/{}/seats", missing),
    ] {
        let (status, _) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "GET {}", uri);
    }

    let (status, _) = send(
        &app,
        "POST",
        &format!("/reservations/{}/confirm", missing),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Reserving a ticket that does not exist is reported as unavailable
    let alice = register(&app, "alice").await;
    let (status, _) = send(
        &app,
        "POST",
        "/reserve",
        Some(json!({ "user_id": alice["id"], "ticket_id": missing })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_input_validation() {
    let app = test_app();

    let (status, _) = send(
        &app,
        "POST",
        "/register",
        Some(json!({ "username": "carol", "email": "not-an-email" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    register(&app, "carol").await;
    let (status, _) = send(
        &app,
        "POST",
        "/register",
        Some(json!({ "username": "carol2", "email": "carol@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        "POST",
        "/concerts",
        Some(json!({
            "name": "Empty Hall",
            "event_date": "2026-11-01T20:00:00Z",
            "total_seats": 0,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/concerts",
        Some(json!({
            "name": "Endless Hall",
            "event_date": "2026-11-01T20:00:00Z",
            "total_seats": u32::MAX,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
