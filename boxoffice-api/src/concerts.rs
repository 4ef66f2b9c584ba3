use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use boxoffice_core::CoreError;
use boxoffice_shared::{Concert, ConcertId, Seat, SeatId, Ticket};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateConcertRequest {
    pub name: String,
    pub event_date: DateTime<Utc>,
    pub total_seats: u32,
}

#[derive(Debug, Serialize)]
pub struct CreateConcertResponse {
    pub concert: Concert,
    pub seats_created: u32,
    pub summary: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub seat_id: SeatId,
    pub price_cents: i64,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/concerts", post(create_concert))
        .route("/concerts/{id}/seats", get(list_seats))
        .route("/concerts/{id}/tickets", get(list_tickets).post(create_ticket))
}

/// POST /concerts
/// The concert and its seats are created in one transaction.
async fn create_concert(
    State(state): State<AppState>,
    Json(req): Json<CreateConcertRequest>,
) -> Result<(StatusCode, Json<CreateConcertResponse>), AppError> {
    let mut tx = state.store.begin().await?;
    let concert = state
        .catalog
        .create_concert(Some(&mut tx), &req.name, req.event_date)
        .await?;
    let batch = state
        .catalog
        .create_seats(Some(&mut tx), concert.id, req.total_seats)
        .await?;
    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateConcertResponse {
            summary: batch.to_string(),
            seats_created: batch.created,
            concert,
        }),
    ))
}

/// GET /concerts/{id}/seats
async fn list_seats(
    State(state): State<AppState>,
    Path(concert_id): Path<ConcertId>,
) -> Result<Json<Vec<Seat>>, AppError> {
    let mut tx = state.store.begin().await?;
    if state
        .catalog
        .get_concert(Some(&mut tx), concert_id)
        .await?
        .is_none()
    {
        return Err(CoreError::not_found("concert", concert_id).into());
    }
    let seats = state.catalog.list_seats(Some(&mut tx), concert_id).await?;
    tx.commit().await?;
    Ok(Json(seats))
}

/// POST /concerts/{id}/tickets
async fn create_ticket(
    State(state): State<AppState>,
    Path(concert_id): Path<ConcertId>,
    Json(req): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<Ticket>), AppError> {
    let ticket = state
        .catalog
        .create_ticket(None, concert_id, req.seat_id, req.price_cents)
        .await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

/// GET /concerts/{id}/tickets
async fn list_tickets(
    State(state): State<AppState>,
    Path(concert_id): Path<ConcertId>,
) -> Result<Json<Vec<Ticket>>, AppError> {
    let mut tx = state.store.begin().await?;
    if state
        .catalog
        .get_concert(Some(&mut tx), concert_id)
        .await?
        .is_none()
    {
        return Err(CoreError::not_found("concert", concert_id).into());
    }
    let tickets = state.catalog.list_tickets(Some(&mut tx), concert_id).await?;
    tx.commit().await?;
    Ok(Json(tickets))
}
