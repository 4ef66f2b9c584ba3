use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use boxoffice_core::CoreError;
use boxoffice_shared::{Reservation, ReservationId, TicketId, UserId};
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    pub user_id: UserId,
    pub ticket_id: TicketId,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/reserve", post(reserve))
        .route("/reservations/{id}", get(get_reservation))
        .route("/reservations/{id}/confirm", post(confirm))
        .route("/reservations/{id}/cancel", post(cancel))
}

/// POST /reserve
/// 409 when the ticket is missing, already held, or lost to a concurrent buyer.
async fn reserve(
    State(state): State<AppState>,
    Json(req): Json<ReserveRequest>,
) -> Result<(StatusCode, Json<Reservation>), AppError> {
    let reservation = state
        .reservations
        .reserve_ticket(None, req.user_id, req.ticket_id)
        .await?
        .ok_or(AppError::TicketUnavailable(req.ticket_id))?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

/// POST /reservations/{id}/confirm
async fn confirm(
    State(state): State<AppState>,
    Path(id): Path<ReservationId>,
) -> Result<Json<Reservation>, AppError> {
    let reservation = state
        .reservations
        .confirm_reservation(None, id)
        .await?
        .ok_or_else(|| CoreError::not_found("reservation", id))?;
    Ok(Json(reservation))
}

/// POST /reservations/{id}/cancel
async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<ReservationId>,
) -> Result<Json<Reservation>, AppError> {
    let reservation = state
        .reservations
        .cancel_reservation(None, id)
        .await?
        .ok_or_else(|| CoreError::not_found("reservation", id))?;
    Ok(Json(reservation))
}

/// GET /reservations/{id}
async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<ReservationId>,
) -> Result<Json<Reservation>, AppError> {
    let reservation = state
        .reservations
        .get_reservation(None, id)
        .await?
        .ok_or_else(|| CoreError::not_found("reservation", id))?;
    Ok(Json(reservation))
}
