use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use boxoffice_core::CoreError;
use boxoffice_shared::{Ticket, TicketId};

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/tickets/{id}", get(get_ticket))
}

/// GET /tickets/{id}
async fn get_ticket(
    State(state): State<AppState>,
    Path(id): Path<TicketId>,
) -> Result<Json<Ticket>, AppError> {
    let ticket = state
        .reservations
        .allocator()
        .get_ticket(None, id)
        .await?
        .ok_or_else(|| CoreError::not_found("ticket", id))?;
    Ok(Json(ticket))
}
