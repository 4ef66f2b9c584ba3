use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use boxoffice_core::CoreError;
use boxoffice_shared::{Masked, User, UserId};
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: Masked<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/users/{id}", get(get_user))
}

/// POST /register
async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = state
        .identity
        .register_user(None, &req.username, req.email.expose())
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /users/{id}
async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<Json<User>, AppError> {
    let user = state
        .identity
        .get_user(None, id)
        .await?
        .ok_or_else(|| CoreError::not_found("user", id))?;
    Ok(Json(user))
}
