use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use boxoffice_core::CoreError;
use boxoffice_shared::TicketId;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("ticket {0} is not available")]
    TicketUnavailable(TicketId),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Core(CoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            AppError::Core(CoreError::Validation(_)) => StatusCode::BAD_REQUEST,
            AppError::Core(
                CoreError::Conflict(_)
                | CoreError::InvalidTransition { .. }
                | CoreError::Constraint(_),
            ) => StatusCode::CONFLICT,
            AppError::TicketUnavailable(_) => StatusCode::CONFLICT,
            AppError::Core(CoreError::TransactionFailure(_)) | AppError::Anyhow(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Internal Server Error: {}", self);
            "Internal Server Error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
