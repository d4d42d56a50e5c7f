//! Plugin enable / disable hooks.

use crate::{errors::AppError, services::lifecycle, state::AppState};
use axum::{Json, extract::State};
use serde::Serialize;

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// `POST /hooks/activate`
pub async fn activate_hook(
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, AppError> {
    let message = lifecycle::activate(&state.config)?;
    Ok(Json(MessageResponse { message }))
}

/// `POST /hooks/deactivate`
pub async fn deactivate_hook() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: lifecycle::deactivate(),
    })
}
