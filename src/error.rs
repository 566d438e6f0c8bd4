use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::order::OrderStatus;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation: {0}")]
    Validation(String),

    /// The claim race was lost or the order left the claimable window.
    /// A client error ("someone else got it first"), never a server fault.
    #[error("order is no longer available")]
    OrderUnavailable,

    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("order is already {0}")]
    AlreadyInState(OrderStatus),

    #[error("order is terminal ({0}) and can no longer change")]
    Terminal(OrderStatus),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_)
            | AppError::OrderUnavailable
            | AppError::InvalidTransition { .. }
            | AppError::AlreadyInState(_)
            | AppError::Terminal(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Current-state context lets the client resynchronize its view.
        let body = match &self {
            AppError::InvalidTransition { from, .. } => Json(json!({
                "error": self.to_string(),
                "state": from.as_str(),
            })),
            AppError::AlreadyInState(state) | AppError::Terminal(state) => Json(json!({
                "error": self.to_string(),
                "state": state.as_str(),
            })),
            _ => Json(json!({ "error": self.to_string() })),
        };

        (status, body).into_response()
    }
}
