use std::io;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use crate::{actors::ledger, contract};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {message}: {cause}")]
    IO { message: String, cause: io::Error },
}

/// Error returned by request handlers.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ApiError {
    #[error(transparent)]
    Ledger(#[from] ledger::Error),
    #[error("Ledger is unavailable")]
    Unavailable,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        use contract::Error::*;

        match self {
            Self::Ledger(ledger::Error::Contract(e)) => match e {
                NotOperational => StatusCode::SERVICE_UNAVAILABLE,
                Unauthorized { .. } | UnauthorizedReporter { .. } => StatusCode::FORBIDDEN,
                FlightNotFound { .. } | RequestNotOpen { .. } => StatusCode::NOT_FOUND,
                AlreadyRegistered { .. }
                | NotAwaitingApproval { .. }
                | AlreadyFunded { .. }
                | FlightAlreadyRegistered { .. }
                | FlightAlreadyResolved { .. }
                | RequestClosed { .. }
                | NoBalance { .. }
                | InsufficientReserves { .. } => StatusCode::CONFLICT,
                InvalidFundingAmount { .. }
                | PremiumTooHigh { .. }
                | InvalidPremium
                | InvalidStatus { .. }
                | Overflow => StatusCode::UNPROCESSABLE_ENTITY,
                TransferFailed { .. } => StatusCode::BAD_GATEWAY,
            },
            Self::Ledger(ledger::Error::IO { .. } | ledger::Error::Snapshot(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {self}");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
