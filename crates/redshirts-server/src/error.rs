use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use redshirts_store::StoreError;
use thiserror::Error;
use uuid::Uuid;

use crate::lobby::GatewayError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Player {player_id} is not authorized for lobby {lobby_id}")]
    Unauthorized { player_id: Uuid, lobby_id: Uuid },

    #[error("Only the lobby service may {0}")]
    SystemOnly(&'static str),

    #[error("Lobby service error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Store error while {op}: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Wrap a store failure with the operation that was in progress.
    pub fn store(op: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| ServerError::Store { op, source }
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        ServerError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ServerError {
    fn from(rejection: QueryRejection) -> Self {
        ServerError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ServerError {
    fn from(rejection: PathRejection) -> Self {
        ServerError::Validation(rejection.body_text())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::Unauthorized { .. } | ServerError::SystemOnly(_) => {
                (StatusCode::FORBIDDEN, self.to_string())
            }
            ServerError::Gateway(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Lobby service unavailable".to_string(),
            ),
            ServerError::Store { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage error".to_string())
            }
            ServerError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        if status.is_server_error() {
            tracing::warn!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
