use axum::{
    Json,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::usecases::webhook_ingest::WebhookError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            // Don't leak handler internals to the webhook sender.
            WebhookError::Dispatch(err) => {
                error!(
                    status = status.as_u16(),
                    error = %format!("{err:#}"),
                    "stripe_webhook: handler dispatch failed"
                );
                "webhook handler execution failed".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(ErrorResponse {
            code: status.as_u16(),
            message,
        });

        (status, body).into_response()
    }
}
