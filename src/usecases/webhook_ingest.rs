use std::sync::Arc;

use anyhow::Result as AnyResult;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::stripe::client::StripeClient;
use crate::stripe::types::StripeEvent;
use crate::webhook::WebhookHandlerRegistry;

/// Verification seam between the webhook endpoint and the Stripe client, so
/// ingest logic is testable without real webhook secrets.
#[cfg_attr(test, mockall::automock)]
pub trait EventVerifier: Send + Sync {
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> AnyResult<StripeEvent>;
}

impl EventVerifier for StripeClient {
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> AnyResult<StripeEvent> {
        self.verify_webhook_signature(payload, signature)
    }
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing stripe-signature header")]
    MissingSignature,
    #[error("invalid webhook payload: {0}")]
    InvalidSignature(String),
    #[error(transparent)]
    Dispatch(#[from] anyhow::Error),
}

impl WebhookError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            WebhookError::MissingSignature => StatusCode::BAD_REQUEST,
            WebhookError::InvalidSignature(_) => StatusCode::BAD_REQUEST,
            WebhookError::Dispatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Outcome of a successfully received webhook. `processed` is `false` when
/// no handler is registered for the event type, which is acknowledged but
/// not an error.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookReceipt {
    pub processed: bool,
    pub event_type: String,
    pub event_id: Option<String>,
}

/// Verifies inbound webhook payloads and fans the resulting event out
/// through the handler registry.
pub struct WebhookIngestUseCase<V>
where
    V: EventVerifier + Send + Sync + 'static,
{
    verifier: Arc<V>,
    registry: Arc<WebhookHandlerRegistry>,
}

impl<V> WebhookIngestUseCase<V>
where
    V: EventVerifier + Send + Sync + 'static,
{
    pub fn new(verifier: Arc<V>, registry: Arc<WebhookHandlerRegistry>) -> Self {
        Self { verifier, registry }
    }

    pub async fn ingest(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookReceipt, WebhookError> {
        let event = self
            .verifier
            .verify_webhook_signature(payload, signature)
            .map_err(|err| {
                warn!(
                    error = %err,
                    "webhook_ingest: stripe webhook verification failed"
                );
                WebhookError::InvalidSignature("signature verification failed".into())
            })?;

        info!(
            event_type = %event.type_,
            event_id = ?event.id,
            livemode = ?event.livemode,
            "webhook_ingest: stripe webhook verified"
        );

        let event = Arc::new(event);
        let processed = self.registry.dispatch(&event).await?;

        Ok(WebhookReceipt {
            processed,
            event_type: event.type_.clone(),
            event_id: event.id.clone(),
        })
    }
}
