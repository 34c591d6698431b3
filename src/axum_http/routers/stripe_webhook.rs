use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use bytes::Bytes;
use tracing::debug;

use crate::usecases::webhook_ingest::{EventVerifier, WebhookError, WebhookIngestUseCase};

const SIGNATURE_HEADER: &str = "stripe-signature";

pub fn routes<V>(usecase: Arc<WebhookIngestUseCase<V>>) -> Router
where
    V: EventVerifier + Send + Sync + 'static,
{
    Router::new()
        .route("/stripe", post(handle_stripe_webhook::<V>))
        .with_state(usecase)
}

/// Webhook receiving endpoint. Verification happens against the raw request
/// body, so the payload is taken as `Bytes` rather than deserialized JSON.
pub async fn handle_stripe_webhook<V>(
    State(usecase): State<Arc<WebhookIngestUseCase<V>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    V: EventVerifier + Send + Sync + 'static,
{
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        return WebhookError::MissingSignature.into_response();
    };

    debug!(
        payload_len = body.len(),
        "stripe_webhook: webhook payload received"
    );

    match usecase.ingest(&body, signature).await {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(err) => err.into_response(),
    }
}
