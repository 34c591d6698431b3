use std::sync::Arc;

use anyhow::Result;
use stripe_bridge::axum_http::http_serve;
use stripe_bridge::config::config_loader;
use stripe_bridge::observability;
use stripe_bridge::stripe::client::StripeClient;
use stripe_bridge::usecases::subscription_sync::SubscriptionSyncUseCase;
use stripe_bridge::usecases::webhook_ingest::WebhookIngestUseCase;
use stripe_bridge::webhook::{WebhookHandlerRegistry, WebhookHandlerSource};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        error!("Server exited with error: {}", error);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    observability::init_observability("stripe-bridge")?;

    let config = config_loader::load()?;
    info!("ENV has been loaded");

    let stripe_client = Arc::new(StripeClient::new(
        config.stripe.secret_key.clone(),
        config.stripe.webhook_secret.clone(),
    ));

    // Every handler-owning component goes into the scan pass; the registry is
    // complete before the server starts accepting webhooks.
    let subscription_sync = Arc::new(SubscriptionSyncUseCase::new(Arc::clone(&stripe_client)));
    let sources: Vec<Arc<dyn WebhookHandlerSource>> = vec![subscription_sync];

    let mut registry = WebhookHandlerRegistry::new();
    registry.scan(&sources);
    info!(
        handlers = registry.handler_count(),
        event_types = ?registry.registered_event_types(),
        "Webhook handler registry has been built"
    );

    let webhook_ingest = Arc::new(WebhookIngestUseCase::new(
        Arc::clone(&stripe_client),
        Arc::new(registry),
    ));

    http_serve::start(Arc::new(config), webhook_ingest).await?;

    Ok(())
}
