use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::stripe::client::StripeClient;
use crate::stripe::types::{StripeCheckoutSession, StripeEvent, StripeSubscription};
use crate::webhook::{HandlerBinding, WebhookHandlerSource};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubscriptionGateway: Send + Sync {
    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<StripeSubscription>;
}

#[async_trait]
impl SubscriptionGateway for StripeClient {
    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<StripeSubscription> {
        self.retrieve_subscription(subscription_id).await
    }
}

/// Keeps a fresh view of subscription state by re-fetching the subscription
/// whenever Stripe reports a lifecycle change. Registers its handlers into
/// the webhook registry via [`WebhookHandlerSource`].
pub struct SubscriptionSyncUseCase<G>
where
    G: SubscriptionGateway + 'static,
{
    gateway: Arc<G>,
}

impl<G> SubscriptionSyncUseCase<G>
where
    G: SubscriptionGateway + 'static,
{
    pub fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }
}

async fn refresh_subscription<G>(gateway: Arc<G>, event: Arc<StripeEvent>) -> Result<()>
where
    G: SubscriptionGateway,
{
    let subscription_id = event
        .object_id()
        .context("subscription event carries no object id")?
        .to_string();

    let subscription = gateway.retrieve_subscription(&subscription_id).await?;
    info!(
        event_type = %event.type_,
        subscription_id = %subscription_id,
        status = ?subscription.status,
        cancel_at_period_end = ?subscription.cancel_at_period_end,
        period_start = ?subscription.period_start(),
        period_end = ?subscription.period_end(),
        "subscription_sync: subscription state refreshed"
    );
    Ok(())
}

async fn checkout_completed<G>(gateway: Arc<G>, event: Arc<StripeEvent>) -> Result<()>
where
    G: SubscriptionGateway,
{
    let session: StripeCheckoutSession = serde_json::from_value(event.data.object.clone())
        .context("checkout.session.completed carries no session object")?;

    let Some(subscription_id) = session.subscription else {
        debug!(
            session_id = ?session.id,
            mode = ?session.mode,
            "subscription_sync: checkout completed without subscription, nothing to refresh"
        );
        return Ok(());
    };

    let subscription = gateway.retrieve_subscription(&subscription_id).await?;
    info!(
        session_id = ?session.id,
        subscription_id = %subscription_id,
        customer = ?session.customer,
        period_end = ?subscription.period_end(),
        "subscription_sync: checkout completed, subscription loaded"
    );
    Ok(())
}

impl<G> WebhookHandlerSource for SubscriptionSyncUseCase<G>
where
    G: SubscriptionGateway + 'static,
{
    fn component_name(&self) -> &'static str {
        "subscription_sync"
    }

    fn handler_bindings(&self) -> Vec<HandlerBinding> {
        let updated_gateway = Arc::clone(&self.gateway);
        let deleted_gateway = Arc::clone(&self.gateway);
        let checkout_gateway = Arc::clone(&self.gateway);

        vec![
            HandlerBinding::new(
                "refresh_subscription",
                "customer.subscription.updated",
                move |event| refresh_subscription(Arc::clone(&updated_gateway), event),
            ),
            HandlerBinding::new(
                "refresh_subscription",
                "customer.subscription.deleted",
                move |event| refresh_subscription(Arc::clone(&deleted_gateway), event),
            ),
            HandlerBinding::new(
                "checkout_completed",
                "checkout.session.completed",
                move |event| checkout_completed(Arc::clone(&checkout_gateway), event),
            ),
        ]
    }
}
