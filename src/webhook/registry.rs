//! Webhook handler registry: collects event handlers from the application's
//! components once at startup, then fans verified Stripe events out to every
//! matching handler concurrently.
//!
//! Components declare their handlers by implementing [`WebhookHandlerSource`]
//! and returning one [`HandlerBinding`] per handler, each bound to a single
//! event-type name (`"customer.subscription.updated"` and the like). The
//! registry never inspects the event payload; only the event-type name
//! drives dispatch.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use futures_util::future::join_all;
use tracing::{debug, error};

use crate::stripe::types::StripeEvent;

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;

type HandlerFn = Arc<dyn Fn(Arc<StripeEvent>) -> HandlerFuture + Send + Sync>;

/// One handler offered up by a component during the scan pass: a method name
/// (for logs), the event-type name it subscribes to, and the bound callable.
pub struct HandlerBinding {
    method: String,
    event_type: String,
    handler: HandlerFn,
}

impl HandlerBinding {
    pub fn new<F, Fut>(
        method: impl Into<String>,
        event_type: impl Into<String>,
        handler: F,
    ) -> Self
    where
        F: Fn(Arc<StripeEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            method: method.into(),
            event_type: event_type.into(),
            handler: Arc::new(move |event| Box::pin(handler(event)) as HandlerFuture),
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }
}

/// A component that owns webhook handlers. Bindings usually close over
/// `Arc<Self>` so the handler can call back into the component.
pub trait WebhookHandlerSource: Send + Sync {
    /// Component name used in handler logs.
    fn component_name(&self) -> &'static str;

    fn handler_bindings(&self) -> Vec<HandlerBinding>;
}

struct HandlerRegistration {
    owner: &'static str,
    method: String,
    event_type: String,
    handler: HandlerFn,
}

/// Event-type name → handlers, built once by [`WebhookHandlerRegistry::scan`]
/// and read-only afterwards. Scan before sharing the registry; dispatch
/// never mutates it, so lookups need no locking.
#[derive(Default)]
pub struct WebhookHandlerRegistry {
    index: HashMap<String, Vec<HandlerRegistration>>,
}

impl WebhookHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects handler bindings from every source into the index. Bindings
    /// with a blank event-type name are not handlers; they are skipped
    /// without failing the rest of the scan. No handler is invoked here.
    pub fn scan(&mut self, sources: &[Arc<dyn WebhookHandlerSource>]) {
        for source in sources {
            let owner = source.component_name();
            for binding in source.handler_bindings() {
                if binding.event_type.trim().is_empty() {
                    debug!(
                        owner = %owner,
                        method = %binding.method,
                        "webhook_registry: skipping binding with empty event type"
                    );
                    continue;
                }

                debug!(
                    owner = %owner,
                    method = %binding.method,
                    event_type = %binding.event_type,
                    "webhook_registry: registered handler"
                );
                self.index
                    .entry(binding.event_type.clone())
                    .or_default()
                    .push(HandlerRegistration {
                        owner,
                        method: binding.method,
                        event_type: binding.event_type,
                        handler: binding.handler,
                    });
            }
        }
    }

    pub fn handler_count(&self) -> usize {
        self.index.values().map(Vec::len).sum()
    }

    pub fn registered_event_types(&self) -> Vec<&str> {
        self.index.keys().map(String::as_str).collect()
    }

    /// Dispatches a verified event to every handler registered for its type.
    ///
    /// Returns `Ok(false)` when no handler is registered for the event type
    /// (an unhandled type, not an error) and `Ok(true)` when at least one
    /// handler ran and all succeeded. All matching handlers are invoked
    /// concurrently and always run to completion; if any fail, the error
    /// returned after the join names every failing handler.
    pub async fn dispatch(&self, event: &Arc<StripeEvent>) -> Result<bool> {
        let Some(registrations) = self.index.get(&event.type_) else {
            debug!(
                event_type = %event.type_,
                event_id = ?event.id,
                "webhook_registry: no handlers registered for event type"
            );
            return Ok(false);
        };

        let invocations = registrations.iter().map(|registration| {
            let event = Arc::clone(event);
            async move {
                debug!(
                    owner = %registration.owner,
                    method = %registration.method,
                    event_type = %registration.event_type,
                    event_id = ?event.id,
                    "webhook_registry: invoking handler"
                );
                (registration.handler)(event).await.map_err(|err| {
                    error!(
                        owner = %registration.owner,
                        method = %registration.method,
                        event_type = %registration.event_type,
                        error = %format!("{err:#}"),
                        "webhook_registry: handler failed"
                    );
                    format!("{}::{}: {err:#}", registration.owner, registration.method)
                })
            }
        });

        let results = join_all(invocations).await;
        let total = results.len();
        let failures: Vec<String> = results.into_iter().filter_map(Result::err).collect();

        if failures.is_empty() {
            return Ok(true);
        }
        anyhow::bail!(
            "{} of {} handlers failed for event type {}: [{}]",
            failures.len(),
            total,
            event.type_,
            failures.join("; ")
        );
    }
}
