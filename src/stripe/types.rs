use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A verified Stripe event. The `type_` field is the only part the webhook
/// registry looks at; `data.object` stays an opaque JSON value until a
/// handler decides to parse it.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub type_: String,
    pub created: Option<i64>,
    pub livemode: Option<bool>,
    pub api_version: Option<String>,
    pub request: Option<StripeEventRequest>,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StripeEventRequest {
    Id(String),
    Details {
        id: Option<String>,
        idempotency_key: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

impl StripeEvent {
    /// Extracts the `id` of the object the event wraps, when present.
    pub fn object_id(&self) -> Option<&str> {
        self.data.object.get("id").and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub created: Option<i64>,
    pub currency: Option<String>,
    pub invoice_settings: Option<StripeInvoiceSettings>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeInvoiceSettings {
    pub default_payment_method: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: Option<String>,
    pub customer: Option<String>,
    pub payment_method: Option<String>,
    pub latest_charge: Option<String>,
    pub created: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    pub id: Option<String>,
    pub customer: Option<String>,
    pub status: Option<String>,
    pub cancel_at_period_end: Option<bool>,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    pub billing_cycle_anchor: Option<i64>,
    #[serde(default)]
    pub items: StripeSubscriptionItems,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StripeSubscriptionItems {
    pub data: Vec<StripeSubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscriptionItem {
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
}

impl StripeSubscription {
    /// Returns the subscription period start timestamp, falling back to the first item
    /// or the billing cycle anchor when the top-level field is absent.
    pub fn period_start(&self) -> Option<i64> {
        self.current_period_start
            .or_else(|| {
                self.items
                    .data
                    .first()
                    .and_then(|item| item.current_period_start)
            })
            .or(self.billing_cycle_anchor)
    }

    /// Returns the subscription period end timestamp, falling back to the first item when needed.
    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end.or_else(|| {
            self.items
                .data
                .first()
                .and_then(|item| item.current_period_end)
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: Option<String>,
    pub url: Option<String>,
    pub mode: Option<String>,
    pub subscription: Option<String>,
    pub customer: Option<String>,
    pub payment_intent: Option<String>,
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeConnectedAccount {
    pub id: String,
    pub email: Option<String>,
    pub country: Option<String>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub charges_enabled: Option<bool>,
    pub payouts_enabled: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeRefund {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: Option<String>,
    pub payment_intent: Option<String>,
    pub reason: Option<String>,
    pub created: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePaymentMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub card: Option<StripeCard>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCard {
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<u32>,
    pub exp_year: Option<u32>,
}

/// Envelope for Stripe `list` responses.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeList<T> {
    pub data: Vec<T>,
    pub has_more: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateCustomerRequest {
    pub email: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatePaymentIntentRequest {
    pub amount_minor: i64,
    pub currency: String,
    pub customer: Option<String>,
    pub payment_method: Option<String>,
    pub confirm: bool,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateSubscriptionRequest {
    pub customer: String,
    pub price: String,
    pub quantity: u32,
    pub trial_period_days: Option<u32>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateCheckoutSessionRequest {
    pub price: String,
    /// `payment` or `subscription`.
    pub mode: String,
    pub customer: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateConnectedAccountRequest {
    pub email: Option<String>,
    pub country: Option<String>,
    /// `standard`, `express` or `custom`.
    pub account_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateRefundRequest {
    pub payment_intent: String,
    /// Partial refund amount in minor units; `None` refunds the full charge.
    pub amount_minor: Option<i64>,
    pub reason: Option<String>,
}
