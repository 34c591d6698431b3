use anyhow::Result;
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use sha2::Sha256;
use tracing::error;

use crate::stripe::types::{
    CreateCheckoutSessionRequest, CreateConnectedAccountRequest, CreateCustomerRequest,
    CreatePaymentIntentRequest, CreateRefundRequest, CreateSubscriptionRequest,
    StripeCheckoutSession, StripeConnectedAccount, StripeCustomer, StripeEvent, StripeList,
    StripePaymentIntent, StripePaymentMethod, StripeRefund, StripeSubscription,
};

type HmacSha256 = Hmac<Sha256>;

const API_BASE: &str = "https://api.stripe.com/v1";

/// Minimal Stripe client built on reqwest. One instance is constructed at
/// startup and shared behind an `Arc`.
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    webhook_secret: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    #[serde(rename = "type")]
    type_: Option<String>,
    code: Option<String>,
    message: Option<String>,
    param: Option<String>,
    decline_code: Option<String>,
}

impl StripeClient {
    pub fn new(secret_key: String, webhook_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key,
            webhook_secret,
        }
    }

    async fn ensure_success(resp: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let request_id = resp
            .headers()
            .get("request-id")
            .or_else(|| resp.headers().get("stripe-request-id"))
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        let details = serde_json::from_str::<StripeErrorEnvelope>(&body)
            .map(|envelope| envelope.error)
            .ok();

        error!(
            status = %status,
            stripe_request_id = ?request_id,
            stripe_error_type = ?details.as_ref().and_then(|d| d.type_.as_deref()),
            stripe_error_code = ?details.as_ref().and_then(|d| d.code.as_deref()),
            stripe_error_param = ?details.as_ref().and_then(|d| d.param.as_deref()),
            stripe_error_message = ?details.as_ref().and_then(|d| d.message.as_deref()),
            stripe_decline_code = ?details.as_ref().and_then(|d| d.decline_code.as_deref()),
            response_body = %body,
            context = %context,
            "stripe api request failed"
        );

        anyhow::bail!(
            "Stripe API request failed: {} (status {}, request_id={:?})",
            context,
            status,
            request_id
        );
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &[(String, String)],
        context: &str,
    ) -> Result<T> {
        let resp = self
            .http
            .post(format!("{API_BASE}{path}"))
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(body)
            .send()
            .await?;
        let resp = Self::ensure_success(resp, context).await?;
        Ok(resp.json().await?)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str, context: &str) -> Result<T> {
        let resp = self
            .http
            .get(format!("{API_BASE}{path}"))
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .send()
            .await?;
        let resp = Self::ensure_success(resp, context).await?;
        Ok(resp.json().await?)
    }

    /// Creates a Stripe customer. https://stripe.com/docs/api/customers/create
    pub async fn create_customer(&self, req: CreateCustomerRequest) -> Result<StripeCustomer> {
        let mut body: Vec<(String, String)> = Vec::new();
        if let Some(email) = req.email {
            body.push(("email".to_string(), email));
        }
        if let Some(name) = req.name {
            body.push(("name".to_string(), name));
        }
        if let Some(description) = req.description {
            body.push(("description".to_string(), description));
        }
        for (key, value) in req.metadata {
            body.push((format!("metadata[{key}]"), value));
        }

        self.post_form("/customers", &body, "create customer").await
    }

    pub async fn retrieve_customer(&self, customer_id: &str) -> Result<StripeCustomer> {
        self.get(&format!("/customers/{customer_id}"), "retrieve customer")
            .await
    }

    /// Creates a PaymentIntent. https://stripe.com/docs/api/payment_intents/create
    pub async fn create_payment_intent(
        &self,
        req: CreatePaymentIntentRequest,
    ) -> Result<StripePaymentIntent> {
        let mut body: Vec<(String, String)> = vec![
            ("amount".to_string(), req.amount_minor.to_string()),
            ("currency".to_string(), req.currency),
        ];
        if let Some(customer) = req.customer {
            body.push(("customer".to_string(), customer));
        }
        if let Some(payment_method) = req.payment_method {
            body.push(("payment_method".to_string(), payment_method));
        }
        if req.confirm {
            body.push(("confirm".to_string(), "true".to_string()));
        }
        for (key, value) in req.metadata {
            body.push((format!("metadata[{key}]"), value));
        }

        self.post_form("/payment_intents", &body, "create payment intent")
            .await
    }

    pub async fn retrieve_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<StripePaymentIntent> {
        self.get(
            &format!("/payment_intents/{payment_intent_id}"),
            "retrieve payment intent",
        )
        .await
    }

    /// Creates a subscription. https://stripe.com/docs/api/subscriptions/create
    pub async fn create_subscription(
        &self,
        req: CreateSubscriptionRequest,
    ) -> Result<StripeSubscription> {
        let mut body: Vec<(String, String)> = vec![
            ("customer".to_string(), req.customer),
            ("items[0][price]".to_string(), req.price),
            ("items[0][quantity]".to_string(), req.quantity.to_string()),
        ];
        if let Some(trial_days) = req.trial_period_days {
            body.push(("trial_period_days".to_string(), trial_days.to_string()));
        }
        for (key, value) in req.metadata {
            body.push((format!("metadata[{key}]"), value));
        }

        self.post_form("/subscriptions", &body, "create subscription")
            .await
    }

    pub async fn retrieve_subscription(&self, subscription_id: &str) -> Result<StripeSubscription> {
        // https://stripe.com/docs/api/subscriptions/retrieve
        self.get(
            &format!("/subscriptions/{subscription_id}"),
            "retrieve subscription",
        )
        .await
    }

    /// Marks a Stripe subscription to cancel at period end.
    pub async fn cancel_subscription(&self, subscription_id: &str) -> Result<StripeSubscription> {
        // https://stripe.com/docs/api/subscriptions/cancel#cancel_subscription-at_period_end
        let body = [(
            "cancel_at_period_end".to_string(),
            "true".to_string(),
        )];
        self.post_form(
            &format!("/subscriptions/{subscription_id}"),
            &body,
            "cancel subscription",
        )
        .await
    }

    /// Creates a Checkout Session. https://stripe.com/docs/payments/checkout
    pub async fn create_checkout_session(
        &self,
        req: CreateCheckoutSessionRequest,
    ) -> Result<StripeCheckoutSession> {
        let mut body: Vec<(String, String)> = vec![
            ("mode".to_string(), req.mode),
            ("line_items[0][price]".to_string(), req.price),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), req.success_url),
            ("cancel_url".to_string(), req.cancel_url),
        ];
        if let Some(customer) = req.customer {
            body.push(("customer".to_string(), customer));
        }
        for (key, value) in req.metadata {
            body.push((format!("metadata[{key}]"), value));
        }

        self.post_form("/checkout/sessions", &body, "create checkout session")
            .await
    }

    /// Creates a connected account. Financial operations on connected
    /// accounts are out of scope here; only creation and lookup are wrapped.
    pub async fn create_connected_account(
        &self,
        req: CreateConnectedAccountRequest,
    ) -> Result<StripeConnectedAccount> {
        let mut body: Vec<(String, String)> = vec![("type".to_string(), req.account_type)];
        if let Some(email) = req.email {
            body.push(("email".to_string(), email));
        }
        if let Some(country) = req.country {
            body.push(("country".to_string(), country));
        }

        self.post_form("/accounts", &body, "create connected account")
            .await
    }

    pub async fn retrieve_connected_account(
        &self,
        account_id: &str,
    ) -> Result<StripeConnectedAccount> {
        self.get(
            &format!("/accounts/{account_id}"),
            "retrieve connected account",
        )
        .await
    }

    /// Creates a refund. https://stripe.com/docs/api/refunds/create
    pub async fn create_refund(&self, req: CreateRefundRequest) -> Result<StripeRefund> {
        let mut body: Vec<(String, String)> =
            vec![("payment_intent".to_string(), req.payment_intent)];
        if let Some(amount) = req.amount_minor {
            body.push(("amount".to_string(), amount.to_string()));
        }
        if let Some(reason) = req.reason {
            body.push(("reason".to_string(), reason));
        }

        self.post_form("/refunds", &body, "create refund").await
    }

    pub async fn list_refunds(&self, payment_intent_id: &str) -> Result<StripeList<StripeRefund>> {
        self.get(
            &format!("/refunds?payment_intent={payment_intent_id}&limit=100"),
            "list refunds",
        )
        .await
    }

    pub async fn list_payment_methods(
        &self,
        customer_id: &str,
    ) -> Result<StripeList<StripePaymentMethod>> {
        self.get(
            &format!("/customers/{customer_id}/payment_methods?type=card"),
            "list payment methods",
        )
        .await
    }

    /// Verifies the webhook signature. https://stripe.com/docs/webhooks/signatures
    pub fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent> {
        let mut timestamp: Option<String> = None;
        let mut signature: Option<String> = None;

        for part in signature_header.split(',') {
            if let Some(rest) = part.strip_prefix("t=") {
                timestamp = Some(rest.to_string());
            } else if let Some(rest) = part.strip_prefix("v1=") {
                signature = Some(rest.to_string());
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| anyhow::anyhow!("missing timestamp in stripe-signature"))?;
        let signature =
            signature.ok_or_else(|| anyhow::anyhow!("missing v1 in stripe-signature"))?;

        let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())?;
        mac.update(signed_payload.as_bytes());
        let expected = mac.finalize().into_bytes();
        let provided = hex::decode(signature)?;

        if expected[..] != provided[..] {
            anyhow::bail!("invalid webhook signature");
        }

        let event: StripeEvent = serde_json::from_slice(payload)?;
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> StripeClient {
        StripeClient::new(
            "sk_test_xxx".to_string(),
            "whsec_test123secret456".to_string(),
        )
    }

    fn sign(payload: &[u8], secret: &str, timestamp: &str) -> String {
        let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(signed_payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    const PAYLOAD: &[u8] =
        br#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"id":"cs_1"}}}"#;

    #[test]
    fn accepts_valid_signature() {
        let client = test_client();
        let signature = sign(PAYLOAD, "whsec_test123secret456", "1700000000");
        let header = format!("t=1700000000,v1={signature}");

        let event = client
            .verify_webhook_signature(PAYLOAD, &header)
            .expect("valid signature should verify");
        assert_eq!(event.type_, "checkout.session.completed");
        assert_eq!(event.object_id(), Some("cs_1"));
    }

    #[test]
    fn rejects_signature_from_wrong_secret() {
        let client = test_client();
        let signature = sign(PAYLOAD, "whsec_other", "1700000000");
        let header = format!("t=1700000000,v1={signature}");

        assert!(client.verify_webhook_signature(PAYLOAD, &header).is_err());
    }

    #[test]
    fn rejects_modified_payload() {
        let client = test_client();
        let signature = sign(PAYLOAD, "whsec_test123secret456", "1700000000");
        let header = format!("t=1700000000,v1={signature}");
        let tampered =
            br#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"id":"cs_2"}}}"#;

        assert!(client.verify_webhook_signature(tampered, &header).is_err());
    }

    #[test]
    fn rejects_header_without_timestamp() {
        let client = test_client();
        let signature = sign(PAYLOAD, "whsec_test123secret456", "1700000000");
        let header = format!("v1={signature}");

        let err = client
            .verify_webhook_signature(PAYLOAD, &header)
            .unwrap_err();
        assert!(err.to_string().contains("missing timestamp"));
    }

    #[test]
    fn rejects_header_without_v1() {
        let client = test_client();
        let err = client
            .verify_webhook_signature(PAYLOAD, "t=1700000000")
            .unwrap_err();
        assert!(err.to_string().contains("missing v1"));
    }
}
