use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use tracing::debug;

use crate::stripe::client::StripeClient;
use crate::stripe::money::format_minor_amount;
use crate::stripe::types::{StripeCustomer, StripeList, StripePaymentMethod, StripeRefund};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentApi: Send + Sync {
    async fn retrieve_customer(&self, customer_id: &str) -> Result<StripeCustomer>;

    async fn list_payment_methods(
        &self,
        customer_id: &str,
    ) -> Result<StripeList<StripePaymentMethod>>;

    async fn list_refunds(&self, payment_intent_id: &str) -> Result<StripeList<StripeRefund>>;
}

#[async_trait]
impl PaymentApi for StripeClient {
    async fn retrieve_customer(&self, customer_id: &str) -> Result<StripeCustomer> {
        self.retrieve_customer(customer_id).await
    }

    async fn list_payment_methods(
        &self,
        customer_id: &str,
    ) -> Result<StripeList<StripePaymentMethod>> {
        self.list_payment_methods(customer_id).await
    }

    async fn list_refunds(&self, payment_intent_id: &str) -> Result<StripeList<StripeRefund>> {
        self.list_refunds(payment_intent_id).await
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerDetails {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    /// Name, falling back to email, falling back to the customer id.
    pub display_name: String,
    pub default_payment_method: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentMethodSummary {
    pub id: String,
    pub brand: Option<String>,
    pub last4: Option<String>,
    /// `MM/YYYY`.
    pub expires: Option<String>,
    /// e.g. `"Visa •••• 4242"`.
    pub display: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundTotals {
    pub payment_intent_id: String,
    pub count: usize,
    pub total_minor: i64,
    pub currency: Option<String>,
    pub formatted_total: Option<String>,
    pub latest_refund_at: Option<DateTime<Utc>>,
}

/// Read-side helpers that enrich raw Stripe objects with derived display
/// fields for dashboards and support tooling.
pub struct BillingOverviewUseCase<P>
where
    P: PaymentApi + Send + Sync + 'static,
{
    payment_api: Arc<P>,
}

impl<P> BillingOverviewUseCase<P>
where
    P: PaymentApi + Send + Sync + 'static,
{
    pub fn new(payment_api: Arc<P>) -> Self {
        Self { payment_api }
    }

    pub async fn customer_details(&self, customer_id: &str) -> Result<CustomerDetails> {
        let customer = self.payment_api.retrieve_customer(customer_id).await?;

        let display_name = customer
            .name
            .clone()
            .or_else(|| customer.email.clone())
            .unwrap_or_else(|| customer.id.clone());

        Ok(CustomerDetails {
            display_name,
            default_payment_method: customer
                .invoice_settings
                .and_then(|settings| settings.default_payment_method),
            created_at: customer.created.and_then(ts_to_datetime),
            id: customer.id,
            email: customer.email,
            name: customer.name,
        })
    }

    pub async fn payment_method_summaries(
        &self,
        customer_id: &str,
    ) -> Result<Vec<PaymentMethodSummary>> {
        let methods = self.payment_api.list_payment_methods(customer_id).await?;
        debug!(
            customer_id = %customer_id,
            count = methods.data.len(),
            "billing_overview: listed payment methods"
        );

        Ok(methods.data.into_iter().map(summarize_payment_method).collect())
    }

    /// Aggregates all non-failed refunds recorded against a payment intent.
    pub async fn refund_totals(&self, payment_intent_id: &str) -> Result<RefundTotals> {
        let refunds = self.payment_api.list_refunds(payment_intent_id).await?;

        let counted: Vec<&StripeRefund> = refunds
            .data
            .iter()
            .filter(|refund| {
                !matches!(refund.status.as_deref(), Some("failed") | Some("canceled"))
            })
            .collect();

        let total_minor: i64 = counted.iter().map(|refund| refund.amount).sum();
        let currency = counted.first().map(|refund| refund.currency.clone());
        let formatted_total = currency
            .as_deref()
            .map(|currency| format_minor_amount(total_minor, currency));
        let latest_refund_at = counted
            .iter()
            .filter_map(|refund| refund.created)
            .max()
            .and_then(ts_to_datetime);

        Ok(RefundTotals {
            payment_intent_id: payment_intent_id.to_string(),
            count: counted.len(),
            total_minor,
            currency,
            formatted_total,
            latest_refund_at,
        })
    }
}

fn summarize_payment_method(method: StripePaymentMethod) -> PaymentMethodSummary {
    let card = method.card;
    let brand = card.as_ref().and_then(|card| card.brand.clone());
    let last4 = card.as_ref().and_then(|card| card.last4.clone());
    let expires = card.as_ref().and_then(|card| {
        Some(format!("{:02}/{}", card.exp_month?, card.exp_year?))
    });

    let display = match (&brand, &last4) {
        (Some(brand), Some(last4)) => format!("{} •••• {last4}", capitalize(brand)),
        _ => method.type_.clone().unwrap_or_else(|| "unknown".to_string()),
    };

    PaymentMethodSummary {
        id: method.id,
        brand,
        last4,
        expires,
        display,
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn ts_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    use crate::stripe::types::{StripeCard, StripeInvoiceSettings};

    fn sample_refund(id: &str, amount: i64, status: &str, created: i64) -> StripeRefund {
        StripeRefund {
            id: id.to_string(),
            amount,
            currency: "usd".to_string(),
            status: Some(status.to_string()),
            payment_intent: Some("pi_1".to_string()),
            reason: None,
            created: Some(created),
        }
    }

    #[tokio::test]
    async fn customer_details_derives_display_fields() {
        let mut payment_api = MockPaymentApi::new();
        payment_api
            .expect_retrieve_customer()
            .with(eq("cus_1"))
            .returning(|_| {
                Ok(StripeCustomer {
                    id: "cus_1".to_string(),
                    email: Some("jo@example.com".to_string()),
                    name: None,
                    description: None,
                    created: Some(1_700_000_000),
                    currency: Some("usd".to_string()),
                    invoice_settings: Some(StripeInvoiceSettings {
                        default_payment_method: Some("pm_1".to_string()),
                    }),
                    metadata: Default::default(),
                })
            });

        let usecase = BillingOverviewUseCase::new(Arc::new(payment_api));
        let details = usecase.customer_details("cus_1").await.unwrap();

        assert_eq!(details.display_name, "jo@example.com");
        assert_eq!(details.default_payment_method.as_deref(), Some("pm_1"));
        assert!(details.created_at.is_some());
    }

    #[tokio::test]
    async fn payment_method_summary_formats_card_display() {
        let mut payment_api = MockPaymentApi::new();
        payment_api
            .expect_list_payment_methods()
            .with(eq("cus_1"))
            .returning(|_| {
                Ok(StripeList {
                    data: vec![
                        StripePaymentMethod {
                            id: "pm_1".to_string(),
                            type_: Some("card".to_string()),
                            card: Some(StripeCard {
                                brand: Some("visa".to_string()),
                                last4: Some("4242".to_string()),
                                exp_month: Some(4),
                                exp_year: Some(2027),
                            }),
                        },
                        StripePaymentMethod {
                            id: "pm_2".to_string(),
                            type_: Some("sepa_debit".to_string()),
                            card: None,
                        },
                    ],
                    has_more: Some(false),
                })
            });

        let usecase = BillingOverviewUseCase::new(Arc::new(payment_api));
        let summaries = usecase.payment_method_summaries("cus_1").await.unwrap();

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].display, "Visa •••• 4242");
        assert_eq!(summaries[0].expires.as_deref(), Some("04/2027"));
        assert_eq!(summaries[1].display, "sepa_debit");
    }

    #[tokio::test]
    async fn refund_totals_sum_non_failed_refunds() {
        let mut payment_api = MockPaymentApi::new();
        payment_api
            .expect_list_refunds()
            .with(eq("pi_1"))
            .returning(|_| {
                Ok(StripeList {
                    data: vec![
                        sample_refund("re_1", 500, "succeeded", 1_700_000_000),
                        sample_refund("re_2", 250, "pending", 1_700_000_100),
                        sample_refund("re_3", 9_999, "failed", 1_700_000_200),
                    ],
                    has_more: Some(false),
                })
            });

        let usecase = BillingOverviewUseCase::new(Arc::new(payment_api));
        let totals = usecase.refund_totals("pi_1").await.unwrap();

        assert_eq!(totals.count, 2);
        assert_eq!(totals.total_minor, 750);
        assert_eq!(totals.formatted_total.as_deref(), Some("$7.50"));
        assert_eq!(
            totals.latest_refund_at.map(|t| t.timestamp()),
            Some(1_700_000_100)
        );
    }

    #[tokio::test]
    async fn refund_totals_on_empty_list() {
        let mut payment_api = MockPaymentApi::new();
        payment_api.expect_list_refunds().returning(|_| {
            Ok(StripeList {
                data: vec![],
                has_more: Some(false),
            })
        });

        let usecase = BillingOverviewUseCase::new(Arc::new(payment_api));
        let totals = usecase.refund_totals("pi_none").await.unwrap();

        assert_eq!(totals.count, 0);
        assert_eq!(totals.total_minor, 0);
        assert!(totals.currency.is_none());
        assert!(totals.formatted_total.is_none());
        assert!(totals.latest_refund_at.is_none());
    }
}
