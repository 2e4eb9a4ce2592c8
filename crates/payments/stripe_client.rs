use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap};
use serde::Deserialize;
use tracing::{debug, error};

use crate::domain::{
    entities::{
        plans::PlanEntity,
        subscriptions::{SubscriptionEntity, SubscriptionItemEntity},
    },
    repositories::subscription_gateway::SubscriptionGateway,
    value_objects::{
        enums::{plan_intervals::PlanInterval, subscription_statuses::SubscriptionStatus},
        subscriptions::{SubscriptionItemsUpdate, is_valid_subscription_id},
    },
};

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

#[derive(Debug, Clone)]
pub struct StripeClientConfig {
    pub secret_key: String,
    pub api_base: String,
    pub timeout: Duration,
    /// Emit a debug trace for every request sent to Stripe.
    pub log_requests: bool,
}

impl StripeClientConfig {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
            log_requests: false,
        }
    }
}

/// Minimal Stripe client built on reqwest.
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    api_base: String,
    log_requests: bool,
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
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: String,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub items: StripeSubscriptionItems,
}

#[derive(Debug, Deserialize, Default)]
pub struct StripeSubscriptionItems {
    pub data: Vec<StripeSubscriptionItem>,
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscriptionItem {
    pub id: String,
    pub quantity: Option<u64>,
    pub current_period_end: Option<i64>,
    pub plan: StripePlan,
}

#[derive(Debug, Deserialize)]
pub struct StripePlan {
    pub id: String,
    pub nickname: Option<String>,
    pub currency: String,
    pub interval: PlanInterval,
    pub interval_count: u32,
    pub trial_period_days: Option<u32>,
}

impl StripeSubscription {
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

impl TryFrom<StripeSubscription> for SubscriptionEntity {
    type Error = anyhow::Error;

    fn try_from(value: StripeSubscription) -> Result<Self> {
        let current_period_end = value
            .period_end()
            .with_context(|| format!("subscription {} has no current period end", value.id))?;

        let items = value
            .items
            .data
            .into_iter()
            .map(|item| SubscriptionItemEntity {
                id: item.id,
                // Metered items carry no quantity.
                quantity: item.quantity.unwrap_or(1),
                plan: PlanEntity {
                    id: item.plan.id,
                    name: item.plan.nickname,
                    currency: item.plan.currency,
                    interval: item.plan.interval,
                    interval_count: item.plan.interval_count,
                    trial_period_days: item.plan.trial_period_days.unwrap_or(0),
                },
            })
            .collect();

        Ok(Self {
            id: value.id,
            customer_id: value.customer,
            status: value.status,
            current_period_end,
            items,
        })
    }
}

/// Form body for adding `update.items` to a subscription.
fn items_update_form(update: &SubscriptionItemsUpdate) -> Vec<(String, String)> {
    let mut body: Vec<(String, String)> = update
        .items
        .iter()
        .enumerate()
        .flat_map(|(idx, item)| {
            [
                (format!("items[{}][plan]", idx), item.plan_id.clone()),
                (format!("items[{}][quantity]", idx), item.quantity.to_string()),
            ]
        })
        .collect();

    body.push(("proration_date".to_string(), update.proration_date.to_string()));
    body
}

fn request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("request-id")
        .or_else(|| headers.get("stripe-request-id"))
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

/// A non-2xx Stripe response, decoded as far as the body allows.
#[derive(Debug)]
struct StripeFailure {
    status: StatusCode,
    request_id: Option<String>,
    body: String,
    details: Option<StripeErrorDetails>,
}

impl StripeFailure {
    fn from_response(status: StatusCode, request_id: Option<String>, body: &str) -> Self {
        let details = serde_json::from_str::<StripeErrorEnvelope>(body)
            .ok()
            .map(|envelope| envelope.error);
        let body = if body.is_empty() {
            "<empty response body>".to_string()
        } else {
            body.to_string()
        };

        Self {
            status,
            request_id,
            body,
            details,
        }
    }

    fn message(&self, context: &str) -> String {
        let mut message = format!(
            "Stripe API request failed: {} (status {}, request_id={:?})",
            context, self.status, self.request_id
        );
        if let Some(detail) = self.details.as_ref().and_then(|d| d.message.as_deref()) {
            message.push_str(": ");
            message.push_str(detail);
        }
        message
    }
}

impl StripeClient {
    pub fn new(config: StripeClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build Stripe HTTP client")?;

        Ok(Self {
            http,
            secret_key: config.secret_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            log_requests: config.log_requests,
        })
    }

    fn subscription_url(&self, subscription_id: &str) -> Result<String> {
        if !is_valid_subscription_id(subscription_id) {
            anyhow::bail!("invalid subscription id: {:?}", subscription_id);
        }
        Ok(format!("{}/v1/subscriptions/{}", self.api_base, subscription_id))
    }

    fn trace_request(&self, method: &str, url: &str) {
        if self.log_requests {
            debug!(%method, %url, "stripe: sending request");
        }
    }

    async fn ensure_success(
        resp: reqwest::Response,
        context: &str,
    ) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let request_id = request_id(resp.headers());

        let body = match resp.text().await {
            Ok(text) => text,
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        let failure = StripeFailure::from_response(status, request_id, &body);
        let details = failure.details.as_ref();

        error!(
            status = %status,
            stripe_request_id = ?failure.request_id,
            stripe_error_type = ?details.and_then(|d| d.type_.as_deref()),
            stripe_error_code = ?details.and_then(|d| d.code.as_deref()),
            stripe_error_param = ?details.and_then(|d| d.param.as_deref()),
            stripe_error_message = ?details.and_then(|d| d.message.as_deref()),
            response_body = %failure.body,
            context = %context,
            "stripe api request failed"
        );

        Err(anyhow::anyhow!(failure.message(context)))
    }

    pub async fn retrieve_subscription(&self, subscription_id: &str) -> Result<StripeSubscription> {
        // https://stripe.com/docs/api/subscriptions/retrieve
        let url = self.subscription_url(subscription_id)?;
        self.trace_request("GET", &url);

        let resp = self
            .http
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "retrieve subscription").await?;

        let subscription: StripeSubscription = resp.json().await?;
        Ok(subscription)
    }

    /// Adds items to a subscription, prorating from `update.proration_date`.
    pub async fn add_subscription_items(
        &self,
        subscription_id: &str,
        update: &SubscriptionItemsUpdate,
    ) -> Result<StripeSubscription> {
        // https://stripe.com/docs/api/subscriptions/update
        let url = self.subscription_url(subscription_id)?;
        self.trace_request("POST", &url);

        let resp = self
            .http
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(&items_update_form(update))
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "update subscription").await?;

        let subscription: StripeSubscription = resp.json().await?;
        Ok(subscription)
    }

    /// Cancels a subscription immediately.
    pub async fn cancel_subscription(&self, subscription_id: &str) -> Result<StripeSubscription> {
        // https://stripe.com/docs/api/subscriptions/cancel
        let url = self.subscription_url(subscription_id)?;
        self.trace_request("DELETE", &url);

        let resp = self
            .http
            .delete(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "cancel subscription").await?;

        let subscription: StripeSubscription = resp.json().await?;
        Ok(subscription)
    }
}

#[async_trait]
impl SubscriptionGateway for StripeClient {
    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<SubscriptionEntity> {
        StripeClient::retrieve_subscription(self, subscription_id)
            .await?
            .try_into()
    }

    async fn add_subscription_items(
        &self,
        subscription_id: &str,
        update: SubscriptionItemsUpdate,
    ) -> Result<SubscriptionEntity> {
        StripeClient::add_subscription_items(self, subscription_id, &update)
            .await?
            .try_into()
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<SubscriptionEntity> {
        StripeClient::cancel_subscription(self, subscription_id)
            .await?
            .try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::subscriptions::NewSubscriptionItem;
    use reqwest::header::HeaderValue;

    const SUBSCRIPTION_JSON: &str = r#"{
        "id": "sub_1",
        "object": "subscription",
        "customer": "cus_42",
        "status": "active",
        "current_period_end": 1700000000,
        "items": {
            "object": "list",
            "data": [
                {
                    "id": "si_1",
                    "quantity": 3,
                    "plan": {
                        "id": "plan_seat",
                        "nickname": "Seat",
                        "currency": "usd",
                        "interval": "month",
                        "interval_count": 1,
                        "trial_period_days": null
                    }
                }
            ]
        }
    }"#;

    #[test]
    fn converts_subscription_payload_into_entity() {
        let payload: StripeSubscription = serde_json::from_str(SUBSCRIPTION_JSON).unwrap();
        let entity = SubscriptionEntity::try_from(payload).unwrap();

        assert_eq!(entity.id, "sub_1");
        assert_eq!(entity.customer_id, "cus_42");
        assert_eq!(entity.status, SubscriptionStatus::Active);
        assert_eq!(entity.current_period_end, 1_700_000_000);
        assert_eq!(entity.items.len(), 1);

        let item = &entity.items[0];
        assert_eq!(item.quantity, 3);
        assert_eq!(item.plan.id, "plan_seat");
        assert_eq!(item.plan.name.as_deref(), Some("Seat"));
        assert_eq!(item.plan.interval, PlanInterval::Month);
        assert_eq!(item.plan.trial_period_days, 0);
    }

    #[test]
    fn period_end_falls_back_to_first_item() {
        let payload: StripeSubscription = serde_json::from_str(
            r#"{
                "id": "sub_2",
                "customer": "cus_42",
                "status": "past_due",
                "items": {
                    "data": [
                        {
                            "id": "si_9",
                            "current_period_end": 1800000000,
                            "plan": {
                                "id": "plan_metered",
                                "currency": "eur",
                                "interval": "year",
                                "interval_count": 1,
                                "trial_period_days": 14
                            }
                        }
                    ]
                }
            }"#,
        )
        .unwrap();

        let entity = SubscriptionEntity::try_from(payload).unwrap();

        assert_eq!(entity.current_period_end, 1_800_000_000);
        assert_eq!(entity.status, SubscriptionStatus::PastDue);
        assert_eq!(entity.items[0].quantity, 1);
        assert_eq!(entity.items[0].plan.trial_period_days, 14);
    }

    #[test]
    fn rejects_subscription_without_period_end() {
        let payload: StripeSubscription = serde_json::from_str(
            r#"{"id": "sub_3", "customer": "cus_1", "status": "canceled"}"#,
        )
        .unwrap();

        let err = SubscriptionEntity::try_from(payload).unwrap_err();
        assert!(err.to_string().contains("sub_3"));
    }

    #[test]
    fn items_update_form_indexes_every_item() {
        let update = SubscriptionItemsUpdate {
            items: vec![
                NewSubscriptionItem {
                    plan_id: "plan_seat".to_string(),
                    quantity: 2,
                },
                NewSubscriptionItem {
                    plan_id: "plan_storage".to_string(),
                    quantity: 1,
                },
            ],
            proration_date: 1_700_000_000,
        };

        let form = items_update_form(&update);

        assert_eq!(
            form,
            vec![
                ("items[0][plan]".to_string(), "plan_seat".to_string()),
                ("items[0][quantity]".to_string(), "2".to_string()),
                ("items[1][plan]".to_string(), "plan_storage".to_string()),
                ("items[1][quantity]".to_string(), "1".to_string()),
                ("proration_date".to_string(), "1700000000".to_string()),
            ]
        );
    }

    #[test]
    fn trims_trailing_slash_from_api_base() {
        let mut config = StripeClientConfig::new("sk_test_123");
        config.api_base = "http://localhost:12111/".to_string();

        let client = StripeClient::new(config).unwrap();

        assert_eq!(
            client.subscription_url("sub_1").unwrap(),
            "http://localhost:12111/v1/subscriptions/sub_1"
        );
    }

    #[test]
    fn refuses_ids_that_would_escape_the_subscription_path() {
        let client = StripeClient::new(StripeClientConfig::new("sk_test_123")).unwrap();

        for id in ["sub_x/../../customers/cus_1", "sub_x?expand=customer", "", "sub x"] {
            let err = client.subscription_url(id).unwrap_err();
            assert!(err.to_string().contains("invalid subscription id"), "{id}");
        }
    }

    const ERROR_JSON: &str = r#"{
        "error": {
            "code": "resource_missing",
            "doc_url": "https://stripe.com/docs/error-codes/resource-missing",
            "message": "No such subscription: 'sub_missing'",
            "param": "id",
            "request_log_url": "https://dashboard.stripe.com/test/logs/req_abc",
            "type": "invalid_request_error"
        }
    }"#;

    #[test]
    fn decodes_stripe_error_envelope() {
        let failure = StripeFailure::from_response(
            StatusCode::NOT_FOUND,
            Some("req_abc".to_string()),
            ERROR_JSON,
        );

        let details = failure.details.as_ref().unwrap();
        assert_eq!(details.type_.as_deref(), Some("invalid_request_error"));
        assert_eq!(details.code.as_deref(), Some("resource_missing"));
        assert_eq!(details.param.as_deref(), Some("id"));
        assert_eq!(
            failure.message("retrieve subscription"),
            "Stripe API request failed: retrieve subscription (status 404 Not Found, \
             request_id=Some(\"req_abc\")): No such subscription: 'sub_missing'"
        );
    }

    #[test]
    fn failure_message_without_envelope_omits_detail() {
        let failure = StripeFailure::from_response(
            StatusCode::BAD_GATEWAY,
            None,
            "<html>upstream error</html>",
        );

        assert!(failure.details.is_none());
        assert_eq!(failure.body, "<html>upstream error</html>");
        assert_eq!(
            failure.message("cancel subscription"),
            "Stripe API request failed: cancel subscription (status 502 Bad Gateway, request_id=None)"
        );

        let failure = StripeFailure::from_response(StatusCode::INTERNAL_SERVER_ERROR, None, "");
        assert!(failure.details.is_none());
        assert_eq!(failure.body, "<empty response body>");
    }

    #[test]
    fn request_id_falls_back_to_stripe_request_id_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_id(&headers), None);

        headers.insert("stripe-request-id", HeaderValue::from_static("req_fallback"));
        assert_eq!(request_id(&headers).as_deref(), Some("req_fallback"));

        headers.insert("request-id", HeaderValue::from_static("req_primary"));
        assert_eq!(request_id(&headers).as_deref(), Some("req_primary"));
    }
}
