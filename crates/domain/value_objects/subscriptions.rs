use serde::{Deserialize, Serialize};

use crate::domain::entities::subscriptions::SubscriptionEntity;

/// Item to be appended to an existing subscription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewSubscriptionItem {
    pub plan_id: String,
    pub quantity: u64,
}

/// Items added to a subscription in one update call, prorated from `proration_date`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriptionItemsUpdate {
    pub items: Vec<NewSubscriptionItem>,
    /// Unix timestamp (seconds).
    pub proration_date: i64,
}

impl SubscriptionItemsUpdate {
    /// Carries every line item of `source` over, prorated from the end of its current period.
    pub fn from_subscription(source: &SubscriptionEntity) -> Self {
        Self {
            items: source
                .items
                .iter()
                .map(|item| NewSubscriptionItem {
                    plan_id: item.plan.id.clone(),
                    quantity: item.quantity,
                })
                .collect(),
            proration_date: source.current_period_end,
        }
    }
}

/// Provider ids are `[A-Za-z0-9_]+`; anything else could alter the request path.
pub fn is_valid_subscription_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}
