use chrono::{DateTime, Utc};

use crate::domain::{
    entities::plans::PlanEntity,
    value_objects::enums::subscription_statuses::SubscriptionStatus,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionEntity {
    pub id: String,
    pub customer_id: String,
    pub status: SubscriptionStatus,
    /// Unix timestamp (seconds) at which the current billing period ends.
    pub current_period_end: i64,
    pub items: Vec<SubscriptionItemEntity>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionItemEntity {
    pub id: String,
    pub plan: PlanEntity,
    pub quantity: u64,
}

impl SubscriptionEntity {
    pub fn is_canceled(&self) -> bool {
        self.status.is_canceled()
    }

    /// The plan of the first line item, which defines the billing cadence of the subscription.
    pub fn primary_plan(&self) -> Option<&PlanEntity> {
        self.items.first().map(|item| &item.plan)
    }

    pub fn current_period_end_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.current_period_end, 0)
    }
}
