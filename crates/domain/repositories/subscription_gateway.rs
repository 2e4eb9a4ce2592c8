use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::{
    entities::subscriptions::SubscriptionEntity,
    value_objects::subscriptions::SubscriptionItemsUpdate,
};

/// Remote billing service holding the subscriptions.
#[automock]
#[async_trait]
pub trait SubscriptionGateway {
    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<SubscriptionEntity>;

    async fn add_subscription_items(
        &self,
        subscription_id: &str,
        update: SubscriptionItemsUpdate,
    ) -> Result<SubscriptionEntity>;

    /// Cancels immediately.
    async fn cancel_subscription(&self, subscription_id: &str) -> Result<SubscriptionEntity>;
}
