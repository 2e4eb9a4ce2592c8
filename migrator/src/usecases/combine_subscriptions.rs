use std::{collections::HashSet, fmt, sync::Arc};

use crates::domain::{
    entities::subscriptions::SubscriptionEntity,
    repositories::subscription_gateway::SubscriptionGateway,
    value_objects::subscriptions::{
        NewSubscriptionItem, SubscriptionItemsUpdate, is_valid_subscription_id,
    },
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const MIN_SUBSCRIPTIONS: usize = 2;
pub const MAX_SUBSCRIPTIONS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOperation {
    Retrieve,
    Update,
    Cancel,
}

impl fmt::Display for GatewayOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let operation = match self {
            GatewayOperation::Retrieve => "retrieve",
            GatewayOperation::Update => "update",
            GatewayOperation::Cancel => "cancel",
        };
        write!(f, "{}", operation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchField {
    Items,
    Customer,
    Currency,
    Interval,
    IntervalCount,
    TrialPeriod,
}

impl fmt::Display for MismatchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = match self {
            MismatchField::Items => "items",
            MismatchField::Customer => "customer",
            MismatchField::Currency => "currency",
            MismatchField::Interval => "interval",
            MismatchField::IntervalCount => "interval_count",
            MismatchField::TrialPeriod => "trial_period_days",
        };
        write!(f, "{}", field)
    }
}

/// A subscription that cannot be merged into the primary subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationMismatch {
    pub subscription_id: String,
    pub field: MismatchField,
    pub expected: String,
    pub actual: String,
}

impl ValidationMismatch {
    fn new(
        subscription: &SubscriptionEntity,
        field: MismatchField,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Self {
            subscription_id: subscription.id.clone(),
            field,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

impl fmt::Display for ValidationMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "subscription {}: {} expected {}, found {}",
            self.subscription_id, self.field, self.expected, self.actual
        )
    }
}

fn join_mismatches(mismatches: &[ValidationMismatch]) -> String {
    mismatches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("failed to {operation} subscription {subscription_id}")]
    Upstream {
        operation: GatewayOperation,
        subscription_id: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("all provided subscriptions are canceled, nothing to migrate")]
    NothingToMigrate,
    #[error(
        "subscriptions cannot be combined ({} mismatch(es)): {}",
        .0.len(),
        join_mismatches(.0)
    )]
    ValidationFailed(Vec<ValidationMismatch>),
}

impl MigrationError {
    fn upstream(operation: GatewayOperation, subscription_id: &str, source: anyhow::Error) -> Self {
        MigrationError::Upstream {
            operation,
            subscription_id: subscription_id.to_string(),
            source,
        }
    }
}

pub type MigrationResult<T> = std::result::Result<T, MigrationError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationAction {
    /// Items of `source_id` added to `primary_id`.
    AddItems {
        primary_id: String,
        source_id: String,
        items: Vec<NewSubscriptionItem>,
        proration_date: i64,
        applied: bool,
    },
    /// The primary already holds every merged item.
    SkipUpdate { primary_id: String },
    Cancel {
        subscription_id: String,
        applied: bool,
    },
}

impl MigrationAction {
    pub fn is_applied(&self) -> bool {
        match self {
            MigrationAction::AddItems { applied, .. } | MigrationAction::Cancel { applied, .. } => {
                *applied
            }
            MigrationAction::SkipUpdate { .. } => false,
        }
    }

    /// The same action with its outcome cleared.
    #[cfg(test)]
    pub fn as_planned(&self) -> Self {
        let mut action = self.clone();
        match &mut action {
            MigrationAction::AddItems { applied, .. } | MigrationAction::Cancel { applied, .. } => {
                *applied = false
            }
            MigrationAction::SkipUpdate { .. } => {}
        }
        action
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub apply: bool,
    /// Inputs that were already canceled.
    pub ignored: Vec<String>,
    pub primary: Option<String>,
    pub actions: Vec<MigrationAction>,
}

impl MigrationReport {
    fn new(apply: bool) -> Self {
        Self {
            apply,
            ignored: Vec::new(),
            primary: None,
            actions: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn planned_actions(&self) -> Vec<MigrationAction> {
        self.actions.iter().map(MigrationAction::as_planned).collect()
    }

    pub fn update_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|action| matches!(action, MigrationAction::AddItems { .. }))
            .count()
    }

    pub fn cancel_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|action| matches!(action, MigrationAction::Cancel { .. }))
            .count()
    }

    /// Calls actually issued against the billing service.
    pub fn applied_count(&self) -> usize {
        self.actions.iter().filter(|action| action.is_applied()).count()
    }
}

/// Merges several subscriptions of one customer into the one with the latest period end.
pub struct CombineSubscriptionsUseCase<G>
where
    G: SubscriptionGateway + Send + Sync + 'static,
{
    gateway: Arc<G>,
}

impl<G> CombineSubscriptionsUseCase<G>
where
    G: SubscriptionGateway + Send + Sync + 'static,
{
    pub fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }

    /// Without `apply` every read and check still runs but nothing is changed.
    pub async fn combine(&self, ids: &[String], apply: bool) -> MigrationResult<MigrationReport> {
        validate_ids(ids)?;

        if apply {
            info!(
                subscription_count = ids.len(),
                "combine: running in real mode; subscriptions will be changed"
            );
        } else {
            info!(
                subscription_count = ids.len(),
                "combine: running in dry-run mode; no changes will be made"
            );
        }

        let subscriptions = self.fetch_subscriptions(ids).await?;
        let mut report = MigrationReport::new(apply);

        let (canceled, active): (Vec<_>, Vec<_>) = subscriptions
            .into_iter()
            .partition(SubscriptionEntity::is_canceled);

        for subscription in &canceled {
            info!(
                subscription_id = %subscription.id,
                "combine: subscription is canceled, ignoring"
            );
            report.ignored.push(subscription.id.clone());
        }

        let Some((primary, secondaries)) = select_primary(active) else {
            warn!("combine: all provided subscriptions are canceled");
            return Err(MigrationError::NothingToMigrate);
        };
        report.primary = Some(primary.id.clone());

        if secondaries.is_empty() {
            info!(
                subscription_id = %primary.id,
                "combine: only one subscription is active, migration complete"
            );
            return Ok(report);
        }

        info!(
            primary_id = %primary.id,
            period_end = ?primary.current_period_end_at(),
            secondary_count = secondaries.len(),
            "combine: using subscription as the primary subscription"
        );

        let mismatches = cross_validate(&primary, &secondaries);
        if !mismatches.is_empty() {
            for mismatch in &mismatches {
                error!(
                    subscription_id = %mismatch.subscription_id,
                    field = %mismatch.field,
                    expected = %mismatch.expected,
                    actual = %mismatch.actual,
                    "combine: subscription does not match the primary subscription"
                );
            }
            return Err(MigrationError::ValidationFailed(mismatches));
        }

        self.merge_items(&primary, &secondaries, &mut report).await?;
        self.cancel_secondaries(&secondaries, &mut report).await?;

        info!(
            primary_id = %primary.id,
            updates = report.update_count(),
            cancellations = report.cancel_count(),
            applied = apply,
            "combine: migration complete"
        );

        Ok(report)
    }

    async fn fetch_subscriptions(&self, ids: &[String]) -> MigrationResult<Vec<SubscriptionEntity>> {
        let mut subscriptions = Vec::with_capacity(ids.len());

        for id in ids {
            let subscription = self
                .gateway
                .retrieve_subscription(id)
                .await
                .map_err(|err| {
                    error!(
                        subscription_id = %id,
                        error = ?err,
                        "combine: failed to retrieve subscription"
                    );
                    MigrationError::upstream(GatewayOperation::Retrieve, id, err)
                })?;

            debug!(
                subscription_id = %subscription.id,
                customer_id = %subscription.customer_id,
                status = %subscription.status,
                item_count = subscription.items.len(),
                "combine: subscription fetched"
            );
            subscriptions.push(subscription);
        }

        Ok(subscriptions)
    }

    async fn merge_items(
        &self,
        primary: &SubscriptionEntity,
        secondaries: &[SubscriptionEntity],
        report: &mut MigrationReport,
    ) -> MigrationResult<()> {
        let updates: Vec<(&SubscriptionEntity, SubscriptionItemsUpdate)> = secondaries
            .iter()
            .map(|secondary| (secondary, SubscriptionItemsUpdate::from_subscription(secondary)))
            .collect();

        info!(
            primary_id = %primary.id,
            "combine: adding the following items to the primary subscription"
        );
        for (secondary, update) in &updates {
            for item in &update.items {
                info!(
                    source_id = %secondary.id,
                    plan_id = %item.plan_id,
                    quantity = item.quantity,
                    "combine: - item"
                );
            }
        }

        let expected_item_count =
            1 + secondaries.iter().map(|s| s.items.len()).sum::<usize>();
        if primary.items.len() == expected_item_count {
            info!(
                primary_id = %primary.id,
                item_count = primary.items.len(),
                "combine: primary subscription has already been updated with the correct number of items"
            );
            report.actions.push(MigrationAction::SkipUpdate {
                primary_id: primary.id.clone(),
            });
            return Ok(());
        }

        for (secondary, update) in updates {
            let proration_date = format_timestamp(update.proration_date);

            if report.apply {
                info!(
                    primary_id = %primary.id,
                    source_id = %secondary.id,
                    %proration_date,
                    "combine: adding items to the primary subscription"
                );
                self.gateway
                    .add_subscription_items(&primary.id, update.clone())
                    .await
                    .map_err(|err| {
                        error!(
                            primary_id = %primary.id,
                            source_id = %secondary.id,
                            error = ?err,
                            "combine: failed to update the primary subscription"
                        );
                        MigrationError::upstream(
                            GatewayOperation::Update,
                            &primary.id,
                            err.context(format!(
                                "while adding items from subscription {}",
                                secondary.id
                            )),
                        )
                    })?;
            } else {
                info!(
                    primary_id = %primary.id,
                    source_id = %secondary.id,
                    %proration_date,
                    "combine: dry-run, would add items to the primary subscription"
                );
            }

            report.actions.push(MigrationAction::AddItems {
                primary_id: primary.id.clone(),
                source_id: secondary.id.clone(),
                items: update.items,
                proration_date: update.proration_date,
                applied: report.apply,
            });
        }

        Ok(())
    }

    async fn cancel_secondaries(
        &self,
        secondaries: &[SubscriptionEntity],
        report: &mut MigrationReport,
    ) -> MigrationResult<()> {
        for secondary in secondaries {
            if report.apply {
                info!(subscription_id = %secondary.id, "combine: canceling subscription");
                self.gateway
                    .cancel_subscription(&secondary.id)
                    .await
                    .map_err(|err| {
                        error!(
                            subscription_id = %secondary.id,
                            error = ?err,
                            "combine: failed to cancel subscription"
                        );
                        MigrationError::upstream(GatewayOperation::Cancel, &secondary.id, err)
                    })?;
            } else {
                info!(
                    subscription_id = %secondary.id,
                    "combine: dry-run, would cancel subscription"
                );
            }

            report.actions.push(MigrationAction::Cancel {
                subscription_id: secondary.id.clone(),
                applied: report.apply,
            });
        }

        Ok(())
    }
}

fn validate_ids(ids: &[String]) -> MigrationResult<()> {
    if ids.len() < MIN_SUBSCRIPTIONS {
        return Err(MigrationError::InvalidArgument(format!(
            "need at least {} subscription IDs, got {}",
            MIN_SUBSCRIPTIONS,
            ids.len()
        )));
    }

    if ids.len() > MAX_SUBSCRIPTIONS {
        return Err(MigrationError::InvalidArgument(format!(
            "a maximum of {} subscriptions can be combined, got {}",
            MAX_SUBSCRIPTIONS,
            ids.len()
        )));
    }

    let mut seen = HashSet::new();
    for id in ids {
        if id.trim().is_empty() {
            return Err(MigrationError::InvalidArgument(
                "subscription IDs must not be blank".to_string(),
            ));
        }
        if !is_valid_subscription_id(id) {
            return Err(MigrationError::InvalidArgument(format!(
                "subscription ID {:?} may only contain letters, digits and underscores",
                id
            )));
        }
        if !seen.insert(id.as_str()) {
            return Err(MigrationError::InvalidArgument(format!(
                "subscription {} was given more than once",
                id
            )));
        }
    }

    Ok(())
}

/// Splits off the subscription with the latest period end. Ties go to the first one fetched;
/// the rest stay in ascending period-end order.
fn select_primary(
    mut active: Vec<SubscriptionEntity>,
) -> Option<(SubscriptionEntity, Vec<SubscriptionEntity>)> {
    // Stable, so fetch order survives among equal period ends.
    active.sort_by_key(|subscription| subscription.current_period_end);

    let latest = active.last()?.current_period_end;
    let index = active
        .iter()
        .position(|subscription| subscription.current_period_end == latest)?;
    let primary = active.remove(index);

    Some((primary, active))
}

/// Checks every subscription against the primary's customer and first plan.
fn cross_validate(
    primary: &SubscriptionEntity,
    secondaries: &[SubscriptionEntity],
) -> Vec<ValidationMismatch> {
    let reference = primary.primary_plan();
    let mut mismatches = Vec::new();

    for subscription in std::iter::once(primary).chain(secondaries) {
        if subscription.customer_id != primary.customer_id {
            mismatches.push(ValidationMismatch::new(
                subscription,
                MismatchField::Customer,
                &primary.customer_id,
                &subscription.customer_id,
            ));
        }

        let Some(plan) = subscription.primary_plan() else {
            mismatches.push(ValidationMismatch::new(
                subscription,
                MismatchField::Items,
                "at least one item",
                "none",
            ));
            continue;
        };

        if plan.has_trial() {
            mismatches.push(ValidationMismatch::new(
                subscription,
                MismatchField::TrialPeriod,
                0,
                plan.trial_period_days,
            ));
        }

        let Some(reference) = reference else {
            continue;
        };

        if plan.currency != reference.currency {
            mismatches.push(ValidationMismatch::new(
                subscription,
                MismatchField::Currency,
                &reference.currency,
                &plan.currency,
            ));
        }
        if plan.interval != reference.interval {
            mismatches.push(ValidationMismatch::new(
                subscription,
                MismatchField::Interval,
                reference.interval,
                plan.interval,
            ));
        }
        if plan.interval_count != reference.interval_count {
            mismatches.push(ValidationMismatch::new(
                subscription,
                MismatchField::IntervalCount,
                reference.interval_count,
                plan.interval_count,
            ));
        }
    }

    mismatches
}

fn format_timestamp(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string())
}
