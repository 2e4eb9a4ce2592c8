use crate::domain::value_objects::enums::plan_intervals::PlanInterval;

/// Pricing plan attached to a subscription item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntity {
    pub id: String,
    pub name: Option<String>,
    pub currency: String,
    pub interval: PlanInterval,
    pub interval_count: u32,
    /// Zero when the plan carries no trial.
    pub trial_period_days: u32,
}

impl PlanEntity {
    pub fn has_trial(&self) -> bool {
        self.trial_period_days > 0
    }
}
