pub mod plan_intervals;
pub mod subscription_statuses;
