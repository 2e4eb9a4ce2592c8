pub mod combine_subscriptions;
