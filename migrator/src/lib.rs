pub mod config;
pub mod usecases;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use crates::payments::stripe_client::{StripeClient, StripeClientConfig};
use tracing::info;
use usecases::combine_subscriptions::{CombineSubscriptionsUseCase, MigrationReport};

pub async fn run(ids: &[String], secret_key: String, apply: bool) -> Result<MigrationReport> {
    let dotenvy_env = config::config_loader::load()?;
    info!(api_base = %dotenvy_env.stripe.api_base, "ENV has been loaded");

    let stripe_client = StripeClient::new(StripeClientConfig {
        secret_key,
        api_base: dotenvy_env.stripe.api_base,
        timeout: Duration::from_secs(dotenvy_env.stripe.timeout_secs),
        log_requests: dotenvy_env.stripe.log_requests,
    })?;

    let usecase = CombineSubscriptionsUseCase::new(Arc::new(stripe_client));
    let report = usecase.combine(ids, apply).await?;

    Ok(report)
}
