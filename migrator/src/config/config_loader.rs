use anyhow::{Context, Result};
use crates::payments::stripe_client::DEFAULT_API_BASE;

use super::config_model::{DotEnvyConfig, StripeApi};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Reads the process environment; `.env` is loaded once in `main`.
pub fn load() -> Result<DotEnvyConfig> {
    load_from(|key| std::env::var(key).ok())
}

pub fn load_from<F>(lookup: F) -> Result<DotEnvyConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let api_base = lookup("STRIPE_API_BASE")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

    let timeout_secs = match lookup("STRIPE_TIMEOUT_SECS") {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("STRIPE_TIMEOUT_SECS is invalid: {raw:?}"))?,
        None => DEFAULT_TIMEOUT_SECS,
    };
    if timeout_secs == 0 {
        anyhow::bail!("STRIPE_TIMEOUT_SECS must be greater than zero");
    }

    let log_requests = match lookup("STRIPE_LOG_REQUESTS") {
        Some(raw) => parse_bool(&raw)
            .with_context(|| format!("STRIPE_LOG_REQUESTS is invalid: {raw:?}"))?,
        None => false,
    };

    Ok(DotEnvyConfig {
        stripe: StripeApi {
            api_base,
            timeout_secs,
            log_requests,
        },
    })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load_with(vars: &[(&str, &str)]) -> Result<DotEnvyConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        load_from(|key| vars.get(key).cloned())
    }

    #[test]
    fn uses_defaults_when_nothing_is_set() {
        let config = load_with(&[]).unwrap();

        assert_eq!(
            config.stripe,
            StripeApi {
                api_base: DEFAULT_API_BASE.to_string(),
                timeout_secs: 30,
                log_requests: false,
            }
        );
    }

    #[test]
    fn reads_overrides() {
        let config = load_with(&[
            ("STRIPE_API_BASE", "http://localhost:12111"),
            ("STRIPE_TIMEOUT_SECS", "5"),
            ("STRIPE_LOG_REQUESTS", "yes"),
        ])
        .unwrap();

        assert_eq!(config.stripe.api_base, "http://localhost:12111");
        assert_eq!(config.stripe.timeout_secs, 5);
        assert!(config.stripe.log_requests);
    }

    #[test]
    fn rejects_invalid_values() {
        let err = load_with(&[("STRIPE_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("STRIPE_TIMEOUT_SECS"));

        let err = load_with(&[("STRIPE_TIMEOUT_SECS", "0")]).unwrap_err();
        assert!(err.to_string().contains("greater than zero"));

        let err = load_with(&[("STRIPE_LOG_REQUESTS", "maybe")]).unwrap_err();
        assert!(err.to_string().contains("STRIPE_LOG_REQUESTS"));
    }
}
