use std::env;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ServiceContext {
    pub(crate) service_name: String,
    pub(crate) environment: String,
    pub(crate) component: String,
}

#[derive(Clone, Debug)]
pub(crate) struct ObservabilityConfig {
    pub(crate) service_context: ServiceContext,
    /// Fallback directive when `RUST_LOG` is unset or invalid.
    pub(crate) default_filter: String,
}

impl ObservabilityConfig {
    pub(crate) fn from_env(component: &str) -> Self {
        Self::from_lookup(component, |key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(component: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let component = component.trim().to_string();

        let service_name = lookup("SERVICE_NAME")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| component.clone());

        let environment = lookup("STAGE")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            service_context: ServiceContext {
                service_name,
                environment,
                component,
            },
            default_filter: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_service_name_to_component() {
        let config = ObservabilityConfig::from_lookup(" combine-subscriptions ", |_| None);

        assert_eq!(
            config.service_context,
            ServiceContext {
                service_name: "combine-subscriptions".to_string(),
                environment: "unknown".to_string(),
                component: "combine-subscriptions".to_string(),
            }
        );
        assert_eq!(config.default_filter, "info");
    }

    #[test]
    fn reads_service_name_and_stage() {
        let vars = HashMap::from([
            ("SERVICE_NAME", "billing-tools"),
            ("STAGE", "production"),
        ]);
        let config = ObservabilityConfig::from_lookup("combine-subscriptions", |key| {
            vars.get(key).map(|v| v.to_string())
        });

        assert_eq!(config.service_context.service_name, "billing-tools");
        assert_eq!(config.service_context.environment, "production");
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = ObservabilityConfig::from_lookup("cli", |_| Some("  ".to_string()));

        assert_eq!(config.service_context.service_name, "cli");
        assert_eq!(config.service_context.environment, "unknown");
    }
}
