#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotEnvyConfig {
    pub stripe: StripeApi,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripeApi {
    pub api_base: String,
    pub timeout_secs: u64,
    pub log_requests: bool,
}
