use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Unit of a plan's billing cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlanInterval {
    Day,
    Week,
    Month,
    Year,
}

impl Display for PlanInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let interval = match self {
            PlanInterval::Day => "day",
            PlanInterval::Week => "week",
            PlanInterval::Month => "month",
            PlanInterval::Year => "year",
        };
        write!(f, "{}", interval)
    }
}

impl PlanInterval {
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "day" => Some(PlanInterval::Day),
            "week" => Some(PlanInterval::Week),
            "month" => Some(PlanInterval::Month),
            "year" => Some(PlanInterval::Year),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lowercase_units() {
        assert_eq!(PlanInterval::from_str("month"), Some(PlanInterval::Month));
        assert_eq!(PlanInterval::from_str("Month"), None);
        assert_eq!(PlanInterval::Year.to_string(), "year");
    }
}
