use serde::{Deserialize, Serialize};

/// Token usage for one or more gateway calls.
///
/// Accumulated per call, summed per instance, summed per batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    /// Actual cost in USD as reported by the gateway, when available.
    /// OpenRouter returns this as `total_cost` in the usage object.
    #[serde(default, alias = "total_cost", skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

impl Usage {
    /// Fold another usage record into this one.
    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.cost = match (self.cost, other.cost) {
            (Some(a), Some(b)) => Some(a + b),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        };
    }

    /// Cost in USD: gateway-reported when present, otherwise derived from
    /// the configured per-million-token rates.
    pub fn cost_usd(&self, prompt_rate_per_mtok: f64, completion_rate_per_mtok: f64) -> f64 {
        if let Some(cost) = self.cost {
            return cost;
        }
        (self.prompt_tokens as f64 / 1_000_000.0) * prompt_rate_per_mtok
            + (self.completion_tokens as f64 / 1_000_000.0) * completion_rate_per_mtok
    }
}

/// Cumulative client-level counters across a whole run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_calls: u64,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_add_sums_tokens_and_cost() {
        let mut a = Usage {
            prompt_tokens: 100,
            completion_tokens: 50,
            total_tokens: 150,
            cost: Some(0.01),
        };
        let b = Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
            cost: None,
        };
        a.add(&b);
        assert_eq!(a.prompt_tokens, 110);
        assert_eq!(a.total_tokens, 165);
        assert_eq!(a.cost, Some(0.01));
    }

    #[test]
    fn test_cost_prefers_gateway_reported_value() {
        let usage = Usage {
            prompt_tokens: 1_000_000,
            completion_tokens: 1_000_000,
            total_tokens: 2_000_000,
            cost: Some(0.05),
        };
        assert_eq!(usage.cost_usd(0.14, 0.14), 0.05);
    }

    #[test]
    fn test_cost_derived_from_rates_when_unreported() {
        let usage = Usage {
            prompt_tokens: 1_000_000,
            completion_tokens: 500_000,
            total_tokens: 1_500_000,
            cost: None,
        };
        let cost = usage.cost_usd(0.14, 0.14);
        assert!((cost - 0.21).abs() < 1e-9);
    }

    #[test]
    fn test_usage_deserialize_with_total_cost_alias() {
        let json = r#"{"prompt_tokens":100,"completion_tokens":50,"total_tokens":150,"total_cost":0.0025}"#;
        let usage: Usage = serde_json::from_str(json).unwrap();
        assert_eq!(usage.prompt_tokens, 100);
        assert_eq!(usage.cost, Some(0.0025));
    }
}
