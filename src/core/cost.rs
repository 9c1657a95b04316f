//! Token cost estimation

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::core::errors::{DocChatError, Result};
use crate::core::models::{CostBreakdown, Deployment, UsageRecord};

/// Price of one token when a deployment has no rate of its own (0.00002 USD)
pub const DEFAULT_COST_PER_TOKEN: Decimal = Decimal::from_parts(2, 0, 0, false, 5);

/// Built-in per-token prices for known models, as (model, mantissa, scale)
const KNOWN_MODEL_RATES: &[(&str, i64, u32)] = &[
    ("text-davinci-003", 2, 5),
    ("gpt-35-turbo", 15, 6),
    ("gpt-35-turbo-instruct", 15, 7),
];

/// Per-token price for a model name, if it is one we know
pub fn known_model_rate(model: &str) -> Option<Decimal> {
    KNOWN_MODEL_RATES
        .iter()
        .find(|(name, _, _)| *name == model)
        .map(|(_, mantissa, scale)| Decimal::new(*mantissa, *scale))
}

impl CostBreakdown {
    /// Price a usage record at a single per-token rate
    pub fn from_usage(usage: &UsageRecord, cost_per_token: Decimal) -> Self {
        if usage.prompt_tokens.checked_add(usage.completion_tokens) != Some(usage.total_tokens) {
            warn!(
                "Upstream total_tokens {} differs from prompt {} + completion {}",
                usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
            );
        }

        Self {
            total_cost: Decimal::from(usage.total_tokens) * cost_per_token,
            total_tokens: usage.total_tokens,
            input_cost: Decimal::from(usage.prompt_tokens) * cost_per_token,
            prompt_tokens: usage.prompt_tokens,
            completion_cost: Decimal::from(usage.completion_tokens) * cost_per_token,
            completion_tokens: usage.completion_tokens,
        }
    }
}

/// Derive a cost breakdown from the usage counters of a completion response.
///
/// A response without usage yields [`DocChatError::CostDataMissing`]; callers that
/// only display the figures can fall back to `CostBreakdown::default()`.
pub fn compute_cost(usage: Option<&UsageRecord>, cost_per_token: Decimal) -> Result<CostBreakdown> {
    let usage = usage.ok_or(DocChatError::CostDataMissing)?;
    Ok(CostBreakdown::from_usage(usage, cost_per_token))
}

/// Resolves the rate of each deployment and prices completions with it
#[derive(Debug, Clone)]
pub struct CostCalculator {
    deployments: Vec<Deployment>,
    default_rate: Decimal,
}

impl Default for CostCalculator {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl CostCalculator {
    pub fn new(deployments: Vec<Deployment>) -> Self {
        Self {
            deployments,
            default_rate: DEFAULT_COST_PER_TOKEN,
        }
    }

    pub fn with_default_rate(mut self, rate: Decimal) -> Self {
        self.default_rate = rate;
        self
    }

    /// Rate for a deployment name. A name that matches no deployment is
    /// treated as a model name before falling back to the default rate.
    pub fn rate_for(&self, deployment: &str) -> Decimal {
        let rate = self
            .deployments
            .iter()
            .find(|d| d.name == deployment)
            .map(|d| d.cost_per_token)
            .or_else(|| known_model_rate(deployment))
            .unwrap_or(self.default_rate);
        debug!("Rate for {}: {}", deployment, rate);
        rate
    }

    /// Price usage reported by a call to `deployment`
    pub fn compute(&self, deployment: &str, usage: Option<&UsageRecord>) -> Result<CostBreakdown> {
        compute_cost(usage, self.rate_for(deployment))
    }
}
