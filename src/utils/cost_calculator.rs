// ABOUTME: cost_calculator turns token usage into dollar cost for OpenAI models
// Pricing is a fixed table built once at start-up, optionally extended from a JSON file

use crate::utils::error::{ExamError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::ops::{Add, AddAssign};
use std::path::Path;

/// Rates are quoted per this many tokens
pub const TOKENS_PER_RATE_UNIT: u64 = 1000;

/// Model pricing in USD per 1000 tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelPricing {
    pub model: String,
    pub display_name: String,
    pub input_cost_per_1k: Decimal,
    pub output_cost_per_1k: Decimal,
}

impl ModelPricing {
    pub fn new(
        model: &str,
        display_name: &str,
        input_cost_per_1k: Decimal,
        output_cost_per_1k: Decimal,
    ) -> Self {
        Self {
            model: model.to_string(),
            display_name: display_name.to_string(),
            input_cost_per_1k,
            output_cost_per_1k,
        }
    }
}

/// Shape of one entry in a pricing override file, keyed by model id
#[derive(Debug, Deserialize)]
struct PricingFileEntry {
    display_name: Option<String>,
    input_cost_per_1k: Decimal,
    output_cost_per_1k: Decimal,
}

/// Token counts reported by the API for a single exchange
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }
}

/// Cost of one exchange, split by direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CostBreakdown {
    pub input_cost: Decimal,
    pub output_cost: Decimal,
    pub total_cost: Decimal,
}

impl CostBreakdown {
    pub fn new(input_cost: Decimal, output_cost: Decimal) -> Self {
        Self {
            input_cost,
            output_cost,
            total_cost: input_cost + output_cost,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.input_cost.is_zero() && self.output_cost.is_zero() && self.total_cost.is_zero()
    }
}

impl Add for CostBreakdown {
    type Output = CostBreakdown;

    fn add(self, rhs: CostBreakdown) -> CostBreakdown {
        CostBreakdown::new(
            self.input_cost + rhs.input_cost,
            self.output_cost + rhs.output_cost,
        )
    }
}

impl AddAssign for CostBreakdown {
    fn add_assign(&mut self, rhs: CostBreakdown) {
        *self = *self + rhs;
    }
}

/// Flat fees for assistant tools, billed independently of tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolCost {
    CodeInterpreter,
    Retrieval,
}

impl ToolCost {
    pub fn all() -> [ToolCost; 2] {
        [ToolCost::CodeInterpreter, ToolCost::Retrieval]
    }

    pub fn rate(&self) -> Decimal {
        match self {
            ToolCost::CodeInterpreter => dec!(0.03),
            ToolCost::Retrieval => dec!(0.20),
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            ToolCost::CodeInterpreter => "per session",
            ToolCost::Retrieval => "per GB per day",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ToolCost::CodeInterpreter => "Code interpreter",
            ToolCost::Retrieval => "Retrieval",
        }
    }
}

impl fmt::Display for ToolCost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Main cost calculator. Immutable once built.
#[derive(Debug, Clone)]
pub struct CostCalculator {
    pricing_data: HashMap<String, ModelPricing>,
}

impl Default for CostCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl CostCalculator {
    /// Create a new cost calculator with the built-in pricing table
    pub fn new() -> Self {
        let builtin = [
            ModelPricing::new("gpt-4-turbo-preview", "GPT-4 Turbo Preview", dec!(0.01), dec!(0.03)),
            ModelPricing::new("gpt-4-turbo", "GPT-4 Turbo", dec!(0.01), dec!(0.03)),
            ModelPricing::new("gpt-4", "GPT-4", dec!(0.03), dec!(0.06)),
            ModelPricing::new("gpt-4o", "GPT-4o", dec!(0.005), dec!(0.015)),
            ModelPricing::new("gpt-4o-mini", "GPT-4o mini", dec!(0.00015), dec!(0.0006)),
            ModelPricing::new("gpt-3.5-turbo", "GPT-3.5 Turbo", dec!(0.005), dec!(0.015)),
        ];

        let pricing_data = builtin
            .into_iter()
            .map(|pricing| (pricing.model.clone(), pricing))
            .collect();

        Self { pricing_data }
    }

    /// Build a calculator from an explicit table, rejecting duplicate model ids
    pub fn from_pricing(entries: Vec<ModelPricing>) -> Result<Self> {
        let mut pricing_data = HashMap::with_capacity(entries.len());
        for pricing in entries {
            if pricing_data.contains_key(&pricing.model) {
                return Err(ExamError::Config(format!(
                    "duplicate pricing entry for model '{}'",
                    pricing.model
                )));
            }
            pricing_data.insert(pricing.model.clone(), pricing);
        }
        Ok(Self { pricing_data })
    }

    /// Load overrides from a JSON file on top of the built-in table
    pub fn load_from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let entries: HashMap<String, PricingFileEntry> = serde_json::from_str(&content)?;

        let mut calculator = Self::new();
        for (model, entry) in entries {
            if entry.input_cost_per_1k.is_sign_negative() || entry.output_cost_per_1k.is_sign_negative() {
                return Err(ExamError::Config(format!(
                    "negative rate for model '{}' in {}",
                    model,
                    path.as_ref().display()
                )));
            }
            let display_name = entry
                .display_name
                .or_else(|| calculator.pricing_data.get(&model).map(|p| p.display_name.clone()))
                .unwrap_or_else(|| model.clone());
            calculator.pricing_data.insert(
                model.clone(),
                ModelPricing {
                    model,
                    display_name,
                    input_cost_per_1k: entry.input_cost_per_1k,
                    output_cost_per_1k: entry.output_cost_per_1k,
                },
            );
        }

        Ok(calculator)
    }

    /// Look up pricing by exact model id
    pub fn pricing(&self, model: &str) -> Result<&ModelPricing> {
        self.pricing_data
            .get(model)
            .ok_or_else(|| ExamError::UnknownModel(model.to_string()))
    }

    /// Estimate the cost of one exchange.
    ///
    /// Fails with [`ExamError::UnknownModel`] when the model has no pricing entry.
    /// Arithmetic is fixed-point, so `total_cost` is exactly `input_cost + output_cost`.
    pub fn estimate(
        &self,
        model: &str,
        prompt_tokens: u64,
        completion_tokens: u64,
    ) -> Result<CostBreakdown> {
        let pricing = self.pricing(model)?;

        let input_cost = Self::priced(model, prompt_tokens, pricing.input_cost_per_1k)?;
        let output_cost = Self::priced(model, completion_tokens, pricing.output_cost_per_1k)?;
        input_cost
            .checked_add(output_cost)
            .ok_or_else(|| Self::overflow(model))?;

        Ok(CostBreakdown::new(input_cost, output_cost))
    }

    fn priced(model: &str, tokens: u64, rate_per_1k: Decimal) -> Result<Decimal> {
        Decimal::from(tokens)
            .checked_div(Decimal::from(TOKENS_PER_RATE_UNIT))
            .and_then(|units| units.checked_mul(rate_per_1k))
            .ok_or_else(|| Self::overflow(model))
    }

    fn overflow(model: &str) -> ExamError {
        ExamError::Config(format!("cost for model '{}' overflows the decimal range", model))
    }

    pub fn estimate_usage(&self, model: &str, usage: &TokenUsage) -> Result<CostBreakdown> {
        self.estimate(model, usage.prompt_tokens, usage.completion_tokens)
    }

    /// All known models, sorted by id
    pub fn available_models(&self) -> Vec<&ModelPricing> {
        let mut models: Vec<&ModelPricing> = self.pricing_data.values().collect();
        models.sort_by(|a, b| a.model.cmp(&b.model));
        models
    }

    /// Format cost as USD string
    pub fn format_cost(cost: Decimal) -> String {
        if cost < dec!(0.01) {
            format!("${:.4}", cost.round_dp(4))
        } else {
            format!("${:.2}", cost.round_dp(2))
        }
    }
}
