// ABOUTME: Console rendering for cost reports, price tables and chat replies
// Keeps presentation out of the calculator and the clients

use crate::utils::cost_calculator::{CostBreakdown, CostCalculator, ModelPricing, ToolCost};
use rust_decimal::Decimal;
use std::fmt;

/// Three-line cost report for a single exchange
pub struct CostReport<'a> {
    pub pricing: &'a ModelPricing,
    pub breakdown: &'a CostBreakdown,
}

impl<'a> CostReport<'a> {
    pub fn new(pricing: &'a ModelPricing, breakdown: &'a CostBreakdown) -> Self {
        Self { pricing, breakdown }
    }
}

impl fmt::Display for CostReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = &self.pricing.display_name;
        writeln!(f, "Input cost for {}: ${}", name, self.breakdown.input_cost.normalize())?;
        writeln!(f, "Output cost for {}: ${}", name, self.breakdown.output_cost.normalize())?;
        write!(f, "Total cost for {}: ${}", name, self.breakdown.total_cost.normalize())
    }
}

/// Pricing table listing for the `models` command
pub struct PriceTable<'a> {
    pub models: Vec<&'a ModelPricing>,
}

impl<'a> PriceTable<'a> {
    pub fn new(calculator: &'a CostCalculator) -> Self {
        Self {
            models: calculator.available_models(),
        }
    }
}

impl fmt::Display for PriceTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .models
            .iter()
            .map(|m| m.model.len())
            .max()
            .unwrap_or(5)
            .max("MODEL".len());

        writeln!(f, "{:<width$}  {:>12}  {:>12}  NAME", "MODEL", "INPUT/1K", "OUTPUT/1K")?;
        for pricing in &self.models {
            writeln!(
                f,
                "{:<width$}  {:>12}  {:>12}  {}",
                pricing.model,
                format!("${}", pricing.input_cost_per_1k.normalize()),
                format!("${}", pricing.output_cost_per_1k.normalize()),
                pricing.display_name,
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Tool fees:")?;
        for tool in ToolCost::all() {
            writeln!(f, "  {}: ${} {}", tool, tool.rate().normalize(), tool.unit())?;
        }
        Ok(())
    }
}

/// End-of-session totals
pub struct SessionTotals<'a> {
    pub turns: usize,
    pub token_cost: &'a CostBreakdown,
    pub tool_cost: Decimal,
}

impl fmt::Display for SessionTotals<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Session turns: {}", self.turns)?;
        writeln!(
            f,
            "Session token cost: {}",
            CostCalculator::format_cost(self.token_cost.total_cost)
        )?;
        if !self.tool_cost.is_zero() {
            writeln!(f, "Session tool fees: {}", CostCalculator::format_cost(self.tool_cost))?;
        }
        write!(
            f,
            "Session total: {}",
            CostCalculator::format_cost(self.token_cost.total_cost + self.tool_cost)
        )
    }
}

pub fn render_reply(text: &str) -> String {
    format!("Assistant: {}", text)
}
