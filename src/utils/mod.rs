pub mod cost_calculator;
pub mod error;

pub use cost_calculator::{CostBreakdown, CostCalculator, ModelPricing, TokenUsage, ToolCost};
pub use error::{ExamError, Result};
