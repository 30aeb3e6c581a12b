pub mod report;

pub use report::{render_reply, CostReport, PriceTable, SessionTotals};
