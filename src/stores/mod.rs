pub mod analysis;
pub mod cost;
pub mod tasks;

pub use analysis::{AnalysisState, AnalysisStore};
pub use cost::{CostLedger, LedgerTotals, ModelPricing};
pub use tasks::{TaskQueue, TaskRecord};
