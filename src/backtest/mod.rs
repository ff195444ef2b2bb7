pub mod metrics;
pub mod runner;

pub use metrics::{PerformanceSummary, PickPerformance, Verdict};
pub use runner::Backtester;
