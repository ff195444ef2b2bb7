// Core modules
pub mod analysis;
pub mod api;
pub mod backtest;
pub mod config;
pub mod error;
pub mod indicators;
pub mod models;
pub mod scoring;
pub mod selection;
pub mod universe;

// Re-export commonly used types
pub use analysis::{AnalysisReport, AnalysisSummary, Analyzer, KeyMetrics};
pub use api::*;
pub use backtest::{Backtester, PerformanceSummary, PickPerformance, Verdict};
pub use crate::config::{DividendOverrideTable, FilterConfig, ScreenerConfig};
pub use error::ScreenerError;
pub use models::*;
pub use scoring::ScoringEngine;
pub use selection::{SelectedStock, SelectionPipeline};
pub use universe::{JsonUniverse, StaticUniverse, UniverseProvider};

// Error handling
pub type Result<T> = std::result::Result<T, ScreenerError>;
