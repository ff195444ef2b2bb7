pub mod collector;
pub mod fundamentals;
pub mod history;
pub mod market;
pub mod quote;
pub mod tencent;
pub mod throttle;

pub use collector::{CollectOptions, CollectedBatch, StockDataCollector};
pub use fundamentals::{FundamentalClient, RawFundamentals};
pub use history::HistoryClient;
pub use market::{MarketAggregator, BENCHMARK_INDICES};
pub use quote::{Pacing, QuoteBatch, QuoteClient};
pub use tencent::{market_symbol, TencentSource};
pub use throttle::{NoDelay, Pause, RandomThrottle, RetryPolicy, Throttle};
