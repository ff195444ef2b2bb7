// Screener configuration: defaults, optional TOML file, SCREENER__* environment
pub mod dividend_override;

pub use dividend_override::{DividendOverride, DividendOverrideTable};

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

const ENV_PREFIX: &str = "SCREENER";
const DEFAULT_CONFIG_FILE: &str = "screener.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScreenerConfig {
    pub filter: FilterConfig,
    pub fetch: FetchConfig,
    pub valuation: AssumedGrowth,
}

/// Selection thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterConfig {
    pub max_pe: f64,
    /// Percent of float traded
    pub min_turnover_rate: f64,
    pub min_price: f64,
    pub max_stocks: usize,
    pub min_strength_score: u32,
    pub momentum_days: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_pe: 30.0,
            min_turnover_rate: 1.0,
            min_price: 1.0,
            max_stocks: 10,
            min_strength_score: 40,
            momentum_days: 20,
        }
    }
}

/// Data source endpoints and limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FetchConfig {
    pub quote_base_url: String,
    pub kline_base_url: String,
    pub max_requests_per_second: u32,
    pub history_days: usize,
    pub history_cache_ttl_secs: u64,
    pub market_chunk_size: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            quote_base_url: "https://qt.gtimg.cn".to_string(),
            kline_base_url: "https://web.ifzq.gtimg.cn".to_string(),
            max_requests_per_second: 5,
            history_days: 30,
            history_cache_ttl_secs: 3600,
            market_chunk_size: 800,
        }
    }
}

/// Growth rates assumed for PEG when no analyst estimate exists.
///
/// This is a heuristic picked by price/book band, not a forecast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssumedGrowth {
    /// Used when PB is below `cheap_pb`
    pub below_book: f64,
    /// Used when PB is above `rich_pb`
    pub rich_book: f64,
    pub default: f64,
    pub cheap_pb: f64,
    pub rich_pb: f64,
}

impl Default for AssumedGrowth {
    fn default() -> Self {
        Self {
            below_book: 20.0,
            rich_book: 10.0,
            default: 15.0,
            cheap_pb: 1.0,
            rich_pb: 5.0,
        }
    }
}

impl AssumedGrowth {
    pub fn for_pb(&self, pb: Option<f64>) -> f64 {
        match pb {
            Some(pb) if pb < self.cheap_pb => self.below_book,
            Some(pb) if pb > self.rich_pb => self.rich_book,
            _ => self.default,
        }
    }
}

impl ScreenerConfig {
    /// Layer defaults, the TOML file (explicit path, or `screener.toml` if
    /// present) and `SCREENER__SECTION__KEY` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&ScreenerConfig::default())?)
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: ScreenerConfig = settings.try_deserialize()?;
        tracing::debug!(?loaded, "Loaded screener configuration");
        Ok(loaded)
    }
}
