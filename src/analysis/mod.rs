// Daily analysis
// Universe -> collection -> selection -> market overview -> summary

use crate::api::{
    CollectOptions, FundamentalClient, HistoryClient, MarketAggregator, QuoteClient,
    StockDataCollector, TencentSource, Throttle,
};
use crate::config::{DividendOverrideTable, FilterConfig, ScreenerConfig};
use crate::models::{MarketOverview, Sentiment};
use crate::scoring::ScoringEngine;
use crate::selection::{SelectedStock, SelectionPipeline};
use crate::universe::UniverseProvider;
use crate::Result;
use chrono::{Local, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const WEAK_BREADTH_RATIO: f64 = 30.0;
const RICH_PE: f64 = 25.0;
pub const WEAK_BREADTH_WARNING: &str = "weak market breadth, keep positions light";
pub const ELEVATED_VALUATION_WARNING: &str = "elevated valuation on some picks (PE > 25)";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub rank: usize,
    pub code: String,
    pub name: String,
    pub price: Option<f64>,
    pub change_pct: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub momentum_20d: Option<f64>,
    pub strength_score: u32,
    pub grade: String,
    pub reason: String,
}

impl From<&SelectedStock> for Recommendation {
    fn from(pick: &SelectedStock) -> Self {
        Self {
            rank: pick.rank,
            code: pick.record.code.clone(),
            name: pick.record.name.clone(),
            price: pick.record.price,
            change_pct: pick.record.change_pct,
            pe_ratio: pick.record.pe_ratio,
            momentum_20d: pick.record.momentum_20d,
            strength_score: pick.score.total,
            grade: pick.score.grade.to_string(),
            reason: pick.reason.clone(),
        }
    }
}

/// Aggregates over the picks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyMetrics {
    pub avg_price: f64,
    /// Over positive PEs only
    pub avg_pe_ratio: Option<f64>,
    pub avg_momentum: Option<f64>,
    pub price_range: (f64, f64),
    pub pe_range: Option<(f64, f64)>,
}

impl KeyMetrics {
    /// `None` when no pick has a known price
    pub fn from_picks(picks: &[SelectedStock]) -> Option<Self> {
        let prices: Vec<f64> = picks.iter().filter_map(|pick| pick.record.price).collect();
        let pes: Vec<f64> = picks
            .iter()
            .filter_map(|pick| pick.record.pe_ratio)
            .filter(|pe| *pe > 0.0)
            .collect();
        let momentums: Vec<f64> = picks
            .iter()
            .filter_map(|pick| pick.record.momentum_20d)
            .collect();

        Some(Self {
            avg_price: mean(&prices)?,
            avg_pe_ratio: mean(&pes),
            avg_momentum: mean(&momentums),
            price_range: range(&prices)?,
            pe_range: range(&pes),
        })
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn range(values: &[f64]) -> Option<(f64, f64)> {
    let min = values.iter().copied().reduce(f64::min)?;
    let max = values.iter().copied().reduce(f64::max)?;
    Some((min, max))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnalysisSummary {
    pub sentiment: Option<Sentiment>,
    pub recommendations: Vec<Recommendation>,
    pub risk_warnings: Vec<String>,
    pub key_metrics: Option<KeyMetrics>,
}

impl AnalysisSummary {
    pub fn build(picks: &[SelectedStock], overview: &MarketOverview) -> Self {
        let mut risk_warnings = Vec::new();
        if overview.rising_ratio < WEAK_BREADTH_RATIO {
            risk_warnings.push(WEAK_BREADTH_WARNING.to_string());
        }
        if picks
            .iter()
            .any(|pick| matches!(pick.record.pe_ratio, Some(pe) if pe > RICH_PE))
        {
            risk_warnings.push(ELEVATED_VALUATION_WARNING.to_string());
        }

        Self {
            sentiment: Some(overview.sentiment()),
            recommendations: picks.iter().map(Recommendation::from).collect(),
            risk_warnings,
            key_metrics: KeyMetrics::from_picks(picks),
        }
    }
}

/// Output of one daily run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub analysis_date: NaiveDate,
    pub analysis_time: NaiveTime,
    pub market_overview: Option<MarketOverview>,
    pub picks: Vec<SelectedStock>,
    pub total_analyzed: usize,
    /// Codes whose quote could not be fetched even after the retry pass
    pub failed_codes: Vec<String>,
    pub criteria: FilterConfig,
    pub summary: AnalysisSummary,
}

impl AnalysisReport {
    /// Report for a run that could not start
    pub fn empty(criteria: FilterConfig) -> Self {
        let now = Local::now();
        Self {
            analysis_date: now.date_naive(),
            analysis_time: now.time(),
            market_overview: None,
            picks: Vec::new(),
            total_analyzed: 0,
            failed_codes: Vec::new(),
            criteria,
            summary: AnalysisSummary::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_analyzed == 0 && self.picks.is_empty()
    }
}

/// Wires the clients, scoring and selection into the daily run
pub struct Analyzer {
    collector: StockDataCollector,
    market: MarketAggregator,
    pipeline: SelectionPipeline,
    universe: Box<dyn UniverseProvider>,
    options: CollectOptions,
}

impl Analyzer {
    pub fn new(
        collector: StockDataCollector,
        market: MarketAggregator,
        pipeline: SelectionPipeline,
        universe: Box<dyn UniverseProvider>,
        options: CollectOptions,
    ) -> Self {
        Self {
            collector,
            market,
            pipeline,
            universe,
            options,
        }
    }

    /// Build every client over one shared source
    pub fn from_config(
        config: &ScreenerConfig,
        overrides: DividendOverrideTable,
        universe: Box<dyn UniverseProvider>,
        throttle: Arc<dyn Throttle>,
    ) -> Result<Self> {
        let source = TencentSource::new(&config.fetch, throttle)?;

        let collector = StockDataCollector::new(
            QuoteClient::new(source.clone()),
            HistoryClient::new(
                source.clone(),
                Duration::from_secs(config.fetch.history_cache_ttl_secs),
            ),
            FundamentalClient::new(source.clone(), overrides, config.valuation.clone()),
        );
        let market = MarketAggregator::new(source, config.fetch.market_chunk_size);
        let pipeline = SelectionPipeline::new(config.filter.clone(), ScoringEngine::new());
        let options = CollectOptions {
            history_days: config.fetch.history_days,
            momentum_days: config.filter.momentum_days,
            ..CollectOptions::default()
        };

        Ok(Self::new(collector, market, pipeline, universe, options))
    }

    pub fn with_options(mut self, options: CollectOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> CollectOptions {
        self.options
    }

    pub fn collector(&self) -> &StockDataCollector {
        &self.collector
    }

    pub fn pipeline(&self) -> &SelectionPipeline {
        &self.pipeline
    }

    pub fn market(&self) -> &MarketAggregator {
        &self.market
    }

    /// Run the whole day's analysis.
    ///
    /// A universe that cannot be loaded gives an empty report.
    pub async fn run_daily_analysis(&self) -> AnalysisReport {
        tracing::info!("🚀 Starting daily analysis");
        let criteria = self.pipeline.config().clone();

        let universe = match self.universe.load() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("❌ Cannot load universe: {}", e);
                return AnalysisReport::empty(criteria);
            }
        };

        let codes: Vec<String> = universe.iter().map(|entry| entry.code.clone()).collect();
        tracing::info!("Analyzing {} stocks", codes.len());

        let batch = self.collector.collect(&codes, self.options).await;
        let picks = self.pipeline.select_top(&batch.records);
        let overview = self.market.get_market_overview(self.universe.as_ref()).await;
        let summary = AnalysisSummary::build(&picks, &overview);

        tracing::info!(
            "✓ Daily analysis done: {} analyzed, {} picked, market {}",
            batch.records.len(),
            picks.len(),
            overview.sentiment()
        );

        let now = Local::now();
        AnalysisReport {
            analysis_date: now.date_naive(),
            analysis_time: now.time(),
            market_overview: Some(overview),
            total_analyzed: batch.records.len(),
            failed_codes: batch.failed.codes().to_vec(),
            picks,
            criteria,
            summary,
        }
    }
}
