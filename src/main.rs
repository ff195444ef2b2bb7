use anyhow::Context;
use ashare_screener::api::{
    FundamentalClient, HistoryClient, MarketAggregator, QuoteClient, RandomThrottle,
    TencentSource, Throttle,
};
use ashare_screener::{
    AnalysisReport, Analyzer, Backtester, DividendOverrideTable, JsonUniverse, ScoringEngine,
    ScreenerConfig,
};
use ashare_screener::{CollectOptions, FailedSymbols};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ashare-screener", about = "Daily A-share strength screener")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (defaults to ./screener.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Full daily analysis, JSON report on stdout
    Run {
        /// Universe JSON file
        #[arg(short, long)]
        universe: PathBuf,
        /// Skip history fetches and momentum
        #[arg(long)]
        no_momentum: bool,
        /// Skip valuation and dividend fetches
        #[arg(long)]
        no_fundamentals: bool,
        /// Dividend override JSON (replaces the built-in table)
        #[arg(long)]
        overrides: Option<PathBuf>,
    },
    /// Market breadth only
    Overview {
        /// Universe JSON file
        #[arg(short, long)]
        universe: PathBuf,
    },
    /// Fetch and score single codes
    Quote {
        /// Six-digit codes, e.g. 600519 000001
        #[arg(required = true)]
        codes: Vec<String>,
    },
    /// Next-day performance of a saved report's picks
    Backtest {
        /// Report JSON written by `run`
        #[arg(short, long)]
        report: PathBuf,
        /// Trading day whose close is compared with the pick price
        #[arg(short, long)]
        date: NaiveDate,
        /// Recent bars searched for that day
        #[arg(long, default_value_t = 60)]
        lookback: usize,
    },
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let config = ScreenerConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    let throttle: Arc<dyn Throttle> = Arc::new(RandomThrottle);

    match cli.command {
        Commands::Run {
            universe,
            no_momentum,
            no_fundamentals,
            overrides,
        } => {
            let overrides = match overrides {
                Some(path) => match DividendOverrideTable::from_json_file(&path) {
                    Ok(table) => table,
                    Err(e) => {
                        tracing::error!("❌ {}", e);
                        print_json(&AnalysisReport::empty(config.filter.clone()))?;
                        return Ok(());
                    }
                },
                None => DividendOverrideTable::builtin(),
            };

            let analyzer = Analyzer::from_config(
                &config,
                overrides,
                Box::new(JsonUniverse::new(universe)),
                throttle,
            )
            .context("Failed to build analyzer")?;
            let options = CollectOptions {
                with_momentum: !no_momentum,
                with_fundamentals: !no_fundamentals,
                ..analyzer.options()
            };

            let report = analyzer.with_options(options).run_daily_analysis().await;
            print_json(&report)?;
        }
        Commands::Overview { universe } => {
            let source = TencentSource::new(&config.fetch, throttle)?;
            let market = MarketAggregator::new(source, config.fetch.market_chunk_size);
            let overview = market
                .get_market_overview(&JsonUniverse::new(universe))
                .await;
            tracing::info!("Market sentiment: {}", overview.sentiment());
            print_json(&overview)?;
        }
        Commands::Quote { codes } => {
            let source = TencentSource::new(&config.fetch, throttle)?;
            let quotes = QuoteClient::new(source.clone());
            let fundamentals = FundamentalClient::new(
                source,
                DividendOverrideTable::builtin(),
                config.valuation.clone(),
            );
            let engine = ScoringEngine::new();
            let mut failed = FailedSymbols::new();
            let mut results = Vec::new();

            for code in &codes {
                let Some(mut record) = quotes.get_quote(code, &mut failed).await else {
                    tracing::warn!("No quote for {}", code);
                    continue;
                };
                record.merge_fundamentals(&fundamentals.get_fundamentals(code).await);
                let score = engine.compute_score(&record);
                results.push(json!({ "record": record, "score": score }));
            }

            if !failed.is_empty() {
                tracing::warn!("Failed codes: {}", failed.codes().join(", "));
            }
            print_json(&results)?;
        }
        Commands::Backtest {
            report,
            date,
            lookback,
        } => {
            let json = std::fs::read_to_string(&report)
                .with_context(|| format!("Failed to read report {}", report.display()))?;
            let saved: AnalysisReport =
                serde_json::from_str(&json).context("Failed to parse report")?;
            if date <= saved.analysis_date {
                tracing::warn!(
                    "Backtest date {} is not after the analysis date {}",
                    date,
                    saved.analysis_date
                );
            }

            let source = TencentSource::new(&config.fetch, throttle)?;
            let history = HistoryClient::new(
                source,
                Duration::from_secs(config.fetch.history_cache_ttl_secs),
            );
            let summary = Backtester::new(history, lookback)
                .run_backtest(&saved.picks, date)
                .await;
            print_json(&summary)?;
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", out);
    Ok(())
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ashare_screener=info"));
    // logs go to stderr so stdout stays valid JSON
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
