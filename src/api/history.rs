use super::tencent::{market_symbol, TencentSource};
use super::throttle::RetryPolicy;
use crate::error::ScreenerError;
use crate::indicators::compute_momentum;
use crate::models::{FetchOutcome, PriceBar};
use crate::Result;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const JS_VAR: &str = "kline_dayqfq";

struct CachedSeries {
    bars: Vec<PriceBar>,
    fetched_at: Instant,
}

/// Daily front-adjusted k-line client with an in-memory cache
#[derive(Clone)]
pub struct HistoryClient {
    source: TencentSource,
    policy: RetryPolicy,
    cache_ttl: Duration,
    cache: Arc<RwLock<HashMap<(String, usize), CachedSeries>>>,
}

impl HistoryClient {
    pub fn new(source: TencentSource, cache_ttl: Duration) -> Self {
        Self {
            source,
            policy: RetryPolicy::QUOTE,
            cache_ttl,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Up to `days` most recent bars, oldest first.
    ///
    /// Requests twice as many calendar entries so non-trading days do not
    /// starve the window. Exhausted retries give an empty series. Storing a
    /// fresh series evicts every entry older than the cache TTL.
    pub async fn get_history(&self, code: &str, days: usize) -> Vec<PriceBar> {
        let key = (code.to_string(), days);

        if let Some(cached) = self.cache.read().await.get(&key) {
            if cached.fetched_at.elapsed() < self.cache_ttl {
                tracing::debug!("History cache hit for {} ({}d)", code, days);
                return cached.bars.clone();
            }
        }

        match self.fetch_history(code, days).await {
            FetchOutcome::Fetched(bars) => {
                let mut cache = self.cache.write().await;
                let before = cache.len();
                cache.retain(|_, cached| cached.fetched_at.elapsed() < self.cache_ttl);
                if cache.len() < before {
                    tracing::debug!("Evicted {} stale history entries", before - cache.len());
                }
                cache.insert(
                    key,
                    CachedSeries {
                        bars: bars.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                bars
            }
            FetchOutcome::Absent | FetchOutcome::Failed => Vec::new(),
        }
    }

    pub async fn fetch_history(&self, code: &str, days: usize) -> FetchOutcome<Vec<PriceBar>> {
        let symbol = market_symbol(code);
        let label = format!("{} history", symbol);
        self.source
            .with_retry(&label, self.policy, || self.fetch_once(&symbol, days))
            .await
    }

    async fn fetch_once(&self, symbol: &str, days: usize) -> Result<Option<Vec<PriceBar>>> {
        let url = self.source.kline_url();
        let query = [
            ("param", format!("{},day,,,{},qfq", symbol, days * 2)),
            ("_var", JS_VAR.to_string()),
        ];
        let body = self.source.get_text(&url, &query, self.policy.timeout).await?;
        parse_kline(symbol, &body, days).map(Some)
    }

    /// Trailing momentum over `window` bars of a `days`-bar history
    pub async fn momentum(&self, code: &str, days: usize, window: usize) -> f64 {
        let bars = self.get_history(code, days).await;
        let closes: Vec<f64> = bars.iter().map(|bar| bar.close).collect();
        compute_momentum(&closes, window)
    }

    pub async fn cached_entries(&self) -> usize {
        self.cache.read().await.len()
    }
}

/// Parse a `kline_dayqfq={...}` body, keeping the last `days` bars.
///
/// An empty series is an error so the caller retries it.
pub(crate) fn parse_kline(symbol: &str, body: &str, days: usize) -> Result<Vec<PriceBar>> {
    let body = body.trim();
    let json = match body.find('=') {
        Some(pos) if body[..pos].trim() == JS_VAR => &body[pos + 1..],
        _ => body,
    };

    let root: Value = serde_json::from_str(json)?;
    let series = root
        .get("data")
        .and_then(|data| data.get(symbol))
        .ok_or_else(|| ScreenerError::malformed(symbol, "missing data section"))?;

    let rows = series
        .get("qfqday")
        .or_else(|| series.get("day"))
        .and_then(Value::as_array)
        .ok_or_else(|| ScreenerError::EmptySeries(symbol.to_string()))?;

    let mut bars: Vec<PriceBar> = rows
        .iter()
        .filter_map(|row| {
            let bar = parse_row(row);
            if bar.is_none() {
                tracing::debug!("Skipping malformed k-line row for {}: {}", symbol, row);
            }
            bar
        })
        .collect();

    if bars.is_empty() {
        return Err(ScreenerError::EmptySeries(symbol.to_string()));
    }

    if bars.len() > days {
        bars.drain(..bars.len() - days);
    }

    Ok(bars)
}

/// `[date, open, close, high, low, volume, ...]`
fn parse_row(row: &Value) -> Option<PriceBar> {
    let cells = row.as_array()?;
    let date = NaiveDate::parse_from_str(cells.first()?.as_str()?, "%Y-%m-%d").ok()?;

    Some(PriceBar {
        date,
        open: cell_number(cells.get(1)?)?,
        close: cell_number(cells.get(2)?)?,
        high: cell_number(cells.get(3)?)?,
        low: cell_number(cells.get(4)?)?,
        volume: cells.get(5).and_then(cell_number).unwrap_or(0.0),
    })
}

fn cell_number(cell: &Value) -> Option<f64> {
    let value: Option<f64> = match cell {
        Value::String(text) => text.trim().parse().ok(),
        Value::Number(number) => number.as_f64(),
        _ => None,
    };
    value.filter(|value| value.is_finite())
}
