use super::tencent::{
    market_symbol, parse_quote_entries, TencentSource, FIELD_CHANGE_PCT, FIELD_NAME, FIELD_PRICE,
};
use super::throttle::{pause, Pause};
use crate::models::{IndexQuote, MarketOverview, OverviewSource};
use crate::universe::UniverseProvider;
use chrono::Utc;
use std::time::Duration;

/// Shanghai Composite, Shenzhen Component, ChiNext
pub const BENCHMARK_INDICES: &[&str] = &["sh000001", "sz399001", "sz399006"];

const INDEX_TIMEOUT: Duration = Duration::from_secs(10);
const CHUNK_TIMEOUT: Duration = Duration::from_secs(30);
const MIN_TALLY_FIELDS: usize = 33;

// Assumed breadth when live counting is impossible
const HEURISTIC_RISING_RATIO: f64 = 0.45;
const HEURISTIC_FALLING_RATIO: f64 = 0.35;
const HEURISTIC_AVG_CHANGE: f64 = 0.2;
const FALLBACK_TOTAL_STOCKS: usize = 5000;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Tally {
    rising: usize,
    falling: usize,
    flat: usize,
}

impl Tally {
    fn counted(&self) -> usize {
        self.rising + self.falling + self.flat
    }

    fn add(&mut self, change_pct: f64) {
        if change_pct > 0.0 {
            self.rising += 1;
        } else if change_pct < 0.0 {
            self.falling += 1;
        } else {
            self.flat += 1;
        }
    }
}

/// Market breadth aggregator.
///
/// Always produces an overview: live counts, else a heuristic snapshot
/// sized to the universe, else a constant snapshot.
#[derive(Clone)]
pub struct MarketAggregator {
    source: TencentSource,
    chunk_size: usize,
}

impl MarketAggregator {
    pub fn new(source: TencentSource, chunk_size: usize) -> Self {
        Self {
            source,
            chunk_size: chunk_size.max(1),
        }
    }

    pub async fn get_market_overview(&self, universe: &dyn UniverseProvider) -> MarketOverview {
        tracing::info!("Fetching market overview...");
        let indices = self.fetch_indices().await;
        let index_avg = average_change(&indices);

        let entries = match universe.load() {
            Ok(entries) if !entries.is_empty() => entries,
            Ok(_) => {
                tracing::warn!("Universe is empty, using constant market snapshot");
                return fallback_overview(indices);
            }
            Err(e) => {
                tracing::warn!("Universe unavailable ({}), using constant market snapshot", e);
                return fallback_overview(indices);
            }
        };

        let codes: Vec<String> = entries.into_iter().map(|entry| entry.code).collect();
        let total = codes.len();
        let tally = self.tally_universe(&codes).await;

        if tally.counted() == 0 {
            tracing::warn!("No live quotes counted, using heuristic market snapshot");
            return heuristic_overview(total, indices, index_avg);
        }

        let counted = tally.counted();
        let rising_ratio = tally.rising as f64 / counted as f64 * 100.0;
        let avg_change_pct = index_avg.unwrap_or(0.0);

        tracing::info!(
            "Market breadth: {} stocks, {} rising ({:.2}%), {} falling, index avg {:+.2}%",
            total,
            tally.rising,
            rising_ratio,
            tally.falling,
            avg_change_pct
        );

        MarketOverview {
            total_stocks: total,
            rising_stocks: tally.rising,
            falling_stocks: tally.falling,
            flat_stocks: tally.flat,
            rising_ratio,
            avg_change_pct,
            indices,
            success_count: counted,
            source: OverviewSource::Live,
            note: format!("Counted {} live quotes", counted),
            updated_at: Utc::now(),
        }
    }

    /// Benchmark index quotes; an unreachable endpoint gives an empty list
    pub async fn fetch_indices(&self) -> Vec<IndexQuote> {
        let url = self.source.quote_url(&BENCHMARK_INDICES.join(","));
        let body = match self.source.get_text(&url, &[], INDEX_TIMEOUT).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Benchmark index fetch failed: {}", e);
                return Vec::new();
            }
        };

        parse_quote_entries(&body)
            .into_iter()
            .filter(|entry| entry.len() >= MIN_TALLY_FIELDS && !entry.is_no_match())
            .filter_map(|entry| {
                Some(IndexQuote {
                    symbol: entry.symbol.to_string(),
                    name: entry.text(FIELD_NAME).unwrap_or_default().to_string(),
                    price: entry.number(FIELD_PRICE),
                    change_pct: entry.number(FIELD_CHANGE_PCT)?,
                })
            })
            .collect()
    }

    /// Count rising/falling/flat over the universe in multi-symbol chunks.
    ///
    /// A failed chunk is skipped; the rest still count.
    async fn tally_universe(&self, codes: &[String]) -> Tally {
        let mut tally = Tally::default();
        let chunks: Vec<&[String]> = codes.chunks(self.chunk_size).collect();
        let mut processed = 0;

        for (i, chunk) in chunks.iter().enumerate() {
            let symbols: Vec<String> = chunk.iter().map(|code| market_symbol(code)).collect();
            let url = self.source.quote_url(&symbols.join(","));

            match self.source.get_text(&url, &[], CHUNK_TIMEOUT).await {
                Ok(body) => {
                    for entry in parse_quote_entries(&body) {
                        if entry.len() < MIN_TALLY_FIELDS || entry.is_no_match() {
                            continue;
                        }
                        if let Some(change_pct) = entry.number(FIELD_CHANGE_PCT) {
                            tally.add(change_pct);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Market chunk {}/{} failed: {}", i + 1, chunks.len(), e);
                }
            }

            processed += chunk.len();
            tracing::info!(
                "Market breadth progress: {}/{} ({:.1}%)",
                processed,
                codes.len(),
                processed as f64 / codes.len() as f64 * 100.0
            );

            if i + 1 < chunks.len() {
                pause(self.source.throttle(), Pause::ChunkGap).await;
            }
        }

        tally
    }
}

fn average_change(indices: &[IndexQuote]) -> Option<f64> {
    if indices.is_empty() {
        return None;
    }
    Some(indices.iter().map(|index| index.change_pct).sum::<f64>() / indices.len() as f64)
}

fn heuristic_overview(
    total: usize,
    indices: Vec<IndexQuote>,
    index_avg: Option<f64>,
) -> MarketOverview {
    let rising = (total as f64 * HEURISTIC_RISING_RATIO) as usize;
    let falling = (total as f64 * HEURISTIC_FALLING_RATIO) as usize;

    MarketOverview {
        total_stocks: total,
        rising_stocks: rising,
        falling_stocks: falling,
        flat_stocks: total.saturating_sub(rising + falling),
        rising_ratio: HEURISTIC_RISING_RATIO * 100.0,
        avg_change_pct: index_avg.unwrap_or(HEURISTIC_AVG_CHANGE),
        indices,
        success_count: 0,
        source: OverviewSource::Heuristic,
        note: "Live quotes unavailable (market closed or network issue), breadth assumed"
            .to_string(),
        updated_at: Utc::now(),
    }
}

fn fallback_overview(indices: Vec<IndexQuote>) -> MarketOverview {
    let mut overview = heuristic_overview(FALLBACK_TOTAL_STOCKS, indices, None);
    overview.source = OverviewSource::Fallback;
    overview.note = "Market data unavailable, constant snapshot".to_string();
    overview
}

#[cfg(test)]
mod tests {
    use super::super::tencent::test_support::quote_line;
    use super::*;
    use crate::api::throttle::NoDelay;
    use crate::config::FetchConfig;
    use crate::error::ScreenerError;
    use crate::models::UniverseEntry;
    use crate::universe::StaticUniverse;
    use crate::Result;
    use mockito::Matcher;
    use std::sync::Arc;

    struct BrokenUniverse;

    impl UniverseProvider for BrokenUniverse {
        fn load(&self) -> Result<Vec<UniverseEntry>> {
            Err(ScreenerError::Universe("no source configured".into()))
        }
    }

    fn aggregator_for(url: &str, chunk_size: usize) -> MarketAggregator {
        let config = FetchConfig {
            quote_base_url: url.to_string(),
            max_requests_per_second: 1000,
            ..FetchConfig::default()
        };
        MarketAggregator::new(
            TencentSource::new(&config, Arc::new(NoDelay)).unwrap(),
            chunk_size,
        )
    }

    fn universe(codes: &[&str]) -> StaticUniverse {
        StaticUniverse::new(
            codes
                .iter()
                .map(|code| UniverseEntry {
                    code: code.to_string(),
                    name: format!("Stock {}", code),
                })
                .collect(),
        )
    }

    fn change_line(symbol: &str, change: &str) -> String {
        quote_line(symbol, &[(FIELD_NAME, symbol), (FIELD_PRICE, "10.0"), (FIELD_CHANGE_PCT, change)])
    }

    async fn mock_indices(server: &mut mockito::Server) -> mockito::Mock {
        let body = [
            change_line("sh000001", "1.0"),
            change_line("sz399001", "0.5"),
            change_line("sz399006", "-0.3"),
        ]
        .concat();
        server
            .mock("GET", "/q=sh000001,sz399001,sz399006")
            .with_body(body)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_live_overview_counts_chunks() {
        let mut server = mockito::Server::new_async().await;
        mock_indices(&mut server).await;
        server
            .mock("GET", "/q=sh600000,sh600001")
            .with_body([change_line("sh600000", "2.1"), change_line("sh600001", "-1.0")].concat())
            .create_async()
            .await;
        server
            .mock("GET", "/q=sz000001,sz000002")
            .with_body([change_line("sz000001", "0.00"), change_line("sz000002", "3.3")].concat())
            .create_async()
            .await;

        let aggregator = aggregator_for(&server.url(), 2);
        let overview = aggregator
            .get_market_overview(&universe(&["600000", "600001", "000001", "000002"]))
            .await;

        assert_eq!(overview.source, OverviewSource::Live);
        assert_eq!(overview.total_stocks, 4);
        assert_eq!(overview.rising_stocks, 2);
        assert_eq!(overview.falling_stocks, 1);
        assert_eq!(overview.flat_stocks, 1);
        assert_eq!(overview.rising_ratio, 50.0);
        assert_eq!(overview.indices.len(), 3);
        assert!((overview.avg_change_pct - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_one_failed_chunk_still_counts_others() {
        let mut server = mockito::Server::new_async().await;
        mock_indices(&mut server).await;
        server
            .mock("GET", "/q=sh600000,sh600001")
            .with_status(500)
            .create_async()
            .await;
        server
            .mock("GET", "/q=sz000001")
            .with_body(change_line("sz000001", "-2.0"))
            .create_async()
            .await;

        let aggregator = aggregator_for(&server.url(), 2);
        let overview = aggregator
            .get_market_overview(&universe(&["600000", "600001", "000001"]))
            .await;

        assert_eq!(overview.source, OverviewSource::Live);
        assert_eq!(overview.success_count, 1);
        assert_eq!(overview.falling_stocks, 1);
        assert_eq!(overview.rising_ratio, 0.0);
    }

    #[tokio::test]
    async fn test_all_chunks_failing_degrades_to_heuristic() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let aggregator = aggregator_for(&server.url(), 800);
        let overview = aggregator
            .get_market_overview(&universe(&["600000", "600001", "000001", "000002"]))
            .await;

        assert_eq!(overview.source, OverviewSource::Heuristic);
        assert_eq!(overview.total_stocks, 4);
        assert_eq!(overview.rising_ratio, 45.0);
        assert_eq!(overview.avg_change_pct, 0.2);
        assert!(overview.indices.is_empty());
    }

    #[tokio::test]
    async fn test_missing_universe_degrades_to_constant() {
        let mut server = mockito::Server::new_async().await;
        mock_indices(&mut server).await;

        let aggregator = aggregator_for(&server.url(), 800);
        let overview = aggregator.get_market_overview(&BrokenUniverse).await;

        assert_eq!(overview.source, OverviewSource::Fallback);
        assert_eq!(overview.total_stocks, 5000);
        assert_eq!(overview.rising_stocks, 2250);
        assert_eq!(overview.falling_stocks, 1750);
        assert_eq!(overview.rising_ratio, 45.0);
    }
}
