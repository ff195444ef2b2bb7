use super::fundamentals::FundamentalClient;
use super::history::HistoryClient;
use super::quote::{Pacing, QuoteClient, RecordHook};
use crate::indicators::compute_momentum;
use crate::models::{FailedSymbols, StockRecord};

/// What to pull per symbol besides the quote
#[derive(Debug, Clone, Copy)]
pub struct CollectOptions {
    pub with_momentum: bool,
    pub with_fundamentals: bool,
    /// History length requested per symbol
    pub history_days: usize,
    /// Momentum window within that history
    pub momentum_days: usize,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            with_momentum: true,
            with_fundamentals: true,
            history_days: 30,
            momentum_days: 20,
        }
    }
}

#[derive(Debug, Default)]
pub struct CollectedBatch {
    pub records: Vec<StockRecord>,
    /// Codes still failing after the deferred pass
    pub failed: FailedSymbols,
}

#[derive(Debug, Default)]
struct EnrichTally {
    momentum_ok: usize,
    momentum_missing: usize,
    fundamentals_ok: usize,
    fundamentals_missing: usize,
}

/// Per-symbol assembly of quote, momentum and fundamentals
#[derive(Clone)]
pub struct StockDataCollector {
    quotes: QuoteClient,
    history: HistoryClient,
    fundamentals: FundamentalClient,
}

impl StockDataCollector {
    pub fn new(quotes: QuoteClient, history: HistoryClient, fundamentals: FundamentalClient) -> Self {
        Self {
            quotes,
            history,
            fundamentals,
        }
    }

    pub fn quotes(&self) -> &QuoteClient {
        &self.quotes
    }

    pub fn history(&self) -> &HistoryClient {
        &self.history
    }

    /// Collect records for `codes` sequentially.
    ///
    /// Never fails: a code whose quote exhausts retries is reported in
    /// `failed`; missing history or fundamentals leave fields unknown.
    pub async fn collect(&self, codes: &[String], options: CollectOptions) -> CollectedBatch {
        tracing::info!(
            "Collecting {} codes (momentum: {}, fundamentals: {})",
            codes.len(),
            options.with_momentum,
            options.with_fundamentals
        );

        let pacing = if options.with_momentum {
            Pacing::Deep
        } else {
            Pacing::Light
        };
        let mut enricher = Enricher {
            collector: self,
            options,
            tally: EnrichTally::default(),
        };
        let batch = self
            .quotes
            .get_quotes_batch_with(codes, pacing, &mut enricher)
            .await;
        let tally = enricher.tally;

        tracing::info!(
            "✓ Collected {} records ({} recovered), {} codes failed",
            batch.records.len(),
            batch.recovered.len(),
            batch.failed.len()
        );
        if options.with_momentum {
            tracing::info!(
                "Momentum: {} computed, {} without history",
                tally.momentum_ok,
                tally.momentum_missing
            );
        }
        if options.with_fundamentals {
            tracing::info!(
                "Fundamentals: {} fetched, {} unknown",
                tally.fundamentals_ok,
                tally.fundamentals_missing
            );
        }

        CollectedBatch {
            records: batch.records,
            failed: batch.failed,
        }
    }
}

/// Momentum and fundamentals for each quoted record
struct Enricher<'a> {
    collector: &'a StockDataCollector,
    options: CollectOptions,
    tally: EnrichTally,
}

impl RecordHook for Enricher<'_> {
    async fn on_record(&mut self, record: &mut StockRecord) {
        if self.options.with_momentum {
            let bars = self
                .collector
                .history
                .get_history(&record.code, self.options.history_days)
                .await;
            if bars.is_empty() {
                self.tally.momentum_missing += 1;
            } else {
                self.tally.momentum_ok += 1;
            }
            let closes: Vec<f64> = bars.iter().map(|bar| bar.close).collect();
            record.momentum_20d = Some(compute_momentum(&closes, self.options.momentum_days));
        }

        if self.options.with_fundamentals {
            let fundamentals = self.collector.fundamentals.get_fundamentals(&record.code).await;
            if fundamentals.is_unknown() {
                self.tally.fundamentals_missing += 1;
            } else {
                self.tally.fundamentals_ok += 1;
            }
            record.merge_fundamentals(&fundamentals);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::history::test_support::kline_body;
    use super::super::tencent::test_support::quote_line;
    use super::super::tencent::{
        TencentSource, FIELD_CHANGE_PCT, FIELD_NAME, FIELD_PB, FIELD_PE, FIELD_PRICE,
        FIELD_TURNOVER_RATE,
    };
    use super::super::throttle::{NoDelay, Pause, Throttle};
    use super::*;
    use crate::config::{AssumedGrowth, DividendOverrideTable, FetchConfig};
    use mockito::Matcher;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingThrottle {
        pauses: Mutex<Vec<Pause>>,
    }

    impl Throttle for RecordingThrottle {
        fn delay(&self, pause: Pause) -> Duration {
            self.pauses.lock().unwrap().push(pause);
            Duration::ZERO
        }

        fn user_agent(&self) -> &'static str {
            NoDelay.user_agent()
        }
    }

    fn collector_for(url: &str) -> StockDataCollector {
        collector_with(url, Arc::new(NoDelay))
    }

    fn collector_with(url: &str, throttle: Arc<dyn Throttle>) -> StockDataCollector {
        let config = FetchConfig {
            quote_base_url: url.to_string(),
            kline_base_url: url.to_string(),
            max_requests_per_second: 1000,
            ..FetchConfig::default()
        };
        let source = TencentSource::new(&config, throttle).unwrap();
        StockDataCollector::new(
            QuoteClient::new(source.clone()),
            HistoryClient::new(source.clone(), Duration::from_secs(3600)),
            FundamentalClient::new(
                source,
                DividendOverrideTable::empty(),
                AssumedGrowth::default(),
            ),
        )
    }

    fn full_line(symbol: &str) -> String {
        quote_line(
            symbol,
            &[
                (FIELD_NAME, "Test Bank"),
                (FIELD_PRICE, "10.00"),
                (FIELD_CHANGE_PCT, "1.50"),
                (FIELD_PE, "8.00"),
                (FIELD_PB, "0.80"),
                (FIELD_TURNOVER_RATE, "2.00"),
            ],
        )
    }

    #[tokio::test]
    async fn test_collect_enriches_records() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/q=sh600000")
            .with_body(full_line("sh600000"))
            .create_async()
            .await;
        server
            .mock("GET", Matcher::Regex(r"^/appstock/app/fqkline/get".to_string()))
            .with_body(kline_body("sh600000", 30, 100.0, 1.0))
            .create_async()
            .await;

        let collector = collector_for(&server.url());
        let codes = vec!["600000".to_string(), "600000".to_string()];
        let batch = collector.collect(&codes, CollectOptions::default()).await;

        assert_eq!(batch.records.len(), 1);
        assert!(batch.failed.is_empty());

        let record = &batch.records[0];
        assert_eq!(record.price, Some(10.0));
        assert_eq!(record.pb_ratio, Some(0.8));
        // pb/pe * 100
        assert!((record.roe.unwrap() - 10.0).abs() < 1e-9);
        assert!((record.momentum_20d.unwrap() - (129.0 / 110.0 - 1.0) * 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_collect_without_enrichment_leaves_fields_unknown() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/q=sz000001")
            .with_body(full_line("sz000001"))
            .expect(1)
            .create_async()
            .await;

        let collector = collector_for(&server.url());
        let options = CollectOptions {
            with_momentum: false,
            with_fundamentals: false,
            ..CollectOptions::default()
        };
        let batch = collector.collect(&["000001".to_string()], options).await;

        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].momentum_20d, None);
        assert_eq!(batch.records[0].roe, None);
        assert_eq!(batch.records[0].pe_ratio, Some(8.0));
    }

    #[tokio::test]
    async fn test_collect_reports_failed_codes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/q=sh600000")
            .with_body(full_line("sh600000"))
            .create_async()
            .await;
        // main pass and deferred pass, five attempts each
        let failing = server
            .mock("GET", "/q=sz000999")
            .with_status(500)
            .expect(10)
            .create_async()
            .await;

        let collector = collector_for(&server.url());
        let options = CollectOptions {
            with_momentum: false,
            with_fundamentals: false,
            ..CollectOptions::default()
        };
        let codes = vec!["600000".to_string(), "000999".to_string()];
        let batch = collector.collect(&codes, options).await;

        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.failed.codes(), &["000999".to_string()]);
        failing.assert_async().await;
    }

    #[tokio::test]
    async fn test_collect_with_momentum_paces_deep() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/q=sh600000")
            .with_body(full_line("sh600000"))
            .create_async()
            .await;
        server
            .mock("GET", Matcher::Regex(r"^/appstock/app/fqkline/get".to_string()))
            .with_body(kline_body("sh600000", 30, 100.0, 1.0))
            .create_async()
            .await;

        let throttle = Arc::new(RecordingThrottle::default());
        let collector = collector_with(&server.url(), throttle.clone());
        let options = CollectOptions {
            with_fundamentals: false,
            ..CollectOptions::default()
        };
        let batch = collector.collect(&["600000".to_string()], options).await;

        assert_eq!(batch.records.len(), 1);
        assert!(batch.records[0].momentum_20d.unwrap() > 0.0);
        assert_eq!(
            *throttle.pauses.lock().unwrap(),
            vec![Pause::Pacing {
                index: 0,
                deep: true
            }]
        );
    }
}
