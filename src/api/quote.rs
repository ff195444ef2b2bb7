use super::tencent::{
    market_symbol, parse_quote_entries, TencentSource, FIELD_CHANGE_PCT, FIELD_NAME, FIELD_PE,
    FIELD_PRICE, FIELD_TURNOVER, FIELD_TURNOVER_RATE, FIELD_VOLUME,
};
use super::throttle::{pause, Pause, RetryPolicy};
use crate::error::ScreenerError;
use crate::models::{FailedSymbols, FetchOutcome, StockRecord};
use crate::Result;
use std::collections::HashSet;

/// Payloads shorter than this cannot carry the turnover-rate field
const MIN_QUOTE_FIELDS: usize = 57;

/// How hard to pace a batch between symbols
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Quotes only
    Light,
    /// Each symbol also pulls history and fundamentals
    Deep,
}

/// Result of a sequential quote batch
#[derive(Debug, Default)]
pub struct QuoteBatch {
    /// Main-pass records in input order, followed by recovered records
    pub records: Vec<StockRecord>,
    /// Codes recovered by the deferred retry pass
    pub recovered: Vec<String>,
    /// Codes that failed the main pass and the retry pass
    pub failed: FailedSymbols,
}

/// Extra per-record work done inside a batch, between the quote and the
/// pacing pause
pub(crate) trait RecordHook {
    async fn on_record(&mut self, record: &mut StockRecord);
}

struct NoHook;

impl RecordHook for NoHook {
    async fn on_record(&mut self, _record: &mut StockRecord) {}
}

/// Real-time quote client
#[derive(Clone)]
pub struct QuoteClient {
    source: TencentSource,
    policy: RetryPolicy,
}

impl QuoteClient {
    pub fn new(source: TencentSource) -> Self {
        Self {
            source,
            policy: RetryPolicy::QUOTE,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fetch one quote, recording the code in `failed` when every attempt errors.
    ///
    /// Returns `None` both for exhausted retries and for instruments without
    /// a positive price; a returned record always has `price > 0`.
    pub async fn get_quote(&self, code: &str, failed: &mut FailedSymbols) -> Option<StockRecord> {
        match self.fetch_quote(code).await {
            FetchOutcome::Fetched(record) => Some(record),
            FetchOutcome::Absent => None,
            FetchOutcome::Failed => {
                failed.insert(code);
                None
            }
        }
    }

    /// Fetch one quote, distinguishing "no data" from "fetch failed"
    pub async fn fetch_quote(&self, code: &str) -> FetchOutcome<StockRecord> {
        let symbol = market_symbol(code);
        self.source
            .with_retry(&symbol, self.policy, || self.fetch_quote_once(code, &symbol))
            .await
    }

    async fn fetch_quote_once(&self, code: &str, symbol: &str) -> Result<Option<StockRecord>> {
        let url = self.source.quote_url(symbol);
        let body = self.source.get_text(&url, &[], self.policy.timeout).await?;
        parse_quote(code, symbol, &body)
    }

    /// Quote every code in order, then give the failures one more pass.
    ///
    /// Duplicates are skipped. The deferred pass starts only after the main
    /// pass has finished and uses slower, fixed pacing.
    pub async fn get_quotes_batch(&self, codes: &[String], pacing: Pacing) -> QuoteBatch {
        self.get_quotes_batch_with(codes, pacing, &mut NoHook).await
    }

    /// [`get_quotes_batch`](Self::get_quotes_batch) running `hook` on each
    /// record right after its quote arrives, recovered records included.
    pub(crate) async fn get_quotes_batch_with<H: RecordHook>(
        &self,
        codes: &[String],
        pacing: Pacing,
        hook: &mut H,
    ) -> QuoteBatch {
        let mut batch = QuoteBatch::default();
        let mut seen = HashSet::new();
        let deep = pacing == Pacing::Deep;

        for (index, code) in codes.iter().enumerate() {
            if !seen.insert(code.as_str()) {
                tracing::warn!("Skipping duplicate code {}", code);
                continue;
            }

            if let Some(mut record) = self.get_quote(code, &mut batch.failed).await {
                hook.on_record(&mut record).await;
                batch.records.push(record);
            }

            if (index + 1) % 50 == 0 {
                tracing::info!("Progress: {}/{} codes", index + 1, codes.len());
            }

            pause(self.source.throttle(), Pause::Pacing { index, deep }).await;
        }

        tracing::info!(
            "Quote pass finished: {} requested, {} fetched, {} failed",
            codes.len(),
            batch.records.len(),
            batch.failed.len()
        );

        if !batch.failed.is_empty() {
            let recovered = self.retry_failed(&mut batch.failed).await;
            for mut record in recovered {
                hook.on_record(&mut record).await;
                batch.recovered.push(record.code.clone());
                batch.records.push(record);
            }
        }

        batch
    }

    /// Deferred pass over `failed` after a cool-down.
    ///
    /// Codes that fail again are put back into `failed`.
    pub async fn retry_failed(&self, failed: &mut FailedSymbols) -> Vec<StockRecord> {
        let pending = failed.drain();
        let mut recovered = Vec::new();
        if pending.is_empty() {
            return recovered;
        }

        tracing::info!("Retrying {} failed codes after a cool-down", pending.len());
        pause(self.source.throttle(), Pause::RecoveryWait).await;

        for (i, code) in pending.iter().enumerate() {
            if let Some(record) = self.get_quote(code, failed).await {
                tracing::info!("✓ Recovered {} ({}/{})", code, i + 1, pending.len());
                recovered.push(record);
            }
            pause(self.source.throttle(), Pause::RecoveryPacing).await;
        }

        tracing::info!(
            "Retry pass recovered {} of {} codes",
            recovered.len(),
            pending.len()
        );
        recovered
    }
}

/// Normalize a single-symbol quote response.
///
/// A non-positive or missing price yields `Ok(None)`; so does the
/// source's "no such symbol" marker. Anything unparseable is an error.
pub(crate) fn parse_quote(code: &str, symbol: &str, body: &str) -> Result<Option<StockRecord>> {
    let entries = parse_quote_entries(body);
    let entry = entries
        .first()
        .ok_or_else(|| ScreenerError::malformed(symbol, "no quote entry in response"))?;

    if entry.is_no_match() {
        return Ok(None);
    }
    if entry.len() < MIN_QUOTE_FIELDS {
        return Err(ScreenerError::malformed(
            symbol,
            format!("expected at least {} fields, got {}", MIN_QUOTE_FIELDS, entry.len()),
        ));
    }

    let price = match entry.number(FIELD_PRICE) {
        Some(price) if price > 0.0 => price,
        _ => return Ok(None),
    };

    let mut record = StockRecord::new(code, entry.text(FIELD_NAME).unwrap_or_default());
    record.price = Some(price);
    record.change_pct = entry.number(FIELD_CHANGE_PCT);
    // Non-positive PE means loss-making or unknown
    record.pe_ratio = entry.number(FIELD_PE).filter(|pe| *pe > 0.0);
    record.volume = entry
        .number(FIELD_VOLUME)
        .filter(|volume| *volume >= 0.0)
        .map(|volume| volume as u64);
    record.turnover = entry.number(FIELD_TURNOVER);
    record.turnover_rate = entry.number(FIELD_TURNOVER_RATE);

    Ok(Some(record))
}
