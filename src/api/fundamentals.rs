use super::tencent::{
    market_symbol, parse_quote_entries, TencentSource, FIELD_API_DIVIDEND_YIELD,
    FIELD_DIVIDEND_PER_SHARE, FIELD_PB, FIELD_PE, FIELD_PRICE, FIELD_TURNOVER_RATE,
};
use super::throttle::RetryPolicy;
use crate::config::{AssumedGrowth, DividendOverrideTable};
use crate::error::ScreenerError;
use crate::models::{FetchOutcome, Fundamentals};
use crate::Result;

/// Payloads must reach the API dividend-yield field
const MIN_FUNDAMENTAL_FIELDS: usize = 53;
/// Yields above this are treated as unit or data errors
const MAX_PLAUSIBLE_YIELD: f64 = 20.0;
const ROE_PLAUSIBLE_RANGE: (f64, f64) = (-50.0, 50.0);
const MAX_PAYOUT_RATIO: f64 = 0.9;
const DEFAULT_PAYOUT_RATIO: f64 = 0.5;

/// Valuation and dividend client.
///
/// Shares the quote endpoint with [`super::QuoteClient`] but reads the
/// valuation fields and derives the approximated metrics.
#[derive(Clone)]
pub struct FundamentalClient {
    source: TencentSource,
    overrides: DividendOverrideTable,
    growth: AssumedGrowth,
    policy: RetryPolicy,
}

impl FundamentalClient {
    pub fn new(
        source: TencentSource,
        overrides: DividendOverrideTable,
        growth: AssumedGrowth,
    ) -> Self {
        Self {
            source,
            overrides,
            growth,
            policy: RetryPolicy::FUNDAMENTALS,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fetch fundamentals; never fails, exhausted retries yield
    /// [`Fundamentals::unknown`].
    pub async fn get_fundamentals(&self, code: &str) -> Fundamentals {
        self.fetch_fundamentals(code)
            .await
            .fetched()
            .unwrap_or_else(Fundamentals::unknown)
    }

    pub async fn fetch_fundamentals(&self, code: &str) -> FetchOutcome<Fundamentals> {
        let symbol = market_symbol(code);
        let label = format!("{} fundamentals", symbol);
        self.source
            .with_retry(&label, self.policy, || self.fetch_once(code, &symbol))
            .await
    }

    async fn fetch_once(&self, code: &str, symbol: &str) -> Result<Option<Fundamentals>> {
        let url = self.source.quote_url(symbol);
        let body = self.source.get_text(&url, &[], self.policy.timeout).await?;
        self.parse(code, symbol, &body)
    }

    fn parse(&self, code: &str, symbol: &str, body: &str) -> Result<Option<Fundamentals>> {
        let entries = parse_quote_entries(body);
        let entry = entries
            .first()
            .ok_or_else(|| ScreenerError::malformed(symbol, "no quote entry in response"))?;

        if entry.is_no_match() {
            return Ok(None);
        }
        if entry.len() < MIN_FUNDAMENTAL_FIELDS {
            return Err(ScreenerError::malformed(
                symbol,
                format!(
                    "expected at least {} fields, got {}",
                    MIN_FUNDAMENTAL_FIELDS,
                    entry.len()
                ),
            ));
        }

        let raw = RawFundamentals {
            price: entry.number(FIELD_PRICE),
            pe: entry.number(FIELD_PE),
            pb: entry.number(FIELD_PB),
            api_dividend_yield: entry.number(FIELD_API_DIVIDEND_YIELD),
            dividend_per_share: entry.number(FIELD_DIVIDEND_PER_SHARE),
            turnover_rate: entry.number(FIELD_TURNOVER_RATE),
        };

        Ok(Some(derive_fundamentals(code, &raw, &self.overrides, &self.growth)))
    }
}

/// Fields read straight off the payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFundamentals {
    pub price: Option<f64>,
    pub pe: Option<f64>,
    pub pb: Option<f64>,
    pub api_dividend_yield: Option<f64>,
    pub dividend_per_share: Option<f64>,
    pub turnover_rate: Option<f64>,
}

/// Turn raw payload figures into [`Fundamentals`].
///
/// ROE here is PB/PE, an approximation rather than reported return on
/// equity; values outside [-50, 50] are kept and flagged.
pub fn derive_fundamentals(
    code: &str,
    raw: &RawFundamentals,
    overrides: &DividendOverrideTable,
    growth: &AssumedGrowth,
) -> Fundamentals {
    let pb = raw.pb.filter(|pb| *pb > 0.0);
    let pe = raw.pe.filter(|pe| *pe > 0.0);

    let dividend_yield = resolve_dividend_yield(
        code,
        raw.price,
        raw.dividend_per_share,
        raw.api_dividend_yield,
        overrides,
    );

    let peg = pe.map(|pe| pe / growth.for_pb(pb));

    let roe = match (pb, pe) {
        (Some(pb), Some(pe)) => Some(pb / pe * 100.0),
        _ => None,
    };
    let roe_suspect = roe
        .map(|roe| roe < ROE_PLAUSIBLE_RANGE.0 || roe > ROE_PLAUSIBLE_RANGE.1)
        .unwrap_or(false);
    if roe_suspect {
        tracing::debug!(
            "{} ROE approximation {:.2}% out of range (PB={:?}, PE={:?})",
            code,
            roe.unwrap_or_default(),
            pb,
            pe
        );
    }

    let profit_growth = estimate_profit_growth(roe, dividend_yield);

    Fundamentals {
        pe_ratio: pe,
        pb_ratio: pb,
        dividend_yield,
        peg,
        roe,
        roe_suspect,
        profit_growth,
        turnover_rate: raw.turnover_rate,
        financial_health_score: Some(financial_health_score(
            pb,
            dividend_yield,
            pe,
            raw.turnover_rate,
        )),
    }
}

/// Dividend yield in percent, by priority: manual override, per-share
/// dividend over price (with a cents-to-yuan retry), then the API figure.
///
/// Implausible values are dropped to unknown rather than clamped.
pub fn resolve_dividend_yield(
    code: &str,
    price: Option<f64>,
    dividend_per_share: Option<f64>,
    api_yield: Option<f64>,
    overrides: &DividendOverrideTable,
) -> Option<f64> {
    if let Some(manual) = overrides.dividend_yield(code) {
        tracing::debug!("{} using manual dividend yield {}%", code, manual);
        return Some(manual);
    }

    if let (Some(price), Some(dps)) = (price, dividend_per_share) {
        if price > 0.0 && dps > 0.0 {
            let computed = dps / price * 100.0;
            if computed <= MAX_PLAUSIBLE_YIELD {
                return Some(computed);
            }

            let adjusted = (dps / 100.0) / price * 100.0;
            if adjusted > 0.0 && adjusted <= MAX_PLAUSIBLE_YIELD {
                tracing::debug!(
                    "{} per-share dividend read as cents, yield {:.2}%",
                    code,
                    adjusted
                );
                return Some(adjusted);
            }

            tracing::warn!(
                "{} computed dividend yield {:.2}% is implausible",
                code,
                computed
            );
        }
    }

    match api_yield {
        Some(api) if (0.0..=MAX_PLAUSIBLE_YIELD).contains(&api) => Some(api),
        Some(api) => {
            tracing::warn!(
                "{} API dividend yield {}% outside 0-20%, ignoring",
                code,
                api
            );
            None
        }
        None => None,
    }
}

/// roe × (1 − payout), payout = min(yield/roe, 0.9) for positive ROE else 0.5
pub fn estimate_profit_growth(roe: Option<f64>, dividend_yield: Option<f64>) -> Option<f64> {
    let (roe, dividend_yield) = (roe?, dividend_yield?);
    let payout = if roe > 0.0 {
        (dividend_yield / roe).min(MAX_PAYOUT_RATIO)
    } else {
        DEFAULT_PAYOUT_RATIO
    };
    let growth = roe * (1.0 - payout);
    growth.is_finite().then_some(growth)
}

/// 50 ± PB, dividend, PE and turnover bands, clamped to 0..=100
pub fn financial_health_score(
    pb: Option<f64>,
    dividend_yield: Option<f64>,
    pe: Option<f64>,
    turnover_rate: Option<f64>,
) -> u32 {
    let mut score: i32 = 50;

    if let Some(pb) = pb {
        score += if pb < 1.0 {
            20
        } else if pb < 2.0 {
            10
        } else if pb > 10.0 {
            -20
        } else if pb > 5.0 {
            -10
        } else {
            0
        };
    }

    if let Some(dy) = dividend_yield {
        score += if dy > 5.0 {
            15
        } else if dy > 3.0 {
            10
        } else if dy > 2.0 {
            5
        } else if dy < 1.0 {
            -5
        } else {
            0
        };
    }

    if let Some(pe) = pe {
        score += if pe > 10.0 && pe < 20.0 {
            10
        } else if (20.0..30.0).contains(&pe) {
            5
        } else if pe >= 50.0 {
            -10
        } else {
            0
        };
    }

    if let Some(turnover) = turnover_rate {
        score += if turnover > 1.0 && turnover < 5.0 {
            5
        } else if turnover > 20.0 {
            -5
        } else {
            0
        };
    }

    score.clamp(0, 100) as u32
}
