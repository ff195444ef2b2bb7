use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// One instrument of the screening universe
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UniverseEntry {
    pub code: String,
    pub name: String,
}

/// Normalized per-instrument record.
///
/// Every numeric field is optional: `None` means "unknown" and is never
/// treated as zero by scoring or filtering.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StockRecord {
    pub code: String,
    pub name: String,
    pub price: Option<f64>,
    pub change_pct: Option<f64>,
    pub volume: Option<u64>,
    pub turnover: Option<f64>,
    pub turnover_rate: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub pb_ratio: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub peg: Option<f64>,
    /// PB/PE approximation, not a reported ROE
    pub roe: Option<f64>,
    pub profit_growth: Option<f64>,
    pub momentum_20d: Option<f64>,
    pub financial_health_score: Option<u32>,
}

impl StockRecord {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Merge fundamentals into this record.
    ///
    /// Known values overwrite, unknown values leave the existing field alone,
    /// so the sentinel from a failed fetch is a no-op.
    pub fn merge_fundamentals(&mut self, fundamentals: &Fundamentals) {
        fn take(slot: &mut Option<f64>, value: Option<f64>) {
            if value.is_some() {
                *slot = value;
            }
        }

        take(&mut self.pe_ratio, fundamentals.pe_ratio);
        take(&mut self.pb_ratio, fundamentals.pb_ratio);
        take(&mut self.dividend_yield, fundamentals.dividend_yield);
        take(&mut self.peg, fundamentals.peg);
        take(&mut self.roe, fundamentals.roe);
        take(&mut self.profit_growth, fundamentals.profit_growth);
        take(&mut self.turnover_rate, fundamentals.turnover_rate);
        if fundamentals.financial_health_score.is_some() {
            self.financial_health_score = fundamentals.financial_health_score;
        }
    }
}

/// Valuation and dividend figures derived from the quote payload
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Fundamentals {
    pub pe_ratio: Option<f64>,
    pub pb_ratio: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub peg: Option<f64>,
    pub roe: Option<f64>,
    /// Set when the ROE approximation falls outside [-50, 50]
    pub roe_suspect: bool,
    pub profit_growth: Option<f64>,
    pub turnover_rate: Option<f64>,
    pub financial_health_score: Option<u32>,
}

impl Fundamentals {
    /// All-unknown record returned when every attempt failed
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn is_unknown(&self) -> bool {
        self == &Self::default()
    }
}

/// Daily front-adjusted bar
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
}

/// Benchmark index snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexQuote {
    pub symbol: String,
    pub name: String,
    pub price: Option<f64>,
    pub change_pct: f64,
}

/// Where a market overview came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OverviewSource {
    /// Counted from live quotes
    Live,
    /// Universe size known, breadth assumed
    Heuristic,
    /// Nothing reachable, constant snapshot
    Fallback,
}

/// Market breadth summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketOverview {
    pub total_stocks: usize,
    pub rising_stocks: usize,
    pub falling_stocks: usize,
    pub flat_stocks: usize,
    pub rising_ratio: f64,
    pub avg_change_pct: f64,
    pub indices: Vec<IndexQuote>,
    pub success_count: usize,
    pub source: OverviewSource,
    pub note: String,
    pub updated_at: DateTime<Utc>,
}

impl MarketOverview {
    pub fn sentiment(&self) -> Sentiment {
        let ratio = self.rising_ratio;
        let avg = self.avg_change_pct;

        if ratio > 70.0 && avg > 1.0 {
            Sentiment::StrongRally
        } else if ratio > 60.0 && avg > 0.5 {
            Sentiment::LeaningStrong
        } else if ratio > 40.0 {
            Sentiment::RangeBound
        } else if ratio > 30.0 {
            Sentiment::LeaningWeak
        } else {
            Sentiment::WeakDecline
        }
    }
}

/// Coarse label for market breadth
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Sentiment {
    StrongRally,
    LeaningStrong,
    RangeBound,
    LeaningWeak,
    WeakDecline,
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Sentiment::StrongRally => "strong rally",
            Sentiment::LeaningStrong => "leaning strong",
            Sentiment::RangeBound => "range-bound",
            Sentiment::LeaningWeak => "leaning weak",
            Sentiment::WeakDecline => "weak decline",
        };
        f.write_str(label)
    }
}

/// Letter bucket for the strength score
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    A,
    #[serde(rename = "B+")]
    BPlus,
    B,
    C,
    D,
}

impl Grade {
    pub fn from_total(total: u32) -> Self {
        match total {
            85.. => Grade::APlus,
            75..=84 => Grade::A,
            65..=74 => Grade::BPlus,
            55..=64 => Grade::B,
            45..=54 => Grade::C,
            _ => Grade::D,
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
        };
        f.write_str(label)
    }
}

/// Five-category strength score
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub technical: u32,
    pub valuation: u32,
    pub profitability: u32,
    pub safety: u32,
    pub dividend: u32,
    pub total: u32,
    pub grade: Grade,
}

impl ScoreBreakdown {
    /// Sentinel used when a record cannot be scored
    pub fn zero() -> Self {
        Self {
            technical: 0,
            valuation: 0,
            profitability: 0,
            safety: 0,
            dividend: 0,
            total: 0,
            grade: Grade::D,
        }
    }
}

/// Result of a single fetch.
///
/// `Absent` means the source answered but holds nothing usable for the code;
/// `Failed` means every attempt errored.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    Fetched(T),
    Absent,
    Failed,
}

impl<T> FetchOutcome<T> {
    pub fn fetched(self) -> Option<T> {
        match self {
            FetchOutcome::Fetched(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FetchOutcome::Failed)
    }
}

/// Codes whose fetch exhausted its retries during one run.
///
/// Insertion order is kept so the deferred retry pass replays failures in
/// the order they happened.
#[derive(Debug, Clone, Default)]
pub struct FailedSymbols {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl FailedSymbols {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: &str) {
        if self.seen.insert(code.to_string()) {
            self.order.push(code.to_string());
        }
    }

    pub fn contains(&self, code: &str) -> bool {
        self.seen.contains(code)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn codes(&self) -> &[String] {
        &self.order
    }

    /// Empty the set, handing back the codes in failure order
    pub fn drain(&mut self) -> Vec<String> {
        self.seen.clear();
        std::mem::take(&mut self.order)
    }
}
