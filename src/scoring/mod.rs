// Strength scoring
// Five capped categories summed into a 0-100 total and a letter grade

use crate::error::ScreenerError;
use crate::models::{Grade, ScoreBreakdown, StockRecord};
use crate::Result;

/// Deterministic multi-factor scorer.
///
/// Unknown inputs earn nothing for their sub-criterion. A record that
/// cannot be scored gets [`ScoreBreakdown::zero`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringEngine;

impl ScoringEngine {
    pub fn new() -> Self {
        Self
    }

    /// Score a record; never fails
    pub fn compute_score(&self, record: &StockRecord) -> ScoreBreakdown {
        match self.try_score(record) {
            Ok(score) => score,
            Err(e) => {
                tracing::warn!("Scoring {} failed: {}", record.code, e);
                ScoreBreakdown::zero()
            }
        }
    }

    pub fn try_score(&self, record: &StockRecord) -> Result<ScoreBreakdown> {
        let inputs = [
            ("price", record.price),
            ("change_pct", record.change_pct),
            ("turnover_rate", record.turnover_rate),
            ("pe_ratio", record.pe_ratio),
            ("pb_ratio", record.pb_ratio),
            ("peg", record.peg),
            ("roe", record.roe),
            ("profit_growth", record.profit_growth),
            ("dividend_yield", record.dividend_yield),
            ("momentum_20d", record.momentum_20d),
        ];
        for (field, value) in inputs {
            if let Some(value) = value {
                if !value.is_finite() {
                    return Err(ScreenerError::Scoring(format!(
                        "{} of {} is not finite ({})",
                        field, record.code, value
                    )));
                }
            }
        }

        let technical = change_points(record.change_pct)
            + momentum_points(record.momentum_20d)
            + liquidity_points(record.turnover_rate);
        let valuation = pe_points(record.pe_ratio)
            + pb_points(record.pb_ratio)
            + peg_points(record.peg);
        let profitability = roe_points(record.roe) + growth_points(record.profit_growth);
        let safety = book_margin_points(record.pb_ratio)
            + dividend_stability_points(record.dividend_yield)
            + low_turnover_points(record.turnover_rate);
        let dividend = dividend_points(record.dividend_yield);

        let total = technical + valuation + profitability + safety + dividend;

        Ok(ScoreBreakdown {
            technical,
            valuation,
            profitability,
            safety,
            dividend,
            total,
            grade: Grade::from_total(total),
        })
    }
}

// ====== Technical (30) ======

fn change_points(change_pct: Option<f64>) -> u32 {
    match change_pct {
        Some(c) if c > 5.0 => 10,
        Some(c) if c > 2.0 => 7,
        Some(c) if c > 0.0 => 4,
        Some(c) if c > -2.0 => 2,
        _ => 0,
    }
}

fn momentum_points(momentum: Option<f64>) -> u32 {
    match momentum {
        Some(m) if m > 15.0 => 15,
        Some(m) if m > 10.0 => 12,
        Some(m) if m > 5.0 => 8,
        Some(m) if m > 0.0 => 4,
        _ => 0,
    }
}

/// Moderate turnover scores best; 8% and above is treated as speculative
fn liquidity_points(turnover_rate: Option<f64>) -> u32 {
    match turnover_rate {
        Some(t) if (1.0..3.0).contains(&t) => 5,
        Some(t) if (3.0..5.0).contains(&t) => 4,
        Some(t) if (5.0..8.0).contains(&t) => 3,
        Some(t) if (0.5..1.0).contains(&t) => 2,
        Some(t) if t >= 8.0 => 1,
        _ => 0,
    }
}

// ====== Valuation (25) ======

fn pe_points(pe: Option<f64>) -> u32 {
    match pe {
        Some(pe) if pe > 0.0 && pe < 10.0 => 10,
        Some(pe) if (10.0..20.0).contains(&pe) => 7,
        Some(pe) if (20.0..30.0).contains(&pe) => 4,
        _ => 0,
    }
}

fn pb_points(pb: Option<f64>) -> u32 {
    match pb {
        Some(pb) if pb > 0.0 && pb < 2.0 => 10,
        Some(pb) if (2.0..4.0).contains(&pb) => 8,
        Some(pb) if (4.0..7.0).contains(&pb) => 5,
        Some(pb) if (7.0..10.0).contains(&pb) => 2,
        _ => 0,
    }
}

fn peg_points(peg: Option<f64>) -> u32 {
    match peg {
        Some(peg) if peg > 0.0 && peg < 1.0 => 5,
        Some(peg) if (1.0..1.5).contains(&peg) => 3,
        Some(peg) if (1.5..2.0).contains(&peg) => 1,
        _ => 0,
    }
}

// ====== Profitability (30) ======

fn roe_points(roe: Option<f64>) -> u32 {
    match roe {
        Some(r) if r > 20.0 => 15,
        Some(r) if r > 15.0 => 12,
        Some(r) if r > 10.0 => 8,
        Some(r) if r > 5.0 => 4,
        _ => 0,
    }
}

fn growth_points(growth: Option<f64>) -> u32 {
    match growth {
        Some(g) if g > 30.0 => 15,
        Some(g) if g > 20.0 => 12,
        Some(g) if g > 10.0 => 8,
        Some(g) if g > 0.0 => 4,
        _ => 0,
    }
}

// ====== Safety (10) ======

fn book_margin_points(pb: Option<f64>) -> u32 {
    match pb {
        Some(pb) if pb > 0.0 && pb < 1.0 => 3,
        Some(pb) if (1.0..1.5).contains(&pb) => 2,
        Some(pb) if (1.5..2.5).contains(&pb) => 1,
        _ => 0,
    }
}

fn dividend_stability_points(dividend_yield: Option<f64>) -> u32 {
    match dividend_yield {
        Some(y) if y > 5.0 => 3,
        Some(y) if y > 3.0 => 2,
        Some(y) if y > 1.0 => 1,
        _ => 0,
    }
}

/// Inverse of the liquidity bucket: calm turnover is safer
fn low_turnover_points(turnover_rate: Option<f64>) -> u32 {
    match turnover_rate {
        Some(t) if t > 0.0 && t < 2.0 => 4,
        Some(t) if (2.0..5.0).contains(&t) => 3,
        Some(t) if (5.0..10.0).contains(&t) => 1,
        _ => 0,
    }
}

// ====== Dividend (5) ======

fn dividend_points(dividend_yield: Option<f64>) -> u32 {
    match dividend_yield {
        Some(y) if y > 5.0 => 5,
        Some(y) if y > 3.0 => 4,
        Some(y) if y > 2.0 => 2,
        Some(y) if y > 0.0 => 1,
        _ => 0,
    }
}
