use crate::selection::SelectedStock;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Average return above which a day counts as excellent
const EXCELLENT_AVG_RETURN: f64 = 2.0;
/// Share of rising picks a strategy needs to be called effective
const EFFECTIVE_SUCCESS_RATE: f64 = 50.0;

/// How one pick did on the evaluation date
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PickPerformance {
    pub rank: usize,
    pub code: String,
    pub name: String,
    pub original_price: Option<f64>,
    /// Close on the evaluation date; unknown when no bar exists for it
    pub next_price: Option<f64>,
    pub return_pct: Option<f64>,
    pub score: u32,
    pub reason: String,
}

impl PickPerformance {
    /// Pair a pick with the close it reached, if any
    pub fn from_pick(pick: &SelectedStock, next_price: Option<f64>) -> Self {
        let original_price = pick.record.price;
        let return_pct = match (original_price, next_price) {
            (Some(from), Some(to)) if from > 0.0 && to.is_finite() => Some((to / from - 1.0) * 100.0),
            _ => None,
        };

        Self {
            rank: pick.rank,
            code: pick.record.code.clone(),
            name: pick.record.name.clone(),
            original_price,
            next_price,
            return_pct,
            score: pick.score.total,
            reason: pick.reason.clone(),
        }
    }
}

/// Overall judgement of a backtested day
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Verdict {
    Excellent,
    Good,
    NeedsImprovement,
    /// No pick had a known return
    Inconclusive,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Excellent => write!(f, "excellent"),
            Verdict::Good => write!(f, "good"),
            Verdict::NeedsImprovement => write!(f, "needs improvement"),
            Verdict::Inconclusive => write!(f, "inconclusive"),
        }
    }
}

/// Next-day performance of a set of picks.
///
/// Statistics cover only picks with a known return; the rest are counted
/// in `unknown`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceSummary {
    pub target_date: NaiveDate,
    pub picks: Vec<PickPerformance>,
    pub evaluated: usize,
    pub unknown: usize,

    // Return distribution
    pub avg_return: Option<f64>,
    pub total_return: Option<f64>,
    pub max_return: Option<f64>,
    pub min_return: Option<f64>,

    // Hit rate
    pub positive_count: usize,
    pub success_rate: Option<f64>,

    pub best: Option<PickPerformance>,
    pub worst: Option<PickPerformance>,

    pub verdict: Verdict,
    /// Positive average return with more than half of the picks rising
    pub effective: bool,
}

impl PerformanceSummary {
    pub fn from_results(target_date: NaiveDate, picks: Vec<PickPerformance>) -> Self {
        let known: Vec<&PickPerformance> = picks.iter().filter(|p| p.return_pct.is_some()).collect();
        let returns: Vec<f64> = known.iter().filter_map(|p| p.return_pct).collect();
        let evaluated = returns.len();
        let unknown = picks.len() - evaluated;

        if evaluated == 0 {
            return Self::empty(target_date, picks, unknown);
        }

        let total_return: f64 = returns.iter().sum();
        let avg_return = total_return / evaluated as f64;
        let max_return = returns.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min_return = returns.iter().copied().fold(f64::INFINITY, f64::min);

        let positive_count = returns.iter().filter(|r| **r > 0.0).count();
        let success_rate = positive_count as f64 / evaluated as f64 * 100.0;

        // Ties keep the better-ranked pick
        let best = known
            .iter()
            .copied()
            .reduce(|best, p| if p.return_pct > best.return_pct { p } else { best })
            .cloned();
        let worst = known
            .iter()
            .copied()
            .reduce(|worst, p| if p.return_pct < worst.return_pct { p } else { worst })
            .cloned();

        let verdict = if avg_return > EXCELLENT_AVG_RETURN {
            Verdict::Excellent
        } else if avg_return > 0.0 {
            Verdict::Good
        } else {
            Verdict::NeedsImprovement
        };

        Self {
            target_date,
            picks,
            evaluated,
            unknown,
            avg_return: Some(avg_return),
            total_return: Some(total_return),
            max_return: Some(max_return),
            min_return: Some(min_return),
            positive_count,
            success_rate: Some(success_rate),
            best,
            worst,
            verdict,
            effective: avg_return > 0.0 && success_rate > EFFECTIVE_SUCCESS_RATE,
        }
    }

    fn empty(target_date: NaiveDate, picks: Vec<PickPerformance>, unknown: usize) -> Self {
        Self {
            target_date,
            picks,
            evaluated: 0,
            unknown,
            avg_return: None,
            total_return: None,
            max_return: None,
            min_return: None,
            positive_count: 0,
            success_rate: None,
            best: None,
            worst: None,
            verdict: Verdict::Inconclusive,
            effective: false,
        }
    }

    /// One-paragraph digest for the log
    pub fn headline(&self) -> String {
        match (self.avg_return, self.success_rate, &self.best) {
            (Some(avg), Some(rate), Some(best)) => format!(
                "{} of {} picks rose on {}, average {:+.2}%, success rate {:.1}%, best {} ({:+.2}%): {}",
                self.positive_count,
                self.evaluated,
                self.target_date,
                avg,
                rate,
                best.code,
                best.return_pct.unwrap_or_default(),
                self.verdict
            ),
            _ => format!("No pick had a close on {}", self.target_date),
        }
    }
}
