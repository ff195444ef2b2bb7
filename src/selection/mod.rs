// Candidate selection
// Dedupe, filter, score, rank, truncate and annotate

use crate::config::FilterConfig;
use crate::models::{ScoreBreakdown, StockRecord};
use crate::scoring::ScoringEngine;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Daily limit-down threshold, inclusive
const LIMIT_DOWN_PCT: f64 = -9.8;
/// Below this turnover an unchanged price suggests a trading halt
const HALT_TURNOVER_PCT: f64 = 0.1;

/// One ranked pick
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectedStock {
    pub rank: usize,
    pub record: StockRecord,
    pub score: ScoreBreakdown,
    pub reason: String,
}

pub struct SelectionPipeline {
    config: FilterConfig,
    engine: ScoringEngine,
}

impl SelectionPipeline {
    pub fn new(config: FilterConfig, engine: ScoringEngine) -> Self {
        Self { config, engine }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Ranked shortlist from `records`.
    ///
    /// Deterministic: ties keep their input order, so identical input
    /// always gives identical ranks and reasons.
    pub fn select_top(&self, records: &[StockRecord]) -> Vec<SelectedStock> {
        let unique = dedupe(records);
        tracing::info!("After dedupe: {} of {} records", unique.len(), records.len());

        let pe_filtered: Vec<&StockRecord> = unique
            .into_iter()
            .filter(|record| self.passes_pe(record))
            .collect();
        tracing::info!("After PE filter (0 < PE <= {}): {}", self.config.max_pe, pe_filtered.len());

        let tradable: Vec<&StockRecord> = pe_filtered
            .into_iter()
            .filter(|record| self.passes_structural(record))
            .collect();
        tracing::info!("After price/halt/turnover/limit-down filters: {}", tradable.len());

        let mut scored: Vec<(&StockRecord, ScoreBreakdown)> = tradable
            .into_iter()
            .map(|record| (record, self.engine.compute_score(record)))
            .collect();
        // sort_by is stable
        scored.sort_by(|a, b| b.1.total.cmp(&a.1.total));

        scored.retain(|(_, score)| score.total >= self.config.min_strength_score);
        tracing::info!(
            "After strength filter (>= {}): {}",
            self.config.min_strength_score,
            scored.len()
        );

        scored.truncate(self.config.max_stocks);

        let selected: Vec<SelectedStock> = scored
            .into_iter()
            .enumerate()
            .map(|(i, (record, score))| SelectedStock {
                rank: i + 1,
                reason: selection_reason(record, &score),
                record: record.clone(),
                score,
            })
            .collect();

        tracing::info!("✓ Selected {} stocks", selected.len());
        selected
    }

    fn passes_pe(&self, record: &StockRecord) -> bool {
        matches!(record.pe_ratio, Some(pe) if pe > 0.0 && pe <= self.config.max_pe)
    }

    fn passes_structural(&self, record: &StockRecord) -> bool {
        let Some(price) = record.price else {
            return false;
        };
        if price < self.config.min_price {
            return false;
        }

        if record.change_pct == Some(0.0)
            && record.turnover_rate.map_or(true, |rate| rate < HALT_TURNOVER_PCT)
        {
            tracing::debug!("Dropping {}: looks halted", record.code);
            return false;
        }

        match record.turnover_rate {
            Some(rate) if rate >= self.config.min_turnover_rate => {}
            _ => return false,
        }

        !matches!(record.change_pct, Some(change) if change <= LIMIT_DOWN_PCT)
    }
}

/// First occurrence of each code wins
fn dedupe(records: &[StockRecord]) -> Vec<&StockRecord> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|record| !record.code.is_empty() && seen.insert(record.code.as_str()))
        .collect()
}

pub fn selection_reason(record: &StockRecord, score: &ScoreBreakdown) -> String {
    let mut reasons = Vec::new();

    if let Some(pe) = record.pe_ratio {
        reasons.push(format!("PE={:.2}", pe));
    }
    if let Some(pb) = record.pb_ratio {
        reasons.push(format!("PB={:.2}", pb));
    }

    match record.change_pct {
        Some(change) if change > 3.0 => reasons.push("strong intraday gain".to_string()),
        Some(change) if change > 0.0 => reasons.push("intraday gain".to_string()),
        _ => {}
    }

    match record.momentum_20d {
        Some(momentum) if momentum > 10.0 => reasons.push("strong 20d momentum".to_string()),
        Some(momentum) if momentum > 0.0 => reasons.push("positive 20d momentum".to_string()),
        _ => {}
    }

    match record.roe {
        Some(roe) if roe > 15.0 => reasons.push(format!("excellent ROE ({:.1}%)", roe)),
        Some(roe) if roe > 10.0 => reasons.push(format!("good ROE ({:.1}%)", roe)),
        _ => {}
    }

    match record.profit_growth {
        Some(growth) if growth > 20.0 => reasons.push(format!("high growth ({:.1}%)", growth)),
        Some(growth) if growth > 10.0 => reasons.push(format!("solid growth ({:.1}%)", growth)),
        _ => {}
    }

    if score.safety >= 8 {
        reasons.push("high safety".to_string());
    } else if score.safety >= 6 {
        reasons.push("good safety".to_string());
    }

    reasons.push(format!("grade {} ({} pts)", score.grade, score.total));
    reasons.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(code: &str, pe: f64, change: f64, momentum: f64) -> StockRecord {
        StockRecord {
            price: Some(10.0),
            change_pct: Some(change),
            turnover_rate: Some(2.0),
            pe_ratio: Some(pe),
            pb_ratio: Some(1.8),
            peg: Some(0.9),
            roe: Some(18.0),
            profit_growth: Some(22.0),
            dividend_yield: Some(3.5),
            momentum_20d: Some(momentum),
            ..StockRecord::new(code, format!("Stock {}", code))
        }
    }

    fn pipeline() -> SelectionPipeline {
        SelectionPipeline::new(FilterConfig::default(), ScoringEngine::new())
    }

    fn codes(selected: &[SelectedStock]) -> Vec<&str> {
        selected.iter().map(|pick| pick.record.code.as_str()).collect()
    }

    #[test]
    fn test_pe_boundaries() {
        let records = vec![
            candidate("600001", 30.0, 1.0, 5.0),
            candidate("600002", 30.01, 1.0, 5.0),
            candidate("600003", 0.0, 1.0, 5.0),
            candidate("600004", -5.0, 1.0, 5.0),
            StockRecord {
                pe_ratio: None,
                ..candidate("600005", 10.0, 1.0, 5.0)
            },
        ];
        let selected = pipeline().select_top(&records);
        assert_eq!(codes(&selected), vec!["600001"]);
    }

    #[test]
    fn test_limit_down_is_inclusive() {
        let records = vec![
            candidate("600001", 12.0, -9.8, 5.0),
            candidate("600002", 12.0, -9.79, 5.0),
        ];
        let selected = pipeline().select_top(&records);
        assert_eq!(codes(&selected), vec!["600002"]);
    }

    #[test]
    fn test_structural_filters() {
        let records = vec![
            StockRecord {
                price: Some(0.99),
                ..candidate("600001", 12.0, 1.0, 5.0)
            },
            StockRecord {
                change_pct: Some(0.0),
                turnover_rate: Some(0.05),
                ..candidate("600002", 12.0, 1.0, 5.0)
            },
            StockRecord {
                turnover_rate: Some(0.9),
                ..candidate("600003", 12.0, 1.0, 5.0)
            },
            StockRecord {
                turnover_rate: None,
                ..candidate("600004", 12.0, 1.0, 5.0)
            },
            StockRecord {
                change_pct: Some(0.0),
                ..candidate("600005", 12.0, 1.0, 5.0)
            },
        ];
        let selected = pipeline().select_top(&records);
        // unchanged price with normal turnover is not a halt
        assert_eq!(codes(&selected), vec!["600005"]);
    }

    #[test]
    fn test_ranking_is_monotonic_and_stable() {
        let records = vec![
            candidate("600001", 25.0, 1.0, 2.0),
            candidate("600002", 8.0, 6.0, 20.0),
            candidate("600003", 25.0, 1.0, 2.0),
            candidate("600004", 15.0, 3.0, 12.0),
        ];
        let selected = pipeline().select_top(&records);

        assert_eq!(codes(&selected), vec!["600002", "600004", "600001", "600003"]);
        for (i, pick) in selected.iter().enumerate() {
            assert_eq!(pick.rank, i + 1);
        }
        for pair in selected.windows(2) {
            assert!(pair[0].score.total >= pair[1].score.total);
        }
    }

    #[test]
    fn test_selection_is_idempotent() {
        let records = vec![
            candidate("600001", 25.0, 1.0, 2.0),
            candidate("600002", 8.0, 6.0, 20.0),
            candidate("600003", 18.0, -1.0, -3.0),
        ];
        let first = pipeline().select_top(&records);
        let second = pipeline().select_top(&records);
        assert_eq!(first, second);
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let records = vec![
            candidate("600001", 25.0, 1.0, 2.0),
            candidate("600001", 8.0, 6.0, 20.0),
        ];
        let selected = pipeline().select_top(&records);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].record.pe_ratio, Some(25.0));
    }

    #[test]
    fn test_min_score_and_truncation() {
        let config = FilterConfig {
            max_stocks: 2,
            min_strength_score: 70,
            ..FilterConfig::default()
        };
        let records = vec![
            candidate("600001", 25.0, 1.0, 2.0),
            candidate("600002", 8.0, 6.0, 20.0),
            candidate("600003", 15.0, 3.0, 12.0),
            StockRecord {
                roe: None,
                profit_growth: None,
                ..candidate("600004", 25.0, -1.0, -1.0)
            },
        ];
        let selected = SelectionPipeline::new(config, ScoringEngine::new()).select_top(&records);

        assert_eq!(codes(&selected), vec!["600002", "600003"]);
        assert!(selected.iter().all(|pick| pick.score.total >= 70));
    }

    #[test]
    fn test_selection_reason() {
        let record = candidate("600036", 25.0, 3.0, 12.0);
        let score = ScoringEngine::new().compute_score(&record);
        let reason = selection_reason(&record, &score);

        assert_eq!(
            reason,
            "PE=25.00; PB=1.80; intraday gain; strong 20d momentum; \
             excellent ROE (18.0%); high growth (22.0%); good safety; grade A (77 pts)"
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(pipeline().select_top(&[]).is_empty());
    }
}
