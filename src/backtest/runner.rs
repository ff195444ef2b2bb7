use crate::api::HistoryClient;
use crate::backtest::metrics::{PerformanceSummary, PickPerformance};
use crate::selection::SelectedStock;
use chrono::NaiveDate;

/// Replays a day's picks against the closes of a later trading day
#[derive(Clone)]
pub struct Backtester {
    history: HistoryClient,
    lookback_days: usize,
}

impl Backtester {
    /// `lookback_days` is the number of recent bars searched for the
    /// evaluation date; older dates fall outside the window.
    pub fn new(history: HistoryClient, lookback_days: usize) -> Self {
        Self {
            history,
            lookback_days: lookback_days.max(1),
        }
    }

    /// Close of `code` on `date`, if the series has a bar for that day
    pub async fn close_on(&self, code: &str, date: NaiveDate) -> Option<f64> {
        self.history
            .get_history(code, self.lookback_days)
            .await
            .iter()
            .find(|bar| bar.date == date)
            .map(|bar| bar.close)
    }

    /// Evaluate `picks` at their close on `target_date`.
    ///
    /// Picks are fetched one after another. A pick without a bar on that
    /// date, or without a known pick price, is reported with an unknown
    /// return and left out of the statistics.
    pub async fn run_backtest(
        &self,
        picks: &[SelectedStock],
        target_date: NaiveDate,
    ) -> PerformanceSummary {
        tracing::info!("Backtesting {} picks against {}", picks.len(), target_date);

        let mut results = Vec::with_capacity(picks.len());
        for pick in picks {
            let next_price = self.close_on(&pick.record.code, target_date).await;
            let performance = PickPerformance::from_pick(pick, next_price);

            match (performance.original_price, performance.next_price, performance.return_pct) {
                (Some(from), Some(to), Some(ret)) => {
                    tracing::info!("{}: {:.2} -> {:.2} ({:+.2}%)", performance.code, from, to, ret)
                }
                _ => tracing::warn!(
                    "No close for {} on {}, return unknown",
                    performance.code,
                    target_date
                ),
            }
            results.push(performance);
        }

        let summary = PerformanceSummary::from_results(target_date, results);
        tracing::info!("📊 {}", summary.headline());
        summary
    }
}
