use crate::error::ScreenerError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Hand-maintained dividend figures for codes where the quote feed is wrong
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DividendOverride {
    /// Percent
    pub dividend_yield: f64,
    pub dividend_per_share: f64,
    pub year: i32,
    #[serde(default)]
    pub note: String,
}

/// Frozen code → override map, highest-priority dividend source.
///
/// Built once and only read afterwards; clone it into each client that
/// needs it.
#[derive(Debug, Clone, Default)]
pub struct DividendOverrideTable {
    entries: HashMap<String, DividendOverride>,
}

impl DividendOverrideTable {
    pub fn new(entries: HashMap<String, DividendOverride>) -> Self {
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Table shipped with the screener
    pub fn builtin() -> Self {
        let mut entries = HashMap::new();
        // China Life: 0.65/share for 2024 (interim + final) at roughly 44/share
        entries.insert(
            "601628".to_string(),
            DividendOverride {
                dividend_yield: 1.48,
                dividend_per_share: 0.65,
                year: 2024,
                note: "2024 interim + final payout 0.65/share, priced at 44".to_string(),
            },
        );
        Self::new(entries)
    }

    /// Load a JSON object of `code -> {dividend_yield, dividend_per_share, year, note}`
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ScreenerError::Overrides(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let entries: HashMap<String, DividendOverride> = serde_json::from_str(raw)
            .map_err(|e| ScreenerError::Overrides(format!("invalid override JSON: {}", e)))?;

        for (code, entry) in &entries {
            if !entry.dividend_yield.is_finite() || entry.dividend_yield < 0.0 {
                return Err(ScreenerError::Overrides(format!(
                    "{} has invalid dividend_yield {}",
                    code, entry.dividend_yield
                )));
            }
        }

        tracing::info!("Loaded {} dividend overrides", entries.len());
        Ok(Self::new(entries))
    }

    pub fn get(&self, code: &str) -> Option<&DividendOverride> {
        self.entries.get(code)
    }

    pub fn dividend_yield(&self, code: &str) -> Option<f64> {
        self.entries.get(code).map(|entry| entry.dividend_yield)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
