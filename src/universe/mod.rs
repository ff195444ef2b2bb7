// Universe providers
// Where the list of codes to screen comes from

use crate::error::ScreenerError;
use crate::models::UniverseEntry;
use crate::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub trait UniverseProvider: Send + Sync {
    /// The full universe; an empty or unreadable source is an error
    fn load(&self) -> Result<Vec<UniverseEntry>>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UniverseFile {
    Wrapped {
        #[serde(default)]
        update_date: Option<String>,
        stocks: Vec<UniverseEntry>,
    },
    Bare(Vec<UniverseEntry>),
}

/// Universe cached as JSON on disk.
///
/// Accepts `{"update_date": ..., "stocks": [{"code", "name"}]}` or a bare
/// array of entries.
#[derive(Debug, Clone)]
pub struct JsonUniverse {
    path: PathBuf,
}

impl JsonUniverse {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parse(json: &str) -> Result<Vec<UniverseEntry>> {
        let file: UniverseFile = serde_json::from_str(json)
            .map_err(|e| ScreenerError::Universe(format!("invalid universe file: {}", e)))?;

        let entries = match file {
            UniverseFile::Wrapped {
                update_date,
                stocks,
            } => {
                if let Some(date) = update_date {
                    tracing::debug!("Universe snapshot dated {}", date);
                }
                stocks
            }
            UniverseFile::Bare(stocks) => stocks,
        };

        let entries: Vec<UniverseEntry> = entries
            .into_iter()
            .filter(|entry| !entry.code.trim().is_empty())
            .collect();

        if entries.is_empty() {
            return Err(ScreenerError::Universe("universe contains no stocks".into()));
        }
        Ok(entries)
    }
}

impl UniverseProvider for JsonUniverse {
    fn load(&self) -> Result<Vec<UniverseEntry>> {
        let json = std::fs::read_to_string(&self.path).map_err(|e| {
            ScreenerError::Universe(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        let entries = Self::parse(&json)?;
        tracing::info!("✓ Loaded {} stocks from {}", entries.len(), self.path.display());
        Ok(entries)
    }
}

/// In-memory universe
#[derive(Debug, Clone, Default)]
pub struct StaticUniverse {
    entries: Vec<UniverseEntry>,
}

impl StaticUniverse {
    pub fn new(entries: Vec<UniverseEntry>) -> Self {
        Self { entries }
    }

    /// Entries named after their codes
    pub fn from_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            codes
                .into_iter()
                .map(|code| {
                    let code = code.into();
                    UniverseEntry {
                        name: code.clone(),
                        code,
                    }
                })
                .collect(),
        )
    }
}

impl UniverseProvider for StaticUniverse {
    fn load(&self) -> Result<Vec<UniverseEntry>> {
        if self.entries.is_empty() {
            return Err(ScreenerError::Universe("universe contains no stocks".into()));
        }
        Ok(self.entries.clone())
    }
}
