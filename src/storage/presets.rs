// src/storage/presets.rs
use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Shared ticker set. Edited from the UI, copied by scanners at cycle start.
#[derive(Clone, Default)]
pub struct TickerUniverse {
    tickers: Arc<RwLock<BTreeSet<String>>>,
}

fn normalize(symbol: &str) -> Option<String> {
    let symbol = symbol.trim();
    if symbol.is_empty() || symbol.starts_with('#') {
        None
    } else {
        Some(symbol.to_uppercase())
    }
}

/// One symbol per line. Blank lines and `#` comments are ignored.
pub fn parse_preset(text: &str) -> Vec<String> {
    text.lines().filter_map(normalize).collect()
}

impl TickerUniverse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tickers<I, S>(tickers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let universe = Self::new();
        universe.extend(tickers);
        universe
    }

    /// Adds `<dir>/<name>.txt`. Returns how many symbols the file listed.
    pub fn load_preset(&self, dir: &Path, name: &str) -> Result<usize> {
        let path = dir.join(format!("{}.txt", name));
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading preset '{}' from {}", name, path.display()))?;
        let symbols = parse_preset(&text);
        let count = symbols.len();
        self.extend(symbols);
        info!(preset = name, count, "Loaded ticker preset");
        Ok(count)
    }

    pub fn extend<I, S>(&self, tickers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = self.tickers.write();
        set.extend(tickers.into_iter().filter_map(|t| normalize(t.as_ref())));
    }

    pub fn add(&self, ticker: &str) -> bool {
        match normalize(ticker) {
            Some(symbol) => self.tickers.write().insert(symbol),
            None => false,
        }
    }

    pub fn remove(&self, ticker: &str) -> bool {
        self.tickers.write().remove(&ticker.trim().to_uppercase())
    }

    pub fn clear(&self) {
        self.tickers.write().clear();
    }

    pub fn len(&self) -> usize {
        self.tickers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.read().is_empty()
    }

    /// Sorted copy, safe to iterate while the UI keeps editing.
    pub fn snapshot(&self) -> Vec<String> {
        self.tickers.read().iter().cloned().collect()
    }
}
