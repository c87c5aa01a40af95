//! Simulated prefix lookup.
//!
//! Latency shrinks as the query grows, so in a typing burst the later
//! lookups usually finish before the earlier ones. That is exactly the
//! situation where stale results would otherwise win.

use std::sync::Arc;
use std::time::Duration;

use supersede_core::{CancelSignal, Superseded};

use crate::config::LookupConfig;

const BUILTIN_WORDS: &[&str] = &[
    "apple",
    "application",
    "apply",
    "apricot",
    "april",
    "banana",
    "band",
    "bandwidth",
    "bank",
    "cache",
    "cancel",
    "cancellation",
    "candle",
    "channel",
    "dark",
    "data",
    "database",
    "date",
    "future",
    "fuse",
    "latency",
    "latest",
    "lattice",
    "pending",
    "pendulum",
    "super",
    "supersede",
    "superseded",
    "supply",
    "support",
];

/// Word list plus the latency model.
#[derive(Debug, Clone)]
pub struct Dictionary {
    words: Arc<[String]>,
    latency: Duration,
    per_char: Duration,
    max_results: usize,
}

impl Dictionary {
    pub fn from_config(config: &LookupConfig) -> Self {
        let mut words: Vec<String> = if config.words.is_empty() {
            BUILTIN_WORDS.iter().map(|w| (*w).to_string()).collect()
        } else {
            config.words.clone()
        };
        words.sort_by(|a, b| {
            a.to_lowercase()
                .cmp(&b.to_lowercase())
                .then_with(|| a.cmp(b))
        });
        words.dedup();

        Self {
            words: words.into(),
            latency: Duration::from_millis(config.latency_ms),
            per_char: Duration::from_millis(config.per_char_ms),
            max_results: config.max_results,
        }
    }

    pub fn latency_for(&self, query: &str) -> Duration {
        let chars = u32::try_from(query.chars().count()).unwrap_or(u32::MAX);
        self.latency.saturating_sub(self.per_char.saturating_mul(chars))
    }

    /// Case-insensitive prefix matches in dictionary order.
    pub fn matches(&self, query: &str) -> Vec<String> {
        let prefix = query.to_lowercase();
        self.words
            .iter()
            .filter(|w| w.to_lowercase().starts_with(&prefix))
            .take(self.max_results)
            .cloned()
            .collect()
    }

    /// Waits out the simulated latency, then returns the matches.
    ///
    /// With a signal, a superseded lookup stops waiting and returns `Err`.
    pub async fn search(
        &self,
        query: &str,
        signal: Option<CancelSignal>,
    ) -> Result<Vec<String>, Superseded> {
        let delay = tokio::time::sleep(self.latency_for(query));
        match signal {
            Some(signal) => signal.run_until_cancelled(delay).await?,
            None => delay.await,
        }
        Ok(self.matches(query))
    }
}
