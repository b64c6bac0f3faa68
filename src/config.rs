use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use timeline_core::grouping::GROUPING_WINDOW_MS;
use timeline_core::pagination::DEFAULT_MAX_PAGES;
use timeline_core::typing::DEFAULT_DEBOUNCE_WINDOW;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimelineConfig {
    pub debounce_window_ms: u64,
    /// Events requested per backward page.
    pub page_size: usize,
    /// Upper bound on pages fetched by one `paginate_until`.
    pub max_pages: usize,
    pub grouping_window_ms: u64,
    pub update_channel_capacity: usize,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            debounce_window_ms: DEFAULT_DEBOUNCE_WINDOW.as_millis() as u64,
            page_size: 20,
            max_pages: DEFAULT_MAX_PAGES,
            grouping_window_ms: GROUPING_WINDOW_MS,
            update_channel_capacity: 100,
        }
    }
}

impl TimelineConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }

    /// Loads a JSON file; missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }
}
