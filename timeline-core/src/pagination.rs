//! Backward pagination until a target event is loaded.

use thiserror::Error;

/// Pages fetched by one `paginate_until` before giving up, even if the
/// session still reports more history.
pub const DEFAULT_MAX_PAGES: usize = 50;

#[derive(Debug, Error)]
pub enum PaginationError {
    #[error("pagination cancelled")]
    Cancelled,

    #[error("no more backward history, {0} not found")]
    HistoryExhausted(String),

    #[error("{target} not found after {pages} pages")]
    PageLimitReached { target: String, pages: usize },

    #[error("backward page fetch failed: {0}")]
    Fetch(#[source] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationStep {
    Found,
    FetchPage,
}

/// Decides, before every page, whether to stop or fetch another one.
#[derive(Debug, Clone)]
pub struct PaginateUntil {
    target: String,
    max_pages: usize,
    pages_fetched: usize,
}

impl PaginateUntil {
    pub fn new(target: impl Into<String>, max_pages: usize) -> Self {
        Self {
            target: target.into(),
            max_pages,
            pages_fetched: 0,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Next step given the current cache, or the reason to give up.
    ///
    /// Counts the page when it returns [`PaginationStep::FetchPage`]. The page
    /// bound applies even while the session still reports more history.
    pub fn next_step(
        &mut self,
        target_present: bool,
        has_more_history: bool,
    ) -> Result<PaginationStep, PaginationError> {
        if target_present {
            return Ok(PaginationStep::Found);
        }
        if !has_more_history {
            return Err(PaginationError::HistoryExhausted(self.target.clone()));
        }
        if self.pages_fetched >= self.max_pages {
            return Err(PaginationError::PageLimitReached {
                target: self.target.clone(),
                pages: self.pages_fetched,
            });
        }
        self.pages_fetched += 1;
        Ok(PaginationStep::FetchPage)
    }
}
