use thiserror::Error;
use timeline_core::PaginationError;

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("session error: {0}")]
    Session(#[source] anyhow::Error),

    #[error(transparent)]
    Pagination(#[from] PaginationError),
}
