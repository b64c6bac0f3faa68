// Re-export the runtime-independent core
pub use timeline_core::{calls, grouping, reactions, receipts};

// Core types are re-exported; the update bus needs tokio and lives here
pub mod types {
    pub use timeline_core::types::*;
    pub mod events;
}

pub mod config;
pub mod error;
pub mod memory_session;
pub mod pagination;
pub mod timeline;
pub mod typing;

pub use config::TimelineConfig;
pub use error::TimelineError;
pub use memory_session::MemorySession;
pub use timeline::RoomTimeline;
pub use timeline_core::{BackwardPage, PaginationError, Session};
