pub mod cache;
pub mod calls;
pub mod grouping;
pub mod pagination;
pub mod reactions;
pub mod receipts;
pub mod session;
pub mod types;
pub mod typing;

pub use cache::EventCache;
pub use calls::{CallCorrelationIndex, CallSpan, renderable_events};
pub use grouping::{GROUPING_WINDOW_MS, GroupingEdges};
pub use pagination::{PaginateUntil, PaginationError, PaginationStep};
pub use reactions::{Reaction, ReactionGroup};
pub use receipts::ReadReceiptTable;
pub use session::{BackwardPage, Session};
pub use typing::{TypingActions, TypingDebouncer, TypingSignal, TypingState};
