use crate::types::{ReceiptEntry, TimelineEvent};
use async_trait::async_trait;
use std::time::Duration;

/// One page of older events, newest first.
#[derive(Debug, Clone, Default)]
pub struct BackwardPage {
    pub events: Vec<TimelineEvent>,
    /// Whether the server has history older than this page.
    pub has_more: bool,
}

/// The chat-protocol session a room timeline talks to.
/// The implementation owns sync, transport and encryption.
#[async_trait]
pub trait Session: Send + Sync {
    /// Fetch the next page of history before the oldest event loaded so far.
    async fn fetch_backward_page(&self, page_size: usize) -> Result<BackwardPage, anyhow::Error>;

    /// The authoritative receipt list for an event.
    async fn fetch_receipts(&self, event_id: &str) -> Result<Vec<ReceiptEntry>, anyhow::Error>;

    /// Send a typing notification. A zero `timeout` accompanies `typing == false`.
    async fn send_typing(&self, typing: bool, timeout: Duration) -> Result<(), anyhow::Error>;
}
