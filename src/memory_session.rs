//! A scripted, in-memory [`Session`] used by the replay tool and the tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use timeline_core::types::{ReceiptEntry, TimelineEvent};
use timeline_core::{BackwardPage, Session};
use tokio::sync::{Mutex, Notify};

/// One call to [`Session::send_typing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingCall {
    pub typing: bool,
    pub timeout: Duration,
}

#[derive(Default)]
pub struct MemorySession {
    pages: Mutex<VecDeque<BackwardPage>>,
    receipts: Mutex<HashMap<String, Vec<ReceiptEntry>>>,
    typing_calls: Mutex<Vec<TypingCall>>,
    page_requests: AtomicUsize,
    /// When set, an empty queue still reports more history.
    endless_history: AtomicBool,
    fail_next_page: AtomicBool,
    page_gate: Option<Arc<Notify>>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every page fetch waits for a permit on `gate` before answering.
    pub fn with_page_gate(mut self, gate: Arc<Notify>) -> Self {
        self.page_gate = Some(gate);
        self
    }

    /// Queues a page, newest event first.
    pub async fn push_page(&self, events: Vec<TimelineEvent>, has_more: bool) {
        self.pages
            .lock()
            .await
            .push_back(BackwardPage { events, has_more });
    }

    pub async fn set_receipts(&self, event_id: &str, entries: Vec<ReceiptEntry>) {
        self.receipts
            .lock()
            .await
            .insert(event_id.to_string(), entries);
    }

    pub fn set_endless_history(&self, endless: bool) {
        self.endless_history.store(endless, Ordering::SeqCst);
    }

    pub fn fail_next_page(&self) {
        self.fail_next_page.store(true, Ordering::SeqCst);
    }

    pub async fn typing_calls(&self) -> Vec<TypingCall> {
        self.typing_calls.lock().await.clone()
    }

    pub fn page_requests(&self) -> usize {
        self.page_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn fetch_backward_page(&self, _page_size: usize) -> Result<BackwardPage, anyhow::Error> {
        self.page_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.page_gate {
            gate.notified().await;
        }
        if self.fail_next_page.swap(false, Ordering::SeqCst) {
            return Err(anyhow::anyhow!("network unreachable"));
        }

        let next = self.pages.lock().await.pop_front();
        Ok(next.unwrap_or_else(|| BackwardPage {
            events: Vec::new(),
            has_more: self.endless_history.load(Ordering::SeqCst),
        }))
    }

    async fn fetch_receipts(&self, event_id: &str) -> Result<Vec<ReceiptEntry>, anyhow::Error> {
        Ok(self
            .receipts
            .lock()
            .await
            .get(event_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_typing(&self, typing: bool, timeout: Duration) -> Result<(), anyhow::Error> {
        self.typing_calls
            .lock()
            .await
            .push(TypingCall { typing, timeout });
        Ok(())
    }
}
