use crate::timeline::{Ingested, TimelineState};
use crate::types::events::{TimelineUpdate, UpdateBus};
use dashmap::DashMap;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use timeline_core::pagination::{PaginateUntil, PaginationError, PaginationStep};
use timeline_core::{BackwardPage, Session};
use tokio::sync::RwLock;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

/// Cancelable backward history loading for one room.
///
/// Every page fetch runs as its own task, registered in the in-flight set
/// until it completes. [`cancel_all`](Self::cancel_all) aborts those tasks and
/// cancels the token every running loop was started with.
pub struct PaginationController {
    session: Arc<dyn Session>,
    state: Arc<RwLock<TimelineState>>,
    updates: UpdateBus,
    page_size: usize,
    max_pages: usize,
    in_flight: DashMap<u64, AbortHandle>,
    next_request_id: AtomicU64,
    cancel: std::sync::Mutex<CancellationToken>,
}

impl PaginationController {
    pub(crate) fn new(
        session: Arc<dyn Session>,
        state: Arc<RwLock<TimelineState>>,
        updates: UpdateBus,
        page_size: usize,
        max_pages: usize,
    ) -> Self {
        Self {
            session,
            state,
            updates,
            page_size,
            max_pages,
            in_flight: DashMap::new(),
            next_request_id: AtomicU64::new(0),
            cancel: std::sync::Mutex::new(CancellationToken::new()),
        }
    }

    /// Loads one page of older events. Returns whether more history remains.
    pub async fn paginate(&self) -> Result<bool, PaginationError> {
        let token = self.current_token();
        self.fetch_page(&token).await
    }

    /// Loads older pages until `event_id` is cached.
    ///
    /// Stops with an error once the session reports no more history, after
    /// the configured page limit, on a fetch failure, or when
    /// [`cancel_all`](Self::cancel_all) is called.
    pub async fn paginate_until(&self, event_id: &str) -> Result<(), PaginationError> {
        let token = self.current_token();
        let mut run = PaginateUntil::new(event_id, self.max_pages);

        loop {
            if token.is_cancelled() {
                return Err(PaginationError::Cancelled);
            }

            let (present, has_more) = {
                let state = self.state.read().await;
                (
                    state.cache.contains(event_id),
                    state.cache.has_more_backward_history(),
                )
            };

            match run.next_step(present, has_more) {
                Ok(PaginationStep::Found) => {
                    info!(
                        target: "Timeline/Pagination",
                        "Found {event_id} after {} pages",
                        run.pages_fetched()
                    );
                    return Ok(());
                }
                Ok(PaginationStep::FetchPage) => {
                    self.fetch_page(&token).await?;
                }
                Err(e) => {
                    info!(target: "Timeline/Pagination", "Giving up: {e}");
                    return Err(e);
                }
            }
        }
    }

    /// Aborts every in-flight fetch and every running `paginate_until`.
    pub fn cancel_all(&self) {
        let previous = {
            let mut token = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *token, CancellationToken::new())
        };
        previous.cancel();

        let mut aborted = 0usize;
        self.in_flight.retain(|_, handle| {
            handle.abort();
            aborted += 1;
            false
        });
        debug!(target: "Timeline/Pagination", "Cancelled pagination, aborted {aborted} fetches");
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn current_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn fetch_page(&self, token: &CancellationToken) -> Result<bool, PaginationError> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::clone(&self.session);
        let page_size = self.page_size;
        let mut fetch =
            tokio::spawn(async move { session.fetch_backward_page(page_size).await });
        self.in_flight.insert(request_id, fetch.abort_handle());

        let joined = tokio::select! {
            biased;
            _ = token.cancelled() => {
                fetch.abort();
                self.in_flight.remove(&request_id);
                return Err(PaginationError::Cancelled);
            }
            joined = &mut fetch => joined,
        };
        self.in_flight.remove(&request_id);

        let page = match joined {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                warn!(target: "Timeline/Pagination", "Backward page fetch failed: {e:?}");
                return Err(PaginationError::Fetch(e));
            }
            Err(e) if e.is_cancelled() => return Err(PaginationError::Cancelled),
            Err(e) => return Err(PaginationError::Fetch(anyhow::anyhow!(e))),
        };

        Ok(self.apply_page(page).await)
    }

    async fn apply_page(&self, page: BackwardPage) -> bool {
        let count = page.events.len();
        let updates: Vec<TimelineUpdate> = {
            let mut state = self.state.write().await;
            let updates = state
                .ingest_page(page.events)
                .into_iter()
                .filter_map(Ingested::into_update)
                .collect();
            state.cache.set_has_more_backward_history(page.has_more);
            updates
        };

        debug!(
            target: "Timeline/Pagination",
            "Applied backward page of {count} events, has_more={}",
            page.has_more
        );
        for update in updates {
            self.updates.publish(update);
        }
        if !page.has_more {
            self.updates.publish(TimelineUpdate::BackwardHistoryExhausted);
        }
        page.has_more
    }
}
