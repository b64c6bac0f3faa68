use crate::config::TimelineConfig;
use crate::error::TimelineError;
use crate::pagination::PaginationController;
use crate::types::events::{TimelineUpdate, UpdateBus};
use crate::typing::TypingController;
use futures_util::future::join_all;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use timeline_core::calls::{CallCorrelationIndex, renderable_events};
use timeline_core::grouping::{GroupingEdges, grouping_edges_for};
use timeline_core::reactions::{ReactionGroup, grouped_reactions};
use timeline_core::types::{
    Direction, EventType, ReceiptEntry, ReceiptEvent, SendState, TimelineEvent,
};
use timeline_core::{EventCache, ReadReceiptTable, Session};
use tokio::sync::{Mutex, Notify, RwLock, broadcast, mpsc};

/// Everything a room timeline mutates. Guarded by one lock so that derived
/// views always see a consistent cache.
#[derive(Debug, Default)]
pub(crate) struct TimelineState {
    pub(crate) cache: EventCache,
    pub(crate) receipts: ReadReceiptTable,
    /// Backfilled edits and redactions whose target is older than anything
    /// loaded yet, keyed by target id, oldest first.
    parked_relations: HashMap<String, Vec<TimelineEvent>>,
}

/// What [`TimelineState::ingest`] did with an event.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Ingested {
    Inserted { event_id: String, prepended: bool },
    Replaced { event_id: String },
    Removed { event_id: String },
    Acknowledged { transaction_id: String },
    Receipt(ReceiptEvent),
    Ignored,
}

impl Ingested {
    pub(crate) fn into_update(self) -> Option<TimelineUpdate> {
        match self {
            Self::Inserted {
                event_id,
                prepended,
            } => Some(TimelineUpdate::Inserted {
                event_id,
                prepended,
            }),
            Self::Replaced { event_id } => Some(TimelineUpdate::Replaced { event_id }),
            Self::Removed { event_id } => Some(TimelineUpdate::Removed { event_id }),
            Self::Acknowledged { transaction_id } => {
                Some(TimelineUpdate::LocalEchoChanged { transaction_id })
            }
            Self::Receipt(_) | Self::Ignored => None,
        }
    }
}

impl TimelineState {
    /// Routes one delivered event into the cache.
    ///
    /// Redactions remove their target, edits are merged into theirs, remote
    /// echoes replace their pending local echo and receipts are stored bare.
    pub(crate) fn ingest(&mut self, event: TimelineEvent, direction: Direction) -> Ingested {
        if event.event_type == EventType::Redaction {
            return match event.redacts_event_id.as_deref() {
                Some(target) if self.cache.remove(target) > 0 => Ingested::Removed {
                    event_id: target.to_string(),
                },
                _ => Ingested::Ignored,
            };
        }

        if let Some(target) = event.edit_target() {
            let target = target.to_string();
            return if self.cache.replace(&event) {
                Ingested::Replaced { event_id: target }
            } else {
                Ingested::Ignored
            };
        }

        if event.event_type == EventType::Receipt {
            let parsed = ReceiptEvent::from_event(&event);
            self.cache.insert(event, direction);
            return parsed.map_or(Ingested::Ignored, Ingested::Receipt);
        }

        if direction == Direction::Forward {
            if let Some(txn_id) = event.transaction_id.clone() {
                if self.cache.acknowledge_local_echo(&txn_id, event.clone()) {
                    return Ingested::Acknowledged {
                        transaction_id: txn_id,
                    };
                }
            }
        }

        let event_id = event.id.clone();
        if self.cache.insert(event, direction) {
            Ingested::Inserted {
                event_id,
                prepended: direction == Direction::Backward,
            }
        } else {
            Ingested::Ignored
        }
    }

    /// Routes one backward page, newest event first.
    ///
    /// Edits and redactions in a page are newer than their targets, so they
    /// are held back until the target is loaded, from this page or a later
    /// one, and then applied oldest first.
    pub(crate) fn ingest_page(&mut self, events: Vec<TimelineEvent>) -> Vec<Ingested> {
        let (relations, plain): (Vec<_>, Vec<_>) = events
            .into_iter()
            .partition(|e| relation_target(e).is_some());

        let mut outcomes = Vec::new();
        for relation in relations.into_iter().rev() {
            let Some(target) = relation_target(&relation).map(str::to_string) else {
                continue;
            };
            if self.cache.contains(&target) {
                outcomes.push(self.ingest(relation, Direction::Backward));
            } else {
                self.parked_relations.entry(target).or_default().push(relation);
            }
        }

        for event in plain {
            let parked = if event.has_id() {
                self.parked_relations.remove(&event.id).unwrap_or_default()
            } else {
                Vec::new()
            };
            if parked.iter().any(|r| r.event_type == EventType::Redaction) {
                debug!(target: "Timeline", "Skipping backfilled event {} redacted later", event.id);
                continue;
            }

            outcomes.push(self.ingest(event, Direction::Backward));
            for relation in parked {
                outcomes.push(self.ingest(relation, Direction::Backward));
            }
        }
        outcomes
    }
}

/// The event an edit or redaction applies to.
fn relation_target(event: &TimelineEvent) -> Option<&str> {
    if event.event_type == EventType::Redaction {
        return event.redacts_event_id.as_deref().filter(|id| !id.is_empty());
    }
    event.edit_target().filter(|id| !id.is_empty())
}

/// The aggregated timeline of one open room.
///
/// All mutations go through one `RwLock`ed state; session calls run with the
/// lock released and their results are applied afterwards. Receipt events are
/// additionally processed one at a time, in arrival order.
pub struct RoomTimeline {
    room_id: String,
    config: TimelineConfig,
    session: Arc<dyn Session>,
    state: Arc<RwLock<TimelineState>>,
    receipt_order: Mutex<()>,
    typing: TypingController,
    pagination: PaginationController,
    updates: UpdateBus,
    shutdown_notifier: Notify,
}

impl RoomTimeline {
    pub fn new(room_id: impl Into<String>, session: Arc<dyn Session>, config: TimelineConfig) -> Self {
        let state = Arc::new(RwLock::new(TimelineState::default()));
        let updates = UpdateBus::new(config.update_channel_capacity);
        let typing = TypingController::new(Arc::clone(&session), config.debounce_window());
        let pagination = PaginationController::new(
            Arc::clone(&session),
            Arc::clone(&state),
            updates.clone(),
            config.page_size,
            config.max_pages,
        );

        Self {
            room_id: room_id.into(),
            config,
            session,
            state,
            receipt_order: Mutex::new(()),
            typing,
            pagination,
            updates,
            shutdown_notifier: Notify::new(),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimelineUpdate> {
        self.updates.subscribe()
    }

    /// Consumes the session's live subscription until it closes or
    /// [`close`](Self::close) is called.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<(TimelineEvent, Direction)>) {
        info!(target: "Timeline", "Timeline for {} started", self.room_id);
        loop {
            tokio::select! {
                next = events.recv() => match next {
                    Some((event, direction)) => self.handle_event(event, direction).await,
                    None => {
                        debug!(target: "Timeline", "Live subscription for {} closed", self.room_id);
                        return;
                    }
                },
                _ = self.shutdown_notifier.notified() => {
                    debug!(target: "Timeline", "Timeline for {} shut down", self.room_id);
                    return;
                }
            }
        }
    }

    /// Stops pagination, withdraws a pending typing notification and ends
    /// [`run`](Self::run).
    pub async fn close(&self) {
        self.pagination.cancel_all();
        if self.typing.is_announcing().await {
            if let Err(e) = self.typing.set_typing(false).await {
                warn!(target: "Timeline", "Failed to clear typing state on close: {e}");
            }
        }
        self.shutdown_notifier.notify_one();
    }

    pub async fn handle_event(&self, event: TimelineEvent, direction: Direction) {
        let outcome = self.state.write().await.ingest(event, direction);
        match outcome {
            Ingested::Receipt(receipt) if direction == Direction::Forward => {
                self.handle_receipt(&receipt).await;
            }
            other => {
                if let Some(update) = other.into_update() {
                    self.updates.publish(update);
                }
            }
        }
    }

    /// Moves read markers: evicts every moved user, then places the fetched
    /// receipt lists of the newly read events.
    pub async fn handle_receipt(&self, receipt: &ReceiptEvent) {
        let _ordered = self.receipt_order.lock().await;

        let mut touched = self
            .state
            .write()
            .await
            .receipts
            .evict(&receipt.senders_who_just_moved);

        let fetches = receipt
            .now_read_event_ids
            .iter()
            .filter(|id| !id.is_empty())
            .map(|event_id| async move { (event_id, self.session.fetch_receipts(event_id).await) });
        let fetched = join_all(fetches).await;

        {
            let mut state = self.state.write().await;
            for (event_id, result) in fetched {
                match result {
                    Ok(entries) => {
                        state.receipts.place(event_id, entries);
                        touched.push(event_id.clone());
                    }
                    Err(e) => {
                        warn!(target: "Timeline/Receipts", "Failed to fetch receipts for {event_id}: {e:?}");
                    }
                }
            }
        }

        touched.sort();
        touched.dedup();
        if !touched.is_empty() {
            self.updates.publish(TimelineUpdate::ReceiptsMoved { event_ids: touched });
        }
    }

    /// Shows an outgoing event before the server acknowledges it.
    pub async fn send_local_echo(&self, event: TimelineEvent) -> bool {
        let Some(txn_id) = event.transaction_id.clone() else {
            return false;
        };
        let queued = self.state.write().await.cache.queue_local_echo(event);
        if queued {
            self.updates.publish(TimelineUpdate::LocalEchoChanged {
                transaction_id: txn_id,
            });
        }
        queued
    }

    pub async fn update_local_echo(&self, txn_id: &str, state: SendState) -> bool {
        let updated = self
            .state
            .write()
            .await
            .cache
            .update_local_echo(txn_id, state);
        if updated {
            self.updates.publish(TimelineUpdate::LocalEchoChanged {
                transaction_id: txn_id.to_string(),
            });
        }
        updated
    }

    pub async fn acknowledge_local_echo(&self, txn_id: &str, remote: TimelineEvent) -> bool {
        let acknowledged = self
            .state
            .write()
            .await
            .cache
            .acknowledge_local_echo(txn_id, remote);
        if acknowledged {
            self.updates.publish(TimelineUpdate::LocalEchoChanged {
                transaction_id: txn_id.to_string(),
            });
        }
        acknowledged
    }

    /// Cached events followed by pending local echoes.
    pub async fn snapshot(&self) -> Vec<TimelineEvent> {
        self.state.read().await.cache.snapshot()
    }

    /// The snapshot after call collapsing and type filtering.
    pub async fn renderable_snapshot(&self) -> Vec<TimelineEvent> {
        renderable_events(&self.snapshot().await)
    }

    pub async fn call_duration_ms(&self, event_id: &str) -> Option<u64> {
        let snapshot = self.snapshot().await;
        let event = snapshot.iter().find(|e| e.has_id() && e.id == event_id)?;
        CallCorrelationIndex::build(&snapshot).call_duration_ms(event)
    }

    pub async fn grouping_edges(&self, event_id: &str) -> GroupingEdges {
        let snapshot = self.snapshot().await;
        grouping_edges_for(&snapshot, event_id, self.config.grouping_window_ms).unwrap_or_default()
    }

    pub async fn grouped_reactions(&self, event_id: &str) -> Vec<ReactionGroup> {
        grouped_reactions(&self.snapshot().await, event_id)
    }

    pub async fn is_read(&self, event_id: &str) -> bool {
        self.state.read().await.receipts.is_read(event_id)
    }

    pub async fn receipts_for(&self, event_id: &str) -> Vec<ReceiptEntry> {
        self.state.read().await.receipts.receipts_for(event_id).to_vec()
    }

    pub async fn has_more_backward_history(&self) -> bool {
        self.state.read().await.cache.has_more_backward_history()
    }

    pub async fn set_typing(&self, typing: bool) -> Result<(), TimelineError> {
        self.typing.set_typing(typing).await
    }

    /// Loads one page of history. Returns whether more remains.
    pub async fn paginate(&self) -> Result<bool, TimelineError> {
        Ok(self.pagination.paginate().await?)
    }

    pub async fn paginate_until(&self, event_id: &str) -> Result<(), TimelineError> {
        Ok(self.pagination.paginate_until(event_id).await?)
    }

    pub fn cancel_all(&self) {
        self.pagination.cancel_all();
    }

    pub fn pagination_in_flight(&self) -> usize {
        self.pagination.in_flight()
    }
}
