//! Ordered, deduplicated event store for one room timeline.

use crate::types::{Direction, SendState, TimelineEvent};
use log::debug;
use std::collections::{HashSet, VecDeque};

/// Events of one room in insertion order, plus pending local echoes.
///
/// No two cached events share a non-empty id. Events without an id (bare
/// receipts) are always appended. Insertion order is authoritative: nothing
/// here re-sorts by timestamp across live and backfilled events.
#[derive(Debug, Clone)]
pub struct EventCache {
    events: VecDeque<TimelineEvent>,
    ids: HashSet<String>,
    /// Outgoing events not yet acknowledged, in submission order.
    pending: Vec<TimelineEvent>,
    has_more_backward_history: bool,
}

impl Default for EventCache {
    fn default() -> Self {
        Self::new()
    }
}

impl EventCache {
    pub fn new() -> Self {
        Self {
            events: VecDeque::new(),
            ids: HashSet::new(),
            pending: Vec::new(),
            has_more_backward_history: true,
        }
    }

    /// Appends (forward) or prepends (backward) `event`.
    ///
    /// Re-delivery of an id already cached is a no-op. Returns whether the
    /// event was stored.
    pub fn insert(&mut self, event: TimelineEvent, direction: Direction) -> bool {
        if event.has_id() {
            if self.ids.contains(&event.id) {
                debug!(target: "Timeline/Cache", "Dropping duplicate delivery of {}", event.id);
                return false;
            }
            self.ids.insert(event.id.clone());
        }

        match direction {
            Direction::Forward => self.events.push_back(event),
            Direction::Backward => self.events.push_front(event),
        }
        true
    }

    /// Merges `edit` into the event it targets, in place.
    ///
    /// Returns `false` when `edit` is not an edit, its target is not cached,
    /// or this very edit was already applied.
    pub fn replace(&mut self, edit: &TimelineEvent) -> bool {
        let Some(target_id) = edit.edit_target() else {
            return false;
        };
        let Some(original) = self.events.iter_mut().find(|e| e.id == target_id) else {
            debug!(target: "Timeline/Cache", "Edit {} targets unknown event {}", edit.id, target_id);
            return false;
        };
        if edit.has_id() && original.replaced_by.as_deref() == Some(edit.id.as_str()) {
            return false;
        }

        *original = original.merged_with_edit(edit);
        true
    }

    /// Deletes every cached or pending element with `event_id`.
    ///
    /// Returns the number of elements removed.
    pub fn remove(&mut self, event_id: &str) -> usize {
        if event_id.is_empty() {
            return 0;
        }
        let before = self.events.len() + self.pending.len();
        self.events.retain(|e| e.id != event_id);
        self.pending.retain(|e| e.id != event_id);
        self.ids.remove(event_id);
        before - self.events.len() - self.pending.len()
    }

    /// Cached events followed by pending local echoes.
    pub fn snapshot(&self) -> Vec<TimelineEvent> {
        self.events
            .iter()
            .chain(self.pending.iter())
            .cloned()
            .collect()
    }

    pub fn events(&self) -> impl Iterator<Item = &TimelineEvent> {
        self.events.iter()
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.ids.contains(event_id)
    }

    pub fn get(&self, event_id: &str) -> Option<&TimelineEvent> {
        if !self.contains(event_id) {
            return None;
        }
        self.events.iter().find(|e| e.id == event_id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn has_more_backward_history(&self) -> bool {
        self.has_more_backward_history
    }

    pub fn set_has_more_backward_history(&mut self, has_more: bool) {
        self.has_more_backward_history = has_more;
    }

    /// Records an outgoing event shown before the server acknowledges it.
    ///
    /// The event must carry a transaction id not already pending.
    pub fn queue_local_echo(&mut self, mut event: TimelineEvent) -> bool {
        let Some(txn_id) = event.transaction_id.as_deref() else {
            return false;
        };
        if self.pending_index(txn_id).is_some() {
            return false;
        }
        if event.send_state.is_terminal() {
            event.send_state = SendState::Preparing;
        }
        self.pending.push(event);
        true
    }

    pub fn update_local_echo(&mut self, txn_id: &str, state: SendState) -> bool {
        let Some(index) = self.pending_index(txn_id) else {
            return false;
        };
        let echo = &mut self.pending[index];
        if !echo.send_state.can_advance_to(state) {
            return false;
        }
        echo.send_state = state;
        true
    }

    pub fn is_pending(&self, txn_id: &str) -> bool {
        self.pending_index(txn_id).is_some()
    }

    /// Swaps the pending echo for `txn_id` with its remote echo.
    ///
    /// The remote echo is appended unless it was already delivered by sync.
    /// Returns whether a pending echo existed.
    pub fn acknowledge_local_echo(&mut self, txn_id: &str, mut remote: TimelineEvent) -> bool {
        let Some(index) = self.pending_index(txn_id) else {
            return false;
        };
        self.pending.remove(index);

        remote.send_state = SendState::Sent;
        remote.transaction_id = Some(txn_id.to_string());
        self.insert(remote, Direction::Forward);
        true
    }

    fn pending_index(&self, txn_id: &str) -> Option<usize> {
        self.pending
            .iter()
            .position(|e| e.transaction_id.as_deref() == Some(txn_id))
    }
}
