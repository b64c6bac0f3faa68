//! Collapses call lifecycles into one renderable entry.
//!
//! A call is an invite or answer followed by a hangup or reject, all sharing a
//! `call_id`. Only the event that opened the span is rendered; the renderer
//! annotates it with the span's duration.

use crate::types::{EPOCH_ZERO, TimelineEvent};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSpan {
    pub primary_event_id: String,
    pub start_timestamp_ms: u64,
    pub end_timestamp_ms: Option<u64>,
}

impl CallSpan {
    pub fn duration_ms(&self) -> Option<u64> {
        self.end_timestamp_ms
            .map(|end| end.saturating_sub(self.start_timestamp_ms))
    }
}

/// `call_id -> CallSpan`, rebuilt from scratch for every query.
#[derive(Debug, Clone, Default)]
pub struct CallCorrelationIndex {
    spans: HashMap<String, CallSpan>,
}

impl CallCorrelationIndex {
    /// Correlates every call event of `events` in timestamp order.
    ///
    /// Events with equal timestamps keep their relative input order.
    pub fn build<'a>(events: impl IntoIterator<Item = &'a TimelineEvent>) -> Self {
        let mut calls: Vec<&TimelineEvent> = events
            .into_iter()
            .filter(|e| {
                e.event_type.is_call_lifecycle()
                    && e.has_known_timestamp()
                    && e.origin_timestamp_ms != EPOCH_ZERO
            })
            .collect();
        calls.sort_by_key(|e| e.origin_timestamp_ms);

        let mut spans: HashMap<String, CallSpan> = HashMap::new();
        for event in calls {
            let Some(call_id) = event.call_id() else {
                continue;
            };

            if event.event_type.starts_call() {
                if !event.has_id() {
                    continue;
                }
                spans
                    .entry(call_id.to_string())
                    .or_insert_with(|| CallSpan {
                        primary_event_id: event.id.clone(),
                        start_timestamp_ms: event.origin_timestamp_ms,
                        end_timestamp_ms: None,
                    });
            } else if let Some(span) = spans.get_mut(call_id) {
                span.end_timestamp_ms = Some(event.origin_timestamp_ms);
            }
        }

        Self { spans }
    }

    pub fn span(&self, call_id: &str) -> Option<&CallSpan> {
        self.spans.get(call_id)
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// A call event is visible iff it is the one that opened its span.
    pub fn is_primary(&self, event: &TimelineEvent) -> bool {
        event
            .call_id()
            .and_then(|call_id| self.spans.get(call_id))
            .is_some_and(|span| span.primary_event_id == event.id)
    }

    /// `end - start` of the call `event` belongs to, once both are known.
    pub fn call_duration_ms(&self, event: &TimelineEvent) -> Option<u64> {
        self.spans.get(event.call_id()?)?.duration_ms()
    }

    /// Whether `event` survives the renderable filter.
    ///
    /// Drops epoch-zero duplicates, types outside the renderable allow-list
    /// and every call event that is not its span's primary.
    pub fn is_renderable(&self, event: &TimelineEvent) -> bool {
        if event.origin_timestamp_ms == EPOCH_ZERO || !event.event_type.is_renderable() {
            return false;
        }
        if event.event_type.is_call_lifecycle() {
            return self.is_primary(event);
        }
        true
    }
}

/// The subset of `events` a renderer draws, in input order.
pub fn renderable_events(events: &[TimelineEvent]) -> Vec<TimelineEvent> {
    let index = CallCorrelationIndex::build(events);
    events
        .iter()
        .filter(|e| index.is_renderable(e))
        .cloned()
        .collect()
}
