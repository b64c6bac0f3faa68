//! Same-sender bubble merging.

use crate::types::TimelineEvent;

/// Two events closer than this may share a bubble.
pub const GROUPING_WINDOW_MS: u64 = 300_000;

/// Which sides of an event's bubble attach to a neighbour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupingEdges {
    /// Attached to the nearest earlier groupable event.
    pub top: bool,
    /// Attached to the nearest later groupable event.
    pub bottom: bool,
}

impl GroupingEdges {
    pub fn is_empty(&self) -> bool {
        !self.top && !self.bottom
    }
}

/// Grouping edges for the event at `index`.
///
/// Each side looks at the nearest groupable neighbour in that direction, at
/// any distance. Non-groupable events never attach.
pub fn grouping_edges(events: &[TimelineEvent], index: usize, window_ms: u64) -> GroupingEdges {
    let Some(me) = events.get(index) else {
        return GroupingEdges::default();
    };
    if !me.event_type.is_groupable() {
        return GroupingEdges::default();
    }

    let previous = events[..index]
        .iter()
        .rev()
        .find(|e| e.event_type.is_groupable());
    let next = events[index + 1..]
        .iter()
        .find(|e| e.event_type.is_groupable());

    GroupingEdges {
        top: previous.is_some_and(|n| attaches(me, n, window_ms)),
        bottom: next.is_some_and(|n| attaches(me, n, window_ms)),
    }
}

/// Grouping edges for the first event with `event_id`, if present.
pub fn grouping_edges_for(
    events: &[TimelineEvent],
    event_id: &str,
    window_ms: u64,
) -> Option<GroupingEdges> {
    if event_id.is_empty() {
        return None;
    }
    let index = events.iter().position(|e| e.id == event_id)?;
    Some(grouping_edges(events, index, window_ms))
}

fn attaches(me: &TimelineEvent, neighbour: &TimelineEvent, window_ms: u64) -> bool {
    if neighbour.sender != me.sender || neighbour.is_redacted() || neighbour.is_edit() {
        return false;
    }
    // Clock skew can put a neighbour on either side, so bound both ways.
    if !me.has_known_timestamp() || !neighbour.has_known_timestamp() {
        return false;
    }
    me.origin_timestamp_ms.abs_diff(neighbour.origin_timestamp_ms) < window_ms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventType, RelationType, UNDEFINED_TIMESTAMP};

    fn msg(id: &str, sender: &str, ts: u64) -> TimelineEvent {
        TimelineEvent::new(id, EventType::Message, sender, ts)
    }

    #[test]
    fn test_close_messages_group() {
        let events = vec![msg("A", "u1", 0), msg("B", "u1", 120_000)];

        let b = grouping_edges_for(&events, "B", GROUPING_WINDOW_MS).unwrap();
        assert!(b.top);
        assert!(!b.bottom);

        let a = grouping_edges_for(&events, "A", GROUPING_WINDOW_MS).unwrap();
        assert!(a.bottom);
        assert!(!a.top);
    }

    #[test]
    fn test_distant_messages_do_not_group() {
        let events = vec![msg("A", "u1", 0), msg("B", "u1", 400_000)];
        assert!(grouping_edges(&events, 1, GROUPING_WINDOW_MS).is_empty());
    }

    #[test]
    fn test_window_is_symmetric_and_exclusive() {
        // Out-of-order timestamps still group when close enough.
        let events = vec![msg("A", "u1", 200_000), msg("B", "u1", 100_000)];
        assert!(grouping_edges(&events, 1, GROUPING_WINDOW_MS).top);

        let events = vec![msg("A", "u1", 0), msg("B", "u1", GROUPING_WINDOW_MS)];
        assert!(!grouping_edges(&events, 1, GROUPING_WINDOW_MS).top);
    }

    #[test]
    fn test_scan_skips_non_groupable_events() {
        let events = vec![
            msg("A", "u1", 0),
            TimelineEvent::new("M", EventType::Membership, "u2", 10),
            TimelineEvent::new("X", EventType::Encrypted, "u1", 20),
        ];
        assert!(grouping_edges(&events, 2, GROUPING_WINDOW_MS).top);
        assert!(grouping_edges(&events, 1, GROUPING_WINDOW_MS).is_empty());
    }

    #[test]
    fn test_neighbour_rules() {
        let mut redacted = msg("A", "u1", 0);
        redacted.redacted = true;
        let events = vec![redacted, msg("B", "u1", 10)];
        assert!(!grouping_edges(&events, 1, GROUPING_WINDOW_MS).top);

        let edit = msg("A", "u1", 0).relating_to("Z", RelationType::Replace);
        let events = vec![edit, msg("B", "u1", 10)];
        assert!(!grouping_edges(&events, 1, GROUPING_WINDOW_MS).top);

        let events = vec![msg("A", "u2", 0), msg("B", "u1", 10)];
        assert!(!grouping_edges(&events, 1, GROUPING_WINDOW_MS).top);

        let events = vec![msg("A", "u1", UNDEFINED_TIMESTAMP), msg("B", "u1", 10)];
        assert!(!grouping_edges(&events, 1, GROUPING_WINDOW_MS).top);
    }

    #[test]
    fn test_unknown_event_has_no_edges() {
        let events = vec![msg("A", "u1", 0)];
        assert!(grouping_edges_for(&events, "missing", GROUPING_WINDOW_MS).is_none());
        assert!(grouping_edges(&events, 5, GROUPING_WINDOW_MS).is_empty());
    }
}
