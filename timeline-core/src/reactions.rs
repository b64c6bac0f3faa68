//! Reaction grouping for a target event.

use crate::types::{EventType, TimelineEvent};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reaction {
    pub id: String,
    pub sender: String,
    pub timestamp_ms: u64,
    pub key: String,
}

impl Reaction {
    /// Returns `None` for anything that is not a well-formed reaction.
    pub fn from_event(event: &TimelineEvent) -> Option<Self> {
        if event.event_type != EventType::Reaction || !event.has_id() || event.sender.is_empty() {
            return None;
        }
        Some(Self {
            id: event.id.clone(),
            sender: event.sender.clone(),
            timestamp_ms: event.origin_timestamp_ms,
            key: event.reaction_key()?.to_string(),
        })
    }
}

/// All reactions sharing one key, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionGroup {
    pub key: String,
    pub reactions: Vec<Reaction>,
    pub count: usize,
    pub first_timestamp_ms: u64,
}

impl ReactionGroup {
    pub fn contains_reaction(&self, sender: &str) -> bool {
        self.reaction(sender).is_some()
    }

    /// The reaction `sender` placed under this key, for toggling it off.
    pub fn reaction(&self, sender: &str) -> Option<&Reaction> {
        self.reactions.iter().find(|r| r.sender == sender)
    }
}

/// Events whose relation points at `target_id`.
pub fn related_events<'a>(
    events: &'a [TimelineEvent],
    target_id: &'a str,
) -> impl Iterator<Item = &'a TimelineEvent> + 'a {
    events.iter().filter(move |e| {
        !target_id.is_empty() && e.relates_to_event_id.as_deref() == Some(target_id)
    })
}

/// Well-formed reactions to `target_id`; malformed ones are skipped.
pub fn reactions_for(events: &[TimelineEvent], target_id: &str) -> Vec<Reaction> {
    related_events(events, target_id)
        .filter_map(Reaction::from_event)
        .collect()
}

/// Reactions to `target_id` grouped by key, groups ordered by their oldest
/// member.
pub fn grouped_reactions(events: &[TimelineEvent], target_id: &str) -> Vec<ReactionGroup> {
    let mut by_key: HashMap<String, Vec<Reaction>> = HashMap::new();
    for reaction in reactions_for(events, target_id) {
        by_key.entry(reaction.key.clone()).or_default().push(reaction);
    }

    let mut groups: Vec<ReactionGroup> = by_key
        .into_iter()
        .map(|(key, mut reactions)| {
            reactions.sort_by_key(|r| r.timestamp_ms);
            let first_timestamp_ms = reactions.first().map_or(0, |r| r.timestamp_ms);
            ReactionGroup {
                key,
                count: reactions.len(),
                reactions,
                first_timestamp_ms,
            }
        })
        .collect();

    groups.sort_by(|a, b| {
        a.first_timestamp_ms
            .cmp(&b.first_timestamp_ms)
            .then_with(|| a.key.cmp(&b.key))
    });
    groups
}
