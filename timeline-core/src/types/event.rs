use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Sentinel for an event whose origin timestamp is unknown.
pub const UNDEFINED_TIMESTAMP: u64 = u64::MAX;

/// Timestamp carried by events replayed twice by a sync; never rendered.
pub const EPOCH_ZERO: u64 = 0;

/// Event type tag as delivered by the session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    #[default]
    Message,
    /// Placeholder for a message that could not be decrypted (yet).
    Encrypted,
    Membership,
    Topic,
    Name,
    CallInvite,
    CallAnswer,
    CallHangup,
    CallReject,
    Reaction,
    Redaction,
    Receipt,
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Message => "message",
            Self::Encrypted => "encrypted",
            Self::Membership => "membership",
            Self::Topic => "topic",
            Self::Name => "name",
            Self::CallInvite => "call-invite",
            Self::CallAnswer => "call-answer",
            Self::CallHangup => "call-hangup",
            Self::CallReject => "call-reject",
            Self::Reaction => "reaction",
            Self::Redaction => "redaction",
            Self::Receipt => "receipt",
            Self::Other(tag) => tag,
        }
    }

    /// Invite or answer: the events that open a call span.
    pub fn starts_call(&self) -> bool {
        matches!(self, Self::CallInvite | Self::CallAnswer)
    }

    /// Hangup or reject: the events that close a call span.
    pub fn ends_call(&self) -> bool {
        matches!(self, Self::CallHangup | Self::CallReject)
    }

    pub fn is_call_lifecycle(&self) -> bool {
        self.starts_call() || self.ends_call()
    }

    /// Types whose bubbles may merge with a same-sender neighbour.
    pub fn is_groupable(&self) -> bool {
        matches!(self, Self::Message | Self::Encrypted)
    }

    /// Types the renderer knows how to draw.
    pub fn is_renderable(&self) -> bool {
        matches!(
            self,
            Self::Message | Self::Encrypted | Self::Membership | Self::Topic | Self::Name
        ) || self.is_call_lifecycle()
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        match s {
            "message" => Self::Message,
            "encrypted" => Self::Encrypted,
            "membership" => Self::Membership,
            "topic" => Self::Topic,
            "name" => Self::Name,
            "call-invite" => Self::CallInvite,
            "call-answer" => Self::CallAnswer,
            "call-hangup" => Self::CallHangup,
            "call-reject" => Self::CallReject,
            "reaction" => Self::Reaction,
            "redaction" => Self::Redaction,
            "receipt" => Self::Receipt,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<EventType> for String {
    fn from(t: EventType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an event relates to the event named by `relates_to_event_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RelationType {
    /// An edit: the relating event carries replacement content.
    Replace,
    /// A reaction.
    Annotation,
    Reference,
    Thread,
    Other(String),
}

impl RelationType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Replace => "replace",
            Self::Annotation => "annotation",
            Self::Reference => "reference",
            Self::Thread => "thread",
            Self::Other(tag) => tag,
        }
    }
}

impl From<String> for RelationType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "replace" => Self::Replace,
            "annotation" => Self::Annotation,
            "reference" => Self::Reference,
            "thread" => Self::Thread,
            _ => Self::Other(s),
        }
    }
}

impl From<RelationType> for String {
    fn from(r: RelationType) -> Self {
        r.as_str().to_string()
    }
}

/// Local-echo lifecycle of an outgoing event.
///
/// `Preparing -> Sending -> Sent`, or `Failed` from any unsent state.
/// `Sent` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendState {
    Preparing,
    Sending,
    /// Remote events are always `Sent`.
    #[default]
    Sent,
    Failed,
}

impl SendState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }

    pub fn can_advance_to(self, next: SendState) -> bool {
        match (self, next) {
            (Self::Preparing, Self::Sending | Self::Sent | Self::Failed) => true,
            (Self::Sending, Self::Sent | Self::Failed) => true,
            _ => false,
        }
    }

    /// Returns `next` if the transition is legal, otherwise `self`.
    pub fn advanced_to(self, next: SendState) -> SendState {
        if self.can_advance_to(next) { next } else { self }
    }
}

/// Where an event enters the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Live push, appended at the tail.
    #[default]
    Forward,
    /// Backward pagination, prepended at the head.
    Backward,
}

fn undefined_timestamp() -> u64 {
    UNDEFINED_TIMESTAMP
}

/// A single event of a room timeline as delivered by the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Empty only for bare receipt events.
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub sender: String,
    #[serde(default = "undefined_timestamp")]
    pub origin_timestamp_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relates_to_event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_type: Option<RelationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redacts_event_id: Option<String>,
    #[serde(default)]
    pub content: Map<String, Value>,
    #[serde(default)]
    pub send_state: SendState,
    /// Correlates a local echo with its remote echo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    /// Id of the edit whose content was merged into this event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced_by: Option<String>,
    #[serde(default)]
    pub redacted: bool,
}

impl TimelineEvent {
    pub fn new(
        id: impl Into<String>,
        event_type: EventType,
        sender: impl Into<String>,
        origin_timestamp_ms: u64,
    ) -> Self {
        Self {
            id: id.into(),
            event_type,
            sender: sender.into(),
            origin_timestamp_ms,
            relates_to_event_id: None,
            relation_type: None,
            redacts_event_id: None,
            content: Map::new(),
            send_state: SendState::Sent,
            transaction_id: None,
            replaced_by: None,
            redacted: false,
        }
    }

    pub fn with_content(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.content.insert(key.to_string(), value.into());
        self
    }

    pub fn relating_to(mut self, target: impl Into<String>, relation: RelationType) -> Self {
        self.relates_to_event_id = Some(target.into());
        self.relation_type = Some(relation);
        self
    }

    pub fn redacting(mut self, target: impl Into<String>) -> Self {
        self.redacts_event_id = Some(target.into());
        self
    }

    pub fn with_transaction_id(mut self, txn_id: impl Into<String>) -> Self {
        self.transaction_id = Some(txn_id.into());
        self
    }

    pub fn with_send_state(mut self, state: SendState) -> Self {
        self.send_state = state;
        self
    }

    pub fn has_id(&self) -> bool {
        !self.id.is_empty()
    }

    pub fn has_known_timestamp(&self) -> bool {
        self.origin_timestamp_ms != UNDEFINED_TIMESTAMP
    }

    pub fn origin_time(&self) -> Option<DateTime<Utc>> {
        if !self.has_known_timestamp() {
            return None;
        }
        let millis = i64::try_from(self.origin_timestamp_ms).ok()?;
        Utc.timestamp_millis_opt(millis).single()
    }

    /// True for an event that replaces the content of another one.
    pub fn is_edit(&self) -> bool {
        self.relation_type == Some(RelationType::Replace) && self.relates_to_event_id.is_some()
    }

    /// True once an edit has been merged into this event.
    pub fn is_edited(&self) -> bool {
        self.replaced_by.is_some()
    }

    pub fn is_redacted(&self) -> bool {
        self.redacted
    }

    pub fn edit_target(&self) -> Option<&str> {
        if self.is_edit() {
            self.relates_to_event_id.as_deref()
        } else {
            None
        }
    }

    pub fn call_id(&self) -> Option<&str> {
        self.content
            .get("call_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    /// The annotation key of a reaction, e.g. an emoji.
    pub fn reaction_key(&self) -> Option<&str> {
        self.content
            .get("key")
            .or_else(|| self.content.get("m.relates_to").and_then(|r| r.get("key")))
            .and_then(Value::as_str)
            .filter(|key| !key.is_empty())
    }

    pub fn body(&self) -> Option<&str> {
        self.content.get("body").and_then(Value::as_str)
    }

    /// Builds the element that results from applying `edit` to `self`.
    ///
    /// Identity, sender, position-relevant timestamp and relation of the
    /// original are kept. The content is the edit's `new_content` when present,
    /// else the edit's whole content. The send state only ever moves forward.
    pub fn merged_with_edit(&self, edit: &TimelineEvent) -> TimelineEvent {
        let content = match edit.content.get("new_content") {
            Some(Value::Object(new_content)) => new_content.clone(),
            _ => edit.content.clone(),
        };

        TimelineEvent {
            content,
            send_state: self.send_state.advanced_to(edit.send_state),
            replaced_by: Some(edit.id.clone()),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_round_trips_through_tags() {
        for tag in ["message", "call-invite", "call-reject", "receipt"] {
            assert_eq!(EventType::from(tag).as_str(), tag);
        }
        assert_eq!(
            EventType::from("m.sticker"),
            EventType::Other("m.sticker".to_string())
        );
    }

    #[test]
    fn test_event_deserializes_with_defaults() {
        let event: TimelineEvent = serde_json::from_value(json!({
            "type": "receipt",
            "content": { "senders": ["u1"], "event_ids": ["e1"] }
        }))
        .unwrap();

        assert!(!event.has_id());
        assert_eq!(event.event_type, EventType::Receipt);
        assert!(!event.has_known_timestamp());
        assert_eq!(event.send_state, SendState::Sent);
        assert!(event.origin_time().is_none());
    }

    #[test]
    fn test_send_state_is_monotonic() {
        assert_eq!(
            SendState::Preparing.advanced_to(SendState::Sending),
            SendState::Sending
        );
        assert_eq!(
            SendState::Sent.advanced_to(SendState::Preparing),
            SendState::Sent
        );
        assert_eq!(
            SendState::Failed.advanced_to(SendState::Sent),
            SendState::Failed
        );
        assert!(SendState::Sending.can_advance_to(SendState::Failed));
    }

    #[test]
    fn test_merge_prefers_new_content_and_keeps_identity() {
        let original = TimelineEvent::new("e1", EventType::Message, "u1", 1_000)
            .with_content("body", "helo")
            .with_send_state(SendState::Sending);
        let edit = TimelineEvent::new("e2", EventType::Message, "u1", 2_000)
            .relating_to("e1", RelationType::Replace)
            .with_content("body", "* hello")
            .with_content("new_content", json!({ "body": "hello" }));

        let merged = original.merged_with_edit(&edit);

        assert_eq!(merged.id, "e1");
        assert_eq!(merged.origin_timestamp_ms, 1_000);
        assert_eq!(merged.body(), Some("hello"));
        assert_eq!(merged.replaced_by.as_deref(), Some("e2"));
        assert_eq!(merged.send_state, SendState::Sent);
        assert!(merged.is_edited());
        assert!(!merged.is_edit());
    }

    #[test]
    fn test_reaction_key_falls_back_to_relation_block() {
        let event = TimelineEvent::new("r1", EventType::Reaction, "u1", 5)
            .with_content("m.relates_to", json!({ "key": "👍" }));
        assert_eq!(event.reaction_key(), Some("👍"));

        let empty = TimelineEvent::new("r2", EventType::Reaction, "u1", 5).with_content("key", "");
        assert_eq!(empty.reaction_key(), None);
    }
}
