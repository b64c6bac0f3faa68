use super::event::{EventType, TimelineEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A per-user "read up to here" marker attached to one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptEntry {
    pub user_id: String,
    pub timestamp_ms: u64,
}

impl ReceiptEntry {
    pub fn new(user_id: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            user_id: user_id.into(),
            timestamp_ms,
        }
    }
}

/// A batch of read markers that just moved.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReceiptEvent {
    pub senders_who_just_moved: Vec<String>,
    pub now_read_event_ids: Vec<String>,
}

impl ReceiptEvent {
    /// Reads a receipt event's `senders` and `event_ids` arrays.
    ///
    /// Returns `None` for non-receipt events and for receipts missing either
    /// array; non-string items are skipped.
    pub fn from_event(event: &TimelineEvent) -> Option<Self> {
        if event.event_type != EventType::Receipt {
            return None;
        }

        let strings = |key: &str| -> Option<Vec<String>> {
            let items = event.content.get(key)?.as_array()?;
            Some(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            )
        };

        let receipt = Self {
            senders_who_just_moved: strings("senders")?,
            now_read_event_ids: strings("event_ids")?,
        };
        if receipt.senders_who_just_moved.is_empty() && receipt.now_read_event_ids.is_empty() {
            return None;
        }
        Some(receipt)
    }
}
