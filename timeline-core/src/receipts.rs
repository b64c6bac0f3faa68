//! Read receipt positions per event.

use crate::types::ReceiptEntry;
use std::collections::{HashMap, HashSet};

/// `event_id -> receipts`. A user appears under at most one event: a receipt
/// is a position, not a history.
#[derive(Debug, Clone, Default)]
pub struct ReadReceiptTable {
    rows: HashMap<String, Vec<ReceiptEntry>>,
}

impl ReadReceiptTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// First pass: drop every entry of a user whose marker just moved.
    ///
    /// Rows left empty are deleted. Returns the ids of the rows touched.
    pub fn evict(&mut self, moved_users: &[String]) -> Vec<String> {
        if moved_users.is_empty() {
            return Vec::new();
        }
        let moved: HashSet<&str> = moved_users.iter().map(String::as_str).collect();

        let mut touched = Vec::new();
        self.rows.retain(|event_id, entries| {
            let before = entries.len();
            entries.retain(|entry| !moved.contains(entry.user_id.as_str()));
            if entries.len() != before {
                touched.push(event_id.clone());
            }
            !entries.is_empty()
        });
        touched
    }

    /// Second pass: merge the authoritative receipt list for `event_id`.
    ///
    /// Local entries for users absent from `fetched` are kept, fetched entries
    /// are appended. Users in `fetched` are also stripped from every other row
    /// so the one-position-per-user rule holds whatever order receipts arrive
    /// in.
    pub fn place(&mut self, event_id: &str, fetched: Vec<ReceiptEntry>) {
        if event_id.is_empty() {
            return;
        }

        let fetched_users: HashSet<String> = fetched.iter().map(|e| e.user_id.clone()).collect();
        self.rows.retain(|id, entries| {
            if id != event_id {
                entries.retain(|entry| !fetched_users.contains(&entry.user_id));
            }
            !entries.is_empty()
        });

        let mut merged: Vec<ReceiptEntry> = self
            .rows
            .remove(event_id)
            .unwrap_or_default()
            .into_iter()
            .filter(|entry| !fetched_users.contains(&entry.user_id))
            .collect();
        merged.extend(fetched);

        if !merged.is_empty() {
            self.rows.insert(event_id.to_string(), merged);
        }
    }

    pub fn is_read(&self, event_id: &str) -> bool {
        self.rows.get(event_id).is_some_and(|row| !row.is_empty())
    }

    pub fn receipts_for(&self, event_id: &str) -> &[ReceiptEntry] {
        self.rows
            .get(event_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The event `user_id` has read up to, if known.
    pub fn position_of(&self, user_id: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|(_, entries)| entries.iter().any(|e| e.user_id == user_id))
            .map(|(event_id, _)| event_id.as_str())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
