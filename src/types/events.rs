use tokio::sync::broadcast;

/// A change to a room timeline. Renderers re-query the timeline on receipt;
/// a lagged receiver only misses notifications, never state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineUpdate {
    Inserted {
        event_id: String,
        prepended: bool,
    },
    Replaced {
        event_id: String,
    },
    Removed {
        event_id: String,
    },
    /// Receipt rows changed for these events.
    ReceiptsMoved {
        event_ids: Vec<String>,
    },
    LocalEchoChanged {
        transaction_id: String,
    },
    BackwardHistoryExhausted,
}

#[derive(Debug, Clone)]
pub struct UpdateBus {
    sender: broadcast::Sender<TimelineUpdate>,
}

impl UpdateBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            sender: broadcast::channel(capacity.max(1)).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimelineUpdate> {
        self.sender.subscribe()
    }

    /// Publishing with no subscribers is not an error.
    pub fn publish(&self, update: TimelineUpdate) {
        let _ = self.sender.send(update);
    }
}
