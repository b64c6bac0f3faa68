use crate::error::TimelineError;
use log::{debug, warn};
use std::sync::{Arc, Weak};
use std::time::Duration;
use timeline_core::Session;
use timeline_core::typing::{TimerCommand, TypingDebouncer, TypingSignal, TypingState};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Drives [`TypingDebouncer`] with a tokio clock and a single-shot timer.
///
/// Sends happen while the machine is locked, so the session sees signals in
/// the order the state machine produced them.
pub struct TypingController {
    inner: Arc<TypingInner>,
}

struct TypingInner {
    session: Arc<dyn Session>,
    machine: Mutex<TypingMachine>,
}

struct TypingMachine {
    debouncer: TypingDebouncer,
    timer: Option<JoinHandle<()>>,
    /// Bumped whenever the timer is replaced or cancelled; a timer task that
    /// wakes up with an older generation does nothing.
    generation: u64,
}

fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

impl TypingController {
    pub fn new(session: Arc<dyn Session>, window: Duration) -> Self {
        Self {
            inner: Arc::new(TypingInner {
                session,
                machine: Mutex::new(TypingMachine {
                    debouncer: TypingDebouncer::new(window),
                    timer: None,
                    generation: 0,
                }),
            }),
        }
    }

    pub async fn set_typing(&self, typing: bool) -> Result<(), TimelineError> {
        let mut machine = self.inner.machine.lock().await;
        let actions = machine.debouncer.set_typing(typing, now());
        TypingInner::apply_timer(&self.inner, &mut machine, actions.timer);

        match actions.signal {
            Some(signal) => self
                .inner
                .send(signal)
                .await
                .map_err(TimelineError::Session),
            None => Ok(()),
        }
    }

    pub async fn state(&self) -> TypingState {
        self.inner.machine.lock().await.debouncer.state()
    }

    pub async fn is_announcing(&self) -> bool {
        matches!(self.state().await, TypingState::Announcing { .. })
    }
}

impl Drop for TypingController {
    fn drop(&mut self) {
        if let Ok(mut machine) = self.inner.machine.try_lock() {
            if let Some(timer) = machine.timer.take() {
                timer.abort();
            }
        }
    }
}

impl TypingInner {
    async fn send(&self, signal: TypingSignal) -> Result<(), anyhow::Error> {
        debug!(
            target: "Timeline/Typing",
            "Sending typing={} timeout={}ms",
            signal.typing,
            signal.timeout.as_millis()
        );
        self.session.send_typing(signal.typing, signal.timeout).await
    }

    fn apply_timer(this: &Arc<Self>, machine: &mut TypingMachine, command: TimerCommand) {
        match command {
            TimerCommand::Unchanged => {}
            TimerCommand::Cancel => {
                machine.generation += 1;
                if let Some(timer) = machine.timer.take() {
                    timer.abort();
                }
            }
            TimerCommand::Arm(delay) => {
                machine.generation += 1;
                if let Some(timer) = machine.timer.take() {
                    timer.abort();
                }
                let generation = machine.generation;
                let weak: Weak<Self> = Arc::downgrade(this);
                machine.timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(inner) = weak.upgrade() {
                        inner.on_timer(generation).await;
                    }
                }));
            }
        }
    }

    async fn on_timer(self: Arc<Self>, generation: u64) {
        let mut machine = self.machine.lock().await;
        if machine.generation != generation {
            return;
        }
        // This task is the timer; forget its handle before re-arming.
        machine.timer = None;

        let actions = machine.debouncer.on_timer(now());
        Self::apply_timer(&self, &mut machine, actions.timer);

        if let Some(signal) = actions.signal {
            if let Err(e) = self.send(signal).await {
                warn!(target: "Timeline/Typing", "Timer-driven typing update failed: {e:?}");
            }
        }
    }
}
