//! Typing-notification debounce, as a sans-io state machine.
//!
//! The caller owns the clock and the timer. Every input returns the
//! [`TypingActions`] to perform: at most one signal to send and one command for
//! the single-shot timer.

use std::time::{Duration, Instant};

pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypingState {
    #[default]
    Idle,
    Announcing {
        expires_at: Instant,
        last_refreshed_at: Instant,
    },
}

/// A typing notification for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingSignal {
    pub typing: bool,
    /// Zero for a stop signal.
    pub timeout: Duration,
}

impl TypingSignal {
    pub fn start(timeout: Duration) -> Self {
        Self {
            typing: true,
            timeout,
        }
    }

    pub fn stop() -> Self {
        Self {
            typing: false,
            timeout: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerCommand {
    #[default]
    Unchanged,
    /// Replace any pending timer with one firing after the delay.
    Arm(Duration),
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TypingActions {
    pub signal: Option<TypingSignal>,
    pub timer: TimerCommand,
}

#[derive(Debug, Clone)]
pub struct TypingDebouncer {
    window: Duration,
    state: TypingState,
}

impl Default for TypingDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_WINDOW)
    }
}

impl TypingDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: TypingState::Idle,
        }
    }

    pub fn state(&self) -> TypingState {
        self.state
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn set_typing(&mut self, typing: bool, now: Instant) -> TypingActions {
        if !typing {
            self.state = TypingState::Idle;
            return TypingActions {
                signal: Some(TypingSignal::stop()),
                timer: TimerCommand::Cancel,
            };
        }

        match self.state {
            TypingState::Announcing { expires_at, .. } if now < expires_at => {
                self.state = TypingState::Announcing {
                    expires_at,
                    last_refreshed_at: now,
                };
                TypingActions::default()
            }
            _ => self.announce(now),
        }
    }

    /// Handles the single-shot timer firing at `now`.
    pub fn on_timer(&mut self, now: Instant) -> TypingActions {
        let TypingState::Announcing {
            last_refreshed_at, ..
        } = self.state
        else {
            return TypingActions::default();
        };

        let keep_alive_until = last_refreshed_at + self.window * 2;
        let remaining = keep_alive_until.saturating_duration_since(now);
        if remaining.is_zero() {
            self.state = TypingState::Idle;
            return TypingActions {
                signal: Some(TypingSignal::stop()),
                timer: TimerCommand::Unchanged,
            };
        }

        self.state = TypingState::Announcing {
            expires_at: now + remaining,
            last_refreshed_at,
        };
        TypingActions {
            signal: Some(TypingSignal::start(remaining * 2)),
            timer: TimerCommand::Arm(remaining),
        }
    }

    fn announce(&mut self, now: Instant) -> TypingActions {
        self.state = TypingState::Announcing {
            expires_at: now + self.window,
            last_refreshed_at: now,
        };
        TypingActions {
            signal: Some(TypingSignal::start(self.window * 2)),
            timer: TimerCommand::Arm(self.window),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: Duration = DEFAULT_DEBOUNCE_WINDOW;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_first_keystroke_announces() {
        let t0 = Instant::now();
        let mut typing = TypingDebouncer::default();

        let actions = typing.set_typing(true, t0);

        assert_eq!(actions.signal, Some(TypingSignal::start(W * 2)));
        assert_eq!(actions.timer, TimerCommand::Arm(W));
        assert_eq!(
            typing.state(),
            TypingState::Announcing {
                expires_at: t0 + W,
                last_refreshed_at: t0,
            }
        );
    }

    #[test]
    fn test_keystrokes_inside_window_are_debounced() {
        let t0 = Instant::now();
        let mut typing = TypingDebouncer::default();
        typing.set_typing(true, t0);

        assert_eq!(typing.set_typing(true, t0 + ms(200)), TypingActions::default());
        assert_eq!(typing.set_typing(true, t0 + ms(500)), TypingActions::default());

        let TypingState::Announcing {
            last_refreshed_at, ..
        } = typing.state()
        else {
            panic!("expected announcing state");
        };
        assert_eq!(last_refreshed_at, t0 + ms(500));
    }

    #[test]
    fn test_keystroke_after_expiry_reannounces() {
        let t0 = Instant::now();
        let mut typing = TypingDebouncer::default();
        typing.set_typing(true, t0);

        let actions = typing.set_typing(true, t0 + W);
        assert_eq!(actions.signal, Some(TypingSignal::start(W * 2)));
        assert_eq!(actions.timer, TimerCommand::Arm(W));
    }

    #[test]
    fn test_timer_refreshes_while_recently_active() {
        let t0 = Instant::now();
        let mut typing = TypingDebouncer::default();
        typing.set_typing(true, t0);
        typing.set_typing(true, t0 + ms(500));

        let actions = typing.on_timer(t0 + W);

        // 500 + 2000 - 1000
        assert_eq!(actions.signal, Some(TypingSignal::start(ms(3000))));
        assert_eq!(actions.timer, TimerCommand::Arm(ms(1500)));
        assert_eq!(
            typing.state(),
            TypingState::Announcing {
                expires_at: t0 + ms(2500),
                last_refreshed_at: t0 + ms(500),
            }
        );

        let actions = typing.on_timer(t0 + ms(2500));
        assert_eq!(actions.signal, Some(TypingSignal::stop()));
        assert_eq!(typing.state(), TypingState::Idle);
    }

    #[test]
    fn test_stop_is_unconditional() {
        let t0 = Instant::now();
        let mut typing = TypingDebouncer::default();

        let idle_stop = typing.set_typing(false, t0);
        assert_eq!(idle_stop.signal, Some(TypingSignal::stop()));
        assert_eq!(idle_stop.timer, TimerCommand::Cancel);

        typing.set_typing(true, t0);
        let stop = typing.set_typing(false, t0 + ms(10));
        assert_eq!(stop.signal, Some(TypingSignal::stop()));
        assert_eq!(typing.state(), TypingState::Idle);
    }

    #[test]
    fn test_stale_timer_in_idle_does_nothing() {
        let mut typing = TypingDebouncer::default();
        assert_eq!(typing.on_timer(Instant::now()), TypingActions::default());
    }
}
