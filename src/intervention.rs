//! Intervention handling
//!
//! When a page presents an obstruction the automation cannot solve (a
//! challenge puzzle, an interstitial verification), the session suspends
//! interaction until the obstruction clears or a bounded wait elapses.

use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Upper bound on how long a session stays suspended for one intervention
pub const INTERVENTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Poll interval while suspended
pub const INTERVENTION_POLL: Duration = Duration::from_millis(1500);

/// In-page probe evaluated before interactions. Returns a short marker
/// string when a blocking challenge is visible, otherwise null.
pub const CHALLENGE_PROBE_JS: &str = r#"
(() => {
    const text = (document.body ? document.body.innerText : '').toLowerCase();
    const title = (document.title || '').toLowerCase();
    const markers = [
        'verify you are human',
        'checking your browser',
        'unusual traffic',
        'are you a robot',
        'complete the security check',
        'enable javascript and cookies to continue',
    ];
    for (const m of markers) {
        if (text.includes(m) || title.includes(m)) return m;
    }
    if (document.querySelector('.g-recaptcha, .h-captcha, #cf-challenge-running, iframe[src*="captcha"], iframe[src*="challenge"]')) {
        return 'challenge widget present';
    }
    return null;
})()
"#;

/// The two states of the intervention machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Active,
}

/// Tracks at most one active intervention per session
#[derive(Debug)]
pub struct InterventionGuard {
    state: State,
    message: Option<String>,
    activated_at: Option<Instant>,
}

impl Default for InterventionGuard {
    fn default() -> Self {
        Self {
            state: State::Idle,
            message: None,
            activated_at: None,
        }
    }
}

impl InterventionGuard {
    /// Create an idle guard
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an intervention is currently active
    pub fn active(&self) -> bool {
        self.state == State::Active
    }

    /// The obstruction message, while active
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Transition `Idle -> Active`. Returns `false` when already active:
    /// re-entrant activation is a no-op so duplicate waits never stack.
    pub fn activate<S: Into<String>>(&mut self, message: S) -> bool {
        if self.state == State::Active {
            return false;
        }
        let message = message.into();
        warn!(obstruction = %message, "intervention activated, suspending automation");
        self.state = State::Active;
        self.message = Some(message);
        self.activated_at = Some(Instant::now());
        true
    }

    /// Transition back to `Idle` unconditionally. A timeout is not a
    /// failure, merely a best-effort continuation point.
    pub fn clear(&mut self) {
        if self.state == State::Active {
            let held = self
                .activated_at
                .map(|t| t.elapsed())
                .unwrap_or(Duration::ZERO);
            info!(held_ms = held.as_millis() as u64, "intervention cleared");
        }
        self.state = State::Idle;
        self.message = None;
        self.activated_at = None;
    }

    /// Whether the bounded suspension window has elapsed
    pub fn expired(&self) -> bool {
        self.activated_at
            .map(|t| t.elapsed() >= INTERVENTION_TIMEOUT)
            .unwrap_or(false)
    }
}
