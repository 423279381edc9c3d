use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use super::session::{OnboardingSession, SessionSnapshot};
use super::timeline::offset;

/// Source of the current instant for the driver.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock anchor advanced by tokio's monotonic clock.
///
/// Follows tokio's paused time in tests, so timer behavior can be checked without sleeping.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    anchor_wall: DateTime<Utc>,
    anchor: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::anchored_at(Utc::now())
    }

    pub fn anchored_at(anchor_wall: DateTime<Utc>) -> Self {
        Self {
            anchor_wall,
            anchor: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        offset(self.anchor_wall, self.anchor.elapsed())
    }
}

struct Shared {
    session: Mutex<OnboardingSession>,
    wake: Notify,
    clock: Arc<dyn Clock>,
}

/// Runs a session's timers on the tokio event loop.
///
/// Dropping the driver detaches every pending timer.
pub struct SessionDriver {
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl SessionDriver {
    /// Must be called from within a tokio runtime.
    pub fn spawn(session: OnboardingSession, clock: Arc<dyn Clock>) -> Self {
        let shared = Arc::new(Shared {
            session: Mutex::new(session),
            wake: Notify::new(),
            clock,
        });
        let task = tokio::spawn(run(shared.clone()));
        Self { shared, task }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.shared.clock.now()
    }

    /// Apply an intent against an up-to-date session.
    ///
    /// Timers that are already due fire first, then the closure runs with the current
    /// instant, then the timer loop re-arms for whatever the intent scheduled.
    pub async fn with_session<R>(
        &self,
        apply: impl FnOnce(&mut OnboardingSession, DateTime<Utc>) -> R,
    ) -> R {
        let result = {
            let mut session = self.shared.session.lock().await;
            let now = self.shared.clock.now();
            session.poll(now);
            apply(&mut *session, now)
        };
        self.shared.wake.notify_one();
        result
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.with_session(|session, _| session.snapshot()).await
    }
}

impl Drop for SessionDriver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(shared: Arc<Shared>) {
    loop {
        let deadline = {
            let mut session = shared.session.lock().await;
            let events = session.poll(shared.clock.now());
            if !events.is_empty() {
                debug!(
                    transitions = events.transitions.len(),
                    replies = events.replies.len(),
                    "timers fired"
                );
            }
            session.next_deadline()
        };

        match deadline {
            Some(deadline) => {
                let wait = (deadline - shared.clock.now())
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = shared.wake.notified() => {}
                }
            }
            None => shared.wake.notified().await,
        }
    }
}
