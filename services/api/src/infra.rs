use applyflow::config::WorkflowConfig;
use applyflow::workflows::onboarding::{
    CannedReplies, Clock, MonotonicClock, OnboardingSession, SessionDriver, SessionSettings,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn session_settings(config: &WorkflowConfig) -> SessionSettings {
    SessionSettings {
        stage_timings: config.stage_timings,
        chat: config.chat,
        replies: CannedReplies::standard(),
    }
}

/// Start a fresh session on tokio timers. Must run inside the runtime.
pub(crate) fn spawn_session_driver(settings: SessionSettings) -> Arc<SessionDriver> {
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let session = OnboardingSession::new(settings, clock.now());
    Arc::new(SessionDriver::spawn(session, clock))
}

/// Whole milliseconds for log fields, pinned at `u64::MAX` instead of wrapping.
pub(crate) fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
