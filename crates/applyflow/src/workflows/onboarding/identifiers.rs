use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

use super::domain::{ProcessId, TrackingCode};

static IDENTIFIER_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static GENERATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Token distinguishing one session lifetime from the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Generation(pub u64);

pub fn next_generation() -> Generation {
    Generation(GENERATION_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

fn next_sequence() -> u64 {
    IDENTIFIER_SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

pub fn next_process_id(now: DateTime<Utc>) -> ProcessId {
    let stamp = now.timestamp_millis().rem_euclid(1_000_000);
    ProcessId(format!("AP{stamp:06}-{:04}", next_sequence()))
}

/// Tracking codes share the process-wide sequence, so a reset session never sees a repeat.
pub fn next_tracking_code(now: DateTime<Utc>) -> TrackingCode {
    let stamp = now.timestamp_millis().rem_euclid(100_000_000);
    TrackingCode(format!("TR{stamp:08}-{:04}", next_sequence()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn identifiers_never_repeat_for_the_same_instant() {
        let now = Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap();
        let first = next_tracking_code(now);
        let second = next_tracking_code(now);
        assert_ne!(first, second);
        assert_ne!(first.0, next_process_id(now).0);
    }

    #[test]
    fn prefixes_distinguish_identifier_kinds() {
        let now = Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap();
        assert!(next_process_id(now).0.starts_with("AP"));
        assert!(next_tracking_code(now).0.starts_with("TR"));
    }

    #[test]
    fn generations_increase() {
        let Generation(a) = next_generation();
        let Generation(b) = next_generation();
        assert!(b > a);
    }
}
