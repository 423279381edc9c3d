use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// Ordered queue of delayed tasks keyed by their due instant.
///
/// Tasks due at the same instant fire in the order they were scheduled.
#[derive(Debug)]
pub struct Timeline<T> {
    entries: BinaryHeap<Entry<T>>,
    issued: u64,
}

#[derive(Debug)]
struct Entry<T> {
    due: DateTime<Utc>,
    sequence: u64,
    task: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.sequence == other.sequence
    }
}

impl<T> Eq for Entry<T> {}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap pops the earliest entry.
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Default for Timeline<T> {
    fn default() -> Self {
        Self {
            entries: BinaryHeap::new(),
            issued: 0,
        }
    }
}

impl<T> Timeline<T> {
    pub fn schedule(&mut self, due: DateTime<Utc>, task: T) {
        let sequence = self.issued;
        self.issued += 1;
        self.entries.push(Entry {
            due,
            sequence,
            task,
        });
    }

    pub fn schedule_after(&mut self, now: DateTime<Utc>, delay: Duration, task: T) {
        self.schedule(offset(now, delay), task);
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.entries.peek().map(|entry| entry.due)
    }

    /// Remove the earliest task whose deadline is at or before `now`.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, T)> {
        if self.next_deadline()? > now {
            return None;
        }
        self.entries.pop().map(|entry| (entry.due, entry.task))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Add a std duration to an instant, saturating instead of overflowing.
pub fn offset(at: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    let millis = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
    TimeDelta::try_milliseconds(millis)
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap()
    }

    #[test]
    fn pops_in_deadline_order() {
        let mut timeline = Timeline::default();
        timeline.schedule_after(start(), Duration::from_secs(8), "second");
        timeline.schedule_after(start(), Duration::from_secs(4), "first");
        timeline.schedule_after(start(), Duration::from_secs(12), "third");

        let now = offset(start(), Duration::from_secs(20));
        let order: Vec<_> = std::iter::from_fn(|| timeline.pop_due(now))
            .map(|(_, task)| task)
            .collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[test]
    fn equal_deadlines_keep_schedule_order() {
        let mut timeline = Timeline::default();
        for task in ["a", "b", "c"] {
            timeline.schedule_after(start(), Duration::from_secs(2), task);
        }

        let now = offset(start(), Duration::from_secs(2));
        let order: Vec<_> = std::iter::from_fn(|| timeline.pop_due(now))
            .map(|(_, task)| task)
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn holds_tasks_until_due() {
        let mut timeline = Timeline::default();
        timeline.schedule_after(start(), Duration::from_secs(4), ());

        assert!(timeline
            .pop_due(offset(start(), Duration::from_millis(3_999)))
            .is_none());
        let (due, ()) = timeline
            .pop_due(offset(start(), Duration::from_secs(4)))
            .expect("due at exactly four seconds");
        assert_eq!(due, offset(start(), Duration::from_secs(4)));
        assert!(timeline.is_empty());
    }
}
