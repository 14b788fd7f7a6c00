//! Deferred callbacks on a virtual clock
//!
//! Every countdown in the game (square arming and expiry, flower wilt,
//! wild-card spin, last-chance offer, step pacing) is an entry here. Nothing
//! runs concurrently: the shell advances the clock and due timers are handed
//! back one at a time, earliest first.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::formation::Square;

/// What a timer is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerTag {
    /// Square becomes clickable
    ArmSquare(Square),
    /// Armed square was not clicked in time
    ExpireSquare(Square),
    FlowerTimeout,
    WildCardSpin,
    LastChance,
    /// Next rotation step (or cycle end) after the step animation
    StepContinuation,
}

/// Handle for cancelling a scheduled timer. Orders by due time, then by scheduling order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerHandle {
    due: Duration,
    seq: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    now: Duration,
    next_seq: u64,
    pending: BTreeMap<TimerHandle, TimerTag>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn schedule(&mut self, after: Duration, tag: TimerTag) -> TimerHandle {
        let handle = TimerHandle {
            due: self.now + after,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.pending.insert(handle, tag);
        handle
    }

    /// Returns false if the timer already fired or was cancelled
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.pending.remove(&handle).is_some()
    }

    /// Drop every pending timer; returns how many were dropped
    pub fn cancel_all(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Remove the earliest timer due at or before `until`, moving the clock to its due time
    pub fn pop_due(&mut self, until: Duration) -> Option<(TimerHandle, TimerTag)> {
        let (&handle, _) = self.pending.first_key_value()?;
        if handle.due > until {
            return None;
        }
        let tag = self.pending.remove(&handle)?;
        self.now = self.now.max(handle.due);
        Some((handle, tag))
    }

    /// Move the clock forward to `until` (never backward)
    pub fn advance_to(&mut self, until: Duration) {
        self.now = self.now.max(until);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_fires_in_due_order() {
        let mut s = Scheduler::new();
        s.schedule(ms(300), TimerTag::FlowerTimeout);
        s.schedule(ms(100), TimerTag::WildCardSpin);
        s.schedule(ms(100), TimerTag::LastChance);

        let fired: Vec<TimerTag> = std::iter::from_fn(|| s.pop_due(ms(1000)).map(|(_, t)| t)).collect();
        assert_eq!(
            fired,
            vec![TimerTag::WildCardSpin, TimerTag::LastChance, TimerTag::FlowerTimeout]
        );
        assert_eq!(s.now(), ms(300));
    }

    #[test]
    fn test_not_due_yet() {
        let mut s = Scheduler::new();
        s.schedule(ms(500), TimerTag::StepContinuation);
        assert!(s.pop_due(ms(499)).is_none());
        s.advance_to(ms(499));
        assert_eq!(s.now(), ms(499));
        assert!(s.pop_due(ms(500)).is_some());
    }

    #[test]
    fn test_cancel() {
        let mut s = Scheduler::new();
        let a = s.schedule(ms(10), TimerTag::FlowerTimeout);
        let b = s.schedule(ms(20), TimerTag::LastChance);
        assert!(s.cancel(a));
        assert!(!s.cancel(a));
        assert_eq!(s.len(), 1);
        assert_eq!(s.pop_due(ms(100)).map(|(h, _)| h), Some(b));
        assert!(!s.cancel(b));
    }

    #[test]
    fn test_cancel_all() {
        let mut s = Scheduler::new();
        for _ in 0..5 {
            s.schedule(ms(1), TimerTag::StepContinuation);
        }
        assert_eq!(s.cancel_all(), 5);
        assert!(s.is_empty());
        assert!(s.pop_due(ms(1000)).is_none());
    }

    #[test]
    fn test_schedule_is_relative_to_now() {
        let mut s = Scheduler::new();
        s.advance_to(ms(1000));
        s.schedule(ms(250), TimerTag::WildCardSpin);
        assert!(s.pop_due(ms(1249)).is_none());
        assert!(s.pop_due(ms(1250)).is_some());
        assert_eq!(s.now(), ms(1250));
    }
}
