//! Deadline-ordered timers for all sessions of a service.
//!
//! Starting a timer bumps its generation; expired heap entries whose
//! generation is no longer current were cancelled or restarted and are
//! dropped silently.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use crate::types::{DeviceAddress, Timestamp};

/// The timers a session can arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    /// The AG has to close the in-flight command.
    Response,
    /// A transient connection or audio state has to settle.
    Connection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TimerEntry {
    deadline: Timestamp,
    address: DeviceAddress,
    kind: TimerKind,
    generation: u64,
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of pending timers.
#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    armed: HashMap<(DeviceAddress, TimerKind), u64>,
    next_generation: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) a timer to fire `after` from `now`.
    pub fn start(&mut self, address: DeviceAddress, kind: TimerKind, now: Timestamp, after: Duration) {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.armed.insert((address, kind), generation);
        self.heap.push(TimerEntry {
            deadline: now.after(after),
            address,
            kind,
            generation,
        });
    }

    /// Disarm a timer. Cancelling an unarmed timer is a no-op.
    pub fn cancel(&mut self, address: DeviceAddress, kind: TimerKind) {
        self.armed.remove(&(address, kind));
    }

    /// Disarm every timer of a device.
    pub fn cancel_all(&mut self, address: DeviceAddress) {
        self.armed.retain(|(a, _), _| *a != address);
    }

    pub fn is_armed(&self, address: DeviceAddress, kind: TimerKind) -> bool {
        self.armed.contains_key(&(address, kind))
    }

    fn is_current(&self, entry: &TimerEntry) -> bool {
        self.armed.get(&(entry.address, entry.kind)) == Some(&entry.generation)
    }

    /// Earliest deadline of an armed timer.
    pub fn next_deadline(&mut self) -> Option<Timestamp> {
        while let Some(top) = self.heap.peek() {
            if self.is_current(top) {
                return Some(top.deadline);
            }
            self.heap.pop();
        }
        None
    }

    /// Disarm and return every timer due at `now`, earliest first.
    pub fn pop_expired(&mut self, now: Timestamp) -> Vec<(DeviceAddress, TimerKind)> {
        let mut expired = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.deadline > now {
                break;
            }
            let Some(entry) = self.heap.pop() else { break };
            if self.is_current(&entry) {
                self.armed.remove(&(entry.address, entry.kind));
                expired.push((entry.address, entry.kind));
            }
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: DeviceAddress = DeviceAddress::new([0, 0, 0, 0, 0, 1]);
    const B: DeviceAddress = DeviceAddress::new([0, 0, 0, 0, 0, 2]);

    #[test]
    fn test_fires_in_deadline_order() {
        let mut timers = TimerQueue::new();
        timers.start(A, TimerKind::Response, Timestamp::ZERO, Duration::from_secs(30));
        timers.start(B, TimerKind::Connection, Timestamp::ZERO, Duration::from_secs(10));

        assert_eq!(timers.next_deadline(), Some(Timestamp::from_secs(10)));
        assert!(timers.pop_expired(Timestamp::from_secs(9)).is_empty());
        assert_eq!(
            timers.pop_expired(Timestamp::from_secs(30)),
            vec![(B, TimerKind::Connection), (A, TimerKind::Response)]
        );
        assert_eq!(timers.next_deadline(), None);
    }

    #[test]
    fn test_cancelled_timer_never_fires() {
        let mut timers = TimerQueue::new();
        timers.start(A, TimerKind::Response, Timestamp::ZERO, Duration::from_secs(1));
        timers.cancel(A, TimerKind::Response);
        assert!(!timers.is_armed(A, TimerKind::Response));
        assert_eq!(timers.next_deadline(), None);
        assert!(timers.pop_expired(Timestamp::from_secs(5)).is_empty());
    }

    #[test]
    fn test_restart_supersedes_earlier_deadline() {
        let mut timers = TimerQueue::new();
        timers.start(A, TimerKind::Response, Timestamp::ZERO, Duration::from_secs(1));
        timers.start(A, TimerKind::Response, Timestamp::from_secs(1), Duration::from_secs(30));

        assert!(timers.pop_expired(Timestamp::from_secs(2)).is_empty());
        assert_eq!(timers.next_deadline(), Some(Timestamp::from_secs(31)));
        assert_eq!(timers.pop_expired(Timestamp::from_secs(31)), vec![(A, TimerKind::Response)]);
    }

    #[test]
    fn test_cancel_all_for_device() {
        let mut timers = TimerQueue::new();
        timers.start(A, TimerKind::Response, Timestamp::ZERO, Duration::from_secs(1));
        timers.start(A, TimerKind::Connection, Timestamp::ZERO, Duration::from_secs(1));
        timers.start(B, TimerKind::Connection, Timestamp::ZERO, Duration::from_secs(1));
        timers.cancel_all(A);
        assert_eq!(timers.pop_expired(Timestamp::from_secs(1)), vec![(B, TimerKind::Connection)]);
    }
}
