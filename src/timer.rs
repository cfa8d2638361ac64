//! Timer bookkeeping
//!
//! [`TimeQueue`] keeps timer records ordered by due time (seconds, `f64`).
//! Records live in reusable slots; a [`TimerHandle`] pairs the slot id with
//! the slot's issue count, so a handle kept past its timer's lifetime is
//! recognised as stale even after the slot has been handed out again.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    id: u32,
    issue_count: u32,
}

impl TimerHandle {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn issue_count(&self) -> u32 {
        self.issue_count
    }
}

#[derive(Debug)]
struct TimerRecord<T> {
    time: f64,
    interval: Option<f64>,
    source: String,
    // None while the payload is out with the caller between pop and reschedule
    payload: Option<T>,
}

#[derive(Debug)]
struct Slot<T> {
    issue_count: u32,
    record: Option<TimerRecord<T>>,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    time: f64,
    seq: u64,
    handle: TimerHandle,
}

// Reversed so the std max-heap pops the earliest time first, ties in insertion order.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

/// A timer that came due, with its payload handed to the caller.
#[derive(Debug)]
pub struct Expired<T> {
    pub handle: TimerHandle,
    pub time: f64,
    pub source: String,
    pub payload: T,
    interval: Option<f64>,
}

impl<T> Expired<T> {
    pub fn is_repeating(&self) -> bool {
        self.interval.is_some()
    }
}

#[derive(Debug)]
pub struct TimeQueue<T> {
    heap: BinaryHeap<Entry>,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    next_seq: u64,
    live: usize,
}

impl<T> Default for TimeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimeQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            slots: Vec::new(),
            free: Vec::new(),
            next_seq: 0,
            live: 0,
        }
    }

    /// Schedule `payload` for `time`. With an `interval` the timer repeats
    /// every `interval` seconds after that until cancelled.
    pub fn add(&mut self, time: f64, interval: Option<f64>, source: &str, payload: T) -> TimerHandle {
        let record = TimerRecord {
            time,
            interval,
            source: source.to_string(),
            payload: Some(payload),
        };
        let id = match self.free.pop() {
            Some(id) => id,
            None => {
                self.slots.push(Slot {
                    issue_count: 0,
                    record: None,
                });
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[id as usize];
        slot.record = Some(record);
        let handle = TimerHandle {
            id,
            issue_count: slot.issue_count,
        };
        self.live += 1;
        self.push(time, handle);
        handle
    }

    /// Cancel a timer. Returns false for stale or already-fired handles.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        if !self.is_live(handle) {
            return false;
        }
        self.release(handle.id);
        true
    }

    pub fn is_live(&self, handle: TimerHandle) -> bool {
        self.slots
            .get(handle.id as usize)
            .is_some_and(|slot| slot.issue_count == handle.issue_count && slot.record.is_some())
    }

    /// Where the timer was registered from, if it is still live.
    pub fn source(&self, handle: TimerHandle) -> Option<&str> {
        if !self.is_live(handle) {
            return None;
        }
        self.slots[handle.id as usize]
            .record
            .as_ref()
            .map(|record| record.source.as_str())
    }

    /// Number of live timers.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Due time of the earliest pending timer.
    pub fn next_expiry(&mut self) -> Option<f64> {
        while let Some(entry) = self.heap.peek().copied() {
            if self.entry_is_current(&entry) {
                return Some(entry.time);
            }
            self.heap.pop();
        }
        None
    }

    /// Take the earliest timer due at or before `now`.
    ///
    /// One-shot timers are finished by this call. Repeating timers stay live
    /// and must be handed back through [`TimeQueue::reschedule`].
    pub fn pop_expired(&mut self, now: f64) -> Option<Expired<T>> {
        loop {
            let entry = *self.heap.peek()?;
            if !self.entry_is_current(&entry) {
                self.heap.pop();
                continue;
            }
            if entry.time > now {
                return None;
            }
            self.heap.pop();

            let slot = &mut self.slots[entry.handle.id as usize];
            let record = slot.record.as_mut()?;
            let payload = record.payload.take()?;
            let expired = Expired {
                handle: entry.handle,
                time: record.time,
                source: record.source.clone(),
                payload,
                interval: record.interval,
            };
            if expired.interval.is_none() {
                self.release(entry.handle.id);
            }
            return Some(expired);
        }
    }

    /// Put a repeating timer back in the queue one interval later.
    ///
    /// Returns false (dropping the payload) if the timer was one-shot or was
    /// cancelled while its payload was out.
    pub fn reschedule(&mut self, expired: Expired<T>) -> bool {
        let Some(interval) = expired.interval else {
            return false;
        };
        if !self.is_live(expired.handle) {
            return false;
        }
        let time = expired.time + interval;
        if let Some(record) = self.slots[expired.handle.id as usize].record.as_mut() {
            record.time = time;
            record.payload = Some(expired.payload);
        }
        self.push(time, expired.handle);
        true
    }

    fn push(&mut self, time: f64, handle: TimerHandle) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry { time, seq, handle });
    }

    fn entry_is_current(&self, entry: &Entry) -> bool {
        self.slots
            .get(entry.handle.id as usize)
            .and_then(|slot| {
                (slot.issue_count == entry.handle.issue_count)
                    .then_some(slot.record.as_ref())
                    .flatten()
            })
            .is_some_and(|record| record.payload.is_some() && record.time == entry.time)
    }

    fn release(&mut self, id: u32) {
        let slot = &mut self.slots[id as usize];
        slot.record = None;
        slot.issue_count = slot.issue_count.wrapping_add(1);
        self.free.push(id);
        self.live -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_in_time_order() {
        let mut queue = TimeQueue::new();
        queue.add(3.0, None, "c", 'c');
        queue.add(1.0, None, "a", 'a');
        queue.add(2.0, None, "b", 'b');

        assert_eq!(queue.next_expiry(), Some(1.0));
        assert!(queue.pop_expired(0.5).is_none());

        let fired: Vec<char> = std::iter::from_fn(|| queue.pop_expired(10.0))
            .map(|e| e.payload)
            .collect();
        assert_eq!(fired, vec!['a', 'b', 'c']);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_equal_times_keep_insertion_order() {
        let mut queue = TimeQueue::new();
        for i in 0..5 {
            queue.add(1.0, None, "same", i);
        }
        let fired: Vec<i32> = std::iter::from_fn(|| queue.pop_expired(1.0))
            .map(|e| e.payload)
            .collect();
        assert_eq!(fired, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_cancel() {
        let mut queue = TimeQueue::new();
        let a = queue.add(1.0, None, "a", 1);
        let b = queue.add(2.0, None, "b", 2);
        assert!(queue.cancel(a));
        assert!(!queue.cancel(a));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_expiry(), Some(2.0));
        assert_eq!(queue.pop_expired(5.0).unwrap().handle, b);
    }

    #[test]
    fn test_stale_handle_after_slot_reuse() {
        let mut queue = TimeQueue::new();
        let old = queue.add(1.0, None, "old", "old");
        assert_eq!(queue.pop_expired(1.0).unwrap().payload, "old");

        let new = queue.add(2.0, None, "new", "new");
        assert_eq!(new.id(), old.id());
        assert_ne!(new.issue_count(), old.issue_count());

        // cancelling through the stale handle must not touch the new timer
        assert!(!queue.cancel(old));
        assert!(queue.is_live(new));
        assert_eq!(queue.source(new), Some("new"));
        assert_eq!(queue.source(old), None);
    }

    #[test]
    fn test_repeating_timer() {
        let mut queue = TimeQueue::new();
        let handle = queue.add(1.0, Some(0.5), "tick", 0u32);

        let mut fired = Vec::new();
        let now = 2.0;
        while let Some(mut expired) = queue.pop_expired(now) {
            fired.push(expired.time);
            expired.payload += 1;
            assert!(expired.is_repeating());
            assert!(queue.reschedule(expired));
        }
        assert_eq!(fired, vec![1.0, 1.5, 2.0]);
        assert!(queue.is_live(handle));
        assert_eq!(queue.next_expiry(), Some(2.5));
        assert_eq!(queue.pop_expired(2.5).unwrap().payload, 3);
    }

    #[test]
    fn test_repeating_timer_cancelled_while_out() {
        let mut queue = TimeQueue::new();
        let handle = queue.add(1.0, Some(1.0), "tick", ());
        let expired = queue.pop_expired(1.0).unwrap();
        assert!(queue.cancel(handle));
        assert!(!queue.reschedule(expired));
        assert!(queue.is_empty());
        assert_eq!(queue.next_expiry(), None);
    }

    #[test]
    fn test_one_shot_not_rescheduled() {
        let mut queue = TimeQueue::new();
        queue.add(1.0, None, "once", ());
        let expired = queue.pop_expired(1.0).unwrap();
        assert!(!expired.is_repeating());
        assert!(!queue.reschedule(expired));
        assert!(queue.is_empty());
    }
}
