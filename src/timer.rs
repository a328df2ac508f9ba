//! The callout/timer queue (§4.1) that drives aging of every other
//! subsystem on a single-threaded cooperative schedule.
//!
//! Entries are stored as deltas from the previous entry's expiry, so
//! `age(elapsed)` only ever has to touch the head of the active list and
//! walk forward while accumulated deltas are covered by the elapsed time.
//! There is no wall-clock time in here at all — the event loop is
//! responsible for measuring elapsed seconds around each I/O wait and
//! feeding them in via [`TimerQueue::age`].

/// Handle returned by [`TimerQueue::set`]. Clearing an id that has already
/// fired (or was never valid) is a no-op, matching §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

struct Slot {
    id: u64,
    /// Seconds from the previous active entry's expiry to this one's.
    delta: i64,
    callback: Option<Box<dyn FnOnce() + 'static>>,
    next: Option<usize>,
    prev: Option<usize>,
}

/// A single-threaded queue of one-shot callbacks ordered by (relative)
/// expiry. See §4.1 and §9 "Coroutines/async" for the rationale behind
/// keeping this as an explicit relative-delay structure rather than
/// delegating to a generic async timer wheel: each periodic procedure in
/// this daemon (fast timer, slow timer, per-prune retransmit, last-member
/// query) is its own callback re-arming itself here.
#[derive(Default)]
pub struct TimerQueue {
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    head: Option<usize>,
    next_id: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            next_id: 1,
        }
    }

    fn alloc_id(&mut self) -> u64 {
        loop {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            if id != 0 {
                return id;
            }
        }
    }

    fn alloc_slot(&mut self) -> usize {
        if let Some(idx) = self.free.pop() {
            idx
        } else {
            self.slots.push(None);
            self.slots.len() - 1
        }
    }

    /// Schedule `callback` to run after `delay_sec` seconds (of [`age`]
    /// calls), and return an id that can later be passed to [`clear`].
    pub fn set<F>(&mut self, delay_sec: i64, callback: F) -> TimerId
    where
        F: FnOnce() + 'static,
    {
        let delay_sec = delay_sec.max(0);
        let id = self.alloc_id();

        // Walk the active list, tracking cumulative expiry, to find the
        // first entry whose absolute expiry exceeds `delay_sec`.
        let mut prev: Option<usize> = None;
        let mut cursor = self.head;
        let mut cumulative: i64 = 0;
        while let Some(idx) = cursor {
            let slot_delta = self.slots[idx].as_ref().unwrap().delta;
            if cumulative + slot_delta > delay_sec {
                break;
            }
            cumulative += slot_delta;
            prev = Some(idx);
            cursor = self.slots[idx].as_ref().unwrap().next;
        }

        let new_idx = self.alloc_slot();
        let new_delta = delay_sec - cumulative;
        // Splice in: whatever came after `cursor` now comes after us, and
        // loses `new_delta` worth of its own relative delay so its
        // absolute expiry is unaffected.
        if let Some(next_idx) = cursor {
            let next_slot = self.slots[next_idx].as_mut().unwrap();
            next_slot.delta -= new_delta;
            next_slot.prev = Some(new_idx);
        }
        self.slots[new_idx] = Some(Slot {
            id,
            delta: new_delta,
            callback: Some(Box::new(callback)),
            next: cursor,
            prev,
        });
        match prev {
            Some(prev_idx) => self.slots[prev_idx].as_mut().unwrap().next = Some(new_idx),
            None => self.head = Some(new_idx),
        }

        TimerId(id)
    }

    /// Cancel a pending timer. A no-op if `id` has already fired.
    pub fn clear(&mut self, id: TimerId) {
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let slot = self.slots[idx].as_ref().unwrap();
            if slot.id == id.0 {
                self.remove_slot(idx);
                return;
            }
            cursor = slot.next;
        }
    }

    fn remove_slot(&mut self, idx: usize) {
        let slot = self.slots[idx].take().unwrap();
        // Restore the removed entry's delta onto whatever follows it, so
        // that entry's absolute expiry is unchanged.
        if let Some(next_idx) = slot.next {
            self.slots[next_idx].as_mut().unwrap().delta += slot.delta;
            self.slots[next_idx].as_mut().unwrap().prev = slot.prev;
        }
        match slot.prev {
            Some(prev_idx) => self.slots[prev_idx].as_mut().unwrap().next = slot.next,
            None => self.head = slot.next,
        }
        self.free.push(idx);
    }

    /// Advance the queue by `elapsed_sec` seconds, running (in order) every
    /// callback whose cumulative delta has now been covered.
    pub fn age(&mut self, elapsed_sec: i64) {
        let mut remaining = elapsed_sec;
        while let Some(idx) = self.head {
            let delta = self.slots[idx].as_ref().unwrap().delta;
            if delta > remaining {
                self.slots[idx].as_mut().unwrap().delta -= remaining;
                return;
            }
            remaining -= delta;
            let mut slot = self.slots[idx].take().unwrap();
            self.head = slot.next;
            if let Some(next_idx) = self.head {
                self.slots[next_idx].as_mut().unwrap().prev = None;
            }
            self.free.push(idx);
            if let Some(cb) = slot.callback.take() {
                cb();
            }
        }
    }

    /// Seconds until the next callback fires, or -1 if the queue is empty.
    pub fn next_delay(&self) -> i64 {
        match self.head {
            Some(idx) => self.slots[idx].as_ref().unwrap().delta,
            None => -1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_next_delay_empty() {
        let q = TimerQueue::new();
        assert_eq!(q.next_delay(), -1);
    }

    #[test]
    fn test_fires_in_order() {
        let fired = Rc::new(RefCell::new(Vec::new()));
        let mut q = TimerQueue::new();

        let f1 = fired.clone();
        q.set(5, move || f1.borrow_mut().push("five"));
        let f2 = fired.clone();
        q.set(2, move || f2.borrow_mut().push("two"));
        let f3 = fired.clone();
        q.set(10, move || f3.borrow_mut().push("ten"));

        assert_eq!(q.next_delay(), 2);
        q.age(2);
        assert_eq!(*fired.borrow(), vec!["two"]);
        assert_eq!(q.next_delay(), 3); // 5 - 2

        q.age(3);
        assert_eq!(*fired.borrow(), vec!["two", "five"]);
        assert_eq!(q.next_delay(), 5); // 10 - 5

        q.age(5);
        assert_eq!(*fired.borrow(), vec!["two", "five", "ten"]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_age_fires_multiple_in_one_call() {
        let fired = Rc::new(RefCell::new(Vec::new()));
        let mut q = TimerQueue::new();
        for d in [1, 2, 3] {
            let f = fired.clone();
            q.set(d, move || f.borrow_mut().push(d));
        }
        q.age(100);
        assert_eq!(*fired.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn test_clear_is_noop_after_fire() {
        let mut q = TimerQueue::new();
        let id = q.set(1, || {});
        q.age(1);
        q.clear(id); // must not panic
    }

    #[test]
    fn test_clear_pending() {
        let fired = Rc::new(RefCell::new(false));
        let mut q = TimerQueue::new();
        let f = fired.clone();
        let id = q.set(5, move || *f.borrow_mut() = true);
        q.clear(id);
        q.age(10);
        assert!(!*fired.borrow());
    }

    #[test]
    fn test_clear_middle_preserves_others_absolute_expiry() {
        let fired = Rc::new(RefCell::new(Vec::new()));
        let mut q = TimerQueue::new();
        let f1 = fired.clone();
        q.set(3, move || f1.borrow_mut().push("a"));
        let f2 = fired.clone();
        let id_b = q.set(6, move || f2.borrow_mut().push("b"));
        let f3 = fired.clone();
        q.set(9, move || f3.borrow_mut().push("c"));

        q.clear(id_b);
        q.age(9);
        assert_eq!(*fired.borrow(), vec!["a", "c"]);
    }

    #[test]
    fn test_insert_before_existing_splices_delta() {
        let fired = Rc::new(RefCell::new(Vec::new()));
        let mut q = TimerQueue::new();
        let f1 = fired.clone();
        q.set(10, move || f1.borrow_mut().push("later"));
        let f2 = fired.clone();
        q.set(4, move || f2.borrow_mut().push("sooner"));

        q.age(4);
        assert_eq!(*fired.borrow(), vec!["sooner"]);
        assert_eq!(q.next_delay(), 6);
        q.age(6);
        assert_eq!(*fired.borrow(), vec!["sooner", "later"]);
    }
}
