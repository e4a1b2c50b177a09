// DeferredCallQueue - one-shot callbacks fired when time catches up
// Used for cleanup that must not run inside a processing pass

use crate::error::TimingResult;
use crate::timeline::{EventTimeline, time_lte};

/// A queued one-shot callback, invoked with its scheduled time
struct DeferredCall {
    callback: Box<dyn FnOnce(f64)>,
}

/// Queue of one-shot callbacks keyed by wall-clock time
///
/// `poll` drains everything due at or before the given time, in time
/// order, removing each call before invoking it so a callback can
/// safely schedule or clear other calls through a fresh borrow.
#[derive(Default)]
pub struct DeferredCallQueue {
    calls: EventTimeline<DeferredCall>,
}

impl DeferredCallQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `callback` to run once time reaches `at`; the returned
    /// id can be passed to [`clear`](Self::clear)
    pub fn schedule(&mut self, at: f64, callback: impl FnOnce(f64) + 'static) -> TimingResult<u64> {
        self.calls.add(
            at,
            DeferredCall {
                callback: Box::new(callback),
            },
        )
    }

    /// Drop a scheduled call; no-op if it already fired or was cleared
    pub fn clear(&mut self, id: u64) {
        self.calls.remove_seq(id);
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Fire every call scheduled at or before `now`
    pub fn poll(&mut self, now: f64) {
        while let Some(head) = self.calls.peek() {
            if !time_lte(head.time, now) {
                break;
            }
            if let Some(ev) = self.calls.shift() {
                (ev.payload.callback)(ev.time);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_fires_due_calls_in_order() {
        let fired = Rc::new(RefCell::new(Vec::new()));
        let mut queue = DeferredCallQueue::new();

        for at in [2.0, 1.0, 3.0] {
            let fired = Rc::clone(&fired);
            queue
                .schedule(at, move |time| fired.borrow_mut().push(time))
                .unwrap();
        }

        queue.poll(2.5);
        assert_eq!(*fired.borrow(), vec![1.0, 2.0]);
        assert_eq!(queue.len(), 1);

        queue.poll(10.0);
        assert_eq!(*fired.borrow(), vec![1.0, 2.0, 3.0]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear_cancels_a_call() {
        let fired = Rc::new(RefCell::new(0));
        let mut queue = DeferredCallQueue::new();

        let keep = Rc::clone(&fired);
        queue
            .schedule(1.0, move |_| *keep.borrow_mut() += 1)
            .unwrap();
        let dropped = Rc::clone(&fired);
        let id = queue
            .schedule(1.0, move |_| *dropped.borrow_mut() += 10)
            .unwrap();
        queue.clear(id);

        queue.poll(2.0);
        assert_eq!(*fired.borrow(), 1);
    }

    #[test]
    fn test_not_due_calls_wait() {
        let fired = Rc::new(RefCell::new(0));
        let mut queue = DeferredCallQueue::new();
        let counter = Rc::clone(&fired);
        queue
            .schedule(5.0, move |_| *counter.borrow_mut() += 1)
            .unwrap();

        queue.poll(4.9);
        assert_eq!(*fired.borrow(), 0);
        queue.poll(5.0);
        assert_eq!(*fired.borrow(), 1);
    }
}
