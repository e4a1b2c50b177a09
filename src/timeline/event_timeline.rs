// EventTimeline - Sorted store of time-stamped events
// Binary-search lookup, epsilon-tolerant ordering, snapshot iteration

use crate::error::{TimingError, TimingResult};

/// Tolerance for all time comparisons
///
/// Repeated tick <-> second conversion accumulates float error; two times
/// closer than this are treated as equal so that error never produces a
/// false ordering.
pub const TIME_EPSILON: f64 = 1e-6;

/// Compare two times under [`TIME_EPSILON`]: is `a` at or before `b`?
#[inline]
pub fn time_lte(a: f64, b: f64) -> bool {
    a <= b + TIME_EPSILON
}

/// Compare two times under [`TIME_EPSILON`]: is `a` strictly before `b`?
#[inline]
pub fn time_lt(a: f64, b: f64) -> bool {
    a < b - TIME_EPSILON
}

/// A time-stamped event owned by one timeline
///
/// `seq` is the per-timeline insertion counter; events at equal times
/// stay ordered by it. The counter is owned by the timeline instance,
/// never shared globally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineEvent<T> {
    pub time: f64,
    pub seq: u64,
    pub payload: T,
}

/// Sorted store of time-stamped events with binary-search lookup
///
/// Events are kept in ascending time order, ties broken by insertion
/// order. An optional monotonic-append mode turns insertion into an O(1)
/// push but rejects out-of-order times. An optional capacity bound makes
/// the timeline lossy: after every insert the oldest entries beyond the
/// bound are pruned silently (warn-logged, never an error).
#[derive(Debug, Clone)]
pub struct EventTimeline<T> {
    events: Vec<TimelineEvent<T>>,
    next_seq: u64,
    monotonic: bool,
    capacity: Option<usize>,
}

impl<T> Default for EventTimeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventTimeline<T> {
    /// Create an unbounded timeline
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            next_seq: 0,
            monotonic: false,
            capacity: None,
        }
    }

    /// Create a timeline in monotonic-append mode
    ///
    /// Every insert must carry a time at or after the last inserted
    /// event's time; violations are rejected with
    /// [`TimingError::OrderingViolation`] before any mutation.
    pub fn monotonic() -> Self {
        Self {
            monotonic: true,
            ..Self::new()
        }
    }

    /// Bound the timeline to at most `limit` events
    ///
    /// When an insert pushes the length past the bound, the oldest
    /// events are dropped. Lossy by design.
    pub fn with_capacity_limit(mut self, limit: usize) -> Self {
        self.capacity = Some(limit);
        self
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// First index whose event time is not strictly before `t`
    fn lower_bound(&self, t: f64) -> usize {
        self.events.partition_point(|ev| time_lt(ev.time, t))
    }

    /// First index whose event time is strictly after `t`
    fn upper_bound(&self, t: f64) -> usize {
        self.events.partition_point(|ev| time_lte(ev.time, t))
    }

    /// Insert an event, returning its insertion sequence number
    pub fn add(&mut self, time: f64, payload: T) -> TimingResult<u64> {
        TimingError::check_finite("event time", time)?;

        if self.monotonic {
            if let Some(last) = self.events.last() {
                if time_lt(time, last.time) {
                    return Err(TimingError::OrderingViolation {
                        time,
                        last: last.time,
                    });
                }
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let event = TimelineEvent { time, seq, payload };

        if self.monotonic {
            self.events.push(event);
        } else {
            // Insert after every event at an equal (epsilon-fuzzy) time
            // so ties keep insertion order.
            let index = self.upper_bound(time);
            self.events.insert(index, event);
        }

        if let Some(limit) = self.capacity {
            if self.events.len() > limit {
                let excess = self.events.len() - limit;
                log::warn!(
                    "timeline over capacity ({} > {}), pruning {} oldest event(s)",
                    self.events.len(),
                    limit,
                    excess
                );
                self.events.drain(..excess);
            }
        }

        Ok(seq)
    }

    /// Last event with `time <= t`; ties return the latest-inserted
    pub fn get(&self, t: f64) -> Option<&TimelineEvent<T>> {
        let index = self.upper_bound(t);
        if index == 0 {
            None
        } else {
            Some(&self.events[index - 1])
        }
    }

    /// Mutable variant of [`get`](Self::get), used to patch memo fields
    pub fn get_mut(&mut self, t: f64) -> Option<&mut TimelineEvent<T>> {
        let index = self.upper_bound(t);
        if index == 0 {
            None
        } else {
            Some(&mut self.events[index - 1])
        }
    }

    /// Last event strictly before `t`
    pub fn get_before(&self, t: f64) -> Option<&TimelineEvent<T>> {
        let index = self.lower_bound(t);
        if index == 0 {
            None
        } else {
            Some(&self.events[index - 1])
        }
    }

    /// First event strictly after `t`
    pub fn get_after(&self, t: f64) -> Option<&TimelineEvent<T>> {
        self.events.get(self.upper_bound(t))
    }

    /// Event with this sequence number, if still present
    pub fn get_seq(&self, seq: u64) -> Option<&TimelineEvent<T>> {
        self.events.iter().find(|ev| ev.seq == seq)
    }

    /// Remove and return the event with this sequence number
    pub fn remove_seq(&mut self, seq: u64) -> Option<TimelineEvent<T>> {
        let index = self.events.iter().position(|ev| ev.seq == seq)?;
        Some(self.events.remove(index))
    }

    /// Drop every event with `time >= t`
    pub fn cancel(&mut self, t: f64) {
        let index = self.lower_bound(t);
        self.events.truncate(index);
    }

    /// Drop every event strictly before `t` (bounded-memory pruning)
    pub fn cancel_before(&mut self, t: f64) {
        let index = self.lower_bound(t);
        self.events.drain(..index);
    }

    /// First event in the timeline
    pub fn peek(&self) -> Option<&TimelineEvent<T>> {
        self.events.first()
    }

    /// Remove and return the first event
    pub fn shift(&mut self) -> Option<TimelineEvent<T>> {
        if self.events.is_empty() {
            None
        } else {
            Some(self.events.remove(0))
        }
    }

    /// Most recently positioned event
    pub fn last(&self) -> Option<&TimelineEvent<T>> {
        self.events.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut TimelineEvent<T>> {
        self.events.last_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimelineEvent<T>> {
        self.events.iter()
    }

    /// Iterate events in the half-open window `[a, b)` in ascending order
    pub fn for_each_between(&self, a: f64, b: f64, mut f: impl FnMut(&TimelineEvent<T>)) {
        let start = self.lower_bound(a);
        let end = self.lower_bound(b);
        for ev in &self.events[start..end.max(start)] {
            f(ev);
        }
    }

    /// Iterate events with `time >= t`
    pub fn for_each_from(&self, t: f64, mut f: impl FnMut(&TimelineEvent<T>)) {
        for ev in &self.events[self.lower_bound(t)..] {
            f(ev);
        }
    }

    /// Iterate events at exactly (epsilon-fuzzy) `t`
    pub fn for_each_at_time(&self, t: f64, mut f: impl FnMut(&TimelineEvent<T>)) {
        let start = self.lower_bound(t);
        let end = self.upper_bound(t);
        for ev in &self.events[start..end.max(start)] {
            f(ev);
        }
    }
}

impl<T: Clone> EventTimeline<T> {
    /// Snapshot of the half-open window `[a, b)`
    ///
    /// Firing loops iterate the snapshot so a callback may add or cancel
    /// events on the live timeline without affecting the scan in flight.
    pub fn events_between(&self, a: f64, b: f64) -> Vec<TimelineEvent<T>> {
        let start = self.lower_bound(a);
        let end = self.lower_bound(b);
        self.events[start..end.max(start)].to_vec()
    }

    /// Snapshot of every event with `time >= t`
    pub fn events_from(&self, t: f64) -> Vec<TimelineEvent<T>> {
        self.events[self.lower_bound(t)..].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline_of(times: &[f64]) -> EventTimeline<usize> {
        let mut tl = EventTimeline::new();
        for (i, &t) in times.iter().enumerate() {
            tl.add(t, i).unwrap();
        }
        tl
    }

    #[test]
    fn test_add_keeps_ascending_order() {
        let tl = timeline_of(&[3.0, 1.0, 2.0, 0.5]);
        let times: Vec<f64> = tl.iter().map(|ev| ev.time).collect();
        assert_eq!(times, vec![0.5, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_get_returns_greatest_at_or_before() {
        let tl = timeline_of(&[0.0, 1.0, 2.0]);

        assert_eq!(tl.get(0.5).unwrap().time, 0.0);
        assert_eq!(tl.get(1.0).unwrap().time, 1.0);
        assert_eq!(tl.get(10.0).unwrap().time, 2.0);
        assert!(tl.get(-0.5).is_none());
    }

    #[test]
    fn test_get_ties_return_latest_inserted() {
        let mut tl = EventTimeline::new();
        tl.add(1.0, "first").unwrap();
        tl.add(1.0, "second").unwrap();
        tl.add(1.0, "third").unwrap();

        assert_eq!(tl.get(1.0).unwrap().payload, "third");
    }

    #[test]
    fn test_epsilon_tolerance() {
        let mut tl = EventTimeline::new();
        tl.add(1.0, ()).unwrap();

        // A query 1e-7 early still finds the event at 1.0
        assert!(tl.get(1.0 - 1e-7).is_some());
        // But 1e-3 early does not
        assert!(tl.get(1.0 - 1e-3).is_none());
    }

    #[test]
    fn test_neighbors() {
        let tl = timeline_of(&[0.0, 1.0, 2.0]);

        assert_eq!(tl.get_before(1.0).unwrap().time, 0.0);
        assert_eq!(tl.get_after(1.0).unwrap().time, 2.0);
        assert!(tl.get_before(0.0).is_none());
        assert!(tl.get_after(2.0).is_none());
    }

    #[test]
    fn test_cancel_drops_at_and_after() {
        let mut tl = timeline_of(&[0.0, 1.0, 2.0, 3.0]);
        tl.cancel(2.0);

        assert_eq!(tl.len(), 2);
        assert_eq!(tl.last().unwrap().time, 1.0);

        let mut seen = 0;
        tl.for_each_from(2.0, |_| seen += 1);
        assert_eq!(seen, 0);
    }

    #[test]
    fn test_cancel_before_prunes_history() {
        let mut tl = timeline_of(&[0.0, 1.0, 2.0, 3.0]);
        tl.cancel_before(2.0);

        assert_eq!(tl.len(), 2);
        assert_eq!(tl.peek().unwrap().time, 2.0);
    }

    #[test]
    fn test_for_each_between_is_half_open() {
        let tl = timeline_of(&[0.0, 1.0, 2.0, 3.0]);

        let mut seen = Vec::new();
        tl.for_each_between(1.0, 3.0, |ev| seen.push(ev.time));
        assert_eq!(seen, vec![1.0, 2.0]);
    }

    #[test]
    fn test_monotonic_append_rejects_out_of_order() {
        let mut tl = EventTimeline::monotonic();
        tl.add(0.0, ()).unwrap();
        tl.add(1.0, ()).unwrap();
        // Equal time is fine
        tl.add(1.0, ()).unwrap();

        let err = tl.add(0.5, ()).unwrap_err();
        assert!(matches!(err, TimingError::OrderingViolation { .. }));
        // Rejected insert must not have mutated the timeline
        assert_eq!(tl.len(), 3);
    }

    #[test]
    fn test_capacity_limit_prunes_oldest() {
        let mut tl = EventTimeline::new().with_capacity_limit(3);
        for i in 0..5 {
            tl.add(i as f64, i).unwrap();
        }

        assert_eq!(tl.len(), 3);
        assert_eq!(tl.peek().unwrap().time, 2.0);
        assert_eq!(tl.last().unwrap().time, 4.0);
    }

    #[test]
    fn test_non_finite_time_rejected() {
        let mut tl: EventTimeline<()> = EventTimeline::new();
        assert!(tl.add(f64::NAN, ()).is_err());
        assert!(tl.add(f64::INFINITY, ()).is_err());
        assert!(tl.is_empty());
    }

    #[test]
    fn test_remove_seq() {
        let mut tl = EventTimeline::new();
        let a = tl.add(0.0, "a").unwrap();
        let b = tl.add(1.0, "b").unwrap();

        assert_eq!(tl.remove_seq(a).unwrap().payload, "a");
        assert!(tl.remove_seq(a).is_none());
        assert_eq!(tl.get_seq(b).unwrap().payload, "b");
        assert_eq!(tl.len(), 1);
    }

    #[test]
    fn test_snapshot_window() {
        let tl = timeline_of(&[0.0, 0.5, 1.0, 1.5]);
        let snap = tl.events_between(0.5, 1.5);
        let times: Vec<f64> = snap.iter().map(|ev| ev.time).collect();
        assert_eq!(times, vec![0.5, 1.0]);
    }

    #[test]
    fn test_shift_and_peek() {
        let mut tl = timeline_of(&[0.0, 1.0]);
        assert_eq!(tl.peek().unwrap().time, 0.0);
        assert_eq!(tl.shift().unwrap().time, 0.0);
        assert_eq!(tl.shift().unwrap().time, 1.0);
        assert!(tl.shift().is_none());
    }
}
