// StateTimeline - EventTimeline specialized to playback lifecycle states
// Exactly one state is active at any queried time

use super::event_timeline::{EventTimeline, TimelineEvent};
use crate::error::TimingResult;

/// Playback lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Started,
    Paused,
}

impl PlaybackState {
    /// Whether the counter advances in this state
    pub fn is_started(&self) -> bool {
        matches!(self, PlaybackState::Started)
    }
}

/// A lifecycle transition with memo slots for tick replay
///
/// `offset`, `ticks` and `seconds` are written back by the tick source
/// as it resolves queries, so later queries replay from the memo instead
/// of recomputing the whole history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateEvent {
    pub state: PlaybackState,
    pub offset: f64,
    pub ticks: f64,
    pub seconds: f64,
}

impl StateEvent {
    pub fn new(state: PlaybackState) -> Self {
        Self {
            state,
            offset: 0.0,
            ticks: 0.0,
            seconds: 0.0,
        }
    }
}

/// Timeline of lifecycle transitions
///
/// The active state at time `t` is the most recent transition at or
/// before `t`, or the initial default when none exists.
#[derive(Debug, Clone, Default)]
pub struct StateTimeline {
    timeline: EventTimeline<StateEvent>,
    initial: PlaybackState,
}

impl StateTimeline {
    pub fn new(initial: PlaybackState) -> Self {
        Self {
            timeline: EventTimeline::new(),
            initial,
        }
    }

    /// State active at `t`
    pub fn get_value_at_time(&self, t: f64) -> PlaybackState {
        self.timeline
            .get(t)
            .map(|ev| ev.payload.state)
            .unwrap_or(self.initial)
    }

    /// Record a transition at `t`, returning its sequence number
    pub fn set_state_at_time(&mut self, state: PlaybackState, t: f64) -> TimingResult<u64> {
        self.timeline.add(t, StateEvent::new(state))
    }

    /// Most recent transition at or before `t`
    pub fn get_event_at_time(&self, t: f64) -> Option<&TimelineEvent<StateEvent>> {
        self.timeline.get(t)
    }

    /// Mutable access to the transition governing `t`, for memo patching
    pub fn get_event_at_time_mut(&mut self, t: f64) -> Option<&mut TimelineEvent<StateEvent>> {
        self.timeline.get_mut(t)
    }

    /// Nearest transition into `state` at or before `t`
    pub fn get_last_state(&self, state: PlaybackState, t: f64) -> Option<&TimelineEvent<StateEvent>> {
        let mut found = None;
        for ev in self.timeline.iter() {
            if ev.time > t + super::event_timeline::TIME_EPSILON {
                break;
            }
            if ev.payload.state == state {
                found = Some(ev);
            }
        }
        found
    }

    /// Nearest transition into `state` at or after `t`
    pub fn get_next_state(&self, state: PlaybackState, t: f64) -> Option<&TimelineEvent<StateEvent>> {
        self.timeline
            .iter()
            .find(|ev| ev.payload.state == state && ev.time >= t - super::event_timeline::TIME_EPSILON)
    }

    /// Iterate transitions in `[a, b)`
    pub fn for_each_between(&self, a: f64, b: f64, f: impl FnMut(&TimelineEvent<StateEvent>)) {
        self.timeline.for_each_between(a, b, f);
    }

    /// Snapshot of transitions in `[a, b)`
    pub fn events_between(&self, a: f64, b: f64) -> Vec<TimelineEvent<StateEvent>> {
        self.timeline.events_between(a, b)
    }

    /// Drop transitions at or after `t`
    pub fn cancel(&mut self, t: f64) {
        self.timeline.cancel(t);
    }

    /// Drop history strictly before `t`
    pub fn cancel_before(&mut self, t: f64) {
        self.timeline.cancel_before(t);
    }

    pub fn len(&self) -> usize {
        self.timeline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_before_any_event() {
        let tl = StateTimeline::new(PlaybackState::Stopped);
        assert_eq!(tl.get_value_at_time(0.0), PlaybackState::Stopped);
        assert_eq!(tl.get_value_at_time(100.0), PlaybackState::Stopped);
    }

    #[test]
    fn test_most_recent_state_wins() {
        let mut tl = StateTimeline::new(PlaybackState::Stopped);
        tl.set_state_at_time(PlaybackState::Started, 1.0).unwrap();
        tl.set_state_at_time(PlaybackState::Paused, 2.0).unwrap();
        tl.set_state_at_time(PlaybackState::Started, 3.0).unwrap();

        assert_eq!(tl.get_value_at_time(0.5), PlaybackState::Stopped);
        assert_eq!(tl.get_value_at_time(1.0), PlaybackState::Started);
        assert_eq!(tl.get_value_at_time(2.5), PlaybackState::Paused);
        assert_eq!(tl.get_value_at_time(3.0), PlaybackState::Started);
        assert_eq!(tl.get_value_at_time(99.0), PlaybackState::Started);
    }

    #[test]
    fn test_get_last_state() {
        let mut tl = StateTimeline::new(PlaybackState::Stopped);
        tl.set_state_at_time(PlaybackState::Started, 1.0).unwrap();
        tl.set_state_at_time(PlaybackState::Paused, 2.0).unwrap();
        tl.set_state_at_time(PlaybackState::Started, 3.0).unwrap();

        let ev = tl.get_last_state(PlaybackState::Started, 2.5).unwrap();
        assert_eq!(ev.time, 1.0);

        let ev = tl.get_last_state(PlaybackState::Started, 5.0).unwrap();
        assert_eq!(ev.time, 3.0);

        assert!(tl.get_last_state(PlaybackState::Paused, 1.5).is_none());
    }

    #[test]
    fn test_get_next_state() {
        let mut tl = StateTimeline::new(PlaybackState::Stopped);
        tl.set_state_at_time(PlaybackState::Started, 1.0).unwrap();
        tl.set_state_at_time(PlaybackState::Stopped, 4.0).unwrap();

        let ev = tl.get_next_state(PlaybackState::Stopped, 2.0).unwrap();
        assert_eq!(ev.time, 4.0);

        // At-time matches count
        let ev = tl.get_next_state(PlaybackState::Started, 1.0).unwrap();
        assert_eq!(ev.time, 1.0);

        assert!(tl.get_next_state(PlaybackState::Paused, 0.0).is_none());
    }

    #[test]
    fn test_memo_patch() {
        let mut tl = StateTimeline::new(PlaybackState::Stopped);
        tl.set_state_at_time(PlaybackState::Started, 1.0).unwrap();

        let ev = tl.get_event_at_time_mut(1.5).unwrap();
        ev.payload.ticks = 42.0;

        assert_eq!(tl.get_event_at_time(1.5).unwrap().payload.ticks, 42.0);
    }
}
