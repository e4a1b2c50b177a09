// Timeline stores - sorted events, lifecycle states, interval tree

pub mod event_timeline;
pub mod interval_timeline;
pub mod state_timeline;

pub use event_timeline::{EventTimeline, TIME_EPSILON, TimelineEvent, time_lt, time_lte};
pub use interval_timeline::{IntervalEvent, IntervalTimeline};
pub use state_timeline::{PlaybackState, StateEvent, StateTimeline};
