// Tickline - Sample-accurate, tempo-aware musical event scheduling

pub mod automation;
pub mod clock;
pub mod error;
pub mod timeline;
pub mod transport;

// Re-export commonly used types for convenience
pub use automation::{AutomationCurve, AutomationParam, AutomationSegment, RateCurve, SegmentKind};
pub use clock::{Clock, ClockConfig, ClockObserver, DeferredCallQueue, TickSource};
pub use error::{TimingError, TimingResult};
pub use timeline::{
    EventTimeline, IntervalEvent, IntervalTimeline, PlaybackState, StateEvent, StateTimeline,
    TimelineEvent,
};
pub use transport::{
    EventCallback, EventId, MusicalTime, NullObserver, SyncHandle, TimeSignature, Transport,
    TransportConfig, TransportObserver,
};
