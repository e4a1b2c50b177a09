// Clock - tick counting, periodic scanning and wall-clock timeouts

pub mod clock;
pub mod deferred;
pub mod tick_source;
pub mod ticker;

pub use clock::{Clock, ClockConfig, ClockObserver};
pub use deferred::DeferredCallQueue;
pub use tick_source::{TickOffset, TickSource};
pub use ticker::TickerDriver;
