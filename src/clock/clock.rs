// Clock - macro-tick scanner over a TickSource
// Each processing pass covers [last_update, now) exactly once

use serde::{Deserialize, Serialize};

use super::tick_source::TickSource;
use super::ticker::TickerDriver;
use crate::error::{TimingError, TimingResult};
use crate::timeline::{PlaybackState, TIME_EPSILON};

/// Timing knobs for the macro-tick scan
///
/// `update_interval` is how often the driver wakes the scan;
/// `look_ahead` is how far in advance tick callbacks are stamped so
/// downstream consumers have time to act before the deadline. The
/// interval must leave at least two wakeups per look-ahead window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub update_interval: f64,
    pub look_ahead: f64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            update_interval: 0.05,
            look_ahead: 0.1,
        }
    }
}

impl ClockConfig {
    pub fn validate(&self) -> TimingResult<()> {
        TimingError::check_finite("update interval", self.update_interval)?;
        TimingError::check_finite("look ahead", self.look_ahead)?;
        if self.update_interval <= 0.0 || self.update_interval > self.look_ahead / 2.0 {
            return Err(TimingError::InvalidArgument {
                what: "update interval",
                value: self.update_interval,
            });
        }
        Ok(())
    }
}

/// Receiver of clock lifecycle and tick notifications
///
/// Lifecycle notifications for a window always arrive before that
/// window's tick callbacks. Only `on_tick` is fallible; its error stops
/// the remaining ticks of the pass and propagates out of `process`.
pub trait ClockObserver {
    fn on_started(&mut self, _time: f64, _ticks: f64) {}
    fn on_stopped(&mut self, _time: f64) {}
    fn on_paused(&mut self, _time: f64) {}

    fn on_tick(&mut self, time: f64, tick: u64) -> TimingResult<()>;
}

/// A [`TickSource`] scanned periodically for elapsed ticks
///
/// Driven either by polling `process` directly with the current time,
/// or by `poll` backed by a [`TickerDriver`]. Every moment is covered
/// by exactly one processing window, so no tick fires twice and none
/// is skipped.
pub struct Clock {
    source: TickSource,
    config: ClockConfig,
    driver: Option<TickerDriver>,
    last_update: f64,
}

impl Clock {
    /// Create a stopped clock ticking at `rate` ticks per second
    pub fn new(rate: f64, config: ClockConfig) -> TimingResult<Self> {
        config.validate()?;
        Ok(Self {
            source: TickSource::new(rate)?,
            driver: None,
            config,
            last_update: 0.0,
        })
    }

    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    pub fn source(&self) -> &TickSource {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut TickSource {
        &mut self.source
    }

    pub fn state_at(&self, t: f64) -> PlaybackState {
        self.source.state_at(t)
    }

    pub fn start(&mut self, t: f64, offset: Option<f64>) -> TimingResult<()> {
        self.source.start(t, offset)
    }

    pub fn stop(&mut self, t: f64) -> TimingResult<()> {
        self.source.stop(t)
    }

    pub fn pause(&mut self, t: f64) -> TimingResult<()> {
        self.source.pause(t)
    }

    pub fn set_ticks(&mut self, ticks: f64, t: f64) -> TimingResult<()> {
        self.source.set_ticks_at_time(ticks, t)
    }

    pub fn ticks_at(&self, t: f64) -> f64 {
        self.source.get_ticks_at_time(t)
    }

    pub fn seconds_at(&self, t: f64) -> f64 {
        self.source.get_seconds_at_time(t)
    }

    pub fn time_of_tick(&self, tick: f64, now: f64) -> f64 {
        self.source.get_time_of_tick(tick, now)
    }

    /// End of the most recently processed window
    pub fn last_update(&self) -> f64 {
        self.last_update
    }

    /// Scan `[last_update, now)`: lifecycle notifications first, then
    /// one `on_tick` per elapsed tick, stamped `look_ahead` in advance
    pub fn process(&mut self, now: f64, observer: &mut dyn ClockObserver) -> TimingResult<()> {
        let window_start = self.last_update;
        if now <= window_start {
            return Ok(());
        }
        self.last_update = now;
        self.process_window(window_start, now, observer)
    }

    /// Scan an explicit window without touching the driver bookkeeping
    /// beyond `last_update`; used by callers that split a pass into
    /// sub-windows
    pub(crate) fn process_window(
        &mut self,
        a: f64,
        b: f64,
        observer: &mut dyn ClockObserver,
    ) -> TimingResult<()> {
        // Only genuine transitions notify; an event restating the state
        // already in force (the seed event at time zero included) is
        // replay bookkeeping, not a lifecycle change.
        let mut previous = self.source.state_at(a - 2.0 * TIME_EPSILON);
        for (time, state) in self.source.state_events_between(a, b) {
            if state == previous {
                continue;
            }
            previous = state;
            match state {
                PlaybackState::Started => {
                    let ticks = self.source.get_ticks_at_time(time);
                    observer.on_started(time, ticks);
                }
                PlaybackState::Stopped => observer.on_stopped(time),
                PlaybackState::Paused => observer.on_paused(time),
            }
        }

        let look_ahead = self.config.look_ahead;
        let result = self
            .source
            .for_each_tick_between(a, b, &mut |time, tick| {
                observer.on_tick(time + look_ahead, tick)
            });
        // No query ever looks behind a processed window again, so any
        // history before the stop governing its start can go.
        self.source.prune_before(a);
        result
    }

    /// Advance `last_update` without scanning; used after a caller has
    /// covered the window through `process_window`
    pub(crate) fn mark_processed(&mut self, now: f64) {
        if now > self.last_update {
            self.last_update = now;
        }
    }

    /// Run `process` once per driver wakeup due at `now`
    ///
    /// The ticker driver is created on the first poll, so callers that
    /// drive `process` directly never pay for a wakeup thread.
    pub fn poll(&mut self, now: f64, observer: &mut dyn ClockObserver) -> TimingResult<()> {
        let driver = self
            .driver
            .get_or_insert_with(|| TickerDriver::spawn(self.config.update_interval, now));
        if driver.due_wakeups(now) > 0 {
            self.process(now, observer)?;
        }
        Ok(())
    }
}
