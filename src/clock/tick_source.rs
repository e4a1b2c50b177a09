// TickSource - start/stop/pause-able tick counter driven by a RateCurve
// Queries replay the state and seek history exactly instead of
// accumulating, so long runs cannot drift

use std::cell::RefCell;

use crate::automation::point_cache::PointCache;
use crate::automation::{AutomationParam, RateCurve};
use crate::error::{TimingError, TimingResult};
use crate::timeline::{
    EventTimeline, PlaybackState, StateTimeline, TIME_EPSILON, time_lt,
};

/// Guard when deciding whether a fractional tick count sits on a boundary
const TICK_EPSILON: f64 = 1e-8;

/// A record of one manual seek: the counter was forced to `ticks`
/// (equivalently `seconds`) at the event's time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOffset {
    pub ticks: f64,
    pub seconds: f64,
}

/// A start/stop/pause-able tick counter
///
/// Owns the rate curve (in ticks per second), the lifecycle timeline and
/// the seek log. `stop` resets the counter to zero; `pause` freezes it;
/// a seek while running is recorded as a [`TickOffset`] so later queries
/// replay it exactly.
pub struct TickSource {
    frequency: RateCurve,
    state: StateTimeline,
    tick_offsets: EventTimeline<TickOffset>,
    ticks_cache: RefCell<PointCache>,
    seconds_cache: RefCell<PointCache>,
}

impl TickSource {
    /// Create a stopped tick source running at `rate` ticks per second
    pub fn new(rate: f64) -> TimingResult<Self> {
        TimingError::check_non_negative("tick rate", rate)?;
        let mut source = Self {
            frequency: RateCurve::new(rate),
            state: StateTimeline::new(PlaybackState::Stopped),
            tick_offsets: EventTimeline::new(),
            ticks_cache: RefCell::new(PointCache::default()),
            seconds_cache: RefCell::new(PointCache::default()),
        };
        source.state.set_state_at_time(PlaybackState::Stopped, 0.0)?;
        source.set_ticks_at_time(0.0, 0.0)?;
        Ok(source)
    }

    pub fn frequency(&self) -> &RateCurve {
        &self.frequency
    }

    /// Current lifecycle state at `t`
    pub fn state_at(&self, t: f64) -> PlaybackState {
        self.state.get_value_at_time(t)
    }

    /// Lifecycle transitions in `[a, b)`, ascending
    pub fn state_events_between(&self, a: f64, b: f64) -> Vec<(f64, PlaybackState)> {
        self.state
            .events_between(a, b)
            .into_iter()
            .map(|ev| (ev.time, ev.payload.state))
            .collect()
    }

    fn invalidate(&mut self, t: f64) {
        self.ticks_cache.borrow_mut().invalidate_from(t);
        self.seconds_cache.borrow_mut().invalidate_from(t);
    }

    /// Begin counting at `t`; no-op when already started there.
    /// An offset forces the counter to that tick at the start time.
    pub fn start(&mut self, t: f64, offset: Option<f64>) -> TimingResult<()> {
        TimingError::check_non_negative("start time", t)?;
        if self.state.get_value_at_time(t) != PlaybackState::Started {
            self.state.set_state_at_time(PlaybackState::Started, t)?;
            self.invalidate(t);
        }
        if let Some(ticks) = offset {
            self.set_ticks_at_time(ticks, t)?;
        }
        Ok(())
    }

    /// Stop at `t`, resetting the counter to zero
    pub fn stop(&mut self, t: f64) -> TimingResult<()> {
        TimingError::check_non_negative("stop time", t)?;
        // A later stop already on the books supersedes nothing; drop it
        // along with any seeks recorded after this one.
        if self.state.get_value_at_time(t) == PlaybackState::Stopped {
            if let Some(ev) = self.state.get_event_at_time(t) {
                if ev.time > TIME_EPSILON {
                    let at = ev.time;
                    self.state.cancel(at);
                    self.tick_offsets.cancel(at);
                }
            }
        }
        self.state.cancel(t);
        self.state.set_state_at_time(PlaybackState::Stopped, t)?;
        self.set_ticks_at_time(0.0, t)?;
        self.invalidate(t);
        Ok(())
    }

    /// Freeze the counter at `t` without resetting it
    pub fn pause(&mut self, t: f64) -> TimingResult<()> {
        TimingError::check_non_negative("pause time", t)?;
        if self.state.get_value_at_time(t) == PlaybackState::Started {
            self.state.set_state_at_time(PlaybackState::Paused, t)?;
            self.invalidate(t);
        }
        Ok(())
    }

    /// Force the counter to `ticks` at `t` (a seek)
    pub fn set_ticks_at_time(&mut self, ticks: f64, t: f64) -> TimingResult<()> {
        TimingError::check_non_negative("tick offset", ticks)?;
        TimingError::check_non_negative("seek time", t)?;
        self.tick_offsets.cancel(t);
        let seconds = self.frequency.get_duration_of_ticks(ticks, t);
        self.tick_offsets.add(t, TickOffset { ticks, seconds })?;
        self.invalidate(t);
        Ok(())
    }

    /// Replay the state and seek history up to `t`
    ///
    /// Walks the boundaries between the governing stop and `t`,
    /// accumulating rate-curve integrals over started spans and letting
    /// any seek inside a span override the running totals.
    fn replay(&self, t: f64) -> (f64, f64) {
        let stop_time = self
            .state
            .get_last_state(PlaybackState::Stopped, t)
            .map(|ev| ev.time)
            .unwrap_or(0.0);

        let mut boundaries: Vec<(f64, PlaybackState)> = self
            .state
            .events_between(stop_time, t + 2.0 * TIME_EPSILON)
            .into_iter()
            .map(|ev| (ev.time, ev.payload.state))
            .collect();
        // Synthetic closing boundary so the final started span is
        // accumulated up to the query time.
        boundaries.push((t, PlaybackState::Paused));

        let mut last_time = stop_time;
        let mut last_started = false;
        let mut ticks = 0.0;
        let mut seconds = 0.0;

        for (time, state) in boundaries {
            let mut span_start = last_time;
            if let Some(offset) = self.tick_offsets.get(time) {
                if offset.time >= last_time - TIME_EPSILON {
                    ticks = offset.payload.ticks;
                    seconds = offset.payload.seconds;
                    span_start = offset.time;
                }
            }
            if last_started && state != PlaybackState::Started {
                ticks += self.frequency.get_ticks_at_time(time)
                    - self.frequency.get_ticks_at_time(span_start);
                seconds += time - span_start;
            }
            last_time = time;
            last_started = state == PlaybackState::Started;
        }

        (ticks, seconds)
    }

    /// Elapsed ticks of the counter at `t`
    pub fn get_ticks_at_time(&self, t: f64) -> f64 {
        if let Some(ticks) = self.ticks_cache.borrow().get_exact(t) {
            return ticks;
        }
        let (ticks, seconds) = self.replay(t);
        self.ticks_cache.borrow_mut().insert(t, ticks);
        self.seconds_cache.borrow_mut().insert(t, seconds);
        ticks
    }

    /// Elapsed started seconds of the counter at `t`
    pub fn get_seconds_at_time(&self, t: f64) -> f64 {
        if let Some(seconds) = self.seconds_cache.borrow().get_exact(t) {
            return seconds;
        }
        let (ticks, seconds) = self.replay(t);
        self.ticks_cache.borrow_mut().insert(t, ticks);
        self.seconds_cache.borrow_mut().insert(t, seconds);
        seconds
    }

    /// Wall-clock time at which the counter reaches `tick`, relative to
    /// the anchors (last seek and last state change) governing `now`
    pub fn get_time_of_tick(&self, tick: f64, now: f64) -> f64 {
        let offset_time = self.tick_offsets.get(now).map_or(0.0, |ev| ev.time);
        let state_time = self.state.get_event_at_time(now).map_or(0.0, |ev| ev.time);
        // The later anchor wins; the counter value there already folds
        // in every earlier seek, pause and stop.
        let anchor_time = offset_time.max(state_time);
        let anchor_ticks = self.get_ticks_at_time(anchor_time);
        let absolute = self.frequency.get_ticks_at_time(anchor_time) + tick - anchor_ticks;
        self.frequency.get_time_of_tick(absolute)
    }

    /// Invoke `cb(wall_time, tick_index)` for every integer tick
    /// boundary crossed while started within `[a, b)`
    ///
    /// A callback error stops further invocations but the walk's own
    /// bookkeeping still completes; the first error is returned at the
    /// end (run to completion, then propagate).
    pub fn for_each_tick_between(
        &self,
        a: f64,
        b: f64,
        cb: &mut dyn FnMut(f64, u64) -> TimingResult<()>,
    ) -> TimingResult<()> {
        TimingError::check_finite("window start", a)?;
        TimingError::check_finite("window end", b)?;
        if !time_lt(a, b) {
            return Ok(());
        }

        let mut error: Option<TimingError> = None;

        // Boundaries where the enumeration anchors change: state
        // transitions and seeks. Each maximal homogeneous span is
        // enumerated on its own.
        let mut boundaries: Vec<f64> = Vec::new();
        for ev in self.state.events_between(a, b) {
            boundaries.push(ev.time);
        }
        self.tick_offsets
            .for_each_between(a, b, |ev| boundaries.push(ev.time));
        boundaries.push(b);
        boundaries.sort_by(f64::total_cmp);

        let mut span_start = a;
        for boundary in boundaries {
            if time_lt(span_start, boundary) {
                self.enumerate_span(span_start, boundary, cb, &mut error);
            }
            span_start = span_start.max(boundary);
        }

        match error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Enumerate integer ticks inside one span with fixed anchors
    fn enumerate_span(
        &self,
        span_start: f64,
        span_end: f64,
        cb: &mut dyn FnMut(f64, u64) -> TimingResult<()>,
        error: &mut Option<TimingError>,
    ) {
        if error.is_some() {
            return;
        }
        // Probe just inside the span so boundary events at span_start
        // (the state change itself) govern it.
        let probe = span_start;
        if self.state.get_value_at_time(probe) != PlaybackState::Started {
            return;
        }

        let base = self.get_ticks_at_time(span_start);
        let freq_base = self.frequency.get_ticks_at_time(span_start);
        let mut tick = (base - TICK_EPSILON).ceil().max(0.0);

        loop {
            // counter(t) = base + F(t) - F(span_start); invert for t
            let time = self.frequency.get_time_of_tick(freq_base + tick - base);
            if !time_lt(time, span_end) {
                break;
            }
            let fire_at = time.max(span_start);
            if let Err(err) = cb(fire_at, tick as u64) {
                *error = Some(err);
                break;
            }
            tick += 1.0;
        }
    }

    /// Drop replay history that can no longer affect any query: state
    /// and seek events strictly before the stop governing `t`
    pub fn prune_before(&mut self, t: f64) {
        if let Some(stop) = self.state.get_last_state(PlaybackState::Stopped, t) {
            let keep_from = stop.time;
            self.state.cancel_before(keep_from);
            self.tick_offsets.cancel_before(keep_from);
        }
    }

    // Frequency automation pass-throughs; every mutation invalidates the
    // memo caches from the mutation time.

    pub fn set_frequency_at_time(&mut self, rate: f64, t: f64) -> TimingResult<()> {
        self.frequency.set_value_at_time(rate, t)?;
        self.invalidate(t);
        Ok(())
    }

    pub fn linear_ramp_frequency(&mut self, rate: f64, t: f64) -> TimingResult<()> {
        self.frequency.linear_ramp_to_value_at_time(rate, t)?;
        self.invalidate(0.0);
        Ok(())
    }

    pub fn exponential_ramp_frequency(&mut self, rate: f64, t: f64) -> TimingResult<()> {
        self.frequency.exponential_ramp_to_value_at_time(rate, t)?;
        self.invalidate(0.0);
        Ok(())
    }

    pub fn set_frequency_target(&mut self, rate: f64, t: f64, time_constant: f64) -> TimingResult<()> {
        self.frequency.set_target_at_time(rate, t, time_constant)?;
        self.invalidate(t);
        Ok(())
    }

    pub fn cancel_frequency_values(&mut self, t: f64) -> TimingResult<()> {
        self.frequency.cancel_scheduled_values(t)?;
        self.invalidate(t);
        Ok(())
    }
}
