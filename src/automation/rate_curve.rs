// RateCurve - automation parameter that integrates elapsed ticks
// The rate itself may be ramped, so tick counts are time-integrals of rate

use std::cell::RefCell;

use super::AutomationParam;
use super::curve::{AutomationCurve, AutomationSegment, SegmentKind};
use super::point_cache::PointCache;
use crate::error::{TimingError, TimingResult};
use crate::timeline::{TIME_EPSILON, TimelineEvent};

/// Linear-ramp sub-segments used to approximate one exponential ramp
const EXPONENTIAL_RAMP_STEPS: usize = 10;

/// Time constants spanned when flattening a target approach
const TARGET_APPROACH_SPAN: f64 = 5.0;

/// A rate parameter with tick accounting
///
/// Wraps an [`AutomationCurve`] whose value is a rate in ticks per
/// second and answers the two integral queries: how many ticks have
/// elapsed by a given time, and at what time a given tick count is
/// reached. Exponential ramps and target approaches are flattened into
/// short linear ramps at schedule time, so the integral machinery only
/// ever sees constant and linear pieces, which it computes exactly.
#[derive(Debug, Clone)]
pub struct RateCurve {
    curve: AutomationCurve,
    cache: RefCell<PointCache>,
}

impl RateCurve {
    /// Create a rate curve holding `initial_rate` ticks per second
    pub fn new(initial_rate: f64) -> Self {
        Self {
            curve: AutomationCurve::new(initial_rate).with_range(0.0, f64::INFINITY),
            cache: RefCell::new(PointCache::default()),
        }
    }

    /// Integral of one segment piece, exact for constant and linear rate
    ///
    /// For a linear ramp the definite integral is the trapezoid
    /// `0.5 * dt * (r(t0) + r(t1))`; a constant piece is the same
    /// formula with equal endpoints.
    fn piece_ticks(dt: f64, v0: f64, v1: f64, kind: SegmentKind) -> f64 {
        match kind {
            SegmentKind::LinearRamp => 0.5 * dt * (v0 + v1),
            _ => v0 * dt,
        }
    }

    /// Elapsed ticks at time `t`, integrating the rate curve from zero
    pub fn get_ticks_at_time(&self, t: f64) -> f64 {
        if t <= 0.0 {
            return 0.0;
        }

        let mut cache = self.cache.borrow_mut();
        let (mut t0, mut ticks) = cache.anchor(t).unwrap_or((0.0, 0.0));
        if (t0 - t).abs() <= TIME_EPSILON {
            return ticks;
        }
        let mut v0 = self.curve.get_value_at_time(t0);

        for ev in self.curve.segments_up_to(t) {
            if ev.time <= t0 + TIME_EPSILON {
                continue;
            }
            ticks += Self::piece_ticks(ev.time - t0, v0, ev.payload.value, ev.payload.kind);
            cache.insert(ev.time, ticks);
            t0 = ev.time;
            v0 = ev.payload.value;
        }

        // Tail: constant rate, or partway into a ramp whose endpoint is
        // past t; the trapezoid covers both.
        let vt = self.curve.get_value_at_time(t);
        ticks + 0.5 * (t - t0) * (v0 + vt)
    }

    /// Wall-clock time at which the integral reaches `tick`
    ///
    /// For a constant-rate segment this is a linear solve; inside a
    /// linear ramp it is the quadratic `0.5*k*dt^2 + r0*dt = dticks`.
    /// When the quadratic has two in-window roots the smallest
    /// non-negative one is chosen: the first instant the tick count
    /// reaches the target.
    pub fn get_time_of_tick(&self, tick: f64) -> f64 {
        if tick <= 0.0 {
            return 0.0;
        }

        let mut t0 = 0.0;
        let mut v0 = self.curve.get_value_at_time(0.0);
        let mut ticks = 0.0;

        for ev in self.curve.segments_up_to(f64::INFINITY) {
            if ev.time <= t0 + TIME_EPSILON {
                v0 = ev.payload.value;
                continue;
            }
            let piece = Self::piece_ticks(ev.time - t0, v0, ev.payload.value, ev.payload.kind);
            if ticks + piece >= tick - TIME_EPSILON {
                return t0 + Self::solve_piece(
                    tick - ticks,
                    ev.time - t0,
                    v0,
                    ev.payload.value,
                    ev.payload.kind,
                );
            }
            ticks += piece;
            t0 = ev.time;
            v0 = ev.payload.value;
        }

        // Open tail after the last segment: constant rate
        if v0 <= 0.0 {
            return f64::INFINITY;
        }
        t0 + (tick - ticks) / v0
    }

    /// Solve for the offset into one piece at which `dticks` accumulate
    fn solve_piece(dticks: f64, window: f64, v0: f64, v1: f64, kind: SegmentKind) -> f64 {
        if dticks <= 0.0 {
            return 0.0;
        }
        let slope = match kind {
            SegmentKind::LinearRamp => (v1 - v0) / window,
            _ => 0.0,
        };

        if slope.abs() < 1e-12 {
            if v0 <= 0.0 {
                return window;
            }
            return (dticks / v0).min(window);
        }

        // 0.5*k*dt^2 + v0*dt - dticks = 0
        let discriminant = v0 * v0 + 2.0 * slope * dticks;
        if discriminant < 0.0 {
            return window;
        }
        let sqrt_disc = discriminant.sqrt();
        let roots = [(-v0 + sqrt_disc) / slope, (-v0 - sqrt_disc) / slope];

        // Smallest non-negative in-window root
        let mut best = window;
        for root in roots {
            if root >= -TIME_EPSILON && root <= window + TIME_EPSILON && root < best {
                best = root.max(0.0);
            }
        }
        best
    }

    /// Seconds spanned by `ticks` ticks starting at time `t`
    pub fn get_duration_of_ticks(&self, ticks: f64, t: f64) -> f64 {
        let now_ticks = self.get_ticks_at_time(t);
        self.get_time_of_tick(now_ticks + ticks) - t
    }

    /// Ensure a ramp scheduled at `t` has an anchor point to ramp from
    fn ensure_anchor(&mut self, t: f64) -> TimingResult<f64> {
        match self.curve.segment_at(t) {
            Some(ev) => Ok(ev.time),
            None => {
                let initial = self.curve.initial_value();
                self.curve.set_value_at_time(initial, 0.0)?;
                Ok(0.0)
            }
        }
    }

    fn invalidate(&mut self, t: f64) {
        self.cache.borrow_mut().invalidate_from(t);
    }

    pub(crate) fn segments_up_to(&self, t: f64) -> Vec<TimelineEvent<AutomationSegment>> {
        self.curve.segments_up_to(t)
    }
}

impl AutomationParam for RateCurve {
    fn get_value_at_time(&self, t: f64) -> f64 {
        self.curve.get_value_at_time(t)
    }

    fn set_value_at_time(&mut self, value: f64, t: f64) -> TimingResult<()> {
        TimingError::check_non_negative("rate", value)?;
        TimingError::check_non_negative("rate time", t)?;
        self.curve.set_value_at_time(value, t)?;
        self.invalidate(t);
        Ok(())
    }

    fn linear_ramp_to_value_at_time(&mut self, value: f64, t: f64) -> TimingResult<()> {
        TimingError::check_non_negative("rate", value)?;
        TimingError::check_non_negative("rate time", t)?;
        let anchor = self.ensure_anchor(t)?;
        self.curve.linear_ramp_to_value_at_time(value, t)?;
        self.invalidate(anchor);
        Ok(())
    }

    fn exponential_ramp_to_value_at_time(&mut self, value: f64, t: f64) -> TimingResult<()> {
        TimingError::check_non_negative("rate", value)?;
        TimingError::check_non_negative("rate time", t)?;
        let t0 = self.ensure_anchor(t)?;
        let v0 = self.curve.get_value_at_time(t0);
        if value == 0.0 || v0 == 0.0 {
            return Err(TimingError::InvalidArgument {
                what: "exponential ramp endpoint",
                value,
            });
        }

        // Flatten into short linear ramps so tick math stays exact
        // within each piece.
        let span = t - t0;
        if span <= 0.0 {
            return self.set_value_at_time(value, t);
        }
        for i in 1..=EXPONENTIAL_RAMP_STEPS {
            let frac = i as f64 / EXPONENTIAL_RAMP_STEPS as f64;
            let ti = t0 + span * frac;
            let vi = v0 * (value / v0).powf(frac);
            self.curve.linear_ramp_to_value_at_time(vi, ti)?;
        }
        self.invalidate(t0);
        Ok(())
    }

    fn set_target_at_time(
        &mut self,
        target: f64,
        t: f64,
        time_constant: f64,
    ) -> TimingResult<()> {
        TimingError::check_non_negative("rate", target)?;
        TimingError::check_non_negative("rate time", t)?;
        TimingError::check_non_negative("time constant", time_constant)?;
        if time_constant == 0.0 {
            return Err(TimingError::InvalidArgument {
                what: "time constant",
                value: time_constant,
            });
        }

        // No closed-form tick integral for the exponential approach:
        // approximate with max(1, round(1/timeConstant)) linear ramps
        // spanning five time constants.
        let steps = ((1.0 / time_constant).round() as usize).max(1);
        let v0 = self.curve.get_value_at_time(t);
        self.curve.set_value_at_time(v0, t)?;
        let span = TARGET_APPROACH_SPAN * time_constant;
        for i in 1..=steps {
            let frac = i as f64 / steps as f64;
            let ti = t + span * frac;
            let vi = target + (v0 - target) * (-(ti - t) / time_constant).exp();
            self.curve.linear_ramp_to_value_at_time(vi, ti)?;
        }
        self.invalidate(t);
        Ok(())
    }

    fn cancel_scheduled_values(&mut self, t: f64) -> TimingResult<()> {
        self.curve.cancel_scheduled_values(t)?;
        self.invalidate(t);
        Ok(())
    }
}
