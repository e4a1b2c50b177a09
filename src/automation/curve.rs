// AutomationCurve - scalar parameter backed by a segment timeline
// Segments are append/cancel only, never mutated in place

use super::AutomationParam;
use crate::error::{TimingError, TimingResult};
use crate::timeline::{EventTimeline, TimelineEvent};

/// How a segment reaches its value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentKind {
    /// Step to the value exactly at the segment time
    Set,
    /// Linear ramp from the previous point, ending at the segment time
    LinearRamp,
    /// Exponential ramp from the previous point, ending at the segment time
    ExponentialRamp,
    /// Exponential approach toward the value, starting at the segment time
    TargetApproach { time_constant: f64 },
}

/// One piece of a value-over-time curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutomationSegment {
    pub value: f64,
    pub kind: SegmentKind,
}

/// A scalar automation parameter
///
/// Holds scheduled [`AutomationSegment`]s on an [`EventTimeline`] and
/// answers interpolated value queries. Values are clamped to the
/// configured `[min, max]` range on read.
#[derive(Debug, Clone)]
pub struct AutomationCurve {
    events: EventTimeline<AutomationSegment>,
    initial_value: f64,
    min_value: f64,
    max_value: f64,
}

impl AutomationCurve {
    pub fn new(initial_value: f64) -> Self {
        Self {
            events: EventTimeline::new(),
            initial_value,
            min_value: f64::NEG_INFINITY,
            max_value: f64::INFINITY,
        }
    }

    /// Clamp all read values to `[min, max]`
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min_value = min;
        self.max_value = max;
        self
    }

    pub fn initial_value(&self) -> f64 {
        self.initial_value
    }

    /// Governing segment at or before `t`
    pub fn segment_at(&self, t: f64) -> Option<&TimelineEvent<AutomationSegment>> {
        self.events.get(t)
    }

    /// First segment strictly after `t`
    pub fn segment_after(&self, t: f64) -> Option<&TimelineEvent<AutomationSegment>> {
        self.events.get_after(t)
    }

    /// Snapshot of segments at or before `t`, ascending
    pub fn segments_up_to(&self, t: f64) -> Vec<TimelineEvent<AutomationSegment>> {
        self.events
            .iter()
            .take_while(|ev| crate::timeline::time_lte(ev.time, t))
            .cloned()
            .collect()
    }

    /// Number of scheduled segments
    pub fn segment_count(&self) -> usize {
        self.events.len()
    }

    fn add_segment(&mut self, t: f64, value: f64, kind: SegmentKind) -> TimingResult<()> {
        TimingError::check_finite("automation time", t)?;
        TimingError::check_finite("automation value", value)?;
        self.events.add(t, AutomationSegment { value, kind })?;
        Ok(())
    }

    fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min_value, self.max_value)
    }

    fn linear_interpolate(t0: f64, v0: f64, t1: f64, v1: f64, t: f64) -> f64 {
        if t1 <= t0 {
            return v1;
        }
        v0 + (v1 - v0) * ((t - t0) / (t1 - t0))
    }

    fn exponential_interpolate(t0: f64, v0: f64, t1: f64, v1: f64, t: f64) -> f64 {
        if t1 <= t0 || v0 == 0.0 {
            return v1;
        }
        v0 * (v1 / v0).powf((t - t0) / (t1 - t0))
    }

    fn exponential_approach(t0: f64, v0: f64, target: f64, time_constant: f64, t: f64) -> f64 {
        target + (v0 - target) * (-(t - t0) / time_constant).exp()
    }

    /// Value of the curve just before the segment at `t0` takes effect
    fn value_before(&self, t0: f64) -> f64 {
        match self.events.get_before(t0) {
            Some(prev) => match prev.payload.kind {
                SegmentKind::TargetApproach { time_constant } => {
                    let earlier = self.value_before(prev.time);
                    Self::exponential_approach(
                        prev.time,
                        earlier,
                        prev.payload.value,
                        time_constant,
                        t0,
                    )
                }
                _ => prev.payload.value,
            },
            None => self.initial_value,
        }
    }
}

impl AutomationParam for AutomationCurve {
    fn get_value_at_time(&self, t: f64) -> f64 {
        let Some(before) = self.events.get(t) else {
            return self.clamp(self.initial_value);
        };

        let value = match before.payload.kind {
            SegmentKind::TargetApproach { time_constant } => {
                let v0 = self.value_before(before.time);
                Self::exponential_approach(before.time, v0, before.payload.value, time_constant, t)
            }
            _ => match self.events.get_after(t) {
                Some(after) => match after.payload.kind {
                    SegmentKind::LinearRamp => Self::linear_interpolate(
                        before.time,
                        before.payload.value,
                        after.time,
                        after.payload.value,
                        t,
                    ),
                    SegmentKind::ExponentialRamp => Self::exponential_interpolate(
                        before.time,
                        before.payload.value,
                        after.time,
                        after.payload.value,
                        t,
                    ),
                    _ => before.payload.value,
                },
                None => before.payload.value,
            },
        };
        self.clamp(value)
    }

    fn set_value_at_time(&mut self, value: f64, t: f64) -> TimingResult<()> {
        self.add_segment(t, value, SegmentKind::Set)
    }

    fn linear_ramp_to_value_at_time(&mut self, value: f64, t: f64) -> TimingResult<()> {
        self.add_segment(t, value, SegmentKind::LinearRamp)
    }

    fn exponential_ramp_to_value_at_time(&mut self, value: f64, t: f64) -> TimingResult<()> {
        TimingError::check_finite("automation time", t)?;
        TimingError::check_finite("automation value", value)?;
        let from = self.get_value_at_time(t);
        // An exponential ramp cannot start from or cross zero
        if value == 0.0 || from == 0.0 || (value < 0.0) != (from < 0.0) {
            return Err(TimingError::InvalidArgument {
                what: "exponential ramp endpoint",
                value,
            });
        }
        self.add_segment(t, value, SegmentKind::ExponentialRamp)
    }

    fn set_target_at_time(
        &mut self,
        target: f64,
        t: f64,
        time_constant: f64,
    ) -> TimingResult<()> {
        TimingError::check_non_negative("time constant", time_constant)?;
        if time_constant == 0.0 {
            return Err(TimingError::InvalidArgument {
                what: "time constant",
                value: time_constant,
            });
        }
        self.add_segment(t, target, SegmentKind::TargetApproach { time_constant })
    }

    fn cancel_scheduled_values(&mut self, t: f64) -> TimingResult<()> {
        TimingError::check_finite("cancel time", t)?;
        self.events.cancel(t);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_value() {
        let curve = AutomationCurve::new(5.0);
        assert_eq!(curve.get_value_at_time(0.0), 5.0);
        assert_eq!(curve.get_value_at_time(100.0), 5.0);
    }

    #[test]
    fn test_set_value_steps() {
        let mut curve = AutomationCurve::new(0.0);
        curve.set_value_at_time(1.0, 1.0).unwrap();
        curve.set_value_at_time(2.0, 2.0).unwrap();

        assert_eq!(curve.get_value_at_time(0.5), 0.0);
        assert_eq!(curve.get_value_at_time(1.0), 1.0);
        assert_eq!(curve.get_value_at_time(1.9), 1.0);
        assert_eq!(curve.get_value_at_time(2.0), 2.0);
    }

    #[test]
    fn test_linear_ramp() {
        let mut curve = AutomationCurve::new(0.0);
        curve.set_value_at_time(0.0, 0.0).unwrap();
        curve.linear_ramp_to_value_at_time(10.0, 1.0).unwrap();

        assert_eq!(curve.get_value_at_time(0.0), 0.0);
        assert!((curve.get_value_at_time(0.5) - 5.0).abs() < 1e-9);
        assert_eq!(curve.get_value_at_time(1.0), 10.0);
        // Holds the target after the ramp ends
        assert_eq!(curve.get_value_at_time(2.0), 10.0);
    }

    #[test]
    fn test_exponential_ramp() {
        let mut curve = AutomationCurve::new(1.0);
        curve.set_value_at_time(1.0, 0.0).unwrap();
        curve.exponential_ramp_to_value_at_time(4.0, 1.0).unwrap();

        // Geometric midpoint: sqrt(1 * 4) = 2
        assert!((curve.get_value_at_time(0.5) - 2.0).abs() < 1e-9);
        assert_eq!(curve.get_value_at_time(1.0), 4.0);
    }

    #[test]
    fn test_exponential_ramp_rejects_zero_crossing() {
        let mut curve = AutomationCurve::new(1.0);
        assert!(curve.exponential_ramp_to_value_at_time(0.0, 1.0).is_err());
        assert!(curve.exponential_ramp_to_value_at_time(-2.0, 1.0).is_err());
        assert_eq!(curve.segment_count(), 0);
    }

    #[test]
    fn test_target_approach() {
        let mut curve = AutomationCurve::new(1.0);
        curve.set_target_at_time(0.0, 0.0, 0.5).unwrap();

        // v(t) = target + (v0 - target) * exp(-t / tc)
        let expected = 1.0 * (-2.0f64).exp();
        assert!((curve.get_value_at_time(1.0) - expected).abs() < 1e-9);
        // Converges toward the target
        assert!(curve.get_value_at_time(10.0) < 1e-6);
    }

    #[test]
    fn test_cancel_scheduled_values() {
        let mut curve = AutomationCurve::new(0.0);
        curve.set_value_at_time(1.0, 1.0).unwrap();
        curve.set_value_at_time(2.0, 2.0).unwrap();
        curve.cancel_scheduled_values(1.5).unwrap();

        assert_eq!(curve.get_value_at_time(3.0), 1.0);
        assert_eq!(curve.segment_count(), 1);
    }

    #[test]
    fn test_range_clamping() {
        let mut curve = AutomationCurve::new(0.5).with_range(0.0, 1.0);
        curve.set_value_at_time(4.0, 1.0).unwrap();
        assert_eq!(curve.get_value_at_time(2.0), 1.0);
    }

    #[test]
    fn test_rejects_non_finite() {
        let mut curve = AutomationCurve::new(0.0);
        assert!(curve.set_value_at_time(f64::NAN, 1.0).is_err());
        assert!(curve.set_value_at_time(1.0, f64::INFINITY).is_err());
        assert_eq!(curve.segment_count(), 0);
    }
}
