// Automation - value-over-time parameters and tick accounting

pub mod curve;
pub(crate) mod point_cache;
pub mod rate_curve;

pub use curve::{AutomationCurve, AutomationSegment, SegmentKind};
pub use rate_curve::RateCurve;

use crate::error::TimingResult;

/// The shared automation-parameter contract
///
/// Both the plain scalar parameter ([`AutomationCurve`]) and the
/// tick-accounting rate parameter ([`RateCurve`]) speak this interface;
/// consumers that automate values never need to know which one they
/// hold. Scheduling calls validate their arguments and reject before
/// mutating (validate-then-commit).
pub trait AutomationParam {
    /// Value of the parameter at `t`, interpolating scheduled segments
    fn get_value_at_time(&self, t: f64) -> f64;

    /// Set the value exactly at `t`
    fn set_value_at_time(&mut self, value: f64, t: f64) -> TimingResult<()>;

    /// Ramp linearly from the previous scheduled point to `value` at `t`
    fn linear_ramp_to_value_at_time(&mut self, value: f64, t: f64) -> TimingResult<()>;

    /// Ramp exponentially from the previous scheduled point to `value` at `t`
    ///
    /// The previous value and `value` must be nonzero and share a sign.
    fn exponential_ramp_to_value_at_time(&mut self, value: f64, t: f64) -> TimingResult<()>;

    /// Approach `target` exponentially starting at `t` with the given
    /// time constant
    fn set_target_at_time(&mut self, target: f64, t: f64, time_constant: f64)
    -> TimingResult<()>;

    /// Drop every scheduled segment with time at or after `t`
    fn cancel_scheduled_values(&mut self, t: f64) -> TimingResult<()>;
}
