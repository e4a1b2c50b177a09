// Position - Musical time representation
// Handles conversion between ticks, beats, and bars at a configurable
// pulses-per-quarter-note resolution

use std::fmt;

/// Time signature (numerator/denominator)
/// Example: 4/4 time = TimeSignature { numerator: 4, denominator: 4 }
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,   // Beats per bar (typically 3, 4, 5, 6, 7)
    pub denominator: u8, // Note value (4 = quarter note, 8 = eighth note)
}

impl TimeSignature {
    /// Creates a new time signature
    pub fn new(numerator: u8, denominator: u8) -> Self {
        assert!(numerator > 0, "Time signature numerator must be > 0");
        assert!(
            denominator.is_power_of_two(),
            "Time signature denominator must be power of 2"
        );
        Self {
            numerator,
            denominator,
        }
    }

    /// Common 4/4 time signature
    pub fn four_four() -> Self {
        Self::new(4, 4)
    }

    /// Common 3/4 time signature (waltz)
    pub fn three_four() -> Self {
        Self::new(3, 4)
    }

    /// Common 6/8 time signature
    pub fn six_eight() -> Self {
        Self::new(6, 8)
    }

    /// Number of beats per bar
    pub fn beats_per_bar(&self) -> f64 {
        self.numerator as f64
    }

    /// Beat duration relative to quarter note
    /// Example: 4/4 = 1.0, 6/8 = 0.5 (eighth notes)
    pub fn beat_duration_multiplier(&self) -> f64 {
        4.0 / self.denominator as f64
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Musical time representation
/// Represents a position in the timeline using bars, beats, and ticks.
/// Tick resolution (pulses per quarter note) is supplied by the caller,
/// matching the transport's configured PPQ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MusicalTime {
    pub bar: u32,  // Bar number (1-based)
    pub beat: u8,  // Beat within bar (1-based)
    pub tick: u32, // Tick within beat (0-based)
}

impl MusicalTime {
    /// Creates a new musical time position
    pub fn new(bar: u32, beat: u8, tick: u32) -> Self {
        Self { bar, beat, tick }
    }

    /// Zero position (bar 1, beat 1, tick 0)
    pub fn zero() -> Self {
        Self::new(1, 1, 0)
    }

    /// Convert to total ticks from start
    pub fn to_total_ticks(&self, time_signature: &TimeSignature, ppq: u32) -> u64 {
        let ticks_per_beat = ppq as u64;
        let beats_per_bar = time_signature.numerator as u64;
        let ticks_per_bar = beats_per_bar * ticks_per_beat;

        // Convert to 0-based for calculation
        let bar_0 = (self.bar - 1) as u64;
        let beat_0 = (self.beat - 1) as u64;

        bar_0 * ticks_per_bar + beat_0 * ticks_per_beat + self.tick as u64
    }

    /// Create from total ticks
    pub fn from_total_ticks(total_ticks: u64, time_signature: &TimeSignature, ppq: u32) -> Self {
        let ticks_per_beat = ppq as u64;
        let beats_per_bar = time_signature.numerator as u64;
        let ticks_per_bar = beats_per_bar * ticks_per_beat;

        let bar = (total_ticks / ticks_per_bar) + 1; // 1-based
        let remaining_after_bars = total_ticks % ticks_per_bar;
        let beat = (remaining_after_bars / ticks_per_beat) + 1; // 1-based
        let tick = remaining_after_bars % ticks_per_beat;

        Self::new(bar as u32, beat as u8, tick as u32)
    }

    /// Quantize to nearest beat
    pub fn quantize_to_beat(&self, time_signature: &TimeSignature, ppq: u32) -> Self {
        let total_ticks = self.to_total_ticks(time_signature, ppq);
        let ticks_per_beat = ppq as u64;

        // Round to nearest beat
        let quantized_ticks =
            ((total_ticks + ticks_per_beat / 2) / ticks_per_beat) * ticks_per_beat;

        Self::from_total_ticks(quantized_ticks, time_signature, ppq)
    }
}

impl Default for MusicalTime {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for MusicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02}:{:03}", self.bar, self.beat, self.tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PPQ: u32 = 192;

    #[test]
    fn test_time_signature() {
        let ts = TimeSignature::four_four();
        assert_eq!(ts.numerator, 4);
        assert_eq!(ts.denominator, 4);
        assert_eq!(ts.beats_per_bar(), 4.0);
        assert_eq!(ts.to_string(), "4/4");
    }

    #[test]
    fn test_musical_time_conversion() {
        let ts = TimeSignature::four_four();

        // Bar 1, beat 1, tick 0 = 0 total ticks
        let time1 = MusicalTime::new(1, 1, 0);
        assert_eq!(time1.to_total_ticks(&ts, PPQ), 0);

        // Bar 1, beat 2, tick 0 = one quarter note
        let time2 = MusicalTime::new(1, 2, 0);
        assert_eq!(time2.to_total_ticks(&ts, PPQ), 192);

        // Bar 2, beat 1, tick 0 = 4 beats
        let time3 = MusicalTime::new(2, 1, 0);
        assert_eq!(time3.to_total_ticks(&ts, PPQ), 768);

        // Round trip
        let total = 1000u64;
        let converted = MusicalTime::from_total_ticks(total, &ts, PPQ);
        assert_eq!(converted.to_total_ticks(&ts, PPQ), total);
    }

    #[test]
    fn test_musical_time_quantization() {
        let ts = TimeSignature::four_four();

        // Halfway through beat 1 rounds up to beat 2
        let time = MusicalTime::new(1, 1, 96);
        let quantized = time.quantize_to_beat(&ts, PPQ);
        assert_eq!(quantized, MusicalTime::new(1, 2, 0));
    }

    #[test]
    fn test_different_time_signatures() {
        let ts_34 = TimeSignature::three_four();
        let ts_68 = TimeSignature::six_eight();

        assert_eq!(ts_34.beats_per_bar(), 3.0);
        assert_eq!(ts_68.beats_per_bar(), 6.0);

        // Bar 2 in 3/4 time = 3 beats from start
        let time_34 = MusicalTime::new(2, 1, 0);
        assert_eq!(time_34.to_total_ticks(&ts_34, PPQ), 576);

        // Bar 2 in 6/8 time = 6 beats from start
        let time_68 = MusicalTime::new(2, 1, 0);
        assert_eq!(time_68.to_total_ticks(&ts_68, PPQ), 1152);
    }
}
