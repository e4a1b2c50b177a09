// Transport - musical-time scheduler over a Clock
// Tempo, looping, swing and tick-keyed event dispatch

pub mod position;
pub mod schedule;

pub use position::{MusicalTime, TimeSignature};
pub use schedule::{EventCallback, EventId, TransportSchedule};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::automation::{AutomationCurve, AutomationParam};
use crate::clock::{Clock, ClockConfig, ClockObserver};
use crate::error::{TimingError, TimingResult};
use crate::timeline::{PlaybackState, time_lt};

/// Transport construction parameters
///
/// `loop_end <= loop_start` leaves looping disabled; `swing_amount` is
/// the fraction of maximum swing in `[0, 1]`; `swing_subdivision` is in
/// ticks (the default of half the PPQ swings eighth notes). PPQ is
/// fixed for the transport's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub tempo: f64,
    pub pulses_per_quarter_note: u32,
    pub loop_start: f64,
    pub loop_end: f64,
    pub time_signature: TimeSignature,
    pub swing_amount: f64,
    pub swing_subdivision: f64,
    pub clock: ClockConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tempo: 120.0,
            pulses_per_quarter_note: 192,
            loop_start: 0.0,
            loop_end: 0.0,
            time_signature: TimeSignature::four_four(),
            swing_amount: 0.0,
            swing_subdivision: 96.0,
            clock: ClockConfig::default(),
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> TimingResult<()> {
        TimingError::check_finite("tempo", self.tempo)?;
        if self.tempo <= 0.0 {
            return Err(TimingError::InvalidArgument {
                what: "tempo",
                value: self.tempo,
            });
        }
        if self.pulses_per_quarter_note == 0 {
            return Err(TimingError::InvalidArgument {
                what: "pulses per quarter note",
                value: 0.0,
            });
        }
        TimingError::check_non_negative("loop start", self.loop_start)?;
        TimingError::check_non_negative("loop end", self.loop_end)?;
        if !(0.0..=1.0).contains(&self.swing_amount) {
            return Err(TimingError::InvalidArgument {
                what: "swing amount",
                value: self.swing_amount,
            });
        }
        if self.swing_subdivision <= 0.0 || !self.swing_subdivision.is_finite() {
            return Err(TimingError::InvalidArgument {
                what: "swing subdivision",
                value: self.swing_subdivision,
            });
        }
        self.clock.validate()
    }
}

/// Receiver of transport lifecycle notifications
pub trait TransportObserver {
    fn on_start(&mut self, _time: f64, _ticks: f64) {}
    fn on_stop(&mut self, _time: f64) {}
    fn on_pause(&mut self, _time: f64) {}
    fn on_loop(&mut self, _time: f64) {}
}

/// Observer that discards every notification
pub struct NullObserver;

impl TransportObserver for NullObserver {}

/// Handle to a tempo-synced signal; see [`Transport::sync_signal`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyncHandle(u64);

struct SyncedSignal {
    curve: AutomationCurve,
    ratio: f64,
    reciprocal: bool,
    original: f64,
}

enum LifecycleNote {
    Started(f64, f64),
    Stopped(f64),
    Paused(f64),
}

#[derive(Default)]
struct WindowRecorder {
    lifecycle: Vec<LifecycleNote>,
    ticks: Vec<(f64, u64)>,
}

impl ClockObserver for WindowRecorder {
    fn on_started(&mut self, time: f64, ticks: f64) {
        self.lifecycle.push(LifecycleNote::Started(time, ticks));
    }

    fn on_stopped(&mut self, time: f64) {
        self.lifecycle.push(LifecycleNote::Stopped(time));
    }

    fn on_paused(&mut self, time: f64) {
        self.lifecycle.push(LifecycleNote::Paused(time));
    }

    fn on_tick(&mut self, time: f64, tick: u64) -> TimingResult<()> {
        self.ticks.push((time, tick));
        Ok(())
    }
}

/// The musical-time scheduler
///
/// Owns one [`Clock`] whose rate curve carries the tempo in ticks per
/// second, a one-shot/repeat event registry, loop points and swing.
/// All scheduling is keyed by absolute tick; `process` converts elapsed
/// wall time into tick firings, handling loop wraps and swing delays.
pub struct Transport {
    clock: Clock,
    schedule: TransportSchedule,
    ppq: u32,
    time_signature: TimeSignature,
    loop_start: f64,
    loop_end: f64,
    swing_amount: f64,
    swing_subdivision: f64,
    synced: HashMap<u64, SyncedSignal>,
    next_sync_id: u64,
    pending_brackets: Vec<(f64, f64)>,
}

impl Transport {
    pub fn new(config: TransportConfig) -> TimingResult<Self> {
        config.validate()?;
        let ppq = config.pulses_per_quarter_note;
        let rate = Self::bpm_to_rate(config.tempo, ppq);
        Ok(Self {
            clock: Clock::new(rate, config.clock)?,
            schedule: TransportSchedule::new(),
            ppq,
            time_signature: config.time_signature,
            loop_start: config.loop_start,
            loop_end: config.loop_end,
            swing_amount: config.swing_amount,
            swing_subdivision: config.swing_subdivision,
            synced: HashMap::new(),
            next_sync_id: 0,
            pending_brackets: Vec::new(),
        })
    }

    fn bpm_to_rate(bpm: f64, ppq: u32) -> f64 {
        bpm / 60.0 * ppq as f64
    }

    fn rate_to_bpm(rate: f64, ppq: u32) -> f64 {
        rate * 60.0 / ppq as f64
    }

    pub fn ppq(&self) -> u32 {
        self.ppq
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn state_at(&self, t: f64) -> PlaybackState {
        self.clock.state_at(t)
    }

    // --- tempo surface -------------------------------------------------

    /// Tempo in bpm at `t`
    pub fn tempo_at(&self, t: f64) -> f64 {
        Self::rate_to_bpm(
            self.clock.source().frequency().get_value_at_time(t),
            self.ppq,
        )
    }

    /// Step the tempo to `bpm` exactly at `t`
    pub fn set_tempo(&mut self, bpm: f64, t: f64) -> TimingResult<()> {
        self.set_value_at_time(bpm, t)
    }

    /// Ramp the tempo linearly from its value at `t0` to `bpm` at `t1`
    pub fn ramp_tempo(&mut self, bpm: f64, t0: f64, t1: f64) -> TimingResult<()> {
        let from = self.tempo_at(t0);
        self.set_value_at_time(from, t0)?;
        self.linear_ramp_to_value_at_time(bpm, t1)
    }

    // --- lifecycle -----------------------------------------------------

    /// Start at `t`, optionally from an absolute tick position
    pub fn start(&mut self, t: f64, offset_ticks: Option<f64>) -> TimingResult<()> {
        self.clock.start(t, offset_ticks)?;
        let position = offset_ticks.unwrap_or_else(|| self.clock.ticks_at(t));
        self.schedule.rebuild_repeats(position)
    }

    /// Stop at `t`, resetting the position to tick zero
    pub fn stop(&mut self, t: f64) -> TimingResult<()> {
        self.clock.stop(t)
    }

    /// Pause at `t`, keeping the position
    pub fn pause(&mut self, t: f64) -> TimingResult<()> {
        self.clock.pause(t)
    }

    // --- position ------------------------------------------------------

    pub fn ticks_at(&self, t: f64) -> f64 {
        self.clock.ticks_at(t)
    }

    pub fn seconds_at(&self, t: f64) -> f64 {
        self.clock.seconds_at(t)
    }

    pub fn time_of_tick(&self, tick: f64, now: f64) -> f64 {
        self.clock.time_of_tick(tick, now)
    }

    /// Position at `t` as bars:beats:ticks
    pub fn position_at(&self, t: f64) -> MusicalTime {
        let ticks = self.clock.ticks_at(t).max(0.0) as u64;
        MusicalTime::from_total_ticks(ticks, &self.time_signature, self.ppq)
    }

    /// Jump to an absolute tick at `t`; while started this surfaces as
    /// a stop/start bracket on the next `process`
    pub fn set_ticks(&mut self, ticks: f64, t: f64) -> TimingResult<()> {
        let started = self.clock.state_at(t) == PlaybackState::Started;
        self.clock.set_ticks(ticks, t)?;
        self.schedule.rebuild_repeats(ticks)?;
        if started {
            self.pending_brackets.push((t, ticks));
        }
        Ok(())
    }

    /// Jump to a bars:beats:ticks position at `t`
    pub fn set_position(&mut self, position: MusicalTime, t: f64) -> TimingResult<()> {
        let ticks = position.to_total_ticks(&self.time_signature, self.ppq) as f64;
        self.set_ticks(ticks, t)
    }

    /// Wall-clock time of the next multiple of `subdivision` ticks
    pub fn next_subdivision(&self, subdivision: f64, now: f64) -> TimingResult<f64> {
        if subdivision <= 0.0 || !subdivision.is_finite() {
            return Err(TimingError::InvalidArgument {
                what: "subdivision",
                value: subdivision,
            });
        }
        let ticks = self.clock.ticks_at(now);
        let next = ((ticks / subdivision).floor() + 1.0) * subdivision;
        Ok(self.clock.time_of_tick(next, now))
    }

    // --- looping and swing ---------------------------------------------

    pub fn loop_points(&self) -> (f64, f64) {
        (self.loop_start, self.loop_end)
    }

    /// Loop `[start_tick, end_tick)`; `end_tick <= start_tick` disables
    pub fn set_loop_points(&mut self, start_tick: f64, end_tick: f64) -> TimingResult<()> {
        TimingError::check_non_negative("loop start", start_tick)?;
        TimingError::check_non_negative("loop end", end_tick)?;
        self.loop_start = start_tick;
        self.loop_end = end_tick;
        Ok(())
    }

    fn looping(&self) -> bool {
        self.loop_end > self.loop_start
    }

    pub fn set_swing(&mut self, amount: f64) -> TimingResult<()> {
        if !(0.0..=1.0).contains(&amount) {
            return Err(TimingError::InvalidArgument {
                what: "swing amount",
                value: amount,
            });
        }
        self.swing_amount = amount;
        Ok(())
    }

    pub fn set_swing_subdivision(&mut self, ticks: f64) -> TimingResult<()> {
        if ticks <= 0.0 || !ticks.is_finite() {
            return Err(TimingError::InvalidArgument {
                what: "swing subdivision",
                value: ticks,
            });
        }
        self.swing_subdivision = ticks;
        Ok(())
    }

    /// Swing delay in seconds for `tick`; zero on downbeats and on
    /// even subdivision boundaries
    fn swing_delay(&self, tick: u64, at: f64) -> f64 {
        if self.swing_amount <= 0.0 {
            return 0.0;
        }
        let tick = tick as f64;
        let double_sub = 2.0 * self.swing_subdivision;
        if tick % self.ppq as f64 == 0.0 || tick % double_sub == 0.0 {
            return 0.0;
        }
        let phase = (tick % double_sub) / double_sub;
        let amount = (std::f64::consts::PI * phase).sin() * self.swing_amount;
        amount
            * self
                .clock
                .source()
                .frequency()
                .get_duration_of_ticks(double_sub / 3.0, at)
    }

    // --- scheduling ----------------------------------------------------

    /// Schedule `callback` at an absolute tick; persists across loops
    pub fn schedule(&mut self, tick: f64, callback: EventCallback) -> TimingResult<EventId> {
        self.schedule.schedule(tick, false, callback)
    }

    /// Schedule `callback` at an absolute tick, removed after firing
    pub fn schedule_once(&mut self, tick: f64, callback: EventCallback) -> TimingResult<EventId> {
        self.schedule.schedule(tick, true, callback)
    }

    /// Schedule `callback` every `interval` ticks from `start_tick`,
    /// optionally bounded to `duration` ticks
    pub fn schedule_repeat(
        &mut self,
        interval: f64,
        start_tick: f64,
        duration: Option<f64>,
        callback: EventCallback,
    ) -> TimingResult<EventId> {
        let position = self.clock.ticks_at(self.clock.last_update());
        self.schedule
            .schedule_repeat(interval, start_tick, duration, position, callback)
    }

    pub fn clear(&mut self, id: EventId) {
        self.schedule.clear(id);
    }

    /// Remove one-shots at or after `tick` and tear down repeats
    /// starting at or after it
    pub fn cancel(&mut self, tick: f64) {
        self.schedule.cancel(tick);
    }

    // --- processing ----------------------------------------------------

    /// Advance over `[last_update, now)`: pending seek brackets first,
    /// then per chunk lifecycle, ticks and events, wrapping at the loop
    /// end as many times as the window requires
    pub fn process(
        &mut self,
        now: f64,
        observer: &mut dyn TransportObserver,
    ) -> TimingResult<()> {
        let mut window_start = self.clock.last_update();
        if now <= window_start {
            return Ok(());
        }
        self.clock.mark_processed(now);

        for (time, ticks) in std::mem::take(&mut self.pending_brackets) {
            observer.on_stop(time);
            observer.on_start(time, ticks);
        }

        loop {
            match self.next_wrap_time(window_start, now) {
                Some(wrap_time) => {
                    self.run_window(window_start, wrap_time, observer)?;
                    self.clock.set_ticks(self.loop_start, wrap_time)?;
                    observer.on_loop(wrap_time);
                    self.schedule.rebuild_repeats(self.loop_start)?;
                    window_start = wrap_time;
                }
                None => {
                    self.run_window(window_start, now, observer)?;
                    return Ok(());
                }
            }
        }
    }

    /// Time within `[a, b)` at which the position reaches the loop end
    ///
    /// Inclusive at `a`: a wrap landing exactly on a window boundary
    /// belongs to the window that starts there. Progress is still
    /// guaranteed because resetting to `loop_start` pushes the next
    /// wrap strictly later.
    fn next_wrap_time(&self, a: f64, b: f64) -> Option<f64> {
        if !self.looping() || self.clock.state_at(a) != PlaybackState::Started {
            return None;
        }
        if self.clock.ticks_at(a) >= self.loop_end {
            return Some(a);
        }
        let wrap = self.clock.time_of_tick(self.loop_end, a);
        if wrap.is_finite() && time_lt(wrap, b) {
            Some(wrap.max(a))
        } else {
            None
        }
    }

    fn run_window(
        &mut self,
        a: f64,
        b: f64,
        observer: &mut dyn TransportObserver,
    ) -> TimingResult<()> {
        let mut recorder = WindowRecorder::default();
        self.clock.process_window(a, b, &mut recorder)?;

        for note in recorder.lifecycle {
            match note {
                LifecycleNote::Started(time, ticks) => observer.on_start(time, ticks),
                LifecycleNote::Stopped(time) => observer.on_stop(time),
                LifecycleNote::Paused(time) => observer.on_pause(time),
            }
        }

        for (time, tick) in recorder.ticks {
            let fire_time = time + self.swing_delay(tick, time);
            self.schedule.fire_tick(tick, fire_time)?;
        }
        Ok(())
    }

    // --- tempo-synced signals ------------------------------------------

    /// Take ownership of `curve` and serve its value as a fixed ratio
    /// of the tempo from `t` on; `reciprocal` for parameters
    /// denominated in the inverse unit (durations rather than rates)
    pub fn sync_signal(
        &mut self,
        curve: AutomationCurve,
        reciprocal: bool,
        t: f64,
    ) -> TimingResult<SyncHandle> {
        let tempo = self.tempo_at(t);
        if tempo <= 0.0 {
            return Err(TimingError::InvalidArgument {
                what: "tempo",
                value: tempo,
            });
        }
        let original = curve.get_value_at_time(t);
        let ratio = if reciprocal {
            original * tempo
        } else {
            original / tempo
        };
        let id = self.next_sync_id;
        self.next_sync_id += 1;
        self.synced.insert(
            id,
            SyncedSignal {
                curve,
                ratio,
                reciprocal,
                original,
            },
        );
        Ok(SyncHandle(id))
    }

    /// Value of a synced signal at `t`, tracking the tempo curve
    pub fn synced_value_at(&self, handle: SyncHandle, t: f64) -> Option<f64> {
        let signal = self.synced.get(&handle.0)?;
        let tempo = self.tempo_at(t);
        Some(if signal.reciprocal {
            signal.ratio / tempo
        } else {
            signal.ratio * tempo
        })
    }

    /// Release a synced signal, restoring its pre-sync fixed value
    pub fn unsync_signal(&mut self, handle: SyncHandle, t: f64) -> Option<AutomationCurve> {
        let mut signal = self.synced.remove(&handle.0)?;
        // The restore cannot fail: t was validated when the value was read
        let _ = signal.curve.cancel_scheduled_values(t);
        let _ = signal.curve.set_value_at_time(signal.original, t);
        Some(signal.curve)
    }
}

impl AutomationParam for Transport {
    fn get_value_at_time(&self, t: f64) -> f64 {
        self.tempo_at(t)
    }

    fn set_value_at_time(&mut self, bpm: f64, t: f64) -> TimingResult<()> {
        let rate = Self::bpm_to_rate(bpm, self.ppq);
        self.clock.source_mut().set_frequency_at_time(rate, t)
    }

    fn linear_ramp_to_value_at_time(&mut self, bpm: f64, t: f64) -> TimingResult<()> {
        let rate = Self::bpm_to_rate(bpm, self.ppq);
        self.clock.source_mut().linear_ramp_frequency(rate, t)
    }

    fn exponential_ramp_to_value_at_time(&mut self, bpm: f64, t: f64) -> TimingResult<()> {
        let rate = Self::bpm_to_rate(bpm, self.ppq);
        self.clock.source_mut().exponential_ramp_frequency(rate, t)
    }

    fn set_target_at_time(&mut self, bpm: f64, t: f64, time_constant: f64) -> TimingResult<()> {
        let rate = Self::bpm_to_rate(bpm, self.ppq);
        self.clock
            .source_mut()
            .set_frequency_target(rate, t, time_constant)
    }

    fn cancel_scheduled_values(&mut self, t: f64) -> TimingResult<()> {
        self.clock.source_mut().cancel_frequency_values(t)
    }
}
