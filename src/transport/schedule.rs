// TransportSchedule - tick-keyed event registry for the transport
// One-shot events live on an EventTimeline keyed by tick; repeating
// events keep a rolling two-occurrence window on the same timeline

use std::collections::HashMap;

use crate::error::{TimingError, TimingResult};
use crate::timeline::{EventTimeline, IntervalTimeline};

/// Identifier handed back by the scheduling calls
pub type EventId = u64;

/// A scheduled user callback, invoked with the event's wall-clock time
pub type EventCallback = Box<dyn FnMut(f64) -> TimingResult<()>>;

/// Guard when mapping fractional tick positions onto integer firings
const TICK_EPSILON: f64 = 1e-8;

enum ScheduleKind {
    /// Fires whenever the transport passes its tick; `once` events are
    /// removed after the first firing, the rest persist across loops
    Oneshot { seq: u64, once: bool },
    /// Fires every `interval` ticks inside `[start_tick, end_tick)`.
    /// Only the occurrences in `occurrences` exist concretely; firing
    /// one materializes the next.
    Repeat {
        interval: f64,
        start_tick: f64,
        end_tick: f64,
        window_seq: u64,
        occurrences: Vec<(f64, u64)>,
    },
}

struct ScheduledEvent {
    kind: ScheduleKind,
    callback: EventCallback,
}

/// The transport's event registry
///
/// Occurrences are keyed by absolute tick on an [`EventTimeline`];
/// repeat registrations additionally record their active tick range on
/// an [`IntervalTimeline`] so seeks can find which repeats cover a
/// position. All firing happens through [`fire_tick`](Self::fire_tick),
/// called once per elapsed integer tick.
#[derive(Default)]
pub struct TransportSchedule {
    events: EventTimeline<EventId>,
    repeats: IntervalTimeline<EventId>,
    callbacks: HashMap<EventId, ScheduledEvent>,
    next_id: EventId,
}

impl TransportSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live registrations (one-shot and repeat)
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    fn next_id(&mut self) -> EventId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Register a one-shot callback at an absolute tick
    pub fn schedule(
        &mut self,
        tick: f64,
        once: bool,
        callback: EventCallback,
    ) -> TimingResult<EventId> {
        TimingError::check_non_negative("event tick", tick)?;
        let id = self.next_id();
        let seq = self.events.add(tick, id)?;
        self.callbacks.insert(
            id,
            ScheduledEvent {
                kind: ScheduleKind::Oneshot { seq, once },
                callback,
            },
        );
        Ok(id)
    }

    /// Register a repeating callback every `interval` ticks from
    /// `start_tick`, optionally bounded to `duration` ticks.
    /// `current_tick` positions the initial occurrence window.
    pub fn schedule_repeat(
        &mut self,
        interval: f64,
        start_tick: f64,
        duration: Option<f64>,
        current_tick: f64,
        callback: EventCallback,
    ) -> TimingResult<EventId> {
        TimingError::check_non_negative("repeat start", start_tick)?;
        TimingError::check_finite("repeat interval", interval)?;
        if interval <= 0.0 {
            return Err(TimingError::InvalidArgument {
                what: "repeat interval",
                value: interval,
            });
        }
        let end_tick = match duration {
            Some(duration) => {
                TimingError::check_non_negative("repeat duration", duration)?;
                start_tick + duration
            }
            None => f64::INFINITY,
        };

        let id = self.next_id();
        let window_seq = self.repeats.insert(start_tick, end_tick, id)?;
        self.callbacks.insert(
            id,
            ScheduledEvent {
                kind: ScheduleKind::Repeat {
                    interval,
                    start_tick,
                    end_tick,
                    window_seq,
                    occurrences: Vec::new(),
                },
                callback,
            },
        );
        self.rebuild_repeat(id, current_tick)?;
        Ok(id)
    }

    /// Remove a registration entirely
    pub fn clear(&mut self, id: EventId) {
        let Some(entry) = self.callbacks.remove(&id) else {
            return;
        };
        match entry.kind {
            ScheduleKind::Oneshot { seq, .. } => {
                self.events.remove_seq(seq);
            }
            ScheduleKind::Repeat {
                start_tick,
                window_seq,
                occurrences,
                ..
            } => {
                for (_, seq) in occurrences {
                    self.events.remove_seq(seq);
                }
                self.repeats.remove(start_tick, window_seq);
            }
        }
    }

    /// Remove every one-shot at or after `tick` and tear down every
    /// repeat starting at or after it
    pub fn cancel(&mut self, tick: f64) {
        let mut doomed = Vec::new();
        for ev in self.events.events_from(tick) {
            if let Some(entry) = self.callbacks.get(&ev.payload) {
                if matches!(entry.kind, ScheduleKind::Oneshot { .. }) {
                    doomed.push(ev.payload);
                }
            }
        }
        for (id, entry) in &self.callbacks {
            if let ScheduleKind::Repeat { start_tick, .. } = entry.kind {
                if start_tick >= tick - TICK_EPSILON {
                    doomed.push(*id);
                }
            }
        }
        for id in doomed {
            self.clear(id);
        }
    }

    /// Tear down and re-materialize every repeat's occurrence window
    /// around `position_tick`; used on start, seek and loop wrap
    pub fn rebuild_repeats(&mut self, position_tick: f64) -> TimingResult<()> {
        let ids: Vec<EventId> = self
            .callbacks
            .iter()
            .filter(|(_, entry)| matches!(entry.kind, ScheduleKind::Repeat { .. }))
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            self.rebuild_repeat(id, position_tick)?;
        }
        Ok(())
    }

    fn rebuild_repeat(&mut self, id: EventId, position_tick: f64) -> TimingResult<()> {
        let Some(entry) = self.callbacks.get_mut(&id) else {
            return Ok(());
        };
        let ScheduleKind::Repeat {
            interval,
            start_tick,
            end_tick,
            occurrences,
            ..
        } = &mut entry.kind
        else {
            return Ok(());
        };

        for (_, seq) in occurrences.drain(..) {
            self.events.remove_seq(seq);
        }

        // First occurrence at or after the position, aligned to the grid
        let base = if position_tick <= *start_tick {
            *start_tick
        } else {
            let steps = ((position_tick - *start_tick) / *interval - TICK_EPSILON).ceil();
            *start_tick + steps.max(0.0) * *interval
        };

        for occurrence in [base, base + *interval] {
            if occurrence < *end_tick {
                let seq = self.events.add(occurrence, id)?;
                occurrences.push((occurrence, seq));
            }
        }
        Ok(())
    }

    /// Concrete occurrence count of a repeat; one-shots report 1
    pub fn occurrence_count(&self, id: EventId) -> usize {
        match self.callbacks.get(&id).map(|entry| &entry.kind) {
            Some(ScheduleKind::Repeat { occurrences, .. }) => occurrences.len(),
            Some(ScheduleKind::Oneshot { .. }) => 1,
            None => 0,
        }
    }

    /// Fire everything bound to integer tick `tick`: one-shots first,
    /// then repeats, each in registration order
    ///
    /// A callback error stops the remaining callbacks of this tick but
    /// the fired events' bookkeeping still completes; the first error
    /// is returned.
    pub fn fire_tick(&mut self, tick: u64, time: f64) -> TimingResult<()> {
        let tick_value = tick as f64;
        let mut due: Vec<(bool, u64, f64, EventId)> = self
            .events
            .events_between(tick_value, tick_value + 1.0)
            .into_iter()
            .map(|ev| {
                let is_repeat = self
                    .callbacks
                    .get(&ev.payload)
                    .is_some_and(|entry| matches!(entry.kind, ScheduleKind::Repeat { .. }));
                (is_repeat, ev.seq, ev.time, ev.payload)
            })
            .collect();
        due.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut error: Option<TimingError> = None;
        for (_, seq, occurrence_tick, id) in due {
            let Some(entry) = self.callbacks.get_mut(&id) else {
                continue;
            };
            if error.is_none() {
                if let Err(err) = (entry.callback)(time) {
                    error = Some(err);
                }
            }
            match entry.kind {
                ScheduleKind::Oneshot { once: true, .. } => {
                    self.events.remove_seq(seq);
                    self.callbacks.remove(&id);
                }
                ScheduleKind::Oneshot { once: false, .. } => {}
                ScheduleKind::Repeat { .. } => {
                    self.advance_repeat(id, seq, occurrence_tick)?;
                }
            }
        }

        match error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Drop the fired occurrence and materialize the one after the
    /// latest still pending, keeping at most two concrete occurrences
    fn advance_repeat(
        &mut self,
        id: EventId,
        fired_seq: u64,
        fired_tick: f64,
    ) -> TimingResult<()> {
        self.events.remove_seq(fired_seq);
        let Some(entry) = self.callbacks.get_mut(&id) else {
            return Ok(());
        };
        let ScheduleKind::Repeat {
            interval,
            end_tick,
            occurrences,
            ..
        } = &mut entry.kind
        else {
            return Ok(());
        };

        occurrences.retain(|&(_, seq)| seq != fired_seq);
        let latest = occurrences
            .iter()
            .map(|&(tick, _)| tick)
            .fold(fired_tick, f64::max);
        let next = latest + *interval;
        if next < *end_tick {
            let seq = self.events.add(next, id)?;
            occurrences.push((next, seq));
        }
        Ok(())
    }
}
