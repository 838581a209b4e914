//! Discrete, time-stamped actions and the cursor-based executor that replays
//! them. Rewind safety comes from full replay: when time moves backward past
//! an already-executed event the runner resets to the beginning and the owner
//! restores its invariants through the reset hook, so re-running establishes
//! exactly the same activation sequence.

use crate::core::TimeMs;

/// One discrete action scheduled at a point on a scope's timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimelineEvent<A> {
    pub time: TimeMs,
    pub action: A,
}

/// What the runner reports while advancing: either the reset notification
/// (so the owner can clear active sets / restore initial values before the
/// replay) or one due event's action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunnerStep<A> {
    Reset,
    Event(A),
}

/// Ordered executor over a scope's events.
///
/// Events execute strictly in nondecreasing time order; ties run in script
/// order (construction uses a stable sort). There is no incremental undo —
/// only reset and replay.
#[derive(Clone, Debug)]
pub struct EventRunner<A> {
    events: Vec<TimelineEvent<A>>,
    cursor: usize,
}

impl<A: Copy> EventRunner<A> {
    pub fn new(mut events: Vec<TimelineEvent<A>>) -> Self {
        events.sort_by_key(|e| e.time);
        Self { events, cursor: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Index of the next unconsumed event.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move the cursor back to the start. The owner is responsible for
    /// restoring whatever state past events mutated.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Advance to `time`, feeding every step through `sink`.
    ///
    /// If `time` lies before the last event already executed,
    /// `RunnerStep::Reset` is emitted first and the event sequence replays
    /// from the beginning.
    pub fn update(&mut self, time: TimeMs, mut sink: impl FnMut(RunnerStep<A>)) {
        if self.cursor > 0 && self.events[self.cursor - 1].time > time {
            self.reset();
            sink(RunnerStep::Reset);
        }
        while let Some(ev) = self.events.get(self.cursor) {
            if ev.time > time {
                break;
            }
            let action = ev.action;
            self.cursor += 1;
            sink(RunnerStep::Event(action));
        }
    }
}
