//! Time-clock state resolver.
//!
//! Derives the legal next action(s) purely from today's ordered event log.
//! The log is server-authoritative and append-only; nothing here holds state.
//!
//! State machine (initial = no events, terminal = clock_out):
//!
//! | last event   | legal next            |
//! |--------------|-----------------------|
//! | none         | clock_in              |
//! | clock_in     | clock_out, break_begin|
//! | break_begin  | break_end             |
//! | break_end    | clock_out, break_begin|
//! | clock_out    | (nothing)             |

use chrono::{DateTime, Utc};

use punchclock_core::types::{TimeClockEvent, TimeClockKind};

/// A break must run at least this long before `break_end` becomes legal.
pub const MIN_BREAK_SECS: i64 = 60;

/// Kind of the most recent event, by `(datetime, id)`. Events sharing a
/// timestamp are broken by id, so the answer is deterministic regardless of
/// input order.
pub fn last_kind(events: &[TimeClockEvent]) -> Option<TimeClockKind> {
    events
        .iter()
        .max_by_key(|e| e.sort_key())
        .map(|e| e.kind)
}

/// Legal next actions for the current state, per the table above.
pub fn available_actions(events: &[TimeClockEvent]) -> &'static [TimeClockKind] {
    use TimeClockKind::*;
    match last_kind(events) {
        None => &[ClockIn],
        Some(ClockIn) => &[ClockOut, BreakBegin],
        Some(BreakBegin) => &[BreakEnd],
        Some(BreakEnd) => &[ClockOut, BreakBegin],
        Some(ClockOut) => &[],
    }
}

/// Whether `kind` may be executed right now.
///
/// Beyond table membership, `break_end` requires the most recent
/// `break_begin` to be at least `MIN_BREAK_SECS` old — an instant
/// begin-then-end pair would be rejected by the service anyway.
pub fn can_execute(events: &[TimeClockEvent], kind: TimeClockKind, now: DateTime<Utc>) -> bool {
    if !available_actions(events).contains(&kind) {
        return false;
    }
    if kind == TimeClockKind::BreakEnd
        && let Some(begin) = events
            .iter()
            .filter(|e| e.kind == TimeClockKind::BreakBegin)
            .max_by_key(|e| e.sort_key())
        && (now - begin.datetime).num_seconds() < MIN_BREAK_SECS
    {
        return false;
    }
    true
}
