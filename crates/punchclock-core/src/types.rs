//! Time-clock event types — the core data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four time-clock actions the remote service records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeClockKind {
    ClockIn,
    ClockOut,
    BreakBegin,
    BreakEnd,
}

impl TimeClockKind {
    /// Wire name used by the remote service (`clock_in`, `break_begin`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClockIn => "clock_in",
            Self::ClockOut => "clock_out",
            Self::BreakBegin => "break_begin",
            Self::BreakEnd => "break_end",
        }
    }

    /// Parse a wire name back into a kind.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "clock_in" => Some(Self::ClockIn),
            "clock_out" => Some(Self::ClockOut),
            "break_begin" => Some(Self::BreakBegin),
            "break_end" => Some(Self::BreakEnd),
            _ => None,
        }
    }
}

impl std::fmt::Display for TimeClockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry of the server-side append-only time-clock log.
///
/// Ordering is by `(datetime, id)` — the id breaks timestamp ties so that
/// "most recent event" is deterministic even when the service hands back two
/// events stamped in the same second.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeClockEvent {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: TimeClockKind,
    pub datetime: DateTime<Utc>,
}

impl TimeClockEvent {
    /// Sort key: timestamp first, id as the deterministic tie-break.
    pub fn sort_key(&self) -> (DateTime<Utc>, i64) {
        (self.datetime, self.id)
    }
}

/// Fire-and-forget notifications for the presentation layer.
///
/// Delivery is best-effort; automation correctness never depends on anyone
/// listening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    BreakStarted,
    BreakEnded,
    AutoClockIn,
    AutoClockOutTimeBased,
    AutoClockOutShutdown,
    ReauthRequired,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_roundtrip() {
        for kind in [
            TimeClockKind::ClockIn,
            TimeClockKind::ClockOut,
            TimeClockKind::BreakBegin,
            TimeClockKind::BreakEnd,
        ] {
            assert_eq!(TimeClockKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(TimeClockKind::parse("lunch"), None);
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&TimeClockKind::BreakBegin).unwrap();
        assert_eq!(json, "\"break_begin\"");
    }
}
