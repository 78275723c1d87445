//! In-memory `AttendanceApi` fake shared by the scheduler and power tests.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use punchclock_core::error::{Error, Result};
use punchclock_core::traits::AttendanceApi;
use punchclock_core::types::{TimeClockEvent, TimeClockKind};

/// How `record_event` should misbehave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    None,
    /// Transport failure.
    Http,
    /// Server-side illegal-transition rejection.
    Illegal,
    /// Terminal auth failure.
    Auth,
    /// Never completes (for timeout tests; pair with paused tokio time).
    Hang,
}

pub struct MockApi {
    events: Mutex<Vec<TimeClockEvent>>,
    /// Every kind passed to `record_event`, in call order.
    pub recorded: Mutex<Vec<TimeClockKind>>,
    pub fail_mode: Mutex<FailMode>,
    /// Timestamp stamped onto recorded events.
    now: Mutex<DateTime<Utc>>,
    next_id: AtomicI64,
}

impl MockApi {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            recorded: Mutex::new(Vec::new()),
            fail_mode: Mutex::new(FailMode::None),
            now: Mutex::new(Utc::now()),
            next_id: AtomicI64::new(100),
        }
    }

    pub fn with_events(events: Vec<TimeClockEvent>) -> Self {
        let mock = Self::new();
        *mock.events.lock().unwrap() = events;
        mock
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn set_fail_mode(&self, mode: FailMode) {
        *self.fail_mode.lock().unwrap() = mode;
    }

    pub fn recorded_kinds(&self) -> Vec<TimeClockKind> {
        self.recorded.lock().unwrap().clone()
    }
}

#[async_trait]
impl AttendanceApi for MockApi {
    async fn record_event(&self, kind: TimeClockKind) -> Result<TimeClockEvent> {
        // Copy the mode out so no guard is held across the Hang await.
        let mode = *self.fail_mode.lock().unwrap();
        match mode {
            FailMode::None => {}
            FailMode::Http => return Err(Error::Http("connection refused".into())),
            FailMode::Illegal => return Err(Error::IllegalTransition(kind)),
            FailMode::Auth => return Err(Error::AuthExpired),
            FailMode::Hang => {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                unreachable!("hang mode should be cut off by a timeout");
            }
        }
        self.recorded.lock().unwrap().push(kind);
        let event = TimeClockEvent {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            kind,
            datetime: *self.now.lock().unwrap(),
        };
        self.events.lock().unwrap().push(event.clone());
        Ok(event)
    }

    async fn list_events(&self, _from: NaiveDate, _to: NaiveDate) -> Result<Vec<TimeClockEvent>> {
        let mut events = self.events.lock().unwrap().clone();
        events.sort_by_key(TimeClockEvent::sort_key);
        Ok(events)
    }
}

/// A UTC instant from Tokyo wall-clock time (the default business zone).
pub fn tokyo(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    chrono_tz::Asia::Tokyo
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn event_at(id: i64, kind: TimeClockKind, at: DateTime<Utc>) -> TimeClockEvent {
    TimeClockEvent {
        id,
        kind,
        datetime: at,
    }
}
