//! The seam between automation and the remote attendance service.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::types::{TimeClockEvent, TimeClockKind};

/// Remote attendance service operations the automation engine depends on.
///
/// `punchclock-client` provides the HTTP implementation; tests use in-memory
/// fakes. Token refresh is an implementation detail behind this trait — a
/// caller only ever sees `AuthExpired` once the refresh contract is spent.
#[async_trait]
pub trait AttendanceApi: Send + Sync {
    /// Record a time-clock action, stamped "now" by the implementation.
    async fn record_event(&self, kind: TimeClockKind) -> Result<TimeClockEvent>;

    /// Fetch events in `[from, to]` (business dates, inclusive), sorted
    /// ascending by `(datetime, id)`.
    async fn list_events(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<TimeClockEvent>>;
}
