//! Randomized break scheduler.
//!
//! Two jittered entries per business day (break begin + break end). A
//! one-tick-per-minute loop checks for due entries, gates each through the
//! state resolver, and writes at most once per entry per day — a failed
//! write forfeits the slot rather than risking duplicate or contradictory
//! clock events later the same day.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use punchclock_core::config::BreakScheduleConfig;
use punchclock_core::traits::AttendanceApi;
use punchclock_core::types::{Notice, TimeClockKind};

use crate::day::{is_weekend, parse_hhmm};
use crate::notify::Notifier;
use crate::resolver;

/// One planned break action for the current day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledBreak {
    pub kind: TimeClockKind,
    pub scheduled_at: DateTime<Utc>,
    pub executed: bool,
}

/// Owns today's schedule and the executed-flags on it. One instance per
/// process; ticks are serialized by the loop in `spawn_schedule_loop`.
pub struct BreakScheduleEngine {
    config: BreakScheduleConfig,
    api: Arc<dyn AttendanceApi>,
    tz: Tz,
    notifier: Notifier,
    /// Day the current entries were generated for. Regeneration only happens
    /// when the business date differs, so repeated calls within one day keep
    /// the same jitter.
    generated_for: Option<NaiveDate>,
    entries: Vec<ScheduledBreak>,
    /// Cooperative stop: checked at the top of every tick and again before
    /// each network call. In-flight calls are not aborted.
    stopping: Arc<AtomicBool>,
}

impl BreakScheduleEngine {
    pub fn new(
        config: BreakScheduleConfig,
        api: Arc<dyn AttendanceApi>,
        tz: Tz,
        notifier: Notifier,
    ) -> Self {
        Self {
            config,
            api,
            tz,
            notifier,
            generated_for: None,
            entries: Vec::new(),
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Clone of the stop flag, so the host can request a stop without
    /// waiting for an in-flight tick to release the engine.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stopping.clone()
    }

    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        tracing::info!("🛑 Break scheduler stop requested");
    }

    /// Replace the config and discard today's schedule; the next tick
    /// regenerates with fresh jitter.
    pub fn update_config(&mut self, config: BreakScheduleConfig) {
        tracing::info!("📅 Break schedule config updated: {config:?}");
        self.config = config;
        self.generated_for = None;
        self.entries.clear();
    }

    pub fn entries(&self) -> &[ScheduledBreak] {
        &self.entries
    }

    /// Next unexecuted entry still in the future, for status display.
    pub fn next_pending(&self, now: DateTime<Utc>) -> Option<&ScheduledBreak> {
        self.entries
            .iter()
            .filter(|e| !e.executed && e.scheduled_at > now)
            .min_by_key(|e| e.scheduled_at)
    }

    /// Generate the two jittered entries for `today`. Idempotent per day:
    /// calling again without a date change keeps the existing entries (and
    /// their jitter and executed-flags) untouched.
    pub fn generate(&mut self, today: NaiveDate) {
        if self.generated_for == Some(today) {
            return;
        }

        self.entries.clear();
        self.generated_for = Some(today);

        for (kind, configured) in [
            (TimeClockKind::BreakBegin, &self.config.break_start_time),
            (TimeClockKind::BreakEnd, &self.config.break_end_time),
        ] {
            match jittered_at(today, configured, self.config.random_offset_minutes, self.tz) {
                Some(scheduled_at) => self.entries.push(ScheduledBreak {
                    kind,
                    scheduled_at,
                    executed: false,
                }),
                None => tracing::warn!("⚠️ Unusable break time '{configured}' — entry skipped"),
            }
        }

        tracing::info!(
            "📅 Break schedule for {today}: {}",
            self.entries
                .iter()
                .map(|e| format!("{} at {}", e.kind, e.scheduled_at.with_timezone(&self.tz)))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    /// One tick. No-op when disabled, stopping, or on a weekend in the
    /// business timezone (the power automator repeats the weekend check as a
    /// second line of defense).
    pub async fn check_and_execute(&mut self, now: DateTime<Utc>) {
        if !self.config.enabled || self.stopping.load(Ordering::SeqCst) {
            return;
        }

        let local = now.with_timezone(&self.tz);
        let today = local.date_naive();
        if is_weekend(today) {
            return;
        }

        self.generate(today);

        for i in 0..self.entries.len() {
            let (kind, scheduled_at, executed) = {
                let e = &self.entries[i];
                (e.kind, e.scheduled_at, e.executed)
            };
            if executed || scheduled_at > now {
                continue;
            }
            // Cooperative cancellation: nothing may hit the network once a
            // stop was requested.
            if self.stopping.load(Ordering::SeqCst) {
                return;
            }

            self.execute_entry(kind, today, now).await;
            // One attempt per entry per day, whatever the outcome.
            self.entries[i].executed = true;
        }
    }

    async fn execute_entry(&self, kind: TimeClockKind, today: NaiveDate, now: DateTime<Utc>) {
        let events = match self.api.list_events(today, today).await {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!("⚠️ Could not fetch today's events for scheduled {kind}: {e}");
                return;
            }
        };

        if !resolver::can_execute(&events, kind, now) {
            tracing::info!("⏭️ Scheduled {kind} is not legal right now — slot forfeited");
            return;
        }

        match self.api.record_event(kind).await {
            Ok(event) => {
                tracing::info!("✅ Scheduled {kind} recorded (id {})", event.id);
                self.notifier.emit(match kind {
                    TimeClockKind::BreakBegin => Notice::BreakStarted,
                    _ => Notice::BreakEnded,
                });
            }
            Err(e) if e.is_illegal_transition() => {
                tracing::info!("⏭️ Service rejected scheduled {kind} as illegal — no-op");
            }
            Err(punchclock_core::Error::AuthExpired) => {
                tracing::warn!("🔒 Scheduled {kind} failed: re-authentication required");
                self.notifier.emit(Notice::ReauthRequired);
            }
            Err(e) => {
                tracing::warn!("⚠️ Scheduled {kind} failed (not retried today): {e}");
            }
        }
    }
}

/// Apply the configured jitter to `HH:MM` on `date` in zone `tz`.
fn jittered_at(
    date: NaiveDate,
    configured: &str,
    offset_minutes: u32,
    tz: Tz,
) -> Option<DateTime<Utc>> {
    let time = parse_hhmm(configured)?;
    let offset = offset_minutes as i64;
    let jitter = rand::thread_rng().gen_range(-offset..=offset);
    let naive = date.and_time(time) + Duration::minutes(jitter);
    // `earliest` resolves DST gaps/folds; None only for nonexistent times.
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Spawn the one-tick-per-minute loop. A tick that finds the engine busy
/// (previous check still mid-network-call) is skipped, never run
/// concurrently. The first check fires immediately.
pub fn spawn_schedule_loop(
    engine: Arc<Mutex<BreakScheduleEngine>>,
    check_interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("⏰ Break schedule loop started (check every {check_interval_secs}s)");
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(check_interval_secs));
        loop {
            interval.tick().await;
            match engine.try_lock() {
                Ok(mut engine) => engine.check_and_execute(Utc::now()).await,
                Err(_) => tracing::debug!("Tick skipped — previous check still running"),
            }
        }
    })
}
