//! Power-event automation.
//!
//! Reacts to OS power/lock/shutdown signals and application startup. Every
//! handler re-fetches today's events, applies the priority rules, and gates
//! writes through the state resolver. Nothing here ever propagates an error
//! back into an OS callback — failures are logged and swallowed, except that
//! an expired authorization additionally raises a `ReauthRequired` notice.
//!
//! Shutdown is the one deferred path: the host awaits `handle(...)` for
//! `ShutdownRequested` before terminating, and the handler bounds its own
//! network work with a 10 s timeout so OS termination is never blocked
//! indefinitely.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use punchclock_core::config::AutoTimeClockConfig;
use punchclock_core::error::{Error, Result};
use punchclock_core::traits::AttendanceApi;
use punchclock_core::types::{Notice, TimeClockEvent, TimeClockKind};

use crate::day::{is_weekend, parse_hhmm};
use crate::notify::Notifier;
use crate::resolver;

/// Bound on the shutdown-deferred compound clock-out.
pub const SHUTDOWN_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Host-delivered power/lifecycle signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerSignal {
    Suspend,
    Resume,
    Lock,
    Unlock,
    /// The host defers termination until `handle` returns for this signal.
    ShutdownRequested,
    Startup,
}

/// Stateless reactor to power signals. Holds no schedule, no flags — the
/// remote event log is consulted fresh on every signal.
pub struct PowerEventAutomator {
    api: Arc<dyn AttendanceApi>,
    auto: AutoTimeClockConfig,
    /// Auto-break mode: suspend/lock starts a break, resume/unlock ends it.
    auto_break: bool,
    tz: Tz,
    notifier: Notifier,
}

impl PowerEventAutomator {
    pub fn new(
        api: Arc<dyn AttendanceApi>,
        auto: AutoTimeClockConfig,
        auto_break: bool,
        tz: Tz,
        notifier: Notifier,
    ) -> Self {
        Self {
            api,
            auto,
            auto_break,
            tz,
            notifier,
        }
    }

    /// Entry point for host callbacks. Never returns an error; for
    /// `ShutdownRequested` the future completing is the release signal.
    pub async fn handle(&self, signal: PowerSignal) {
        self.handle_at(signal, Utc::now()).await
    }

    /// Same as `handle` with an explicit "now" (the clock the time-based
    /// rules are evaluated against).
    pub async fn handle_at(&self, signal: PowerSignal, now: DateTime<Utc>) {
        tracing::debug!("⚡ Power signal: {signal:?}");
        let result = match signal {
            PowerSignal::Suspend | PowerSignal::Lock => self.on_suspend_or_lock(now).await,
            PowerSignal::Resume | PowerSignal::Unlock => self.on_resume_or_unlock(now).await,
            PowerSignal::ShutdownRequested => self.on_shutdown(now).await,
            PowerSignal::Startup => self.on_startup(now).await,
        };

        match result {
            Ok(()) => {}
            Err(Error::AuthExpired) => {
                tracing::warn!("🔒 {signal:?} automation needs re-authentication");
                self.notifier.emit(Notice::ReauthRequired);
            }
            Err(e) if e.is_illegal_transition() => {
                tracing::debug!("⏭️ {signal:?} automation raced the server — no-op: {e}");
            }
            Err(e) => {
                tracing::warn!("⚠️ {signal:?} automation failed: {e}");
            }
        }
    }

    /// Priority chain, first match wins:
    /// 1. past the configured end-of-day time and still clocked in →
    ///    compound clock-out (do NOT fall through to auto-break);
    /// 2. auto-break mode → break_begin.
    async fn on_suspend_or_lock(&self, now: DateTime<Utc>) -> Result<()> {
        let today = self.business_date(now);
        if self.weekend_blocked(today) {
            return Ok(());
        }

        let events = self.api.list_events(today, today).await?;
        let last = resolver::last_kind(&events);

        let after = &self.auto.auto_clock_out_after_time;
        if after.enabled
            && let Some(cutoff) = parse_hhmm(&after.time)
            && now.with_timezone(&self.tz).time() >= cutoff
            && !matches!(last, None | Some(TimeClockKind::ClockOut))
        {
            tracing::info!("🌙 Past {} — auto clock-out instead of break", after.time);
            self.compound_clock_out(&events).await?;
            self.notifier.emit(Notice::AutoClockOutTimeBased);
            return Ok(());
        }

        if self.auto_break && resolver::can_execute(&events, TimeClockKind::BreakBegin, now) {
            self.api.record_event(TimeClockKind::BreakBegin).await?;
            self.notifier.emit(Notice::BreakStarted);
        }
        Ok(())
    }

    async fn on_resume_or_unlock(&self, now: DateTime<Utc>) -> Result<()> {
        if !self.auto_break {
            return Ok(());
        }
        let today = self.business_date(now);
        if self.weekend_blocked(today) {
            return Ok(());
        }

        let events = self.api.list_events(today, today).await?;
        if resolver::can_execute(&events, TimeClockKind::BreakEnd, now) {
            self.api.record_event(TimeClockKind::BreakEnd).await?;
            self.notifier.emit(Notice::BreakEnded);
        }
        Ok(())
    }

    /// Deferred shutdown write. The whole fetch-and-write runs under
    /// `SHUTDOWN_WRITE_TIMEOUT`; timeout or not, this returns and thereby
    /// releases the shutdown.
    async fn on_shutdown(&self, now: DateTime<Utc>) -> Result<()> {
        if !self.auto.auto_clock_out_on_shutdown {
            return Ok(());
        }
        let today = self.business_date(now);

        let deferred = async {
            let events = self.api.list_events(today, today).await?;
            if matches!(
                resolver::last_kind(&events),
                None | Some(TimeClockKind::ClockOut)
            ) {
                return Ok(false);
            }
            self.compound_clock_out(&events).await?;
            Ok(true)
        };

        match tokio::time::timeout(SHUTDOWN_WRITE_TIMEOUT, deferred).await {
            Ok(Ok(true)) => {
                tracing::info!("👋 Clocked out before shutdown");
                self.notifier.emit(Notice::AutoClockOutShutdown);
                Ok(())
            }
            Ok(done) => done.map(|_| ()),
            Err(_) => Err(Error::ShutdownTimeout),
        }
    }

    async fn on_startup(&self, now: DateTime<Utc>) -> Result<()> {
        if !self.auto.auto_clock_in_on_startup {
            return Ok(());
        }
        let today = self.business_date(now);
        if self.weekend_blocked(today) {
            tracing::info!("📅 Weekend — startup clock-in skipped");
            return Ok(());
        }

        let events = self.api.list_events(today, today).await?;
        if resolver::last_kind(&events).is_none() {
            self.api.record_event(TimeClockKind::ClockIn).await?;
            tracing::info!("🌅 Auto clock-in on startup");
            self.notifier.emit(Notice::AutoClockIn);
        }
        Ok(())
    }

    /// Close an open break (if any), then clock out. The break_end is not
    /// gated on the 60-second rule here — blocking a final clock-out behind
    /// a short break would strand the day open.
    async fn compound_clock_out(&self, events: &[TimeClockEvent]) -> Result<()> {
        if resolver::last_kind(events) == Some(TimeClockKind::BreakBegin) {
            match self.api.record_event(TimeClockKind::BreakEnd).await {
                Ok(_) => {}
                Err(e) if e.is_illegal_transition() => {}
                Err(e) => return Err(e),
            }
        }
        self.api.record_event(TimeClockKind::ClockOut).await?;
        Ok(())
    }

    fn business_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }

    /// The scheduler's weekend rule, repeated here as a second line of
    /// defense, honoring the `disable_weekends` toggle.
    fn weekend_blocked(&self, date: NaiveDate) -> bool {
        self.auto.disable_weekends && is_weekend(date)
    }
}

/// Owns the subscription to host power signals.
///
/// `start` while already subscribed is a no-op; `stop` disposes of the
/// subscription. Signals are handled sequentially in arrival order.
pub struct PowerMonitor {
    automator: Arc<PowerEventAutomator>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl PowerMonitor {
    pub fn new(automator: Arc<PowerEventAutomator>) -> Self {
        Self {
            automator,
            task: None,
        }
    }

    /// Subscribe to a signal stream. Returns false (and changes nothing)
    /// when already monitoring.
    pub fn start(&mut self, mut rx: mpsc::Receiver<PowerSignal>) -> bool {
        if self.is_monitoring() {
            tracing::debug!("Power monitor already running");
            return false;
        }
        let automator = self.automator.clone();
        self.task = Some(tokio::spawn(async move {
            tracing::info!("🔌 Power monitor started");
            while let Some(signal) = rx.recv().await {
                automator.handle(signal).await;
            }
            tracing::info!("🔌 Power monitor signal stream closed");
        }));
        true
    }

    /// Dispose of the subscription. Returns false when not monitoring.
    pub fn stop(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                tracing::info!("🔌 Power monitor stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for PowerMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FailMode, MockApi, event_at, tokyo};
    use punchclock_core::config::AutoClockOutAfterTime;

    const TZ: Tz = chrono_tz::Asia::Tokyo;

    fn auto_cfg() -> AutoTimeClockConfig {
        AutoTimeClockConfig {
            auto_clock_in_on_startup: false,
            auto_clock_out_on_shutdown: false,
            auto_clock_out_after_time: AutoClockOutAfterTime {
                enabled: false,
                time: "17:00".into(),
            },
            disable_weekends: true,
        }
    }

    fn automator(api: Arc<MockApi>, auto: AutoTimeClockConfig, auto_break: bool) -> PowerEventAutomator {
        PowerEventAutomator::new(api, auto, auto_break, TZ, Notifier::disabled())
    }

    fn workday_events() -> Vec<TimeClockEvent> {
        vec![event_at(1, TimeClockKind::ClockIn, tokyo(2025, 6, 2, 9, 0))]
    }

    #[tokio::test]
    async fn test_suspend_starts_break_in_auto_break_mode() {
        let api = Arc::new(MockApi::with_events(workday_events()));
        let a = automator(api.clone(), auto_cfg(), true);

        a.handle_at(PowerSignal::Suspend, tokyo(2025, 6, 2, 14, 0)).await;
        assert_eq!(api.recorded_kinds(), vec![TimeClockKind::BreakBegin]);
    }

    #[tokio::test]
    async fn test_suspend_noop_without_auto_break() {
        let api = Arc::new(MockApi::with_events(workday_events()));
        let a = automator(api.clone(), auto_cfg(), false);

        a.handle_at(PowerSignal::Suspend, tokyo(2025, 6, 2, 14, 0)).await;
        assert!(api.recorded_kinds().is_empty());
    }

    #[tokio::test]
    async fn test_time_based_clock_out_wins_over_auto_break() {
        let api = Arc::new(MockApi::with_events(workday_events()));
        let mut auto = auto_cfg();
        auto.auto_clock_out_after_time.enabled = true;
        // Auto-break is enabled too, but rule 1 must win and stop the chain.
        let a = automator(api.clone(), auto, true);

        a.handle_at(PowerSignal::Lock, tokyo(2025, 6, 2, 18, 30)).await;
        assert_eq!(api.recorded_kinds(), vec![TimeClockKind::ClockOut]);
    }

    #[tokio::test]
    async fn test_time_based_clock_out_closes_open_break_first() {
        let mut events = workday_events();
        events.push(event_at(2, TimeClockKind::BreakBegin, tokyo(2025, 6, 2, 17, 30)));
        let api = Arc::new(MockApi::with_events(events));
        let mut auto = auto_cfg();
        auto.auto_clock_out_after_time.enabled = true;
        let a = automator(api.clone(), auto, true);

        a.handle_at(PowerSignal::Suspend, tokyo(2025, 6, 2, 18, 0)).await;
        assert_eq!(
            api.recorded_kinds(),
            vec![TimeClockKind::BreakEnd, TimeClockKind::ClockOut]
        );
    }

    #[tokio::test]
    async fn test_time_based_rule_idle_before_cutoff() {
        let api = Arc::new(MockApi::with_events(workday_events()));
        let mut auto = auto_cfg();
        auto.auto_clock_out_after_time.enabled = true;
        let a = automator(api.clone(), auto, true);

        // 16:00 — before the 17:00 cutoff, falls through to auto-break.
        a.handle_at(PowerSignal::Suspend, tokyo(2025, 6, 2, 16, 0)).await;
        assert_eq!(api.recorded_kinds(), vec![TimeClockKind::BreakBegin]);
    }

    #[tokio::test]
    async fn test_time_based_rule_ignores_already_clocked_out() {
        let api = Arc::new(MockApi::with_events(vec![
            event_at(1, TimeClockKind::ClockIn, tokyo(2025, 6, 2, 9, 0)),
            event_at(2, TimeClockKind::ClockOut, tokyo(2025, 6, 2, 17, 30)),
        ]));
        let mut auto = auto_cfg();
        auto.auto_clock_out_after_time.enabled = true;
        let a = automator(api.clone(), auto, false);

        a.handle_at(PowerSignal::Suspend, tokyo(2025, 6, 2, 18, 0)).await;
        assert!(api.recorded_kinds().is_empty());
    }

    #[tokio::test]
    async fn test_resume_ends_break() {
        let mut events = workday_events();
        events.push(event_at(2, TimeClockKind::BreakBegin, tokyo(2025, 6, 2, 12, 0)));
        let api = Arc::new(MockApi::with_events(events));
        let a = automator(api.clone(), auto_cfg(), true);

        a.handle_at(PowerSignal::Resume, tokyo(2025, 6, 2, 12, 30)).await;
        assert_eq!(api.recorded_kinds(), vec![TimeClockKind::BreakEnd]);
    }

    #[tokio::test]
    async fn test_unlock_respects_minimum_break() {
        let mut events = workday_events();
        events.push(event_at(2, TimeClockKind::BreakBegin, tokyo(2025, 6, 2, 12, 0)));
        let api = Arc::new(MockApi::with_events(events));
        let a = automator(api.clone(), auto_cfg(), true);

        // 30 seconds after the break began: resolver gate says no.
        let now = tokyo(2025, 6, 2, 12, 0) + chrono::Duration::seconds(30);
        a.handle_at(PowerSignal::Unlock, now).await;
        assert!(api.recorded_kinds().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_compound_clock_out_order() {
        let mut events = workday_events();
        events.push(event_at(2, TimeClockKind::BreakBegin, tokyo(2025, 6, 2, 16, 0)));
        let api = Arc::new(MockApi::with_events(events));
        let mut auto = auto_cfg();
        auto.auto_clock_out_on_shutdown = true;
        let a = automator(api.clone(), auto, false);

        a.handle_at(PowerSignal::ShutdownRequested, tokyo(2025, 6, 2, 18, 0)).await;
        assert_eq!(
            api.recorded_kinds(),
            vec![TimeClockKind::BreakEnd, TimeClockKind::ClockOut]
        );
    }

    #[tokio::test]
    async fn test_shutdown_noop_when_never_clocked_in() {
        let api = Arc::new(MockApi::new());
        let mut auto = auto_cfg();
        auto.auto_clock_out_on_shutdown = true;
        let a = automator(api.clone(), auto, false);

        a.handle_at(PowerSignal::ShutdownRequested, tokyo(2025, 6, 2, 18, 0)).await;
        assert!(api.recorded_kinds().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_released_after_timeout() {
        let api = Arc::new(MockApi::with_events(workday_events()));
        api.set_fail_mode(FailMode::Hang);
        let mut auto = auto_cfg();
        auto.auto_clock_out_on_shutdown = true;
        let a = automator(api.clone(), auto, false);

        // Completes (releasing the shutdown) despite the hung write.
        a.handle_at(PowerSignal::ShutdownRequested, tokyo(2025, 6, 2, 18, 0)).await;
        assert!(api.recorded_kinds().is_empty());
    }

    #[tokio::test]
    async fn test_startup_clock_in() {
        let api = Arc::new(MockApi::new());
        let mut auto = auto_cfg();
        auto.auto_clock_in_on_startup = true;
        let a = automator(api.clone(), auto, false);

        a.handle_at(PowerSignal::Startup, tokyo(2025, 6, 2, 9, 0)).await;
        assert_eq!(api.recorded_kinds(), vec![TimeClockKind::ClockIn]);
    }

    #[tokio::test]
    async fn test_startup_skipped_on_weekend() {
        let api = Arc::new(MockApi::new());
        let mut auto = auto_cfg();
        auto.auto_clock_in_on_startup = true;
        let a = automator(api.clone(), auto, false);

        // 2025-06-07 is a Saturday.
        a.handle_at(PowerSignal::Startup, tokyo(2025, 6, 7, 9, 0)).await;
        assert!(api.recorded_kinds().is_empty());
    }

    #[tokio::test]
    async fn test_startup_weekend_allowed_when_toggle_off() {
        let api = Arc::new(MockApi::new());
        let mut auto = auto_cfg();
        auto.auto_clock_in_on_startup = true;
        auto.disable_weekends = false;
        let a = automator(api.clone(), auto, false);

        a.handle_at(PowerSignal::Startup, tokyo(2025, 6, 7, 9, 0)).await;
        assert_eq!(api.recorded_kinds(), vec![TimeClockKind::ClockIn]);
    }

    #[tokio::test]
    async fn test_startup_noop_when_already_clocked_in() {
        let api = Arc::new(MockApi::with_events(workday_events()));
        let mut auto = auto_cfg();
        auto.auto_clock_in_on_startup = true;
        let a = automator(api.clone(), auto, false);

        a.handle_at(PowerSignal::Startup, tokyo(2025, 6, 2, 10, 0)).await;
        assert!(api.recorded_kinds().is_empty());
    }

    #[tokio::test]
    async fn test_handler_swallows_transport_failures() {
        let api = Arc::new(MockApi::with_events(workday_events()));
        api.set_fail_mode(FailMode::Http);
        let a = automator(api.clone(), auto_cfg(), true);

        // Must not panic or propagate.
        a.handle_at(PowerSignal::Suspend, tokyo(2025, 6, 2, 14, 0)).await;
        assert!(api.recorded_kinds().is_empty());
    }

    #[tokio::test]
    async fn test_auth_expiry_raises_reauth_notice() {
        let api = Arc::new(MockApi::with_events(workday_events()));
        api.set_fail_mode(FailMode::Auth);
        let (notifier, mut rx) = Notifier::channel();
        let a = PowerEventAutomator::new(api, auto_cfg(), true, TZ, notifier);

        a.handle_at(PowerSignal::Suspend, tokyo(2025, 6, 2, 14, 0)).await;
        assert_eq!(rx.try_recv().unwrap(), Notice::ReauthRequired);
    }

    #[tokio::test]
    async fn test_monitor_start_is_idempotent_and_disposable() {
        let api = Arc::new(MockApi::new());
        let a = Arc::new(automator(api, auto_cfg(), false));
        let mut monitor = PowerMonitor::new(a);

        let (_tx1, rx1) = mpsc::channel(8);
        let (_tx2, rx2) = mpsc::channel(8);
        assert!(monitor.start(rx1));
        assert!(!monitor.start(rx2), "second start must be a no-op");
        assert!(monitor.is_monitoring());
        assert!(monitor.stop());
        assert!(!monitor.stop());
    }

    #[tokio::test]
    async fn test_monitor_forwards_signals() {
        let api = Arc::new(MockApi::new());
        let mut auto = auto_cfg();
        auto.auto_clock_in_on_startup = true;
        let a = Arc::new(automator(api.clone(), auto, false));
        let mut monitor = PowerMonitor::new(a);

        let (tx, rx) = mpsc::channel(8);
        monitor.start(rx);
        // Resume without auto-break mode is harmless on any day; this only
        // proves delivery and loop shutdown.
        tx.send(PowerSignal::Resume).await.unwrap();
        drop(tx);
        // Wait for the stream to drain and the loop to exit.
        while monitor.is_monitoring() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(api.recorded_kinds().is_empty());
    }
}
